//! Call trace model and touched-address discovery
//!
//! The fork node's call tracer returns a recursive frame tree with
//! per-frame logs. Frames are typed here; logs stay raw JSON because
//! their shape varies between node builds ([`logs`] owns normalization).
//!
//! # Modules
//!
//! - `logs`: ordered shape adapters turning raw log JSON into a
//!   normalized `{address, topics, data}` record
//! - `transfers`: token-transfer decoding with its fallback chain

pub mod logs;
pub mod transfers;

use std::collections::BTreeSet;

use alloy::primitives::{Address, U256};
use serde::Deserialize;
use serde_json::Value;

use crate::trace::logs::normalize_log;
use crate::trace::transfers::transfer_counterparties;

/// Maximum depth for any recursive walk over trace data
pub const MAX_TRACE_DEPTH: usize = 16;

/// One call frame and its children, as reported by the call tracer
///
/// Immutable once received; unknown fields are ignored, absent fields
/// default so partial frames still parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceNode {
    /// Caller address
    pub from: Address,
    /// Callee address; absent for creation frames
    #[serde(default)]
    pub to: Option<Address>,
    /// Native value carried by this frame
    #[serde(default)]
    pub value: Option<U256>,
    /// Gas consumed by this frame
    #[serde(default)]
    pub gas_used: Option<U256>,
    /// Execution error reported for this frame, if any
    #[serde(default)]
    pub error: Option<String>,
    /// Frame input data
    #[serde(default)]
    pub input: Option<String>,
    /// Raw logs emitted by this frame; shape varies, kept untyped
    #[serde(default)]
    pub logs: Vec<Value>,
    /// Child frames
    #[serde(default)]
    pub calls: Vec<TraceNode>,
}

impl TraceNode {
    /// Gas used by the root frame as a u64, zero when absent or oversized
    pub fn gas_used_u64(&self) -> u64 {
        self.gas_used
            .and_then(|g| u64::try_from(g).ok())
            .unwrap_or(0)
    }

    /// Walks the frame tree depth-first, bounded by [`MAX_TRACE_DEPTH`]
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a TraceNode)) {
        fn walk<'a>(node: &'a TraceNode, depth: usize, f: &mut impl FnMut(&'a TraceNode)) {
            if depth > MAX_TRACE_DEPTH {
                return;
            }
            f(node);
            for child in &node.calls {
                walk(child, depth + 1, f);
            }
        }
        walk(self, 0, f);
    }

    /// Message of the deepest errored frame, preferring nested errors
    /// over their parents
    pub fn find_error(&self) -> Option<&str> {
        let mut deepest: Option<(usize, &str)> = None;
        fn walk<'a>(node: &'a TraceNode, depth: usize, deepest: &mut Option<(usize, &'a str)>) {
            if depth > MAX_TRACE_DEPTH {
                return;
            }
            if let Some(err) = node.error.as_deref() {
                if deepest.map_or(true, |(d, _)| depth >= d) {
                    *deepest = Some((depth, err));
                }
            }
            for child in &node.calls {
                walk(child, depth + 1, deepest);
            }
        }
        walk(self, 0, &mut deepest);
        deepest.map(|(_, err)| err)
    }
}

/// Collects every account potentially affected by the traced call
///
/// Accumulates each frame's `from` and `to`, the emitter of every
/// normalizable log, and, for logs carrying the standard transfer
/// event signature, the indexed counterparties from the topic fields.
/// Transfer counterparties matter because they are not necessarily
/// present anywhere else in the frame tree.
pub fn collect_touched(root: &TraceNode) -> BTreeSet<Address> {
    let mut touched = BTreeSet::new();
    root.visit(&mut |node| {
        touched.insert(node.from);
        if let Some(to) = node.to {
            touched.insert(to);
        }
        for raw in &node.logs {
            let Some(log) = normalize_log(raw) else {
                continue;
            };
            touched.insert(log.address);
            if let Some((from, to)) = transfer_counterparties(&log) {
                touched.insert(from);
                touched.insert(to);
            }
        }
    });
    touched
}
