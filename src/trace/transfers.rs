//! Token-transfer extraction from trace evidence
//!
//! Decoding contract: a log is a transfer when `topic[0]` matches the
//! standard transfer event signature; `from`/`to` are the low 20 bytes
//! of topics 1 and 2, the amount is a big-endian unsigned integer from
//! the data field, and a zero-address destination marks a burn.
//! Zero-amount events are dropped at decode time: they cannot move any
//! balance, and spam contracts emit them in bulk.
//!
//! Extraction runs in stages. The primary pass walks the typed frame
//! tree. If it yields nothing, a bounded-depth search sweeps the raw
//! trace JSON for log-shaped objects anywhere. If that is still empty,
//! a single direct `transfer(address,uint256)` call can be decoded from
//! the top-level input data, but only on an exact selector and length
//! match, never by guessing.

use alloy::primitives::{keccak256, Address, FixedBytes, U256};
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::trace::logs::{normalize_log, NormalizedLog};
use crate::trace::{TraceNode, MAX_TRACE_DEPTH};
use crate::types::{TokenTransfer, TransferKind};

/// Transfer event signature
/// keccak256("Transfer(address,address,uint256)")
static TRANSFER_EVENT_SIGNATURE: Lazy<FixedBytes<32>> =
    Lazy::new(|| keccak256(b"Transfer(address,address,uint256)"));

/// 4-byte selector of `transfer(address,uint256)`
const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Indexed counterparties of a transfer-shaped log, low 20 bytes of
/// topics 1 and 2
pub fn transfer_counterparties(log: &NormalizedLog) -> Option<(Address, Address)> {
    if log.topics.len() < 3 || log.topics[0] != *TRANSFER_EVENT_SIGNATURE {
        return None;
    }
    Some((
        Address::from_slice(&log.topics[1].as_slice()[12..]),
        Address::from_slice(&log.topics[2].as_slice()[12..]),
    ))
}

/// Decodes one normalized log into a transfer record
///
/// `None` for non-transfer logs, malformed topics, and zero amounts;
/// a zero-amount event is balance-neutral and never reported.
pub fn decode_transfer_log(log: &NormalizedLog) -> Option<TokenTransfer> {
    let (from, to) = transfer_counterparties(log)?;
    if log.data.len() > 32 {
        return None;
    }
    let amount = U256::from_be_slice(&log.data);
    if amount.is_zero() {
        return None;
    }
    let kind = if to == Address::ZERO {
        TransferKind::Burn
    } else {
        TransferKind::Transfer
    };
    Some(TokenTransfer {
        token: log.address,
        from,
        to,
        amount,
        kind,
    })
}

/// Extracts transfers from a trace, falling back to an exhaustive
/// raw-JSON search when the frame logs yield nothing
///
/// `raw` is the undigested tracer response the frame tree was parsed
/// from; the fallback sweeps it for log-shaped objects under any key.
pub fn extract_transfers(root: &TraceNode, raw: &Value) -> Vec<TokenTransfer> {
    let mut transfers = Vec::new();
    root.visit(&mut |node| {
        for log in &node.logs {
            if let Some(transfer) = normalize_log(log).as_ref().and_then(decode_transfer_log) {
                transfers.push(transfer);
            }
        }
    });
    if !transfers.is_empty() {
        return transfers;
    }
    search_raw(raw, 0, &mut transfers);
    transfers
}

/// Depth-bounded sweep of arbitrary JSON for decodable transfer logs
///
/// A value that normalizes as a log is consumed whole; the sweep does
/// not descend into it, so nested `raw` wrappers are not double-counted.
fn search_raw(value: &Value, depth: usize, out: &mut Vec<TokenTransfer>) {
    if depth > MAX_TRACE_DEPTH {
        return;
    }
    if let Some(log) = normalize_log(value) {
        if let Some(transfer) = decode_transfer_log(&log) {
            out.push(transfer);
        }
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                search_raw(item, depth + 1, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                search_raw(item, depth + 1, out);
            }
        }
        _ => {}
    }
}

/// Decodes a direct single-transfer call from top-level input data
///
/// Accepts only an exact `selector + 32-byte address + 32-byte amount`
/// layout with the expected transfer selector; anything else yields
/// nothing.
pub fn decode_transfer_call(token: Address, caller: Address, input: &[u8]) -> Option<TokenTransfer> {
    if input.len() != 4 + 32 + 32 || input[..4] != TRANSFER_SELECTOR {
        return None;
    }
    let to = Address::from_slice(&input[16..36]);
    let amount = U256::from_be_slice(&input[36..68]);
    if amount.is_zero() {
        return None;
    }
    let kind = if to == Address::ZERO {
        TransferKind::Burn
    } else {
        TransferKind::Transfer
    };
    Some(TokenTransfer {
        token,
        from: caller,
        to,
        amount,
        kind,
    })
}
