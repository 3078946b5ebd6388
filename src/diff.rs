//! Balance diffing and flow classification
//!
//! Turns before/after balance grids into signed per-entry deltas, then
//! partitions and summarizes them into the shapes the response reports.

use std::collections::{BTreeMap, HashMap};

use alloy::primitives::{Address, I256, U256};

use crate::types::{AddressKind, AssetKey, BalanceDiff, BalanceGrid, TokenDeltaSummary};

/// Signed difference `after - before`, saturating at the I256 bounds
fn signed_delta(before: U256, after: U256) -> I256 {
    let (magnitude, negative) = if after >= before {
        (after - before, false)
    } else {
        (before - after, true)
    };
    match I256::try_from(magnitude) {
        Ok(value) if negative => -value,
        Ok(value) => value,
        Err(_) if negative => I256::MIN,
        Err(_) => I256::MAX,
    }
}

/// Computes per-entry deltas between two grids
///
/// Total over the union of both key sets: entries absent from either
/// side read as zero. Only non-zero deltas are retained.
pub fn diff(before: &BalanceGrid, after: &BalanceGrid) -> BalanceDiff {
    let mut out = BalanceDiff::new();
    for key in before.union_keys(after) {
        let delta = signed_delta(before.get(key.0, key.1), after.get(key.0, key.1));
        if !delta.is_zero() {
            out.insert(key, delta);
        }
    }
    out
}

/// One signed entry of a classified flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowEntry {
    /// Asset dimension
    pub asset: AssetKey,
    /// Affected account
    pub address: Address,
    /// Signed change
    pub delta: I256,
}

/// Deltas partitioned by direction
#[derive(Debug, Clone, Default)]
pub struct Flows {
    /// Negative deltas (value leaving an account)
    pub sent: Vec<FlowEntry>,
    /// Positive deltas (value arriving at an account)
    pub received: Vec<FlowEntry>,
}

/// Partitions every non-zero delta into sent and received sets
///
/// The initiator's native-currency delta reflects value movement only;
/// the evaluation model never mines the call, so no fee cost appears
/// here.
pub fn classify_flows(initiator: Address, diff: &BalanceDiff) -> Flows {
    let mut flows = Flows::default();
    let mut entries: Vec<_> = diff
        .iter()
        .map(|(&(asset, address), &delta)| FlowEntry {
            asset,
            address,
            delta,
        })
        .collect();
    // initiator first, then a stable order for the rest
    entries.sort_by_key(|e| (e.address != initiator, e.asset, e.address));
    for entry in entries {
        if entry.delta.is_negative() {
            flows.sent.push(entry);
        } else {
            flows.received.push(entry);
        }
    }
    flows
}

/// Summarizes token deltas, restricting per-account reporting to
/// externally-owned accounts
///
/// Contract-held deltas still count toward the token total, so a
/// non-zero total with a smaller per-account sum points at value parked
/// in a contract rather than a mint or burn.
pub fn summarize_token_deltas(
    diff: &BalanceDiff,
    kinds: &HashMap<Address, AddressKind>,
) -> Vec<TokenDeltaSummary> {
    let mut by_token: BTreeMap<Address, TokenDeltaSummary> = BTreeMap::new();
    for (&(asset, address), &delta) in diff {
        let AssetKey::Token(token) = asset else {
            continue;
        };
        let summary = by_token.entry(token).or_insert_with(|| TokenDeltaSummary {
            token,
            total: I256::ZERO,
            per_account: BTreeMap::new(),
        });
        summary.total += delta;
        if kinds.get(&address).copied().unwrap_or(AddressKind::Eoa) == AddressKind::Eoa {
            summary.per_account.insert(address, delta);
        }
    }
    by_token.into_values().collect()
}
