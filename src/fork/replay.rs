//! Prior-transaction state replay
//!
//! To position a simulation at index *i* inside block *B*, the fork is
//! started from the end-of-block state of *B-1* and the state deltas of
//! transactions 0..i-1 are mechanically reapplied: each prior
//! transaction is fetched and traced on the *origin* chain with a
//! delta-reporting tracer, and its reported balance/nonce/storage
//! changes are injected directly onto the fork's accounts. The prior
//! transactions are never re-executed. Replay is strictly sequential:
//! delta *i* must be visible on the fork before delta *i+1* is traced,
//! because each consumes the cumulative state of its predecessors.

use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::RpcError;
use crate::fork::ForkSession;
use crate::types::StateDelta;
use crate::utils::{parse_quantity, parse_word};

async fn rpc(
    provider: &DynProvider,
    method: &'static str,
    params: Value,
) -> Result<Value, RpcError> {
    provider
        .raw_request(method.into(), params)
        .await
        .map_err(|e| RpcError::Transport {
            method,
            reason: e.to_string(),
        })
}

/// Replays the state deltas of transactions 0..index of `block_number`
/// onto the fork, in order
///
/// A single prior transaction that fails to fetch, trace, or parse is
/// logged and skipped; failing to fetch the block itself is fatal.
/// Returns the number of transactions whose deltas were applied.
pub async fn replay_prior_transactions(
    session: &ForkSession,
    origin: &DynProvider,
    block_number: u64,
    index: usize,
) -> Result<usize, RpcError> {
    let block = rpc(
        origin,
        "eth_getBlockByNumber",
        json!([format!("0x{block_number:x}"), false]),
    )
    .await?;
    let hashes: Vec<String> = block
        .get("transactions")
        .and_then(Value::as_array)
        .map(|txs| {
            txs.iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .ok_or_else(|| RpcError::UnexpectedResponse {
            method: "eth_getBlockByNumber",
            reason: format!("block {block_number} has no transaction list"),
        })?;

    let mut applied = 0;
    for (position, hash) in hashes.iter().take(index).enumerate() {
        match replay_one(session, origin, hash).await {
            Ok(deltas) => {
                debug!(position, %hash, deltas, "applied prior transaction deltas");
                applied += 1;
            }
            Err(err) => {
                warn!(position, %hash, %err, "skipping prior transaction");
            }
        }
    }
    Ok(applied)
}

/// Traces one transaction on the origin chain and injects its reported
/// deltas onto the fork
async fn replay_one(
    session: &ForkSession,
    origin: &DynProvider,
    hash: &str,
) -> Result<usize, RpcError> {
    let report = rpc(
        origin,
        "debug_traceTransaction",
        json!([hash, { "tracer": "prestateTracer", "tracerConfig": { "diffMode": true } }]),
    )
    .await?;

    let deltas = parse_state_deltas(&report);
    for delta in &deltas {
        session.apply_state_delta(delta).await?;
    }
    Ok(deltas.len())
}

/// Parses the `post` section of a diff-mode prestate report into typed
/// deltas
///
/// Tolerant of partial accounts: unreadable fields are dropped, empty
/// deltas are not emitted. Accounts present only in `pre` (removals)
/// are skipped; injection can only set fields, not delete accounts.
pub fn parse_state_deltas(report: &Value) -> Vec<StateDelta> {
    let Some(post) = report.get("post").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut deltas = Vec::new();
    for (raw_address, account) in post {
        let Ok(address) = raw_address.parse::<Address>() else {
            warn!(raw_address, "unparseable account in state delta report");
            continue;
        };
        let balance = account
            .get("balance")
            .and_then(Value::as_str)
            .and_then(parse_quantity);
        let nonce = account.get("nonce").and_then(|n| {
            n.as_u64()
                .or_else(|| n.as_str().and_then(parse_quantity).and_then(|q| q.try_into().ok()))
        });
        let storage = account
            .get("storage")
            .and_then(Value::as_object)
            .map(|slots| {
                slots
                    .iter()
                    .filter_map(|(slot, value)| {
                        Some((parse_word(slot)?, value.as_str().and_then(parse_word)?))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let delta = StateDelta {
            address,
            balance,
            nonce,
            storage,
        };
        if !delta.is_empty() {
            deltas.push(delta);
        }
    }
    deltas
}
