//! Simulation orchestration
//!
//! Composes the fork controller, trace collectors, token classifier,
//! diff analyzer, and price client into one request/response cycle.
//!
//! Central invariant: **the target call is never mined**. The call is
//! evaluated through the fork's tracer only, and after-balances are
//! derived analytically from the extracted transfer evidence: each
//! transfer debits its sender and, unless it is a burn, credits its
//! receiver, and the requested native value moves from caller to
//! callee. Fee cost is not modeled. The fork stays disposable and is
//! torn down on every exit path.

use std::collections::{BTreeSet, HashMap};

use alloy::primitives::{utils::format_units, Address, U256};
use futures::{stream, StreamExt};
use serde_json::json;
use tracing::{debug, warn};

use crate::diff::{classify_flows, diff, summarize_token_deltas};
use crate::errors::{RpcError, SimulationError};
use crate::fork::replay::replay_prior_transactions;
use crate::fork::{connect, ForkConfig, ForkSession};
use crate::price::{PriceClient, PriceConfig};
use crate::tokens::{address_kind, classify_token, collect_balances};
use crate::trace::transfers::{decode_transfer_call, extract_transfers};
use crate::trace::{collect_touched, TraceNode};
use crate::types::{
    AddressKind, AssetChangeRecord, AssetKey, BalanceGrid, GasInfo, SimulateRequest,
    SimulateResponse, SimulationStatus, TokenInfo, TokenTransfer, TouchedAddress,
};
use crate::utils::validate_call_data;

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    /// Fork-node spawn parameters
    pub fork: ForkConfig,
    /// Price API parameters
    pub price: PriceConfig,
    /// Concurrency bound for classification and balance probes
    pub probe_concurrency: usize,
}

const DEFAULT_PROBE_CONCURRENCY: usize = 8;

/// The simulation engine
pub struct Simulator {
    config: SimulatorConfig,
    price: PriceClient,
}

impl Simulator {
    /// Creates an engine over the given configuration
    pub fn new(config: SimulatorConfig) -> Self {
        let price = PriceClient::new(config.price.clone());
        Self { config, price }
    }

    fn concurrency(&self) -> usize {
        if self.config.probe_concurrency == 0 {
            DEFAULT_PROBE_CONCURRENCY
        } else {
            self.config.probe_concurrency
        }
    }

    /// Runs one simulation end to end
    ///
    /// Forks at the correct height, replays prior transactions when a
    /// position was requested, evaluates the target call under a
    /// snapshot, and turns the trace evidence into a balance-diff
    /// report. The fork process is terminated before returning,
    /// regardless of outcome.
    pub async fn simulate(
        &self,
        request: SimulateRequest,
    ) -> Result<SimulateResponse, SimulationError> {
        let data = validate_call_data(request.data.as_deref())?;
        let origin = connect(&request.fork_source_url)?;

        // a position inside block B needs the end-of-block state of B-1
        let fork_at_block = if request.transaction_index.is_some() {
            request.block_number.saturating_sub(1)
        } else {
            request.block_number
        };
        let mut session =
            ForkSession::start(&self.config.fork, &request.fork_source_url, fork_at_block).await?;

        let result = self.run(&mut session, &origin, &request, &data).await;
        session.shutdown().await;
        result
    }

    async fn run(
        &self,
        session: &mut ForkSession,
        origin: &alloy::providers::DynProvider,
        request: &SimulateRequest,
        data: &[u8],
    ) -> Result<SimulateResponse, SimulationError> {
        if let Some(index) = request.transaction_index {
            if index > 0 {
                let applied =
                    replay_prior_transactions(session, origin, request.block_number, index).await?;
                debug!(applied, index, "prior transaction replay finished");
            }
        }

        // brackets the evaluation and all probing below
        session.snapshot().await?;

        let mut call = json!({
            "from": request.from,
            "data": format!("0x{}", alloy::primitives::hex::encode(data)),
        });
        if let Some(to) = request.to {
            call["to"] = json!(to);
        }
        if let Some(value) = request.value {
            call["value"] = json!(value);
        }

        let raw = session.trace_call(call).await?;
        let root: TraceNode =
            serde_json::from_value(raw.clone()).map_err(|e| RpcError::UnexpectedResponse {
                method: "debug_traceCall",
                reason: e.to_string(),
            })?;
        let gas_info = GasInfo {
            gas_used: root.gas_used_u64(),
        };

        if root.error.is_some() {
            session.revert_snapshot().await;
            return Ok(SimulateResponse {
                status: SimulationStatus::Reverted,
                gas_info,
                revert_reason: root.find_error().map(str::to_string),
                token_transfers: Vec::new(),
                asset_changes: Vec::new(),
            });
        }

        // discover every account the call could have affected
        let mut touched: BTreeSet<Address> = collect_touched(&root);
        touched.insert(request.from);
        if let Some(to) = request.to {
            touched.insert(to);
        }
        let addresses: Vec<Address> = touched.into_iter().collect();

        let provider = session.provider().clone();
        let mut records: Vec<TouchedAddress> = Vec::with_capacity(addresses.len());
        for &address in &addresses {
            records.push(TouchedAddress {
                address,
                kind: address_kind(&provider, address).await,
                token: None,
            });
        }

        // speculative token classification over the contract subset
        let contracts: Vec<Address> = records
            .iter()
            .filter(|r| r.kind == AddressKind::Contract)
            .map(|r| r.address)
            .collect();
        let classified: HashMap<Address, TokenInfo> =
            stream::iter(contracts.into_iter().map(|address| {
                let provider = provider.clone();
                async move { (address, classify_token(&provider, address).await) }
            }))
            .buffer_unordered(self.concurrency())
            .filter_map(|(address, info)| async move { info.map(|info| (address, info)) })
            .collect()
            .await;
        for record in &mut records {
            record.token = classified.get(&record.address).cloned();
        }
        let (kinds, token_infos) = index_touched(&records);
        let tokens: Vec<Address> = records
            .iter()
            .filter(|r| r.token.is_some())
            .map(|r| r.address)
            .collect();
        debug!(
            touched = records.len(),
            tokens = tokens.len(),
            "touched-address discovery finished"
        );

        let before = collect_balances(&provider, &tokens, &addresses, self.concurrency()).await;

        let mut transfers = extract_transfers(&root, &raw);
        if transfers.is_empty() {
            if let Some(to) = request.to {
                transfers.extend(decode_transfer_call(to, request.from, data));
            }
        }

        let after = derive_after_balances(
            &before,
            &transfers,
            request.from,
            request.to,
            request.value.unwrap_or_default(),
        );

        let balance_diff = diff(&before, &after);
        let flows = classify_flows(request.from, &balance_diff);
        debug!(
            sent = flows.sent.len(),
            received = flows.received.len(),
            "balance deltas classified"
        );
        for summary in summarize_token_deltas(&balance_diff, &kinds) {
            let eoa_total = summary
                .per_account
                .values()
                .fold(alloy::primitives::I256::ZERO, |acc, &d| acc + d);
            if summary.total != eoa_total {
                // value parked in a contract rather than minted or burned
                debug!(token = %summary.token, total = %summary.total, %eoa_total,
                    "token delta partially held by contracts");
            }
        }

        let mut symbols: Vec<String> = token_infos
            .values()
            .filter_map(|info| info.symbol.clone())
            .collect();
        if request.value.unwrap_or_default() > U256::ZERO {
            symbols.push("ETH".to_string());
        }
        let prices = self.price.usd_prices(&symbols).await;

        let asset_changes = build_asset_changes(request, &transfers, &token_infos, &before, &prices);

        session.revert_snapshot().await;
        Ok(SimulateResponse {
            status: SimulationStatus::Success,
            gas_info,
            revert_reason: None,
            token_transfers: transfers,
            asset_changes,
        })
    }
}

/// Splits classified touched-address records into the lookup maps the
/// diff and pricing stages consume
fn index_touched(
    records: &[TouchedAddress],
) -> (HashMap<Address, AddressKind>, HashMap<Address, TokenInfo>) {
    let kinds = records.iter().map(|r| (r.address, r.kind)).collect();
    let token_infos = records
        .iter()
        .filter_map(|r| r.token.clone().map(|info| (r.address, info)))
        .collect();
    (kinds, token_infos)
}

/// Metadata used for native-currency change records
fn native_token_info() -> TokenInfo {
    TokenInfo {
        symbol: Some("ETH".to_string()),
        name: Some("Ether".to_string()),
        decimals: Some(18),
    }
}

/// Derives the after grid analytically from transfer evidence
///
/// The evaluation call never mutates real balances, so "after" cannot
/// be read back from the chain: each extracted transfer debits its
/// sender and credits its receiver (burns skip the credit), and the
/// requested native value moves from caller to callee. Fee cost is
/// deliberately excluded.
pub fn derive_after_balances(
    before: &BalanceGrid,
    transfers: &[TokenTransfer],
    caller: Address,
    callee: Option<Address>,
    value: U256,
) -> BalanceGrid {
    let mut after = before.clone();
    for transfer in transfers {
        let asset = AssetKey::Token(transfer.token);
        after.debit(asset, transfer.from, transfer.amount);
        if !transfer.is_burn() {
            after.credit(asset, transfer.to, transfer.amount);
        }
    }
    if value > U256::ZERO {
        after.debit(AssetKey::Native, caller, value);
        if let Some(callee) = callee {
            after.credit(AssetKey::Native, callee, value);
        }
    }
    after
}

/// Builds the categorized asset-change records for the response
fn build_asset_changes(
    request: &SimulateRequest,
    transfers: &[TokenTransfer],
    token_infos: &HashMap<Address, TokenInfo>,
    before: &BalanceGrid,
    prices: &HashMap<String, f64>,
) -> Vec<AssetChangeRecord> {
    let mut changes = Vec::with_capacity(transfers.len() + 1);

    let value = request.value.unwrap_or_default();
    if value > U256::ZERO {
        let info = native_token_info();
        changes.push(AssetChangeRecord {
            kind: crate::types::TransferKind::Transfer,
            from: request.from,
            to: request.to,
            amount: value,
            formatted_amount: formatted(value, &info),
            usd_value: usd_value(value, &info, prices),
            from_balance_before: before.get(AssetKey::Native, request.from),
            to_balance_before: request.to.map(|to| before.get(AssetKey::Native, to)),
            token_info: info,
        });
    }

    for transfer in transfers {
        let info = token_infos.get(&transfer.token).cloned().unwrap_or_default();
        let asset = AssetKey::Token(transfer.token);
        changes.push(AssetChangeRecord {
            kind: transfer.kind,
            from: transfer.from,
            to: (!transfer.is_burn()).then_some(transfer.to),
            amount: transfer.amount,
            formatted_amount: formatted(transfer.amount, &info),
            usd_value: usd_value(transfer.amount, &info, prices),
            from_balance_before: before.get(asset, transfer.from),
            to_balance_before: (!transfer.is_burn()).then(|| before.get(asset, transfer.to)),
            token_info: info,
        });
    }
    changes
}

fn formatted(amount: U256, info: &TokenInfo) -> Option<String> {
    let decimals = info.decimals?;
    format_units(amount, decimals).ok()
}

/// `amount / 10^decimals × price`, zero when unpriced or decimals are
/// unknown
fn usd_value(amount: U256, info: &TokenInfo, prices: &HashMap<String, f64>) -> f64 {
    let Some(symbol) = info.symbol.as_deref() else {
        return 0.0;
    };
    let Some(&price) = prices.get(&symbol.to_uppercase()) else {
        return 0.0;
    };
    let Some(units) = formatted(amount, info).and_then(|s| s.parse::<f64>().ok()) else {
        warn!(symbol, "could not format amount for USD valuation");
        return 0.0;
    };
    units * price
}
