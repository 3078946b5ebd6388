//! Core types for fork simulation and balance diffing
//!
//! This module defines the data structures used throughout the engine:
//! - Token metadata and transfer records
//! - Touched-address classification
//! - Balance grids and signed diffs
//! - The public request/response contract
//! - Typed state deltas reported by transaction tracing

use std::collections::{BTreeMap, HashMap};

pub use alloy::primitives::{Address, Bytes, B256, I256, U256};
use serde::{Deserialize, Serialize};

/// Best-effort token metadata; any field may be absent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    /// Token symbol (e.g. "USDC"), if readable
    pub symbol: Option<String>,
    /// Token name, if readable
    pub name: Option<String>,
    /// Decimal places, if readable
    pub decimals: Option<u8>,
}

/// Whether an account carries code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressKind {
    /// Externally-owned account (no code)
    Eoa,
    /// Contract account
    Contract,
}

/// An account referenced directly or indirectly by the evaluated call
#[derive(Debug, Clone, Serialize)]
pub struct TouchedAddress {
    /// The account address
    pub address: Address,
    /// EOA or contract
    pub kind: AddressKind,
    /// Token metadata when the address classified as a fungible token
    pub token: Option<TokenInfo>,
}

/// Kind of a decoded token movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferKind {
    /// Regular transfer between two accounts
    Transfer,
    /// Transfer to the zero address, destroying tokens
    Burn,
}

/// Record of a decoded token transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenTransfer {
    /// Token contract address
    pub token: Address,
    /// Sender
    pub from: Address,
    /// Receiver (the zero address for burns)
    pub to: Address,
    /// Amount in the token's smallest unit
    pub amount: U256,
    /// Transfer or burn
    pub kind: TransferKind,
}

impl TokenTransfer {
    /// True when the destination is the zero address
    pub fn is_burn(&self) -> bool {
        matches!(self.kind, TransferKind::Burn)
    }
}

/// Key of one asset dimension in a balance grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AssetKey {
    /// The chain's native currency
    Native,
    /// A fungible token contract
    Token(Address),
}

/// Balance snapshot over the (asset, address) grid
///
/// Exists in "before" and "after" variants. Missing entries read as zero,
/// so diffing two grids is a total function over the union of their keys.
#[derive(Debug, Clone, Default)]
pub struct BalanceGrid {
    entries: HashMap<(AssetKey, Address), U256>,
}

impl BalanceGrid {
    /// Creates an empty grid
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance at (asset, address), zero when absent
    pub fn get(&self, asset: AssetKey, address: Address) -> U256 {
        self.entries
            .get(&(asset, address))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Sets the balance at (asset, address)
    pub fn set(&mut self, asset: AssetKey, address: Address, balance: U256) {
        self.entries.insert((asset, address), balance);
    }

    /// Adds `amount` to the entry, starting from zero when absent
    pub fn credit(&mut self, asset: AssetKey, address: Address, amount: U256) {
        let current = self.get(asset, address);
        self.set(asset, address, current.saturating_add(amount));
    }

    /// Subtracts `amount` from the entry, saturating at zero
    pub fn debit(&mut self, asset: AssetKey, address: Address, amount: U256) {
        let current = self.get(asset, address);
        self.set(asset, address, current.saturating_sub(amount));
    }

    /// Iterator over present entries
    pub fn iter(&self) -> impl Iterator<Item = (&(AssetKey, Address), &U256)> {
        self.entries.iter()
    }

    /// All keys present in either this grid or `other`
    pub fn union_keys(&self, other: &BalanceGrid) -> Vec<(AssetKey, Address)> {
        let mut keys: Vec<_> = self
            .entries
            .keys()
            .chain(other.entries.keys())
            .copied()
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Number of present entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are present
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Signed per-entry balance change; only non-zero entries are retained
pub type BalanceDiff = HashMap<(AssetKey, Address), I256>;

/// Per-token delta summary
///
/// `per_account` is restricted to externally-owned accounts; `total`
/// still counts contract-held deltas, so a non-zero total with an empty
/// per-account map signals value parked in a contract.
#[derive(Debug, Clone, Serialize)]
pub struct TokenDeltaSummary {
    /// Token contract address
    pub token: Address,
    /// Sum of all deltas for this token, contracts included
    pub total: I256,
    /// Deltas for externally-owned accounts only
    pub per_account: BTreeMap<Address, I256>,
}

/// One categorized asset movement in the response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetChangeRecord {
    /// Metadata of the moved asset
    pub token_info: TokenInfo,
    /// Transfer or burn
    pub kind: TransferKind,
    /// Sender
    pub from: Address,
    /// Receiver; absent for burns
    pub to: Option<Address>,
    /// Amount in the asset's smallest unit
    pub amount: U256,
    /// Human-readable amount when decimals are known
    pub formatted_amount: Option<String>,
    /// USD valuation; 0.0 when no price is available
    pub usd_value: f64,
    /// Sender balance before the call
    pub from_balance_before: U256,
    /// Receiver balance before the call; absent for burns
    pub to_balance_before: Option<U256>,
}

/// Reported before-to-after record of one account's state, produced by
/// tracing a transaction on the origin chain
///
/// Applied onto the fork through an explicit ordered procedure:
/// balance, then nonce, then storage slots.
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    /// Affected account
    pub address: Address,
    /// New balance, if it changed
    pub balance: Option<U256>,
    /// New nonce, if it changed
    pub nonce: Option<u64>,
    /// Changed storage slots
    pub storage: BTreeMap<B256, B256>,
}

impl StateDelta {
    /// True when the delta carries no field to apply
    pub fn is_empty(&self) -> bool {
        self.balance.is_none() && self.nonce.is_none() && self.storage.is_empty()
    }
}

/// Gas accounting of the evaluated call
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasInfo {
    /// Gas consumed by the call according to its trace
    pub gas_used: u64,
}

/// Overall outcome of the evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulationStatus {
    /// The call executed without an error
    Success,
    /// The trace reported an execution error
    Reverted,
}

impl SimulationStatus {
    /// Check if the evaluation succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, SimulationStatus::Success)
    }
}

/// Parameters of one simulation run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    /// Upstream RPC endpoint the fork mirrors
    pub fork_source_url: String,
    /// Block the call is positioned at
    pub block_number: u64,
    /// Caller address
    pub from: Address,
    /// Callee address; absent for creation-style calls
    #[serde(default)]
    pub to: Option<Address>,
    /// Native value to move
    #[serde(default)]
    pub value: Option<U256>,
    /// Hex-encoded call data ("" and "0x" mean empty)
    #[serde(default)]
    pub data: Option<String>,
    /// Position inside the block; when set, prior transactions are replayed
    #[serde(default)]
    pub transaction_index: Option<usize>,
}

/// Structured report of one simulation run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    /// SUCCESS or REVERTED
    pub status: SimulationStatus,
    /// Gas accounting from the trace
    pub gas_info: GasInfo,
    /// Reason reported by the deepest errored frame, when reverted
    pub revert_reason: Option<String>,
    /// Decoded token movements (empty when reverted)
    pub token_transfers: Vec<TokenTransfer>,
    /// Categorized asset changes (empty when reverted)
    pub asset_changes: Vec<AssetChangeRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_missing_entries_read_zero() {
        let grid = BalanceGrid::new();
        assert_eq!(grid.get(AssetKey::Native, Address::ZERO), U256::ZERO);
    }

    #[test]
    fn grid_debit_saturates_at_zero() {
        let mut grid = BalanceGrid::new();
        let addr = Address::repeat_byte(1);
        grid.set(AssetKey::Native, addr, U256::from(5));
        grid.debit(AssetKey::Native, addr, U256::from(10));
        assert_eq!(grid.get(AssetKey::Native, addr), U256::ZERO);
    }

    #[test]
    fn union_keys_covers_both_grids() {
        let mut before = BalanceGrid::new();
        let mut after = BalanceGrid::new();
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        before.set(AssetKey::Native, a, U256::from(1));
        after.set(AssetKey::Native, b, U256::from(2));
        let keys = before.union_keys(&after);
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&(AssetKey::Native, a)));
        assert!(keys.contains(&(AssetKey::Native, b)));
    }

    #[test]
    fn request_deserializes_from_camel_case() {
        let req: SimulateRequest = serde_json::from_str(
            r#"{
                "forkSourceUrl": "http://localhost:8545",
                "blockNumber": 100,
                "from": "0x0000000000000000000000000000000000000001",
                "to": "0x0000000000000000000000000000000000000002",
                "transactionIndex": 2
            }"#,
        )
        .unwrap();
        assert_eq!(req.block_number, 100);
        assert_eq!(req.transaction_index, Some(2));
        assert!(req.data.is_none());
    }
}
