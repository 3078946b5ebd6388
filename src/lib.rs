//! # Fork-Sim: Transaction Simulator and Balance-Diff Analyzer
//!
//! A library for answering "what would happen if this call executed at
//! this exact point in chain history?" without broadcasting anything.
//! The engine forks a disposable local chain instance at the requested
//! height, reconstructs the exact pre-call account state, evaluates the
//! call through a tracer, and reports native and token balance changes
//! with best-effort USD valuation.
//!
//! ## Core Features
//!
//! - **Disposable Forking**
//!   - Spawned fork-node child per run, fresh ephemeral port
//!   - Snapshot/revert bracketing around evaluation
//!   - Guaranteed teardown on every exit path
//!
//! - **Exact State Positioning**
//!   - Fork at end-of-block state of the preceding block
//!   - Prior transactions replayed by applying their reported state
//!     deltas, never by re-execution
//!
//! - **Balance-Diff Analysis**
//!   - Touched-address discovery from the full call trace
//!   - Speculative token classification and grid balance collection
//!   - Shape-tolerant transfer extraction with strict fallbacks
//!   - Analytic after-balances: the target call is never mined
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fork_sim::{Simulator, SimulatorConfig, SimulateRequest};
//! use alloy::primitives::{address, U256};
//!
//! # async fn example() -> Result<(), fork_sim::SimulationError> {
//! let simulator = Simulator::new(SimulatorConfig::default());
//!
//! let response = simulator
//!     .simulate(SimulateRequest {
//!         fork_source_url: "https://eth-mainnet.g.alchemy.com/v2/your-api-key".into(),
//!         block_number: 21784863,
//!         from: address!("C255fC198eEdAC7AF8aF0f6e0ca781794B094A61"),
//!         to: Some(address!("d878229c9c3575F224784DE610911B5607a3ad15")),
//!         value: Some(U256::from(120000000000000000u64)), // 0.12 ETH
//!         data: None,
//!         transaction_index: None,
//!     })
//!     .await?;
//!
//! println!("status: {:?}, gas used: {}", response.status, response.gas_info.gas_used);
//! for change in &response.asset_changes {
//!     println!(
//!         "{:?} {} from {} (${:.2})",
//!         change.kind, change.amount, change.from, change.usd_value
//!     );
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Structure
//!
//! - `fork`: fork-node process lifecycle and prior-transaction replay
//! - `trace`: call-trace model, log normalization, transfer extraction
//! - `tokens`: token classification and balance collection
//! - `diff`: balance diffing and flow summaries
//! - `price`: best-effort USD pricing
//! - `simulate`: the orchestrator
//! - `types`: core data structures and the request/response contract
//! - `errors`: error types and handling

pub mod diff;
pub mod errors;
pub mod fork;
pub mod price;
pub mod simulate;
pub mod tokens;
pub mod trace;
pub mod types;
pub mod utils;

// Re-export only the essential types and functions
pub use errors::{ForkError, SimulationError};
pub use fork::{ForkConfig, ForkSession};
pub use price::PriceConfig;
pub use simulate::{Simulator, SimulatorConfig};
pub use types::{
    AssetChangeRecord, SimulateRequest, SimulateResponse, SimulationStatus, TokenInfo,
    TokenTransfer,
};
