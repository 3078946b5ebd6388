//! End-to-end tests against a spawned fork node
//!
//! These spawn a real `anvil` child process forking a live endpoint, so
//! they are ignored by default. Run them with:
//!
//! ```sh
//! FORK_SOURCE_URL=https://eth.llamarpc.com cargo test -- --ignored
//! ```
//!
//! Requirements:
//! - `anvil` on PATH (Foundry toolchain)
//! - `FORK_SOURCE_URL` pointing at a mainnet RPC endpoint

use alloy::primitives::{address, Address, U256};
use fork_sim::fork::{ForkConfig, ForkSession};
use fork_sim::{SimulateRequest, SimulationStatus, Simulator, SimulatorConfig};

// USDC on mainnet; a caller with no USDC makes transfers revert
const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
const FRESH_SENDER: Address = address!("00000000000000000000000000000000000a11ce");
const FRESH_RECEIVER: Address = address!("0000000000000000000000000000000000000b0b");

fn fork_source_url() -> String {
    tracing_subscriber::fmt::try_init().ok();
    std::env::var("FORK_SOURCE_URL").expect("set FORK_SOURCE_URL to run anvil tests")
}

async fn recent_block(url: &str) -> u64 {
    use alloy::providers::{Provider, ProviderBuilder};
    let provider = ProviderBuilder::new().connect_http(url.parse().unwrap());
    // a few blocks back so non-archive endpoints can serve state
    provider.get_block_number().await.unwrap().saturating_sub(4)
}

#[ignore]
#[tokio::test(flavor = "multi_thread")]
async fn fork_session_starts_and_tears_down() {
    let url = fork_source_url();
    let block = recent_block(&url).await;

    let session = ForkSession::start(&ForkConfig::default(), &url, block)
        .await
        .unwrap();
    let endpoint = session.endpoint().to_string();
    session.shutdown().await;

    // the child is gone: the endpoint must refuse connections
    let refused = reqwest::get(&endpoint).await;
    assert!(refused.is_err());
}

#[ignore]
#[tokio::test(flavor = "multi_thread")]
async fn pure_value_transfer_succeeds() {
    let url = fork_source_url();
    let block = recent_block(&url).await;
    let simulator = Simulator::new(SimulatorConfig::default());

    let response = simulator
        .simulate(SimulateRequest {
            fork_source_url: url,
            block_number: block,
            from: FRESH_SENDER,
            to: Some(FRESH_RECEIVER),
            value: Some(U256::from(1)),
            data: None,
            transaction_index: None,
        })
        .await
        .unwrap();

    assert_eq!(response.status, SimulationStatus::Success);
    assert_eq!(response.asset_changes.len(), 1);
    let change = &response.asset_changes[0];
    assert_eq!(change.from, FRESH_SENDER);
    assert_eq!(change.to, Some(FRESH_RECEIVER));
    assert_eq!(change.amount, U256::from(1));
}

#[ignore]
#[tokio::test(flavor = "multi_thread")]
async fn reverted_call_reports_empty_changes() {
    let url = fork_source_url();
    let block = recent_block(&url).await;
    let simulator = Simulator::new(SimulatorConfig::default());

    // transfer(receiver, 1e18 units) from an account holding no USDC
    let data = format!(
        "0xa9059cbb000000000000000000000000{}{:064x}",
        hex::encode(FRESH_RECEIVER),
        U256::from(10u64).pow(U256::from(18u64)),
    );

    let response = simulator
        .simulate(SimulateRequest {
            fork_source_url: url,
            block_number: block,
            from: FRESH_SENDER,
            to: Some(USDC),
            value: None,
            data: Some(data),
            transaction_index: None,
        })
        .await
        .unwrap();

    assert_eq!(response.status, SimulationStatus::Reverted);
    assert!(response.token_transfers.is_empty());
    assert!(response.asset_changes.is_empty());
}

#[ignore]
#[tokio::test(flavor = "multi_thread")]
async fn positioned_simulation_replays_prior_deltas() {
    let url = fork_source_url();
    let block = recent_block(&url).await;
    let simulator = Simulator::new(SimulatorConfig::default());

    // position 2 inside the block: the engine forks at block-1 and
    // replays the first two transactions' reported deltas
    let response = simulator
        .simulate(SimulateRequest {
            fork_source_url: url,
            block_number: block,
            from: FRESH_SENDER,
            to: Some(FRESH_RECEIVER),
            value: Some(U256::from(1)),
            data: None,
            transaction_index: Some(2),
        })
        .await
        .unwrap();

    assert_eq!(response.status, SimulationStatus::Success);
}
