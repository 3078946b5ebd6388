//! Integration tests for the diff engine's pure core
//!
//! These tests exercise the public analysis pipeline without a fork
//! node: trace parsing, shape-tolerant transfer extraction, analytic
//! after-balance derivation, diffing, and call-data validation.
//!
//! End-to-end tests that spawn a real fork node live in
//! `anvil_tests.rs` and are ignored by default.

use alloy::primitives::{keccak256, Address, I256, U256};
use fork_sim::diff::{classify_flows, diff, summarize_token_deltas};
use fork_sim::errors::CallDataError;
use fork_sim::simulate::derive_after_balances;
use fork_sim::trace::transfers::extract_transfers;
use fork_sim::trace::{collect_touched, TraceNode};
use fork_sim::types::{AddressKind, AssetKey, BalanceGrid, TransferKind};
use fork_sim::utils::validate_call_data;
use serde_json::{json, Value};
use std::collections::HashMap;

fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

fn transfer_sig() -> String {
    format!("{}", keccak256(b"Transfer(address,address,uint256)"))
}

fn topic(address: Address) -> String {
    format!("0x000000000000000000000000{}", hex::encode(address))
}

fn amount_word(amount: u64) -> String {
    format!("0x{amount:064x}")
}

/// Builds a callTracer-shaped payload for one token transfer, with the
/// log emitted in the requested shape variant.
fn transfer_trace(token: Address, from: Address, to: Address, amount: u64, shape: &str) -> Value {
    let flat = json!({
        "address": format!("{token}"),
        "topics": [transfer_sig(), topic(from), topic(to)],
        "data": amount_word(amount)
    });
    let log = match shape {
        "flat" => flat,
        "nested" => json!({ "raw": flat }),
        "array" => json!([
            format!("{token}"),
            [transfer_sig(), topic(from), topic(to)],
            amount_word(amount)
        ]),
        other => panic!("unknown shape {other}"),
    };
    json!({
        "from": format!("{from}"),
        "to": format!("{token}"),
        "gasUsed": "0xc350",
        "logs": [log]
    })
}

#[test]
fn transfer_extraction_is_shape_invariant() {
    let token = addr(0xaa);
    let from = addr(1);
    let to = addr(2);

    let mut records = Vec::new();
    for shape in ["flat", "nested", "array"] {
        let raw = transfer_trace(token, from, to, 500, shape);
        let root: TraceNode = serde_json::from_value(raw.clone()).unwrap();
        let transfers = extract_transfers(&root, &raw);
        assert_eq!(transfers.len(), 1, "shape {shape} should decode");
        records.push(transfers[0].clone());
    }
    assert_eq!(records[0], records[1]);
    assert_eq!(records[1], records[2]);
    assert_eq!(records[0].token, token);
    assert_eq!(records[0].amount, U256::from(500));
}

#[test]
fn golden_scenario_prior_replay_then_transfer() {
    // Two prior 100-unit transfers out of A have already been replayed
    // onto the fork, so A's before-balance reads 800 of an original
    // 1000. The simulated call moves 50 more from A to B at position 2.
    let token = addr(0xaa);
    let a = addr(0x0a);
    let b = addr(0x0b);

    let mut before = BalanceGrid::new();
    before.set(AssetKey::Token(token), a, U256::from(800));
    before.set(AssetKey::Token(token), b, U256::from(120));

    let raw = transfer_trace(token, a, b, 50, "flat");
    let root: TraceNode = serde_json::from_value(raw.clone()).unwrap();
    assert!(root.error.is_none());
    assert_eq!(root.gas_used_u64(), 50_000);

    let transfers = extract_transfers(&root, &raw);
    assert_eq!(transfers.len(), 1);

    let after = derive_after_balances(&before, &transfers, a, Some(token), U256::ZERO);
    assert_eq!(before.get(AssetKey::Token(token), a), U256::from(800));
    assert_eq!(after.get(AssetKey::Token(token), a), U256::from(750));
    assert_eq!(
        after.get(AssetKey::Token(token), b),
        before.get(AssetKey::Token(token), b) + U256::from(50)
    );

    let deltas = diff(&before, &after);
    assert_eq!(
        deltas[&(AssetKey::Token(token), a)],
        I256::try_from(-50).unwrap()
    );
    assert_eq!(
        deltas[&(AssetKey::Token(token), b)],
        I256::try_from(50).unwrap()
    );
}

#[test]
fn pure_value_transfer_excludes_fee_cost() {
    let from = addr(1);
    let to = addr(2);
    let mut before = BalanceGrid::new();
    before.set(AssetKey::Native, from, U256::from(5));
    before.set(AssetKey::Native, to, U256::ZERO);

    let after = derive_after_balances(&before, &[], from, Some(to), U256::from(1));
    let deltas = diff(&before, &after);
    assert_eq!(deltas[&(AssetKey::Native, from)], I256::try_from(-1).unwrap());
    assert_eq!(deltas[&(AssetKey::Native, to)], I256::try_from(1).unwrap());
    // exactly the two movements; no fee entry
    assert_eq!(deltas.len(), 2);

    let flows = classify_flows(from, &deltas);
    assert_eq!(flows.sent.len(), 1);
    assert_eq!(flows.received.len(), 1);
    assert_eq!(flows.sent[0].address, from);
}

#[test]
fn burn_excluded_from_receiver_crediting() {
    let token = addr(0xaa);
    let holder = addr(1);
    let raw = transfer_trace(token, holder, Address::ZERO, 40, "flat");
    let root: TraceNode = serde_json::from_value(raw.clone()).unwrap();
    let transfers = extract_transfers(&root, &raw);
    assert_eq!(transfers[0].kind, TransferKind::Burn);

    let mut before = BalanceGrid::new();
    before.set(AssetKey::Token(token), holder, U256::from(100));
    let after = derive_after_balances(&before, &transfers, holder, Some(token), U256::ZERO);
    assert_eq!(after.get(AssetKey::Token(token), holder), U256::from(60));
    assert_eq!(after.get(AssetKey::Token(token), Address::ZERO), U256::ZERO);
}

#[test]
fn contract_held_value_shows_in_total_not_per_account() {
    let token = addr(0xaa);
    let eoa = addr(1);
    let vault = addr(2);

    let mut before = BalanceGrid::new();
    let mut after = BalanceGrid::new();
    before.set(AssetKey::Token(token), eoa, U256::from(100));
    after.set(AssetKey::Token(token), eoa, U256::from(0));
    before.set(AssetKey::Token(token), vault, U256::from(0));
    after.set(AssetKey::Token(token), vault, U256::from(100));

    let deltas = diff(&before, &after);
    let mut kinds = HashMap::new();
    kinds.insert(eoa, AddressKind::Eoa);
    kinds.insert(vault, AddressKind::Contract);

    let summaries = summarize_token_deltas(&deltas, &kinds);
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary.total, I256::ZERO);
    // the difference is attributable to the named contract address
    assert!(!summary.per_account.contains_key(&vault));
    assert_eq!(summary.per_account[&eoa], I256::try_from(-100).unwrap());
}

#[test]
fn touched_set_includes_log_only_counterparties() {
    let token = addr(0xaa);
    let from = addr(0x44);
    let to = addr(0x55);
    // neither counterparty is a call target; both ride only in topics
    let raw = json!({
        "from": format!("{}", addr(1)),
        "to": format!("{token}"),
        "logs": [{
            "address": format!("{token}"),
            "topics": [transfer_sig(), topic(from), topic(to)],
            "data": amount_word(10)
        }]
    });
    let root: TraceNode = serde_json::from_value(raw).unwrap();
    let touched = collect_touched(&root);
    assert!(touched.contains(&from));
    assert!(touched.contains(&to));
    assert!(touched.contains(&token));
}

#[test]
fn call_data_validation_table() {
    assert!(validate_call_data(Some("")).is_ok());
    assert!(validate_call_data(Some("0x")).is_ok());
    assert!(matches!(
        validate_call_data(Some("0xabc")),
        Err(CallDataError::OddLength { .. })
    ));
    assert!(matches!(
        validate_call_data(Some("0xzz")),
        Err(CallDataError::InvalidHex { .. })
    ));
    // 4002 characters: accepted (flagged in logs, not rejected)
    let large = format!("0x{}", "00".repeat(2000));
    assert_eq!(large.len(), 4002);
    assert!(validate_call_data(Some(&large)).is_ok());
}
