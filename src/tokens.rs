//! Token classification and balance collection
//!
//! Classification is speculative, not registry-based: an address counts
//! as a fungible token if a trial `balanceOf(address(0))` read decodes,
//! or failing that if any of the standard metadata reads do. A failed
//! probe means "not a token", never an error.
//!
//! Balance collection covers the full (token, address) grid plus the
//! native balance of every address. The reads are independent and are
//! issued with bounded concurrency; a single failed read defaults to
//! zero and is logged.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use futures::future::FutureExt;
use futures::{stream, StreamExt};
use tracing::warn;

use crate::errors::ProbeError;
use crate::types::{AddressKind, AssetKey, BalanceGrid, TokenInfo};

// Standard fungible-token read surface
sol! {
    function name() public returns (string);
    function symbol() public returns (string);
    function decimals() public returns (uint8);
    function balanceOf(address owner) public returns (uint256);
}

async fn eth_call(
    provider: &DynProvider,
    to: Address,
    data: Vec<u8>,
) -> Result<Bytes, ProbeError> {
    let request = TransactionRequest::default()
        .with_to(to)
        .with_input(data);
    provider
        .call(request)
        .await
        .map_err(|e| ProbeError::CallFailed {
            address: to.to_string(),
            reason: e.to_string(),
        })
}

async fn read_symbol(provider: &DynProvider, token: Address) -> Option<String> {
    let ret = eth_call(provider, token, symbolCall {}.abi_encode()).await.ok()?;
    symbolCall::abi_decode_returns(&ret).ok()
}

async fn read_name(provider: &DynProvider, token: Address) -> Option<String> {
    let ret = eth_call(provider, token, nameCall {}.abi_encode()).await.ok()?;
    nameCall::abi_decode_returns(&ret).ok()
}

async fn read_decimals(provider: &DynProvider, token: Address) -> Option<u8> {
    let ret = eth_call(provider, token, decimalsCall {}.abi_encode()).await.ok()?;
    decimalsCall::abi_decode_returns(&ret).ok()
}

/// Reads one token balance
pub async fn token_balance(
    provider: &DynProvider,
    token: Address,
    owner: Address,
) -> Result<U256, ProbeError> {
    let ret = eth_call(provider, token, balanceOfCall { owner }.abi_encode()).await?;
    balanceOfCall::abi_decode_returns(&ret).map_err(|e| ProbeError::DecodeFailed {
        address: token.to_string(),
        reason: e.to_string(),
    })
}

/// Probes whether an address behaves like a fungible-token contract
///
/// Returns the best-effort metadata on a hit; `None` (not an error) on
/// a miss. The trial read is `balanceOf(address(0))`; metadata reads
/// serve both as a secondary classification signal and as the returned
/// fields, each individually optional.
pub async fn classify_token(provider: &DynProvider, address: Address) -> Option<TokenInfo> {
    let balance_of_ok = token_balance(provider, address, Address::ZERO).await.is_ok();
    let symbol = read_symbol(provider, address).await;
    let name = read_name(provider, address).await;
    let decimals = read_decimals(provider, address).await;

    if !balance_of_ok && symbol.is_none() && name.is_none() && decimals.is_none() {
        return None;
    }
    Some(TokenInfo {
        symbol,
        name,
        decimals,
    })
}

/// Whether an address carries code
///
/// A failed code read defaults to EOA and is logged; the address then
/// simply appears in per-account summaries.
pub async fn address_kind(provider: &DynProvider, address: Address) -> AddressKind {
    match provider.get_code_at(address).await {
        Ok(code) if !code.is_empty() => AddressKind::Contract,
        Ok(_) => AddressKind::Eoa,
        Err(err) => {
            warn!(%address, %err, "code probe failed, assuming EOA");
            AddressKind::Eoa
        }
    }
}

/// Collects the full balance grid: native balances for every address
/// and token balances for every (token, address) pair
///
/// Probes run with bounded concurrency; completion order is irrelevant.
/// Individual failures default to zero.
pub async fn collect_balances(
    provider: &DynProvider,
    tokens: &[Address],
    addresses: &[Address],
    concurrency: usize,
) -> BalanceGrid {
    let mut probes = Vec::with_capacity(addresses.len() * (tokens.len() + 1));

    for &address in addresses {
        let provider = provider.clone();
        probes.push(
            async move {
                let balance = match provider.get_balance(address).await {
                    Ok(balance) => balance,
                    Err(err) => {
                        warn!(%address, %err, "native balance read failed, defaulting to zero");
                        U256::ZERO
                    }
                };
                ((AssetKey::Native, address), balance)
            }
            .boxed(),
        );
    }
    for &token in tokens {
        for &address in addresses {
            let provider = provider.clone();
            probes.push(
                async move {
                    let balance = match token_balance(&provider, token, address).await {
                        Ok(balance) => balance,
                        Err(err) => {
                            warn!(%token, %address, %err, "token balance read failed, defaulting to zero");
                            U256::ZERO
                        }
                    };
                    ((AssetKey::Token(token), address), balance)
                }
                .boxed(),
            );
        }
    }

    let results: Vec<((AssetKey, Address), U256)> = stream::iter(probes)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut grid = BalanceGrid::new();
    for ((asset, address), balance) in results {
        grid.set(asset, address, balance);
    }
    grid
}
