//! Error types for fork simulation and balance diffing
//!
//! This module defines a closed error taxonomy that covers:
//! - Fork process lifecycle errors
//! - RPC transport and response errors
//! - Call data precondition failures
//! - Soft per-item failures (probes, price lookups)
//!
//! The fatal kinds abort a run (after cleanup). The soft kinds never
//! escape the component that raised them: callers log them and continue
//! with the affected field defaulted.

use thiserror::Error;

/// Top-level error type for the simulation engine
///
/// Encompasses every fatal error that can abort a simulation run,
/// providing a unified error handling interface for callers.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Errors starting or controlling the fork process
    #[error("Fork error: {0}")]
    Fork(#[from] ForkError),

    /// Errors talking to an RPC endpoint
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    /// Malformed call data in the request
    #[error("Invalid call data: {0}")]
    CallData(#[from] CallDataError),
}

/// Fork process lifecycle errors
///
/// These occur while spawning the disposable fork-node child or waiting
/// for it to become ready. All of them are fatal to the run.
#[derive(Debug, Error)]
pub enum ForkError {
    /// The fork-node binary could not be found on PATH
    #[error("Fork node binary '{binary}' not found; install it or point ForkConfig::binary at it")]
    BinaryNotFound {
        binary: String,
    },

    /// Spawning the child process failed for another reason
    #[error("Failed to spawn fork node '{binary}': {reason}")]
    Spawn {
        binary: String,
        reason: String,
    },

    /// The child exited before its RPC endpoint became ready
    #[error("Fork node exited before becoming ready: {output}")]
    Exited {
        output: String,
    },

    /// The readiness retry budget was exhausted
    #[error("Fork node not ready after {attempts} attempts at {endpoint}")]
    ReadyTimeout {
        attempts: u32,
        endpoint: String,
    },

    /// No free local port could be allocated for the fork endpoint
    #[error("Failed to allocate a local port for the fork node: {0}")]
    PortAllocation(String),
}

/// RPC transport and response errors
#[derive(Debug, Error)]
pub enum RpcError {
    /// Invalid or malformed RPC URL
    #[error("Invalid RPC URL '{url}': {reason}")]
    InvalidUrl {
        url: String,
        reason: String,
    },

    /// The transport failed or the endpoint rejected the request
    #[error("RPC request '{method}' failed: {reason}")]
    Transport {
        method: &'static str,
        reason: String,
    },

    /// The endpoint answered with a payload we could not interpret
    #[error("Unexpected response from '{method}': {reason}")]
    UnexpectedResponse {
        method: &'static str,
        reason: String,
    },
}

/// Call data precondition failures
///
/// Request call data must be empty, `"0x"`, or `0x` followed by an even
/// number of hex digits below the size ceiling.
#[derive(Debug, Error)]
pub enum CallDataError {
    /// Missing the `0x` prefix
    #[error("Call data must start with 0x")]
    MissingPrefix,

    /// Odd number of hex digits
    #[error("Call data has odd length {len}")]
    OddLength {
        len: usize,
    },

    /// A character outside [0-9a-fA-F]
    #[error("Call data contains non-hex character at offset {offset}")]
    InvalidHex {
        offset: usize,
    },

    /// Above the hard size ceiling
    #[error("Call data length {len} exceeds ceiling {max}")]
    TooLarge {
        len: usize,
        max: usize,
    },
}

/// Soft failure of a single classification or balance probe
///
/// Raised by token probes and balance reads; callers treat the probed
/// address as "not a token" or the balance as zero, log, and continue.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The trial call itself failed
    #[error("Probe call to {address} failed: {reason}")]
    CallFailed {
        address: String,
        reason: String,
    },

    /// The call succeeded but returned undecodable data
    #[error("Failed to decode probe result from {address}: {reason}")]
    DecodeFailed {
        address: String,
        reason: String,
    },
}

/// Soft failure of a USD price lookup
///
/// Any of these leaves the affected USD fields zero/blank; none abort
/// the run.
#[derive(Debug, Error)]
pub enum PriceError {
    /// No API credential configured; pricing is disabled
    #[error("Price API credential not configured")]
    NoCredential,

    /// The quote endpoint could not be reached or rejected the request
    #[error("Price API request failed: {0}")]
    RequestFailed(String),

    /// The response body did not match the expected quote shape
    #[error("Price API response could not be decoded: {0}")]
    DecodeFailed(String),
}
