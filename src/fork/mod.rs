//! Disposable fork-node lifecycle management
//!
//! A [`ForkSession`] owns one spawned fork-node child process and the
//! RPC connection to it. Sessions are exclusive to one simulation run:
//! each spawn binds a fresh ephemeral localhost port, so concurrent
//! runs never collide on a shared endpoint. Teardown (snapshot revert,
//! process kill) runs on every exit path; `kill_on_drop` backstops the
//! child if the session is dropped without an explicit shutdown.

pub mod replay;

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::U256;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::json_rpc::RpcRecv;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::errors::{ForkError, RpcError};
use crate::types::StateDelta;

/// Configuration for spawning the fork-node child
#[derive(Debug, Clone)]
pub struct ForkConfig {
    /// Fork-node binary name or path
    pub binary: String,
    /// Readiness polling attempts before declaring failure
    pub ready_attempts: u32,
    /// Fixed backoff between readiness attempts
    pub ready_interval: Duration,
    /// Additional arguments appended to the spawn command
    pub extra_args: Vec<String>,
}

impl Default for ForkConfig {
    fn default() -> Self {
        Self {
            binary: "anvil".to_string(),
            ready_attempts: 5,
            ready_interval: Duration::from_millis(500),
            extra_args: Vec::new(),
        }
    }
}

/// Connects an HTTP provider to an RPC endpoint
pub(crate) fn connect(rpc_url: &str) -> Result<DynProvider, RpcError> {
    let url = rpc_url.parse().map_err(|_| RpcError::InvalidUrl {
        url: rpc_url.to_string(),
        reason: "failed to parse".to_string(),
    })?;
    Ok(ProviderBuilder::new().connect_http(url).erased())
}

/// Owned handle to one disposable fork-node process and its connection
pub struct ForkSession {
    child: Child,
    provider: DynProvider,
    endpoint: String,
    snapshot: Option<U256>,
}

impl ForkSession {
    /// Spawns a fork node mirroring `fork_source_url` at `fork_at_block`
    /// and waits for its RPC endpoint to become ready
    ///
    /// Failure classes are distinguished: missing binary, child exited
    /// before ready (with captured process output), and readiness
    /// timeout. All are fatal; no child is left running on any of them.
    pub async fn start(
        config: &ForkConfig,
        fork_source_url: &str,
        fork_at_block: u64,
    ) -> Result<Self, ForkError> {
        let port = allocate_port()?;
        let endpoint = format!("http://127.0.0.1:{port}");

        let mut child = Command::new(&config.binary)
            .arg("--port")
            .arg(port.to_string())
            .arg("--fork-url")
            .arg(fork_source_url)
            .arg("--fork-block-number")
            .arg(fork_at_block.to_string())
            .arg("--steps-tracing")
            .args(&config.extra_args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ForkError::BinaryNotFound {
                        binary: config.binary.clone(),
                    }
                } else {
                    ForkError::Spawn {
                        binary: config.binary.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        // the child logs every RPC request; without readers on these
        // pipes it would eventually block on a full pipe buffer
        let stdout = drain_pipe(child.stdout.take());
        let stderr = drain_pipe(child.stderr.take());

        let provider = connect(&endpoint).map_err(|e| ForkError::Spawn {
            binary: config.binary.clone(),
            reason: e.to_string(),
        })?;

        for attempt in 1..=config.ready_attempts {
            if let Ok(Some(status)) = child.try_wait() {
                // let the drain tasks flush what the child last wrote
                sleep(Duration::from_millis(50)).await;
                return Err(ForkError::Exited {
                    output: format!(
                        "{status}; stdout: {}; stderr: {}",
                        captured(&stdout),
                        captured(&stderr),
                    ),
                });
            }
            match provider.get_chain_id().await {
                Ok(chain_id) => {
                    debug!(%endpoint, chain_id, fork_at_block, "fork node ready");
                    return Ok(Self {
                        child,
                        provider,
                        endpoint,
                        snapshot: None,
                    });
                }
                Err(err) => {
                    debug!(%endpoint, attempt, %err, "fork node not ready yet");
                    sleep(config.ready_interval).await;
                }
            }
        }

        child.kill().await.ok();
        Err(ForkError::ReadyTimeout {
            attempts: config.ready_attempts,
            endpoint,
        })
    }

    /// The fork's RPC endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Provider connected to the fork
    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }

    async fn rpc<R: RpcRecv>(&self, method: &'static str, params: Value) -> Result<R, RpcError> {
        self.provider
            .raw_request(method.into(), params)
            .await
            .map_err(|e| RpcError::Transport {
                method,
                reason: e.to_string(),
            })
    }

    /// Takes a state checkpoint on the fork
    pub async fn snapshot(&mut self) -> Result<U256, RpcError> {
        let id: U256 = self.rpc("evm_snapshot", json!([])).await?;
        self.snapshot = Some(id);
        Ok(id)
    }

    /// Rolls the fork back to a checkpoint
    pub async fn revert(&mut self, id: U256) -> Result<(), RpcError> {
        let reverted: bool = self.rpc("evm_revert", json!([id])).await?;
        if !reverted {
            return Err(RpcError::UnexpectedResponse {
                method: "evm_revert",
                reason: format!("snapshot {id} was not reverted"),
            });
        }
        Ok(())
    }

    /// Reverts the last checkpoint taken by [`Self::snapshot`], if any
    pub async fn revert_snapshot(&mut self) {
        if let Some(id) = self.snapshot.take() {
            if let Err(err) = self.revert(id).await {
                warn!(%err, "failed to revert fork snapshot");
            }
        }
    }

    /// Injects one reported state delta onto the fork's accounts
    ///
    /// Fields apply in a fixed order: balance, then nonce, then storage
    /// slots. Callers must await each delta before computing the next
    /// one; the cumulative fork state feeds subsequent traces.
    pub async fn apply_state_delta(&self, delta: &StateDelta) -> Result<(), RpcError> {
        if let Some(balance) = delta.balance {
            let _: Value = self
                .rpc("anvil_setBalance", json!([delta.address, balance]))
                .await?;
        }
        if let Some(nonce) = delta.nonce {
            let _: Value = self
                .rpc(
                    "anvil_setNonce",
                    json!([delta.address, format!("0x{nonce:x}")]),
                )
                .await?;
        }
        for (slot, value) in &delta.storage {
            let _: Value = self
                .rpc("anvil_setStorageAt", json!([delta.address, slot, value]))
                .await?;
        }
        Ok(())
    }

    /// Evaluates a call on the fork with the call tracer, without
    /// mining it
    ///
    /// Returns the raw tracer payload; the caller parses the frame tree
    /// out of it and keeps the raw value for fallback extraction.
    pub async fn trace_call(&self, call: Value) -> Result<Value, RpcError> {
        self.rpc(
            "debug_traceCall",
            json!([
                call,
                "latest",
                { "tracer": "callTracer", "tracerConfig": { "withLog": true } }
            ]),
        )
        .await
    }

    /// Tears the session down: revert the open snapshot (best effort)
    /// and terminate the child process
    ///
    /// Must run on every exit path; callers invoke it from both the
    /// success and the error arm. Dropping an un-shut-down session
    /// still kills the child via `kill_on_drop`.
    pub async fn shutdown(mut self) {
        self.revert_snapshot().await;
        if let Err(err) = self.child.kill().await {
            warn!(%err, endpoint = %self.endpoint, "failed to kill fork node");
        }
        debug!(endpoint = %self.endpoint, "fork session closed");
    }
}

/// Most recent child output retained per pipe for diagnostics
const OUTPUT_CAPTURE_LIMIT: usize = 64 * 1024;

type OutputBuffer = Arc<Mutex<Vec<u8>>>;

/// Continuously drains one child pipe into a bounded buffer
///
/// The reader task runs for the child's whole lifetime and exits when
/// the pipe closes; only the tail of the output is retained.
fn drain_pipe(reader: Option<impl AsyncRead + Unpin + Send + 'static>) -> OutputBuffer {
    let buffer: OutputBuffer = Arc::new(Mutex::new(Vec::new()));
    let Some(mut reader) = reader else {
        return buffer;
    };
    let sink = buffer.clone();
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(&chunk[..n]);
                        if buf.len() > OUTPUT_CAPTURE_LIMIT {
                            let excess = buf.len() - OUTPUT_CAPTURE_LIMIT;
                            buf.drain(..excess);
                        }
                    }
                }
            }
        }
    });
    buffer
}

fn captured(buffer: &OutputBuffer) -> String {
    buffer
        .lock()
        .map(|buf| String::from_utf8_lossy(&buf).trim().to_string())
        .unwrap_or_default()
}

fn allocate_port() -> Result<u16, ForkError> {
    // bind-then-drop; the kernel hands out a free ephemeral port
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| ForkError::PortAllocation(e.to_string()))?;
    let port = listener
        .local_addr()
        .map_err(|e| ForkError::PortAllocation(e.to_string()))?
        .port();
    Ok(port)
}
