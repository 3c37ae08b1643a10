//! Error kinds (spec §7)
//!
//! `ValidationError` (chain/token/amount/EMI) is deliberately not here: it is
//! a normal orchestrator outcome surfaced as `Response::Rejected`, not a
//! failure a caller needs to `?`-propagate past.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy document not found at {path}")]
    NotFound { path: String },
    #[error("policy document malformed: {reason}")]
    Malformed { reason: String },
    #[error("policy invariant violated: {which}")]
    InvariantViolated { which: String },
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("payment record not found: {payment_id}")]
    NotFound { payment_id: String },
    #[error("payment record already exists: {payment_id}")]
    Conflict { payment_id: String },
    #[error("record store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("record store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Transient vs fatal RPC failure. Transient errors are retried by the
/// caller until the monitor deadline; fatal errors end the monitor in
/// `error` immediately (spec §7).
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transient rpc error: {0}")]
    Transient(String),
    #[error("fatal rpc error: {0}")]
    Fatal(String),
}

impl RpcError {
    /// Classifies a failure surfaced by a chain adapter call as transient
    /// (retried by the caller until the monitor deadline) or fatal (missing
    /// configuration, ends the monitor in `error` immediately) — spec
    /// §4.D.1 failure semantics.
    pub fn classify(err: &eyre::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("no rpc configuration") || msg.contains("no token address configured") {
            RpcError::Fatal(msg)
        } else {
            RpcError::Transient(msg)
        }
    }
}

#[derive(Debug, Error)]
pub enum TxError {
    #[error("solana transaction failed: {reason}")]
    Failed { reason: String },
}

#[derive(Debug, Error)]
#[error("no match found within deadline")]
pub struct TimeoutError;
