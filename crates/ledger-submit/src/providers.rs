//! Ledger client contract consumed by the submission pipeline.

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use solana_signature::Signature;
use thiserror::Error;

use crate::builder::{RecencyToken, UnsignedTx};

/// How strongly the network vouches that a transaction is recorded.
///
/// Ordered from weakest to strongest. `Processed` is "submitted": a node has seen the
/// transaction in a block that may still be skipped.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub enum AssuranceLevel {
    /// Included in a block observed by the queried node.
    Processed,
    /// Voted on by a supermajority of stake.
    #[default]
    Confirmed,
    /// Rooted; cannot be rolled back.
    Finalized,
}

impl AssuranceLevel {
    /// Returns the JSON-RPC commitment string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }

    /// Returns true when `self` satisfies `required`.
    #[must_use]
    pub fn satisfies(self, required: Self) -> bool {
        self >= required
    }
}

impl fmt::Display for AssuranceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown assurance level string.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("unknown assurance level `{value}`")]
pub struct ParseAssuranceLevelError {
    /// Rejected input.
    pub value: String,
}

impl FromStr for AssuranceLevel {
    type Err = ParseAssuranceLevelError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "processed" | "submitted" => Ok(Self::Processed),
            "confirmed" => Ok(Self::Confirmed),
            "finalized" => Ok(Self::Finalized),
            _ => Err(ParseAssuranceLevelError {
                value: value.to_owned(),
            }),
        }
    }
}

/// Recency token plus the slot at which it was observed.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RecencyContext {
    /// Blockhash and its expiry height.
    pub token: RecencyToken,
    /// Slot of the node state the token was read from.
    pub context_slot: u64,
}

/// Raw broadcast tuning.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RawBroadcastConfig {
    /// Skip preflight simulation when true.
    pub skip_preflight: bool,
}

impl Default for RawBroadcastConfig {
    fn default() -> Self {
        Self {
            skip_preflight: true,
        }
    }
}

/// Network-reported status of one signature.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SignatureStatus {
    /// Slot the transaction landed in.
    pub slot: u64,
    /// Level reached so far, when the node reports one.
    pub level: Option<AssuranceLevel>,
    /// Execution error reported by the network.
    pub err: Option<String>,
}

/// Transport and RPC errors surfaced by ledger clients.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum LedgerError {
    /// Invalid client configuration.
    #[error("ledger client configuration invalid: {message}")]
    Config {
        /// Human-readable description.
        message: String,
    },
    /// Request could not be delivered or answered.
    #[error("rpc request `{method}` failed: {message}")]
    Request {
        /// RPC method name.
        method: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Node answered with an RPC error object.
    #[error("rpc method `{method}` error {code}: {message}")]
    RpcMethod {
        /// RPC method name.
        method: &'static str,
        /// JSON-RPC error code.
        code: i64,
        /// Node-provided message.
        message: String,
    },
    /// Node answered with a payload that could not be interpreted.
    #[error("rpc method `{method}` returned invalid payload: {message}")]
    InvalidResponse {
        /// RPC method name.
        method: &'static str,
        /// Human-readable description.
        message: String,
    },
    /// Standard path requested but no approval signer is attached.
    #[error("no approval signer is attached to the ledger client")]
    ApprovalUnavailable,
    /// Approval middleware refused to sign.
    #[error("approval rejected: {message}")]
    ApprovalRejected {
        /// Human-readable description.
        message: String,
    },
}

/// Ledger client contract.
///
/// Implementations are shared across attempts and must be safe for concurrent use.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetches the latest blockhash, its expiry height, and the context slot.
    async fn fetch_recency(&self) -> Result<RecencyContext, LedgerError>;

    /// Obtains an approval signature for `tx` and broadcasts it with preflight checks.
    ///
    /// `min_context_slot` bounds how stale the node serving the request may be.
    async fn broadcast_approved(
        &self,
        tx: UnsignedTx,
        min_context_slot: Option<u64>,
    ) -> Result<Signature, LedgerError>;

    /// Broadcasts already-signed wire bytes.
    async fn broadcast_raw(
        &self,
        tx_bytes: &[u8],
        config: &RawBroadcastConfig,
    ) -> Result<Signature, LedgerError>;

    /// Returns the current status of `signature`, or `None` when the node has not seen it.
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, LedgerError>;

    /// Returns the current block height.
    async fn block_height(&self) -> Result<u64, LedgerError>;
}
