//! Delivery path selection and the single broadcast call per attempt.

use std::fmt;

use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;

use crate::{
    builder::UnsignedTx,
    providers::{LedgerClient, LedgerError, RawBroadcastConfig},
    signing::{SigningError, SigningPlan},
};

/// Broadcast route for one attempt.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DeliveryPath {
    /// Approval middleware signs; preflight simulation runs.
    Standard,
    /// Pre-signed raw bytes; preflight simulation is skipped.
    Direct,
}

impl DeliveryPath {
    /// Direct when a transient signer or the ephemeral flag is set, otherwise standard.
    #[must_use]
    pub const fn select(use_transient: bool, ephemeral: bool) -> Self {
        if use_transient || ephemeral {
            Self::Direct
        } else {
            Self::Standard
        }
    }

    /// Resolves and validates the path for `signing` before any network call.
    ///
    /// # Errors
    ///
    /// Returns a [`SigningError`] when `capabilities` forbid the requested combination or
    /// when direct delivery would broadcast a transaction nobody signed.
    pub fn plan(
        signing: &SigningPlan,
        ephemeral: bool,
        capabilities: PipelineCapabilities,
    ) -> Result<Self, SigningError> {
        let use_transient = signing.is_transient();
        if use_transient && !capabilities.transient_signer {
            return Err(SigningError::TransientSignerUnsupported);
        }
        let path = Self::select(use_transient, ephemeral);
        if path == Self::Direct {
            if !capabilities.direct_delivery {
                return Err(SigningError::DirectDeliveryUnsupported);
            }
            if !use_transient {
                return Err(SigningError::UnsignedDirectBroadcast);
            }
        }
        Ok(path)
    }
}

impl fmt::Display for DeliveryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Standard => "standard",
            Self::Direct => "direct",
        })
    }
}

/// Features a pipeline instance is allowed to use.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PipelineCapabilities {
    /// Accept transient signers.
    pub transient_signer: bool,
    /// Accept direct raw broadcasts.
    pub direct_delivery: bool,
}

impl PipelineCapabilities {
    /// Standard path only: no transient signers, no direct broadcasts.
    #[must_use]
    pub const fn standard_only() -> Self {
        Self {
            transient_signer: false,
            direct_delivery: false,
        }
    }
}

impl Default for PipelineCapabilities {
    fn default() -> Self {
        Self {
            transient_signer: true,
            direct_delivery: true,
        }
    }
}

/// One broadcast, ready to send.
#[derive(Debug)]
pub enum Broadcast {
    /// Unsigned transaction for the approval middleware.
    Approved {
        /// Transaction awaiting approval.
        unsigned: UnsignedTx,
        /// Staleness bound for the serving node.
        min_context_slot: Option<u64>,
    },
    /// Signed wire bytes.
    Raw {
        /// Bincode-serialized `VersionedTransaction`.
        bytes: Vec<u8>,
        /// Locally computed first signature.
        signature: Option<Signature>,
    },
}

impl Broadcast {
    /// Serializes a signed transaction for the direct path.
    ///
    /// # Errors
    ///
    /// Returns the bincode error when serialization fails.
    pub fn raw(tx: &VersionedTransaction) -> Result<Self, Box<bincode::ErrorKind>> {
        Ok(Self::Raw {
            bytes: bincode::serialize(tx)?,
            signature: tx.signatures.first().copied(),
        })
    }

    /// Path this broadcast travels.
    #[must_use]
    pub const fn path(&self) -> DeliveryPath {
        match self {
            Self::Approved { .. } => DeliveryPath::Standard,
            Self::Raw { .. } => DeliveryPath::Direct,
        }
    }

    /// Sends through `client`. Exactly one client broadcast call is made.
    ///
    /// # Errors
    ///
    /// Returns the client error unchanged; nothing is retried.
    pub async fn send(self, client: &dyn LedgerClient) -> Result<Signature, LedgerError> {
        match self {
            Self::Approved {
                unsigned,
                min_context_slot,
            } => client.broadcast_approved(unsigned, min_context_slot).await,
            Self::Raw { bytes, signature } => {
                let returned = client
                    .broadcast_raw(&bytes, &RawBroadcastConfig::default())
                    .await?;
                if let Some(local) = signature
                    && local != returned
                {
                    tracing::warn!(
                        local = %local,
                        returned = %returned,
                        "node returned a different signature than the one signed locally"
                    );
                }
                Ok(returned)
            }
        }
    }
}
