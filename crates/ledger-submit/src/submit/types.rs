//! Shared submission types and errors.

use std::fmt;

use thiserror::Error;

use crate::{
    assembler::AssemblyError,
    confirm::ConfirmationError,
    delivery::DeliveryPath,
    providers::{AssuranceLevel, LedgerError},
    signing::{SigningError, TransientSigner},
};

/// Per-attempt submission options.
#[derive(Debug, Default)]
pub struct SubmitOptions {
    /// Transient credential that signs this attempt instead of the primary identity.
    pub transient: Option<TransientSigner>,
    /// Request the direct path even without a transient signer.
    pub ephemeral: bool,
    /// Level the confirmation waiter blocks for.
    pub assurance: AssuranceLevel,
}

impl SubmitOptions {
    /// Standard-path options at the default assurance level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signs with `signer` and delivers directly.
    #[must_use]
    pub fn with_transient_signer(mut self, signer: TransientSigner) -> Self {
        self.transient = Some(signer);
        self
    }

    /// Sets the ephemeral flag.
    #[must_use]
    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    /// Sets the assurance level.
    #[must_use]
    pub fn with_assurance(mut self, assurance: AssuranceLevel) -> Self {
        self.assurance = assurance;
        self
    }
}

/// Externally signed transaction payload accepted by `submit_signed`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SignedTx {
    /// Bincode-serialized `VersionedTransaction` bytes.
    VersionedTransactionBytes(Vec<u8>),
    /// Wire-format transaction bytes.
    WireTransactionBytes(Vec<u8>),
}

impl SignedTx {
    /// Returns the payload bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::VersionedTransactionBytes(bytes) | Self::WireTransactionBytes(bytes) => bytes,
        }
    }
}

/// Pipeline stage at which an attempt failed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum SubmitStage {
    /// Recency fetch or message assembly.
    Assembly,
    /// Signer resolution, local signing, or encoding.
    Signing,
    /// The broadcast call.
    Broadcast,
    /// Waiting for the assurance level.
    Confirmation,
}

impl fmt::Display for SubmitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Assembly => "assembly",
            Self::Signing => "signing",
            Self::Broadcast => "broadcast",
            Self::Confirmation => "confirmation",
        })
    }
}

/// Submission-level errors.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Transaction could not be assembled.
    #[error("assembly failed: {source}")]
    Assembly {
        /// Assembly-stage failure.
        source: AssemblyError,
    },
    /// No valid signer for the requested delivery.
    #[error("signing failed: {source}")]
    Signing {
        /// Signing-stage failure.
        source: SigningError,
    },
    /// Signed transaction could not be serialized.
    #[error("failed to encode signed transaction: {source}")]
    Encode {
        /// Bincode error.
        source: Box<bincode::ErrorKind>,
    },
    /// Signed bytes could not be decoded into a transaction.
    #[error("failed to decode signed transaction bytes: {source}")]
    DecodeSignedBytes {
        /// Bincode decode error.
        source: Box<bincode::ErrorKind>,
    },
    /// Network rejected the broadcast.
    #[error("{path} broadcast failed: {source}")]
    Broadcast {
        /// Path the broadcast used.
        path: DeliveryPath,
        /// Client error.
        source: LedgerError,
    },
    /// Required assurance level was not reached.
    #[error("confirmation failed: {source}")]
    Confirmation {
        /// Confirmation-stage failure.
        source: ConfirmationError,
    },
}

impl SubmitError {
    /// Returns the stage that triggered this failure.
    #[must_use]
    pub const fn stage(&self) -> SubmitStage {
        match self {
            Self::Assembly { .. } => SubmitStage::Assembly,
            Self::Signing { .. } | Self::Encode { .. } | Self::DecodeSignedBytes { .. } => {
                SubmitStage::Signing
            }
            Self::Broadcast { .. } => SubmitStage::Broadcast,
            Self::Confirmation { .. } => SubmitStage::Confirmation,
        }
    }

    /// Message written to the tracker and the error-reporting hook.
    #[must_use]
    pub fn user_message(&self) -> String {
        format!("Transaction failed: {self}")
    }
}
