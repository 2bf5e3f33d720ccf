//! Signer resolution: transient local credentials versus approval middleware.

use async_trait::async_trait;
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use thiserror::Error;

use crate::{
    builder::{BuilderError, UnsignedTx},
    providers::LedgerError,
};

/// Signing-stage errors.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Local signing failed, usually because the signer is not required by the message.
    #[error("transient signer could not sign: {source}")]
    Signer {
        /// Builder-layer failure.
        source: BuilderError,
    },
    /// Primary identity was needed but none is connected.
    #[error("no primary identity is connected")]
    MissingPrimaryIdentity,
    /// Direct delivery was requested for a transaction nobody signs locally.
    #[error("direct delivery requires a transient signer; the transaction would be broadcast unsigned")]
    UnsignedDirectBroadcast,
    /// Pipeline was configured without transient-signer support.
    #[error("transient signers are not enabled for this pipeline")]
    TransientSignerUnsupported,
    /// Pipeline was configured without direct delivery.
    #[error("direct delivery is not enabled for this pipeline")]
    DirectDeliveryUnsupported,
}

/// One-time credential owned by a single submission attempt.
///
/// Signing consumes the value, so the same credential cannot authorize a second attempt.
#[derive(Debug)]
pub struct TransientSigner {
    /// Throwaway keypair.
    keypair: Keypair,
}

impl TransientSigner {
    /// Wraps a caller-provided keypair.
    #[must_use]
    pub const fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Generates a fresh random credential.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(Keypair::new())
    }

    /// Returns the credential's public identity.
    #[must_use]
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Signs `tx` locally and discards the credential.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Signer`] when the message does not accept this signer alone.
    pub fn sign(self, tx: UnsignedTx) -> Result<VersionedTransaction, SigningError> {
        tx.sign(&[&self.keypair])
            .map_err(|source| SigningError::Signer { source })
    }
}

/// Approval middleware that signs on behalf of the primary identity.
#[async_trait]
pub trait ApprovalSigner: Send + Sync {
    /// Identity whose signature this approver produces.
    fn identity(&self) -> Pubkey;

    /// Requests a signature for `tx`.
    async fn approve(&self, tx: UnsignedTx) -> Result<VersionedTransaction, LedgerError>;
}

/// Approver backed by a local keypair that signs every request.
#[derive(Debug)]
pub struct KeypairApprovalSigner {
    /// Primary identity keypair.
    keypair: Keypair,
}

impl KeypairApprovalSigner {
    /// Creates an approver for `keypair`.
    #[must_use]
    pub const fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

#[async_trait]
impl ApprovalSigner for KeypairApprovalSigner {
    fn identity(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn approve(&self, tx: UnsignedTx) -> Result<VersionedTransaction, LedgerError> {
        tx.sign(&[&self.keypair])
            .map_err(|error| LedgerError::ApprovalRejected {
                message: error.to_string(),
            })
    }
}

/// Which party signs one attempt. Exactly one applies.
#[derive(Debug)]
pub enum SigningPlan {
    /// Sign locally with a transient credential before broadcast.
    Transient(TransientSigner),
    /// Leave signing to the standard path's approval middleware.
    Approval {
        /// Primary identity expected to approve.
        identity: Pubkey,
    },
}

impl SigningPlan {
    /// Resolves the plan from an optional transient signer and the connected identity.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::MissingPrimaryIdentity`] when no transient signer is given and
    /// no primary identity is connected.
    pub fn resolve(
        transient: Option<TransientSigner>,
        primary: Option<Pubkey>,
    ) -> Result<Self, SigningError> {
        match transient {
            Some(signer) => Ok(Self::Transient(signer)),
            None => primary
                .map(|identity| Self::Approval { identity })
                .ok_or(SigningError::MissingPrimaryIdentity),
        }
    }

    /// Identity assigned as fee payer when the skeleton has none.
    #[must_use]
    pub fn default_fee_payer(&self) -> Pubkey {
        match self {
            Self::Transient(signer) => signer.pubkey(),
            Self::Approval { identity } => *identity,
        }
    }

    /// Returns true when a transient credential signs.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
