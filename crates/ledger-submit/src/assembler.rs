//! Fills the recency token and fee payer on a caller-provided skeleton.

use solana_pubkey::Pubkey;
use thiserror::Error;

use crate::{
    builder::{BuilderError, RecencyToken, TxBuilder, UnsignedTx},
    providers::{LedgerClient, LedgerError},
};

/// Transaction ready for signing.
#[derive(Debug, Clone)]
pub struct PreparedTx {
    /// Fully populated unsigned transaction.
    pub unsigned: UnsignedTx,
    /// Recency token embedded in the message; its height bounds confirmation.
    pub recency: RecencyToken,
    /// Context slot from the recency fetch, when one was made.
    pub min_context_slot: Option<u64>,
}

/// Assembly-stage errors.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// Recency fetch failed.
    #[error("failed to fetch recent blockhash: {source}")]
    FetchRecency {
        /// Client error, unchanged.
        source: LedgerError,
    },
    /// Skeleton could not be turned into a message.
    #[error("failed to build transaction message: {source}")]
    Build {
        /// Builder-layer failure.
        source: BuilderError,
    },
}

/// Completes `skeleton` without overwriting fields the caller already set.
///
/// The network is queried only when the skeleton carries no recency token.
///
/// # Errors
///
/// Returns [`AssemblyError::FetchRecency`] when the recency fetch fails.
pub async fn assemble(
    skeleton: TxBuilder,
    default_fee_payer: Pubkey,
    client: &dyn LedgerClient,
) -> Result<PreparedTx, AssemblyError> {
    let (skeleton, recency, min_context_slot) = match skeleton.recency() {
        Some(recency) => (skeleton, recency, None),
        None => {
            let context = client
                .fetch_recency()
                .await
                .map_err(|source| AssemblyError::FetchRecency { source })?;
            tracing::debug!(
                blockhash = %context.token.blockhash,
                last_valid_block_height = context.token.last_valid_block_height,
                context_slot = context.context_slot,
                "fetched recency token"
            );
            (
                skeleton.with_recency(context.token),
                context.token,
                Some(context.context_slot),
            )
        }
    };
    let skeleton = match skeleton.fee_payer() {
        Some(_) => skeleton,
        None => skeleton.with_fee_payer(default_fee_payer),
    };
    tracing::trace!(
        instructions = skeleton.instructions().len(),
        fee_payer = ?skeleton.fee_payer(),
        "assembling transaction"
    );
    let unsigned = skeleton
        .build_unsigned()
        .map_err(|source| AssemblyError::Build { source })?;
    Ok(PreparedTx {
        unsigned,
        recency,
        min_context_slot,
    })
}
