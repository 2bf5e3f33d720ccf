//! Submission pipeline: assemble, sign, broadcast, confirm, record.

use std::sync::Arc;

use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use tokio::sync::watch;

use super::{SignedTx, SubmitError, SubmitOptions};
use crate::{
    assembler::assemble,
    builder::{RecencyToken, TxBuilder},
    confirm::{ConfirmationConfig, ConfirmationWaiter},
    delivery::{Broadcast, DeliveryPath, PipelineCapabilities},
    hooks::{NoopObserver, SubmissionObserver},
    providers::{AssuranceLevel, LedgerClient},
    signing::{SigningError, SigningPlan},
    state::{AttemptGuard, SubmissionState, SubmissionTracker},
};

/// Caller-facing submission pipeline.
///
/// One instance serves one caller session. Attempts on the same instance are expected to be
/// serialized by the caller; overlapping attempts overwrite each other's state.
pub struct SubmitPipeline {
    /// Ledger connection shared read-only across attempts.
    client: Arc<dyn LedgerClient>,
    /// Connected primary identity, if any.
    primary_identity: Option<Pubkey>,
    /// Enabled signer and delivery features.
    capabilities: PipelineCapabilities,
    /// Confirmation polling.
    waiter: ConfirmationWaiter,
    /// Caller-visible submission state.
    tracker: Arc<SubmissionTracker>,
    /// Data-layer hooks.
    observer: Arc<dyn SubmissionObserver>,
}

impl SubmitPipeline {
    /// Creates a pipeline with all capabilities enabled and no primary identity.
    #[must_use]
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self {
            client,
            primary_identity: None,
            capabilities: PipelineCapabilities::default(),
            waiter: ConfirmationWaiter::default(),
            tracker: Arc::new(SubmissionTracker::new()),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Sets the connected primary identity.
    #[must_use]
    pub const fn with_primary_identity(mut self, identity: Pubkey) -> Self {
        self.primary_identity = Some(identity);
        self
    }

    /// Sets enabled capabilities.
    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: PipelineCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sets confirmation polling tuning.
    #[must_use]
    pub fn with_confirmation_config(mut self, config: ConfirmationConfig) -> Self {
        self.waiter = ConfirmationWaiter::new(config);
        self
    }

    /// Shares an existing tracker, for example one already bound to a view.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Arc<SubmissionTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Sets data-layer hooks.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn SubmissionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the tracker.
    #[must_use]
    pub fn tracker(&self) -> &Arc<SubmissionTracker> {
        &self.tracker
    }

    /// True while an attempt is in flight.
    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.tracker.is_submitting()
    }

    /// Failure message of the last attempt.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.tracker.last_error()
    }

    /// Signature of the last successful attempt.
    #[must_use]
    pub fn last_success(&self) -> Option<Signature> {
        self.tracker.last_success()
    }

    /// Subscribes to state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.tracker.subscribe()
    }

    /// Runs one attempt and returns the signature, or `None` on any failure.
    ///
    /// The failure itself is available from [`Self::last_error`] and the observer.
    pub async fn submit(&self, tx: TxBuilder, options: SubmitOptions) -> Option<Signature> {
        self.try_submit(tx, options).await.ok()
    }

    /// Runs one attempt and returns the typed outcome.
    ///
    /// State and hooks are updated exactly as for [`Self::submit`].
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] naming the failing stage.
    pub async fn try_submit(
        &self,
        tx: TxBuilder,
        options: SubmitOptions,
    ) -> Result<Signature, SubmitError> {
        let guard = self.tracker.begin_observed(self.observer.clone());
        let outcome = self.run_attempt(tx, options).await;
        Self::settle(guard, outcome)
    }

    /// Submits an externally signed transaction on the direct path.
    ///
    /// `last_valid_block_height` is the expiry of the blockhash the transaction was signed
    /// over.
    pub async fn submit_signed(
        &self,
        signed_tx: SignedTx,
        last_valid_block_height: u64,
        assurance: AssuranceLevel,
    ) -> Option<Signature> {
        self.try_submit_signed(signed_tx, last_valid_block_height, assurance)
            .await
            .ok()
    }

    /// Typed variant of [`Self::submit_signed`].
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError`] naming the failing stage.
    pub async fn try_submit_signed(
        &self,
        signed_tx: SignedTx,
        last_valid_block_height: u64,
        assurance: AssuranceLevel,
    ) -> Result<Signature, SubmitError> {
        let guard = self.tracker.begin_observed(self.observer.clone());
        let outcome = self
            .run_signed(signed_tx, last_valid_block_height, assurance)
            .await;
        Self::settle(guard, outcome)
    }

    /// Assemble, sign, broadcast, confirm.
    async fn run_attempt(
        &self,
        tx: TxBuilder,
        options: SubmitOptions,
    ) -> Result<Signature, SubmitError> {
        let SubmitOptions {
            transient,
            ephemeral,
            assurance,
        } = options;
        let signing = SigningPlan::resolve(transient, self.primary_identity)
            .map_err(|source| SubmitError::Signing { source })?;
        let path = DeliveryPath::plan(&signing, ephemeral, self.capabilities)
            .map_err(|source| SubmitError::Signing { source })?;
        tracing::debug!(path = %path, assurance = %assurance, "submission attempt started");

        let prepared = assemble(tx, signing.default_fee_payer(), self.client.as_ref())
            .await
            .map_err(|source| SubmitError::Assembly { source })?;
        let broadcast = match signing {
            SigningPlan::Transient(signer) => {
                let signed = signer
                    .sign(prepared.unsigned)
                    .map_err(|source| SubmitError::Signing { source })?;
                Broadcast::raw(&signed).map_err(|source| SubmitError::Encode { source })?
            }
            SigningPlan::Approval { .. } => Broadcast::Approved {
                unsigned: prepared.unsigned,
                min_context_slot: prepared.min_context_slot,
            },
        };

        let signature = self.broadcast(broadcast).await?;
        self.confirm(signature, prepared.recency, assurance).await
    }

    /// Decode, broadcast raw, confirm.
    async fn run_signed(
        &self,
        signed_tx: SignedTx,
        last_valid_block_height: u64,
        assurance: AssuranceLevel,
    ) -> Result<Signature, SubmitError> {
        if !self.capabilities.direct_delivery {
            return Err(SubmitError::Signing {
                source: SigningError::DirectDeliveryUnsupported,
            });
        }
        let bytes = signed_tx.into_bytes();
        let tx: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|source| SubmitError::DecodeSignedBytes { source })?;
        if !is_fully_signed(&tx) {
            return Err(SubmitError::Signing {
                source: SigningError::UnsignedDirectBroadcast,
            });
        }
        let recency = RecencyToken::new(*tx.message.recent_blockhash(), last_valid_block_height);
        let broadcast = Broadcast::Raw {
            bytes,
            signature: tx.signatures.first().copied(),
        };
        let signature = self.broadcast(broadcast).await?;
        self.confirm(signature, recency, assurance).await
    }

    /// Makes the single broadcast call of an attempt.
    async fn broadcast(&self, broadcast: Broadcast) -> Result<Signature, SubmitError> {
        let path = broadcast.path();
        let signature = broadcast
            .send(self.client.as_ref())
            .await
            .map_err(|source| SubmitError::Broadcast { path, source })?;
        tracing::debug!(signature = %signature, path = %path, "transaction broadcast");
        Ok(signature)
    }

    /// Waits for `assurance`.
    async fn confirm(
        &self,
        signature: Signature,
        recency: RecencyToken,
        assurance: AssuranceLevel,
    ) -> Result<Signature, SubmitError> {
        let confirmed = self
            .waiter
            .wait(self.client.as_ref(), &signature, recency, assurance)
            .await
            .map_err(|source| SubmitError::Confirmation { source })?;
        tracing::info!(
            signature = %signature,
            slot = confirmed.slot,
            level = %confirmed.level,
            "transaction confirmed"
        );
        Ok(signature)
    }

    /// Records the outcome once; the guard notifies hooks.
    fn settle(
        guard: AttemptGuard<'_>,
        outcome: Result<Signature, SubmitError>,
    ) -> Result<Signature, SubmitError> {
        match &outcome {
            Ok(signature) => guard.succeed(*signature),
            Err(error) => {
                tracing::warn!(stage = %error.stage(), error = %error, "submission attempt failed");
                guard.fail(error.user_message());
            }
        }
        outcome
    }
}

/// True when every required signature slot holds a non-default signature.
fn is_fully_signed(tx: &VersionedTransaction) -> bool {
    let required = usize::from(tx.message.header().num_required_signatures);
    required > 0
        && tx.signatures.len() == required
        && tx
            .signatures
            .iter()
            .all(|signature| *signature != Signature::default())
}
