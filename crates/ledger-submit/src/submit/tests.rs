//! Pipeline unit tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use solana_hash::Hash;
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;

use super::*;
use crate::{
    builder::{RecencyToken, TxBuilder, UnsignedTx},
    confirm::ConfirmationConfig,
    delivery::PipelineCapabilities,
    hooks::SubmissionObserver,
    providers::{
        AssuranceLevel, LedgerClient, LedgerError, RawBroadcastConfig, RecencyContext,
        SignatureStatus,
    },
    signing::{SigningError, TransientSigner},
    state::{SubmissionState, SubmissionTracker},
};

/// Per-method call counters.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
struct Calls {
    /// `fetch_recency` calls.
    fetch: u64,
    /// `broadcast_approved` calls.
    approved: u64,
    /// `broadcast_raw` calls.
    raw: u64,
    /// `signature_status` calls.
    status: u64,
}

/// One observed raw broadcast.
#[derive(Debug, Clone)]
struct RawCall {
    /// Decoded transaction.
    tx: VersionedTransaction,
    /// Preflight flag sent with it.
    skip_preflight: bool,
}

/// One observed approved broadcast.
#[derive(Debug, Clone, Copy)]
struct ApprovedCall {
    /// Fee payer of the unsigned message.
    fee_payer: Option<Pubkey>,
    /// Staleness bound passed along.
    min_context_slot: Option<u64>,
}

/// Scripted ledger client recording every call.
#[derive(Debug)]
struct MockLedger {
    /// Response for `fetch_recency`.
    recency: Result<RecencyContext, LedgerError>,
    /// Broadcast responses in order; the last one repeats.
    broadcasts: Mutex<VecDeque<Result<Signature, LedgerError>>>,
    /// Status responses in order; the last one repeats.
    statuses: Mutex<VecDeque<Option<SignatureStatus>>>,
    /// Reported block height.
    block_height: u64,
    /// Call counters.
    calls: Mutex<Calls>,
    /// Raw broadcasts seen.
    raw_log: Mutex<Vec<RawCall>>,
    /// Approved broadcasts seen.
    approved_log: Mutex<Vec<ApprovedCall>>,
    /// Tracker sampled on every network call.
    observed_tracker: Option<Arc<SubmissionTracker>>,
    /// `is_submitting` samples, one per network call.
    in_flight_seen: Mutex<Vec<bool>>,
}

impl MockLedger {
    fn new() -> Self {
        Self {
            recency: Ok(RecencyContext {
                token: RecencyToken::new(Hash::new_from_array([9_u8; 32]), 1_000),
                context_slot: 321,
            }),
            broadcasts: Mutex::new(VecDeque::from([Ok(approved_signature())])),
            statuses: Mutex::new(VecDeque::from([confirmed_at(AssuranceLevel::Confirmed)])),
            block_height: 10,
            calls: Mutex::new(Calls::default()),
            raw_log: Mutex::new(Vec::new()),
            approved_log: Mutex::new(Vec::new()),
            observed_tracker: None,
            in_flight_seen: Mutex::new(Vec::new()),
        }
    }

    fn with_recency(mut self, recency: Result<RecencyContext, LedgerError>) -> Self {
        self.recency = recency;
        self
    }

    fn with_broadcasts(self, broadcasts: Vec<Result<Signature, LedgerError>>) -> Self {
        if let Ok(mut queue) = self.broadcasts.lock() {
            *queue = broadcasts.into();
        }
        self
    }

    fn with_statuses(self, statuses: Vec<Option<SignatureStatus>>) -> Self {
        if let Ok(mut queue) = self.statuses.lock() {
            *queue = statuses.into();
        }
        self
    }

    fn with_block_height(mut self, block_height: u64) -> Self {
        self.block_height = block_height;
        self
    }

    fn with_observed_tracker(mut self, tracker: Arc<SubmissionTracker>) -> Self {
        self.observed_tracker = Some(tracker);
        self
    }

    fn calls(&self) -> Calls {
        self.calls.lock().map(|calls| *calls).unwrap_or_default()
    }

    fn raw_calls(&self) -> Vec<RawCall> {
        self.raw_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    fn approved_calls(&self) -> Vec<ApprovedCall> {
        self.approved_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    fn in_flight_samples(&self) -> Vec<bool> {
        self.in_flight_seen
            .lock()
            .map(|samples| samples.clone())
            .unwrap_or_default()
    }

    fn count(&self, update: impl FnOnce(&mut Calls)) {
        if let Ok(mut calls) = self.calls.lock() {
            update(&mut calls);
        }
    }

    fn sample_tracker(&self) {
        if let Some(tracker) = &self.observed_tracker
            && let Ok(mut samples) = self.in_flight_seen.lock()
        {
            samples.push(tracker.is_submitting());
        }
    }

    fn next_broadcast(&self) -> Result<Signature, LedgerError> {
        next_or_last(&self.broadcasts).unwrap_or_else(|| {
            Err(LedgerError::Request {
                method: "sendTransaction",
                message: "no response configured".to_owned(),
            })
        })
    }
}

fn next_or_last<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut queue = queue.lock().ok()?;
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn fetch_recency(&self) -> Result<RecencyContext, LedgerError> {
        self.count(|calls| calls.fetch = calls.fetch.saturating_add(1));
        self.sample_tracker();
        self.recency.clone()
    }

    async fn broadcast_approved(
        &self,
        tx: UnsignedTx,
        min_context_slot: Option<u64>,
    ) -> Result<Signature, LedgerError> {
        self.count(|calls| calls.approved = calls.approved.saturating_add(1));
        self.sample_tracker();
        if let Ok(mut log) = self.approved_log.lock() {
            log.push(ApprovedCall {
                fee_payer: tx.fee_payer(),
                min_context_slot,
            });
        }
        self.next_broadcast()
    }

    async fn broadcast_raw(
        &self,
        tx_bytes: &[u8],
        config: &RawBroadcastConfig,
    ) -> Result<Signature, LedgerError> {
        self.count(|calls| calls.raw = calls.raw.saturating_add(1));
        self.sample_tracker();
        let tx: VersionedTransaction =
            bincode::deserialize(tx_bytes).map_err(|error| LedgerError::Request {
                method: "sendTransaction",
                message: error.to_string(),
            })?;
        let own_signature = tx.signatures.first().copied().unwrap_or_default();
        if let Ok(mut log) = self.raw_log.lock() {
            log.push(RawCall {
                tx,
                skip_preflight: config.skip_preflight,
            });
        }
        self.next_broadcast().map(|_| own_signature)
    }

    async fn signature_status(
        &self,
        _signature: &Signature,
    ) -> Result<Option<SignatureStatus>, LedgerError> {
        self.count(|calls| calls.status = calls.status.saturating_add(1));
        self.sample_tracker();
        Ok(next_or_last(&self.statuses).flatten())
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        Ok(self.block_height)
    }
}

/// Observer recording every notification.
#[derive(Debug, Default)]
struct RecordingObserver {
    /// Refresh hook calls.
    successes: Mutex<Vec<Signature>>,
    /// Error hook calls.
    failures: Mutex<Vec<String>>,
}

impl RecordingObserver {
    fn successes(&self) -> Vec<Signature> {
        self.successes
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    fn failures(&self) -> Vec<String> {
        self.failures
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

impl SubmissionObserver for RecordingObserver {
    fn on_success(&self, signature: &Signature) {
        if let Ok(mut seen) = self.successes.lock() {
            seen.push(*signature);
        }
    }

    fn on_failure(&self, message: &str) {
        if let Ok(mut seen) = self.failures.lock() {
            seen.push(message.to_owned());
        }
    }
}

fn approved_signature() -> Signature {
    Signature::from([21_u8; 64])
}

fn confirmed_at(level: AssuranceLevel) -> Option<SignatureStatus> {
    Some(SignatureStatus {
        slot: 400,
        level: Some(level),
        err: None,
    })
}

fn third_party_transfer() -> TxBuilder {
    TxBuilder::new().add_instruction(solana_system_interface::instruction::transfer(
        &Pubkey::new_unique(),
        &Pubkey::new_unique(),
        1,
    ))
}

/// Skeleton whose only signer is the fee payer.
fn transfer_from(payer: Pubkey) -> TxBuilder {
    TxBuilder::new().add_instruction(solana_system_interface::instruction::transfer(
        &payer,
        &Pubkey::new_unique(),
        1,
    ))
}

fn pipeline(ledger: Arc<MockLedger>) -> SubmitPipeline {
    SubmitPipeline::new(ledger).with_confirmation_config(ConfirmationConfig {
        poll_interval: Duration::from_millis(1),
    })
}

#[tokio::test]
async fn standard_path_broadcasts_once_and_confirms_at_default_level() {
    let tracker = Arc::new(SubmissionTracker::new());
    let ledger = Arc::new(
        MockLedger::new()
            .with_statuses(vec![
                confirmed_at(AssuranceLevel::Processed),
                confirmed_at(AssuranceLevel::Confirmed),
            ])
            .with_observed_tracker(tracker.clone()),
    );
    let observer = Arc::new(RecordingObserver::default());
    let primary = Pubkey::new_unique();
    let pipeline = pipeline(ledger.clone())
        .with_primary_identity(primary)
        .with_tracker(tracker.clone())
        .with_observer(observer.clone());
    assert_eq!(tracker.state(), SubmissionState::Idle);

    let signature = pipeline
        .submit(transfer_from(primary), SubmitOptions::new())
        .await;

    assert_eq!(signature, Some(approved_signature()));
    assert_eq!(
        ledger.calls(),
        Calls {
            fetch: 1,
            approved: 1,
            raw: 0,
            status: 2,
        }
    );
    let approved = ledger.approved_calls();
    assert_eq!(approved.len(), 1);
    if let Some(call) = approved.first() {
        assert_eq!(call.fee_payer, Some(primary));
        assert_eq!(call.min_context_slot, Some(321));
    }
    assert_eq!(ledger.in_flight_samples(), vec![true; 4]);
    assert_eq!(
        tracker.state(),
        SubmissionState::Succeeded(approved_signature())
    );
    assert!(!pipeline.is_submitting());
    assert_eq!(observer.successes(), vec![approved_signature()]);
    assert!(observer.failures().is_empty());
}

#[tokio::test]
async fn transient_signer_signs_locally_and_broadcasts_raw() {
    let ledger = Arc::new(MockLedger::new());
    let pipeline = pipeline(ledger.clone()).with_primary_identity(Pubkey::new_unique());
    let signer = TransientSigner::generate();
    let transient_key = signer.pubkey();

    let signature = pipeline
        .submit(
            transfer_from(transient_key),
            SubmitOptions::new()
                .with_transient_signer(signer)
                .with_assurance(AssuranceLevel::Processed),
        )
        .await;

    let calls = ledger.calls();
    assert_eq!(calls.approved, 0);
    assert_eq!(calls.raw, 1);
    let raw = ledger.raw_calls();
    assert_eq!(raw.len(), 1);
    if let Some(call) = raw.first() {
        assert!(call.skip_preflight);
        assert_eq!(
            call.tx.message.static_account_keys().first(),
            Some(&transient_key)
        );
        let first = call.tx.signatures.first().copied();
        assert!(first.is_some());
        assert_ne!(first, Some(Signature::default()));
        assert_eq!(signature, first);
    }
    assert_eq!(pipeline.last_success(), signature);
}

#[tokio::test]
async fn ephemeral_flag_alone_fails_before_any_network_call() {
    let ledger = Arc::new(MockLedger::new());
    let pipeline = pipeline(ledger.clone()).with_primary_identity(Pubkey::new_unique());

    let outcome = pipeline
        .try_submit(third_party_transfer(), SubmitOptions::new().ephemeral(true))
        .await;

    assert!(matches!(
        outcome,
        Err(SubmitError::Signing {
            source: SigningError::UnsignedDirectBroadcast
        })
    ));
    assert_eq!(ledger.calls(), Calls::default());
    assert!(!pipeline.is_submitting());
    assert!(pipeline.last_error().is_some());
}

#[tokio::test]
async fn expired_blockhash_resolves_to_failure() {
    let ledger = Arc::new(
        MockLedger::new()
            .with_statuses(vec![None])
            .with_block_height(1_001),
    );
    let observer = Arc::new(RecordingObserver::default());
    let pipeline = pipeline(ledger.clone())
        .with_primary_identity(Pubkey::new_unique())
        .with_observer(observer.clone());

    let signature = pipeline.submit(third_party_transfer(), SubmitOptions::new()).await;

    assert_eq!(signature, None);
    assert!(!pipeline.is_submitting());
    let error = pipeline.last_error();
    assert!(error.is_some());
    if let Some(error) = error {
        assert!(error.starts_with("Transaction failed: "));
        assert!(error.contains("expired"));
    }
    assert_eq!(observer.failures().len(), 1);
    assert!(observer.successes().is_empty());
}

#[tokio::test]
async fn second_attempt_overwrites_first_failure() {
    let ledger = Arc::new(MockLedger::new().with_broadcasts(vec![
        Err(LedgerError::RpcMethod {
            method: "sendTransaction",
            code: -32002,
            message: "Blockhash not found".to_owned(),
        }),
        Ok(approved_signature()),
    ]));
    let pipeline = pipeline(ledger.clone()).with_primary_identity(Pubkey::new_unique());

    let first = pipeline.try_submit(third_party_transfer(), SubmitOptions::new()).await;
    assert!(matches!(
        &first,
        Err(error) if error.stage() == SubmitStage::Broadcast
    ));
    assert!(pipeline.last_error().is_some());

    let second = pipeline.submit(third_party_transfer(), SubmitOptions::new()).await;
    assert_eq!(second, Some(approved_signature()));
    assert_eq!(pipeline.last_error(), None);
    assert_eq!(pipeline.last_success(), Some(approved_signature()));
    assert_eq!(ledger.calls().approved, 2);
}

#[tokio::test]
async fn prefilled_transaction_skips_recency_fetch() {
    let ledger = Arc::new(MockLedger::new());
    let primary = Pubkey::new_unique();
    let pipeline = pipeline(ledger.clone()).with_primary_identity(primary);
    let skeleton = transfer_from(primary)
        .with_fee_payer(primary)
        .with_recency(RecencyToken::new(Hash::new_from_array([4_u8; 32]), 50));

    let signature = pipeline.submit(skeleton, SubmitOptions::new()).await;

    assert!(signature.is_some());
    assert_eq!(ledger.calls().fetch, 0);
    let approved = ledger.approved_calls();
    if let Some(call) = approved.first() {
        assert_eq!(call.min_context_slot, None);
    }
}

#[tokio::test]
async fn assembly_failure_is_reported_with_stage() {
    let ledger = Arc::new(MockLedger::new().with_recency(Err(LedgerError::Request {
        method: "getLatestBlockhash",
        message: "connection refused".to_owned(),
    })));
    let pipeline = pipeline(ledger.clone()).with_primary_identity(Pubkey::new_unique());

    let outcome = pipeline.try_submit(third_party_transfer(), SubmitOptions::new()).await;

    assert!(matches!(
        &outcome,
        Err(error) if error.stage() == SubmitStage::Assembly
    ));
    let calls = ledger.calls();
    assert_eq!(calls.approved, 0);
    assert_eq!(calls.raw, 0);
    assert!(!pipeline.is_submitting());
}

#[tokio::test]
async fn missing_primary_identity_fails_standard_attempt() {
    let ledger = Arc::new(MockLedger::new());
    let pipeline = pipeline(ledger.clone());

    let outcome = pipeline.try_submit(third_party_transfer(), SubmitOptions::new()).await;

    assert!(matches!(
        outcome,
        Err(SubmitError::Signing {
            source: SigningError::MissingPrimaryIdentity
        })
    ));
    assert_eq!(ledger.calls(), Calls::default());
}

#[tokio::test]
async fn standard_only_pipeline_rejects_transient_signer() {
    let ledger = Arc::new(MockLedger::new());
    let pipeline = pipeline(ledger.clone())
        .with_primary_identity(Pubkey::new_unique())
        .with_capabilities(PipelineCapabilities::standard_only());

    let outcome = pipeline
        .try_submit(
            third_party_transfer(),
            SubmitOptions::new().with_transient_signer(TransientSigner::generate()),
        )
        .await;

    assert!(matches!(
        outcome,
        Err(SubmitError::Signing {
            source: SigningError::TransientSignerUnsupported
        })
    ));
    assert_eq!(ledger.calls(), Calls::default());
}

#[tokio::test]
async fn on_chain_failure_is_a_confirmation_failure() {
    let ledger = Arc::new(MockLedger::new().with_statuses(vec![Some(SignatureStatus {
        slot: 400,
        level: Some(AssuranceLevel::Processed),
        err: Some("{\"InstructionError\":[0,{\"Custom\":6001}]}".to_owned()),
    })]));
    let pipeline = pipeline(ledger).with_primary_identity(Pubkey::new_unique());

    let outcome = pipeline.try_submit(third_party_transfer(), SubmitOptions::new()).await;

    assert!(matches!(
        &outcome,
        Err(error) if error.stage() == SubmitStage::Confirmation
    ));
}

#[tokio::test]
async fn presigned_bytes_use_direct_path() {
    let ledger = Arc::new(MockLedger::new());
    let pipeline = pipeline(ledger.clone());
    let payer = Keypair::new();
    let signed = transfer_from(payer.pubkey())
        .with_fee_payer(payer.pubkey())
        .with_recency(RecencyToken::new(Hash::new_from_array([2_u8; 32]), 900))
        .build_unsigned()
        .and_then(|unsigned| unsigned.sign(&[&payer]));
    assert!(signed.is_ok());
    let Ok(signed) = signed else {
        return;
    };
    let expected = signed.signatures.first().copied();
    let bytes = bincode::serialize(&signed);
    assert!(bytes.is_ok());
    let Ok(bytes) = bytes else {
        return;
    };

    let signature = pipeline
        .submit_signed(
            SignedTx::VersionedTransactionBytes(bytes),
            900,
            AssuranceLevel::Confirmed,
        )
        .await;

    assert_eq!(signature, expected);
    let calls = ledger.calls();
    assert_eq!(calls.raw, 1);
    assert_eq!(calls.approved, 0);
    assert_eq!(calls.fetch, 0);
}

#[tokio::test]
async fn undecodable_signed_bytes_fail_in_signing_stage() {
    let ledger = Arc::new(MockLedger::new());
    let pipeline = pipeline(ledger.clone());

    let outcome = pipeline
        .try_submit_signed(
            SignedTx::WireTransactionBytes(vec![1, 2, 3]),
            10,
            AssuranceLevel::Confirmed,
        )
        .await;

    assert!(matches!(outcome, Err(SubmitError::DecodeSignedBytes { .. })));
    assert_eq!(ledger.calls().raw, 0);
    assert!(pipeline.last_error().is_some());
}

fn signed_transfer(payer: &Keypair) -> Option<VersionedTransaction> {
    transfer_from(payer.pubkey())
        .with_fee_payer(payer.pubkey())
        .with_recency(RecencyToken::new(Hash::new_from_array([2_u8; 32]), 900))
        .build_unsigned()
        .and_then(|unsigned| unsigned.sign(&[payer]))
        .ok()
}

#[tokio::test]
async fn presigned_bytes_without_signatures_are_never_broadcast() {
    let ledger = Arc::new(MockLedger::new());
    let observer = Arc::new(RecordingObserver::default());
    let pipeline = pipeline(ledger.clone()).with_observer(observer.clone());
    let signed = signed_transfer(&Keypair::new());
    assert!(signed.is_some());
    let Some(signed) = signed else {
        return;
    };

    let placeholder = VersionedTransaction {
        signatures: vec![Signature::default()],
        message: signed.message.clone(),
    };
    let missing = VersionedTransaction {
        signatures: Vec::new(),
        message: signed.message,
    };
    for tx in [placeholder, missing] {
        let bytes = bincode::serialize(&tx);
        assert!(bytes.is_ok());
        let Ok(bytes) = bytes else {
            return;
        };
        let outcome = pipeline
            .try_submit_signed(
                SignedTx::WireTransactionBytes(bytes),
                900,
                AssuranceLevel::Confirmed,
            )
            .await;
        assert!(matches!(
            outcome,
            Err(SubmitError::Signing {
                source: SigningError::UnsignedDirectBroadcast
            })
        ));
    }

    assert_eq!(ledger.calls(), Calls::default());
    assert_eq!(observer.failures().len(), 2);
    assert!(!pipeline.is_submitting());
}

#[tokio::test]
async fn dropped_attempt_is_reported_as_abandoned() {
    let ledger = Arc::new(MockLedger::new().with_statuses(vec![None]));
    let observer = Arc::new(RecordingObserver::default());
    let pipeline = pipeline(ledger.clone())
        .with_primary_identity(Pubkey::new_unique())
        .with_observer(observer.clone());

    let outcome = tokio::time::timeout(
        Duration::from_millis(50),
        pipeline.submit(third_party_transfer(), SubmitOptions::new()),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(ledger.calls().approved, 1);
    assert_eq!(
        pipeline.tracker().state(),
        SubmissionState::Failed(crate::state::ABANDONED_MESSAGE.to_owned())
    );
    assert_eq!(
        observer.failures(),
        vec![crate::state::ABANDONED_MESSAGE.to_owned()]
    );
    assert!(observer.successes().is_empty());
}
