//! Data-layer collaborator hooks notified when an attempt settles.

use solana_signature::Signature;

/// Receives one notification per settled attempt.
pub trait SubmissionObserver: Send + Sync {
    /// Refresh hook: cached program-state views should be invalidated.
    fn on_success(&self, signature: &Signature);

    /// Error-reporting hook with a human-readable message.
    fn on_failure(&self, message: &str);
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SubmissionObserver for NoopObserver {
    fn on_success(&self, _signature: &Signature) {}

    fn on_failure(&self, _message: &str) {}
}

/// Observer that forwards notifications to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SubmissionObserver for TracingObserver {
    fn on_success(&self, signature: &Signature) {
        tracing::info!(signature = %signature, "transaction confirmed");
    }

    fn on_failure(&self, message: &str) {
        tracing::warn!(error = message, "transaction submission failed");
    }
}
