//! Caller-visible submission state.

use std::{fmt, sync::Arc};

use solana_signature::Signature;
use tokio::sync::watch;

use crate::hooks::{NoopObserver, SubmissionObserver};

/// Message recorded when an attempt is dropped before it settles.
pub const ABANDONED_MESSAGE: &str = "submission attempt abandoned";

/// Submission state, exactly one value at a time.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub enum SubmissionState {
    /// No attempt has run yet.
    #[default]
    Idle,
    /// An attempt is between start and settlement.
    InFlight,
    /// Last attempt reached the requested assurance level.
    Succeeded(Signature),
    /// Last attempt failed with the given message.
    Failed(String),
}

impl SubmissionState {
    /// Returns true while an attempt is running.
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight)
    }
}

/// Observable state slot shared by the attempts of one caller session.
///
/// Overlapping attempts on one tracker are last-write-wins; callers serialize them.
#[derive(Debug)]
pub struct SubmissionTracker {
    /// Current state; receivers observe every transition.
    sender: watch::Sender<SubmissionState>,
}

impl Default for SubmissionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionTracker {
    /// Creates an idle tracker.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(SubmissionState::Idle);
        Self { sender }
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SubmissionState {
        self.sender.borrow().clone()
    }

    /// Subscribes to state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.sender.subscribe()
    }

    /// True while an attempt is in flight.
    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.sender.borrow().is_in_flight()
    }

    /// Failure message of the last attempt, when it failed.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        match &*self.sender.borrow() {
            SubmissionState::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    /// Signature of the last attempt, when it succeeded.
    #[must_use]
    pub fn last_success(&self) -> Option<Signature> {
        match &*self.sender.borrow() {
            SubmissionState::Succeeded(signature) => Some(*signature),
            _ => None,
        }
    }

    /// Enters in-flight, overwriting any terminal state, and returns the attempt guard.
    pub fn begin(&self) -> AttemptGuard<'_> {
        self.begin_observed(Arc::new(NoopObserver))
    }

    /// Like [`Self::begin`], with `observer` notified of the outcome, abandonment included.
    pub fn begin_observed(&self, observer: Arc<dyn SubmissionObserver>) -> AttemptGuard<'_> {
        self.sender.send_replace(SubmissionState::InFlight);
        AttemptGuard {
            tracker: self,
            observer,
            settled: false,
        }
    }

    /// Writes a state and notifies subscribers.
    fn set(&self, state: SubmissionState) {
        self.sender.send_replace(state);
    }
}

/// Settles exactly once per attempt.
///
/// Dropping an unsettled guard records [`ABANDONED_MESSAGE`] and reports it to the observer,
/// so the tracker never stays in flight after its attempt future is gone.
#[must_use = "dropping the guard immediately marks the attempt abandoned"]
pub struct AttemptGuard<'tracker> {
    /// Tracker this attempt reports to.
    tracker: &'tracker SubmissionTracker,
    /// Data-layer hooks for this attempt.
    observer: Arc<dyn SubmissionObserver>,
    /// Whether a terminal state was written.
    settled: bool,
}

impl AttemptGuard<'_> {
    /// Records success and fires the refresh hook.
    pub fn succeed(mut self, signature: Signature) {
        self.settled = true;
        self.tracker.set(SubmissionState::Succeeded(signature));
        self.observer.on_success(&signature);
    }

    /// Records failure and fires the error hook.
    pub fn fail(mut self, message: impl Into<String>) {
        self.settled = true;
        let message = message.into();
        self.tracker.set(SubmissionState::Failed(message.clone()));
        self.observer.on_failure(&message);
    }
}

impl fmt::Debug for AttemptGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptGuard")
            .field("settled", &self.settled)
            .finish_non_exhaustive()
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.tracker
                .set(SubmissionState::Failed(ABANDONED_MESSAGE.to_owned()));
            self.observer.on_failure(ABANDONED_MESSAGE);
        }
    }
}
