//! Waits for a broadcast signature to reach a required assurance level.

use std::time::Duration;

use solana_signature::Signature;
use thiserror::Error;

use crate::{
    builder::RecencyToken,
    providers::{AssuranceLevel, LedgerClient, LedgerError},
};

/// Confirmation-stage errors.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ConfirmationError {
    /// Blockhash expired before the required level was reached.
    #[error(
        "blockhash expired at block height {block_height} (last valid {last_valid_block_height}) before reaching {required}"
    )]
    Expired {
        /// Height observed when expiry was detected.
        block_height: u64,
        /// Last height at which the blockhash was valid.
        last_valid_block_height: u64,
        /// Level that was awaited.
        required: AssuranceLevel,
    },
    /// Transaction landed but failed execution.
    #[error("transaction failed on-chain in slot {slot}: {message}")]
    OnChain {
        /// Slot the failed transaction landed in.
        slot: u64,
        /// Network-reported execution error.
        message: String,
    },
    /// Status polling failed.
    #[error("failed to poll confirmation status: {source}")]
    Status {
        /// Client error.
        source: LedgerError,
    },
}

/// Confirmation polling tuning.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ConfirmationConfig {
    /// Delay between status polls.
    pub poll_interval: Duration,
}

impl ConfirmationConfig {
    /// Returns a config with bounded minimums.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            poll_interval: self.poll_interval.max(Duration::from_millis(1)),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(400),
        }
    }
}

/// Level reached and the slot it was reported for.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Confirmed {
    /// Slot the transaction landed in.
    pub slot: u64,
    /// Level reported by the node, at least the required one.
    pub level: AssuranceLevel,
}

/// Polls status until the required level, an on-chain failure, or blockhash expiry.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmationWaiter {
    /// Polling tuning.
    config: ConfirmationConfig,
}

impl ConfirmationWaiter {
    /// Creates a waiter.
    #[must_use]
    pub fn new(config: ConfirmationConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }

    /// Blocks until `signature` reaches `required` or `recency` expires.
    ///
    /// # Errors
    ///
    /// Returns [`ConfirmationError::Expired`] once the block height passes the recency
    /// token's last valid height, [`ConfirmationError::OnChain`] when execution failed, and
    /// [`ConfirmationError::Status`] when polling itself fails.
    pub async fn wait(
        &self,
        client: &dyn LedgerClient,
        signature: &Signature,
        recency: RecencyToken,
        required: AssuranceLevel,
    ) -> Result<Confirmed, ConfirmationError> {
        loop {
            if let Some(confirmed) = self.poll_status(client, signature, required).await? {
                return Ok(confirmed);
            }

            let block_height = client
                .block_height()
                .await
                .map_err(|source| ConfirmationError::Status { source })?;
            if block_height > recency.last_valid_block_height {
                // Landing between the status poll and the height read still counts.
                if let Some(confirmed) = self.poll_status(client, signature, required).await? {
                    return Ok(confirmed);
                }
                return Err(ConfirmationError::Expired {
                    block_height,
                    last_valid_block_height: recency.last_valid_block_height,
                    required,
                });
            }
            tracing::trace!(
                signature = %signature,
                block_height,
                required = %required,
                "awaiting confirmation"
            );
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// One status poll: `Some` once `required` is reached.
    async fn poll_status(
        &self,
        client: &dyn LedgerClient,
        signature: &Signature,
        required: AssuranceLevel,
    ) -> Result<Option<Confirmed>, ConfirmationError> {
        let status = client
            .signature_status(signature)
            .await
            .map_err(|source| ConfirmationError::Status { source })?;
        let Some(status) = status else {
            return Ok(None);
        };
        if let Some(message) = status.err {
            return Err(ConfirmationError::OnChain {
                slot: status.slot,
                message,
            });
        }
        Ok(status
            .level
            .filter(|level| level.satisfies(required))
            .map(|level| Confirmed {
                slot: status.slot,
                level,
            }))
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex};

    use async_trait::async_trait;
    use solana_hash::Hash;

    use super::*;
    use crate::{
        builder::UnsignedTx,
        providers::{RawBroadcastConfig, RecencyContext, SignatureStatus},
    };

    /// Client replaying scripted status and block-height responses.
    #[derive(Debug)]
    struct ScriptedStatusClient {
        /// Status responses, last one repeats.
        statuses: Mutex<VecDeque<Option<SignatureStatus>>>,
        /// Block heights, last one repeats.
        heights: Mutex<VecDeque<u64>>,
        /// Number of status polls.
        polls: Mutex<u64>,
    }

    impl ScriptedStatusClient {
        fn new(statuses: Vec<Option<SignatureStatus>>, heights: Vec<u64>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                heights: Mutex::new(heights.into()),
                polls: Mutex::new(0),
            }
        }

        fn polls(&self) -> u64 {
            self.polls.lock().map(|calls| *calls).unwrap_or_default()
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
    impl LedgerClient for ScriptedStatusClient {
        async fn fetch_recency(&self) -> Result<RecencyContext, LedgerError> {
            Err(LedgerError::ApprovalUnavailable)
        }

        async fn broadcast_approved(
            &self,
            _tx: UnsignedTx,
            _min_context_slot: Option<u64>,
        ) -> Result<Signature, LedgerError> {
            Err(LedgerError::ApprovalUnavailable)
        }

        async fn broadcast_raw(
            &self,
            _tx_bytes: &[u8],
            _config: &RawBroadcastConfig,
        ) -> Result<Signature, LedgerError> {
            Err(LedgerError::ApprovalUnavailable)
        }

        async fn signature_status(
            &self,
            _signature: &Signature,
        ) -> Result<Option<SignatureStatus>, LedgerError> {
            if let Ok(mut calls) = self.polls.lock() {
                *calls = calls.saturating_add(1);
            }
            Ok(next_or_last(&self.statuses).flatten())
        }

        async fn block_height(&self) -> Result<u64, LedgerError> {
            Ok(next_or_last(&self.heights).unwrap_or_default())
        }
    }

    fn status(level: AssuranceLevel) -> Option<SignatureStatus> {
        Some(SignatureStatus {
            slot: 12,
            level: Some(level),
            err: None,
        })
    }

    fn recency(last_valid_block_height: u64) -> RecencyToken {
        RecencyToken::new(Hash::new_from_array([6_u8; 32]), last_valid_block_height)
    }

    fn waiter() -> ConfirmationWaiter {
        ConfirmationWaiter::new(ConfirmationConfig {
            poll_interval: Duration::from_millis(1),
        })
    }

    #[tokio::test]
    async fn waits_until_required_level_is_reported() {
        let client = ScriptedStatusClient::new(
            vec![
                None,
                status(AssuranceLevel::Processed),
                status(AssuranceLevel::Confirmed),
            ],
            vec![100],
        );

        let confirmed = waiter()
            .wait(
                &client,
                &Signature::default(),
                recency(150),
                AssuranceLevel::Confirmed,
            )
            .await;

        assert_eq!(
            confirmed,
            Ok(Confirmed {
                slot: 12,
                level: AssuranceLevel::Confirmed,
            })
        );
        assert_eq!(client.polls(), 3);
    }

    #[tokio::test]
    async fn stronger_level_satisfies_weaker_requirement() {
        let client = ScriptedStatusClient::new(vec![status(AssuranceLevel::Finalized)], vec![1]);

        let confirmed = waiter()
            .wait(
                &client,
                &Signature::default(),
                recency(10),
                AssuranceLevel::Processed,
            )
            .await;

        assert!(confirmed.is_ok());
        assert_eq!(client.polls(), 1);
    }

    #[tokio::test]
    async fn expiry_fails_instead_of_blocking() {
        let client = ScriptedStatusClient::new(vec![None], vec![149, 150, 151]);

        let confirmed = waiter()
            .wait(
                &client,
                &Signature::default(),
                recency(150),
                AssuranceLevel::Confirmed,
            )
            .await;

        assert_eq!(
            confirmed,
            Err(ConfirmationError::Expired {
                block_height: 151,
                last_valid_block_height: 150,
                required: AssuranceLevel::Confirmed,
            })
        );
    }

    #[tokio::test]
    async fn landing_at_expiry_boundary_still_confirms() {
        let client = ScriptedStatusClient::new(
            vec![None, status(AssuranceLevel::Confirmed)],
            vec![151],
        );

        let confirmed = waiter()
            .wait(
                &client,
                &Signature::default(),
                recency(150),
                AssuranceLevel::Confirmed,
            )
            .await;

        assert_eq!(
            confirmed,
            Ok(Confirmed {
                slot: 12,
                level: AssuranceLevel::Confirmed,
            })
        );
        assert_eq!(client.polls(), 2);
    }

    #[tokio::test]
    async fn on_chain_error_fails_confirmation() {
        let client = ScriptedStatusClient::new(
            vec![Some(SignatureStatus {
                slot: 33,
                level: Some(AssuranceLevel::Confirmed),
                err: Some("InstructionError(0, Custom(1))".to_owned()),
            })],
            vec![1],
        );

        let confirmed = waiter()
            .wait(
                &client,
                &Signature::default(),
                recency(10),
                AssuranceLevel::Confirmed,
            )
            .await;

        assert!(matches!(
            confirmed,
            Err(ConfirmationError::OnChain { slot: 33, .. })
        ));
    }
}
