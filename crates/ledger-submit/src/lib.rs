#![forbid(unsafe_code)]
#![cfg_attr(
    test,
    allow(
        clippy::arithmetic_side_effects,
        clippy::expect_used,
        clippy::indexing_slicing,
        clippy::missing_docs_in_private_items,
        clippy::panic,
        missing_docs
    )
)]

//! Transaction submission pipeline for Solana programs.
//!
//! External users should start from:
//! - [`crate::submit::SubmitPipeline`] to assemble, sign, broadcast, and confirm one
//!   operation per attempt.
//! - [`crate::config::PipelineConfig`] to build the JSON-RPC client and pipeline from the
//!   environment.
//! - [`crate::counter::CounterProgram`] or [`crate::program::ProgramSchema`] to produce the
//!   program instructions a transaction skeleton carries.

/// Transaction assembly: recency and fee-payer filling.
pub mod assembler;
/// Transaction skeletons, recency tokens, and unsigned transactions.
pub mod builder;
/// Environment-driven configuration.
pub mod config;
/// Confirmation waiting with blockhash expiry.
pub mod confirm;
/// Sample counter program.
pub mod counter;
/// Delivery path selection and broadcast.
pub mod delivery;
/// Data-layer collaborator hooks.
pub mod hooks;
/// Schema-validated program instruction builder.
pub mod program;
/// Ledger client contract and shared ledger types.
pub mod providers;
/// Signer resolution: transient credentials and approval signers.
pub mod signing;
/// Caller-visible submission state.
pub mod state;
/// Submission pipeline and JSON-RPC client.
pub mod submit;

pub use builder::{BuilderError, RecencyToken, TxBuilder, UnsignedTx};
pub use config::{ConfigError, PipelineConfig};
pub use delivery::{DeliveryPath, PipelineCapabilities};
pub use hooks::{NoopObserver, SubmissionObserver, TracingObserver};
pub use providers::{AssuranceLevel, LedgerClient, LedgerError, SignatureStatus};
pub use signing::{ApprovalSigner, KeypairApprovalSigner, SigningError, TransientSigner};
pub use state::{SubmissionState, SubmissionTracker};
pub use submit::{
    JsonRpcLedgerClient, SignedTx, SubmitError, SubmitOptions, SubmitPipeline, SubmitStage,
};
