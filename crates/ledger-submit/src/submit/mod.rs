//! Submission pipeline, its shared types, and the JSON-RPC ledger client.

/// Pipeline orchestration.
mod client;
/// JSON-RPC ledger client.
mod rpc;
#[cfg(test)]
/// Pipeline unit tests.
mod tests;
/// Shared submission types and errors.
mod types;

pub use client::SubmitPipeline;
pub use rpc::JsonRpcLedgerClient;
pub use types::{SignedTx, SubmitError, SubmitOptions, SubmitStage};
