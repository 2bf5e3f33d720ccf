//! Increments a counter account through the standard submission path.
//!
//! Usage: `counter_increment <keypair.json> <counter-pubkey>`
//!
//! The keypair file holds the 64-byte secret key as a JSON array. Endpoint, cluster, and
//! assurance level come from `LEDGER_*` environment variables.
#![doc(hidden)]

use std::{str::FromStr, sync::Arc};

use ledger_submit::{
    ConfigError, KeypairApprovalSigner, LedgerError, PipelineConfig, SubmitError, SubmitOptions,
    TracingObserver, TxBuilder, program::SchemaError,
};
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use thiserror::Error;

#[derive(Debug, Error)]
enum CounterExampleError {
    #[error("usage: {usage}")]
    Usage { usage: &'static str },
    #[error("failed to read keypair file: {source}")]
    ReadKeypair { source: std::io::Error },
    #[error("invalid keypair file: {message}")]
    InvalidKeypair { message: String },
    #[error("invalid counter address: {message}")]
    InvalidCounter { message: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

fn init_tracing() {
    if tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ledger_submit=debug")),
        )
        .try_init()
        .is_err()
    {
        // Tracing was already initialized by embedding host.
    }
}

fn load_keypair(path: &str) -> Result<Keypair, CounterExampleError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| CounterExampleError::ReadKeypair { source })?;
    let bytes: Vec<u8> =
        serde_json::from_str(&raw).map_err(|error| CounterExampleError::InvalidKeypair {
            message: error.to_string(),
        })?;
    Keypair::try_from(bytes.as_slice()).map_err(|error| CounterExampleError::InvalidKeypair {
        message: error.to_string(),
    })
}

#[tokio::main]
async fn main() -> Result<(), CounterExampleError> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let (Some(keypair_path), Some(counter)) = (args.next(), args.next()) else {
        return Err(CounterExampleError::Usage {
            usage: "counter_increment <keypair.json> <counter-pubkey>",
        });
    };
    let keypair = load_keypair(&keypair_path)?;
    let counter =
        Pubkey::from_str(&counter).map_err(|error| CounterExampleError::InvalidCounter {
            message: error.to_string(),
        })?;

    let config = PipelineConfig::from_env()?;
    let identity = keypair.pubkey();
    let client = config
        .build_client()?
        .with_approver(Arc::new(KeypairApprovalSigner::new(keypair)));
    let pipeline = config
        .build_pipeline(Arc::new(client))
        .with_primary_identity(identity)
        .with_observer(Arc::new(TracingObserver));

    let increment = config.counter_program().increment(counter)?;
    let signature = pipeline
        .try_submit(
            TxBuilder::new().add_instruction(increment),
            SubmitOptions::new().with_assurance(config.assurance),
        )
        .await?;
    tracing::info!(
        signature = %signature,
        cluster = %config.cluster,
        counter = %counter,
        "counter incremented"
    );
    Ok(())
}
