//! Environment-driven pipeline configuration.
//!
//! Values are read from process environment variables. Code-driven setup can install
//! overrides with [`set_env_overrides`], which take precedence without mutating the
//! process environment.

use std::{
    collections::HashMap,
    sync::{Arc, OnceLock, RwLock},
    time::Duration,
};

use thiserror::Error;

use crate::{
    confirm::ConfirmationConfig,
    counter::{Cluster, CounterProgram},
    providers::{AssuranceLevel, LedgerClient, LedgerError},
    submit::{JsonRpcLedgerClient, SubmitPipeline},
};

/// RPC endpoint variable.
pub const RPC_URL_ENV: &str = "LEDGER_RPC_URL";
/// Cluster name variable.
pub const CLUSTER_ENV: &str = "LEDGER_CLUSTER";
/// Default assurance level variable.
pub const ASSURANCE_ENV: &str = "LEDGER_ASSURANCE";
/// Confirmation poll interval variable, in milliseconds.
pub const CONFIRM_POLL_MS_ENV: &str = "LEDGER_CONFIRM_POLL_MS";
/// RPC request timeout variable, in milliseconds.
pub const RPC_TIMEOUT_MS_ENV: &str = "LEDGER_RPC_TIMEOUT_MS";

/// Local validator endpoint.
const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8899";

/// Global setup overrides used to avoid mutating process env at runtime.
static ENV_OVERRIDES: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();

/// Returns the lazily initialized override map.
fn env_overrides() -> &'static RwLock<HashMap<String, String>> {
    ENV_OVERRIDES.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Returns an environment variable, preferring setup overrides.
fn read_env_var(name: &str) -> Option<String> {
    if let Ok(guard) = env_overrides().read()
        && let Some(value) = guard.get(name)
    {
        return Some(value.clone());
    }
    std::env::var(name).ok()
}

/// Replaces all setup environment overrides.
pub fn set_env_overrides(overrides: impl IntoIterator<Item = (String, String)>) {
    let mut map = HashMap::new();
    map.extend(overrides);
    if let Ok(mut guard) = env_overrides().write() {
        *guard = map;
    }
}

/// Clears all setup environment overrides.
pub fn clear_env_overrides() {
    if let Ok(mut guard) = env_overrides().write() {
        guard.clear();
    }
}

/// Invalid configuration value.
#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Variable is set but cannot be parsed.
    #[error("invalid value `{value}` for {name}: {message}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Rejected value.
        value: String,
        /// Parse failure.
        message: String,
    },
}

/// Pipeline settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PipelineConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Target cluster; selects the counter program address.
    pub cluster: Cluster,
    /// Assurance level used when callers do not pick one.
    pub assurance: AssuranceLevel,
    /// Delay between confirmation polls.
    pub confirm_poll_interval: Duration,
    /// Per-request RPC timeout.
    pub rpc_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_owned(),
            cluster: Cluster::default(),
            assurance: AssuranceLevel::default(),
            confirm_poll_interval: Duration::from_millis(400),
            rpc_timeout: Duration::from_millis(10_000),
        }
    }
}

impl PipelineConfig {
    /// Reads settings from the environment, falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when the cluster or assurance level is set to an
    /// unrecognized name.
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_url = read_env_var(RPC_URL_ENV)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_owned());
        let cluster = read_parsed(CLUSTER_ENV)?.unwrap_or_default();
        let assurance = read_parsed(ASSURANCE_ENV)?.unwrap_or_default();
        let confirm_poll_ms = read_env_var(CONFIRM_POLL_MS_ENV)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(|value| value.clamp(50, 10_000))
            .unwrap_or(400);
        let rpc_timeout_ms = read_env_var(RPC_TIMEOUT_MS_ENV)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(10_000);

        Ok(Self {
            rpc_url,
            cluster,
            assurance,
            confirm_poll_interval: Duration::from_millis(confirm_poll_ms),
            rpc_timeout: Duration::from_millis(rpc_timeout_ms),
        })
    }

    /// Confirmation polling derived from these settings.
    #[must_use]
    pub fn confirmation_config(&self) -> ConfirmationConfig {
        ConfirmationConfig {
            poll_interval: self.confirm_poll_interval,
        }
        .normalized()
    }

    /// Counter program for the configured cluster.
    #[must_use]
    pub fn counter_program(&self) -> CounterProgram {
        CounterProgram::new(self.cluster)
    }

    /// JSON-RPC client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] when the HTTP client cannot be built.
    pub fn build_client(&self) -> Result<JsonRpcLedgerClient, LedgerError> {
        Ok(JsonRpcLedgerClient::with_timeout(self.rpc_url.clone(), self.rpc_timeout)?
            .with_commitment(self.assurance))
    }

    /// Pipeline over `client` with the configured confirmation polling.
    #[must_use]
    pub fn build_pipeline(&self, client: Arc<dyn LedgerClient>) -> SubmitPipeline {
        SubmitPipeline::new(client).with_confirmation_config(self.confirmation_config())
    }
}

/// Parses a set variable, leaving unset or blank ones as `None`.
fn read_parsed<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = read_env_var(name).filter(|value| !value.trim().is_empty()) else {
        return Ok(None);
    };
    value
        .parse::<T>()
        .map(Some)
        .map_err(|error| ConfigError::InvalidValue {
            name,
            message: error.to_string(),
            value,
        })
}
