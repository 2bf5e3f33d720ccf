//! JSON-RPC ledger client.

use std::{str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use solana_hash::Hash;
use solana_signature::Signature;

use crate::{
    builder::{RecencyToken, UnsignedTx},
    providers::{
        AssuranceLevel, LedgerClient, LedgerError, RawBroadcastConfig, RecencyContext,
        SignatureStatus,
    },
    signing::ApprovalSigner,
};

/// Ledger client speaking Solana JSON-RPC over HTTP.
#[derive(Clone)]
pub struct JsonRpcLedgerClient {
    /// HTTP client used for RPC calls.
    client: reqwest::Client,
    /// Target JSON-RPC endpoint URL.
    rpc_url: String,
    /// Commitment used for recency and block-height reads.
    commitment: AssuranceLevel,
    /// Approval middleware for the standard path.
    approver: Option<Arc<dyn ApprovalSigner>>,
}

impl JsonRpcLedgerClient {
    /// Creates a client with a 10 second request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] when HTTP client creation fails.
    pub fn new(rpc_url: impl Into<String>) -> Result<Self, LedgerError> {
        Self::with_timeout(rpc_url, Duration::from_secs(10))
    }

    /// Creates a client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] when HTTP client creation fails.
    pub fn with_timeout(
        rpc_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LedgerError::Config {
                message: error.to_string(),
            })?;
        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            commitment: AssuranceLevel::Confirmed,
            approver: None,
        })
    }

    /// Sets the commitment used for recency and block-height reads.
    #[must_use]
    pub const fn with_commitment(mut self, commitment: AssuranceLevel) -> Self {
        self.commitment = commitment;
        self
    }

    /// Attaches approval middleware for the standard path.
    #[must_use]
    pub fn with_approver(mut self, approver: Arc<dyn ApprovalSigner>) -> Self {
        self.approver = Some(approver);
        self
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Sends one JSON-RPC request and unwraps the envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T, LedgerError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|error| LedgerError::Request {
                method,
                message: error.to_string(),
            })?;
        let response = response
            .error_for_status()
            .map_err(|error| LedgerError::Request {
                method,
                message: error.to_string(),
            })?;
        let parsed: JsonRpcResponse<T> =
            response
                .json()
                .await
                .map_err(|error| LedgerError::InvalidResponse {
                    method,
                    message: error.to_string(),
                })?;
        parsed.into_result(method)
    }

    /// Sends encoded transaction bytes through `sendTransaction`.
    async fn send_transaction(
        &self,
        tx_bytes: &[u8],
        skip_preflight: bool,
        min_context_slot: Option<u64>,
    ) -> Result<Signature, LedgerError> {
        let config = SendTransactionConfig {
            encoding: "base64",
            skip_preflight,
            preflight_commitment: (!skip_preflight).then_some(self.commitment.as_str()),
            min_context_slot,
        };
        let params = serde_json::json!([BASE64_STANDARD.encode(tx_bytes), config]);
        let signature: String = self.call("sendTransaction", params).await?;
        parse_signature("sendTransaction", &signature)
    }
}

/// JSON-RPC envelope.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    /// Result value for successful calls.
    result: Option<T>,
    /// Error payload for failed calls.
    error: Option<JsonRpcError>,
}

impl<T> JsonRpcResponse<T> {
    /// Converts the envelope into a result.
    fn into_result(self, method: &'static str) -> Result<T, LedgerError> {
        if let Some(error) = self.error {
            return Err(LedgerError::RpcMethod {
                method,
                code: error.code,
                message: error.message,
            });
        }
        self.result.ok_or_else(|| LedgerError::InvalidResponse {
            method,
            message: "rpc returned neither result nor error".to_owned(),
        })
    }
}

/// JSON-RPC error object.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    /// JSON-RPC error code.
    code: i64,
    /// Human-readable message.
    message: String,
}

/// `{ context, value }` wrapper used by slot-contextual methods.
#[derive(Debug, Deserialize)]
struct WithContext<T> {
    /// Node context.
    context: RpcContext,
    /// Method payload.
    value: T,
}

/// Node context of a response.
#[derive(Debug, Deserialize)]
struct RpcContext {
    /// Slot the node evaluated the request at.
    slot: u64,
}

/// `getLatestBlockhash` payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    /// Base58 blockhash.
    blockhash: String,
    /// Last block height the blockhash is valid for.
    last_valid_block_height: u64,
}

/// One entry of `getSignatureStatuses`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignatureStatus {
    /// Slot the transaction was processed in.
    slot: u64,
    /// Execution error, `null` on success.
    #[serde(default)]
    err: Option<serde_json::Value>,
    /// `processed`, `confirmed`, or `finalized`.
    #[serde(default)]
    confirmation_status: Option<String>,
}

impl RpcSignatureStatus {
    /// Converts into the client-neutral status.
    fn into_status(self) -> SignatureStatus {
        SignatureStatus {
            slot: self.slot,
            level: self
                .confirmation_status
                .as_deref()
                .and_then(|status| AssuranceLevel::from_str(status).ok()),
            err: self.err.map(|err| err.to_string()),
        }
    }
}

/// `sendTransaction` options.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendTransactionConfig<'config> {
    /// Transaction encoding format.
    encoding: &'config str,
    /// Preflight skip flag.
    skip_preflight: bool,
    /// Preflight commitment, only when preflight runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    preflight_commitment: Option<&'config str>,
    /// Staleness bound for the serving node.
    #[serde(skip_serializing_if = "Option::is_none")]
    min_context_slot: Option<u64>,
}

/// Parses a base58 signature string.
fn parse_signature(method: &'static str, value: &str) -> Result<Signature, LedgerError> {
    Signature::from_str(value).map_err(|error| LedgerError::InvalidResponse {
        method,
        message: format!("invalid signature `{value}`: {error}"),
    })
}

/// Converts a `getLatestBlockhash` response.
fn recency_from_response(
    response: WithContext<LatestBlockhash>,
) -> Result<RecencyContext, LedgerError> {
    let blockhash = Hash::from_str(&response.value.blockhash).map_err(|error| {
        LedgerError::InvalidResponse {
            method: "getLatestBlockhash",
            message: format!("invalid blockhash `{}`: {error}", response.value.blockhash),
        }
    })?;
    Ok(RecencyContext {
        token: RecencyToken::new(blockhash, response.value.last_valid_block_height),
        context_slot: response.context.slot,
    })
}

#[async_trait]
impl LedgerClient for JsonRpcLedgerClient {
    async fn fetch_recency(&self) -> Result<RecencyContext, LedgerError> {
        let response: WithContext<LatestBlockhash> = self
            .call(
                "getLatestBlockhash",
                serde_json::json!([{ "commitment": self.commitment.as_str() }]),
            )
            .await?;
        recency_from_response(response)
    }

    async fn broadcast_approved(
        &self,
        tx: UnsignedTx,
        min_context_slot: Option<u64>,
    ) -> Result<Signature, LedgerError> {
        let approver = self
            .approver
            .as_ref()
            .ok_or(LedgerError::ApprovalUnavailable)?;
        let signed = approver.approve(tx).await?;
        let tx_bytes = bincode::serialize(&signed).map_err(|error| LedgerError::Config {
            message: format!("failed to encode approved transaction: {error}"),
        })?;
        self.send_transaction(&tx_bytes, false, min_context_slot)
            .await
    }

    async fn broadcast_raw(
        &self,
        tx_bytes: &[u8],
        config: &RawBroadcastConfig,
    ) -> Result<Signature, LedgerError> {
        self.send_transaction(tx_bytes, config.skip_preflight, None)
            .await
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, LedgerError> {
        let response: WithContext<Vec<Option<RpcSignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                serde_json::json!([[signature.to_string()]]),
            )
            .await?;
        Ok(response
            .value
            .into_iter()
            .next()
            .flatten()
            .map(RpcSignatureStatus::into_status))
    }

    async fn block_height(&self) -> Result<u64, LedgerError> {
        self.call(
            "getBlockHeight",
            serde_json::json!([{ "commitment": self.commitment.as_str() }]),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_blockhash_response_maps_to_recency_context() {
        let blockhash = Hash::new_from_array([7_u8; 32]);
        let raw = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "context": { "slot": 2_792 },
                "value": {
                    "blockhash": blockhash.to_string(),
                    "lastValidBlockHeight": 3_090
                }
            }
        });
        let parsed: Result<JsonRpcResponse<WithContext<LatestBlockhash>>, _> =
            serde_json::from_value(raw);
        assert!(parsed.is_ok());
        if let Ok(parsed) = parsed {
            let context = parsed
                .into_result("getLatestBlockhash")
                .and_then(recency_from_response);
            assert_eq!(
                context,
                Ok(RecencyContext {
                    token: RecencyToken::new(blockhash, 3_090),
                    context_slot: 2_792,
                })
            );
        }
    }

    #[test]
    fn rpc_error_object_becomes_method_error() {
        let raw = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32002, "message": "Blockhash not found" }
        });
        let parsed: Result<JsonRpcResponse<String>, _> = serde_json::from_value(raw);
        assert!(parsed.is_ok());
        if let Ok(parsed) = parsed {
            assert_eq!(
                parsed.into_result("sendTransaction"),
                Err(LedgerError::RpcMethod {
                    method: "sendTransaction",
                    code: -32002,
                    message: "Blockhash not found".to_owned(),
                })
            );
        }
    }

    #[test]
    fn signature_status_maps_level_and_error() {
        let raw = serde_json::json!({
            "context": { "slot": 82 },
            "value": [
                {
                    "slot": 72,
                    "confirmations": 10,
                    "err": null,
                    "confirmationStatus": "confirmed"
                },
                null
            ]
        });
        let parsed: Result<WithContext<Vec<Option<RpcSignatureStatus>>>, _> =
            serde_json::from_value(raw);
        assert!(parsed.is_ok());
        if let Ok(parsed) = parsed {
            let mut statuses = parsed.value.into_iter();
            let first = statuses.next().flatten().map(RpcSignatureStatus::into_status);
            assert_eq!(
                first,
                Some(SignatureStatus {
                    slot: 72,
                    level: Some(AssuranceLevel::Confirmed),
                    err: None,
                })
            );
            assert!(statuses.next().flatten().is_none());
        }

        let failed: Result<RpcSignatureStatus, _> = serde_json::from_value(serde_json::json!({
            "slot": 5,
            "err": { "InstructionError": [0, { "Custom": 6001 }] },
            "confirmationStatus": "processed"
        }));
        assert!(failed.is_ok());
        if let Ok(failed) = failed {
            let status = failed.into_status();
            assert_eq!(status.level, Some(AssuranceLevel::Processed));
            assert!(status.err.is_some());
        }
    }

    #[test]
    fn send_config_omits_preflight_commitment_when_skipping() {
        let config = SendTransactionConfig {
            encoding: "base64",
            skip_preflight: true,
            preflight_commitment: None,
            min_context_slot: None,
        };
        let value = serde_json::to_value(&config);
        assert!(value.is_ok());
        if let Ok(value) = value {
            assert_eq!(
                value,
                serde_json::json!({ "encoding": "base64", "skipPreflight": true })
            );
        }
    }

    #[tokio::test]
    async fn standard_path_without_approver_is_rejected() {
        let client = JsonRpcLedgerClient::new("http://127.0.0.1:1");
        assert!(client.is_ok());
        if let Ok(client) = client {
            let unsigned = crate::builder::TxBuilder::new()
                .with_fee_payer(solana_pubkey::Pubkey::new_unique())
                .with_recency(RecencyToken::new(Hash::default(), 1))
                .build_unsigned();
            assert!(unsigned.is_ok());
            if let Ok(unsigned) = unsigned {
                assert_eq!(
                    client.broadcast_approved(unsigned, None).await,
                    Err(LedgerError::ApprovalUnavailable)
                );
            }
        }
    }
}
