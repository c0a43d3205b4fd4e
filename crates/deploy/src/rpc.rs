//! Shared RPC utilities for interacting with Ethereum JSON-RPC endpoints.

use std::time::Duration;

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors returned by [`json_rpc_call`].
///
/// Transport failures are kept apart from error responses so callers can tell
/// an unreachable node from one that refused the request.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The request never produced a response (connection refused, timeout, DNS).
    #[error("failed to send {method} request")]
    Transport {
        method: String,
        #[source]
        source: reqwest::Error,
    },
    /// The node answered with a JSON-RPC error object.
    #[error("{method} returned RPC error {code}: {message}")]
    Response {
        method: String,
        code: i64,
        message: String,
    },
    /// The node answered, but the payload could not be decoded.
    #[error("failed to decode {method} response: {reason}")]
    Decode { method: String, reason: String },
}

impl RpcError {
    /// Whether the node could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    use anyhow::Context;

    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result. A `null` result deserializes into `None` when `T`
/// is an `Option`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, RpcError> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|source| RpcError::Transport {
            method: method.to_string(),
            source,
        })?;

    let result: Value = response.json().await.map_err(|e| RpcError::Decode {
        method: method.to_string(),
        reason: e.to_string(),
    })?;

    parse_response(method, result)
}

/// Split a JSON-RPC envelope into its result or error.
fn parse_response<T: DeserializeOwned>(method: &str, mut envelope: Value) -> Result<T, RpcError> {
    if let Some(error) = envelope.get("error") {
        let error: ErrorObject =
            serde_json::from_value(error.clone()).unwrap_or(ErrorObject {
                code: 0,
                message: error.to_string(),
            });
        return Err(RpcError::Response {
            method: method.to_string(),
            code: error.code,
            message: error.message,
        });
    }

    let result_value = envelope
        .get_mut("result")
        .map(Value::take)
        .ok_or_else(|| RpcError::Decode {
            method: method.to_string(),
            reason: "no result in response".to_string(),
        })?;

    serde_json::from_value(result_value).map_err(|e| RpcError::Decode {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_response_result() {
        let accounts: Vec<String> = parse_response(
            "eth_accounts",
            json!({"jsonrpc": "2.0", "id": 1, "result": ["0x01", "0x02"]}),
        )
        .unwrap();
        assert_eq!(accounts, vec!["0x01", "0x02"]);
    }

    #[test]
    fn test_parse_response_null_result_is_none() {
        let receipt: Option<Value> = parse_response(
            "eth_getTransactionReceipt",
            json!({"jsonrpc": "2.0", "id": 1, "result": null}),
        )
        .unwrap();
        assert!(receipt.is_none());
    }

    #[test]
    fn test_parse_response_error_object() {
        let err = parse_response::<String>(
            "eth_sendTransaction",
            json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "insufficient funds"}}),
        )
        .unwrap_err();

        match err {
            RpcError::Response { code, message, .. } => {
                assert_eq!(code, -32000);
                assert_eq!(message, "insufficient funds");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_response_missing_result() {
        let err = parse_response::<String>("eth_chainId", json!({"jsonrpc": "2.0", "id": 1}))
            .unwrap_err();
        assert!(matches!(err, RpcError::Decode { .. }));
        assert!(!err.is_transport());
    }

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x1"), Some(1));
        assert_eq!(parse_hex_u64("0x6691b7"), Some(6_721_975));
        assert_eq!(parse_hex_u64("zz"), None);
    }
}
