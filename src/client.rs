//! HTTP clients for the indexing API and the blockchain RPC endpoint
//!
//! `TonapiClient` reads proof-of-work parameters from tonapi.io;
//! `ToncenterClient` reads wallet sequence numbers and submits signed
//! messages through the toncenter JSON-RPC API. Both sit behind traits so
//! the mining loop can be exercised against fakes.

use crate::types::{AccountAddress, ChallengeParameter, ChallengeParameterSet};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Source of proof-of-work challenge parameters
#[async_trait]
pub trait PowParamsSource: Send + Sync {
    /// Fetch the current parameter stack for the given giver account
    async fn get_pow_params(&self, account: &AccountAddress) -> Result<ChallengeParameterSet>;
}

/// Blockchain RPC operations needed by the submitter
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current wallet sequence number; zero for uninitialized accounts
    async fn seqno(&self, address: &AccountAddress) -> Result<u32>;

    /// Submit a serialized external message
    async fn send_boc(&self, boc: &[u8]) -> Result<()>;
}

/// tonapi.io contract-method response envelope
#[derive(Debug, Deserialize)]
struct MethodResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    exit_code: Option<i64>,
    #[serde(default)]
    stack: Vec<ChallengeParameter>,
}

/// Indexing API client (tonapi.io)
pub struct TonapiClient {
    client: Client,
    base_url: String,
    bearer: Option<String>,
}

impl TonapiClient {
    /// Create a new indexing API client
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        bearer: Option<String>,
    ) -> Result<Self> {
        let base_url = base_url.into();
        Url::parse(&base_url).map_err(|e| Error::config(format!("Invalid tonapi URL: {}", e)))?;

        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(Error::from)?;

        Ok(Self {
            client,
            base_url,
            bearer,
        })
    }
}

#[async_trait]
impl PowParamsSource for TonapiClient {
    #[instrument(skip(self), fields(account = %account))]
    async fn get_pow_params(&self, account: &AccountAddress) -> Result<ChallengeParameterSet> {
        let url = format!(
            "{}/blockchain/accounts/{}/methods/get_pow_params",
            self.base_url.trim_end_matches('/'),
            account.to_raw()
        );

        debug!("Fetching PoW parameters from: {}", url);

        let mut request = self.client.get(&url).header("accept", "application/json");
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::params(format!(
                "get_pow_params returned HTTP {}",
                response.status()
            )));
        }

        let body: MethodResponse = response
            .json()
            .await
            .map_err(|e| Error::params(format!("malformed get_pow_params response: {}", e)))?;

        if body.success == Some(false) {
            return Err(Error::params(format!(
                "get_pow_params execution failed (exit code {:?})",
                body.exit_code
            )));
        }

        debug!("Fetched {} stack entries", body.stack.len());
        Ok(ChallengeParameterSet(body.stack))
    }
}

/// JSON-RPC client (toncenter)
pub struct ToncenterClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl ToncenterClient {
    /// Create a new JSON-RPC client
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        api_key: Option<String>,
    ) -> Result<Self> {
        let endpoint = endpoint.into();
        Url::parse(&endpoint).map_err(|e| Error::config(format!("Invalid RPC URL: {}", e)))?;

        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(Error::from)?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let payload = json!({
            "id": 1,
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::rpc(format!("malformed {} response: {}", method, e)))?;

        if !status.is_success() || body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let detail = body
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("no error detail");
            return Err(Error::rpc(format!(
                "{} failed (HTTP {}): {}",
                method, status, detail
            )));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| Error::rpc(format!("{} response missing result", method)))
    }
}

#[async_trait]
impl ChainClient for ToncenterClient {
    #[instrument(skip(self), fields(address = %address))]
    async fn seqno(&self, address: &AccountAddress) -> Result<u32> {
        let result = self
            .call(
                "runGetMethod",
                json!({
                    "address": address.to_raw(),
                    "method": "seqno",
                    "stack": [],
                }),
            )
            .await?;

        parse_seqno_result(&result)
    }

    #[instrument(skip_all)]
    async fn send_boc(&self, boc: &[u8]) -> Result<()> {
        let encoded = STANDARD.encode(boc);
        self.call("sendBoc", json!({ "boc": encoded })).await?;
        debug!("Submitted {} byte message", boc.len());
        Ok(())
    }
}

/// Extract the sequence number from a `runGetMethod seqno` result.
///
/// An uninitialized wallet has no code to execute; the node reports a
/// non-zero exit code and the sequence number is zero by definition.
fn parse_seqno_result(result: &serde_json::Value) -> Result<u32> {
    let exit_code = result
        .get("exit_code")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| Error::rpc("seqno result missing exit_code"))?;
    if exit_code != 0 {
        return Ok(0);
    }

    let entry = result
        .get("stack")
        .and_then(|v| v.as_array())
        .and_then(|stack| stack.first())
        .and_then(|entry| entry.as_array())
        .ok_or_else(|| Error::rpc("seqno result has no stack entry"))?;

    let raw = entry
        .get(1)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::rpc("seqno stack entry has no value"))?;

    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    let radix = if digits.len() == raw.len() { 10 } else { 16 };
    u32::from_str_radix(digits, radix)
        .map_err(|e| Error::rpc(format!("unparseable seqno value {:?}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_creation() {
        assert!(TonapiClient::new(
            "https://testnet.tonapi.io/v2",
            Duration::from_secs(30),
            Some("token".into()),
        )
        .is_ok());
        assert!(TonapiClient::new("not a url", Duration::from_secs(30), None).is_err());

        assert!(ToncenterClient::new(
            "https://testnet.toncenter.com/api/v2/jsonRPC",
            Duration::from_secs(30),
            None,
        )
        .is_ok());
    }

    #[test]
    fn test_method_response_parsing() {
        let payload = json!({
            "success": true,
            "exit_code": 0,
            "stack": [
                {"type": "num", "num": "0x1538"},
                {"type": "num", "num": "123"},
                {"type": "cell", "cell": "b5ee9c72"},
                {"type": "num", "num": "0x5"},
            ],
            "decoded": null,
        });

        let parsed: MethodResponse = serde_json::from_value(payload).unwrap();
        assert_eq!(parsed.stack.len(), 4);

        let set = ChallengeParameterSet(parsed.stack);
        assert_eq!(set.solver_args().unwrap(), vec!["5432", "123"]);
    }

    #[test]
    fn test_parse_seqno_result() {
        let result = json!({
            "exit_code": 0,
            "stack": [["num", "0x1f"]],
        });
        assert_eq!(parse_seqno_result(&result).unwrap(), 31);

        let decimal = json!({
            "exit_code": 0,
            "stack": [["num", "42"]],
        });
        assert_eq!(parse_seqno_result(&decimal).unwrap(), 42);
    }

    #[test]
    fn test_parse_seqno_uninitialized_wallet() {
        let result = json!({
            "exit_code": -13,
            "stack": [],
        });
        assert_eq!(parse_seqno_result(&result).unwrap(), 0);
    }

    #[test]
    fn test_parse_seqno_malformed() {
        assert!(parse_seqno_result(&json!({})).is_err());
        assert!(parse_seqno_result(&json!({"exit_code": 0, "stack": []})).is_err());
        assert!(
            parse_seqno_result(&json!({"exit_code": 0, "stack": [["num", "0xzz"]]})).is_err()
        );
    }
}
