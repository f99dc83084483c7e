use crate::chain::RetryPolicy;
use crate::error::{Result, SyncError};
use crate::utils::Chain;
use alloy_json_abi::JsonAbi;
use alloy_primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const ETHERSCAN_V2_URL: &str = "https://api.etherscan.io/v2/api";
pub const DEFAULT_ABI_FETCH_ATTEMPTS: u32 = 5;

/// Where verified contract ABIs come from.
#[async_trait]
pub trait AbiSource: Send + Sync {
    async fn fetch_abi(&self, chain: Chain, address: Address) -> Result<JsonAbi>;
}

/// Etherscan-style `module=contract&action=getabi` client.
#[derive(Debug, Clone)]
pub struct EtherscanAbiSource {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    attempts: u32,
    backoff: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

impl EtherscanAbiSource {
    pub fn new(api_url: String, api_key: String, timeout: Duration, attempts: u32) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            api_url,
            api_key,
            attempts: attempts.max(1),
            // wait 1s, 2s, 4s, then 5s between attempts
            backoff: RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(5), Duration::MAX),
        })
    }

    async fn fetch_once(&self, chain: Chain, address: Address) -> std::result::Result<JsonAbi, String> {
        let chain_id = chain.chain_id().to_string();
        let address = address.to_checksum(None);
        let response = self
            .http_client
            .get(&self.api_url)
            .query(&[
                ("chainid", chain_id.as_str()),
                ("module", "contract"),
                ("action", "getabi"),
                ("address", address.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {body}"));
        }

        let payload: EtherscanResponse = response.json().await.map_err(|e| e.to_string())?;
        parse_abi_payload(payload)
    }
}

fn parse_abi_payload(payload: EtherscanResponse) -> std::result::Result<JsonAbi, String> {
    match (payload.status.as_str(), payload.result) {
        ("1", serde_json::Value::String(abi)) => serde_json::from_str(&abi).map_err(|e| format!("malformed ABI: {e}")),
        (_, result) => Err(format!("service error: {} {}", payload.message, result)),
    }
}

#[async_trait]
impl AbiSource for EtherscanAbiSource {
    async fn fetch_abi(&self, chain: Chain, address: Address) -> Result<JsonAbi> {
        fetch_with_attempts(chain, address, self.attempts, &self.backoff, || self.fetch_once(chain, address)).await
    }
}

/// Runs `fetch` up to `attempts` times, backing off between failures.
async fn fetch_with_attempts<F, Fut>(
    chain: Chain,
    address: Address,
    attempts: u32,
    backoff: &RetryPolicy,
    mut fetch: F,
) -> Result<JsonAbi>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<JsonAbi, String>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match fetch().await {
            Ok(abi) => return Ok(abi),
            Err(reason) if attempt >= attempts => {
                return Err(SyncError::AbiFetch { address, attempts: attempt, reason });
            }
            Err(reason) => {
                let delay = backoff.backoff(attempt);
                warn!("ABI fetch for {} on {} failed (attempt {}): {}", address, chain, attempt, reason);
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok_payload() {
        let abi = r#"[{"type":"function","name":"target","inputs":[],"outputs":[{"name":"","type":"address"}],"stateMutability":"view"}]"#;
        let payload = EtherscanResponse {
            status: "1".to_string(),
            message: "OK".to_string(),
            result: serde_json::Value::String(abi.to_string()),
        };
        let parsed = parse_abi_payload(payload).unwrap();
        assert!(parsed.function("target").is_some());
    }

    #[test]
    fn test_parse_error_payload() {
        let payload: EtherscanResponse = serde_json::from_str(
            r#"{"status":"0","message":"NOTOK","result":"Contract source code not verified"}"#,
        )
        .unwrap();
        let err = parse_abi_payload(payload).unwrap_err();
        assert!(err.contains("NOTOK"));
        assert!(err.contains("not verified"));
    }

    #[test]
    fn test_client_creation() {
        let timeout = Duration::from_secs(10);
        let source = EtherscanAbiSource::new(ETHERSCAN_V2_URL.to_string(), "key".to_string(), timeout, 0).unwrap();
        assert_eq!(source.attempts, 1);
        assert_eq!(source.backoff.backoff(4), Duration::from_secs(5));
    }

    fn abi_backoff() -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(5), Duration::MAX)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_stops_after_configured_attempts() {
        let address = Address::repeat_byte(0x11);
        let mut calls = 0u32;

        let result = fetch_with_attempts(Chain::Ethereum, address, DEFAULT_ABI_FETCH_ATTEMPTS, &abi_backoff(), || {
            calls += 1;
            async { Err("NOTOK".to_string()) }
        })
        .await;

        match result {
            Err(SyncError::AbiFetch { address: failed, attempts, reason }) => {
                assert_eq!(failed, address);
                assert_eq!(attempts, 5);
                assert_eq!(reason, "NOTOK");
            }
            other => panic!("expected ABI fetch error, got {other:?}"),
        }
        assert_eq!(calls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_recovers_before_giving_up() {
        let mut calls = 0u32;

        let abi = fetch_with_attempts(Chain::Optimism, Address::ZERO, 5, &abi_backoff(), || {
            calls += 1;
            let attempt = calls;
            async move {
                if attempt < 3 {
                    Err("rate limited".to_string())
                } else {
                    JsonAbi::parse(["function target() view returns (address)"]).map_err(|e| e.to_string())
                }
            }
        })
        .await
        .unwrap();

        assert!(abi.function("target").is_some());
        assert_eq!(calls, 3);
    }
}
