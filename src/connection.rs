//! Credential probing.
//!
//! Settings forms call these checks before a credential is persisted, so a
//! typo surfaces immediately instead of on the first agent action. Failures
//! are user-readable responses, not errors; only transport-level surprises
//! propagate.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::Network;

/// Mirror node endpoints per network.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub mainnet: String,
    pub testnet: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            mainnet: "https://mainnet.mirrornode.hedera.com/api/v1".to_string(),
            testnet: "https://testnet.mirrornode.hedera.com/api/v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HederaTestResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LlmTestResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LlmTestResponse {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone)]
pub struct ConnectionService {
    client: Client,
    mirror_config: MirrorConfig,
}

impl ConnectionService {
    pub fn new() -> Result<Self> {
        Self::with_mirror_config(MirrorConfig::default())
    }

    pub fn with_mirror_config(mirror_config: MirrorConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("hashchat-desktop/0.1")
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            mirror_config,
        })
    }

    /// Check a Hedera operator account: id shape locally, existence and
    /// balance against the mirror node.
    pub async fn test_hedera(
        &self,
        account_id: &str,
        private_key: &str,
        network: Network,
    ) -> Result<HederaTestResponse> {
        if account_id.trim().is_empty() || private_key.trim().is_empty() {
            return Ok(HederaTestResponse {
                success: false,
                balance: None,
                error: Some("Account ID and private key are required".to_string()),
            });
        }

        if !is_valid_account_id(account_id) {
            return Ok(HederaTestResponse {
                success: false,
                balance: None,
                error: Some("Account ID must match format shard.realm.num".to_string()),
            });
        }

        let base_url = match network {
            Network::Mainnet => &self.mirror_config.mainnet,
            Network::Testnet => &self.mirror_config.testnet,
        };
        let url = format!("{}/accounts/{}", base_url.trim_end_matches('/'), account_id);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("failed to contact Hedera mirror node: {url}"))?;

        if !response.status().is_success() {
            return Ok(HederaTestResponse {
                success: false,
                balance: None,
                error: Some(
                    "Network error. Please check your connection and try again.".to_string(),
                ),
            });
        }

        let account: MirrorAccount = response
            .json()
            .await
            .context("failed to parse mirror node response")?;
        let balance_hbar = account.balance.balance as f64 / 100_000_000_f64;

        Ok(HederaTestResponse {
            success: true,
            balance: Some(format!("{balance_hbar:.2} HBAR")),
            error: None,
        })
    }

    /// Local shape check for OpenAI keys.
    pub async fn test_openai(&self, api_key: &str) -> Result<LlmTestResponse> {
        if api_key.trim().is_empty() {
            return Ok(LlmTestResponse::failed("OpenAI API key is required"));
        }
        if !api_key.starts_with("sk-") {
            return Ok(LlmTestResponse::failed("Invalid OpenAI API key format"));
        }
        Ok(LlmTestResponse::ok())
    }

    /// Local shape check for Anthropic keys.
    pub async fn test_anthropic(&self, api_key: &str) -> Result<LlmTestResponse> {
        if api_key.trim().is_empty() {
            return Ok(LlmTestResponse::failed("Anthropic API key is required"));
        }
        if !api_key.starts_with("sk-ant-") {
            return Ok(LlmTestResponse::failed("Invalid Anthropic API key format"));
        }
        Ok(LlmTestResponse::ok())
    }
}

#[derive(Deserialize)]
struct MirrorAccount {
    balance: MirrorAccountBalance,
}

#[derive(Deserialize)]
struct MirrorAccountBalance {
    balance: u64,
}

fn is_valid_account_id(account_id: &str) -> bool {
    let mut parts = account_id.split('.');
    if let (Some(shard), Some(realm), Some(num), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    {
        return !shard.is_empty()
            && !realm.is_empty()
            && !num.is_empty()
            && shard.chars().all(|c| c.is_ascii_digit())
            && realm.chars().all(|c| c.is_ascii_digit())
            && num.chars().all(|c| c.is_ascii_digit());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_against(server: &MockServer) -> ConnectionService {
        ConnectionService::with_mirror_config(MirrorConfig {
            mainnet: format!("{}/api/v1", server.uri()),
            testnet: format!("{}/api/v1", server.uri()),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn hedera_success_returns_balance() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/0.0.1234"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "balance": { "balance": 123_000_000 }
            })))
            .mount(&mock_server)
            .await;

        let service = service_against(&mock_server);
        let result = service
            .test_hedera("0.0.1234", "test-key", Network::Testnet)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.balance.as_deref(), Some("1.23 HBAR"));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn hedera_unknown_account_is_a_failed_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/accounts/0.0.404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let service = service_against(&mock_server);
        let result = service
            .test_hedera("0.0.404", "test-key", Network::Testnet)
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn hedera_rejects_malformed_account_id_locally() {
        let service = ConnectionService::new().unwrap();
        let result = service
            .test_hedera("invalid", "key", Network::Testnet)
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("shard.realm.num"));
    }

    #[tokio::test]
    async fn openai_key_shape_checks() {
        let service = ConnectionService::new().unwrap();
        assert!(!service.test_openai("").await.unwrap().success);
        assert!(!service.test_openai("wrong").await.unwrap().success);
        assert!(service.test_openai("sk-valid").await.unwrap().success);
    }

    #[tokio::test]
    async fn anthropic_key_shape_checks() {
        let service = ConnectionService::new().unwrap();
        assert!(!service.test_anthropic("sk-wrong").await.unwrap().success);
        assert!(service.test_anthropic("sk-ant-valid").await.unwrap().success);
    }

    #[test]
    fn account_id_format() {
        assert!(is_valid_account_id("0.0.1234"));
        assert!(!is_valid_account_id("0.0"));
        assert!(!is_valid_account_id("0.0.12.34"));
        assert!(!is_valid_account_id("a.b.c"));
        assert!(!is_valid_account_id("0..1"));
    }
}
