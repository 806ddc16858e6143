//! Caller-side client for a remote agent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use super::QueryResponse;
use crate::auth::KEY_HEADER;
use crate::db::ResultSet;
use crate::descriptor::QueryDescriptor;
use crate::error::{BridgeError, Result};
use crate::query::HealthReport;

/// Anything that can execute a descriptor remotely.
///
/// Pagination and batching are written against this so they can be tested
/// without a running agent.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    async fn query(&self, descriptor: &QueryDescriptor) -> Result<ResultSet>;
}

/// HTTP client for one agent.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
}

impl AgentClient {
    /// Creates a client for the agent at `base_url`.
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        // a trailing slash keeps any path prefix when endpoints are joined
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| BridgeError::config(format!("Invalid agent URL '{base_url}': {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| BridgeError::config(format!("Invalid agent URL: {e}")))
    }

    fn map_send_error(&self, error: reqwest::Error) -> BridgeError {
        if error.is_timeout() {
            BridgeError::transport(format!(
                "Agent request timed out after {}s",
                self.timeout.as_secs()
            ))
        } else if error.is_connect() {
            BridgeError::transport(format!(
                "Cannot connect to agent at {}: {error}",
                self.base_url
            ))
        } else {
            BridgeError::transport(format!("Unexpected error: {error}"))
        }
    }

    /// Fetches the agent's health report.
    pub async fn health(&self) -> Result<HealthReport> {
        let response = self
            .http
            .get(self.endpoint("health")?)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            return Err(BridgeError::transport(format!(
                "Agent returned error: {}",
                response.status().as_u16()
            )));
        }

        response
            .json::<HealthReport>()
            .await
            .map_err(|e| BridgeError::transport(format!("Invalid health response: {e}")))
    }

    /// True if the agent is reachable and reports healthy.
    pub async fn is_healthy(&self) -> bool {
        match self.health().await {
            Ok(report) => report.is_healthy(),
            Err(e) => {
                debug!("Agent health check failed: {e}");
                false
            }
        }
    }
}

#[async_trait]
impl QueryTransport for AgentClient {
    async fn query(&self, descriptor: &QueryDescriptor) -> Result<ResultSet> {
        let response = self
            .http
            .post(self.endpoint("query")?)
            .header(KEY_HEADER, &self.api_key)
            .json(descriptor)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(BridgeError::auth(
                "Agent authentication failed - check API key",
            ));
        }

        let envelope = response.json::<QueryResponse>().await;
        match envelope {
            Ok(envelope) => envelope.into_result(),
            Err(_) if !status.is_success() => Err(BridgeError::transport(format!(
                "Agent returned error: {}",
                status.as_u16()
            ))),
            Err(e) => Err(BridgeError::transport(format!("Invalid query response: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_url() {
        let err = AgentClient::new("not a url", "rbk_x", Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_endpoint_joins_paths() {
        let client = AgentClient::new("http://192.168.1.100:8001/", "rbk_x", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.endpoint("query").unwrap().as_str(),
            "http://192.168.1.100:8001/query"
        );
    }

    #[test]
    fn test_endpoint_keeps_path_prefix() {
        for base in ["http://erp-gateway/agent", "http://erp-gateway/agent/"] {
            let client = AgentClient::new(base, "rbk_x", Duration::from_secs(5)).unwrap();
            assert_eq!(client.base_url().as_str(), "http://erp-gateway/agent/");
            assert_eq!(
                client.endpoint("query").unwrap().as_str(),
                "http://erp-gateway/agent/query"
            );
            assert_eq!(
                client.endpoint("health").unwrap().as_str(),
                "http://erp-gateway/agent/health"
            );
        }
    }

    #[tokio::test]
    async fn test_unreachable_agent_is_transport_error() {
        let client = AgentClient::new("http://127.0.0.1:9", "rbk_x", Duration::from_secs(2)).unwrap();
        assert!(!client.is_healthy().await);

        let err = client.query(&QueryDescriptor::new("customer")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)));
    }
}
