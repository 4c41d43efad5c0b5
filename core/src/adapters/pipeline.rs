//! HTTP client for the Pipeline control plane API.

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::config::Config;
use crate::domain::{Cluster, Node, NodeList, SecretItem};
use crate::error::{Error, Result};
use crate::ports::ClusterApi;

/// Timeout of a single API request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error body returned by the control plane.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct KubeconfigResponse {
    data: String,
}

/// `ClusterApi` implementation talking to Pipeline over REST.
pub struct PipelineClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl PipelineClient {
    /// Creates a client for the API rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Creates a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.endpoint.clone(), config.token.clone())
    }

    fn cluster_url(&self, org_id: i32, cluster_id: i32, suffix: &str) -> String {
        format!(
            "{}/api/v1/orgs/{}/clusters/{}{}",
            self.base_url, org_id, cluster_id, suffix
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!(url = url, "GET");

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = check_status(request.send().await?).await?;
        Ok(response.json().await?)
    }
}

impl ClusterApi for PipelineClient {
    async fn get_cluster(&self, org_id: i32, cluster_id: i32) -> Result<Cluster> {
        self.get_json(&self.cluster_url(org_id, cluster_id, "")).await
    }

    async fn list_nodes(&self, org_id: i32, cluster_id: i32) -> Result<Vec<Node>> {
        let list: NodeList = self
            .get_json(&self.cluster_url(org_id, cluster_id, "/nodes"))
            .await?;
        Ok(list.items)
    }

    async fn get_kubeconfig(&self, org_id: i32, cluster_id: i32) -> Result<String> {
        let config: KubeconfigResponse = self
            .get_json(&self.cluster_url(org_id, cluster_id, "/config"))
            .await?;
        Ok(config.data)
    }

    async fn list_cluster_secrets(&self, org_id: i32, cluster_id: i32) -> Result<Vec<SecretItem>> {
        self.get_json(&self.cluster_url(org_id, cluster_id, "/secrets"))
            .await
    }

    async fn get_secret(&self, org_id: i32, secret_id: &str) -> Result<SecretItem> {
        let url = format!("{}/api/v1/orgs/{}/secrets/{}", self.base_url, org_id, secret_id);
        self.get_json(&url).await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    Err(Error::Api {
        status,
        message: error_message(&body),
    })
}

/// Extracts a readable message from an error response body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) if !parsed.message.is_empty() => parsed.message,
        Ok(parsed) if !parsed.error.is_empty() => parsed.error,
        _ if body.trim().is_empty() => "no response body".to_string(),
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_url() {
        let client = PipelineClient::new("https://example.com/pipeline/", None).unwrap();
        assert_eq!(
            client.cluster_url(3, 17, "/nodes"),
            "https://example.com/pipeline/api/v1/orgs/3/clusters/17/nodes"
        );
        assert_eq!(
            client.cluster_url(3, 17, ""),
            "https://example.com/pipeline/api/v1/orgs/3/clusters/17"
        );
    }

    #[test]
    fn test_empty_token_is_ignored() {
        let client = PipelineClient::new("http://localhost", Some(String::new())).unwrap();
        assert!(client.token.is_none());
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"code": 404, "message": "cluster not found", "error": "not found"}"#),
            "cluster not found"
        );
        assert_eq!(error_message(r#"{"error": "unauthorized"}"#), "unauthorized");
        assert_eq!(error_message("  bad gateway \n"), "bad gateway");
        assert_eq!(error_message(""), "no response body");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let client = PipelineClient::new("http://127.0.0.1:1", None).unwrap();
        let result = client.list_nodes(1, 1).await;
        assert!(matches!(result, Err(Error::Http(_))));
    }
}
