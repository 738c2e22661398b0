//! Thin JSON client for the node's HTTP API.

use netmgr_node::api::ErrorResponse;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub struct ApiClient {
    endpoint: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.endpoint, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let resp = self.http.get(self.url(path)).send().await.map_err(|e| self.unreachable(e))?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<T> {
        Ok(self.post_empty(path, body).await?.json().await?)
    }

    /// POST for endpoints that answer with a bare status code.
    pub async fn post_empty<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<reqwest::Response> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        Self::check(resp).await
    }

    async fn check(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        match resp.json::<ErrorResponse>().await {
            Ok(err) => anyhow::bail!("request failed (HTTP {}): {}", status, err.error),
            Err(_) => anyhow::bail!("request failed (HTTP {})", status),
        }
    }

    fn unreachable(&self, e: reqwest::Error) -> anyhow::Error {
        anyhow::anyhow!(
            "could not reach node at {}: {}\nIs the node running? Start it with: netmgr-node",
            self.endpoint,
            e
        )
    }
}
