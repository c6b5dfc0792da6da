use crate::transport::{Transport, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Settings for [`HttpTransport`], read from the `[transport]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTransportConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sent as `Authorization: Bearer ...` when present.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bearer_token: None,
        }
    }
}

/// JSON-over-HTTP transport: each endpoint is `POST {base_url}/{endpoint}`.
pub struct HttpTransport {
    config: HttpTransportConfig,
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.bearer_token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: &str,
        payload: serde_json::Value,
        deadline: Duration,
    ) -> Result<serde_json::Value, TransportError> {
        let url = self.url(endpoint);
        debug!(url = %url, "POST capability endpoint");

        let resp = self
            .authorize(self.http.post(&url))
            .timeout(deadline)
            .json(&payload)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = resp.status();
        let body = resp.text().await.map_err(map_send_error)?;

        if !status.is_success() {
            return Err(TransportError::from_status(status.as_u16(), body));
        }
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => Ok(value),
            Err(_) => Ok(serde_json::Value::String(body)),
        }
    }

    /// Any HTTP response counts as reachable; only connection failures and
    /// timeouts fail the probe.
    async fn probe(&self, endpoint: &str, deadline: Duration) -> Result<(), TransportError> {
        self.authorize(self.http.head(self.url(endpoint)))
            .timeout(deadline)
            .send()
            .await
            .map(|_| ())
            .map_err(map_send_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let transport = HttpTransport::new(HttpTransportConfig {
            base_url: "http://host/api/".into(),
            bearer_token: None,
        });
        assert_eq!(transport.url("/table_query"), "http://host/api/table_query");
        assert_eq!(transport.url("records/create"), "http://host/api/records/create");
    }
}
