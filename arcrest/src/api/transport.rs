//! HTTP transport for portal requests

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use super::common::{FormParams, RemoteError};
use super::error::{ApiError, Result};

/// Form-encodes a request, POSTs it and hands back the decoded JSON body.
///
/// Implementations never inspect the body for a portal `error` object; that is
/// left to the caller, which knows which typed error to raise.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_form(&self, url: &str, form: &FormParams) -> Result<Value>;
}

pub struct TransportConfig {
    pub max_idle_connections: usize,
    pub idle_timeout: Duration,
    pub connection_timeout: Duration,
    pub request_timeout: Duration,
    pub tcp_keepalive: Option<Duration>,
    pub insecure: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_idle_connections: 10,
            idle_timeout: Duration::from_secs(90),
            connection_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            tcp_keepalive: Some(Duration::from_secs(30)),
            insecure: false,
        }
    }
}

impl TransportConfig {
    pub fn build_client(&self) -> std::result::Result<reqwest::Client, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .danger_accept_invalid_certs(self.insecure)
            .timeout(self.request_timeout)
            .connect_timeout(self.connection_timeout)
            .pool_idle_timeout(self.idle_timeout)
            .pool_max_idle_per_host(self.max_idle_connections);

        if let Some(keepalive) = self.tcp_keepalive {
            builder = builder.tcp_keepalive(keepalive);
        }

        builder.build()
    }
}

/// `reqwest`-backed transport
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self> {
        Ok(Self {
            http_client: config.build_client()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_form(&self, url: &str, form: &FormParams) -> Result<Value> {
        tracing::debug!("POST request to: {} [{}]", url, form.redacted());

        let response = self
            .http_client
            .post(url)
            .form(form.pairs())
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("Response status: {}", status);

        let text = response.text().await?;

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let message = if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("Unauthorized").to_string()
            } else {
                text
            };
            return Err(ApiError::Auth(RemoteError::new(
                Some(i64::from(status.as_u16())),
                message,
            )));
        }

        if !status.is_success() {
            tracing::error!("API error response: {}", text);
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: text,
            });
        }

        parse_body(&text)
    }
}

pub(crate) fn parse_body(text: &str) -> Result<Value> {
    serde_json::from_str::<Value>(text).map_err(|e| {
        tracing::error!("Failed to parse response: {}, body: {}", e, text);
        ApiError::MalformedResponse(format!("response is not valid JSON: {}", e))
    })
}
