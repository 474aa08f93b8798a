use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use thiserror::Error;

/// Status and raw body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Failed to call the Basestack Flags API: {0}")]
    Network(#[source] Arc<dyn std::error::Error + Send + Sync>),

    #[error("Basestack API request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl TransportError {
    pub fn network<E>(cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TransportError::Network(Arc::new(cause))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

/// The HTTP seam of the client. Only `GET` is needed by the flags API.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<TransportResponse, TransportError>;
}

/// Default transport backed by a `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<TransportResponse, TransportError> {
        let response = self
            .http_client
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(TransportError::network)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(TransportError::network)?;

        Ok(TransportResponse { status, body })
    }
}
