use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use std::time::Duration;
use tracing::debug;

use crate::errors::TransportError;

/// A fully built request to the hub
#[derive(Debug, Clone)]
pub struct HubRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Raw response from the hub
#[derive(Debug, Clone, Default)]
pub struct HubResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HubResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes hub requests
///
/// The client has no retry or pooling policy of its own; implementations
/// decide how requests reach the network.
#[async_trait]
pub trait HubTransport: Send + Sync {
    async fn exec(&self, request: HubRequest) -> Result<HubResponse, TransportError>;
}

/// [`HubTransport`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Transport whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl HubTransport for ReqwestTransport {
    async fn exec(&self, request: HubRequest) -> Result<HubResponse, TransportError> {
        let response = self
            .http_client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!(status, bytes = body.len(), "Hub response received");

        Ok(HubResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_status_classes() {
        let mut response = HubResponse {
            status: 201,
            ..Default::default()
        };
        assert!(response.is_success());

        response.status = 404;
        assert!(!response.is_success());

        response.status = 199;
        assert!(!response.is_success());
    }

    #[test]
    fn test_response_text_is_lossy() {
        let response = HubResponse {
            status: 400,
            headers: HeaderMap::new(),
            body: vec![b'o', b'k', 0xff],
        };
        assert!(response.text().starts_with("ok"));
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new(Duration::from_secs(5)).is_ok());
    }
}
