//! HttpTransport for the KG editor bulk summary endpoint
//!
//! Provides:
//! - Endpoint URL construction
//! - Bearer authentication
//! - Status code handling
//! - Response parsing

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{ApiConfig, DEFAULT_SUMMARY_PATH};
use crate::errors::{ResolverError, Result};
use crate::transport::traits::SummaryTransport;
use crate::transport::wire::SummaryResponse;

/// HTTP transport posting id batches to the summary endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    summary_path: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create new HttpTransport with the default summary path
    ///
    /// # Example
    ///
    /// ```
    /// use kg_labels::transport::HttpTransport;
    ///
    /// let transport = HttpTransport::new("http://localhost:8080".to_string());
    /// ```
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            summary_path: DEFAULT_SUMMARY_PATH.to_string(),
            auth_token: None,
            client: reqwest::Client::new(),
        }
    }

    /// Build a transport from the `spec.api` section of a resolver config
    pub fn from_config(api: &ApiConfig) -> Result<Self> {
        let transport = Self::new(api.base_url.clone())
            .with_summary_path(api.summary_path.clone())
            .with_timeout(api.timeout())?;

        Ok(match &api.auth_token {
            Some(token) => transport.with_auth(token.clone()),
            None => transport,
        })
    }

    /// Add authentication token
    ///
    /// # Example
    ///
    /// ```
    /// use kg_labels::transport::HttpTransport;
    ///
    /// let transport = HttpTransport::new("http://localhost:8080".to_string())
    ///     .with_auth("token123".to_string());
    /// ```
    pub fn with_auth(mut self, token: String) -> Self {
        self.auth_token = Some(token);
        self
    }

    pub fn with_summary_path(mut self, path: String) -> Self {
        self.summary_path = path;
        self
    }

    /// Rebuild the underlying client with a request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    /// Full URL of the summary endpoint
    ///
    /// # Example
    ///
    /// ```
    /// use kg_labels::transport::HttpTransport;
    ///
    /// let transport = HttpTransport::new("http://localhost:8080/".to_string())
    ///     .with_summary_path("/api/summary".to_string());
    /// assert_eq!(transport.summary_url(), "http://localhost:8080/api/summary");
    /// ```
    pub fn summary_url(&self) -> String {
        format!("{}{}", self.base_url, self.summary_path)
    }

    /// Build authorization header
    ///
    /// # Example
    ///
    /// ```
    /// use kg_labels::transport::HttpTransport;
    ///
    /// let transport = HttpTransport::new("http://localhost:8080".to_string())
    ///     .with_auth("token123".to_string());
    ///
    /// let header = transport.build_auth_header().unwrap();
    /// assert_eq!(header, "Bearer token123");
    /// ```
    pub fn build_auth_header(&self) -> Result<String> {
        self.auth_token
            .as_ref()
            .map(|token| format!("Bearer {}", token))
            .ok_or_else(|| ResolverError::ValidationError("No authentication token configured".to_string()))
    }

    /// Map a non-success status to an error carrying the response body
    pub fn handle_status_code(status_code: u16, body: String) -> Result<()> {
        match status_code {
            200..=299 => Ok(()),
            code => Err(ResolverError::Status { code, body }),
        }
    }

    /// Parse a summary response body
    pub fn parse_response(body: &str) -> Result<SummaryResponse> {
        serde_json::from_str(body).map_err(|e| {
            ResolverError::ParseError(format!("Failed to parse summary response: {}", e))
        })
    }
}

#[async_trait]
impl SummaryTransport for HttpTransport {
    async fn resolve_batch(&self, ids: &[String]) -> Result<SummaryResponse> {
        let mut request = self.client.post(self.summary_url()).json(ids);
        if let Ok(header) = self.build_auth_header() {
            request = request.header(reqwest::header::AUTHORIZATION, header);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Self::handle_status_code(status, body.clone())?;
        Self::parse_response(&body)
    }
}
