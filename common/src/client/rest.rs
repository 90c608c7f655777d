// Dynamic REST client: builds and sends the call an envelope describes

use crate::client::envelope::CallEnvelope;
use crate::client::RequestInvoker;
use crate::config::HttpClientConfig;
use crate::errors::CallError;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// RestClient executes envelope-described HTTP calls
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    default_base_url: Option<String>,
}

impl RestClient {
    /// Create a client from the configured timeout and fallback base URL
    pub fn new(config: &HttpClientConfig) -> Result<Self, CallError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CallError::ClientInit(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            default_base_url: config.default_base_url.clone(),
        })
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: Client, default_base_url: Option<String>) -> Self {
        Self {
            client,
            default_base_url,
        }
    }

    /// Parse an envelope and execute it
    #[instrument(skip_all)]
    pub async fn invoke_envelope(&self, envelope_json: &str) -> Result<String, CallError> {
        let envelope = CallEnvelope::parse(envelope_json)?;
        self.execute(&envelope).await
    }

    /// Execute a parsed envelope, returning the raw response body
    pub async fn execute(&self, envelope: &CallEnvelope) -> Result<String, CallError> {
        let url = envelope.resolve_url(self.default_base_url.as_deref())?;
        let method = envelope.method;

        info!(
            method = %method,
            url = %url,
            uri_variables = ?envelope.uri_variables,
            "Executing outbound request"
        );

        let mut request = self.client.request(method.to_reqwest(), url.clone());

        for (name, value) in &envelope.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| CallError::InvalidHeader {
                    name: name.clone(),
                    reason: e.to_string(),
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| CallError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            debug!(header = %header_name, "Adding header");
            request = request.header(header_name, header_value);
        }

        if let Some(body) = &envelope.body {
            if envelope.header("Content-Type").is_none() {
                request = request.header(CONTENT_TYPE, "application/json");
            }
            debug!("Adding request body ({} bytes)", body.len());
            request = request.body(body.clone());
        }

        let response = request
            .send()
            .await
            .map_err(|e| CallError::External(format!("{} {} failed: {}", method, url, e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            CallError::External(format!("Failed to read response from {}: {}", url, e))
        })?;

        if !status.is_success() {
            warn!(status = status.as_u16(), url = %url, "External endpoint returned an error status");
            return Err(CallError::External(format!(
                "{} {} returned status {}: {}",
                method, url, status, body
            )));
        }

        info!(status = status.as_u16(), response = %body, "Received outbound response");
        Ok(body)
    }
}

#[async_trait]
impl RequestInvoker for RestClient {
    async fn invoke(&self, envelope_json: &str) -> Result<String, CallError> {
        self.invoke_envelope(envelope_json).await
    }
}
