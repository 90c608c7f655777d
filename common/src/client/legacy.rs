// Legacy SOAP client: forwards a raw envelope unmodified

use crate::config::HttpClientConfig;
use crate::errors::CallError;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::{info, instrument};

const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// LegacyClient posts SOAP envelopes as-is and returns the raw reply
#[derive(Clone)]
pub struct LegacyClient {
    client: Client,
    default_target: String,
}

impl LegacyClient {
    pub fn new(config: &HttpClientConfig) -> Result<Self, CallError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| CallError::ClientInit(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            default_target: config.legacy_base_url.clone(),
        })
    }

    pub fn with_client(client: Client, default_target: impl Into<String>) -> Self {
        Self {
            client,
            default_target: default_target.into(),
        }
    }

    /// Forward `raw` to `target` (or the configured endpoint when absent)
    #[instrument(skip(self, raw), fields(bytes = raw.len()))]
    pub async fn invoke(&self, raw: &str, target: Option<&str>) -> Result<String, CallError> {
        let target = target
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(self.default_target.as_str());

        info!(target = %target, "Forwarding SOAP envelope");

        let response = self
            .client
            .post(target)
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .header("SOAPAction", "")
            .body(raw.to_string())
            .send()
            .await
            .map_err(|e| CallError::External(format!("SOAP call to {} failed: {}", target, e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            CallError::External(format!("Failed to read SOAP response from {}: {}", target, e))
        })?;

        if !status.is_success() {
            return Err(CallError::External(format!(
                "SOAP endpoint {} returned status {}: {}",
                target, status, body
            )));
        }

        Ok(body)
    }
}
