// Outbound call strategies: the envelope-driven REST client and the legacy SOAP client

pub mod envelope;
pub mod legacy;
pub mod rest;

use crate::errors::CallError;
use async_trait::async_trait;

pub use envelope::{determine_method, CallEnvelope, HttpMethod};
pub use legacy::LegacyClient;
pub use rest::RestClient;

/// RequestInvoker turns one envelope into one external round trip
#[async_trait]
pub trait RequestInvoker: Send + Sync {
    async fn invoke(&self, envelope_json: &str) -> Result<String, CallError>;
}
