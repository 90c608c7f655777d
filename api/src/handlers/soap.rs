use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::state::AppState;

const DEFAULT_VERSION: &str = "v1";
const DEFAULT_METHOD: &str = "POST";
const DEFAULT_CONTENT_TYPE: &str = "text/xml";

fn header_or<'a>(headers: &'a HeaderMap, name: &str, default: &'a str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn xml_error(status: StatusCode, message: &str) -> Response {
    xml_response(status, format!("<error>{}</error>", escape_xml(message)))
}

/// Forward a SOAP request
///
/// `X-version: v1` posts the envelope through the legacy client;
/// `v2` wraps it in a call envelope for the REST client.
#[tracing::instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn invoke(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    if body.trim().is_empty() {
        return xml_error(StatusCode::BAD_REQUEST, "SOAP request cannot be null or empty");
    }

    let version = header_or(&headers, "X-version", DEFAULT_VERSION);
    let http_method = header_or(&headers, "X-http-method", DEFAULT_METHOD);
    let content_type = header_or(&headers, "X-http-content-type", DEFAULT_CONTENT_TYPE);
    let base_url = header_or(&headers, "X-Base-URL", &state.config.http.legacy_base_url);

    let result = if version.starts_with("v1") {
        state.legacy_client.invoke(&body, Some(base_url)).await
    } else if version.starts_with("v2") {
        let envelope = json!({
            "httpMethod": http_method,
            "requestBody": body,
            "baseUrl": base_url,
            "headers": {"Content-Type": content_type},
        });
        state.rest_client.invoke_envelope(&envelope.to_string()).await
    } else {
        tracing::warn!(version = %version, "Unsupported SOAP version");
        return xml_error(
            StatusCode::BAD_REQUEST,
            &format!("Unsupported SOAP version: {}", version),
        );
    };

    match result {
        Ok(reply) => xml_response(StatusCode::OK, reply),
        Err(e) => {
            tracing::error!(version = %version, error = %e, "SOAP invocation failed");
            xml_error(StatusCode::BAD_REQUEST, &e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_header_defaults() {
        let mut headers = HeaderMap::new();
        assert_eq!(header_or(&headers, "X-version", DEFAULT_VERSION), "v1");

        headers.insert("x-version", HeaderValue::from_static("v2"));
        headers.insert("X-http-method", HeaderValue::from_static("  "));
        assert_eq!(header_or(&headers, "X-version", DEFAULT_VERSION), "v2");
        assert_eq!(header_or(&headers, "X-http-method", DEFAULT_METHOD), "POST");
    }

    #[test]
    fn test_error_message_is_escaped() {
        assert_eq!(escape_xml("a<b>&c"), "a&lt;b&gt;&amp;c");
    }
}
