// Call envelope: a schema-less JSON description of one outbound HTTP call

use crate::errors::CallError;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Url;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

lazy_static! {
    /// `{name}` or `{name:pattern}` placeholders in a path template
    static ref PLACEHOLDER: Regex = Regex::new(r"\{([^{}:]+)(?::[^{}]*)?\}").expect("Invalid regex pattern");
}

/// HTTP methods an envelope can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive method selection; anything unrecognised (or absent) is GET
pub fn determine_method(value: Option<&str>) -> HttpMethod {
    match value.map(|m| m.trim().to_ascii_uppercase()).as_deref() {
        Some("POST") => HttpMethod::Post,
        Some("PUT") => HttpMethod::Put,
        Some("DELETE") => HttpMethod::Delete,
        Some("PATCH") => HttpMethod::Patch,
        _ => HttpMethod::Get,
    }
}

/// A parsed envelope, ready to be resolved into a URL and sent
#[derive(Debug, Clone, PartialEq)]
pub struct CallEnvelope {
    pub base_url: Option<String>,
    pub path: String,
    pub query_params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub method: HttpMethod,
    pub uri_variables: Vec<String>,
    /// Serialized `requestBody`; a JSON string keeps its quotes
    pub body: Option<String>,
}

impl CallEnvelope {
    pub fn parse(envelope_json: &str) -> Result<Self, CallError> {
        let value: Value = serde_json::from_str(envelope_json)
            .map_err(|e| CallError::InvalidEnvelope(format!("not valid JSON: {}", e)))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, CallError> {
        let root = value
            .as_object()
            .ok_or_else(|| CallError::InvalidEnvelope("envelope must be a JSON object".to_string()))?;

        let base_url = text_field(root, "baseUrl").filter(|url| !url.trim().is_empty());
        let path = text_field(root, "path").unwrap_or_else(|| "/".to_string());
        let variables_path = text_field(root, "uriVariablesPath");

        let query_params = multi_valued(root.get("queryParams"), "query parameter");
        let headers = single_valued(root.get("headers"));
        let uri_variables = uri_variables(root.get("uriVariables"), variables_path.as_deref());
        let method = determine_method(text_field(root, "httpMethod").as_deref());
        let body = request_body(root.get("requestBody"))?;

        Ok(Self {
            base_url,
            path,
            query_params,
            headers,
            method,
            uri_variables,
            body,
        })
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Expand the path template, consuming `uri_variables` in placeholder order.
    ///
    /// A placeholder name seen twice reuses its first value.
    pub fn expand_path(&self) -> Result<Vec<String>, CallError> {
        let mut values = self.uri_variables.iter();
        let mut seen: HashMap<&str, &str> = HashMap::new();

        let template = self.path.strip_prefix('/').unwrap_or(&self.path);
        let mut segments = Vec::new();

        for segment in template.split('/') {
            let mut expanded = String::with_capacity(segment.len());
            let mut last = 0;
            for captures in PLACEHOLDER.captures_iter(segment) {
                let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                    continue;
                };
                let name = name.as_str().trim();
                let value = match seen.get(name) {
                    Some(value) => *value,
                    None => {
                        let value = values
                            .next()
                            .ok_or_else(|| CallError::MissingUriVariable(self.path.clone()))?;
                        seen.insert(name, value.as_str());
                        value.as_str()
                    }
                };
                expanded.push_str(&segment[last..whole.start()]);
                expanded.push_str(value);
                last = whole.end();
            }
            expanded.push_str(&segment[last..]);
            segments.push(expanded);
        }

        Ok(segments)
    }

    /// Build the absolute URL from the base, the expanded path and the query
    pub fn resolve_url(&self, default_base_url: Option<&str>) -> Result<Url, CallError> {
        let base = self
            .base_url
            .as_deref()
            .or(default_base_url)
            .ok_or(CallError::MissingBaseUrl)?;

        let mut url = Url::parse(base).map_err(|e| CallError::InvalidUrl {
            url: base.to_string(),
            reason: e.to_string(),
        })?;

        let segments = self.expand_path()?;
        {
            let mut path = url.path_segments_mut().map_err(|_| CallError::InvalidUrl {
                url: base.to_string(),
                reason: "URL cannot carry a path".to_string(),
            })?;
            path.pop_if_empty();
            for segment in &segments {
                path.push(segment);
            }
        }

        if !self.query_params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (name, value) in &self.query_params {
                query.append_pair(name, value);
            }
        }

        Ok(url)
    }
}

fn text_field(root: &Map<String, Value>, name: &str) -> Option<String> {
    root.get(name).and_then(scalar_text)
}

/// Text of a scalar; nested values are rendered as compact JSON, null is None
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn multi_valued(node: Option<&Value>, label: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let Some(Value::Object(map)) = node else {
        return params;
    };

    for (name, value) in map {
        match value {
            Value::Null => warn!(parameter = %name, "Skipping {} with a null value", label),
            Value::Array(items) => {
                for item in items {
                    match scalar_text(item) {
                        Some(text) => params.push((name.clone(), text)),
                        None => warn!(parameter = %name, "Skipping null element of {}", label),
                    }
                }
            }
            other => {
                if let Some(text) = scalar_text(other) {
                    params.push((name.clone(), text));
                }
            }
        }
    }
    params
}

fn single_valued(node: Option<&Value>) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    let Some(Value::Object(map)) = node else {
        return headers;
    };

    for (name, value) in map {
        match scalar_text(value) {
            Some(text) => {
                match headers
                    .iter_mut()
                    .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
                {
                    Some(slot) => slot.1 = text,
                    None => headers.push((name.clone(), text)),
                }
            }
            None => warn!(header = %name, "Skipping header with a null value"),
        }
    }
    headers
}

fn uri_variables(node: Option<&Value>, variables_path: Option<&str>) -> Vec<String> {
    let Some(Value::Object(map)) = node else {
        return Vec::new();
    };

    match variables_path {
        Some(name) => match map.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| scalar_text(item).unwrap_or_default())
                .collect(),
            _ => {
                warn!(
                    uri_variables_path = %name,
                    "uriVariablesPath not found or not an array; using no URI variables"
                );
                Vec::new()
            }
        },
        None => map
            .values()
            .map(|value| scalar_text(value).unwrap_or_default())
            .collect(),
    }
}

fn request_body(node: Option<&Value>) -> Result<Option<String>, CallError> {
    match node {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::to_string(value)
            .map(Some)
            .map_err(|e| CallError::BodySerialization(e.to_string())),
    }
}
