use std::collections::HashMap;

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use common::errors::ApiError;

use crate::handlers::ErrorResponse;
use crate::state::AppState;

/// Read the named multipart parts as UTF-8 text
async fn read_text_parts(
    mut multipart: Multipart,
    names: &[&str],
) -> Result<HashMap<String, String>, ErrorResponse> {
    let mut parts = HashMap::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ErrorResponse::new("validation_error", format!("Invalid multipart body: {}", e))
    })? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if !names.contains(&name.as_str()) {
            continue;
        }

        let bytes = field.bytes().await.map_err(|e| {
            tracing::warn!(part = %name, error = %e, "Failed to read uploaded part");
            ErrorResponse::new("validation_error", "Failed to read file content")
        })?;
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|_| ErrorResponse::new("validation_error", "Failed to read file content"))?;
        parts.insert(name, text);
    }

    for name in names {
        if !parts.contains_key(*name) {
            return Err(ErrorResponse::new(
                "validation_error",
                format!("Missing multipart part '{}'", name),
            ));
        }
    }
    Ok(parts)
}

fn json_response(body: String) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

/// Transform an uploaded JSON document with an uploaded spec
#[tracing::instrument(skip(state, multipart))]
pub async fn transform(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ErrorResponse> {
    let parts = read_text_parts(multipart, &["input_json", "transformer_spec"]).await?;

    let output = state
        .transformer
        .transform(&parts["input_json"], &parts["transformer_spec"])
        .map_err(|e| ErrorResponse::from(ApiError::from(e)))?;

    Ok(json_response(output))
}

/// Invoke the envelope in `input_json`, then transform the response
#[tracing::instrument(skip(state, multipart))]
pub async fn invoke_api_transform(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ErrorResponse> {
    let parts = read_text_parts(multipart, &["input_json", "output_transformer_spec"]).await?;

    let response = state
        .rest_client
        .invoke_envelope(&parts["input_json"])
        .await
        .map_err(|e| ErrorResponse::from(ApiError::from(e)))?;

    let output = state
        .transformer
        .transform(&response, &parts["output_transformer_spec"])
        .map_err(|e| ErrorResponse::from(ApiError::from(e)))?;

    Ok(json_response(output))
}
