//! Request validation
//!
//! Pure checks run before any network access or process spawn.

use crate::models::{AlignmentRequest, AlignmentRequestBody};
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;

/// Malformed request shape
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("lines cannot be empty")]
    EmptyLines,

    #[error("lines[{index}] is blank")]
    Blank { index: usize },

    #[error("lines[{index}] must be a string, got {found}")]
    NotText { index: usize, found: &'static str },

    #[error(
        "lines[{index}] contains a line break. Each item in lines must be a single line; \
         split multiline strings into separate list items"
    )]
    Multiline { index: usize },

    #[error("audio_url is not a valid absolute URL: {reason}")]
    InvalidUrl { reason: String },

    #[error("malformed request body: {0}")]
    Body(String),
}

/// Validate a raw request body
pub fn validate_request(body: AlignmentRequestBody) -> Result<AlignmentRequest, ValidationError> {
    let lines = validate_lines(body.lines)?;
    let audio_url = validate_audio_url(&body.audio_url)?;
    Ok(AlignmentRequest { audio_url, lines })
}

fn validate_lines(raw: Vec<Value>) -> Result<Vec<String>, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::EmptyLines);
    }

    raw.into_iter()
        .enumerate()
        .map(|(index, value)| match value {
            Value::String(line) if is_multiline(&line) => Err(ValidationError::Multiline { index }),
            Value::String(line) if line.trim().is_empty() => Err(ValidationError::Blank { index }),
            Value::String(line) => Ok(line),
            other => Err(ValidationError::NotText {
                index,
                found: json_type_name(&other),
            }),
        })
        .collect()
}

fn is_multiline(line: &str) -> bool {
    line.contains(['\n', '\r', '\u{2028}', '\u{2029}'])
}

fn validate_audio_url(raw: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(raw.trim()).map_err(|e| ValidationError::InvalidUrl {
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidUrl {
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidUrl {
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
