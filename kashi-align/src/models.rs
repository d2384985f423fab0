//! Request and response types for the alignment API

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw `POST /align` body, before validation
///
/// `lines` elements stay untyped so the validator can report a non-string
/// element by index instead of failing deserialization wholesale.
#[derive(Debug, Clone, Deserialize)]
pub struct AlignmentRequestBody {
    pub audio_url: String,
    #[serde(alias = "lyrics")]
    pub lines: Vec<Value>,
}

/// A validated alignment request
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRequest {
    /// Absolute http(s) URL of the recording
    pub audio_url: Url,
    /// Ordered, non-empty, single-line lyric lines
    pub lines: Vec<String>,
}

/// Timing for one input line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentResult {
    /// 1-based position in the input
    pub line_index: usize,
    /// Verbatim input line
    pub text: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
}
