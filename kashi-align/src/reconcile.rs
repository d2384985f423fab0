//! Result reconciliation
//!
//! Maps the aligner's JSON output back onto the caller's ordered lines.
//! Positional correspondence is the only link between timings and text, so
//! the fragment count must match the line count exactly.
//!
//! The aligner emits each fragment in one of two shapes:
//! - a direct `begin`/`end` pair
//! - a nested `lines` sequence of sub-line records, whose envelope
//!   `(first.begin, last.end)` is the fragment's span
//!
//! Both shapes are resolved once into [`RawAlignmentFragment`], after which
//! span extraction is total.

use crate::models::AlignmentResult;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Aligner output does not match the request
#[derive(Debug, Error)]
pub enum ReconciliationError {
    #[error("alignment output {path} could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse alignment output: {0}")]
    Parse(String),

    #[error("alignment mismatch: {fragments} fragments for {lines} lines")]
    CountMismatch { fragments: usize, lines: usize },

    #[error("fragment {fragment} has no timing information")]
    MissingTiming { fragment: usize },

    #[error("fragment {fragment} has an invalid span ({start}, {end})")]
    InvalidSpan {
        fragment: usize,
        start: f64,
        end: f64,
    },
}

/// Timestamp as emitted by the aligner: a JSON number or a decimal string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(f64),
    Text(String),
}

impl Seconds {
    fn value(&self) -> Result<f64, ReconciliationError> {
        match self {
            Seconds::Number(v) => Ok(*v),
            Seconds::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| ReconciliationError::Parse(format!("invalid timestamp '{}'", s))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AlignmentOutput {
    #[serde(default)]
    fragments: Vec<FragmentRecord>,
}

/// One fragment exactly as written by the aligner
#[derive(Debug, Deserialize)]
struct FragmentRecord {
    #[serde(default)]
    begin: Option<Seconds>,
    #[serde(default)]
    end: Option<Seconds>,
    /// Plain text for the direct shape, sub-line records for the nested one
    #[serde(default)]
    lines: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SubLineRecord {
    begin: Seconds,
    end: Seconds,
}

/// Sub-line timing inside a nested fragment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubSpan {
    pub begin: f64,
    pub end: f64,
}

/// A fragment with its shape resolved
#[derive(Debug, Clone, PartialEq)]
pub enum RawAlignmentFragment {
    DirectSpan { begin: f64, end: f64 },
    NestedSpans { first: SubSpan, rest: Vec<SubSpan> },
}

impl RawAlignmentFragment {
    /// `(start, end)` of the whole fragment
    pub fn span(&self) -> (f64, f64) {
        match self {
            RawAlignmentFragment::DirectSpan { begin, end } => (*begin, *end),
            RawAlignmentFragment::NestedSpans { first, rest } => {
                (first.begin, rest.last().unwrap_or(first).end)
            }
        }
    }

    /// Resolve a record's shape; `fragment` is 1-based, for error reporting
    fn resolve(record: FragmentRecord, fragment: usize) -> Result<Self, ReconciliationError> {
        if let (Some(begin), Some(end)) = (&record.begin, &record.end) {
            return Ok(RawAlignmentFragment::DirectSpan {
                begin: begin.value()?,
                end: end.value()?,
            });
        }

        let mut spans = record
            .lines
            .into_iter()
            .map(|value| {
                let sub: SubLineRecord = serde_json::from_value(value)
                    .map_err(|_| ReconciliationError::MissingTiming { fragment })?;
                Ok(SubSpan {
                    begin: sub.begin.value()?,
                    end: sub.end.value()?,
                })
            })
            .collect::<Result<Vec<_>, ReconciliationError>>()?
            .into_iter();

        match spans.next() {
            Some(first) => Ok(RawAlignmentFragment::NestedSpans {
                first,
                rest: spans.collect(),
            }),
            None => Err(ReconciliationError::MissingTiming { fragment }),
        }
    }
}

/// Parse aligner JSON and reconcile it against `lines`
pub fn reconcile(json: &str, lines: &[String]) -> Result<Vec<AlignmentResult>, ReconciliationError> {
    let output: AlignmentOutput =
        serde_json::from_str(json).map_err(|e| ReconciliationError::Parse(e.to_string()))?;

    if output.fragments.len() != lines.len() {
        return Err(ReconciliationError::CountMismatch {
            fragments: output.fragments.len(),
            lines: lines.len(),
        });
    }

    output
        .fragments
        .into_iter()
        .zip(lines)
        .enumerate()
        .map(|(i, (record, text))| {
            let line_index = i + 1;
            let (start, end) = RawAlignmentFragment::resolve(record, line_index)?.span();
            if !(start.is_finite() && end.is_finite() && start >= 0.0 && end >= start) {
                return Err(ReconciliationError::InvalidSpan {
                    fragment: line_index,
                    start,
                    end,
                });
            }
            Ok(AlignmentResult {
                line_index,
                text: text.clone(),
                start,
                end,
            })
        })
        .collect()
}

/// Read the alignment artifact at `path` and reconcile it
pub async fn reconcile_file(
    path: &Path,
    lines: &[String],
) -> Result<Vec<AlignmentResult>, ReconciliationError> {
    let json = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ReconciliationError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
    reconcile(&json, lines)
}
