//! kashi-align library interface
//!
//! Aligns lyric lines to an audio recording by orchestrating external
//! tools: download → ffmpeg normalization → aeneas forced alignment →
//! reconciliation against the caller's lines.

pub mod api;
pub mod error;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod preflight;
pub mod process;
pub mod reconcile;
pub mod scratch;
pub mod validation;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::pipeline::{AlignmentPipeline, PipelineError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Stage orchestrator; holds the process and fetch capabilities
    pub pipeline: Arc<AlignmentPipeline>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last pipeline failure for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(pipeline: AlignmentPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn record_error(&self, err: &PipelineError) {
        *self.last_error.write().await = Some(err.to_string());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::align_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
