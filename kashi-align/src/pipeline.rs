//! Alignment pipeline orchestration
//!
//! One validated request runs through a strictly linear state machine:
//!
//! `Fetching → Normalizing → WritingLyrics → Aligning → Reconciling → {Done | Failed}`
//!
//! Stages run sequentially with no retries; the first failure aborts the
//! pipeline. The request's [`PipelineContext`] is acquired before the first
//! stage and released after the terminal transition, whatever the outcome.

use crate::fetch::{AudioFetcher, FetchError};
use crate::models::{AlignmentRequest, AlignmentResult};
use crate::process::{CommandSpec, ProcessError, ProcessInvoker};
use crate::reconcile::{self, ReconciliationError};
use crate::scratch::PipelineContext;
use kashi_common::config::{ServiceConfig, TimeoutsConfig, ToolsConfig};
use kashi_common::ResourceToken;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Normalizing,
    WritingLyrics,
    Aligning,
    Reconciling,
}

impl Stage {
    /// Stable identifier used in API error bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::Normalizing => "normalizing",
            Stage::WritingLyrics => "writing_lyrics",
            Stage::Aligning => "aligning",
            Stage::Reconciling => "reconciling",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Fetching => "audio download",
            Stage::Normalizing => "audio conversion",
            Stage::WritingLyrics => "lyrics file preparation",
            Stage::Aligning => "forced alignment",
            Stage::Reconciling => "alignment parsing",
        };
        f.write_str(label)
    }
}

/// Terminal failure of a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller-supplied audio source could not be retrieved
    #[error("Failed to download audio: {0}")]
    Fetch(FetchError),

    /// Required binary absent; server configuration fault
    #[error("{stage} failed: {program} not found. Please install {program}.")]
    ToolMissing { stage: Stage, program: String },

    /// Tool ran and failed or timed out; `detail` carries its stderr verbatim
    #[error("{stage} failed: {detail}")]
    ToolExecution { stage: Stage, detail: String },

    /// Aligner output does not match the request
    #[error("alignment parsing failed: {0}")]
    Reconciliation(ReconciliationError),

    /// Anything not otherwise classified
    #[error("Unexpected error during {stage}: {message}")]
    Unexpected { stage: Stage, message: String },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Fetch(_) => Stage::Fetching,
            PipelineError::Reconciliation(_) => Stage::Reconciling,
            PipelineError::ToolMissing { stage, .. }
            | PipelineError::ToolExecution { stage, .. }
            | PipelineError::Unexpected { stage, .. } => *stage,
        }
    }

    fn from_fetch(err: FetchError) -> Self {
        match err {
            FetchError::Storage(e) => PipelineError::Unexpected {
                stage: Stage::Fetching,
                message: e.to_string(),
            },
            FetchError::Client(message) => PipelineError::Unexpected {
                stage: Stage::Fetching,
                message,
            },
            other => PipelineError::Fetch(other),
        }
    }

    fn from_process(stage: Stage, err: ProcessError) -> Self {
        match err {
            ProcessError::NotFound { program } => PipelineError::ToolMissing { stage, program },
            ProcessError::NonZeroExit { stderr, .. } => PipelineError::ToolExecution {
                stage,
                detail: stderr,
            },
            err @ ProcessError::Timeout { .. } => PipelineError::ToolExecution {
                stage,
                detail: err.to_string(),
            },
            err @ ProcessError::Io { .. } => PipelineError::Unexpected {
                stage,
                message: err.to_string(),
            },
        }
    }
}

/// Static inputs for every pipeline run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub scratch_dir: PathBuf,
    pub tools: ToolsConfig,
    pub timeouts: TimeoutsConfig,
}

impl PipelineSettings {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            scratch_dir: config.scratch_dir.clone(),
            tools: config.tools.clone(),
            timeouts: config.timeouts.clone(),
        }
    }
}

/// Normalization: mono, 16 kHz WAV
pub fn normalize_command(ffmpeg: &str, input: &Path, output: &Path, timeout: Duration) -> CommandSpec {
    CommandSpec::new(ffmpeg, timeout)
        .arg("-i")
        .arg(input)
        .args(["-ac", "1", "-ar", "16000", "-y"])
        .arg(output)
}

/// Forced alignment via aeneas, JSON output, plain-text input
pub fn align_command(
    tools: &ToolsConfig,
    audio: &Path,
    lyrics: &Path,
    output: &Path,
    timeout: Duration,
) -> CommandSpec {
    let task = format!(
        "task_language={}|os_task_file_format=json|is_text_type=plain",
        tools.language
    );
    CommandSpec::new(&tools.python, timeout)
        .args(["-m", "aeneas.tools.execute_task"])
        .arg(audio)
        .arg(lyrics)
        .arg(task)
        .arg(output)
}

/// Write one trimmed line per input element, each `\n`-terminated
pub async fn write_lyrics(path: &Path, lines: &[String]) -> std::io::Result<()> {
    let mut contents = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
    for line in lines {
        contents.push_str(line.trim());
        contents.push('\n');
    }
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(contents.as_bytes()).await?;
    file.flush().await
}

/// Orchestrates one request through every stage
pub struct AlignmentPipeline {
    invoker: Arc<dyn ProcessInvoker>,
    fetcher: Arc<dyn AudioFetcher>,
    settings: PipelineSettings,
}

impl AlignmentPipeline {
    pub fn new(
        invoker: Arc<dyn ProcessInvoker>,
        fetcher: Arc<dyn AudioFetcher>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            invoker,
            fetcher,
            settings,
        }
    }

    /// Run the full pipeline for a validated request
    pub async fn run(
        &self,
        request: &AlignmentRequest,
    ) -> Result<Vec<AlignmentResult>, PipelineError> {
        let ctx = PipelineContext::acquire(&self.settings.scratch_dir);
        let request_id = *ctx.token();
        let started = Instant::now();

        info!(
            request_id = %request_id,
            lines = request.lines.len(),
            audio_url = %request.audio_url,
            "Alignment started"
        );

        let outcome = self.run_stages(&ctx, request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(results) => info!(
                request_id = %request_id,
                results = results.len(),
                elapsed_ms,
                "Alignment done"
            ),
            Err(e) => warn!(
                request_id = %request_id,
                stage = e.stage().as_str(),
                elapsed_ms,
                error = %e,
                "Alignment failed"
            ),
        }

        ctx.release().await;
        outcome
    }

    async fn run_stages(
        &self,
        ctx: &PipelineContext,
        request: &AlignmentRequest,
    ) -> Result<Vec<AlignmentResult>, PipelineError> {
        let id = ctx.token();
        let paths = ctx.paths();
        let tools = &self.settings.tools;
        let timeouts = &self.settings.timeouts;

        enter(id, Stage::Fetching);
        self.fetcher
            .fetch(&request.audio_url, &paths.raw_audio)
            .await
            .map_err(PipelineError::from_fetch)?;

        enter(id, Stage::Normalizing);
        let normalize = normalize_command(
            &tools.ffmpeg,
            &paths.raw_audio,
            &paths.normalized_audio,
            timeouts.normalize(),
        );
        self.invoke(id, Stage::Normalizing, &normalize).await?;

        enter(id, Stage::WritingLyrics);
        write_lyrics(&paths.lyrics, &request.lines)
            .await
            .map_err(|e| PipelineError::Unexpected {
                stage: Stage::WritingLyrics,
                message: e.to_string(),
            })?;

        enter(id, Stage::Aligning);
        let align = align_command(
            tools,
            &paths.normalized_audio,
            &paths.lyrics,
            &paths.alignment,
            timeouts.align(),
        );
        self.invoke(id, Stage::Aligning, &align).await?;

        enter(id, Stage::Reconciling);
        reconcile::reconcile_file(&paths.alignment, &request.lines)
            .await
            .map_err(PipelineError::Reconciliation)
    }

    async fn invoke(
        &self,
        id: &ResourceToken,
        stage: Stage,
        command: &CommandSpec,
    ) -> Result<(), PipelineError> {
        debug!(request_id = %id, stage = stage.as_str(), command = %command.display(), "Invoking");
        self.invoker
            .invoke(command)
            .await
            .map(|_| ())
            .map_err(|e| PipelineError::from_process(stage, e))
    }
}

fn enter(id: &ResourceToken, stage: Stage) {
    debug!(request_id = %id, stage = stage.as_str(), "Entering stage");
}
