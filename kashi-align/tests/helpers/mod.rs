//! Shared fakes for kashi-align integration tests
//!
//! `FakeInvoker` and `FakeFetcher` stand in for ffmpeg, aeneas and the
//! network, writing plausible artifacts into the scratch paths they are
//! handed so cleanup can be asserted.

#![allow(dead_code)]

use async_trait::async_trait;
use kashi_align::fetch::{AudioFetcher, FetchError};
use kashi_align::pipeline::{AlignmentPipeline, PipelineSettings};
use kashi_align::process::{CommandSpec, ProcessError, ProcessInvoker, ProcessOutput};
use kashi_common::config::{TimeoutsConfig, ToolsConfig};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How a faked tool behaves when invoked
#[derive(Debug, Clone)]
pub enum ToolBehavior {
    /// Write a placeholder to the output path and exit 0
    Succeed,
    /// Write the given text to the output path and exit 0
    Emit(String),
    /// Binary not installed
    Missing,
    /// Exit 1 with the given stderr, after writing a partial output
    Fail(String),
    /// Exceed the time limit
    TimeOut,
    /// Delete the whole scratch directory, then exit 0
    WipeScratch,
}

pub struct FakeInvoker {
    normalize: ToolBehavior,
    align: ToolBehavior,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeInvoker {
    pub fn new(normalize: ToolBehavior, align: ToolBehavior) -> Self {
        Self {
            normalize,
            align,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

fn output_path(command: &CommandSpec) -> PathBuf {
    PathBuf::from(command.args.last().expect("command has an output argument"))
}

#[async_trait]
impl ProcessInvoker for FakeInvoker {
    async fn invoke(&self, command: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        self.calls.lock().unwrap().push(command.clone());

        let behavior = match command.program.as_str() {
            "ffmpeg" => &self.normalize,
            _ => &self.align,
        };
        let output = output_path(command);
        let program = command.program.clone();

        match behavior {
            ToolBehavior::Succeed => {
                std::fs::write(&output, b"RIFF....WAVE").unwrap();
                Ok(ProcessOutput::default())
            }
            ToolBehavior::Emit(text) => {
                std::fs::write(&output, text).unwrap();
                Ok(ProcessOutput::default())
            }
            ToolBehavior::Missing => Err(ProcessError::NotFound { program }),
            ToolBehavior::Fail(stderr) => {
                std::fs::write(&output, b"partial").unwrap();
                Err(ProcessError::NonZeroExit {
                    program,
                    code: Some(1),
                    stderr: stderr.clone(),
                })
            }
            ToolBehavior::TimeOut => Err(ProcessError::Timeout {
                program,
                timeout: command.timeout,
            }),
            ToolBehavior::WipeScratch => {
                let root = output.parent().expect("output lives in scratch root");
                std::fs::remove_dir_all(root).unwrap();
                Ok(ProcessOutput::default())
            }
        }
    }
}

pub struct FakeFetcher {
    fail_with_status: Option<u16>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn ok() -> Self {
        Self {
            fail_with_status: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            fail_with_status: Some(status),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioFetcher for FakeFetcher {
    async fn fetch(&self, url: &Url, dest: &Path) -> Result<u64, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.fail_with_status {
            Some(status) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            None => {
                std::fs::write(dest, b"ID3fake-mp3")?;
                Ok(11)
            }
        }
    }
}

pub fn settings(scratch_dir: &Path) -> PipelineSettings {
    PipelineSettings {
        scratch_dir: scratch_dir.to_path_buf(),
        tools: ToolsConfig::default(),
        timeouts: TimeoutsConfig {
            normalize_secs: 1,
            align_secs: 1,
            ..Default::default()
        },
    }
}

pub fn pipeline(
    scratch_dir: &Path,
    invoker: Arc<FakeInvoker>,
    fetcher: Arc<FakeFetcher>,
) -> AlignmentPipeline {
    AlignmentPipeline::new(invoker, fetcher, settings(scratch_dir))
}

/// Aligner JSON with one direct span per `(begin, end)` pair
pub fn direct_fragments(spans: &[(f64, f64)]) -> String {
    let fragments: Vec<_> = spans
        .iter()
        .map(|(begin, end)| serde_json::json!({ "begin": begin, "end": end }))
        .collect();
    serde_json::json!({ "fragments": fragments }).to_string()
}

/// True when no request artifact remains under `root`
pub fn scratch_is_empty(root: &Path) -> bool {
    match std::fs::read_dir(root) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => !root.exists(),
    }
}
