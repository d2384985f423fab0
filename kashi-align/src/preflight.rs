//! Startup dependency preflight
//!
//! Probes every external tool once, before the listener is bound. All
//! faults are collected (not just the first) so an operator sees the full
//! list in one go. Nothing here touches the request path.

use crate::process::{CommandSpec, ProcessError, ProcessInvoker};
use kashi_common::config::ToolsConfig;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// One external tool and the command that proves it works
#[derive(Debug, Clone)]
pub struct ToolProbe {
    pub tool: String,
    pub command: CommandSpec,
    pub install_hint: String,
}

/// Probes for the normalizer, the TTS engine, and the aligner
pub fn default_probes(tools: &ToolsConfig, timeout: Duration) -> Vec<ToolProbe> {
    vec![
        ToolProbe {
            tool: tools.ffmpeg.clone(),
            command: CommandSpec::new(&tools.ffmpeg, timeout).arg("-version"),
            install_hint: "Install with: brew install ffmpeg (macOS) or apt-get install ffmpeg (Linux)"
                .to_string(),
        },
        ToolProbe {
            tool: tools.espeak.clone(),
            command: CommandSpec::new(&tools.espeak, timeout).arg("--version"),
            install_hint:
                "Install with: brew install espeak-ng (macOS) or apt-get install espeak-ng (Linux)"
                    .to_string(),
        },
        ToolProbe {
            tool: "aeneas".to_string(),
            command: CommandSpec::new(&tools.python, timeout)
                .args(["-c", "import aeneas.tools.execute_task"]),
            install_hint: format!("Install with: {} -m pip install aeneas", tools.python),
        },
    ]
}

/// What went wrong with a probe
#[derive(Debug, Clone, PartialEq)]
pub enum FaultKind {
    Missing,
    Failed { stderr: String },
    TimedOut,
    Unavailable { reason: String },
}

/// A single broken or absent dependency
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyFault {
    pub tool: String,
    pub kind: FaultKind,
    pub install_hint: String,
}

impl fmt::Display for DependencyFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FaultKind::Missing => write!(f, "{} not found. {}", self.tool, self.install_hint),
            FaultKind::Failed { stderr } if stderr.trim().is_empty() => {
                write!(f, "{} is installed but returned an error", self.tool)
            }
            FaultKind::Failed { stderr } => write!(
                f,
                "{} is installed but returned an error: {}",
                self.tool,
                stderr.trim()
            ),
            FaultKind::TimedOut => write!(f, "{} check timed out", self.tool),
            FaultKind::Unavailable { reason } => {
                write!(f, "{} could not be checked: {}", self.tool, reason)
            }
        }
    }
}

/// Run every probe and return all faults, in probe order
pub async fn check_dependencies(
    invoker: &dyn ProcessInvoker,
    probes: &[ToolProbe],
) -> Vec<DependencyFault> {
    let mut faults = Vec::new();

    for probe in probes {
        let kind = match invoker.invoke(&probe.command).await {
            Ok(_) => {
                debug!(tool = %probe.tool, "Dependency available");
                continue;
            }
            Err(ProcessError::NotFound { .. }) => FaultKind::Missing,
            Err(ProcessError::NonZeroExit { stderr, .. }) => FaultKind::Failed { stderr },
            Err(ProcessError::Timeout { .. }) => FaultKind::TimedOut,
            Err(e @ ProcessError::Io { .. }) => FaultKind::Unavailable {
                reason: e.to_string(),
            },
        };
        faults.push(DependencyFault {
            tool: probe.tool.clone(),
            kind,
            install_hint: probe.install_hint.clone(),
        });
    }

    faults
}

/// Every fault found at startup
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub faults: Vec<DependencyFault>,
}

impl fmt::Display for PreflightReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f)?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "DEPENDENCY CHECK FAILED")?;
        writeln!(f, "The following required dependencies are missing or broken:")?;
        writeln!(f)?;
        for fault in &self.faults {
            writeln!(f, "  - {}", fault)?;
        }
        writeln!(f)?;
        writeln!(f, "Please install all dependencies before starting the server.")?;
        write!(f, "{}", rule)
    }
}

impl std::error::Error for PreflightReport {}

/// Gate startup on a clean preflight
pub async fn ensure_ready(
    invoker: &dyn ProcessInvoker,
    probes: &[ToolProbe],
) -> Result<(), PreflightReport> {
    let faults = check_dependencies(invoker, probes).await;
    if faults.is_empty() {
        let names: Vec<&str> = probes.iter().map(|p| p.tool.as_str()).collect();
        info!("✓ All dependencies verified: {}", names.join(", "));
        Ok(())
    } else {
        Err(PreflightReport { faults })
    }
}
