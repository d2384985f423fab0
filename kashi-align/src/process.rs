//! External process invocation
//!
//! Stages depend on the [`ProcessInvoker`] capability rather than on
//! `tokio::process` directly, so tests can substitute a fake without
//! spawning anything.
//!
//! # Guarantees
//! - Output is fully drained while the child runs (no pipe deadlock)
//! - Each child leads its own process group (unix); the group is killed on
//!   every exit path, so helpers it started never outlive the invocation
//! - The child itself is always reaped before returning

use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// One external command to run
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<OsString>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Human-readable command line, for logs
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Captured output of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Why an invocation failed
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Binary absent from the execution environment
    #[error("{program} not found")]
    NotFound { program: String },

    /// Exceeded its allotted duration and was killed
    #[error("{program} timed out after {}s", .timeout.as_secs_f64())]
    Timeout { program: String, timeout: Duration },

    /// Ran and reported failure
    #[error("{program} exited with {}: {stderr}", describe_code(.code))]
    NonZeroExit {
        program: String,
        /// `None` when terminated by a signal
        code: Option<i32>,
        stderr: String,
    },

    /// Spawn or wait failed for another reason
    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    pub fn program(&self) -> &str {
        match self {
            ProcessError::NotFound { program }
            | ProcessError::Timeout { program, .. }
            | ProcessError::NonZeroExit { program, .. }
            | ProcessError::Io { program, .. } => program,
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// Capability to run an external command
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    async fn invoke(&self, command: &CommandSpec) -> Result<ProcessOutput, ProcessError>;
}

/// [`ProcessInvoker`] backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessInvoker;

#[async_trait]
impl ProcessInvoker for TokioProcessInvoker {
    async fn invoke(&self, command: &CommandSpec) -> Result<ProcessOutput, ProcessError> {
        let program = command.program.clone();
        let started = Instant::now();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ProcessError::NotFound {
                program: program.clone(),
            },
            _ => ProcessError::Io {
                program: program.clone(),
                source,
            },
        })?;

        let group = ProcessGroup::of(&child, &program);
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let run = async {
            // Leftover helpers may still hold the pipes open once the child
            // exits; killing the group lets both drains reach EOF.
            let wait = async {
                let status = child.wait().await;
                group.kill();
                status
            };
            let (status, out, err) = tokio::join!(
                wait,
                drain(stdout.as_mut()),
                drain(stderr.as_mut())
            );
            Ok::<_, io::Error>((status?, out?, err?))
        };

        let outcome = tokio::time::timeout(command.timeout, run).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok((status, out, err))) => {
                let stdout = String::from_utf8_lossy(&out).into_owned();
                let stderr = String::from_utf8_lossy(&err).into_owned();
                debug!(
                    program = %program,
                    elapsed_ms,
                    code = ?status.code(),
                    "External process finished"
                );
                match status.code() {
                    Some(0) => Ok(ProcessOutput {
                        stdout,
                        stderr,
                        exit_code: 0,
                    }),
                    code => Err(ProcessError::NonZeroExit {
                        program,
                        code,
                        stderr,
                    }),
                }
            }
            Ok(Err(source)) => {
                terminate(&mut child, &group).await;
                Err(ProcessError::Io { program, source })
            }
            Err(_) => {
                warn!(program = %program, elapsed_ms, "External process timed out, killing");
                terminate(&mut child, &group).await;
                Err(ProcessError::Timeout {
                    program,
                    timeout: command.timeout,
                })
            }
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<&mut R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Process group led by a spawned child
///
/// Dropping it kills every remaining member, which covers a cancelled
/// caller future as well as the explicit paths.
#[cfg_attr(not(unix), allow(dead_code))]
struct ProcessGroup {
    pgid: Option<u32>,
    program: String,
    killed: AtomicBool,
}

impl ProcessGroup {
    fn of(child: &tokio::process::Child, program: &str) -> Self {
        Self {
            pgid: child.id(),
            program: program.to_string(),
            killed: AtomicBool::new(false),
        }
    }

    #[cfg(unix)]
    fn kill(&self) {
        let Some(pgid) = self.pgid else { return };
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        // SAFETY: killpg only sends a signal; no memory is shared with the callee
        let rc = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            let e = io::Error::last_os_error();
            // ESRCH: every member has already exited
            if e.raw_os_error() != Some(libc::ESRCH) {
                warn!(program = %self.program, pgid, error = %e, "Failed to kill process group");
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Kill the whole group, then kill and reap the child so no zombie is left
async fn terminate(child: &mut tokio::process::Child, group: &ProcessGroup) {
    group.kill();
    if let Err(e) = child.kill().await {
        warn!(program = %group.program, error = %e, "Failed to kill external process");
    }
}
