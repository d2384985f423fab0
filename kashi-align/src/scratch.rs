//! Per-request scratch resources
//!
//! Each request gets a fresh [`ResourceToken`] and four artifact paths
//! derived from it under the shared scratch root. Paths are a pure function
//! of `(root, token)`, so cleanup needs no extra bookkeeping.

use kashi_common::ResourceToken;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The four artifact paths owned by one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchPaths {
    pub raw_audio: PathBuf,
    pub normalized_audio: PathBuf,
    pub lyrics: PathBuf,
    pub alignment: PathBuf,
}

impl ScratchPaths {
    pub fn derive(root: &Path, token: &ResourceToken) -> Self {
        Self {
            raw_audio: root.join(format!("audio_{}", token)),
            normalized_audio: root.join(format!("converted_{}.wav", token)),
            lyrics: root.join(format!("lyrics_{}.txt", token)),
            alignment: root.join(format!("alignment_{}.json", token)),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [
            &self.raw_audio,
            &self.normalized_audio,
            &self.lyrics,
            &self.alignment,
        ]
    }
}

/// Scoped resource bundle for one in-flight request
///
/// Acquired at pipeline start and released exactly once. [`release`] is the
/// normal path; `Drop` covers panics and cancelled request futures.
///
/// [`release`]: PipelineContext::release
#[derive(Debug)]
pub struct PipelineContext {
    token: ResourceToken,
    paths: ScratchPaths,
    released: bool,
}

impl PipelineContext {
    /// Mint a fresh token and derive its paths under `root`
    pub fn acquire(root: &Path) -> Self {
        let token = ResourceToken::generate();
        let paths = ScratchPaths::derive(root, &token);
        debug!(request_id = %token, "Acquired scratch resources");
        Self {
            token,
            paths,
            released: false,
        }
    }

    pub fn token(&self) -> &ResourceToken {
        &self.token
    }

    pub fn paths(&self) -> &ScratchPaths {
        &self.paths
    }

    /// Remove every artifact. Failures are logged, never returned.
    pub async fn release(mut self) {
        for path in self.paths.all() {
            if let Err(e) = tokio::fs::remove_file(path).await {
                log_removal_failure(&self.token, path, &e);
            }
        }
        self.released = true;
        debug!(request_id = %self.token, "Released scratch resources");
    }
}

impl Drop for PipelineContext {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        for path in self.paths.all() {
            if let Err(e) = std::fs::remove_file(path) {
                log_removal_failure(&self.token, path, &e);
            }
        }
    }
}

fn log_removal_failure(token: &ResourceToken, path: &Path, err: &io::Error) {
    // Stages that never ran leave no file behind
    if err.kind() == io::ErrorKind::NotFound {
        return;
    }
    warn!(
        request_id = %token,
        path = %path.display(),
        error = %err,
        "Failed to remove scratch artifact"
    );
}
