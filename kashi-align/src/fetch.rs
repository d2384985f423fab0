//! Audio retrieval
//!
//! Streams the caller-supplied recording into the request's raw-audio path.
//! Every failure here is attributed to the caller's URL.

use async_trait::async_trait;
use reqwest::Url;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const USER_AGENT: &str = concat!("kashi-align/", env!("CARGO_PKG_VERSION"));

/// Audio source could not be retrieved
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned an empty body")]
    EmptyBody { url: String },

    #[error("failed to store downloaded audio: {0}")]
    Storage(#[from] std::io::Error),
}

/// Capability to download a URL into a file
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Write the body at `url` to `dest`, returning the byte count
    async fn fetch(&self, url: &Url, dest: &Path) -> Result<u64, FetchError>;
}

/// [`AudioFetcher`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct HttpAudioFetcher {
    http_client: reqwest::Client,
}

impl HttpAudioFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl AudioFetcher for HttpAudioFetcher {
    async fn fetch(&self, url: &Url, dest: &Path) -> Result<u64, FetchError> {
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };

        let mut response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }

        debug!(url = %url, bytes = written, "Downloaded audio");
        Ok(written)
    }
}
