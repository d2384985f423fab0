//! Common error types for Kashi

use thiserror::Error;

/// Common result type for Kashi operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across Kashi services
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error for a specific config file
    #[error("Failed to parse {path}: {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
