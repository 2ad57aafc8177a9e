//! Unified error type for the rotakey workspace.

use thiserror::Error;

/// Enumerates all error kinds that can occur across rotakey crates.
#[derive(Debug, Error)]
pub enum RotakeyError {
    /// Persistent storage (config or credential file) error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A call into the host agent runtime failed.
    #[error("host error: {0}")]
    Host(String),

    /// The named group does not exist in the configuration.
    #[error("unknown group: {0}")]
    UnknownGroup(String),

    /// The provider has no credential stored under the given name.
    #[error("unknown credential {name} for provider {provider}")]
    UnknownCredential { provider: String, name: String },

    /// An endpoint id could not be parsed.
    #[error("invalid endpoint id: {0:?}")]
    InvalidEndpoint(String),

    /// A classifier rule pattern failed to compile.
    #[error("invalid classifier rule {pattern:?}: {reason}")]
    InvalidRule { pattern: String, reason: String },
}

impl From<std::io::Error> for RotakeyError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, RotakeyError>;
