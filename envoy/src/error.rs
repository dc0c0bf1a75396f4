//! Error types for the dispatcher

use std::path::PathBuf;
use thiserror::Error;

/// Envoy error types
#[derive(Debug, Error)]
pub enum EnvoyError {
    /// Allocation failed while copying arguments or building the invocation
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(#[from] std::collections::TryReserveError),

    /// argv is empty, or argv[0] has no final path segment
    #[error("Missing program name")]
    MissingProgramName,

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// The helper (or a sibling build) could not be executed
    #[error("Hand-off to {} failed: {source}", .path.display())]
    Handoff {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for envoy operations
pub type Result<T> = std::result::Result<T, EnvoyError>;

impl EnvoyError {
    /// Exit status reported when the dispatcher itself fails
    pub fn exit_code(&self) -> u8 {
        1
    }

    /// Check if this error came from a failed execution attempt
    pub fn is_handoff(&self) -> bool {
        matches!(self, Self::Handoff { .. })
    }

    pub(crate) fn handoff(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Handoff {
            path: path.into(),
            source,
        }
    }
}
