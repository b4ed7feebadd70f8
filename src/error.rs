//! Error types for readaloud.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReadaloudError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidConfiguration { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Synthesis errors (per chunk, retried by the dispatcher)
    #[error("Synthesis failed: {reason}")]
    Synthesis { reason: String },

    // Assembly errors (per run, name the implicated chunks)
    #[error("Missing results for chunks {}", format_indices(.missing))]
    IncompleteResults { missing: Vec<usize> },

    #[error("Synthesis failed for chunks {}", format_indices(.failed))]
    PartialFailure { failed: Vec<usize> },

    #[error("Audio format mismatch in chunk {index}: expected {expected}, got {actual}")]
    AudioFormatMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("Malformed audio in chunk {index}: {message}")]
    MalformedAudio { index: usize, message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl ReadaloudError {
    /// Shorthand for an [`ReadaloudError::InvalidConfiguration`] error.
    pub fn invalid_config(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`ReadaloudError::Synthesis`] error.
    pub fn synthesis(reason: impl Into<String>) -> Self {
        Self::Synthesis {
            reason: reason.into(),
        }
    }

    /// Chunk indices implicated by this error, if any.
    pub fn chunk_indices(&self) -> Vec<usize> {
        match self {
            Self::IncompleteResults { missing } => missing.clone(),
            Self::PartialFailure { failed } => failed.clone(),
            Self::AudioFormatMismatch { index, .. } | Self::MalformedAudio { index, .. } => {
                vec![*index]
            }
            _ => Vec::new(),
        }
    }
}

/// Render indices as `[0, 3, 7]`.
fn format_indices(indices: &[usize]) -> String {
    let joined = indices
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{joined}]")
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, ReadaloudError>;
