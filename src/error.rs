//! Error Taxonomy
//!
//! Every failure is surfaced to the immediate caller. Nothing is retried here.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LayerError>;

#[derive(Debug, Error)]
pub enum LayerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unparsable document: {0}")]
    Parse(String),

    #[error("Ambiguous document structure: {0}")]
    Structural(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Render failed for {output}: {reason}")]
    Render { output: PathBuf, reason: String },

    #[error("Refusing to overwrite existing path: {0}")]
    Precondition(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LayerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LayerError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable code used in CLI JSON output
    pub fn error_code(&self) -> &'static str {
        match self {
            LayerError::Validation(_) => "VALIDATION_ERROR",
            LayerError::Parse(_) => "PARSE_ERROR",
            LayerError::Structural(_) => "STRUCTURAL_ERROR",
            LayerError::Configuration(_) => "CONFIGURATION_ERROR",
            LayerError::Render { .. } => "RENDER_ERROR",
            LayerError::Precondition(_) => "PRECONDITION_ERROR",
            LayerError::Io { .. } => "IO_ERROR",
            LayerError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Validation problems are the caller's input, not the environment
    pub fn is_validation(&self) -> bool {
        matches!(self, LayerError::Validation(_))
    }
}
