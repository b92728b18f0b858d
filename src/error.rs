// 🚨 Pipeline Errors
// Structural failures abort the run; per-chunk failures never get here (see parser::ChunkRead)

use polars::prelude::PolarsError;
use std::path::PathBuf;

/// Every failure that aborts a pipeline run.
///
/// Per-unit read problems are NOT errors: the reader reports them as
/// `ChunkRead::Skipped` and the run continues with reduced input.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Filesystem error with the path that caused it
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// DataFrame engine failure outside the stage-specific variants below
    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),

    /// Table shape does not match the canonical schema
    #[error("schema error: {message}")]
    Schema { message: String },

    /// A column could not be represented in its canonical type without loss
    #[error("cannot cast column '{column}' to {target}: {message}")]
    Cast {
        column: String,
        target: String,
        message: String,
    },

    /// Chunks of one category disagree on column names or types
    #[error("cannot concatenate {category} chunks: {message}")]
    Concat { category: String, message: String },

    /// An enumeration code reached a recode step it has no mapping for
    #[error("unexpected code {code} in column '{column}'")]
    Recode { column: String, code: String },

    /// Every chunk of a category was skipped
    #[error("no readable {category} chunk in {dir:?}")]
    NoChunks { category: String, dir: PathBuf },

    /// Join stage failure (missing reference table, key type mismatch, ...)
    #[error("join failed: {message}")]
    Join { message: String },

    /// Invalid configuration
    #[error("config error: {message}")]
    Config { message: String },
}

/// Convenience alias used throughout the library
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }

    pub fn join(msg: impl Into<String>) -> Self {
        Self::Join {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Structural errors abort the run; everything in this enum is structural,
    /// but callers match on the variant to pick the user-facing message.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Io { .. } => "output",
            PipelineError::Polars(_) => "dataframe",
            PipelineError::Schema { .. } | PipelineError::Cast { .. } => "harmonize",
            PipelineError::Concat { .. } | PipelineError::NoChunks { .. } => "concatenate",
            PipelineError::Recode { .. } => "normalize",
            PipelineError::Join { .. } => "join",
            PipelineError::Config { .. } => "config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offender() {
        let err = PipelineError::Cast {
            column: "cnpj_basico".to_string(),
            target: "i64".to_string(),
            message: "conversion from `str` to `i64` failed for value \"abc\"".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("cnpj_basico"));
        assert!(msg.contains("abc"));
        assert_eq!(err.stage(), "harmonize");
    }

    #[test]
    fn test_join_error_stage() {
        assert_eq!(PipelineError::join("boom").stage(), "join");
        assert_eq!(PipelineError::config("bad").stage(), "config");
    }
}
