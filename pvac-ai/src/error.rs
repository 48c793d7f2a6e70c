//! Error types for pvac-ai
//!
//! Only structural contract violations surface as errors. Noisy model output
//! (bad scores, unknown categories, partial records) is degraded locally to
//! `"uncertain"` or skipped, never raised.

use thiserror::Error;

/// Analysis error type
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Caller passed something that violates an input contract
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vision backend call failed
    #[error("Vision client error: {0}")]
    Vision(String),

    /// Model output could not be parsed into a JSON object
    #[error("Parse error: {0}")]
    Parse(String),

    /// Final per-image record failed schema validation
    #[error("Validation failed: {}", violations.join("; "))]
    Validation { violations: Vec<String> },

    /// Model output contained fields that are not allowed
    #[error("Forbidden fields: {0}")]
    Forbidden(String),

    /// Writing product results failed
    #[error("Export failed: {0}")]
    Export(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// pvac-common error
    #[error("Common error: {0}")]
    Common(#[from] pvac_common::Error),
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;
