use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SizeTargetError {
    #[error("FFprobe failed for {path}: {reason}")]
    ProbeFailure { path: PathBuf, reason: String },

    #[error("Encoding failed ({context}) for {input}: {reason}")]
    EncodingFailure {
        input: PathBuf,
        /// What was being encoded, e.g. `CRF 23 sample` or `two-pass 2/2`.
        context: String,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("Concatenation failed: {0}")]
    ConcatenationFailure(String),

    #[error(
        "No feasible CRF in [{min_crf}, {max_crf}]: every candidate exceeds the {target_bytes} byte budget"
    )]
    NoFeasibleQuality {
        min_crf: u8,
        max_crf: u8,
        target_bytes: u64,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SizeTargetError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SizeTargetError::InvalidInput(msg.into())
    }

    /// Short machine-friendly name of the failure kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SizeTargetError::ProbeFailure { .. } => "probe_failure",
            SizeTargetError::EncodingFailure { .. } => "encoding_failure",
            SizeTargetError::ConcatenationFailure(_) => "concatenation_failure",
            SizeTargetError::NoFeasibleQuality { .. } => "no_feasible_quality",
            SizeTargetError::InvalidInput(_) => "invalid_input",
            SizeTargetError::ToolNotFound(_) => "tool_not_found",
            SizeTargetError::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, SizeTargetError>;
