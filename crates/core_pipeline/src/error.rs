//! Error kinds for the normalization pipeline

use std::fmt;
use thiserror::Error;

/// A pipeline stage, used to attribute stage failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Downscale,
    SkewEstimation,
    Rotate,
    Crop,
    Enhance,
    Encode,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Downscale => "downscale",
            Stage::SkewEstimation => "skew estimation",
            Stage::Rotate => "rotate",
            Stage::Crop => "crop",
            Stage::Enhance => "enhance",
            Stage::Encode => "encode",
        };
        f.write_str(name)
    }
}

/// Errors produced while normalizing a page image
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input could not be decoded into pixel data
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// The configuration was rejected at pipeline construction
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// A transform could not complete
    #[error("{stage} stage failed: {message}")]
    Stage { stage: Stage, message: String },

    /// The normalized image could not be re-encoded
    #[error("failed to encode image: {0}")]
    Encode(String),

    /// The batch was cancelled before this image was processed
    #[error("processing cancelled")]
    Cancelled,
}

impl PipelineError {
    pub(crate) fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }

    /// Whether the best-effort policy may substitute the original input
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Stage { .. } | Self::Encode(_))
    }
}

/// Result alias used throughout the pipeline
pub type Result<T> = std::result::Result<T, PipelineError>;
