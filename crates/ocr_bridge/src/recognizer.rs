//! Recognition backend interface

use anyhow::Result;
use async_trait::async_trait;
use core_pipeline::{NormalizedImage, RecognitionResult};

/// A character recognition backend for normalized pages
///
/// Implementations receive the page after normalization and return the
/// recognized text with per-word boxes where the backend provides them.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Short backend name used in logs and reports
    fn name(&self) -> &str;

    async fn recognize(&self, page: &NormalizedImage) -> Result<RecognitionResult>;
}
