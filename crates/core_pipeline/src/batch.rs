//! Sequential batch normalization
//!
//! Pages are processed one after another. Progress is reported as
//! `(completed, total)` after each page, and a cancellation token is checked
//! before each page starts.

use crate::error::{PipelineError, Result};
use crate::pipeline::Pipeline;
use crate::types::{FailurePolicy, ImageSource, NormalizedImage};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Normalize every source in order
///
/// The result vector is index-aligned with `sources`. Once `cancel` fires,
/// pages that have not started yield [`PipelineError::Cancelled`].
pub fn normalize_batch<F>(
    pipeline: &Pipeline,
    sources: &[ImageSource],
    policy: FailurePolicy,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Vec<Result<NormalizedImage>>
where
    F: FnMut(usize, usize),
{
    let total = sources.len();
    info!(total, ?policy, "Starting batch normalization");

    let mut results = Vec::with_capacity(total);
    for (index, source) in sources.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(index, "Batch cancelled; skipping remaining pages");
            results.extend((index..total).map(|_| Err(PipelineError::Cancelled)));
            break;
        }

        let result = pipeline.process(source, policy);
        if let Err(err) = &result {
            warn!(index, error = %err, "Page failed");
        }
        results.push(result);
        on_progress(index + 1, total);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn page() -> ImageSource {
        ImageSource::Raster(ImageBuffer::from_fn(40, 40, |x, _| {
            if (10..14).contains(&x) {
                Rgba([0u8, 0, 0, 255])
            } else {
                Rgba([255u8, 255, 255, 255])
            }
        }))
    }

    #[test]
    fn test_batch_reports_progress() {
        let pipeline = Pipeline::default();
        let sources = vec![page(), page(), page()];
        let mut progress = Vec::new();

        let results = normalize_batch(
            &pipeline,
            &sources,
            FailurePolicy::Strict,
            &CancellationToken::new(),
            |done, total| progress.push((done, total)),
        );

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_batch_keeps_going_after_decode_failure() {
        let pipeline = Pipeline::default();
        let sources = vec![
            page(),
            ImageSource::Bytes(b"not an image".to_vec()),
            page(),
        ];

        let results = normalize_batch(
            &pipeline,
            &sources,
            FailurePolicy::BestEffort,
            &CancellationToken::new(),
            |_, _| {},
        );

        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(PipelineError::Decode(_))));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_batch_cancellation() {
        let pipeline = Pipeline::default();
        let sources = vec![page(), page(), page(), page()];
        let cancel = CancellationToken::new();

        let results = normalize_batch(
            &pipeline,
            &sources,
            FailurePolicy::Strict,
            &cancel,
            |done, _| {
                if done == 2 {
                    cancel.cancel();
                }
            },
        );

        assert_eq!(results.len(), 4);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(results[2], Err(PipelineError::Cancelled)));
        assert!(matches!(results[3], Err(PipelineError::Cancelled)));
    }
}
