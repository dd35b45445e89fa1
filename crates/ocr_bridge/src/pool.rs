//! Bounded worker pool: normalize pages, then recognize them
//!
//! At most `workers` pages are in flight at once. Normalization runs on the
//! blocking thread pool and each page gets its own buffers, so the shared
//! [`Pipeline`] is only read. Results come back in input order regardless of
//! completion order.

use crate::recognizer::Recognizer;
use anyhow::{anyhow, Context, Result};
use core_pipeline::{
    FailurePolicy, ImageSource, NormalizedImage, Pipeline, PipelineError, RecognitionResult,
};
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 2;

/// Progress callback receiving `(completed, total)`
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// A normalized page with its recognition output
#[derive(Debug, Clone)]
pub struct PageOutcome {
    pub normalized: NormalizedImage,
    pub recognition: RecognitionResult,
}

/// Snapshot of pool activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub pool_size: usize,
    pub active: usize,
    pub queued: usize,
    pub completed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    queued: AtomicUsize,
    completed: AtomicUsize,
}

/// Runs normalization and recognition over many pages with bounded concurrency
pub struct RecognitionPool {
    pipeline: Arc<Pipeline>,
    recognizer: Arc<dyn Recognizer>,
    policy: FailurePolicy,
    workers: usize,
    counters: Arc<Counters>,
}

impl RecognitionPool {
    /// Create a pool with [`DEFAULT_WORKERS`] workers and the best-effort policy
    pub fn new(pipeline: Pipeline, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            recognizer,
            policy: FailurePolicy::BestEffort,
            workers: DEFAULT_WORKERS,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Set the worker count (at least one)
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus {
            pool_size: self.workers,
            active: self.counters.active.load(Ordering::SeqCst),
            queued: self.counters.queued.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
        }
    }

    /// Process every page and return results index-aligned with `sources`
    ///
    /// Pages that have not started when `cancel` fires fail with
    /// [`PipelineError::Cancelled`]; pages already running finish.
    pub async fn run(
        &self,
        sources: Vec<ImageSource>,
        cancel: CancellationToken,
        on_progress: Option<ProgressFn>,
    ) -> Vec<Result<PageOutcome>> {
        let total = sources.len();
        info!(
            total,
            workers = self.workers,
            backend = self.recognizer.name(),
            "Starting recognition pool"
        );

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let done = Arc::new(AtomicUsize::new(0));
        self.counters.queued.fetch_add(total, Ordering::SeqCst);

        let mut handles = Vec::with_capacity(total);
        for (index, source) in sources.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let pipeline = self.pipeline.clone();
            let recognizer = self.recognizer.clone();
            let counters = self.counters.clone();
            let cancel = cancel.clone();
            let done = done.clone();
            let on_progress = on_progress.clone();
            let policy = self.policy;

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(anyhow!("Worker pool closed")),
                };
                counters.queued.fetch_sub(1, Ordering::SeqCst);

                if cancel.is_cancelled() {
                    debug!(index, "Skipping page after cancellation");
                    return Err(anyhow::Error::new(PipelineError::Cancelled));
                }

                counters.active.fetch_add(1, Ordering::SeqCst);
                let result = Self::process_page(pipeline, recognizer, source, policy).await;
                counters.active.fetch_sub(1, Ordering::SeqCst);
                counters.completed.fetch_add(1, Ordering::SeqCst);

                if let Err(err) = &result {
                    warn!(index, error = %err, "Page failed");
                }
                let completed = done.fetch_add(1, Ordering::SeqCst) + 1;
                if let Some(progress) = &on_progress {
                    progress(completed, total);
                }
                result
            }));
        }

        let mut results = Vec::with_capacity(total);
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(anyhow!("Worker task failed: {}", join_err)),
            };
            results.push(result);
        }

        info!(total, completed = done.load(Ordering::SeqCst), "Recognition pool finished");
        results
    }

    async fn process_page(
        pipeline: Arc<Pipeline>,
        recognizer: Arc<dyn Recognizer>,
        source: ImageSource,
        policy: FailurePolicy,
    ) -> Result<PageOutcome> {
        let normalized = tokio::task::spawn_blocking(move || pipeline.process(&source, policy))
            .await
            .context("Normalization worker panicked")??;

        let recognition = recognizer
            .recognize(&normalized)
            .await
            .with_context(|| format!("{} backend failed", recognizer.name()))?;

        Ok(PageOutcome {
            normalized,
            recognition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::testing::EchoRecognizer;
    use image::{ImageBuffer, Rgba};
    use std::sync::Mutex;
    use std::time::Duration;

    fn page(width: u32) -> ImageSource {
        ImageSource::Raster(ImageBuffer::from_pixel(width, 20, Rgba([255u8, 255, 255, 255])))
    }

    fn plain_pipeline() -> Pipeline {
        Pipeline::new(core_pipeline::PipelineConfig {
            auto_rotate: false,
            auto_crop: false,
            enhance_contrast: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        let recognizer = Arc::new(EchoRecognizer::new(Duration::from_millis(5)));
        let pool = RecognitionPool::new(plain_pipeline(), recognizer.clone()).with_workers(3);
        let sources = (1..=6).map(|i| page(i * 10)).collect();

        let results = pool.run(sources, CancellationToken::new(), None).await;

        let texts: Vec<String> = results
            .into_iter()
            .map(|r| r.unwrap().recognition.text)
            .collect();
        assert_eq!(texts, vec!["10x20", "20x20", "30x20", "40x20", "50x20", "60x20"]);
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let recognizer = Arc::new(EchoRecognizer::new(Duration::from_millis(20)));
        let pool = RecognitionPool::new(plain_pipeline(), recognizer.clone());
        let sources = (0..8).map(|_| page(10)).collect();

        let results = pool.run(sources, CancellationToken::new(), None).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(recognizer.peak.load(Ordering::SeqCst) <= DEFAULT_WORKERS);
        assert_eq!(
            pool.status(),
            PoolStatus {
                pool_size: 2,
                active: 0,
                queued: 0,
                completed: 8
            }
        );
    }

    #[tokio::test]
    async fn test_progress_and_failures() {
        let mut echo = EchoRecognizer::new(Duration::from_millis(1));
        echo.fail_on_width = Some(30);
        let pool = RecognitionPool::new(plain_pipeline(), Arc::new(echo)).with_workers(1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let progress: ProgressFn = Arc::new(move |done: usize, total: usize| {
            sink.lock().unwrap().push((done, total));
        });

        let sources = vec![page(10), page(30), page(50)];
        let results = pool
            .run(sources, CancellationToken::new(), Some(progress))
            .await;

        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("echo backend failed"));
        assert!(results[2].is_ok());
        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn test_cancellation_skips_pending_pages() {
        let recognizer = Arc::new(EchoRecognizer::new(Duration::from_millis(1)));
        let pool = RecognitionPool::new(plain_pipeline(), recognizer.clone()).with_workers(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = pool.run(vec![page(10), page(20)], cancel, None).await;

        for result in &results {
            let err = result.as_ref().unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PipelineError>(),
                Some(PipelineError::Cancelled)
            ));
        }
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(pool.status().completed, 0);
    }

    #[tokio::test]
    async fn test_decode_failure_is_per_page() {
        let recognizer = Arc::new(EchoRecognizer::new(Duration::from_millis(1)));
        let pool = RecognitionPool::new(plain_pipeline(), recognizer);
        let sources = vec![ImageSource::Bytes(b"garbage".to_vec()), page(10)];

        let results = pool.run(sources, CancellationToken::new(), None).await;

        assert!(matches!(
            results[0].as_ref().unwrap_err().downcast_ref::<PipelineError>(),
            Some(PipelineError::Decode(_))
        ));
        assert!(results[1].is_ok());
    }
}
