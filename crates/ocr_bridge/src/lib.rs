//! Recognition backends for normalized BOM pages
//!
//! Provides the [`Recognizer`] interface, an HTTP recognition proxy client,
//! an Ollama vision model backend, an optional local Tesseract backend
//! (feature `tesseract`, word boxes parsed from its TSV output) and a
//! bounded worker pool that normalizes and recognizes pages concurrently.
//!
//! Copyright (c) 2025 Michael A Wright

pub mod ollama;
pub mod pool;
pub mod proxy;
pub mod recognizer;
#[cfg(feature = "tesseract")]
pub mod tesseract;
pub mod tsv;
pub mod vision;

pub use ollama::{OllamaClient, OllamaConfig};
pub use pool::{PageOutcome, PoolStatus, RecognitionPool};
pub use proxy::{ProxyConfig, ProxyRecognizer};
pub use recognizer::Recognizer;
#[cfg(feature = "tesseract")]
pub use tesseract::{TesseractConfig, TesseractRecognizer};
pub use vision::VisionRecognizer;
