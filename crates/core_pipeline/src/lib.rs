//! Core pipeline for bomscan
//!
//! This crate normalizes photographed bill-of-materials pages before
//! character recognition: it estimates and cancels page skew from the left
//! edge, crops to the printed content, and enhances contrast so the
//! recognition backend sees a clean, upright, two-level page.

pub mod batch;
pub mod decoder;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod preprocess;
pub mod skew;
pub mod types;

pub use error::{PipelineError, Result, Stage};
pub use pipeline::Pipeline;
pub use types::*;
