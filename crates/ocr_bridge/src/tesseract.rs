//! Local Tesseract backend (via leptess)
//!
//! Enabled with the `tesseract` cargo feature. Recognition runs on the
//! blocking thread pool with a fresh engine per page, since the engine
//! handle cannot be shared between threads.

use crate::recognizer::Recognizer;
use crate::tsv::parse_words;
use anyhow::{Context, Result};
use async_trait::async_trait;
use core_pipeline::{NormalizedImage, RecognitionResult};
use leptess::{LepTess, Variable};
use tracing::debug;

/// Characters that appear on BOM sheets
pub const BOM_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789.,|-+µΩ";

/// Fully automatic page segmentation
const PSM_AUTO: &str = "3";

/// Tesseract configuration
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Directory holding traineddata, `None` for the system default
    pub data_path: Option<String>,
    pub language: String,
    pub whitelist: String,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            data_path: None,
            language: "eng".to_string(),
            whitelist: BOM_WHITELIST.to_string(),
        }
    }
}

/// Recognition backend backed by a local Tesseract install
#[derive(Debug, Clone, Default)]
pub struct TesseractRecognizer {
    config: TesseractConfig,
}

impl TesseractRecognizer {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }
}

/// Run Tesseract over encoded image bytes
pub fn extract_text(config: &TesseractConfig, image_bytes: &[u8]) -> Result<RecognitionResult> {
    let mut tesseract = LepTess::new(config.data_path.as_deref(), &config.language)
        .context("Failed to initialize Tesseract. Is Tesseract installed?")?;

    tesseract
        .set_variable(Variable::TesseditCharWhitelist, &config.whitelist)
        .context("Failed to set Tesseract character whitelist")?;
    tesseract
        .set_variable(Variable::TesseditPagesegMode, PSM_AUTO)
        .context("Failed to set Tesseract page segmentation mode")?;
    tesseract
        .set_variable(Variable::PreserveInterwordSpaces, "1")
        .context("Failed to preserve interword spaces")?;

    tesseract
        .set_image_from_mem(image_bytes)
        .context("Failed to load image into Tesseract")?;

    let text = tesseract
        .get_utf8_text()
        .context("Failed to extract text from image")?;
    let tsv = tesseract
        .get_tsv_text(0)
        .context("Failed to extract word boxes from image")?;
    let words = parse_words(&tsv);
    let confidence = tesseract.mean_text_conf().max(0) as f32;

    Ok(RecognitionResult {
        text,
        words,
        confidence,
    })
}

#[async_trait]
impl Recognizer for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, page: &NormalizedImage) -> Result<RecognitionResult> {
        let bytes = page.payload_bytes()?;
        let config = self.config.clone();
        let result = tokio::task::spawn_blocking(move || extract_text(&config, &bytes))
            .await
            .context("Tesseract worker panicked")??;
        debug!(
            confidence = result.confidence,
            words = result.words.len(),
            "Tesseract recognized page"
        );
        Ok(result)
    }
}
