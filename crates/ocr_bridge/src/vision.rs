//! Vision model recognition backend

use crate::ollama::{ChatMessage, ChatRequest, OllamaClient};
use crate::recognizer::Recognizer;
use anyhow::Result;
use async_trait::async_trait;
use core_pipeline::{NormalizedImage, RecognitionResult};
use tracing::debug;

const TRANSCRIBE_PROMPT: &str = r#"You are digitizing a photographed bill of materials (BOM).
Transcribe every line of the table exactly as printed, one row per line.
Keep reference designators, values, tolerances and part numbers verbatim.
Separate columns with " | ". Do not add commentary."#;

/// Vision model that transcribes a normalized page
pub struct VisionRecognizer {
    client: OllamaClient,
    model_name: String,
}

impl VisionRecognizer {
    /// Create a new vision recognizer
    pub fn new(client: OllamaClient, model_name: String) -> Self {
        Self { client, model_name }
    }

    /// Create a vision recognizer with default settings (qwen2.5vl:7b)
    pub fn default_model() -> Result<Self> {
        Ok(Self::new(
            OllamaClient::default_client()?,
            "qwen2.5vl:7b".to_string(),
        ))
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    fn request_for(&self, page: &NormalizedImage) -> Result<ChatRequest> {
        Ok(ChatRequest {
            model: self.model_name.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: TRANSCRIBE_PROMPT.to_string(),
                images: Some(vec![page.base64_payload()?.to_string()]),
            }],
            stream: Some(false),
        })
    }
}

#[async_trait]
impl Recognizer for VisionRecognizer {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn recognize(&self, page: &NormalizedImage) -> Result<RecognitionResult> {
        let request = self.request_for(page)?;
        let response = self.client.chat(request).await?;
        debug!(
            model = %response.model,
            chars = response.message.content.len(),
            "Vision model replied"
        );

        // Chat models give no word geometry or confidence.
        Ok(RecognitionResult {
            text: response.message.content.trim().to_string(),
            words: Vec::new(),
            confidence: 0.0,
        })
    }
}
