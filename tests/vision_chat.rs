//! Prompt-mode OCR through the production backend with an in-process chat
//! provider.
//!
//! `MistralBackend::from_config` picks up the injected provider, so these
//! exercise message building, timeout mapping and error classification
//! without a network.

use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LLMResponse, LlmError};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ocr2md::{extract, Document, MistralBackend, OcrConfig, OcrError, OcrMode};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fake provider ────────────────────────────────────────────────────────────

struct FakeChat {
    reply: String,
    delay: Duration,
    fail_with: Option<String>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeChat {
    fn answering(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            delay: Duration::ZERO,
            fail_with: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::answering("too late")
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::answering("")
        }
    }

    fn seen(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMProvider for FakeChat {
    fn name(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-vision"
    }

    fn max_context_length(&self) -> usize {
        32_000
    }

    async fn complete(&self, prompt: &str) -> Result<LLMResponse, LlmError> {
        self.chat(&[ChatMessage::user(prompt)], None).await
    }

    async fn complete_with_options(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<LLMResponse, LlmError> {
        self.chat(&[ChatMessage::user(prompt)], Some(options)).await
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        _options: Option<&CompletionOptions>,
    ) -> Result<LLMResponse, LlmError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        tokio::time::sleep(self.delay).await;
        match &self.fail_with {
            Some(message) => Err(LlmError::ApiError(message.clone())),
            None => Ok(LLMResponse::new(self.reply.clone(), "fake-vision")),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn image_doc(format: ImageFormat, name: &str) -> Document {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(120, 80, Rgb([240, 240, 240])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
    Document::from_bytes(buf).unwrap().named(name)
}

fn prompt_config(provider: Arc<FakeChat>, prompt: &str, timeout_secs: u64) -> OcrConfig {
    OcrConfig::builder()
        .mode(OcrMode::Prompt)
        .api_key("test-key")
        .api_base("http://127.0.0.1:9/v1")
        .chat_provider(provider)
        .prompt(prompt)
        .api_timeout_secs(timeout_secs)
        .build()
        .unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_prompt_reaches_provider_byte_for_byte() {
    let fake = Arc::new(FakeChat::answering("| a | b |\n|---|---|\n| 1 | 2 |"));
    let prompt = "Transcribe every table.\n\n  Keep   the spacing, « quotes » and | pipes |.\t";
    let config = prompt_config(fake.clone(), prompt, 10);
    let backend = MistralBackend::from_config(&config).unwrap();

    let out = extract(&image_doc(ImageFormat::Png, "scan.png"), &backend, None, &config)
        .await
        .unwrap();

    assert!(out.markdown.contains("| 1 | 2 |"));
    let calls = fake.seen();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1, "one user message, no system turn");
    assert_eq!(calls[0][0].content, prompt);
}

#[tokio::test]
async fn test_image_mime_matches_document() {
    for (format, name, mime) in [
        (ImageFormat::Png, "scan.png", "image/png"),
        (ImageFormat::Jpeg, "scan.jpg", "image/jpeg"),
    ] {
        let fake = Arc::new(FakeChat::answering("text"));
        let config = prompt_config(fake.clone(), "read", 10);
        let backend = MistralBackend::from_config(&config).unwrap();

        extract(&image_doc(format, name), &backend, None, &config)
            .await
            .unwrap();

        let calls = fake.seen();
        let images = calls[0][0].images.as_ref().expect("image attached");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, mime);
        assert!(!images[0].data.starts_with("data:"), "raw base64 payload");
    }
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let fake = Arc::new(FakeChat::slow(Duration::from_secs(5)));
    let config = prompt_config(fake, "read", 1);
    let backend = MistralBackend::from_config(&config).unwrap();

    let err = extract(&image_doc(ImageFormat::Png, "scan.png"), &backend, None, &config)
        .await
        .unwrap_err();

    assert!(matches!(err, OcrError::ApiTimeout { secs: 1, .. }), "got {err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_provider_error_keeps_status_and_message() {
    let fake = Arc::new(FakeChat::failing("HTTP 400 Image exceeds the size limit"));
    let config = prompt_config(fake, "read", 10);
    let backend = MistralBackend::from_config(&config).unwrap();

    let err = extract(&image_doc(ImageFormat::Png, "scan.png"), &backend, None, &config)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().contains("Image exceeds the size limit"));
    assert!(!err.is_retryable());
}
