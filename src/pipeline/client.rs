//! OCR client adapter: one trait over the two Mistral call shapes.
//!
//! * **Structured OCR** (`POST {base}/ocr`): whole document in, one Markdown
//!   string per page out. Called directly with `reqwest` because the OCR
//!   endpoint is not a chat completion and edgequake-llm has no binding for it.
//! * **Vision chat**: one user message carrying the instruction and the image,
//!   sent through an edgequake-llm provider (`mistral` / `pixtral-12b-2409` by
//!   default). Returns a single string.
//!
//! [`recognize`] hides the difference: both paths come back as an ordered
//! `Vec<OcrPage>`. Remote failures are never retried here; the status code and
//! the remote message reach the caller unchanged inside [`OcrError`].

use crate::config::{OcrConfig, OcrMode};
use crate::document::DocumentKind;
use crate::error::OcrError;
use crate::pipeline::encode::EncodedDocument;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const PROVIDER: &str = "mistral";

// ── Public types ─────────────────────────────────────────────────────────

/// One page of recognised text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    /// 0-based page index as reported by the service.
    pub index: usize,
    pub markdown: String,
    /// Images referenced from `markdown` as `![id](id)`.
    #[serde(default)]
    pub images: Vec<OcrImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<PageDimensions>,
}

impl OcrPage {
    /// A page holding free text, as returned by the vision-chat path.
    pub fn from_text(index: usize, markdown: impl Into<String>) -> Self {
        Self {
            index,
            markdown: markdown.into(),
            images: Vec::new(),
            dimensions: None,
        }
    }
}

/// An image extracted by the structured endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrImage {
    pub id: String,
    /// Present only when the request asked for image payloads.
    /// May be a bare base64 string or a full data URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDimensions {
    #[serde(default)]
    pub dpi: u32,
    pub width: u32,
    pub height: u32,
}

/// The two remote procedures behind one object.
///
/// Implementations must be cheap to share across concurrent region calls.
pub trait OcrBackend: Send + Sync {
    /// Structured OCR over a whole document (PDF or image).
    fn process_document<'a>(
        &'a self,
        doc: &'a EncodedDocument,
    ) -> BoxFuture<'a, Result<Vec<OcrPage>, OcrError>>;

    /// Prompt-driven vision call over one image. `prompt` is sent verbatim.
    fn vision_chat<'a>(
        &'a self,
        doc: &'a EncodedDocument,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, OcrError>>;
}

/// Endpoint actually used for a document of `kind` when `requested` was asked for.
///
/// PDFs are only accepted by the structured endpoint.
pub fn select_mode(kind: DocumentKind, requested: OcrMode) -> OcrMode {
    if kind.is_pdf() {
        OcrMode::Structured
    } else {
        requested
    }
}

/// Run one OCR submission and return its pages in order.
pub async fn recognize(
    backend: &dyn OcrBackend,
    kind: DocumentKind,
    doc: &EncodedDocument,
    requested: OcrMode,
    prompt: &str,
) -> Result<Vec<OcrPage>, OcrError> {
    let start = Instant::now();
    let pages = match select_mode(kind, requested) {
        OcrMode::Structured => backend.process_document(doc).await?,
        OcrMode::Prompt => vec![OcrPage::from_text(0, backend.vision_chat(doc, prompt).await?)],
    };
    debug!(
        "OCR of {} ({}) → {} page(s) in {:?}",
        kind,
        doc.mime(),
        pages.len(),
        start.elapsed()
    );
    Ok(pages)
}

// ── Structured OCR endpoint ──────────────────────────────────────────────

#[derive(Serialize)]
struct OcrRequest<'a> {
    model: &'a str,
    document: DocumentChunk,
    include_image_base64: bool,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DocumentChunk {
    DocumentUrl { document_url: String },
    ImageUrl { image_url: String },
}

impl DocumentChunk {
    fn for_document(doc: &EncodedDocument) -> Self {
        if doc.mime() == DocumentKind::Pdf.mime() {
            DocumentChunk::DocumentUrl {
                document_url: doc.data_uri(),
            }
        } else {
            DocumentChunk::ImageUrl {
                image_url: doc.data_uri(),
            }
        }
    }
}

#[derive(Deserialize)]
struct OcrResponse {
    pages: Vec<OcrPage>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage_info: Option<UsageInfo>,
}

#[derive(Deserialize)]
struct UsageInfo {
    #[serde(default)]
    pages_processed: Option<u64>,
    #[serde(default)]
    doc_size_bytes: Option<u64>,
}

/// HTTP client for Mistral's `/ocr` endpoint.
#[derive(Clone)]
pub struct MistralOcrClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    include_images: bool,
    timeout_secs: u64,
}

impl std::fmt::Debug for MistralOcrClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MistralOcrClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("include_images", &self.include_images)
            .finish_non_exhaustive()
    }
}

impl MistralOcrClient {
    pub fn new(
        api_base: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, OcrError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| OcrError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: format!("{}/ocr", api_base.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
            include_images: false,
            timeout_secs,
        })
    }

    /// Ask the service to return extracted page images as base64.
    pub fn include_images(mut self, v: bool) -> Self {
        self.include_images = v;
        self
    }

    pub async fn process(&self, doc: &EncodedDocument) -> Result<Vec<OcrPage>, OcrError> {
        let request = OcrRequest {
            model: &self.model,
            document: DocumentChunk::for_document(doc),
            include_image_base64: self.include_images,
        };
        info!("POST {} ({}, {} bytes base64)", self.endpoint, doc.mime(), doc.payload().len());

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            let detail = remote_message(&body);
            warn!("OCR endpoint returned HTTP {}: {}", status.as_u16(), detail);
            return Err(OcrError::from_status(PROVIDER, status.as_u16(), detail, retry_after));
        }

        let body = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed = parse_ocr_response(&body)?;
        if let Some(usage) = &parsed.usage_info {
            debug!(
                "OCR usage: {} page(s), {} bytes ({})",
                usage.pages_processed.unwrap_or(0),
                usage.doc_size_bytes.unwrap_or(0),
                parsed.model.as_deref().unwrap_or(&self.model)
            );
        }
        let mut pages = parsed.pages;
        pages.sort_by_key(|p| p.index);
        Ok(pages)
    }

    fn transport_error(&self, e: reqwest::Error) -> OcrError {
        if e.is_timeout() {
            OcrError::ApiTimeout {
                provider: PROVIDER.into(),
                secs: self.timeout_secs,
            }
        } else {
            OcrError::ApiError {
                provider: PROVIDER.into(),
                detail: e.to_string(),
            }
        }
    }
}

fn parse_ocr_response(body: &str) -> Result<OcrResponse, OcrError> {
    serde_json::from_str(body).map_err(|e| OcrError::MalformedResponse {
        provider: PROVIDER.into(),
        detail: e.to_string(),
    })
}

/// Pull the human-readable message out of an error body.
///
/// Mistral answers with `{"message": …}` or `{"detail": …}` (FastAPI style,
/// sometimes a list of validation errors). Anything else is kept as raw text.
fn remote_message(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "(empty response body)".to_string();
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    let pick = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    };
    value
        .get("message")
        .and_then(pick)
        .or_else(|| value.get("detail").and_then(pick))
        .or_else(|| value.pointer("/error/message").and_then(pick))
        .unwrap_or_else(|| body.to_string())
}

// ── Vision chat ──────────────────────────────────────────────────────────

/// Prompt-driven vision call through an edgequake-llm provider.
pub struct VisionChat {
    provider: Arc<dyn LLMProvider>,
    provider_name: String,
    options: CompletionOptions,
    timeout_secs: u64,
}

impl VisionChat {
    pub fn new(provider: Arc<dyn LLMProvider>, provider_name: impl Into<String>) -> Self {
        Self {
            provider,
            provider_name: provider_name.into(),
            options: CompletionOptions::default(),
            timeout_secs: 120,
        }
    }

    /// Use the pre-built provider from `config`, else create one by name.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        let provider = match &config.chat_provider {
            Some(p) => Arc::clone(p),
            None => {
                ProviderFactory::create_llm_provider(&config.chat_provider_name, &config.chat_model)
                    .map_err(|e| OcrError::ProviderNotConfigured {
                        provider: config.chat_provider_name.clone(),
                        hint: format!("{e}"),
                    })?
            }
        };
        let mut chat = Self::new(provider, config.chat_provider_name.clone());
        chat.options = CompletionOptions {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            ..Default::default()
        };
        chat.timeout_secs = config.api_timeout_secs;
        Ok(chat)
    }

    pub async fn complete(&self, doc: &EncodedDocument, prompt: &str) -> Result<String, OcrError> {
        let messages = chat_messages(doc, prompt);

        let start = Instant::now();
        let call = self.provider.chat(&messages, Some(&self.options));
        let response = tokio::time::timeout(Duration::from_secs(self.timeout_secs), call)
            .await
            .map_err(|_| OcrError::ApiTimeout {
                provider: self.provider_name.clone(),
                secs: self.timeout_secs,
            })?
            .map_err(|e| classify_chat_error(&self.provider_name, &e.to_string()))?;

        debug!(
            "Vision chat: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        Ok(response.content)
    }
}

/// A single user turn: `prompt` verbatim plus the raw base64 image.
fn chat_messages(doc: &EncodedDocument, prompt: &str) -> Vec<ChatMessage> {
    let image = ImageData::new(doc.payload().to_string(), doc.mime()).with_detail("high");
    vec![ChatMessage::user_with_images(prompt, vec![image])]
}

static RE_HTTP_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:HTTP|status(?: code)?:?)\s*([1-5]\d\d)\b").unwrap());

/// Map a provider error message onto the remote-error variants.
///
/// edgequake-llm flattens HTTP failures into text, so the status is recovered
/// from the message when it is there. The message itself is kept whole.
fn classify_chat_error(provider: &str, message: &str) -> OcrError {
    if let Some(status) = RE_HTTP_STATUS
        .captures(message)
        .and_then(|c| c[1].parse::<u16>().ok())
        .filter(|s| *s >= 400)
    {
        return OcrError::from_status(provider, status, message, None);
    }
    let lower = message.to_lowercase();
    let status = if lower.contains("rate limit") || lower.contains("too many requests") {
        429
    } else if lower.contains("unauthorized")
        || lower.contains("invalid api key")
        || lower.contains("authentication")
    {
        401
    } else {
        return OcrError::ApiError {
            provider: provider.to_string(),
            detail: message.to_string(),
        };
    };
    OcrError::from_status(provider, status, message, None)
}

// ── Mistral backend ──────────────────────────────────────────────────────

/// Production [`OcrBackend`]: `/ocr` over HTTP plus an edgequake-llm chat.
pub struct MistralBackend {
    ocr: MistralOcrClient,
    chat: Option<VisionChat>,
}

impl MistralBackend {
    pub fn new(ocr: MistralOcrClient, chat: Option<VisionChat>) -> Self {
        Self { ocr, chat }
    }

    /// Build both clients from `config`.
    ///
    /// The chat provider is only created when prompt mode is configured or a
    /// provider was injected, so structured runs need no chat credentials.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        let key = config.resolve_api_key()?;
        let ocr = MistralOcrClient::new(
            &config.api_base,
            key,
            config.ocr_model.clone(),
            config.api_timeout_secs,
        )?
        .include_images(config.inline_images);

        let chat = if config.mode == OcrMode::Prompt || config.chat_provider.is_some() {
            Some(VisionChat::from_config(config)?)
        } else {
            None
        };
        Ok(Self::new(ocr, chat))
    }
}

impl OcrBackend for MistralBackend {
    fn process_document<'a>(
        &'a self,
        doc: &'a EncodedDocument,
    ) -> BoxFuture<'a, Result<Vec<OcrPage>, OcrError>> {
        Box::pin(self.ocr.process(doc))
    }

    fn vision_chat<'a>(
        &'a self,
        doc: &'a EncodedDocument,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, OcrError>> {
        Box::pin(async move {
            match &self.chat {
                Some(chat) => chat.complete(doc, prompt).await,
                None => Err(OcrError::ProviderNotConfigured {
                    provider: PROVIDER.into(),
                    hint: "Prompt mode was not enabled when the backend was built.".into(),
                }),
            }
        })
    }
}
