//! Configuration types for document extraction.
//!
//! All behaviour is controlled through [`OcrConfig`], built via its
//! [`OcrConfigBuilder`]. Region geometry and validation thresholds live in
//! their own small structs ([`RegionOptions`], [`ValidationPolicy`]) so the
//! table pipeline can be tuned without touching the remote-call settings.

use crate::error::OcrError;
use crate::pipeline::layout::LayoutOptions;
use crate::pipeline::validate::ValidationPolicy;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_PROMPT;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default structured OCR model.
pub const DEFAULT_OCR_MODEL: &str = "mistral-ocr-latest";
/// Default vision-chat model for prompt mode.
pub const DEFAULT_CHAT_MODEL: &str = "pixtral-12b-2409";
/// Default edgequake-llm provider for prompt mode.
pub const DEFAULT_CHAT_PROVIDER: &str = "mistral";
/// Mistral public API root.
pub const DEFAULT_API_BASE: &str = "https://api.mistral.ai/v1";

/// Configuration for one extraction run.
///
/// # Example
/// ```rust
/// use ocr2md::{OcrConfig, OcrMode};
///
/// let config = OcrConfig::builder()
///     .mode(OcrMode::Prompt)
///     .detect_tables(true)
///     .padding(40)
///     .build()
///     .unwrap();
/// assert_eq!(config.region.padding, 40);
/// ```
#[derive(Clone)]
pub struct OcrConfig {
    /// Which endpoint handles images. PDFs always use [`OcrMode::Structured`].
    pub mode: OcrMode,

    /// Mistral API key. Falls back to `MISTRAL_API_KEY` when `None`.
    pub api_key: Option<String>,

    /// API root for the structured endpoint. Default: [`DEFAULT_API_BASE`].
    pub api_base: String,

    /// Structured OCR model. Default: `mistral-ocr-latest`.
    pub ocr_model: String,

    /// edgequake-llm provider name used in prompt mode. Default: `mistral`.
    pub chat_provider_name: String,

    /// Vision model used in prompt mode. Default: `pixtral-12b-2409`.
    pub chat_model: String,

    /// Pre-constructed chat provider. Takes precedence over `chat_provider_name`.
    pub chat_provider: Option<Arc<dyn LLMProvider>>,

    /// Instruction sent with the image in prompt mode. Delivered verbatim.
    pub prompt: String,

    /// Instruction for table crops in prompt mode. `None` reuses `prompt`.
    pub table_prompt: Option<String>,

    /// Sampling temperature in prompt mode. `None` leaves the provider default.
    pub temperature: Option<f32>,

    /// Output token cap in prompt mode. `None` leaves the provider default.
    pub max_tokens: Option<usize>,

    /// Crop tables out of images before OCR. Images only. Default: false.
    pub detect_tables: bool,

    /// How the layout model is run when `detect_tables` is on.
    pub layout: LayoutOptions,

    /// Crop geometry for detected tables.
    pub region: RegionOptions,

    /// Thresholds for the table quality signal.
    pub validation: ValidationPolicy,

    /// Regions submitted at once. Default: 1 (sequential).
    ///
    /// Results are always assembled in detection order whatever this is set to.
    pub concurrency: usize,

    /// Ask the structured endpoint for page images and inline them as data
    /// URIs in place of their `![id](id)` references. Default: false.
    pub inline_images: bool,

    /// Separator between OCR pages. Default: blank line.
    pub page_separator: PageSeparator,

    /// Per-call timeout for both endpoints, seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs, seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Progress events sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            mode: OcrMode::default(),
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            ocr_model: DEFAULT_OCR_MODEL.to_string(),
            chat_provider_name: DEFAULT_CHAT_PROVIDER.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            chat_provider: None,
            prompt: DEFAULT_PROMPT.to_string(),
            table_prompt: None,
            temperature: None,
            max_tokens: None,
            detect_tables: false,
            layout: LayoutOptions::default(),
            region: RegionOptions::default(),
            validation: ValidationPolicy::default(),
            concurrency: 1,
            inline_images: false,
            page_separator: PageSeparator::default(),
            api_timeout_secs: 120,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for OcrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrConfig")
            .field("mode", &self.mode)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("ocr_model", &self.ocr_model)
            .field("chat_provider_name", &self.chat_provider_name)
            .field("chat_model", &self.chat_model)
            .field("chat_provider", &self.chat_provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("detect_tables", &self.detect_tables)
            .field("layout", &self.layout)
            .field("region", &self.region)
            .field("validation", &self.validation)
            .field("concurrency", &self.concurrency)
            .field("inline_images", &self.inline_images)
            .field("page_separator", &self.page_separator)
            .finish()
    }
}

impl OcrConfig {
    /// Create a new builder for `OcrConfig`.
    pub fn builder() -> OcrConfigBuilder {
        OcrConfigBuilder {
            config: Self::default(),
        }
    }

    /// Instruction for a cropped table in prompt mode.
    pub fn region_prompt(&self) -> &str {
        self.table_prompt.as_deref().unwrap_or(&self.prompt)
    }

    /// The API key from config, else `MISTRAL_API_KEY`.
    pub fn resolve_api_key(&self) -> Result<String, OcrError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }
        match std::env::var("MISTRAL_API_KEY") {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(OcrError::MissingApiKey {
                provider: "mistral".into(),
                hint: "Set MISTRAL_API_KEY or pass --api-key.".into(),
            }),
        }
    }
}

/// Builder for [`OcrConfig`].
#[derive(Debug)]
pub struct OcrConfigBuilder {
    config: OcrConfig,
}

impl OcrConfigBuilder {
    pub fn mode(mut self, mode: OcrMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn chat_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.chat_provider_name = name.into();
        self
    }

    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.config.chat_model = model.into();
        self
    }

    pub fn chat_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.chat_provider = Some(provider);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompt = prompt.into();
        self
    }

    pub fn table_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.table_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = Some(n);
        self
    }

    pub fn detect_tables(mut self, v: bool) -> Self {
        self.config.detect_tables = v;
        self
    }

    pub fn layout(mut self, opts: LayoutOptions) -> Self {
        self.config.layout = opts;
        self
    }

    /// Python interpreter that has `paddleocr` installed.
    pub fn python(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.layout.python = path.into();
        self
    }

    pub fn padding(mut self, px: u32) -> Self {
        self.config.region.padding = px;
        self
    }

    pub fn upscale_factor(mut self, factor: f32) -> Self {
        self.config.region.upscale_factor = factor;
        self
    }

    pub fn max_crop_pixels(mut self, px: u32) -> Self {
        self.config.region.max_crop_pixels = px;
        self
    }

    pub fn validation(mut self, policy: ValidationPolicy) -> Self {
        self.config.validation = policy;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn inline_images(mut self, v: bool) -> Self {
        self.config.inline_images = v;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<OcrConfig, OcrError> {
        let c = &self.config;
        if !(1.0..=4.0).contains(&c.region.upscale_factor) {
            return Err(OcrError::InvalidConfig(format!(
                "Upscale factor must be 1.0–4.0, got {}",
                c.region.upscale_factor
            )));
        }
        if c.region.padding > 1000 {
            return Err(OcrError::InvalidConfig(format!(
                "Padding must be ≤ 1000 px, got {}",
                c.region.padding
            )));
        }
        if c.region.max_crop_pixels < 64 {
            return Err(OcrError::InvalidConfig(
                "Max crop pixels must be ≥ 64".into(),
            ));
        }
        if c.prompt.trim().is_empty() {
            return Err(OcrError::InvalidConfig("Prompt must not be empty".into()));
        }
        if c.table_prompt.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(OcrError::InvalidConfig("Table prompt must not be empty".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(OcrError::InvalidConfig("API timeout must be ≥ 1s".into()));
        }
        if !(0.0..=1.0).contains(&c.layout.min_score) {
            return Err(OcrError::InvalidConfig(format!(
                "Detector min score must be 0.0–1.0, got {}",
                c.layout.min_score
            )));
        }
        c.validation.check()?;
        Ok(self.config)
    }
}

// ── Enums and sub-structs ────────────────────────────────────────────────

/// Which remote endpoint reads an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    /// Dedicated OCR endpoint: fast, per-page Markdown. (default)
    #[default]
    Structured,
    /// Vision chat with a free-text instruction: slower, steerable.
    Prompt,
}

impl fmt::Display for OcrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OcrMode::Structured => "structured",
            OcrMode::Prompt => "prompt",
        })
    }
}

/// Crop geometry for detected table regions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionOptions {
    /// Margin added on every side of a detected box, in source pixels. Default: 30.
    pub padding: u32,
    /// Resize factor applied to each crop (cubic kernel). Default: 1.5.
    pub upscale_factor: f32,
    /// Longest edge allowed after upscaling. Default: 4096.
    pub max_crop_pixels: u32,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            padding: 30,
            upscale_factor: 1.5,
            max_crop_pixels: 4096,
        }
    }
}

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n". (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the given page (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_table_pipeline() {
        let c = OcrConfig::default();
        assert_eq!(c.mode, OcrMode::Structured);
        assert_eq!(c.region.padding, 30);
        assert_eq!(c.region.upscale_factor, 1.5);
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.chat_model, "pixtral-12b-2409");
        assert_eq!(c.prompt, DEFAULT_PROMPT);
    }

    #[test]
    fn builder_rejects_bad_upscale() {
        assert!(OcrConfig::builder().upscale_factor(0.5).build().is_err());
        assert!(OcrConfig::builder().upscale_factor(9.0).build().is_err());
        assert!(OcrConfig::builder().upscale_factor(2.0).build().is_ok());
    }

    #[test]
    fn builder_rejects_empty_prompt() {
        let err = OcrConfig::builder().prompt("   ").build().unwrap_err();
        assert!(err.to_string().contains("Prompt"));
    }

    #[test]
    fn api_base_trailing_slash_trimmed() {
        let c = OcrConfig::builder()
            .api_base("http://localhost:9000/v1/")
            .build()
            .unwrap();
        assert_eq!(c.api_base, "http://localhost:9000/v1");
    }

    #[test]
    fn debug_redacts_key() {
        let c = OcrConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn explicit_key_wins() {
        let c = OcrConfig::builder().api_key("from-config").build().unwrap();
        assert_eq!(c.resolve_api_key().unwrap(), "from-config");
    }

    #[test]
    fn separator_render() {
        assert_eq!(PageSeparator::None.render(2), "\n\n");
        assert_eq!(PageSeparator::Comment.render(3), "\n\n<!-- page 3 -->\n\n");
    }
}
