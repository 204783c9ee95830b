//! # ocr2md
//!
//! Extract Markdown from PDFs and images with Mistral's OCR service.
//!
//! Two remote endpoints can read a document. The structured OCR endpoint
//! (`mistral-ocr-latest`) returns one Markdown block per page and is the only
//! one that takes PDFs. The prompt-driven vision chat (`pixtral-12b-2409`)
//! reads images and follows a free-text instruction.
//!
//! For images with tables, the crate can first locate each table with a
//! PaddleOCR layout model, crop it with some margin, upscale it, and read it
//! on its own. Every table then gets a quick consistency grade so unreliable
//! transcriptions stand out.
//!
//! ## Pipeline Overview
//!
//! ```text
//! path / URL
//!  │
//!  ├─ 1. Input    read or download, sniff PDF / PNG / JPEG
//!  ├─ 2. Inspect  page count (pdfium) and pixel size, best effort
//!  ├─ 3. Tables   optional: detect ▸ pad ▸ crop ▸ upscale (images only)
//!  ├─ 4. OCR      structured endpoint or vision chat, one call per crop
//!  ├─ 5. Polish   strip fences and invisible characters
//!  ├─ 6. Grade    row-consistency check and table category
//!  └─ 7. Output   assembled Markdown, notices, stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr2md::{extract_input, OcrConfig, OcrMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from MISTRAL_API_KEY
//!     let config = OcrConfig::builder()
//!         .mode(OcrMode::Prompt)
//!         .detect_tables(true)
//!         .build()?;
//!     let output = extract_input("datasheet.png", &config).await?;
//!     println!("{}", output.markdown);
//!     for notice in &output.notices {
//!         eprintln!("note: {notice}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr2md` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! ocr2md = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! | Need | Used for | When missing |
//! |------|----------|--------------|
//! | `MISTRAL_API_KEY` | both endpoints | error before any call |
//! | python3 + `paddleocr` | table detection | whole-image OCR, with a notice |
//! | libpdfium | PDF page count | count reported as unknown |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OcrConfig, OcrConfigBuilder, OcrMode, PageSeparator, RegionOptions};
pub use convert::{extract, extract_input, extract_sync, extract_to_file, write_output};
pub use document::{Document, DocumentKind};
pub use error::OcrError;
pub use output::{DocumentInfo, ExtractionStats, OcrOutput, OutputFormat, TableResult};
pub use pipeline::client::{MistralBackend, MistralOcrClient, OcrBackend, OcrPage, VisionChat};
pub use pipeline::inspect::inspect;
pub use pipeline::layout::{probe_detector, LayoutOptions, PaddleLayoutDetector, TableDetector};
pub use pipeline::regions::{BoundingBox, TableRegion};
pub use pipeline::validate::{TableKind, TableReport, ValidationPolicy};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
