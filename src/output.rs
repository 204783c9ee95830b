//! Output types: the assembled text plus everything needed to explain it.

use crate::config::OcrMode;
use crate::document::DocumentKind;
use crate::pipeline::client::OcrPage;
use crate::pipeline::regions::BoundingBox;
use crate::pipeline::validate::TableReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrOutput {
    /// Final text, ready to display or save.
    pub markdown: String,
    /// Pages as returned by the whole-document submission. Empty when the
    /// document was read table by table.
    pub pages: Vec<OcrPage>,
    /// One entry per cropped table, in detection order.
    pub tables: Vec<TableResult>,
    /// Informational messages (fallbacks, mode overrides). Never errors.
    pub notices: Vec<String>,
    pub document: DocumentInfo,
    pub stats: ExtractionStats,
}

/// OCR text and quality signal for one cropped table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResult {
    /// 1-based position in detection order.
    pub index: usize,
    /// Region as detected, before padding.
    pub bbox: BoundingBox,
    pub score: f32,
    pub markdown: String,
    pub report: TableReport,
}

impl TableResult {
    /// Section heading used in the assembled document.
    pub fn heading(&self) -> String {
        format!(
            "## Table {} (type: {}, quality: {})",
            self.index,
            self.report.kind,
            if self.report.stable { "stable" } else { "unstable" }
        )
    }
}

/// What was submitted, as far as can be told locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub name: Option<String>,
    pub kind: DocumentKind,
    pub mime: String,
    pub size_bytes: usize,
    /// PDF page count (needs pdfium) or 1 for images.
    pub page_count: Option<usize>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Endpoint that actually read the document.
    pub mode: OcrMode,
    /// Whether table cropping produced the output.
    pub table_mode: bool,
    pub page_count: usize,
    pub table_count: usize,
    pub char_count: usize,
    pub detect_duration_ms: u64,
    pub ocr_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// File flavour for saving the output. Contents are identical; only the
/// extension and MIME type differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Text,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Text => "txt",
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "text/markdown",
            OutputFormat::Text => "text/plain",
        }
    }

    /// File name used when the caller gives none.
    pub fn default_file_name(&self) -> String {
        format!("extracted_text.{}", self.extension())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
