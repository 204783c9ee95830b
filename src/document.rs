//! The uploaded document: raw bytes plus what kind of file they are.
//!
//! A [`Document`] is immutable once built. Its kind is sniffed from magic
//! bytes (or taken from a declared MIME type) because the two OCR endpoints
//! take different payload shapes for PDFs and images, and sending the wrong
//! one is a remote "bad request".

use crate::error::OcrError;
use crate::pipeline::encode::{self, EncodedDocument};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Accepted input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Png,
    Jpeg,
}

impl DocumentKind {
    /// MIME type used in the data URI.
    pub fn mime(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "application/pdf",
            DocumentKind::Png => "image/png",
            DocumentKind::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Png => "png",
            DocumentKind::Jpeg => "jpg",
        }
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, DocumentKind::Pdf)
    }

    /// Parse a declared MIME type. `image/jpg` is accepted as a common alias.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let base = mime.split(';').next().unwrap_or("").trim();
        match base.to_ascii_lowercase().as_str() {
            "application/pdf" => Some(DocumentKind::Pdf),
            "image/png" => Some(DocumentKind::Png),
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(DocumentKind::Jpeg),
            _ => None,
        }
    }

    /// Identify the format from the leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            return Some(DocumentKind::Pdf);
        }
        match image::guess_format(bytes) {
            Ok(image::ImageFormat::Png) => Some(DocumentKind::Png),
            Ok(image::ImageFormat::Jpeg) => Some(DocumentKind::Jpeg),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentKind::Pdf => "PDF",
            DocumentKind::Png => "PNG",
            DocumentKind::Jpeg => "JPEG",
        })
    }
}

/// An uploaded PDF or image.
#[derive(Clone)]
pub struct Document {
    bytes: Vec<u8>,
    kind: DocumentKind,
    name: Option<String>,
    page_count: Option<usize>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .field("page_count", &self.page_count)
            .finish()
    }
}

impl Document {
    /// Build a document, sniffing its kind from the bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, OcrError> {
        if bytes.is_empty() {
            return Err(OcrError::EmptyDocument);
        }
        let kind = DocumentKind::sniff(&bytes).ok_or_else(|| OcrError::UnsupportedFormat {
            detail: format!("unrecognised leading bytes {:02x?}", &bytes[..bytes.len().min(8)]),
        })?;
        Ok(Self {
            bytes,
            kind,
            name: None,
            page_count: None,
        })
    }

    /// Build a document with a declared MIME type.
    ///
    /// Recognised magic bytes win over the declaration. The declared type is
    /// used only when the bytes match no known signature.
    pub fn with_mime(bytes: Vec<u8>, mime: &str) -> Result<Self, OcrError> {
        if bytes.is_empty() {
            return Err(OcrError::EmptyDocument);
        }
        let declared = DocumentKind::from_mime(mime);
        let kind = match (DocumentKind::sniff(&bytes), declared) {
            (Some(sniffed), Some(declared)) if sniffed != declared => {
                tracing::warn!("Declared {} but bytes are {}; using {}", declared, sniffed, sniffed);
                sniffed
            }
            (Some(sniffed), _) => sniffed,
            (None, Some(declared)) => declared,
            (None, None) => {
                return Err(OcrError::UnsupportedFormat {
                    detail: format!("MIME type '{mime}'"),
                })
            }
        };
        Ok(Self {
            bytes,
            kind,
            name: None,
            page_count: None,
        })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach the page count found by [`crate::pipeline::inspect`]. Ignored for images.
    pub fn with_page_count(mut self, pages: usize) -> Self {
        if self.kind.is_pdf() {
            self.page_count = Some(pages);
        }
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn mime(&self) -> &'static str {
        self.kind.mime()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn page_count(&self) -> Option<usize> {
        self.page_count
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base64 data-URI form for the OCR endpoints.
    pub fn encode(&self) -> Result<EncodedDocument, OcrError> {
        encode::encode_bytes(&self.bytes, self.mime())
    }
}
