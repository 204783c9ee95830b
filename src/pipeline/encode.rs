//! Encoding: document bytes → base64 data URI.
//!
//! Both Mistral endpoints take the document inline as
//! `data:<mime>;base64,<payload>`. Crops produced by the region processor are
//! written as PNG: lossless compression keeps thin table rules and small
//! digits intact, which JPEG artefacts would smear.

use crate::error::OcrError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// A base64 payload tagged with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDocument {
    mime: String,
    payload: String,
}

impl EncodedDocument {
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Bare base64 payload, without the `data:` prefix.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.payload)
    }
}

/// Encode a byte buffer. Empty input is rejected.
pub fn encode_bytes(bytes: &[u8], mime: &str) -> Result<EncodedDocument, OcrError> {
    if bytes.is_empty() {
        return Err(OcrError::EmptyDocument);
    }
    let payload = STANDARD.encode(bytes);
    debug!("Encoded {} bytes of {} → {} bytes base64", bytes.len(), mime, payload.len());
    Ok(EncodedDocument {
        mime: mime.to_string(),
        payload,
    })
}

/// Encode a bitmap as PNG.
pub fn encode_image(img: &DynamicImage) -> Result<EncodedDocument, OcrError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| OcrError::ImageEncode(e.to_string()))?;
    encode_bytes(&buf, "image/png")
}
