//! Local document inspection: page count and image size, no API call.
//!
//! pdfium is bound at runtime (`PDFIUM_LIB_PATH`, else the system library).
//! Nothing else in the crate needs pdfium, so a missing library only costs
//! the page count: [`inspect`] reports `None` and the run goes on.

use crate::document::Document;
use crate::error::OcrError;
use crate::output::DocumentInfo;
use pdfium_render::prelude::*;
use std::io::Cursor;
use tracing::{debug, warn};

/// Count the pages of a PDF held in memory.
///
/// pdfium is not async-safe, so this runs inside `spawn_blocking`.
pub async fn page_count(bytes: Vec<u8>) -> Result<usize, OcrError> {
    tokio::task::spawn_blocking(move || page_count_blocking(&bytes))
        .await
        .map_err(|e| OcrError::Internal(format!("Inspect task panicked: {e}")))?
}

fn bind_pdfium() -> Result<Pdfium, OcrError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) if !dir.is_empty() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
        }
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| OcrError::PdfiumUnavailable(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn page_count_blocking(bytes: &[u8]) -> Result<usize, OcrError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| OcrError::CorruptPdf {
            detail: format!("{e:?}"),
        })?;
    let pages = document.pages().len() as usize;
    debug!("pdfium: {} page(s)", pages);
    Ok(pages)
}

/// Attach the PDF page count to `doc` when pdfium can provide it.
///
/// Images and documents that already carry a count are returned as is.
pub async fn count_pages(doc: Document) -> Document {
    if !doc.kind().is_pdf() || doc.page_count().is_some() {
        return doc;
    }
    match page_count(doc.bytes().to_vec()).await {
        Ok(n) => doc.with_page_count(n),
        Err(e) => {
            debug!("Page count not attached: {}", e);
            doc
        }
    }
}

/// Pixel size of a PNG/JPEG without decoding the whole bitmap.
pub fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32), OcrError> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| OcrError::ImageDecode(e.to_string()))?
        .into_dimensions()
        .map_err(|e| OcrError::ImageDecode(e.to_string()))
}

/// Describe a document. PDF page count and image size are best effort.
pub async fn inspect(doc: &Document) -> DocumentInfo {
    let mut info = DocumentInfo {
        name: doc.name().map(str::to_string),
        kind: doc.kind(),
        mime: doc.mime().to_string(),
        size_bytes: doc.len(),
        page_count: doc.page_count(),
        width: None,
        height: None,
    };

    if doc.kind().is_pdf() {
        if info.page_count.is_none() {
            match page_count(doc.bytes().to_vec()).await {
                Ok(n) => info.page_count = Some(n),
                Err(e) => warn!("Page count unavailable: {}", e),
            }
        }
    } else {
        info.page_count = Some(1);
        match image_dimensions(doc.bytes()) {
            Ok((w, h)) => {
                info.width = Some(w);
                info.height = Some(h);
            }
            Err(e) => warn!("Image size unavailable: {}", e),
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn png(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([0, 0, 0])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn png_dimensions() {
        assert_eq!(image_dimensions(&png(31, 7)).unwrap(), (31, 7));
    }

    #[test]
    fn truncated_image_is_decode_error() {
        let bytes = png(4, 4);
        assert!(matches!(
            image_dimensions(&bytes[..10]),
            Err(OcrError::ImageDecode(_))
        ));
    }

    #[tokio::test]
    async fn image_info() {
        let doc = Document::from_bytes(png(120, 80)).unwrap().named("scan.png");
        let info = inspect(&doc).await;
        assert_eq!(info.mime, "image/png");
        assert_eq!(info.page_count, Some(1));
        assert_eq!((info.width, info.height), (Some(120), Some(80)));
        assert_eq!(info.name.as_deref(), Some("scan.png"));
    }

    #[tokio::test]
    async fn count_pages_leaves_images_alone() {
        let doc = count_pages(Document::from_bytes(png(8, 8)).unwrap()).await;
        assert_eq!(doc.page_count(), None);

        let pdf = Document::from_bytes(b"%PDF-1.4 not really".to_vec())
            .unwrap()
            .with_page_count(2);
        assert_eq!(count_pages(pdf).await.page_count(), Some(2));
    }

    #[tokio::test]
    async fn known_page_count_is_not_recomputed() {
        let doc = Document::from_bytes(b"%PDF-1.4 not really".to_vec())
            .unwrap()
            .with_page_count(4);
        let info = inspect(&doc).await;
        assert_eq!(info.page_count, Some(4));
        assert!(info.width.is_none());
    }
}
