//! Extraction entry points.
//!
//! [`extract`] is the core: it takes an already-loaded [`Document`], an
//! [`OcrBackend`] and an optional [`TableDetector`], and never touches the
//! network or the Python runtime itself. [`extract_input`] wires the
//! production pieces together for a path or URL.
//!
//! ## Table mode
//!
//! When `detect_tables` is on and the document is an image, each detected
//! table is cropped, upscaled and read on its own; the output is one titled
//! section per table. Any failure before the first crop is submitted (no
//! detector, detector error, undecodable image, zero tables) falls back to a
//! single whole-image submission and adds a notice. Failures of the OCR
//! calls themselves are never swallowed.

use crate::config::{OcrConfig, OcrMode, PageSeparator, RegionOptions};
use crate::document::{Document, DocumentKind};
use crate::error::OcrError;
use crate::output::{ExtractionStats, OcrOutput, TableResult};
use crate::pipeline::client::{recognize, select_mode, MistralBackend, OcrBackend, OcrPage};
use crate::pipeline::encode::{encode_image, EncodedDocument};
use crate::pipeline::layout::{probe_detector, TableDetector};
use crate::pipeline::regions::{crop_region, TableRegion};
use crate::pipeline::{input, inspect, postprocess, validate};
use crate::progress::ExtractionProgressCallback;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extract text from a loaded document.
///
/// # Errors
/// Remote OCR failures (auth, rate limit, bad request, unavailable,
/// timeout) are returned as-is. Table-detection problems are not errors;
/// they show up in [`OcrOutput::notices`].
pub async fn extract(
    doc: &Document,
    backend: &dyn OcrBackend,
    detector: Option<&dyn TableDetector>,
    config: &OcrConfig,
) -> Result<OcrOutput, OcrError> {
    let total_start = Instant::now();
    let cb = config.progress_callback.as_deref();
    let document = inspect::inspect(doc).await;
    let mode = select_mode(doc.kind(), config.mode);
    let mut notices = Vec::new();

    if mode != config.mode {
        notices.push(format!(
            "{} documents are read by the structured OCR endpoint; prompt mode applies to images only.",
            doc.kind()
        ));
    }
    info!("Extracting {} ({} bytes) via {} OCR", doc.kind(), doc.len(), mode);
    if let Some(cb) = cb {
        cb.on_extraction_start(&mode.to_string());
    }

    // ── Step 1: Locate and crop tables (images only) ─────────────────────
    let detect_start = Instant::now();
    let crops = if config.detect_tables {
        table_crops(doc, detector, &config.region, &mut notices, cb).await
    } else {
        Vec::new()
    };
    let detect_duration_ms = detect_start.elapsed().as_millis() as u64;

    // ── Step 2: OCR ──────────────────────────────────────────────────────
    let ocr_start = Instant::now();
    let (markdown, pages, tables) = if crops.is_empty() {
        let pages = read_whole(doc, backend, mode, config).await?;
        (assemble_pages(&pages, &config.page_separator), pages, Vec::new())
    } else {
        let tables = read_tables(crops, backend, mode, config).await?;
        (assemble_tables(&tables), Vec::new(), tables)
    };
    let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;

    if markdown.trim().is_empty() {
        notices.push("The OCR service returned no text.".to_string());
    }

    // ── Step 3: Stats ────────────────────────────────────────────────────
    let stats = ExtractionStats {
        mode,
        table_mode: !tables.is_empty(),
        page_count: if tables.is_empty() { pages.len() } else { 1 },
        table_count: tables.len(),
        char_count: markdown.chars().count(),
        detect_duration_ms,
        ocr_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Extraction complete: {} chars, {} page(s), {} table(s), {}ms",
        stats.char_count, stats.page_count, stats.table_count, stats.total_duration_ms
    );
    if let Some(cb) = cb {
        cb.on_extraction_complete(stats.char_count);
    }

    Ok(OcrOutput {
        markdown,
        pages,
        tables,
        notices,
        document,
        stats,
    })
}

/// Load `input` (path or URL) and extract it with the Mistral backend.
///
/// The layout model is probed only when `detect_tables` is on and the
/// input is an image.
pub async fn extract_input(
    input_str: impl AsRef<str>,
    config: &OcrConfig,
) -> Result<OcrOutput, OcrError> {
    let doc = input::load_document(input_str.as_ref(), config.download_timeout_secs).await?;
    let backend = MistralBackend::from_config(config)?;
    let detector = if config.detect_tables && !doc.kind().is_pdf() {
        probe_detector(&config.layout).await
    } else {
        None
    };
    extract(&doc, &backend, detector.as_deref(), config).await
}

/// Extract `input` and write the text to `output_path`.
pub async fn extract_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &OcrConfig,
) -> Result<OcrOutput, OcrError> {
    let output = extract_input(input_str, config).await?;
    write_output(output_path.as_ref(), &output.markdown).await?;
    Ok(output)
}

/// Synchronous wrapper around [`extract_input`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    input_str: impl AsRef<str>,
    config: &OcrConfig,
) -> Result<OcrOutput, OcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| OcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract_input(input_str, config))
}

/// Write text to `path` atomically (temp file in the same directory + rename).
pub async fn write_output(path: &Path, text: &str) -> Result<(), OcrError> {
    let write_err = |source: std::io::Error| OcrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_ext = match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    };
    let tmp_path = path.with_extension(tmp_ext);
    tokio::fs::write(&tmp_path, text).await.map_err(write_err)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_err(e));
    }
    debug!("Wrote {} bytes to {}", text.len(), path.display());
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// A table crop ready to submit.
struct Crop {
    region: TableRegion,
    encoded: EncodedDocument,
}

fn fall_back(
    notices: &mut Vec<String>,
    cb: Option<&dyn ExtractionProgressCallback>,
    reason: String,
) {
    warn!("Table mode abandoned: {}", reason);
    if let Some(cb) = cb {
        cb.on_fallback(&reason);
    }
    notices.push(format!("{reason} The whole image was read in one pass."));
}

/// Detect tables and crop them. An empty result means "read the whole image".
async fn table_crops(
    doc: &Document,
    detector: Option<&dyn TableDetector>,
    region_opts: &RegionOptions,
    notices: &mut Vec<String>,
    cb: Option<&dyn ExtractionProgressCallback>,
) -> Vec<Crop> {
    if doc.kind().is_pdf() {
        notices.push("Table detection applies to images only; the PDF was read as a whole.".into());
        return Vec::new();
    }
    let Some(detector) = detector else {
        fall_back(notices, cb, "Table detection is unavailable (PaddleOCR not found).".into());
        return Vec::new();
    };

    let regions = match detector.detect(doc.bytes()).await {
        Ok(r) => r,
        Err(e) => {
            fall_back(notices, cb, format!("Table detection failed ({}): {}", detector.name(), e));
            return Vec::new();
        }
    };
    if let Some(cb) = cb {
        cb.on_tables_detected(regions.len());
    }
    if regions.is_empty() {
        fall_back(notices, cb, "No table was detected.".into());
        return Vec::new();
    }
    info!("{} table(s) detected by {}", regions.len(), detector.name());

    let bytes = doc.bytes().to_vec();
    let opts = *region_opts;
    let cropped = tokio::task::spawn_blocking(move || crop_all(&bytes, regions, &opts)).await;
    let crops = match cropped {
        Ok(Ok(c)) => c,
        Ok(Err(e)) => {
            fall_back(notices, cb, format!("Could not crop tables: {e}"));
            return Vec::new();
        }
        Err(e) => {
            fall_back(notices, cb, format!("Crop task panicked: {e}"));
            return Vec::new();
        }
    };
    if crops.is_empty() {
        fall_back(notices, cb, "Every detected table lay outside the image.".into());
    }
    crops
}

fn crop_all(
    bytes: &[u8],
    regions: Vec<TableRegion>,
    opts: &RegionOptions,
) -> Result<Vec<Crop>, OcrError> {
    let img = image::load_from_memory(bytes).map_err(|e| OcrError::ImageDecode(e.to_string()))?;
    let mut crops = Vec::with_capacity(regions.len());
    for region in regions {
        let Some(crop) = crop_region(&img, &region.bbox, opts) else {
            warn!("Skipping empty table region {:?}", region.bbox);
            continue;
        };
        crops.push(Crop {
            region,
            encoded: encode_image(&crop)?,
        });
    }
    Ok(crops)
}

/// One submission for the whole document.
async fn read_whole(
    doc: &Document,
    backend: &dyn OcrBackend,
    mode: OcrMode,
    config: &OcrConfig,
) -> Result<Vec<OcrPage>, OcrError> {
    let encoded = doc.encode()?;
    let mut pages = recognize(backend, doc.kind(), &encoded, mode, &config.prompt).await?;
    for page in &mut pages {
        let cleaned = postprocess::clean_markdown(&page.markdown);
        page.markdown = if config.inline_images {
            postprocess::inline_page_images(&cleaned, &page.images)
        } else {
            cleaned
        };
    }
    Ok(pages)
}

/// OCR each crop; results come back in detection order whatever the concurrency.
async fn read_tables(
    crops: Vec<Crop>,
    backend: &dyn OcrBackend,
    mode: OcrMode,
    config: &OcrConfig,
) -> Result<Vec<TableResult>, OcrError> {
    let total = crops.len();
    let prompt = config.region_prompt();
    let cb = config.progress_callback.as_deref();

    stream::iter(crops.into_iter().enumerate().map(|(i, crop)| async move {
        let index = i + 1;
        if let Some(cb) = cb {
            cb.on_region_start(index, total);
        }
        let pages = match recognize(backend, DocumentKind::Png, &crop.encoded, mode, prompt).await {
            Ok(p) => p,
            Err(e) => {
                if let Some(cb) = cb {
                    cb.on_region_error(index, total, &e.to_string());
                }
                return Err(e);
            }
        };
        let markdown = pages
            .iter()
            .map(|p| postprocess::clean_markdown(&p.markdown))
            .collect::<Vec<_>>()
            .join("\n");
        let report = validate::assess(&markdown, &config.validation);
        debug!(
            "Table {}/{}: {} rows × {} cols, {}, stable={}",
            index, total, report.rows, report.columns, report.kind, report.stable
        );
        if let Some(cb) = cb {
            cb.on_region_complete(index, total, markdown.len());
        }
        Ok(TableResult {
            index,
            bbox: crop.region.bbox,
            score: crop.region.score,
            markdown,
            report,
        })
    }))
    .buffered(config.concurrency.max(1))
    .try_collect()
    .await
}

/// Join page texts with the configured separator.
fn assemble_pages(pages: &[OcrPage], separator: &PageSeparator) -> String {
    let mut out = String::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            out.push_str(&separator.render(i + 1));
        }
        out.push_str(page.markdown.trim_end());
    }
    out.push('\n');
    out
}

/// One titled section per table, separated by horizontal rules.
fn assemble_tables(tables: &[TableResult]) -> String {
    let sections: Vec<String> = tables
        .iter()
        .map(|t| format!("{}\n\n{}", t.heading(), t.markdown.trim_end()))
        .collect();
    format!("{}\n", sections.join("\n\n---\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::regions::BoundingBox;
    use crate::pipeline::validate::{TableKind, TableReport};

    fn page(index: usize, md: &str) -> OcrPage {
        OcrPage::from_text(index, md)
    }

    fn table(index: usize, md: &str, stable: bool) -> TableResult {
        TableResult {
            index,
            bbox: BoundingBox::new(0, 0, 1, 1),
            score: 1.0,
            markdown: md.to_string(),
            report: TableReport {
                rows: 2,
                columns: 2,
                stable,
                kind: TableKind::Generic,
            },
        }
    }

    #[test]
    fn pages_joined_with_separator() {
        let pages = [page(0, "one\n"), page(1, "two\n")];
        assert_eq!(assemble_pages(&pages, &PageSeparator::None), "one\n\ntwo\n");
        assert_eq!(
            assemble_pages(&pages, &PageSeparator::Comment),
            "one\n\n<!-- page 2 -->\n\ntwo\n"
        );
    }

    #[test]
    fn tables_joined_with_rules() {
        let out = assemble_tables(&[table(1, "| a | b |\n", true), table(2, "| c | d |\n", false)]);
        assert_eq!(
            out,
            "## Table 1 (type: generic, quality: stable)\n\n| a | b |\n\n---\n\n\
             ## Table 2 (type: generic, quality: unstable)\n\n| c | d |\n"
        );
    }

    #[tokio::test]
    async fn atomic_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/extracted_text.md");
        write_output(&path, "# hi\n").await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# hi\n");
        assert!(!path.with_extension("md.tmp").exists());
    }
}
