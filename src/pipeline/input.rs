//! Input resolution: turn a user-supplied path or URL into a [`Document`].
//!
//! Everything is read into memory; both OCR endpoints take the document
//! inline as base64, so there is no point staging a download on disk. The
//! format is sniffed from magic bytes, never trusted from the extension.

use crate::document::{Document, DocumentKind};
use crate::error::OcrError;
use crate::pipeline::inspect;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load a local file or download a URL.
pub async fn load_document(input: &str, timeout_secs: u64) -> Result<Document, OcrError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(OcrError::InvalidInput {
            input: input.to_string(),
        });
    }
    let doc = if is_url(input) {
        download(input, timeout_secs).await?
    } else if input.contains("://") {
        return Err(OcrError::InvalidInput {
            input: input.to_string(),
        });
    } else {
        read_local(Path::new(input)).await?
    };
    Ok(inspect::count_pages(doc).await)
}

async fn read_local(path: &Path) -> Result<Document, OcrError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => OcrError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => OcrError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => OcrError::ReadFailed { source: e },
    })?;

    let doc = Document::from_bytes(bytes)?;
    let doc = match file_name(path) {
        Some(name) => doc.named(name),
        None => doc,
    };
    debug!("Loaded {} ({} bytes) from {}", doc.kind(), doc.len(), path.display());
    Ok(doc)
}

async fn download(url: &str, timeout_secs: u64) -> Result<Document, OcrError> {
    info!("Downloading document from: {}", url);

    let failed = |reason: String| OcrError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let declared = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let name = url_file_name(url);

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            OcrError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    // Magic bytes decide; Content-Type only fills in for unknown signatures.
    let doc = match declared.as_deref().filter(|m| DocumentKind::from_mime(m).is_some()) {
        Some(mime) => Document::with_mime(bytes.to_vec(), mime)?,
        None => Document::from_bytes(bytes.to_vec())?,
    };
    info!("Downloaded {} ({} bytes)", doc.kind(), doc.len());

    Ok(match name {
        Some(n) => doc.named(n),
        None => doc,
    })
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Last path segment of a URL, when it looks like a file name.
fn url_file_name(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    (!last.is_empty() && last.contains('.')).then(|| last.to_string())
}

/// Default output path next to the input: same stem, new extension.
pub fn sibling_output(input: &str, extension: &str) -> Option<PathBuf> {
    if is_url(input) {
        return None;
    }
    Some(Path::new(input).with_extension(extension))
}
