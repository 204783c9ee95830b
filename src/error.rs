//! Error types for the ocr2md library.
//!
//! Everything fatal is an [`OcrError`]. Remote failures keep the HTTP status
//! and the message the service sent, so the caller can show them verbatim.
//! Nothing in the library retries: [`OcrError::is_retryable`] only tells the
//! caller whether re-triggering the run may help.
//!
//! Table detection failures are the one locally recovered case. They are
//! still represented here ([`OcrError::LayoutFailed`]) but the extraction
//! pipeline turns them into a notice and falls back to whole-image OCR
//! instead of returning them.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ocr2md library.
#[derive(Debug, Error)]
pub enum OcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The source stream could not be read.
    #[error("Failed to read document: {source}")]
    ReadFailed {
        #[source]
        source: std::io::Error,
    },

    // ── Document errors ───────────────────────────────────────────────────
    /// The document has no bytes.
    #[error("Document is empty")]
    EmptyDocument,

    /// The document is neither a PDF nor a PNG/JPEG image.
    #[error("Unsupported document type: {detail}\nAccepted: PDF, PNG, JPG/JPEG.")]
    UnsupportedFormat { detail: String },

    /// An image could not be decoded.
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),

    /// A cropped region could not be encoded.
    #[error("Failed to encode image: {0}")]
    ImageEncode(String),

    /// PDF bytes were rejected by pdfium.
    #[error("PDF is corrupt or encrypted: {detail}")]
    CorruptPdf { detail: String },

    /// No pdfium library could be bound at runtime.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/dir-containing-libpdfium to enable PDF inspection."
    )]
    PdfiumUnavailable(String),

    // ── Remote API errors ─────────────────────────────────────────────────
    /// No API key was configured.
    #[error("Missing API key for '{provider}'.\n{hint}")]
    MissingApiKey { provider: String, hint: String },

    /// The chat provider could not be constructed.
    #[error("Vision provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// 401/403 from the service.
    #[error("Authentication error from '{provider}' (HTTP {status}): {detail}")]
    AuthError {
        provider: String,
        status: u16,
        detail: String,
    },

    /// 429 from the service.
    #[error("Rate limit exceeded for '{provider}': {detail}")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
        detail: String,
    },

    /// 4xx other than auth and rate limiting, e.g. a PDF sent as an image.
    #[error("Request rejected by '{provider}' (HTTP {status}): {detail}")]
    BadRequest {
        provider: String,
        status: u16,
        detail: String,
    },

    /// 5xx from the service.
    #[error("Service '{provider}' unavailable (HTTP {status}): {detail}")]
    ServiceUnavailable {
        provider: String,
        status: u16,
        detail: String,
    },

    /// Any other remote failure (connection reset, DNS, unknown status).
    #[error("API error from '{provider}': {detail}")]
    ApiError { provider: String, detail: String },

    /// The remote call did not answer in time.
    #[error("API call to '{provider}' timed out after {secs}s")]
    ApiTimeout { provider: String, secs: u64 },

    /// The service answered 2xx with a body we could not understand.
    #[error("Unexpected response from '{provider}': {detail}")]
    MalformedResponse { provider: String, detail: String },

    // ── Layout detection errors ───────────────────────────────────────────
    /// The layout model ran and failed (OOM, missing weights, crash).
    #[error("Table detection failed: {0}")]
    LayoutFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// Map a non-success HTTP status and the remote message to an error.
    pub fn from_status(
        provider: &str,
        status: u16,
        detail: impl Into<String>,
        retry_after_secs: Option<u64>,
    ) -> Self {
        let provider = provider.to_string();
        let detail = detail.into();
        match status {
            401 | 403 => OcrError::AuthError {
                provider,
                status,
                detail,
            },
            429 => OcrError::RateLimitExceeded {
                provider,
                retry_after_secs,
                detail,
            },
            400..=499 => OcrError::BadRequest {
                provider,
                status,
                detail,
            },
            500..=599 => OcrError::ServiceUnavailable {
                provider,
                status,
                detail,
            },
            _ => OcrError::ApiError {
                provider,
                detail: format!("HTTP {status}: {detail}"),
            },
        }
    }

    /// HTTP status carried by a remote error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            OcrError::AuthError { status, .. }
            | OcrError::BadRequest { status, .. }
            | OcrError::ServiceUnavailable { status, .. } => Some(*status),
            OcrError::RateLimitExceeded { .. } => Some(429),
            _ => None,
        }
    }

    /// Whether re-triggering the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OcrError::RateLimitExceeded { .. }
                | OcrError::ServiceUnavailable { .. }
                | OcrError::ApiTimeout { .. }
                | OcrError::ApiError { .. }
                | OcrError::DownloadTimeout { .. }
        )
    }
}
