//! Pipeline stages for document OCR.
//!
//! Each submodule implements one step. Only [`client`] talks to the OCR
//! service and only [`layout`] spawns a process; everything else is local and
//! deterministic.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ inspect ──▶ [layout ──▶ regions] ──▶ encode ──▶ client ──▶ postprocess ──▶ validate
//! (URL/path) (pdfium)    (paddleocr)  (crop)      (base64)   (Mistral)   (cleanup)       (tables)
//! ```
//!
//! 1. [`input`]: read a local file or download a URL; sniff PDF/PNG/JPEG
//! 2. [`inspect`]: page count and pixel size, best effort
//! 3. [`layout`]: optional table detection through a Python subprocess
//! 4. [`regions`]: pad, crop and upscale each detected table
//! 5. [`encode`]: base64 data URIs for the request bodies
//! 6. [`client`]: structured `/ocr` endpoint or prompt-driven vision chat
//! 7. [`postprocess`]: strip fences and invisible characters, inline images
//! 8. [`validate`]: row-consistency check and coarse table category

pub mod client;
pub mod encode;
pub mod input;
pub mod inspect;
pub mod layout;
pub mod postprocess;
pub mod regions;
pub mod validate;
