//! Table locator: find tabular regions in an image with a layout model.
//!
//! There is no usable layout-analysis model in Rust, so detection runs
//! PaddleOCR in a Python subprocess. The interpreter and the `paddleocr`
//! package are optional at runtime: [`probe_detector`] checks for them once at
//! startup and returns `None` when they are missing, and the pipeline then
//! never attempts table cropping.
//!
//! A detector that exists but fails on a particular image (missing weights,
//! out of memory, crash) returns [`OcrError::LayoutFailed`]; the caller falls
//! back to whole-image OCR.
//!
//! ## Subprocess protocol
//!
//! The image is written to a temp file whose path is passed as `argv[1]`.
//! The script prints one JSON array as its last stdout line:
//!
//! ```json
//! [{"label": "table", "score": 0.97, "coordinate": [x1, y1, x2, y2]}]
//! ```

use crate::error::OcrError;
use crate::pipeline::regions::{BoundingBox, TableRegion};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// A layout model that may or may not be installed.
pub trait TableDetector: Send + Sync {
    /// Short name for logs and notices.
    fn name(&self) -> &str;

    /// Table regions in `image` (encoded PNG/JPEG bytes), in reading order.
    fn detect<'a>(&'a self, image: &'a [u8]) -> BoxFuture<'a, Result<Vec<TableRegion>, OcrError>>;
}

/// Settings for [`PaddleLayoutDetector`].
#[derive(Debug, Clone)]
pub struct LayoutOptions {
    /// Python interpreter. Default: `python3`.
    pub python: PathBuf,
    /// PaddleOCR layout model. Default: `PP-DocLayout-L`.
    pub model: String,
    /// Minimum detector confidence kept. Default: 0.5.
    pub min_score: f32,
    /// Wall-clock limit for one detection, including model load. Default: 300 s.
    pub timeout_secs: u64,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            python: PathBuf::from("python3"),
            model: "PP-DocLayout-L".to_string(),
            min_score: 0.5,
            timeout_secs: 300,
        }
    }
}

const DETECT_SCRIPT: &str = r#"
import json, sys
from paddleocr import LayoutDetection

model = LayoutDetection(model_name=sys.argv[2])
boxes = []
for res in model.predict(sys.argv[1], batch_size=1):
    data = res.json if hasattr(res, "json") else res
    data = data.get("res", data)
    for b in data.get("boxes", []):
        boxes.append({
            "label": str(b.get("label", "")),
            "score": float(b.get("score", 0.0)),
            "coordinate": [float(v) for v in b.get("coordinate", [])],
        })
print(json.dumps(boxes))
"#;

/// PaddleOCR `LayoutDetection` run through a Python subprocess.
#[derive(Debug, Clone)]
pub struct PaddleLayoutDetector {
    opts: LayoutOptions,
}

impl PaddleLayoutDetector {
    pub fn new(opts: LayoutOptions) -> Self {
        Self { opts }
    }

    async fn run(&self, image: &[u8]) -> Result<Vec<TableRegion>, OcrError> {
        let mut tmp = tempfile::Builder::new()
            .prefix("ocr2md-layout-")
            .suffix(".img")
            .tempfile()
            .map_err(|e| OcrError::LayoutFailed(format!("temp file: {e}")))?;
        tmp.write_all(image)
            .and_then(|_| tmp.flush())
            .map_err(|e| OcrError::LayoutFailed(format!("temp file: {e}")))?;

        let mut cmd = Command::new(&self.opts.python);
        cmd.arg("-c")
            .arg(DETECT_SCRIPT)
            .arg(tmp.path())
            .arg(&self.opts.model)
            .env("DISABLE_MODEL_SOURCE_CHECK", "True")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(self.opts.timeout_secs), cmd.output())
            .await
            .map_err(|_| {
                OcrError::LayoutFailed(format!("timed out after {}s", self.opts.timeout_secs))
            })?
            .map_err(|e| OcrError::LayoutFailed(format!("could not start {:?}: {e}", self.opts.python)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("no output");
            return Err(OcrError::LayoutFailed(format!(
                "{} exited with {}: {}",
                self.name(),
                output.status,
                last.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_detections(&stdout, self.opts.min_score)
    }
}

impl TableDetector for PaddleLayoutDetector {
    fn name(&self) -> &str {
        "paddleocr"
    }

    fn detect<'a>(&'a self, image: &'a [u8]) -> BoxFuture<'a, Result<Vec<TableRegion>, OcrError>> {
        Box::pin(self.run(image))
    }
}

#[derive(Deserialize)]
struct RawBox {
    label: String,
    score: f32,
    coordinate: Vec<f32>,
}

/// Parse the detector's stdout and keep confident `table` boxes.
///
/// Model-loading chatter on stdout is tolerated: only the last non-empty line
/// is read.
pub fn parse_detections(stdout: &str, min_score: f32) -> Result<Vec<TableRegion>, OcrError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| OcrError::LayoutFailed("detector printed nothing".into()))?;
    let raw: Vec<RawBox> = serde_json::from_str(line)
        .map_err(|e| OcrError::LayoutFailed(format!("unreadable detector output: {e}")))?;

    let total = raw.len();
    let tables: Vec<TableRegion> = raw
        .into_iter()
        .filter(|b| b.label.eq_ignore_ascii_case("table") && b.score >= min_score)
        .filter_map(|b| match b.coordinate[..] {
            [x1, y1, x2, y2] => Some(TableRegion {
                bbox: BoundingBox::from_corners(x1, y1, x2, y2),
                score: b.score,
            }),
            _ => None,
        })
        .filter(|r| !r.bbox.is_empty())
        .collect();
    debug!("Layout: {} region(s), {} table(s) kept", total, tables.len());
    Ok(tables)
}

/// Check once whether PaddleOCR can run here.
///
/// Returns `None` (with a log line) when the interpreter or the package is
/// missing; nothing is raised.
pub async fn probe_detector(opts: &LayoutOptions) -> Option<Arc<dyn TableDetector>> {
    let mut cmd = Command::new(&opts.python);
    cmd.args(["-c", "import paddleocr"])
        .env("DISABLE_MODEL_SOURCE_CHECK", "True")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(Duration::from_secs(60), cmd.output()).await {
        Ok(Ok(out)) if out.status.success() => {
            info!("Table detection available ({:?} + paddleocr)", opts.python);
            Some(Arc::new(PaddleLayoutDetector::new(opts.clone())))
        }
        Ok(Ok(out)) => {
            warn!(
                "paddleocr not importable with {:?}: {}",
                opts.python,
                String::from_utf8_lossy(&out.stderr).lines().last().unwrap_or("").trim()
            );
            None
        }
        Ok(Err(e)) => {
            warn!("Python interpreter {:?} not usable: {}", opts.python, e);
            None
        }
        Err(_) => {
            warn!("Probing {:?} for paddleocr timed out", opts.python);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_confident_tables_only() {
        let out = concat!(
            "Creating model: ('PP-DocLayout-L', None)\n",
            r#"[{"label": "text", "score": 0.99, "coordinate": [0, 0, 10, 10]}, "#,
            r#"{"label": "table", "score": 0.93, "coordinate": [12.4, 40.6, 300.2, 220.0]}, "#,
            r#"{"label": "Table", "score": 0.31, "coordinate": [5, 5, 50, 50]}, "#,
            r#"{"label": "table", "score": 0.88, "coordinate": [1, 2, 3]}]"#,
            "\n"
        );
        let tables = parse_detections(out, 0.5).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].bbox, BoundingBox::new(12, 41, 288, 179));
        assert!((tables[0].score - 0.93).abs() < 1e-6);
    }

    #[test]
    fn label_match_ignores_case() {
        let out = r#"[{"label": "TABLE", "score": 0.7, "coordinate": [0, 0, 20, 20]}]"#;
        assert_eq!(parse_detections(out, 0.5).unwrap().len(), 1);
    }

    #[test]
    fn empty_array_is_no_tables() {
        assert!(parse_detections("[]\n", 0.5).unwrap().is_empty());
    }

    #[test]
    fn garbage_output_is_failure() {
        assert!(matches!(
            parse_detections("Traceback (most recent call last):", 0.5),
            Err(OcrError::LayoutFailed(_))
        ));
        assert!(matches!(parse_detections("", 0.5), Err(OcrError::LayoutFailed(_))));
    }

    #[tokio::test]
    async fn probe_without_interpreter_is_none() {
        let opts = LayoutOptions {
            python: PathBuf::from("/nonexistent/ocr2md-python"),
            ..LayoutOptions::default()
        };
        assert!(probe_detector(&opts).await.is_none());
    }

    #[tokio::test]
    async fn missing_interpreter_is_layout_failure() {
        let det = PaddleLayoutDetector::new(LayoutOptions {
            python: PathBuf::from("/nonexistent/ocr2md-python"),
            ..LayoutOptions::default()
        });
        let err = det.detect(b"\x89PNG\r\n\x1a\n").await.unwrap_err();
        assert!(matches!(err, OcrError::LayoutFailed(_)));
    }
}
