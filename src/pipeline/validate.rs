//! Table quality signal: field counts per row and a coarse type label.
//!
//! This is a best-effort heuristic shown next to each cropped table, not a
//! contract. Every threshold and keyword list lives in [`ValidationPolicy`].
//!
//! A table body is a run of consecutive lines that start with the delimiter
//! (pipe tables from the OCR endpoint). Alignment rows such as
//! `| --- | :---: |` are skipped. A row's field count is the number of
//! delimiter-separated cells once the outer delimiters are trimmed.

use crate::error::OcrError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A parsed table: rows of trimmed cells.
pub type TableRows = Vec<Vec<String>>;

/// Coarse table category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    /// Composition table: element percentages in the header.
    Chemistry,
    /// Mechanical properties: yield, tensile, elongation, hardness.
    Mechanical,
    /// A table that matched no keyword set.
    Generic,
    /// No table could be found in the text.
    Unknown,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TableKind::Chemistry => "chemistry",
            TableKind::Mechanical => "mechanical",
            TableKind::Generic => "generic",
            TableKind::Unknown => "unknown",
        })
    }
}

/// Thresholds and keyword sets for [`assess`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Field delimiter. Default: `|`.
    pub delimiter: char,
    /// A row agrees when its field count is within this distance of the mode. Default: 0.
    pub tolerance: usize,
    /// Share of agreeing rows needed for "stable", 0.0–1.0. Default: 0.95.
    pub min_agreement: f32,
    /// Tables with fewer rows are always stable. Default: 3.
    pub min_rows: usize,
    /// Header substrings that mark a chemistry table.
    pub chemistry_tokens: Vec<String>,
    /// Header substrings that mark a mechanical table.
    pub mechanical_tokens: Vec<String>,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            delimiter: '|',
            tolerance: 0,
            min_agreement: 0.95,
            min_rows: 3,
            chemistry_tokens: to_strings(&[
                "c %", "cr %", "ni %", "mo %", "mn %", "si %", "p %", "n %", "cu %", "co %",
                "ti %",
            ]),
            mechanical_tokens: to_strings(&["rp", "rm", "a5", "hb", "re", "yield", "tensile"]),
        }
    }
}

impl ValidationPolicy {
    /// Looser thresholds: a row may be one field off and 80 % agreement suffices.
    pub fn lenient() -> Self {
        Self {
            tolerance: 1,
            min_agreement: 0.8,
            ..Self::default()
        }
    }

    pub(crate) fn check(&self) -> Result<(), OcrError> {
        if !(0.0..=1.0).contains(&self.min_agreement) {
            return Err(OcrError::InvalidConfig(format!(
                "min_agreement must be 0.0–1.0, got {}",
                self.min_agreement
            )));
        }
        if self.delimiter.is_whitespace() {
            return Err(OcrError::InvalidConfig(
                "Table delimiter must not be whitespace".into(),
            ));
        }
        Ok(())
    }
}

fn to_strings(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

/// Quality signal for one table's OCR text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    /// Non-empty data rows, header included.
    pub rows: usize,
    /// Most common field count.
    pub columns: usize,
    /// Field counts agree per the policy.
    pub stable: bool,
    pub kind: TableKind,
}

/// Assess OCR text returned for a cropped table.
///
/// When the text holds several tables the largest one is judged. Text with
/// no table at all yields `rows == 0`, `kind == Unknown`, and is reported
/// stable (there is nothing inconsistent to flag).
pub fn assess(text: &str, policy: &ValidationPolicy) -> TableReport {
    let best = extract_tables(text, policy.delimiter)
        .into_iter()
        .max_by_key(|t| t.len())
        .unwrap_or_default();
    assess_rows(&best, policy)
}

/// Assess already-parsed rows.
pub fn assess_rows(rows: &[Vec<String>], policy: &ValidationPolicy) -> TableReport {
    let counts = field_counts(rows);
    TableReport {
        rows: counts.len(),
        columns: mode(&counts).unwrap_or(0),
        stable: is_stable(rows, policy),
        kind: classify(rows, policy),
    }
}

/// Split text into table blocks. Empty blocks are dropped.
pub fn extract_tables(text: &str, delimiter: char) -> Vec<TableRows> {
    let mut tables = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with(delimiter) && trimmed.matches(delimiter).count() >= 2 {
            current.push(trimmed);
        } else if !current.is_empty() {
            tables.push(parse_block(&current, delimiter));
            current.clear();
        }
    }
    if !current.is_empty() {
        tables.push(parse_block(&current, delimiter));
    }

    tables
        .into_iter()
        .filter(|t| t.iter().any(|row| row.iter().any(|c| !c.is_empty())))
        .collect()
}

static RE_ALIGNMENT_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\|\s*:?-{2,}:?\s*(\|\s*:?-{2,}:?\s*)+\|?$").unwrap());

fn parse_block(lines: &[&str], delimiter: char) -> TableRows {
    lines
        .iter()
        .filter(|l| !(delimiter == '|' && RE_ALIGNMENT_ROW.is_match(l)))
        .map(|l| {
            l.trim_matches(delimiter)
                .split(delimiter)
                .map(|cell| cell.trim().to_string())
                .collect()
        })
        .collect()
}

fn field_counts(rows: &[Vec<String>]) -> Vec<usize> {
    rows.iter()
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .map(|r| r.len())
        .collect()
}

/// Most frequent value; ties go to the larger count.
fn mode(counts: &[usize]) -> Option<usize> {
    let mut freq: HashMap<usize, usize> = HashMap::new();
    for &c in counts {
        *freq.entry(c).or_default() += 1;
    }
    freq.into_iter()
        .max_by_key(|&(count, n)| (n, count))
        .map(|(count, _)| count)
}

/// Whether field counts agree closely enough to trust the table.
pub fn is_stable(rows: &[Vec<String>], policy: &ValidationPolicy) -> bool {
    if rows.len() < policy.min_rows {
        return true;
    }
    let counts = field_counts(rows);
    let Some(m) = mode(&counts) else {
        return true;
    };
    let agreeing = counts.iter().filter(|&&c| c.abs_diff(m) <= policy.tolerance).count();
    agreeing as f32 / counts.len() as f32 >= policy.min_agreement
}

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn normalize_cell(s: &str) -> String {
    RE_WHITESPACE.replace_all(s.trim(), " ").to_lowercase()
}

/// Label a table from its header row.
pub fn classify(rows: &[Vec<String>], policy: &ValidationPolicy) -> TableKind {
    let Some(header) = rows.first() else {
        return TableKind::Unknown;
    };
    let header = header
        .iter()
        .map(|c| normalize_cell(c))
        .collect::<Vec<_>>()
        .join(" ");

    if policy.chemistry_tokens.iter().any(|t| header.contains(t.as_str())) {
        TableKind::Chemistry
    } else if policy.mechanical_tokens.iter().any(|t| header.contains(t.as_str())) {
        TableKind::Mechanical
    } else {
        TableKind::Generic
    }
}
