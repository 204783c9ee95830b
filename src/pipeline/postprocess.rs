//! Post-processing: normalise OCR Markdown and resolve page image references.
//!
//! The structured endpoint returns clean Markdown; the vision-chat path is a
//! language model and occasionally wraps its answer in a code fence or emits
//! CRLF line endings. [`clean_markdown`] applies the same cheap, deterministic
//! passes to both so the assembled document is uniform. None of the passes
//! touch cell contents, so the table validator sees what the service sent.

use crate::pipeline::client::OcrImage;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Normalise one OCR answer.
///
/// Passes, in order:
/// 1. unwrap an outer ```` ```markdown ```` fence
/// 2. CRLF / CR → LF
/// 3. drop invisible characters (zero-width spaces, BOM, soft hyphen)
/// 4. trim trailing whitespace on every line
/// 5. collapse runs of blank lines to at most two
/// 6. drop spurious separator rows inside table bodies
/// 7. end with exactly one newline
pub fn clean_markdown(input: &str) -> String {
    let text = unwrap_fence(input);
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = text.replace(INVISIBLE, "");

    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let lines = drop_body_separators(&lines);
    let text = RE_BLANK_RUN.replace_all(&lines.join("\n"), "\n\n\n").into_owned();

    let text = text.trim_end();
    if text.is_empty() {
        "\n".to_string()
    } else {
        format!("{text}\n")
    }
}

const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}',
];

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n```$").unwrap());

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn unwrap_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_FENCE.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

fn is_pipe_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

static RE_ALIGN_CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^:?-{2,}:?$").unwrap());

/// Every cell is an alignment marker (`---`, `:--`, `--:`). A lone `-` is
/// a data cell meaning "no value".
fn is_separator(line: &str) -> bool {
    let t = line.trim();
    let inner = t.strip_prefix('|').unwrap_or(t);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    !inner.is_empty() && inner.split('|').all(|cell| RE_ALIGN_CELL.is_match(cell.trim()))
}

/// Keep a table's separator only in second position.
fn drop_body_separators<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    let mut out = Vec::with_capacity(lines.len());
    let mut row_in_table = 0usize;
    for &line in lines {
        if is_pipe_row(line) {
            row_in_table += 1;
            if is_separator(line) && row_in_table != 2 {
                continue;
            }
        } else {
            row_in_table = 0;
        }
        out.push(line);
    }
    out
}

static RE_IMAGE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)\s]+)\)").unwrap());

/// Replace `![alt](id)` references with data URIs for images the service
/// returned. References without a payload are left untouched.
pub fn inline_page_images(markdown: &str, images: &[OcrImage]) -> String {
    if images.is_empty() {
        return markdown.to_string();
    }
    let mut inlined = 0usize;
    let out = RE_IMAGE_REF
        .replace_all(markdown, |caps: &regex::Captures<'_>| {
            let target = &caps[2];
            let payload = images
                .iter()
                .find(|img| img.id == target)
                .and_then(|img| img.image_base64.as_deref());
            match payload {
                Some(b64) => {
                    inlined += 1;
                    format!("![{}]({})", &caps[1], as_data_uri(target, b64))
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned();
    debug!("Inlined {} of {} page image(s)", inlined, images.len());
    out
}

fn as_data_uri(id: &str, b64: &str) -> String {
    if b64.starts_with("data:") {
        return b64.to_string();
    }
    let ext = id.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "image/jpeg",
    };
    format!("data:{mime};base64,{b64}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(id: &str, b64: Option<&str>) -> OcrImage {
        OcrImage {
            id: id.to_string(),
            image_base64: b64.map(String::from),
        }
    }

    #[test]
    fn fence_unwrapped() {
        assert_eq!(clean_markdown("```markdown\n# Hi\nthere\n```"), "# Hi\nthere\n");
        assert_eq!(clean_markdown("```\nplain\n```\n"), "plain\n");
    }

    #[test]
    fn inner_code_block_kept() {
        let input = "Intro\n\n```\ncode\n```\n\nOutro";
        assert_eq!(clean_markdown(input), format!("{input}\n"));
    }

    #[test]
    fn line_endings_and_trailing_space() {
        assert_eq!(clean_markdown("a  \r\nb\rc\t"), "a\nb\nc\n");
    }

    #[test]
    fn blank_runs_collapsed() {
        assert_eq!(clean_markdown("a\n\n\n\n\n\nb"), "a\n\n\nb\n");
    }

    #[test]
    fn invisible_chars_removed() {
        assert_eq!(clean_markdown("\u{FEFF}Cr\u{200B} %\u{00AD}"), "Cr %\n");
    }

    #[test]
    fn empty_input_is_single_newline() {
        assert_eq!(clean_markdown("  \n\n"), "\n");
    }

    #[test]
    fn body_separator_dropped() {
        let input = "| A | B |\n| --- | --- |\n| 1 | 2 |\n|---|---|\n| 3 | 4 |";
        let out = clean_markdown(input);
        assert_eq!(out, "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |\n");
    }

    #[test]
    fn dash_data_row_kept() {
        let input = "| Heat | C % | Cr % |\n| --- | --- | --- |\n| 4411 | 0.02 | 18.1 |\n| - | - | - |\n| 4412 | 0.03 | 18.0 |";
        let out = clean_markdown(input);
        assert_eq!(out, format!("{input}\n"));
        let policy = crate::pipeline::validate::ValidationPolicy::default();
        assert_eq!(crate::pipeline::validate::assess(&out, &policy).rows, 4);
    }

    #[test]
    fn aligned_body_separator_dropped() {
        let input = "| A | B |\n|:--|--:|\n| 1 | 2 |\n| :---: | --- |\n| 3 | 4 |";
        assert_eq!(clean_markdown(input), "| A | B |\n|:--|--:|\n| 1 | 2 |\n| 3 | 4 |\n");
    }

    #[test]
    fn table_cells_untouched() {
        let input = "| Heat | C % |\n| --- | --- |\n| 4411 | 0,021 |";
        assert_eq!(clean_markdown(input), format!("{input}\n"));
    }

    #[test]
    fn image_refs_inlined() {
        let md = "Text\n\n![img-0.jpeg](img-0.jpeg)\n\n![img-1.png](img-1.png)";
        let images = [
            img("img-0.jpeg", Some("data:image/jpeg;base64,AAAA")),
            img("img-1.png", Some("BBBB")),
        ];
        let out = inline_page_images(md, &images);
        assert!(out.contains("![img-0.jpeg](data:image/jpeg;base64,AAAA)"));
        assert!(out.contains("![img-1.png](data:image/png;base64,BBBB)"));
    }

    #[test]
    fn image_refs_without_payload_kept() {
        let md = "![img-0.jpeg](img-0.jpeg) and ![x](https://host/x.png)";
        let out = inline_page_images(md, &[img("img-0.jpeg", None)]);
        assert_eq!(out, md);
    }
}
