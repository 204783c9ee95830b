//! Instructions sent to the vision-chat endpoint in prompt mode.
//!
//! Only the prompt-driven path takes an instruction; the structured OCR
//! endpoint has no prompt. Callers override the default via
//! [`crate::config::OcrConfig::prompt`], and whatever is configured is sent
//! byte-for-byte as the text part of the single user message.

/// Default instruction for prompt mode.
///
/// Tables are described row by row rather than reproduced as Markdown: the
/// vision model is markedly better at keeping cells aligned with their
/// headers when it spells each row out.
pub const DEFAULT_PROMPT: &str = "Extract all of the text in this document, exhaustively.
For tables, instead of reproducing them in Markdown, describe their content row by row in a structured, readable way.
Make sure you extract ALL of the document's content without leaving anything out.";

/// Instruction for table crops when the caller wants pipe tables back.
///
/// Used by the CLI's `--table-prompt markdown` option so the validator has
/// delimiter-separated rows to count.
pub const TABLE_MARKDOWN_PROMPT: &str = "This image is a single table cropped from a larger document.
Transcribe it as one GitHub-flavoured Markdown pipe table.
Keep every row and every column, including empty cells, and copy units exactly as printed.
Output only the table.";
