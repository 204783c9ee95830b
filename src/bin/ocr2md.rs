//! CLI binary for ocr2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `OcrConfig` and prints or saves the extracted text.

use anyhow::{Context, Result};
use clap::Parser;
use ocr2md::pipeline::input::{load_document, sibling_output};
use ocr2md::prompts::TABLE_MARKDOWN_PROMPT;
use ocr2md::{
    extract_input, inspect, write_output, ExtractionProgressCallback, ExtractionStats, OcrConfig,
    OcrMode, OutputFormat, PageSeparator, ProgressCallback, ValidationPolicy,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while the document is read in one pass,
/// switched to a bar once tables have been detected. Region lines may print
/// out of order when several crops are in flight.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-region wall-clock start times.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Loading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} tables  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Reading");
        self.bar.reset_eta();
    }

    fn elapsed(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, mode: &str) {
        self.bar.set_prefix("OCR");
        self.bar.set_message(format!("{mode} endpoint…"));
    }

    fn on_tables_detected(&self, count: usize) {
        if count > 0 {
            self.activate_bar(count);
            self.bar.println(format!(
                "{} {}",
                cyan("◆"),
                bold(&format!("{count} table(s) detected"))
            ));
        }
    }

    fn on_fallback(&self, reason: &str) {
        self.bar.println(format!("  {} {}", cyan("⚠"), dim(reason)));
        self.bar.set_prefix("OCR");
        self.bar.set_message("whole image…");
    }

    fn on_region_start(&self, index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(format!("table {index}"));
    }

    fn on_region_complete(&self, index: usize, total: usize, text_len: usize) {
        let secs = self.elapsed(index);
        self.bar.println(format!(
            "  {} Table {:>2}/{:<2}  {:<8}  {}",
            green("✓"),
            index,
            total,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_region_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Table {:>2}/{:<2}  {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, char_count: usize) {
        self.bar.finish_and_clear();
        if self.errors.load(Ordering::SeqCst) == 0 {
            eprintln!(
                "{} {} characters extracted",
                green("✔"),
                bold(&char_count.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Structured OCR of a PDF (stdout)
  ocr2md report.pdf

  # Save next to the input as report.md
  ocr2md report.pdf --save

  # Prompt-driven OCR of a scan with a custom instruction
  ocr2md --mode prompt --prompt-file instructions.txt scan.png -o scan.md

  # Crop each table, read it as a pipe table, and grade it
  ocr2md --tables --mode prompt --table-prompt markdown datasheet.jpg

  # Plain-text download name, from a URL
  ocr2md https://example.com/invoice.png --format txt -o .

  # Local inspection only (no API key needed)
  ocr2md --inspect-only report.pdf

MODES:
  structured   mistral-ocr-latest; per-page Markdown. Always used for PDFs.
  prompt       pixtral-12b-2409 vision chat; follows the prompt. Images only.

TABLE CROPPING (--tables):
  Needs a Python interpreter with `paddleocr` installed (see --python).
  When it is missing, fails, or finds no table, the whole image is read
  in one pass and a notice is printed.

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY        Mistral API key (both endpoints)
  OCR2MD_PYTHON          Interpreter used for table detection
  PDFIUM_LIB_PATH        Directory holding libpdfium (page count only)
  RUST_LOG               Overrides the log filter
"#;

/// Extract Markdown from PDFs and images with Mistral OCR.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2md",
    version,
    about = "Extract Markdown from PDFs and images with Mistral OCR",
    long_about = "Extract text from a PDF, PNG or JPEG (local file or URL) with Mistral's \
structured OCR endpoint or a prompt-driven vision model. Optionally crops each detected \
table out of an image, reads it on its own, and grades the result.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF/PNG/JPEG path or HTTP/HTTPS URL.
    input: String,

    /// Write the text to this file (or into this directory) instead of stdout.
    #[arg(short, long, env = "OCR2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// Save next to the input with the format's extension.
    #[arg(long, conflicts_with = "output")]
    save: bool,

    /// Saved file flavour: md or txt. The text is the same.
    #[arg(long, env = "OCR2MD_FORMAT", value_enum, default_value = "md")]
    format: FormatArg,

    /// Which endpoint reads images: structured or prompt.
    #[arg(long, env = "OCR2MD_MODE", value_enum, default_value = "structured")]
    mode: ModeArg,

    /// Shorthand for --mode prompt.
    #[arg(long)]
    pixtral: bool,

    /// Crop detected tables out of images and read them one by one.
    #[arg(long, env = "OCR2MD_TABLES")]
    tables: bool,

    /// Margin around each detected table, in pixels.
    #[arg(long, env = "OCR2MD_PADDING", default_value_t = 30)]
    padding: u32,

    /// Resize factor applied to each table crop (1.0–4.0).
    #[arg(long, env = "OCR2MD_UPSCALE", default_value_t = 1.5)]
    upscale: f32,

    /// Table crops submitted at once.
    #[arg(short, long, env = "OCR2MD_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Mistral API key.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API root of the structured OCR endpoint.
    #[arg(long, env = "OCR2MD_API_BASE")]
    api_base: Option<String>,

    /// Structured OCR model.
    #[arg(long, env = "OCR2MD_OCR_MODEL")]
    ocr_model: Option<String>,

    /// Vision model used in prompt mode.
    #[arg(long, env = "OCR2MD_CHAT_MODEL")]
    chat_model: Option<String>,

    /// edgequake-llm provider used in prompt mode.
    #[arg(long, env = "OCR2MD_PROVIDER")]
    provider: Option<String>,

    /// Text file whose content replaces the prompt-mode instruction.
    #[arg(long, env = "OCR2MD_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,

    /// Instruction for table crops in prompt mode.
    #[arg(long, env = "OCR2MD_TABLE_PROMPT", value_enum, default_value = "default")]
    table_prompt: TablePromptArg,

    /// Relax the table quality check (±1 field, 80% agreement).
    #[arg(long)]
    lenient: bool,

    /// Inline page images returned by the structured endpoint as data URIs.
    #[arg(long, env = "OCR2MD_INLINE_IMAGES")]
    inline_images: bool,

    /// Page separator: none, hr, comment, or a custom string.
    #[arg(long, env = "OCR2MD_SEPARATOR", default_value = "none")]
    separator: String,

    /// Python interpreter with paddleocr installed.
    #[arg(long, env = "OCR2MD_PYTHON")]
    python: Option<PathBuf>,

    /// Output structured JSON (OcrOutput) instead of text.
    #[arg(long, env = "OCR2MD_JSON")]
    json: bool,

    /// Print local document info only, no OCR.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress display.
    #[arg(long, env = "OCR2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCR2MD_QUIET")]
    quiet: bool,

    /// Per-call OCR timeout in seconds.
    #[arg(long, env = "OCR2MD_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "OCR2MD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Structured,
    Prompt,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Md,
    Txt,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TablePromptArg {
    /// Same instruction as the whole image.
    Default,
    /// Ask for a Markdown pipe table.
    Markdown,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Md => OutputFormat::Markdown,
            FormatArg::Txt => OutputFormat::Text,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // The chat provider factory reads its key from the environment. Set it
    // while the process is still single-threaded.
    if let Some(ref key) = cli.api_key {
        if std::env::var("MISTRAL_API_KEY").ok().as_deref() != Some(key.as_str()) {
            std::env::set_var("MISTRAL_API_KEY", key);
        }
    }

    tokio::runtime::Runtime::new()
        .context("Failed to start the async runtime")?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let doc = load_document(&cli.input, cli.download_timeout)
            .await
            .context("Failed to load document")?;
        let info = inspect(&doc).await;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize document info")?
            );
        } else {
            println!("Input:        {}", cli.input);
            if let Some(ref n) = info.name {
                println!("Name:         {}", n);
            }
            println!("Type:         {} ({})", info.kind, info.mime);
            println!("Size:         {} bytes", info.size_bytes);
            match info.page_count {
                Some(p) => println!("Pages:        {}", p),
                None => println!("Pages:        unknown (pdfium not available)"),
            }
            if let (Some(w), Some(h)) = (info.width, info.height) {
                println!("Dimensions:   {}×{} px", w, h);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let format = OutputFormat::from(cli.format);

    // ── Run extraction ───────────────────────────────────────────────────
    let output = match extract_input(&cli.input, &config).await {
        Ok(o) => o,
        Err(e) => {
            if e.is_retryable() && !cli.quiet {
                eprintln!("{} {}", cyan("⚠"), dim("The service may recover; try again shortly."));
            }
            return Err(anyhow::Error::new(e).context("Extraction failed"));
        }
    };

    if !cli.quiet {
        for notice in &output.notices {
            eprintln!("{} {}", cyan("ℹ"), notice);
        }
    }

    let target = match (&cli.output, cli.save) {
        (Some(path), _) if path.is_dir() => Some(path.join(format.default_file_name())),
        (Some(path), _) => Some(path.clone()),
        (None, true) => Some(
            sibling_output(&cli.input, format.extension())
                .unwrap_or_else(|| PathBuf::from(format.default_file_name())),
        ),
        (None, false) => None,
    };

    if let Some(path) = target {
        let body = if cli.json {
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        } else {
            output.markdown.clone()
        };
        write_output(&path, &body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        if !cli.quiet {
            eprintln!(
                "{}  {} chars  {}ms  →  {}",
                green("✔"),
                output.stats.char_count,
                output.stats.total_duration_ms,
                bold(&path.display().to_string()),
            );
        }
    } else if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.markdown.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.markdown.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        let unstable = output.tables.iter().filter(|t| !t.report.stable).count();
        eprintln!("{}", summary_line(&output.stats, unstable));
    }

    Ok(())
}

/// One-line run summary for stderr.
fn summary_line(s: &ExtractionStats, unstable: usize) -> String {
    if s.table_mode {
        format!(
            "   {} tables ({} unstable), detect {}ms / ocr {}ms",
            s.table_count,
            if unstable == 0 {
                dim("0")
            } else {
                red(&unstable.to_string())
            },
            s.detect_duration_ms,
            s.ocr_duration_ms,
        )
    } else {
        format!(
            "   {} page(s) via {} in {}ms",
            s.page_count,
            dim(&s.mode.to_string()),
            s.total_duration_ms,
        )
    }
}

/// Map CLI args to `OcrConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<OcrConfig> {
    let mode = if cli.pixtral {
        OcrMode::Prompt
    } else {
        match cli.mode {
            ModeArg::Structured => OcrMode::Structured,
            ModeArg::Prompt => OcrMode::Prompt,
        }
    };

    let separator = match cli.separator.as_str() {
        "none" => PageSeparator::None,
        "hr" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        custom => PageSeparator::Custom(custom.to_string()),
    };

    let mut builder = OcrConfig::builder()
        .mode(mode)
        .detect_tables(cli.tables)
        .padding(cli.padding)
        .upscale_factor(cli.upscale)
        .concurrency(cli.concurrency)
        .inline_images(cli.inline_images)
        .page_separator(separator)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref base) = cli.api_base {
        builder = builder.api_base(base.clone());
    }
    if let Some(ref m) = cli.ocr_model {
        builder = builder.ocr_model(m.clone());
    }
    if let Some(ref m) = cli.chat_model {
        builder = builder.chat_model(m.clone());
    }
    if let Some(ref p) = cli.provider {
        builder = builder.chat_provider_name(p.clone());
    }
    if let Some(ref py) = cli.python {
        builder = builder.python(py.clone());
    }
    if let Some(ref path) = cli.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt(prompt);
    }
    if let TablePromptArg::Markdown = cli.table_prompt {
        builder = builder.table_prompt(TABLE_MARKDOWN_PROMPT);
    }
    if cli.lenient {
        builder = builder.validation(ValidationPolicy::lenient());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
