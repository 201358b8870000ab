//! CLI binary for docshuttle.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `ClientConfig` plus `UploadOptions`, runs the chosen converter and prints
//! the status line for each result.

use anyhow::{Context, Result};
use clap::Parser;
use docshuttle::{
    catalog, init_global, ClientConfig, ConversionOutcome, ConvertError, Converter, PageSize,
    ProgressCallback, RecentHistory, UploadOptions, UploadProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
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

/// Byte-level upload bar. Shows a spinner while the service converts, since
/// nothing more is known until the response arrives.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::hidden();
        Arc::new(Self { bar })
    }

    fn spinner(&self, prefix: &str, msg: &str) {
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        self.bar.set_style(style);
        self.bar.set_prefix(prefix.to_string());
        self.bar.set_message(msg.to_string());
    }
}

impl UploadProgressCallback for CliProgressCallback {
    fn on_upload_start(&self, file_count: usize, total_bytes: u64) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.reset();
        self.bar.set_length(total_bytes);
        self.bar.set_style(style);
        self.bar.set_prefix("Uploading");
        self.bar.enable_steady_tick(Duration::from_millis(80));
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Sending {file_count} file(s)…"))
        ));
    }

    fn on_bytes_sent(&self, sent: u64, total: u64) {
        self.bar.set_position(sent);
        if sent >= total {
            self.spinner("Converting", "waiting for the service…");
        }
    }

    fn on_response(&self, status: u16) {
        self.bar.set_message(format!("HTTP {status}"));
    }

    fn on_saved(&self, _path: &Path, _bytes: u64) {
        self.bar.finish_and_clear();
    }

    fn on_failed(&self, _message: &str) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Word document from a PDF, saved next to where you run it
  docshuttle pdf-to-docx report.pdf

  # Several PDFs, one request each, into ./out
  docshuttle pdf-to-txt a.pdf b.pdf -o out --no-ocr

  # Up to 20 images merged into one PDF
  docshuttle images-to-pdf scans/*.jpg

  # Excel sheet with the LibreOffice backend on Letter paper
  docshuttle excel-to-pdf budget.xlsx --backend libreoffice --page-size letter

  # Another service instance, JSON result on stdout
  docshuttle --api-url https://convert.example.com --json pdf-to-jpg deck.pdf

  # Inspect what is available / what was converted recently
  docshuttle --list
  docshuttle --history

ENVIRONMENT VARIABLES:
  DOCSHUTTLE_API_URL       Base URL of the conversion service
  DOCSHUTTLE_TIMEOUT       Whole-request timeout in seconds (default: none)
  DOCSHUTTLE_OUTPUT_DIR    Directory converted files are saved into
  DOCSHUTTLE_HISTORY_FILE  Recent-conversions file location
  RUST_LOG                 Override log filtering (e.g. docshuttle=debug)
"#;

/// Upload files to a document-conversion service and save the result.
#[derive(Parser, Debug)]
#[command(
    name = "docshuttle",
    version,
    about = "Upload files to a document-conversion service and save the result",
    long_about = "Send one or more files to a remote conversion service (PDF ↔ Word, Excel, \
PowerPoint, text, images) as a single multipart request and save the converted file it \
returns. Files are checked locally first, so unsupported types never leave the machine.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Converter name, e.g. pdf-to-docx (see --list).
    #[arg(required_unless_present_any = ["list", "history", "clear_history"])]
    converter: Option<String>,

    /// Files to convert.
    #[arg(required_unless_present_any = ["list", "history", "clear_history"])]
    files: Vec<PathBuf>,

    /// Save converted files into this directory.
    #[arg(short, long, env = "DOCSHUTTLE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Base URL of the conversion service.
    #[arg(long, env = "DOCSHUTTLE_API_URL")]
    api_url: Option<String>,

    /// Whole-request timeout in seconds (default: wait indefinitely).
    #[arg(long, env = "DOCSHUTTLE_TIMEOUT",
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Render DPI for PDF → image converters (72–400).
    #[arg(long, env = "DOCSHUTTLE_DPI",
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: Option<u32>,

    /// Force OCR on for PDF → text.
    #[arg(long, conflicts_with = "no_ocr")]
    ocr: bool,

    /// Force OCR off for PDF → text.
    #[arg(long)]
    no_ocr: bool,

    /// OCR language code(s), e.g. eng or eng+fra.
    #[arg(long, env = "DOCSHUTTLE_LANG")]
    lang: Option<String>,

    /// Page separator for PDF → text.
    #[arg(long)]
    join_pages: Option<String>,

    /// Keep the page layout for PDF → text.
    #[arg(long)]
    preserve_layout: bool,

    /// Rendering backend for Excel → PDF (reportlab, libreoffice).
    #[arg(long, env = "DOCSHUTTLE_BACKEND")]
    backend: Option<String>,

    /// Page size for Excel → PDF: a4 or letter.
    #[arg(long, env = "DOCSHUTTLE_PAGE_SIZE")]
    page_size: Option<String>,

    /// Only the first page for PDF → JPG.
    #[arg(long)]
    first_page_only: bool,

    /// Replace existing files instead of saving as "name (1).ext".
    #[arg(long)]
    overwrite: bool,

    /// Print results as JSON instead of status lines.
    #[arg(long, env = "DOCSHUTTLE_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "DOCSHUTTLE_NO_PROGRESS")]
    no_progress: bool,

    /// Do not record conversions in the recent list.
    #[arg(long, env = "DOCSHUTTLE_NO_HISTORY")]
    no_history: bool,

    /// List the built-in converters and exit.
    #[arg(long)]
    list: bool,

    /// Show recent conversions and exit.
    #[arg(long)]
    history: bool,

    /// Forget recent conversions and exit.
    #[arg(long)]
    clear_history: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCSHUTTLE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCSHUTTLE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
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

    // ── Build config ─────────────────────────────────────────────────────
    let config = init_global(build_config(&cli)?).context("Invalid configuration")?;

    // ── Informational modes ──────────────────────────────────────────────
    if cli.list {
        print_catalog(cli.json)?;
        return Ok(());
    }
    if cli.history || cli.clear_history {
        let Some(ref path) = config.history_path else {
            anyhow::bail!("No history file location (set DOCSHUTTLE_HISTORY_FILE)");
        };
        let history = RecentHistory::open(path);
        if cli.clear_history {
            history.clear().context("Failed to clear history")?;
            if !cli.quiet {
                eprintln!("{} history cleared", green("✔"));
            }
        }
        if cli.history {
            print_history(&history, cli.json)?;
        }
        return Ok(());
    }

    // ── Run conversion ───────────────────────────────────────────────────
    let name = cli
        .converter
        .as_deref()
        .context("Missing converter name")?;
    let spec = catalog::lookup(name)?;
    let options = build_options(&cli)?;

    let mut converter = Converter::new(spec, config)?.with_sink(Arc::new(
        docshuttle::DirectorySink::new(&config.output_dir).overwrite(cli.overwrite),
    ));
    if cli.no_history {
        converter = converter.with_history(None);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        converter = converter.with_progress(cb);
    }

    // Multi-file converters take everything in one request; the others run
    // one request per file, in order.
    let batches: Vec<Vec<PathBuf>> = if converter.spec().multiple {
        vec![cli.files.clone()]
    } else {
        cli.files.iter().map(|f| vec![f.clone()]).collect()
    };

    let mut outcomes: Vec<ConversionOutcome> = Vec::new();
    let mut failures = 0usize;
    for batch in &batches {
        match converter.convert_with(batch, &options).await {
            Ok(outcome) => {
                if !cli.quiet && !cli.json {
                    report_success(&outcome);
                }
                outcomes.push(outcome);
            }
            Err(e) => {
                failures += 1;
                report_failure(batch, &e);
            }
        }
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&outcomes).context("Failed to serialise output")?;
        println!("{json}");
    }

    if failures > 0 {
        anyhow::bail!("{failures} of {} conversion(s) failed", batches.len());
    }
    Ok(())
}

/// Map CLI args to `ClientConfig`, on top of the `DOCSHUTTLE_*` defaults.
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let base = ClientConfig::from_env().context("Invalid DOCSHUTTLE_* environment")?;
    let mut builder = ClientConfig::builder()
        .base_url(cli.api_url.clone().unwrap_or(base.base_url))
        .output_dir(cli.output_dir.clone().unwrap_or(base.output_dir))
        .history_path(base.history_path);
    if let Some(secs) = cli.timeout.or(base.timeout_secs) {
        builder = builder.timeout_secs(secs);
    }
    builder.build().context("Invalid configuration")
}

/// Map CLI option flags to `UploadOptions`. Flags a converter does not take
/// are dropped by the converter itself.
fn build_options(cli: &Cli) -> Result<UploadOptions> {
    let mut options = UploadOptions::default();
    if let Some(ref backend) = cli.backend {
        options = options.backend(backend);
    }
    if let Some(ref raw) = cli.page_size {
        let size: PageSize = raw.parse().context("Invalid --page-size")?;
        options = options.page_size(size);
    }
    if let Some(dpi) = cli.dpi {
        options = options.dpi(dpi);
    }
    if cli.ocr {
        options = options.ocr(true);
    } else if cli.no_ocr {
        options = options.ocr(false);
    }
    if let Some(ref lang) = cli.lang {
        options = options.lang(lang);
    }
    if let Some(ref sep) = cli.join_pages {
        options = options.join_pages(sep);
    }
    if cli.preserve_layout {
        options = options.preserve_layout(true);
    }
    if cli.first_page_only {
        options = options.first_page_only(true);
    }
    Ok(options)
}

fn report_success(outcome: &ConversionOutcome) {
    for notice in &outcome.notices {
        eprintln!("  {} {}", cyan("⚠"), notice);
    }
    eprintln!(
        "{}  {}  {}ms  →  {}",
        green("✔"),
        outcome.message.text,
        outcome.duration_ms,
        bold(&outcome.saved.path.display().to_string()),
    );
    eprintln!(
        "   {} from {}",
        dim(&format!("{} bytes", outcome.saved.bytes)),
        dim(&outcome.inputs.join(", ")),
    );
}

fn report_failure(batch: &[PathBuf], err: &ConvertError) {
    let inputs: Vec<String> = batch.iter().map(|p| p.display().to_string()).collect();
    let status = err
        .status()
        .map(|s| dim(&format!(" (HTTP {s})")))
        .unwrap_or_default();
    eprintln!(
        "{}  {}{}  {}",
        red("✘"),
        red(&err.to_string()),
        status,
        dim(&inputs.join(", ")),
    );
}

fn print_catalog(json: bool) -> Result<()> {
    let specs = catalog::all();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&specs).context("Failed to serialise catalog")?
        );
        return Ok(());
    }
    for spec in specs {
        let files = if spec.multiple {
            format!("up to {} files", spec.max_files)
        } else {
            "1 file".to_string()
        };
        println!(
            "{:<14} {:<18} {}  {}",
            bold(&spec.name),
            spec.title,
            spec.accept.describe(),
            dim(&files),
        );
    }
    Ok(())
}

fn print_history(history: &RecentHistory, json: bool) -> Result<()> {
    let records = history.list();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialise history")?
        );
        return Ok(());
    }
    if records.is_empty() {
        println!("{}", dim("No recent conversions."));
        return Ok(());
    }
    for r in records {
        println!(
            "{}  {:<14} {}  {}",
            dim(&r.timestamp.format("%Y-%m-%d %H:%M").to_string()),
            r.converter,
            bold(&r.file_name),
            dim(r.download_url.as_deref().unwrap_or("")),
        );
    }
    Ok(())
}
