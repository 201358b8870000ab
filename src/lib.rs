//! # docshuttle
//!
//! Send files to a remote document-conversion service and save what comes
//! back.
//!
//! Every converter (PDF → Word, images → PDF, Excel → PDF, …) follows the
//! same cycle: pick files, validate them locally, POST them as one
//! `multipart/form-data` request, then save the binary response under a
//! sensible name and report a one-line status. This crate implements that
//! cycle once and describes each converter as data.
//!
//! ## Pipeline Overview
//!
//! ```text
//! paths
//!  │
//!  ├─ 1. Select    extension / MIME / size / count checks (no network)
//!  ├─ 2. Upload    one POST, `file` or repeated `files` + option fields
//!  ├─ 3. Name      Content-Disposition, else the converter's rename rule
//!  ├─ 4. Save      staged write, then persisted under a free name
//!  └─ 5. Record    recent-conversions list (display only)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docshuttle::{catalog, ClientConfig, Converter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("https://convert.example.com")
//!         .output_dir("converted")
//!         .build()?;
//!     let converter = Converter::new(catalog::lookup("pdf-to-docx")?, &config)?;
//!     let outcome = converter.convert(["report.pdf"]).await?;
//!     eprintln!("{} → {}", outcome.message.text, outcome.saved.path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docshuttle` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docshuttle = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod history;
pub mod progress;
pub mod select;
pub mod upload;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    global, init_global, ClientConfig, ClientConfigBuilder, ConverterSpec, PageSize,
    UploadOptions,
};
pub use download::{DirectorySink, DownloadSink, RenameRule, SavedFile, StatusMessage};
pub use error::{ConvertError, SelectionError};
pub use history::{RecentHistory, RecentRecord};
pub use progress::{NoopProgressCallback, ProgressCallback, UploadProgressCallback};
pub use select::{AcceptList, FileSelection, FileSelector, SelectedFile};
pub use upload::{ReqwestTransport, Transport, UploadOrchestrator};
pub use workflow::{convert_files, convert_sync, ConversionOutcome, Converter, WorkflowState};
