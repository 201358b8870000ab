//! The upload-submit-download workflow behind every converter.
//!
//! One [`Converter`] is one converter screen: it validates the offered
//! files, issues the single POST, names and saves the result, records it in
//! the recent-conversions history and keeps the last status message.
//!
//! ```text
//! paths ──▶ select ──▶ upload ──▶ download ──▶ history
//!          (validate)  (1 POST)   (name+save)  (display only)
//! ```
//!
//! State moves `Idle → Submitting → Succeeded | Failed`. [`Converter::reset`]
//! returns to `Idle`; starting the next conversion passes through
//! `Submitting` again. Nothing carries over between runs except the status
//! of the most recent one.

use crate::config::{self, ClientConfig, ConverterSpec, UploadOptions};
use crate::download::{resolve_output_name, DirectorySink, DownloadSink, SavedFile, StatusMessage};
use crate::error::{ConvertError, SelectionError};
use crate::history::{RecentHistory, RecentRecord};
use crate::progress::ProgressCallback;
use crate::select::FileSelector;
use crate::upload::{BusyGuard, ReqwestTransport, Transport, UploadOrchestrator};
use reqwest::Url;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

/// Where a [`Converter`] is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    #[default]
    Idle,
    Submitting,
    Succeeded,
    Failed,
}

/// A finished, saved conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutcome {
    /// Converter name, e.g. `pdf-to-docx`.
    pub converter: String,
    /// Names of the files that were uploaded, in order.
    pub inputs: Vec<String>,
    /// Name the result was saved under (before any ` (n)` de-duplication).
    pub output_name: String,
    pub saved: SavedFile,
    /// HTTP status of the response.
    pub status: u16,
    pub content_type: Option<String>,
    /// Files skipped or truncated during selection.
    pub notices: Vec<SelectionError>,
    pub duration_ms: u64,
    pub message: StatusMessage,
}

/// One configured converter. At most one conversion runs on it at a time.
pub struct Converter {
    spec: ConverterSpec,
    endpoint: Url,
    orchestrator: UploadOrchestrator,
    sink: Arc<dyn DownloadSink>,
    history: Option<RecentHistory>,
    busy: AtomicBool,
    state: Mutex<WorkflowState>,
    last_message: Mutex<Option<StatusMessage>>,
}

impl Converter {
    /// Build a converter that talks HTTP and saves into
    /// [`ClientConfig::output_dir`].
    pub fn new(spec: ConverterSpec, config: &ClientConfig) -> Result<Self, ConvertError> {
        let endpoint = config.endpoint_url(&spec.endpoint)?;
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config)?);
        Ok(Self {
            orchestrator: UploadOrchestrator::new(spec.name.clone(), transport)
                .multi_file(spec.multiple),
            endpoint,
            sink: Arc::new(DirectorySink::new(&config.output_dir)),
            history: config.history_path.clone().map(RecentHistory::open),
            spec,
            busy: AtomicBool::new(false),
            state: Mutex::new(WorkflowState::Idle),
            last_message: Mutex::new(None),
        })
    }

    /// Build against the process-wide config installed with
    /// [`config::init_global`].
    pub fn from_global(spec: ConverterSpec) -> Result<Self, ConvertError> {
        let config = config::global().ok_or_else(|| {
            ConvertError::InvalidConfig("client config not initialised; call init_global".into())
        })?;
        Self::new(spec, config)
    }

    /// Swap the HTTP transport (tests, proxies, instrumentation).
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        let progress = Arc::clone(self.orchestrator.progress());
        self.orchestrator = UploadOrchestrator::new(self.spec.name.clone(), transport)
            .multi_file(self.spec.multiple)
            .with_progress(progress);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DownloadSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace (or with `None`, disable) the recent-conversions history.
    pub fn with_history(mut self, history: Option<RecentHistory>) -> Self {
        self.history = history;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.orchestrator = self.orchestrator.with_progress(progress);
        self
    }

    pub fn spec(&self) -> &ConverterSpec {
        &self.spec
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// `true` from the start of a conversion until its result is saved and
    /// recorded, or it fails.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn state(&self) -> WorkflowState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Status of the most recent conversion, if any.
    pub fn last_message(&self) -> Option<StatusMessage> {
        self.last_message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Back to `Idle` with no message.
    pub fn reset(&self) {
        if self.is_busy() {
            return;
        }
        self.set_state(WorkflowState::Idle, None);
    }

    /// Convert `paths` with the converter's default options.
    pub async fn convert<I, P>(&self, paths: I) -> Result<ConversionOutcome, ConvertError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.convert_with(paths, &UploadOptions::default()).await
    }

    /// Convert `paths`, overlaying `options` on the converter's defaults.
    ///
    /// # Errors
    /// * [`ConvertError::Busy`] — another conversion on this converter is pending
    /// * [`ConvertError::Selection`] / [`ConvertError::EmptySelection`] —
    ///   nothing valid to upload; no request was made
    /// * [`ConvertError::ConversionFailed`] — the service refused or was unreachable
    /// * [`ConvertError::OutputWriteFailed`] — the result could not be saved
    pub async fn convert_with<I, P>(
        &self,
        paths: I,
        options: &UploadOptions,
    ) -> Result<ConversionOutcome, ConvertError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let _guard = BusyGuard::acquire(&self.busy).ok_or_else(|| ConvertError::Busy {
            converter: self.spec.name.clone(),
        })?;
        let start = Instant::now();

        // ── Step 1: Select ───────────────────────────────────────────────
        let mut selector = FileSelector::from_spec(&self.spec);
        let notices = selector.select(paths);
        let selection = selector.take_selection();
        // A rejected single file must not fall through to a later one.
        let blocking = notices
            .iter()
            .find(|n| !matches!(n, SelectionError::TooManyFiles { .. }))
            .filter(|_| selection.is_empty() || !self.spec.multiple)
            .or_else(|| notices.first().filter(|_| selection.is_empty()));
        if let Some(notice) = blocking {
            return Err(self.record_failure(ConvertError::Selection(notice.clone())));
        }
        if selection.is_empty() {
            return Err(self.record_failure(ConvertError::EmptySelection));
        }
        for notice in &notices {
            warn!("{}: {}", self.spec.name, notice);
        }
        let inputs: Vec<String> = selection.names().into_iter().map(str::to_string).collect();
        info!("Starting {} for {:?}", self.spec.name, inputs);

        // ── Step 2: Upload ───────────────────────────────────────────────
        self.set_state(WorkflowState::Submitting, None);
        let fields = self.spec.form_fields(options);
        let response = match self
            .orchestrator
            .submit(&self.endpoint, &selection, &fields)
            .await
        {
            Ok(r) => r,
            Err(e @ ConvertError::Busy { .. }) => return Err(e),
            // The orchestrator has already reported these to the callback.
            Err(e @ ConvertError::ConversionFailed { .. }) => return Err(self.record_failure(e)),
            Err(e) => return Err(self.fail(e)),
        };

        // ── Step 3: Name and save ────────────────────────────────────────
        let input_refs: Vec<&str> = inputs.iter().map(String::as_str).collect();
        let output_name = resolve_output_name(
            response.content_disposition.as_deref(),
            &self.spec.rename_rule,
            &input_refs,
        );
        let saved = match self.sink.save(&output_name, response.body).await {
            Ok(s) => s,
            Err(e) => return Err(self.fail(e)),
        };
        self.orchestrator
            .progress()
            .on_saved(&saved.path, saved.bytes);

        // ── Step 4: Record ───────────────────────────────────────────────
        if let Some(ref history) = self.history {
            let record = RecentRecord::new(&output_name, &self.spec.name).download_url(&saved.url);
            if let Err(e) = history.push(record) {
                warn!("Could not record conversion in history: {}", e);
            }
        }

        let message = StatusMessage::success();
        self.set_state(WorkflowState::Succeeded, Some(message.clone()));
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "{} finished in {}ms → {}",
            self.spec.name,
            duration_ms,
            saved.path.display()
        );

        Ok(ConversionOutcome {
            converter: self.spec.name.clone(),
            inputs,
            output_name,
            saved,
            status: response.status,
            content_type: response.content_type,
            notices,
            duration_ms,
            message,
        })
    }

    fn fail(&self, err: ConvertError) -> ConvertError {
        self.orchestrator.progress().on_failed(&err.to_string());
        self.record_failure(err)
    }

    fn record_failure(&self, err: ConvertError) -> ConvertError {
        self.set_state(WorkflowState::Failed, Some(StatusMessage::error(err.to_string())));
        err
    }

    fn set_state(&self, state: WorkflowState, message: Option<StatusMessage>) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        *self.last_message.lock().unwrap_or_else(|e| e.into_inner()) = message;
    }
}

// ── Convenience entry points ─────────────────────────────────────────────

/// Convert files with a built-in converter, using the global config if one
/// was installed and the defaults otherwise.
pub async fn convert_files<I, P>(
    converter: &str,
    paths: I,
    options: &UploadOptions,
) -> Result<ConversionOutcome, ConvertError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let spec = crate::catalog::lookup(converter)?;
    let conv = match config::global() {
        Some(cfg) => Converter::new(spec, cfg)?,
        None => Converter::new(spec, &ClientConfig::default())?,
    };
    conv.convert_with(paths, options).await
}

/// Synchronous wrapper around [`convert_files`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync<I, P>(
    converter: &str,
    paths: I,
    options: &UploadOptions,
) -> Result<ConversionOutcome, ConvertError>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    tokio::runtime::Runtime::new()
        .map_err(|e| ConvertError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_files(converter, paths, options))
}
