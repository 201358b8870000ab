//! Configuration types for conversion uploads.
//!
//! There are two layers:
//!
//! * [`ClientConfig`] — process-wide settings (service base URL, timeout,
//!   output directory, history file). Built once at startup, installed with
//!   [`init_global`] and read everywhere through [`global`]. No converter
//!   carries its own host.
//! * [`ConverterSpec`] — one converter screen collapsed into data:
//!   `{endpoint, accept, rename_rule, fields}`. The built-in set lives in
//!   [`crate::catalog`].
//!
//! [`UploadOptions`] holds the optional scalar form fields a converter sends
//! next to the file parts.

use crate::download::RenameRule;
use crate::error::ConvertError;
use crate::select::AcceptList;
use once_cell::sync::OnceCell;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Default service base URL (the backend's development address).
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Default multi-file cap.
pub const DEFAULT_MAX_FILES: usize = 20;

static GLOBAL: OnceCell<ClientConfig> = OnceCell::new();

/// Process-wide client settings.
///
/// Built via [`ClientConfig::builder()`], [`ClientConfig::from_env()`] or
/// [`ClientConfig::default()`].
///
/// # Example
/// ```rust
/// use docshuttle::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .base_url("https://convert.example.com")
///     .output_dir("out")
///     .build()
///     .unwrap();
/// assert_eq!(config.base_url, "https://convert.example.com");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Scheme + host (+ optional path prefix) of the conversion service.
    /// Default: `http://127.0.0.1:8000`.
    pub base_url: String,

    /// Whole-request timeout in seconds. Default: `None` (wait for the
    /// service however long it takes).
    pub timeout_secs: Option<u64>,

    /// `User-Agent` header sent with every upload.
    pub user_agent: String,

    /// Directory converted files are saved into. Default: current directory.
    pub output_dir: PathBuf,

    /// Where recent conversions are recorded. `None` disables the history.
    pub history_path: Option<PathBuf>,

    /// Size of each streamed upload chunk, in bytes. Default: 64 KiB.
    ///
    /// Every chunk produces one progress event.
    pub chunk_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: None,
            user_agent: format!("docshuttle/{}", env!("CARGO_PKG_VERSION")),
            output_dir: PathBuf::from("."),
            history_path: crate::history::default_history_path(),
            chunk_size: 64 * 1024,
        }
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Build a config from `DOCSHUTTLE_*` environment variables, falling back
    /// to the defaults for anything unset.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `DOCSHUTTLE_API_URL` | `base_url` |
    /// | `DOCSHUTTLE_TIMEOUT` | `timeout_secs` |
    /// | `DOCSHUTTLE_OUTPUT_DIR` | `output_dir` |
    /// | `DOCSHUTTLE_HISTORY_FILE` | `history_path` |
    pub fn from_env() -> Result<Self, ConvertError> {
        let mut builder = Self::builder();
        if let Some(url) = env_var("DOCSHUTTLE_API_URL") {
            builder = builder.base_url(url);
        }
        if let Some(raw) = env_var("DOCSHUTTLE_TIMEOUT") {
            let secs: u64 = raw.parse().map_err(|_| {
                ConvertError::InvalidConfig(format!(
                    "DOCSHUTTLE_TIMEOUT must be a whole number of seconds, got '{raw}'"
                ))
            })?;
            builder = builder.timeout_secs(secs);
        }
        if let Some(dir) = env_var("DOCSHUTTLE_OUTPUT_DIR") {
            builder = builder.output_dir(dir);
        }
        if let Some(path) = env_var("DOCSHUTTLE_HISTORY_FILE") {
            builder = builder.history_path(Some(PathBuf::from(path)));
        }
        builder.build()
    }

    /// Resolve a converter endpoint against [`base_url`](Self::base_url).
    ///
    /// Absolute `http(s)://` endpoints are used unchanged; anything else is
    /// treated as a path under the base URL.
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, ConvertError> {
        let raw = if is_absolute_url(endpoint) {
            endpoint.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            )
        };
        let url = Url::parse(&raw).map_err(|e| ConvertError::InvalidEndpoint {
            endpoint: raw.clone(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConvertError::InvalidEndpoint {
                endpoint: raw,
                reason: format!("unsupported scheme '{other}'"),
            }),
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = Some(secs);
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn history_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.history_path = path;
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.config.chunk_size = bytes.max(1024);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, ConvertError> {
        let c = &self.config;
        if !is_absolute_url(&c.base_url) {
            return Err(ConvertError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        Url::parse(&c.base_url).map_err(|e| {
            ConvertError::InvalidConfig(format!("base URL '{}' is invalid: {e}", c.base_url))
        })?;
        if c.timeout_secs == Some(0) {
            return Err(ConvertError::InvalidConfig(
                "timeout must be at least 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Install the process-wide config. May be called once.
pub fn init_global(config: ClientConfig) -> Result<&'static ClientConfig, ConvertError> {
    debug!("Installing global client config: {}", config.base_url);
    GLOBAL
        .set(config)
        .map_err(|_| ConvertError::InvalidConfig("global client config is already set".into()))?;
    GLOBAL
        .get()
        .ok_or_else(|| ConvertError::Internal("global client config vanished".into()))
}

/// The process-wide config, if [`init_global`] has run.
pub fn global() -> Option<&'static ClientConfig> {
    GLOBAL.get()
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn is_absolute_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

// ── Converter description ────────────────────────────────────────────────

/// Everything that distinguishes one converter from another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterSpec {
    /// Short identifier, e.g. `pdf-to-docx`. Recorded in the history.
    pub name: String,
    /// Human-readable title, e.g. `PDF → Word`.
    pub title: String,
    /// Path (joined onto the base URL) or absolute URL to POST to.
    pub endpoint: String,
    /// Which files the converter accepts.
    pub accept: AcceptList,
    /// How the saved file is named when the response does not say.
    pub rename_rule: RenameRule,
    /// Default scalar fields sent with every upload.
    pub fields: UploadOptions,
    /// Field names this converter understands. Empty means "send all".
    pub accepted_options: Vec<String>,
    /// Multi-file flow (`files` repeated) rather than single (`file`).
    pub multiple: bool,
    /// Cap on files per submission in multi-file flows.
    pub max_files: usize,
    /// Largest single file the service accepts, in bytes.
    pub max_bytes: Option<u64>,
}

impl ConverterSpec {
    /// A single-file converter with no extra fields.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        accept: AcceptList,
        rename_rule: RenameRule,
    ) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            endpoint: endpoint.into(),
            accept,
            rename_rule,
            fields: UploadOptions::default(),
            accepted_options: Vec::new(),
            multiple: false,
            max_files: 1,
            max_bytes: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn fields(mut self, fields: UploadOptions) -> Self {
        self.fields = fields;
        self
    }

    pub fn accepted_options(mut self, names: &[&str]) -> Self {
        self.accepted_options = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Switch to a multi-file flow capped at `max_files`.
    pub fn multiple(mut self, max_files: usize) -> Self {
        self.multiple = true;
        self.max_files = max_files.max(1);
        self
    }

    pub fn max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = Some(bytes);
        self
    }

    /// Effective option fields: converter defaults overlaid with `overrides`,
    /// restricted to [`accepted_options`](Self::accepted_options).
    pub fn form_fields(&self, overrides: &UploadOptions) -> Vec<(String, String)> {
        self.fields
            .merged(overrides)
            .to_fields()
            .into_iter()
            .filter(|(name, _)| {
                let keep = self.accepted_options.is_empty()
                    || self.accepted_options.iter().any(|a| a == name);
                if !keep {
                    debug!("Dropping option '{}' not used by {}", name, self.name);
                }
                keep
            })
            .collect()
    }
}

// ── Scalar form fields ───────────────────────────────────────────────────

/// Optional scalar fields sent alongside the file parts.
///
/// Unset fields are omitted from the request so the service applies its own
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Rendering engine selector, e.g. `reportlab`.
    pub backend: Option<String>,
    /// Output page size for spreadsheet rendering.
    pub page_size: Option<PageSize>,
    /// Rasterisation DPI. Always within 72–400.
    pub dpi: Option<u32>,
    /// Run OCR on scanned pages.
    pub ocr: Option<bool>,
    /// OCR language code, e.g. `eng`.
    pub lang: Option<String>,
    /// Separator inserted between pages of extracted text.
    pub join_pages: Option<String>,
    /// Keep the original text layout when extracting.
    pub preserve_layout: Option<bool>,
    /// Only render the first page.
    pub first_page_only: Option<bool>,
    /// Any additional `name=value` pairs, sent last and in order.
    pub extra: Vec<(String, String)>,
}

impl UploadOptions {
    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Set the DPI, clamped to 72–400.
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi.clamp(72, 400));
        self
    }

    pub fn ocr(mut self, on: bool) -> Self {
        self.ocr = Some(on);
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn join_pages(mut self, sep: impl Into<String>) -> Self {
        self.join_pages = Some(sep.into());
        self
    }

    pub fn preserve_layout(mut self, on: bool) -> Self {
        self.preserve_layout = Some(on);
        self
    }

    pub fn first_page_only(mut self, on: bool) -> Self {
        self.first_page_only = Some(on);
        self
    }

    pub fn extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    /// `self` with every field set in `other` taking precedence.
    pub fn merged(&self, other: &UploadOptions) -> UploadOptions {
        let mut extra = self.extra.clone();
        for (name, value) in &other.extra {
            match extra.iter_mut().find(|(n, _)| n == name) {
                Some(slot) => slot.1 = value.clone(),
                None => extra.push((name.clone(), value.clone())),
            }
        }
        UploadOptions {
            backend: other.backend.clone().or_else(|| self.backend.clone()),
            page_size: other.page_size.or(self.page_size),
            dpi: other.dpi.or(self.dpi),
            ocr: other.ocr.or(self.ocr),
            lang: other.lang.clone().or_else(|| self.lang.clone()),
            join_pages: other.join_pages.clone().or_else(|| self.join_pages.clone()),
            preserve_layout: other.preserve_layout.or(self.preserve_layout),
            first_page_only: other.first_page_only.or(self.first_page_only),
            extra,
        }
    }

    /// Flatten into `(name, value)` form fields in a stable order.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        if let Some(ref b) = self.backend {
            fields.push(("backend".to_string(), b.clone()));
        }
        if let Some(size) = self.page_size {
            fields.push(("page_size".to_string(), size.as_str().to_string()));
        }
        if let Some(dpi) = self.dpi {
            fields.push(("dpi".to_string(), dpi.clamp(72, 400).to_string()));
        }
        if let Some(ocr) = self.ocr {
            fields.push(("ocr".to_string(), ocr.to_string()));
        }
        if let Some(ref lang) = self.lang {
            fields.push(("lang".to_string(), lang.clone()));
        }
        if let Some(ref sep) = self.join_pages {
            fields.push(("join_pages".to_string(), sep.clone()));
        }
        if let Some(v) = self.preserve_layout {
            fields.push(("preserve_layout".to_string(), v.to_string()));
        }
        if let Some(v) = self.first_page_only {
            fields.push(("first_page_only".to_string(), v.to_string()));
        }
        fields.extend(self.extra.iter().cloned());
        fields
    }
}

/// Page size for rendered spreadsheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    Letter,
}

impl PageSize {
    /// Wire value expected by the service.
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSize::A4 => "A4",
            PageSize::Letter => "LETTER",
        }
    }
}

impl std::str::FromStr for PageSize {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A4" => Ok(PageSize::A4),
            "LETTER" => Ok(PageSize::Letter),
            other => Err(ConvertError::InvalidConfig(format!(
                "page size must be A4 or LETTER, got '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_url_is_local_backend() {
        let c = ClientConfig::default();
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
        assert!(c.timeout_secs.is_none());
    }

    #[test]
    fn builder_rejects_relative_base_url() {
        let err = ClientConfig::builder().base_url("localhost:8000").build();
        assert!(matches!(err, Err(ConvertError::InvalidConfig(_))));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = ClientConfig::builder().timeout_secs(0).build();
        assert!(matches!(err, Err(ConvertError::InvalidConfig(_))));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let c = ClientConfig::builder()
            .base_url("http://localhost:8000/")
            .build()
            .unwrap();
        let url = c.endpoint_url("/api/pdf-to-docx/").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/pdf-to-docx/");
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let c = ClientConfig::builder()
            .base_url("https://convert.example.com/v2")
            .build()
            .unwrap();
        let url = c.endpoint_url("api/txt-to-pdf/").unwrap();
        assert_eq!(url.as_str(), "https://convert.example.com/v2/api/txt-to-pdf/");
    }

    #[test]
    fn absolute_endpoint_wins_over_base() {
        let c = ClientConfig::default();
        let url = c.endpoint_url("https://other.example.com/x/").unwrap();
        assert_eq!(url.host_str(), Some("other.example.com"));
    }

    #[test]
    fn dpi_is_clamped() {
        assert_eq!(UploadOptions::default().dpi(10).dpi, Some(72));
        assert_eq!(UploadOptions::default().dpi(9000).dpi, Some(400));
        assert_eq!(UploadOptions::default().dpi(150).dpi, Some(150));
    }

    #[test]
    fn fields_are_stringly_typed_in_order() {
        let fields = UploadOptions::default()
            .ocr(true)
            .dpi(200)
            .lang("eng")
            .to_fields();
        assert_eq!(
            fields,
            vec![
                ("dpi".to_string(), "200".to_string()),
                ("ocr".to_string(), "true".to_string()),
                ("lang".to_string(), "eng".to_string()),
            ]
        );
    }

    #[test]
    fn merge_prefers_overrides() {
        let defaults = UploadOptions::default().ocr(true).lang("eng");
        let overrides = UploadOptions::default().lang("deu");
        let merged = defaults.merged(&overrides);
        assert_eq!(merged.ocr, Some(true));
        assert_eq!(merged.lang.as_deref(), Some("deu"));
    }

    #[test]
    fn form_fields_drop_unsupported_options() {
        let spec = ConverterSpec::new(
            "pdf-to-pptx",
            "/api/pdf-to-pptx/",
            AcceptList::extensions(&["pdf"]),
            RenameRule::replace_extension(&["pdf"], "pptx"),
        )
        .accepted_options(&["dpi"]);
        let fields = spec.form_fields(&UploadOptions::default().dpi(300).ocr(false));
        assert_eq!(fields, vec![("dpi".to_string(), "300".to_string())]);
    }

    #[test]
    fn page_size_parses_case_insensitively() {
        assert_eq!("letter".parse::<PageSize>().unwrap(), PageSize::Letter);
        assert_eq!("a4".parse::<PageSize>().unwrap(), PageSize::A4);
        assert!("A3".parse::<PageSize>().is_err());
    }
}
