//! Upload orchestration: one multipart POST per submission.
//!
//! [`UploadOrchestrator::submit`] packs the selection into an
//! [`UploadForm`] (field `file` for single-file converters, repeated `files`
//! for multi-file ones, then the scalar option fields), sends it through a
//! [`Transport`], and turns a non-2xx answer into
//! [`ConvertError::ConversionFailed`] with the most readable message the
//! body offers. There is no retry and no client-side timeout unless the
//! [`ClientConfig`] sets one.
//!
//! A busy flag guards against double submission: a second `submit` while
//! the first is pending fails immediately with [`ConvertError::Busy`].

use crate::config::ClientConfig;
use crate::error::{ConvertError, GENERIC_SERVER_ERROR, GENERIC_TRANSPORT_ERROR, RATE_LIMIT_ERROR};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::select::FileSelection;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Form field for a single uploaded file.
pub const SINGLE_FILE_FIELD: &str = "file";

/// Form field repeated once per file in multi-file uploads.
pub const MULTI_FILE_FIELD: &str = "files";

/// The file field name for a single- or multi-file converter. Multi-file
/// converters use `files` even when only one file is selected.
pub fn file_field(multiple: bool) -> &'static str {
    if multiple {
        MULTI_FILE_FIELD
    } else {
        SINGLE_FILE_FIELD
    }
}

// ── Form model ───────────────────────────────────────────────────────────

/// A file part of the multipart body.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub data: Bytes,
}

/// One part of the multipart body, in send order.
#[derive(Debug, Clone)]
pub enum FormPart {
    File(FilePart),
    Text { name: String, value: String },
}

/// The multipart request body for one submission.
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    parts: Vec<FormPart>,
}

impl UploadForm {
    /// Read every selected file into a `file_field` part and append the
    /// scalar fields after them.
    pub async fn from_selection(
        selection: &FileSelection,
        file_field: &str,
        fields: &[(String, String)],
    ) -> Result<Self, ConvertError> {
        let mut parts = Vec::with_capacity(selection.len() + fields.len());
        for file in selection.files() {
            let data = tokio::fs::read(&file.path)
                .await
                .map_err(|e| ConvertError::InputReadFailed {
                    path: file.path.clone(),
                    source: e,
                })?;
            parts.push(FormPart::File(FilePart {
                field: file_field.to_string(),
                file_name: file.name.clone(),
                mime: file.mime.clone(),
                data: Bytes::from(data),
            }));
        }
        for (name, value) in fields {
            parts.push(FormPart::Text {
                name: name.clone(),
                value: value.clone(),
            });
        }
        Ok(Self { parts })
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    pub fn file_parts(&self) -> impl Iterator<Item = &FilePart> {
        self.parts.iter().filter_map(|p| match p {
            FormPart::File(f) => Some(f),
            FormPart::Text { .. } => None,
        })
    }

    /// Scalar fields as `(name, value)` pairs.
    pub fn text_fields(&self) -> Vec<(&str, &str)> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                FormPart::Text { name, value } => Some((name.as_str(), value.as_str())),
                FormPart::File(_) => None,
            })
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.file_parts().count()
    }

    pub fn total_file_bytes(&self) -> u64 {
        self.file_parts().map(|f| f.data.len() as u64).sum()
    }
}

// ── Transport ────────────────────────────────────────────────────────────

/// What came back from the service.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced an HTTP response.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub timed_out: bool,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self {
            timed_out: e.is_timeout(),
            message: e.to_string(),
        }
    }
}

/// Sends one multipart POST and returns the complete response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        url: &Url,
        form: UploadForm,
        progress: ProgressCallback,
    ) -> Result<RawResponse, TransportError>;
}

/// [`Transport`] backed by `reqwest`, streaming file parts chunk by chunk.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    chunk_size: usize,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ConvertError> {
        let mut builder = reqwest::Client::builder().user_agent(&config.user_agent);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| ConvertError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            chunk_size: config.chunk_size.max(1),
        })
    }

    fn build_form(
        &self,
        form: UploadForm,
        progress: &ProgressCallback,
    ) -> Result<reqwest::multipart::Form, TransportError> {
        let total = form.total_file_bytes();
        let sent = Arc::new(AtomicU64::new(0));
        let mut multipart = reqwest::multipart::Form::new();

        for part in form.parts {
            match part {
                FormPart::Text { name, value } => {
                    multipart = multipart.text(name, value);
                }
                FormPart::File(file) => {
                    let len = file.data.len() as u64;
                    let chunks = split_chunks(&file.data, self.chunk_size);
                    let sent = Arc::clone(&sent);
                    let progress = Arc::clone(progress);
                    let body_stream = stream::iter(chunks).map(move |chunk| {
                        let now = sent.fetch_add(chunk.len() as u64, Ordering::SeqCst)
                            + chunk.len() as u64;
                        progress.on_bytes_sent(now, total);
                        Ok::<Bytes, std::io::Error>(chunk)
                    });
                    let mime = if file.mime.parse::<mime_guess::mime::Mime>().is_ok() {
                        file.mime
                    } else {
                        "application/octet-stream".to_string()
                    };
                    let part = reqwest::multipart::Part::stream_with_length(
                        reqwest::Body::wrap_stream(body_stream),
                        len,
                    )
                    .file_name(file.file_name)
                    .mime_str(&mime)?;
                    multipart = multipart.part(file.field, part);
                }
            }
        }
        Ok(multipart)
    }
}

fn split_chunks(data: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    if data.is_empty() {
        return vec![Bytes::new()];
    }
    (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect()
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(
        &self,
        url: &Url,
        form: UploadForm,
        progress: ProgressCallback,
    ) -> Result<RawResponse, TransportError> {
        let multipart = self.build_form(form, &progress)?;
        let response = self
            .client
            .post(url.clone())
            .multipart(multipart)
            .send()
            .await?;

        let status = response.status().as_u16();
        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        let content_disposition = header(CONTENT_DISPOSITION);
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            content_type,
            content_disposition,
            body,
        })
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────

/// Issues the single POST of a submission and guards against re-entry.
pub struct UploadOrchestrator {
    label: String,
    transport: Arc<dyn Transport>,
    progress: ProgressCallback,
    file_field: &'static str,
    busy: AtomicBool,
}

impl UploadOrchestrator {
    /// `label` names the converter in [`ConvertError::Busy`] and logs.
    pub fn new(label: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            label: label.into(),
            transport,
            progress: Arc::new(NoopProgressCallback),
            file_field: SINGLE_FILE_FIELD,
            busy: AtomicBool::new(false),
        }
    }

    /// Send files under the repeated `files` field instead of `file`.
    pub fn multi_file(mut self, multiple: bool) -> Self {
        self.file_field = file_field(multiple);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &ProgressCallback {
        &self.progress
    }

    /// `true` while a submission is awaiting its response.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Send `selection` plus `fields` to `url`. Returns the response only
    /// when the status is 2xx.
    pub async fn submit(
        &self,
        url: &Url,
        selection: &FileSelection,
        fields: &[(String, String)],
    ) -> Result<RawResponse, ConvertError> {
        if selection.is_empty() {
            return Err(ConvertError::EmptySelection);
        }
        let _guard = BusyGuard::acquire(&self.busy).ok_or_else(|| ConvertError::Busy {
            converter: self.label.clone(),
        })?;

        let form = UploadForm::from_selection(selection, self.file_field, fields).await?;
        let file_count = form.file_count();
        let total_bytes = form.total_file_bytes();
        info!(
            "Uploading {} file(s), {} bytes to {}",
            file_count, total_bytes, url
        );
        debug!("Form fields: {:?}", form.text_fields());
        self.progress.on_upload_start(file_count, total_bytes);

        let response = match self
            .transport
            .post(url, form, Arc::clone(&self.progress))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Upload to {} failed before a response: {}", url, e);
                self.progress.on_failed(GENERIC_TRANSPORT_ERROR);
                return Err(ConvertError::ConversionFailed {
                    status: None,
                    message: GENERIC_TRANSPORT_ERROR.to_string(),
                });
            }
        };

        self.progress.on_response(response.status);
        if !response.is_success() {
            let message = extract_error_message(response.status, &response.body);
            warn!("{} answered HTTP {}: {}", url, response.status, message);
            self.progress.on_failed(&message);
            return Err(ConvertError::ConversionFailed {
                status: Some(response.status),
                message,
            });
        }

        debug!(
            "HTTP {} with {} bytes ({:?})",
            response.status,
            response.body.len(),
            response.content_type
        );
        Ok(response)
    }
}

/// Clears the busy flag when dropped.
pub(crate) struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Error bodies ─────────────────────────────────────────────────────────

/// Pull a human-readable message out of a failed response body.
///
/// JSON bodies are searched for `detail`, then `error` / `message`, then
/// `non_field_errors`, then the first per-field error list in body order.
/// Plain text is used verbatim. HTML error pages and empty bodies fall back
/// to a generic message.
pub fn extract_error_message(status: u16, body: &[u8]) -> String {
    let fallback = || {
        if status == 429 {
            RATE_LIMIT_ERROR.to_string()
        } else {
            GENERIC_SERVER_ERROR.to_string()
        }
    };

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return fallback();
    }

    if let Ok(json) = serde_json::from_str::<Value>(text) {
        return message_from_json(&json).unwrap_or_else(fallback);
    }

    if text.starts_with('<') {
        debug!("Discarding HTML error body ({} bytes)", text.len());
        return fallback();
    }

    text.to_string()
}

fn message_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => items.iter().find_map(message_from_json),
        Value::Object(map) => {
            for key in ["detail", "error", "message", "non_field_errors"] {
                if let Some(msg) = map.get(key).and_then(message_from_json) {
                    return Some(msg);
                }
            }
            map.values().find_map(message_from_json)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::SelectedFile;

    #[test]
    fn detail_field_is_surfaced() {
        assert_eq!(
            extract_error_message(500, br#"{"detail":"bad file"}"#),
            "bad file"
        );
    }

    #[test]
    fn field_errors_are_surfaced() {
        assert_eq!(
            extract_error_message(400, br#"{"file":["Uploaded file must be a PDF."]}"#),
            "Uploaded file must be a PDF."
        );
    }

    #[test]
    fn non_field_errors_beat_field_errors() {
        let body = br#"{"a":["field"],"non_field_errors":["No images provided."]}"#;
        assert_eq!(extract_error_message(400, body), "No images provided.");
    }

    #[test]
    fn first_field_error_in_body_order_wins() {
        let body = br#"{"zoom":["Zoom must be positive."],"angle":["Angle is required."]}"#;
        assert_eq!(extract_error_message(400, body), "Zoom must be positive.");
    }

    #[test]
    fn plain_text_is_verbatim() {
        assert_eq!(
            extract_error_message(502, b"  upstream exploded \n"),
            "upstream exploded"
        );
    }

    #[test]
    fn empty_body_falls_back() {
        assert_eq!(extract_error_message(500, b""), GENERIC_SERVER_ERROR);
        assert_eq!(extract_error_message(429, b""), RATE_LIMIT_ERROR);
    }

    #[test]
    fn html_body_falls_back() {
        assert_eq!(
            extract_error_message(500, b"<!DOCTYPE html><html>Server Error</html>"),
            GENERIC_SERVER_ERROR
        );
    }

    #[test]
    fn json_without_message_falls_back() {
        assert_eq!(extract_error_message(500, b"{}"), GENERIC_SERVER_ERROR);
        assert_eq!(extract_error_message(500, b"42"), GENERIC_SERVER_ERROR);
    }

    #[test]
    fn chunks_cover_the_whole_body() {
        let data = Bytes::from(vec![7u8; 10]);
        let chunks = split_chunks(&data, 4);
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![4, 4, 2]);
        assert_eq!(split_chunks(&Bytes::new(), 4).len(), 1);
    }

    #[test]
    fn field_name_follows_converter_mode() {
        assert_eq!(file_field(false), "file");
        assert_eq!(file_field(true), "files");
    }

    #[test]
    fn busy_guard_is_exclusive_and_released() {
        let flag = AtomicBool::new(false);
        let first = BusyGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(BusyGuard::acquire(&flag).is_none());
        drop(first);
        assert!(BusyGuard::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn form_uses_singular_field_for_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.pdf");
        std::fs::write(&path, b"%PDF").unwrap();
        let selection: FileSelection =
            std::iter::once(SelectedFile::from_path(&path).unwrap()).collect();
        let form = UploadForm::from_selection(
            &selection,
            SINGLE_FILE_FIELD,
            &[("dpi".into(), "150".into())],
        )
        .await
        .unwrap();
        let fields: Vec<_> = form.file_parts().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec![SINGLE_FILE_FIELD]);
        assert_eq!(form.text_fields(), vec![("dpi", "150")]);
        assert_eq!(form.total_file_bytes(), 4);
    }

    #[tokio::test]
    async fn form_repeats_the_given_field_for_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let selection: FileSelection = ["a.png", "b.png", "c.png"]
            .iter()
            .map(|name| {
                let p = dir.path().join(name);
                std::fs::write(&p, b"png").unwrap();
                SelectedFile::from_path(&p).unwrap()
            })
            .collect();
        let form = UploadForm::from_selection(&selection, MULTI_FILE_FIELD, &[])
            .await
            .unwrap();
        assert_eq!(form.file_count(), 3);
        assert!(form.file_parts().all(|f| f.field == MULTI_FILE_FIELD));
        assert_eq!(form.file_parts().next().unwrap().mime, "image/png");
    }

    #[tokio::test]
    async fn vanished_file_is_an_input_error() {
        let selection: FileSelection = std::iter::once(SelectedFile {
            path: "/definitely/not/here.pdf".into(),
            name: "here.pdf".into(),
            size: 1,
            mime: "application/pdf".into(),
        })
        .collect();
        let err = UploadForm::from_selection(&selection, SINGLE_FILE_FIELD, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::InputReadFailed { .. }));
    }
}
