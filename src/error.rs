//! Error types for the docshuttle library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`] — **Fatal** for the current submission: nothing was
//!   saved (empty selection, server refused the file, host unreachable,
//!   output directory not writable). Returned as `Err(ConvertError)` from
//!   [`crate::workflow::Converter::convert`] and the top-level helpers.
//!
//! * [`SelectionError`] — **Non-fatal**: one candidate file was turned away
//!   by the client-side checks (wrong type, too large, over the file cap).
//!   The selection itself is left intact, so multi-file flows can report the
//!   rejects and still upload the files that passed.
//!
//! None of these are retried automatically. The caller re-triggers.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Fallback text when the service fails without a readable body.
pub const GENERIC_SERVER_ERROR: &str = "Server failed to convert file.";

/// Text surfaced when the request never produced an HTTP response.
pub const GENERIC_TRANSPORT_ERROR: &str = "Could not reach the conversion service.";

/// Text surfaced for HTTP 429 when the body carries nothing better.
pub const RATE_LIMIT_ERROR: &str = "Daily conversion limit reached";

/// All fatal errors returned by the docshuttle library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Selection errors ──────────────────────────────────────────────────
    /// A candidate file failed client-side validation; no request was made.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// `convert` was called with nothing selected.
    #[error("No file selected.\nPick at least one file to convert.")]
    EmptySelection,

    /// A submission is already in flight on this converter.
    #[error("A conversion is already in progress for '{converter}'")]
    Busy { converter: String },

    // ── Service errors ────────────────────────────────────────────────────
    /// The service answered non-2xx (`status` is `Some`) or could not be
    /// reached at all (`status` is `None`). `message` is shown verbatim.
    #[error("{message}")]
    ConversionFailed {
        status: Option<u16>,
        message: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not stage or persist the downloaded result.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A selected file vanished or became unreadable between selection and upload.
    #[error("Failed to read input file '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The base URL and endpoint path do not form a valid HTTP(S) URL.
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// No converter with this name exists in the catalog.
    #[error("Unknown converter '{name}'\nRun `docshuttle --list` to see the available converters.")]
    UnknownConverter { name: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// HTTP status of a server-side failure, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ConvertError::ConversionFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// `true` for failures that happened before any network call.
    pub fn is_client_side(&self) -> bool {
        matches!(
            self,
            ConvertError::Selection(_) | ConvertError::EmptySelection | ConvertError::Busy { .. }
        )
    }
}

/// A non-fatal rejection of one candidate file.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SelectionError {
    /// Extension and MIME type both fall outside the allow-list.
    #[error("'{name}' is not a supported file. Please upload {expected}.")]
    UnsupportedType { name: String, expected: String },

    /// More files were offered than the converter accepts.
    #[error("Too many files: {offered} selected, only the first {max} will be used.")]
    TooManyFiles { offered: usize, max: usize },

    /// The file is larger than the service will accept.
    #[error("'{name}' is too large ({size} bytes, max {max} bytes).")]
    TooLarge { name: String, size: u64, max: u64 },

    /// The path does not exist.
    #[error("File not found: '{path}'")]
    NotFound { path: PathBuf },

    /// The path exists but cannot be read (permissions, directory, …).
    #[error("Cannot read '{path}': {detail}")]
    Unreadable { path: PathBuf, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_failed_displays_message_verbatim() {
        let e = ConvertError::ConversionFailed {
            status: Some(500),
            message: "bad file".into(),
        };
        assert_eq!(e.to_string(), "bad file");
        assert_eq!(e.status(), Some(500));
    }

    #[test]
    fn transport_failure_has_no_status() {
        let e = ConvertError::ConversionFailed {
            status: None,
            message: GENERIC_TRANSPORT_ERROR.into(),
        };
        assert_eq!(e.status(), None);
        assert!(!e.is_client_side());
    }

    #[test]
    fn selection_error_is_transparent() {
        let inner = SelectionError::UnsupportedType {
            name: "notes.odt".into(),
            expected: ".pdf".into(),
        };
        let e: ConvertError = inner.clone().into();
        assert_eq!(e.to_string(), inner.to_string());
        assert!(e.is_client_side());
    }

    #[test]
    fn too_many_files_display() {
        let e = SelectionError::TooManyFiles {
            offered: 25,
            max: 20,
        };
        let msg = e.to_string();
        assert!(msg.contains("25"), "got: {msg}");
        assert!(msg.contains("20"), "got: {msg}");
    }

    #[test]
    fn busy_names_converter() {
        let e = ConvertError::Busy {
            converter: "pdf-to-docx".into(),
        };
        assert!(e.to_string().contains("pdf-to-docx"));
    }
}
