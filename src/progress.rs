//! Progress-callback trait for upload events.
//!
//! Inject an [`Arc<dyn UploadProgressCallback>`] via
//! [`crate::workflow::Converter::with_progress`] to receive real byte-level
//! events while file parts stream to the service, plus one event each for
//! the response and the saved result.
//!
//! Progress is measured on the bytes actually handed to the HTTP body, not
//! simulated on a timer, so a stalled upload shows as a stalled bar.
//!
//! # Example
//!
//! ```rust
//! use docshuttle::UploadProgressCallback;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! struct BytesSeen(AtomicU64);
//!
//! impl UploadProgressCallback for BytesSeen {
//!     fn on_bytes_sent(&self, sent: u64, total: u64) {
//!         self.0.store(sent, Ordering::SeqCst);
//!         eprintln!("{sent}/{total}");
//!     }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the upload pipeline as a submission progresses.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: chunk events
/// fire from inside the HTTP client's body stream.
pub trait UploadProgressCallback: Send + Sync {
    /// Called once before the request is sent.
    ///
    /// # Arguments
    /// * `file_count`  — number of file parts in the form
    /// * `total_bytes` — combined size of those files
    fn on_upload_start(&self, file_count: usize, total_bytes: u64) {
        let _ = (file_count, total_bytes);
    }

    /// Called after each chunk of file data is handed to the transport.
    ///
    /// `sent` is cumulative across all files.
    fn on_bytes_sent(&self, sent: u64, total: u64) {
        let _ = (sent, total);
    }

    /// Called when response headers arrive.
    fn on_response(&self, status: u16) {
        let _ = status;
    }

    /// Called once the converted file has been saved.
    fn on_saved(&self, path: &Path, bytes: u64) {
        let _ = (path, bytes);
    }

    /// Called when the submission ends in an error.
    fn on_failed(&self, message: &str) {
        let _ = message;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl UploadProgressCallback for NoopProgressCallback {}

/// Convenience alias for the shared callback handle.
pub type ProgressCallback = Arc<dyn UploadProgressCallback>;
