//! Recent conversions, kept in a small local JSON file.
//!
//! The list is display-only: newest first, at most [`MAX_RECENT`] entries.
//! A `download_url` points at wherever the result was saved when it was
//! recorded; the file may since have moved or been deleted. A missing or
//! unreadable history file reads as an empty list.

use crate::error::ConvertError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Cap on stored entries.
pub const MAX_RECENT: usize = 20;

/// One finished conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentRecord {
    pub file_name: String,
    pub converter: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl RecentRecord {
    pub fn new(file_name: impl Into<String>, converter: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            converter: converter.into(),
            timestamp: Utc::now(),
            download_url: None,
        }
    }

    pub fn download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }
}

/// `<data dir>/docshuttle/recent.json`, when the platform has a data dir.
pub fn default_history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("docshuttle").join("recent.json"))
}

/// Handle on a history file.
#[derive(Debug, Clone)]
pub struct RecentHistory {
    path: PathBuf,
    cap: usize,
}

impl RecentHistory {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cap: MAX_RECENT,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored records, newest first.
    pub fn list(&self) -> Vec<RecentRecord> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Cannot read history {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };
        serde_json::from_slice(&raw).unwrap_or_else(|e| {
            warn!("Ignoring corrupt history {}: {}", self.path.display(), e);
            Vec::new()
        })
    }

    /// Prepend `record`, dropping anything past the cap.
    pub fn push(&self, record: RecentRecord) -> Result<(), ConvertError> {
        let mut records = self.list();
        records.insert(0, record);
        records.truncate(self.cap);
        self.write(&records)?;
        debug!("History now holds {} record(s)", records.len());
        Ok(())
    }

    /// Remove every record.
    pub fn clear(&self) -> Result<(), ConvertError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConvertError::OutputWriteFailed {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    fn write(&self, records: &[RecentRecord]) -> Result<(), ConvertError> {
        let write_err = |source| ConvertError::OutputWriteFailed {
            path: self.path.clone(),
            source,
        };
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(write_err)?;
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| ConvertError::Internal(format!("history encode: {e}")))?;

        // Readers see the old list or the new one, never a partial file.
        let mut staging = tempfile::Builder::new()
            .prefix(".recent-")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(write_err)?;
        staging.write_all(&json).map_err(write_err)?;
        staging
            .persist(&self.path)
            .map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> (tempfile::TempDir, RecentHistory) {
        let dir = tempfile::tempdir().unwrap();
        let h = RecentHistory::open(dir.path().join("nested").join("recent.json"));
        (dir, h)
    }

    #[test]
    fn missing_file_is_empty() {
        let (_dir, h) = history();
        assert!(h.list().is_empty());
    }

    #[test]
    fn newest_first() {
        let (_dir, h) = history();
        h.push(RecentRecord::new("a.pdf", "pdf-to-docx")).unwrap();
        h.push(RecentRecord::new("b.pdf", "pdf-to-docx")).unwrap();
        let names: Vec<_> = h.list().into_iter().map(|r| r.file_name).collect();
        assert_eq!(names, vec!["b.pdf", "a.pdf"]);
    }

    #[test]
    fn capped_at_twenty() {
        let (_dir, h) = history();
        for i in 0..25 {
            h.push(RecentRecord::new(format!("f{i}.pdf"), "pdf-to-txt"))
                .unwrap();
        }
        let list = h.list();
        assert_eq!(list.len(), MAX_RECENT);
        assert_eq!(list[0].file_name, "f24.pdf");
        assert_eq!(list[MAX_RECENT - 1].file_name, "f5.pdf");
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_replaced() {
        let (_dir, h) = history();
        std::fs::create_dir_all(h.path().parent().unwrap()).unwrap();
        std::fs::write(h.path(), b"not json").unwrap();
        assert!(h.list().is_empty());
        h.push(RecentRecord::new("a.pdf", "pdf-to-jpg")).unwrap();
        assert_eq!(h.list().len(), 1);
    }

    #[test]
    fn push_leaves_only_the_history_file() {
        let (_dir, h) = history();
        h.push(RecentRecord::new("a.pdf", "pdf-to-jpg")).unwrap();
        h.push(RecentRecord::new("b.pdf", "pdf-to-jpg")).unwrap();
        let names: Vec<String> = std::fs::read_dir(h.path().parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["recent.json"]);
    }

    #[test]
    fn failed_write_keeps_previous_list() {
        let (dir, h) = history();
        h.push(RecentRecord::new("a.pdf", "pdf-to-jpg")).unwrap();
        // A directory where the history file should be cannot be replaced.
        let blocked = RecentHistory::open(dir.path());
        assert!(blocked.push(RecentRecord::new("b.pdf", "pdf-to-jpg")).is_err());
        assert_eq!(h.list().len(), 1);
    }

    #[test]
    fn clear_removes_everything() {
        let (_dir, h) = history();
        h.push(RecentRecord::new("a.pdf", "pdf-to-jpg")).unwrap();
        h.clear().unwrap();
        assert!(h.list().is_empty());
        h.clear().unwrap();
    }

    #[test]
    fn serialises_camel_case() {
        let r = RecentRecord::new("a.pdf", "pdf-to-docx").download_url("file:///tmp/a.docx");
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"fileName\""));
        assert!(json.contains("\"downloadUrl\""));
    }
}
