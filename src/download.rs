//! Result handling: name the converted file and save it.
//!
//! The output name is chosen in this order:
//!
//! 1. `Content-Disposition` from the response (`filename*=` beats `filename=`)
//! 2. the converter's [`RenameRule`] applied to the first input name
//! 3. the rule's fixed name, for converters that combine many inputs
//!
//! Saving goes through a [`DownloadSink`]. [`DirectorySink`] writes into a
//! staging file next to the target and renames it into place, so a reader
//! never sees a half-written result. The staging file is removed on every
//! path, including failures.

use crate::error::ConvertError;
use async_trait::async_trait;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Inline message shown after a successful conversion.
pub const SUCCESS_TEXT: &str = "Converted — download started.";

/// Name used when nothing better can be derived.
pub const FALLBACK_NAME: &str = "download.bin";

/// Renames tried before giving up when other writers keep taking the name.
const MAX_NAME_ATTEMPTS: usize = 16;

// ── Rename rules ─────────────────────────────────────────────────────────

/// How a converter names its output when the response does not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenameRule {
    /// Swap the extension: `report.docx` → `report.pdf`.
    ///
    /// When `from` is non-empty only those extensions are swapped; a name
    /// with any other extension (or none) gets `.to` appended instead.
    ReplaceExtension { from: Vec<String>, to: String },
    /// Always use this name, e.g. `images.pdf` for combined uploads.
    Fixed(String),
    /// Keep the input name unchanged.
    Keep,
}

impl RenameRule {
    pub fn replace_extension(from: &[&str], to: &str) -> Self {
        RenameRule::ReplaceExtension {
            from: from
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            to: to.trim_start_matches('.').to_string(),
        }
    }

    pub fn fixed(name: impl Into<String>) -> Self {
        RenameRule::Fixed(name.into())
    }

    /// Derive an output name from the original input names.
    pub fn apply(&self, originals: &[&str]) -> String {
        let first = originals.first().copied().unwrap_or("");
        match self {
            RenameRule::Fixed(name) => name.clone(),
            RenameRule::Keep => first.to_string(),
            RenameRule::ReplaceExtension { from, to } => {
                if first.is_empty() {
                    return format!("converted.{to}");
                }
                match first.rsplit_once('.') {
                    Some((stem, ext))
                        if !stem.is_empty()
                            && (from.is_empty()
                                || from.iter().any(|f| f.eq_ignore_ascii_case(ext))) =>
                    {
                        format!("{stem}.{to}")
                    }
                    _ => format!("{first}.{to}"),
                }
            }
        }
    }
}

// ── Content-Disposition ──────────────────────────────────────────────────

static EXT_FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|;)\s*filename\*\s*=\s*"?([A-Za-z0-9_-]*)'[^']*'([^;"]+)"?"#)
        .unwrap()
});

static QUOTED_FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|;)\s*filename\s*=\s*"((?:[^"\\]|\\.)*)""#).unwrap()
});

static BARE_FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:^|;)\s*filename\s*=\s*([^;"\s][^;]*)"#).unwrap()
});

/// Extract the filename from a `Content-Disposition` header value.
///
/// Handles RFC 5987 `filename*=UTF-8''caf%C3%A9.pdf`, quoted
/// `filename="result.pdf"` and bare `filename=result.pdf`. The returned
/// name is sanitised (see [`sanitize_filename`]).
pub fn parse_content_disposition(header: &str) -> Option<String> {
    if let Some(caps) = EXT_FILENAME_RE.captures(header) {
        let charset = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let raw = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        let bytes = urlencoding::decode_binary(raw.as_bytes());
        let decoded = if charset.eq_ignore_ascii_case("iso-8859-1") {
            bytes.iter().map(|&b| b as char).collect::<String>()
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };
        if let Some(name) = sanitize_filename(&decoded) {
            return Some(name);
        }
    }

    if let Some(caps) = QUOTED_FILENAME_RE.captures(header) {
        let raw = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let unescaped = unescape_quoted(raw);
        if let Some(name) = sanitize_filename(&unescaped) {
            return Some(name);
        }
    }

    BARE_FILENAME_RE
        .captures(header)
        .and_then(|caps| caps.get(1))
        .and_then(|m| sanitize_filename(m.as_str().trim()))
}

fn unescape_quoted(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Reduce a server- or rule-supplied name to a safe single path component.
///
/// Directory parts are dropped, control characters removed, and `.`/`..`
/// rejected. Returns `None` when nothing usable is left.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return None;
    }
    Some(cleaned.to_string())
}

/// Pick the output filename for a successful response.
pub fn resolve_output_name(
    content_disposition: Option<&str>,
    rule: &RenameRule,
    originals: &[&str],
) -> String {
    if let Some(name) = content_disposition.and_then(parse_content_disposition) {
        debug!("Output name from Content-Disposition: {}", name);
        return name;
    }
    sanitize_filename(&rule.apply(originals)).unwrap_or_else(|| FALLBACK_NAME.to_string())
}

// ── Sinks ────────────────────────────────────────────────────────────────

/// Where a saved result ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedFile {
    pub path: PathBuf,
    /// `file://` URL of [`path`](Self::path), for display only.
    pub url: String,
    pub bytes: u64,
}

/// Destination for converted files. One call to [`save`](Self::save) is one
/// download.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn save(&self, filename: &str, body: Bytes) -> Result<SavedFile, ConvertError>;
}

/// Saves results into a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    overwrite: bool,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            overwrite: false,
        }
    }

    /// Replace existing files instead of picking `name (1).ext`.
    pub fn overwrite(mut self, on: bool) -> Self {
        self.overwrite = on;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DownloadSink for DirectorySink {
    async fn save(&self, filename: &str, body: Bytes) -> Result<SavedFile, ConvertError> {
        let dir = self.dir.clone();
        let overwrite = self.overwrite;
        let filename = filename.to_string();
        tokio::task::spawn_blocking(move || write_atomically(&dir, &filename, &body, overwrite))
            .await
            .map_err(|e| ConvertError::Internal(format!("save task failed: {e}")))?
    }
}

fn write_atomically(
    dir: &Path,
    filename: &str,
    body: &[u8],
    overwrite: bool,
) -> Result<SavedFile, ConvertError> {
    let write_err = |path: &Path, source: std::io::Error| ConvertError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(|e| write_err(dir, e))?;

    // Dropping the staging file deletes it, so every early return cleans up.
    let mut staging = tempfile::Builder::new()
        .prefix(".docshuttle-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| write_err(dir, e))?;
    staging
        .write_all(body)
        .and_then(|_| staging.as_file().sync_all())
        .map_err(|e| write_err(staging.path(), e))?;

    let target = if overwrite {
        let target = dir.join(filename);
        staging
            .persist(&target)
            .map_err(|e| write_err(&target, e.error))?;
        target
    } else {
        let first = next_free_path(dir, filename);
        persist_unique(staging, dir, filename, first)?
    };

    let url = std::fs::canonicalize(&target)
        .ok()
        .and_then(|abs| reqwest::Url::from_file_path(abs).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| target.display().to_string());

    info!("Saved {} ({} bytes)", target.display(), body.len());
    Ok(SavedFile {
        path: target,
        url,
        bytes: body.len() as u64,
    })
}

/// Move `staging` to `target` without replacing anything. If another writer
/// takes `target` first, the next free ` (n)` name is tried.
fn persist_unique(
    mut staging: NamedTempFile,
    dir: &Path,
    filename: &str,
    mut target: PathBuf,
) -> Result<PathBuf, ConvertError> {
    for _ in 0..MAX_NAME_ATTEMPTS {
        match staging.persist_noclobber(&target) {
            Ok(_) => return Ok(target),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                debug!("{} was taken while saving", target.display());
                staging = e.file;
                target = next_free_path(dir, filename);
            }
            Err(e) => {
                return Err(ConvertError::OutputWriteFailed {
                    path: target,
                    source: e.error,
                })
            }
        }
    }
    Err(ConvertError::OutputWriteFailed {
        path: target,
        source: io::Error::new(io::ErrorKind::AlreadyExists, "no free output name"),
    })
}

/// `dir/name`, or `dir/stem (n).ext` for the first free `n`.
fn next_free_path(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s, Some(e)),
        _ => (filename, None),
    };
    (1..)
        .map(|n| match ext {
            Some(e) => dir.join(format!("{stem} ({n}).{e}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

// ── Status messages ──────────────────────────────────────────────────────

/// Outcome category of a [`StatusMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Success,
    Error,
}

/// The one-line message shown to the user after a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    pub kind: MessageKind,
    pub text: String,
}

impl StatusMessage {
    pub fn success() -> Self {
        Self {
            kind: MessageKind::Success,
            text: SUCCESS_TEXT.to_string(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }
}
