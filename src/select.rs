//! File selection: turn user-supplied paths into a validated [`FileSelection`].
//!
//! Validation happens here, before any network call. A rejected file never
//! reaches the upload stage and never disturbs what was already selected.
//!
//! ## Type check
//!
//! The file extension is the primary signal: a name whose extension is on
//! the [`AcceptList`] passes outright. Only when the extension is missing or
//! unlisted is the MIME type consulted (caller-declared, or guessed from the
//! name), and it must match one of the list's MIME patterns.

use crate::config::ConverterSpec;
use crate::error::SelectionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions and MIME patterns a converter accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptList {
    /// Lower-case extensions without the leading dot.
    extensions: Vec<String>,
    /// Lower-case MIME types; `type/*` matches a whole family.
    mime_patterns: Vec<String>,
}

impl AcceptList {
    /// Accept the given extensions (`"pdf"` and `".pdf"` are equivalent).
    pub fn extensions(exts: &[&str]) -> Self {
        Self {
            extensions: exts.iter().map(|e| normalise_ext(e)).collect(),
            mime_patterns: Vec::new(),
        }
    }

    /// Add MIME patterns consulted when the extension is not listed.
    pub fn with_mime(mut self, patterns: &[&str]) -> Self {
        self.mime_patterns
            .extend(patterns.iter().map(|p| p.trim().to_ascii_lowercase()));
        self
    }

    /// Parse an HTML-style `accept` string, e.g.
    /// `".doc,.docx,application/msword,image/*"`.
    pub fn parse(accept: &str) -> Self {
        let mut list = Self::default();
        for token in accept.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if token.contains('/') {
                list.mime_patterns.push(token.to_ascii_lowercase());
            } else {
                list.extensions.push(normalise_ext(token));
            }
        }
        list
    }

    /// `true` when no restriction is configured.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.mime_patterns.is_empty()
    }

    /// Check a file name, with an optional declared MIME type.
    pub fn matches(&self, name: &str, declared_mime: Option<&str>) -> bool {
        if self.is_empty() {
            return true;
        }
        if let Some(ext) = extension_of(name) {
            if self.extensions.iter().any(|e| *e == ext) {
                return true;
            }
        }
        if self.mime_patterns.is_empty() {
            return false;
        }
        let mime = match declared_mime.or_else(|| mime_guess::from_path(name).first_raw()) {
            Some(m) => m,
            None => return false,
        };
        self.mime_patterns.iter().any(|p| mime_matches(p, mime))
    }

    /// Short human description, e.g. `.doc or .docx`.
    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self.extensions.iter().map(|e| format!(".{e}")).collect();
        if parts.is_empty() {
            parts = self.mime_patterns.clone();
        }
        match parts.len() {
            0 => "any file".to_string(),
            1 => parts.remove(0),
            _ => {
                let last = parts.pop().unwrap_or_default();
                format!("{} or {}", parts.join(", "), last)
            }
        }
    }
}

fn normalise_ext(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn mime_matches(pattern: &str, mime: &str) -> bool {
    let mime = mime
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if pattern == "*/*" {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(family) => mime
            .split_once('/')
            .map(|(t, _)| t == family)
            .unwrap_or(false),
        None => pattern == mime,
    }
}

/// One file picked for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedFile {
    pub path: PathBuf,
    /// File name sent in the multipart part.
    pub name: String,
    pub size: u64,
    /// Declared MIME type (guessed from the name unless set explicitly).
    pub mime: String,
}

impl SelectedFile {
    /// Stat a local path and guess its MIME type.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SelectionError> {
        let path = path.as_ref().to_path_buf();
        let meta = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SelectionError::NotFound { path });
            }
            Err(e) => {
                return Err(SelectionError::Unreadable {
                    path,
                    detail: e.to_string(),
                });
            }
        };
        if !meta.is_file() {
            return Err(SelectionError::Unreadable {
                path,
                detail: "not a regular file".into(),
            });
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self {
            path,
            name,
            size: meta.len(),
            mime,
        })
    }

    /// Override the guessed MIME type.
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }
}

/// The ordered set of files for one submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSelection {
    files: Vec<SelectedFile>,
}

impl FileSelection {
    pub fn files(&self) -> &[SelectedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn first(&self) -> Option<&SelectedFile> {
        self.files.first()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.name.as_str()).collect()
    }
}

impl FromIterator<SelectedFile> for FileSelection {
    fn from_iter<I: IntoIterator<Item = SelectedFile>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// Validates candidates against a converter's rules and keeps the current
/// selection.
#[derive(Debug, Clone)]
pub struct FileSelector {
    accept: AcceptList,
    multiple: bool,
    max_files: usize,
    max_bytes: Option<u64>,
    selection: FileSelection,
}

impl FileSelector {
    pub fn new(accept: AcceptList) -> Self {
        Self {
            accept,
            multiple: false,
            max_files: 1,
            max_bytes: None,
            selection: FileSelection::default(),
        }
    }

    pub fn from_spec(spec: &ConverterSpec) -> Self {
        Self {
            accept: spec.accept.clone(),
            multiple: spec.multiple,
            max_files: if spec.multiple { spec.max_files.max(1) } else { 1 },
            max_bytes: spec.max_bytes,
            selection: FileSelection::default(),
        }
    }

    /// Allow several files, capped at `max_files`.
    pub fn multiple(mut self, max_files: usize) -> Self {
        self.multiple = true;
        self.max_files = max_files.max(1);
        self
    }

    pub fn max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = Some(bytes);
        self
    }

    pub fn selection(&self) -> &FileSelection {
        &self.selection
    }

    /// Hand the selection over for upload, leaving this selector empty.
    pub fn take_selection(&mut self) -> FileSelection {
        std::mem::take(&mut self.selection)
    }

    pub fn reset(&mut self) {
        self.selection = FileSelection::default();
    }

    /// Stat each path and offer it to [`select_files`](Self::select_files).
    pub fn select<I, P>(&mut self, paths: I) -> Vec<SelectionError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut notices = Vec::new();
        let mut candidates = Vec::new();
        for path in paths {
            match SelectedFile::from_path(path) {
                Ok(f) => candidates.push(f),
                Err(e) => notices.push(e),
            }
        }
        notices.extend(self.select_files(candidates));
        notices
    }

    /// Validate candidates and update the selection.
    ///
    /// Single-file mode: the first candidate replaces the selection if it is
    /// valid; if it is invalid the selection is left unchanged. Extra
    /// candidates are ignored with a notice. Multi-file mode:
    /// valid candidates are appended in order; beyond `max_files` the
    /// surplus is dropped with a [`SelectionError::TooManyFiles`] notice.
    pub fn select_files(&mut self, candidates: Vec<SelectedFile>) -> Vec<SelectionError> {
        let mut notices = Vec::new();

        if !self.multiple {
            if candidates.len() > 1 {
                notices.push(SelectionError::TooManyFiles {
                    offered: candidates.len(),
                    max: 1,
                });
            }
            if let Some(file) = candidates.into_iter().next() {
                match self.check(&file) {
                    Ok(()) => self.selection = FileSelection { files: vec![file] },
                    Err(e) => notices.push(e),
                }
            }
            return notices;
        }

        let mut accepted = Vec::new();
        for file in candidates {
            match self.check(&file) {
                Ok(()) => accepted.push(file),
                Err(e) => notices.push(e),
            }
        }

        let offered = self.selection.len() + accepted.len();
        self.selection.files.extend(accepted);
        if offered > self.max_files {
            self.selection.files.truncate(self.max_files);
            notices.push(SelectionError::TooManyFiles {
                offered,
                max: self.max_files,
            });
        }
        debug!(
            "Selection now holds {} file(s), {} notice(s)",
            self.selection.len(),
            notices.len()
        );
        notices
    }

    fn check(&self, file: &SelectedFile) -> Result<(), SelectionError> {
        if !self.accept.matches(&file.name, Some(&file.mime)) {
            return Err(SelectionError::UnsupportedType {
                name: file.name.clone(),
                expected: self.accept.describe(),
            });
        }
        if let Some(max) = self.max_bytes {
            if file.size > max {
                return Err(SelectionError::TooLarge {
                    name: file.name.clone(),
                    size: file.size,
                    max,
                });
            }
        }
        Ok(())
    }
}
