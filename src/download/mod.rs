//! Download gating and file commit
//!
//! Decides per book whether a fetch is needed, resolves the destination
//! filename, and writes the payload. The existence check and the write are
//! not atomic; a race between them is an accepted limitation of the
//! single-process, best-effort design.

use crate::item::Book;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Download-specific errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A content-disposition header was present but did not describe an
    /// attachment. Fatal for that one file.
    #[error("content-disposition is not an attachment: {value}")]
    MalformedHeader { value: String },

    /// No filename was derivable from either the URL or the response
    /// headers.
    #[error("no filename could be resolved for book `{book}`")]
    MissingFilename { book: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-run download accounting, reported to the operator at the end.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DownloadReport {
    pub fn absorb(&mut self, other: DownloadReport) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Filters and lands book downloads under one destination root.
#[derive(Debug, Clone)]
pub struct DownloadGate {
    destination: PathBuf,
}

impl DownloadGate {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    /// Destination path for a book: `<root>/<subject.name>/<filename>`.
    pub fn book_path(&self, book: &Book, filename: &str) -> PathBuf {
        self.destination
            .join(book.subject().name().unwrap_or_default())
            .join(filename)
    }

    /// Whether this book needs a fetch: false when the download URL is
    /// absent or the resolved destination file already exists. A book with a
    /// URL but no derivable filename is fetched; its name comes from the
    /// response headers.
    pub fn should_fetch(&self, book: &Book) -> bool {
        if book.download_url().is_none() {
            return false;
        }
        match book.filename() {
            Some(filename) => !self.book_path(book, filename).exists(),
            None => true,
        }
    }

    /// Resolves the destination filename from a content-disposition header
    /// value, falling back to the URL-derived one.
    ///
    /// A present header must describe an `attachment`; anything else is a
    /// [`DownloadError::MalformedHeader`].
    pub fn resolve_filename(
        &self,
        disposition: Option<&str>,
        fallback: Option<&str>,
    ) -> Result<Option<String>, DownloadError> {
        let Some(header) = disposition else {
            return Ok(fallback.map(str::to_string));
        };

        let mut parts = header.split(';');
        let kind = parts.next().unwrap_or_default().trim();
        if !kind.eq_ignore_ascii_case("attachment") {
            return Err(DownloadError::MalformedHeader {
                value: header.to_string(),
            });
        }

        for part in parts {
            if let Some(value) = part.trim().strip_prefix("filename=") {
                let name = value.trim().trim_matches('"').to_string();
                if !name.is_empty() {
                    return Ok(Some(name));
                }
            }
        }
        Ok(fallback.map(str::to_string))
    }

    /// Writes the payload, creating the destination directory as needed.
    ///
    /// Called at most once per file in a run; `should_fetch` already
    /// excluded existing files.
    pub fn commit(&self, path: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }
}
