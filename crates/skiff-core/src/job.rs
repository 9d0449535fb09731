//! File enumeration for one advertise cycle.

use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One file to serve: its path relative to the published root (what goes on
/// the wire) and its absolute path on this host (what gets opened).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the published directory
    pub relative: PathBuf,
    /// Absolute path on the transmitter
    pub absolute: PathBuf,
}

impl FileEntry {
    /// The relative path as it is sent on the wire.
    ///
    /// # Errors
    ///
    /// Non-UTF-8 paths cannot be represented in the protocol.
    pub fn wire_path(&self) -> io::Result<&str> {
        self.relative
            .to_str()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "non-UTF-8 path"))
    }
}

/// The ordered file list snapshot-captured at advertise time, plus a cursor.
///
/// The walk's enumeration order is whatever [`WalkDir`] yields; the receiver
/// treats it as authoritative, so no sorting is needed. Files created after
/// the snapshot wait for the next advertise cycle.
#[derive(Debug)]
pub struct TransferJob {
    files: Vec<FileEntry>,
    cursor: usize,
}

impl TransferJob {
    /// Walk `published` depth-first and capture the file list.
    ///
    /// Publishing a single file yields a one-entry list whose relative path
    /// is the bare filename; the effective published directory becomes the
    /// file's parent.
    ///
    /// # Errors
    ///
    /// Any walk failure (permission, disappearing entries) surfaces as the
    /// underlying I/O error.
    pub fn snapshot(published: &Path) -> io::Result<Self> {
        let mut files = Vec::new();

        if published.is_file() {
            let name = published
                .file_name()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no filename"))?;
            files.push(FileEntry {
                relative: PathBuf::from(name),
                absolute: published.to_path_buf(),
            });
        } else {
            for entry in WalkDir::new(published) {
                let entry = entry.map_err(io::Error::from)?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(published)
                    .expect("walk stays under its root")
                    .to_path_buf();
                files.push(FileEntry {
                    relative,
                    absolute: entry.path().to_path_buf(),
                });
            }
        }

        Ok(Self { files, cursor: 0 })
    }

    /// The file the cursor points at, if any remain.
    #[must_use]
    pub fn current(&self) -> Option<&FileEntry> {
        self.files.get(self.cursor)
    }

    /// Advance past the current file.
    pub fn advance(&mut self) {
        self.cursor += 1;
    }

    /// Total files in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the snapshot holds no files at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
