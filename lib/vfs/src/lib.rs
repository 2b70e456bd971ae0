use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;

mod filesystem;
mod node;

pub use filesystem::{FileSystem, Walk};

/// Error type for external users.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum FsError {
    /// The path or one of its ancestors is already occupied by an
    /// entry of the conflicting kind
    #[error("path occupied by a conflicting entry")]
    PathConflict,
    /// The requested file or directory could not be found
    #[error("entity not found")]
    NotFound,
    /// The file system has been released and refuses new work
    #[error("file system released")]
    Closed,
    /// The provided path is relative, carries a prefix, or escapes the root
    #[error("invalid path")]
    InvalidPath,
    /// A lock on the file system state was poisoned
    #[error("lock poisoned")]
    Lock,
}

pub type Result<T> = std::result::Result<T, FsError>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileType {
    pub dir: bool,
    pub file: bool,
}

impl FileType {
    pub fn is_dir(&self) -> bool {
        self.dir
    }

    pub fn is_file(&self) -> bool {
        self.file
    }
}

/// Node metadata, with timestamps in nanoseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    pub ft: FileType,
    pub accessed: u64,
    pub created: u64,
    pub modified: u64,
    pub len: u64,
}

impl Metadata {
    pub fn is_file(&self) -> bool {
        self.ft.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.ft.is_dir()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// An entry of a directory, as returned by [`FileSystem::read_dir`].
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub path: PathBuf,
    pub metadata: Metadata,
}

impl DirEntry {
    pub fn path(&self) -> PathBuf {
        self.path.clone()
    }

    pub fn file_name(&self) -> OsString {
        self.path
            .file_name()
            .unwrap_or_default()
            .to_os_string()
    }

    pub fn file_type(&self) -> FileType {
        self.metadata.ft
    }
}

/// The result of reading a directory: an iterator over its immediate
/// entries.
#[derive(Clone, Debug, Default)]
pub struct ReadDir {
    data: Vec<DirEntry>,
    index: usize,
}

impl ReadDir {
    pub fn new(data: Vec<DirEntry>) -> Self {
        Self { data, index: 0 }
    }
}

impl Iterator for ReadDir {
    type Item = DirEntry;

    fn next(&mut self) -> Option<DirEntry> {
        let entry = self.data.get(self.index)?.clone();
        self.index += 1;

        Some(entry)
    }
}
