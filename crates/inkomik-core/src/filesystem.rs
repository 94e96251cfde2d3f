//! Filesystem collaborator used by the navigator.
//!
//! Implementations:
//! - [`OsFileManager`] for the real filesystem
//! - [`MemoryFileManager`](crate::memory_filesystem::MemoryFileManager) for
//!   simulators and tests

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use thiserror::Error;
use walkdir::WalkDir;

use crate::path::FilePath;

/// Entry kinds a listing should include.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKinds {
    Files,
    Directories,
    Both,
}

impl EntryKinds {
    pub fn includes_files(self) -> bool {
        matches!(self, EntryKinds::Files | EntryKinds::Both)
    }

    pub fn includes_directories(self) -> bool {
        matches!(self, EntryKinds::Directories | EntryKinds::Both)
    }
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not a file: {0}")]
    NotAFile(String),
    #[error("file too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte source for archive backends.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

pub trait FileManager {
    /// Lists entries under `root`, without `root` itself. A recursive
    /// listing reports entries at arbitrary nesting and does not guarantee
    /// that intermediate directories appear as entries of their own.
    fn file_list(
        &self,
        root: &FilePath,
        kinds: EntryKinds,
        recursive: bool,
    ) -> Result<Vec<FilePath>, FsError>;

    /// Whole-file read. Files over `max_size` are an error, never truncated.
    fn read_file(&self, path: &FilePath, max_size: usize) -> Result<Vec<u8>, FsError>;

    /// Opens a file for streamed access (archive backends seek in place).
    fn open_file(&self, path: &FilePath) -> Result<Box<dyn ReadSeek>, FsError>;
}

/// [`FileManager`] over the operating system's filesystem.
#[derive(Debug, Default)]
pub struct OsFileManager;

impl OsFileManager {
    pub fn new() -> Self {
        Self
    }
}

impl FileManager for OsFileManager {
    fn file_list(
        &self,
        root: &FilePath,
        kinds: EntryKinds,
        recursive: bool,
    ) -> Result<Vec<FilePath>, FsError> {
        let root_str = root.path();
        let mut walker = WalkDir::new(&root_str).min_depth(1);
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut result = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|err| match err.io_error() {
                Some(_) => FsError::Io(err.into()),
                None => FsError::NotFound(root_str.clone()),
            })?;
            let is_dir = entry.file_type().is_dir();
            if (is_dir && !kinds.includes_directories())
                || (!is_dir && !kinds.includes_files())
            {
                continue;
            }
            result.push(FilePath::new(&entry.path().to_string_lossy(), !is_dir));
        }
        log::debug!("listed {} entries under {}", result.len(), root_str);
        Ok(result)
    }

    fn read_file(&self, path: &FilePath, max_size: usize) -> Result<Vec<u8>, FsError> {
        let os_path = path.path();
        let meta = std::fs::metadata(Path::new(&os_path))?;
        if !meta.is_file() {
            return Err(FsError::NotAFile(os_path));
        }
        if meta.len() > max_size as u64 {
            return Err(FsError::TooLarge {
                size: meta.len(),
                limit: max_size as u64,
            });
        }
        Ok(std::fs::read(Path::new(&os_path))?)
    }

    fn open_file(&self, path: &FilePath) -> Result<Box<dyn ReadSeek>, FsError> {
        let file = File::open(Path::new(&path.path()))?;
        Ok(Box::new(file))
    }
}
