//! Generic archive access and the format registry.
//!
//! Formats are registered as opener functions keyed by preferred extensions;
//! recognition first tries the extension match, then probes every remaining
//! format, mirroring the decoder registry's two-phase strategy. Archive
//! bytes stream through the file manager's [`ReadSeek`] handle so in-memory
//! filesystems work identically to the OS one.

use std::collections::HashMap;
use std::io::Read;

use thiserror::Error;

use crate::filesystem::{FileManager, ReadSeek};
use crate::path::FilePath;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unrecognized archive format")]
    Unrecognized,
    #[error("entry not found in archive: {0}")]
    EntryNotFound(String),
    #[error("entry too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },
    #[error("archive error: {0}")]
    Format(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// An opened archive: entry listing plus read-by-path.
pub trait ArchiveReader {
    /// All entries as parsed paths; directories are included only when
    /// `files_only` is false.
    fn file_list(&mut self, files_only: bool) -> Vec<FilePath>;

    /// Reads one entry completely. Entries over `max_size` are an error.
    fn read_file(
        &mut self,
        path_in_archive: &FilePath,
        max_size: usize,
    ) -> Result<Vec<u8>, ArchiveError>;
}

type OpenFn = fn(Box<dyn ReadSeek>) -> Result<Box<dyn ArchiveReader>, ArchiveError>;

/// Registry of archive format openers.
pub struct ArchiveRegistry {
    openers: Vec<OpenFn>,
    by_ext: HashMap<String, usize>,
}

impl ArchiveRegistry {
    pub fn new() -> Self {
        Self {
            openers: Vec::new(),
            by_ext: HashMap::new(),
        }
    }

    /// Registry with all built-in formats.
    pub fn with_default_formats() -> Self {
        let mut registry = Self::new();
        registry.register(&["zip", "cbz"], ZipArchive::open);
        registry
    }

    pub fn register(&mut self, extensions: &[&str], open: OpenFn) {
        let index = self.openers.len();
        self.openers.push(open);
        for ext in extensions {
            self.by_ext.insert(ext.to_ascii_lowercase(), index);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.openers.is_empty()
    }

    /// Tries to open `path` as an archive: the extension-matched format
    /// first, then every other registered format. `None` when nothing
    /// accepts the file.
    pub fn recognize(
        &self,
        file_mgr: &dyn FileManager,
        path: &FilePath,
    ) -> Option<Box<dyn ArchiveReader>> {
        if path.is_directory() || self.openers.is_empty() {
            return None;
        }

        let preferred = self
            .by_ext
            .get(&path.extension().to_ascii_lowercase())
            .copied();

        let mut order: Vec<usize> = Vec::with_capacity(self.openers.len());
        if let Some(index) = preferred {
            order.push(index);
        }
        order.extend((0..self.openers.len()).filter(|i| Some(*i) != preferred));

        for index in order {
            let handle = match file_mgr.open_file(path) {
                Ok(handle) => handle,
                Err(err) => {
                    log::debug!("cannot open {}: {err}", path.path());
                    return None;
                }
            };
            match self.openers[index](handle) {
                Ok(reader) => {
                    log::debug!("opened archive {}", path.path());
                    return Some(reader);
                }
                Err(err) => log::debug!("format {index} rejected {}: {err}", path.path()),
            }
        }
        None
    }
}

impl Default for ArchiveRegistry {
    fn default() -> Self {
        Self::with_default_formats()
    }
}

/// Zip-format archive reader.
pub struct ZipArchive {
    inner: zip::ZipArchive<Box<dyn ReadSeek>>,
}

impl ZipArchive {
    pub fn open(handle: Box<dyn ReadSeek>) -> Result<Box<dyn ArchiveReader>, ArchiveError> {
        let inner =
            zip::ZipArchive::new(handle).map_err(|err| ArchiveError::Format(err.to_string()))?;
        Ok(Box::new(ZipArchive { inner }))
    }

    fn entry_name(path_in_archive: &FilePath) -> String {
        let mut name = String::new();
        for level in 0..path_in_archive.level() {
            if !name.is_empty() {
                name.push('/');
            }
            name.push_str(path_in_archive.name_at(level));
        }
        name
    }
}

impl ArchiveReader for ZipArchive {
    fn file_list(&mut self, files_only: bool) -> Vec<FilePath> {
        let mut result = Vec::new();
        for name in self.inner.file_names() {
            let is_dir = name.ends_with('/');
            let path = FilePath::new(name, !is_dir);
            if path.is_empty() || (is_dir && files_only) {
                continue;
            }
            result.push(path);
        }
        result
    }

    fn read_file(
        &mut self,
        path_in_archive: &FilePath,
        max_size: usize,
    ) -> Result<Vec<u8>, ArchiveError> {
        let name = Self::entry_name(path_in_archive);
        let mut entry = self
            .inner
            .by_name(&name)
            .map_err(|_| ArchiveError::EntryNotFound(name.clone()))?;

        if entry.size() > max_size as u64 {
            return Err(ArchiveError::TooLarge {
                size: entry.size(),
                limit: max_size as u64,
            });
        }

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(data)
    }
}
