//! In-memory file manager for simulators and tests.
//!
//! Only explicitly added entries are reported by listings: like a real
//! recursive directory walk filtered to files, a deeply nested file does not
//! imply entries for its intermediate directories. The navigator's
//! folder-completion pass is responsible for synthesizing those.

use std::collections::BTreeMap;
use std::io::Cursor;

use crate::filesystem::{EntryKinds, FileManager, FsError, ReadSeek};
use crate::path::FilePath;

#[derive(Clone)]
enum Node {
    File(Vec<u8>),
    Directory,
}

#[derive(Default)]
pub struct MemoryFileManager {
    entries: BTreeMap<String, Node>,
}

impl MemoryFileManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, path: &str, content: impl Into<Vec<u8>>) {
        let key = FilePath::new(path, true).path();
        self.entries.insert(key, Node::File(content.into()));
    }

    pub fn add_directory(&mut self, path: &str) {
        let key = FilePath::new(path, false).path();
        self.entries.insert(key, Node::Directory);
    }

    fn node(&self, path: &FilePath) -> Option<&Node> {
        self.entries.get(&path.path())
    }
}

impl FileManager for MemoryFileManager {
    fn file_list(
        &self,
        root: &FilePath,
        kinds: EntryKinds,
        recursive: bool,
    ) -> Result<Vec<FilePath>, FsError> {
        let mut result = Vec::new();
        for (key, node) in &self.entries {
            let is_file = matches!(node, Node::File(_));
            let path = FilePath::new(key, is_file);
            if !path.starts_with(root) || path.level() == root.level() {
                continue;
            }
            if !recursive && path.level() != root.level() + 1 {
                continue;
            }
            if (is_file && !kinds.includes_files())
                || (!is_file && !kinds.includes_directories())
            {
                continue;
            }
            result.push(path);
        }
        Ok(result)
    }

    fn read_file(&self, path: &FilePath, max_size: usize) -> Result<Vec<u8>, FsError> {
        match self.node(path) {
            Some(Node::File(content)) => {
                if content.len() > max_size {
                    Err(FsError::TooLarge {
                        size: content.len() as u64,
                        limit: max_size as u64,
                    })
                } else {
                    Ok(content.clone())
                }
            }
            Some(Node::Directory) => Err(FsError::NotAFile(path.path())),
            None => Err(FsError::NotFound(path.path())),
        }
    }

    fn open_file(&self, path: &FilePath) -> Result<Box<dyn ReadSeek>, FsError> {
        match self.node(path) {
            Some(Node::File(content)) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(Node::Directory) => Err(FsError::NotAFile(path.path())),
            None => Err(FsError::NotFound(path.path())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MemoryFileManager {
        let mut fs = MemoryFileManager::new();
        fs.add_file("/books/vol1/p1.jpg", b"one".to_vec());
        fs.add_file("/books/vol1/p2.jpg", b"two".to_vec());
        fs.add_file("/books/cover.png", b"cover".to_vec());
        fs.add_directory("/books/empty");
        fs
    }

    #[test]
    fn recursive_listing_reports_only_explicit_entries() {
        let fs = sample();
        let root = FilePath::new("/books", false);
        let files = fs
            .file_list(&root, EntryKinds::Files, true)
            .unwrap();
        assert_eq!(files.len(), 3);
        // vol1 never appears: it was not added explicitly.
        assert!(files.iter().all(|p| !p.is_directory()));
    }

    #[test]
    fn non_recursive_listing_stops_at_one_level() {
        let fs = sample();
        let root = FilePath::new("/books", false);
        let all = fs.file_list(&root, EntryKinds::Both, false).unwrap();
        let names: Vec<_> = all.iter().map(|p| p.last_entry().to_owned()).collect();
        assert!(names.contains(&"cover.png".to_owned()));
        assert!(names.contains(&"empty".to_owned()));
        assert!(!names.iter().any(|n| n.starts_with("p1")));
    }

    #[test]
    fn read_respects_size_limit() {
        let fs = sample();
        let path = FilePath::new("/books/cover.png", true);
        assert_eq!(fs.read_file(&path, 1024).unwrap(), b"cover");
        assert!(matches!(
            fs.read_file(&path, 2),
            Err(FsError::TooLarge { .. })
        ));
    }

    #[test]
    fn missing_entries_are_not_found() {
        let fs = sample();
        let path = FilePath::new("/books/none.jpg", true);
        assert!(matches!(fs.read_file(&path, 10), Err(FsError::NotFound(_))));
        assert!(fs.open_file(&path).is_err());
    }
}
