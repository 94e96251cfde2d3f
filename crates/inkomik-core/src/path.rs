//! Structural path values used by the navigator.
//!
//! A [`FilePath`] is an ordered list of components plus a file/directory flag
//! on the last one. Components never contain separators and `.` components
//! are dropped while parsing. [`PathToFile`] pairs a filesystem path with an
//! optional archive-internal path, addressing a position in the dual-level
//! address space.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A parsed path: components plus a file/directory flag for the last entry.
///
/// Equality and ordering compare components only; the file flag matters for
/// [`FilePath::is_directory`] and the level arithmetic but not for identity,
/// which mirrors how the navigator matches entries coming from different
/// sources (directory listings vs. archive listings).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilePath {
    entries: Vec<String>,
    is_file: bool,
    first_level: usize,
}

impl FilePath {
    pub fn new(path: &str, is_file: bool) -> Self {
        let mut result = Self::default();
        result.set(path, is_file);
        result
    }

    pub fn set(&mut self, path: &str, is_file: bool) {
        self.entries = path
            .split(['/', '\\'])
            .filter(|part| !part.is_empty() && *part != ".")
            .map(str::to_owned)
            .collect();
        self.is_file = is_file && !self.entries.is_empty();
        self.first_level = 0;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.is_file = false;
        self.first_level = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of components, offset by the configured first level.
    pub fn level(&self) -> usize {
        self.entries.len().saturating_sub(self.first_level)
    }

    /// Level of the containing directory: one less than [`level`](Self::level)
    /// for files, the full level for directories.
    pub fn dir_level(&self) -> usize {
        self.level().saturating_sub(if self.is_directory() { 0 } else { 1 })
    }

    /// Sets the level treated as the first one by level-based accessors,
    /// which normalizes comparisons of paths with different roots.
    pub fn set_first_level(&mut self, first_level: usize) {
        self.first_level = first_level;
    }

    pub fn is_directory(&self) -> bool {
        !self.is_file
    }

    /// Whether the entry at `level` names a directory. Every non-last
    /// component is a directory by construction.
    pub fn is_directory_at(&self, level: usize) -> bool {
        let corrected = self.first_level + level;
        if corrected + 1 == self.entries.len() {
            !self.is_file
        } else {
            true
        }
    }

    /// Component at `level`, or `""` when out of range.
    pub fn name_at(&self, level: usize) -> &str {
        let corrected = self.first_level + level;
        self.entries.get(corrected).map(String::as_str).unwrap_or("")
    }

    pub fn last_entry(&self) -> &str {
        self.entries.last().map(String::as_str).unwrap_or("")
    }

    /// The whole path rendered with `/` separators and a leading `/`.
    pub fn path(&self) -> String {
        if self.entries.is_empty() {
            return "/".to_owned();
        }
        let mut result = String::new();
        for entry in &self.entries {
            result.push('/');
            result.push_str(entry);
        }
        result
    }

    /// File extension without the dot, `""` for directories and files
    /// without one.
    pub fn extension(&self) -> &str {
        if self.is_directory() {
            return "";
        }
        let name = self.last_entry();
        match name.rfind('.') {
            Some(pos) => &name[pos + 1..],
            None => "",
        }
    }

    pub fn file_name(&self) -> &str {
        if self.is_directory() {
            ""
        } else {
            self.last_entry()
        }
    }

    pub fn push_dir(&mut self, name: &str) {
        if !name.is_empty() {
            self.entries.push(name.to_owned());
        }
    }

    pub fn push_file(&mut self, name: &str) {
        self.push_dir(name);
        self.is_file = !self.entries.is_empty();
    }

    /// Removes the last component; the result is always a directory.
    pub fn pop(&mut self) {
        self.entries.pop();
        self.is_file = false;
    }

    /// `.name` entries.
    pub fn is_hidden(&self) -> bool {
        self.last_entry().starts_with('.')
    }

    /// A `..` directory entry.
    pub fn is_back(&self) -> bool {
        self.is_directory() && self.last_entry() == ".."
    }

    /// True when the first components of `self` equal all components of
    /// `other`.
    pub fn starts_with(&self, other: &FilePath) -> bool {
        self.starts_with_at(other, other.entries.len())
    }

    /// True when the first `level` components of both paths are equal.
    pub fn starts_with_at(&self, other: &FilePath, level: usize) -> bool {
        if self.entries.len() < level || other.entries.len() < level {
            return false;
        }
        self.entries[..level] == other.entries[..level]
    }

    /// True when the last `level` components of both paths are equal. Used to
    /// compare positions anchored at different roots (a path inside an
    /// archive against the same relative path outside of it).
    pub fn matches_suffix(&self, other: &FilePath, level: usize) -> bool {
        if self.entries.len() < level || other.entries.len() < level {
            return false;
        }
        self.entries[self.entries.len() - level..] == other.entries[other.entries.len() - level..]
    }

    /// The path truncated to `level + 1` components, flagged as a directory.
    /// Returns a clone (keeping the file flag) when nothing is cut off.
    pub fn prefix(&self, level: usize) -> FilePath {
        if level + 1 >= self.entries.len() {
            return self.clone();
        }
        FilePath {
            entries: self.entries[..=level].to_vec(),
            is_file: false,
            first_level: 0,
        }
    }

    /// The same components viewed as a directory chain. For files this keeps
    /// the last component; the folder-completion walk relies on that for its
    /// level arithmetic.
    pub fn to_directory(&self) -> FilePath {
        let mut result = self.clone();
        result.is_file = false;
        result
    }
}

impl PartialEq for FilePath {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for FilePath {}

impl PartialOrd for FilePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FilePath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entries.cmp(&other.entries)
    }
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            if self.is_directory() { "[D]" } else { "[F]" },
            self.path()
        )
    }
}

/// True when both paths live in the same directory.
pub fn have_same_directory(first: &FilePath, second: &FilePath) -> bool {
    let level = first.dir_level();
    level == second.dir_level() && first.starts_with_at(second, level)
}

/// Longest common component prefix of two paths, empty when they diverge at
/// the first component.
pub fn common_prefix(first: &FilePath, second: &FilePath) -> FilePath {
    let min_level = first.level().min(second.level());
    for level in 0..min_level {
        if first.name_at(level) != second.name_at(level) {
            return if level > 0 {
                first.prefix(level - 1)
            } else {
                FilePath::default()
            };
        }
    }
    if min_level == 0 {
        FilePath::default()
    } else {
        first.prefix(min_level - 1)
    }
}

/// Address of a navigable position: a filesystem path plus, when the
/// position is inside an opened archive, the path within it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathToFile {
    pub file_path: FilePath,
    pub path_in_archive: FilePath,
}

impl PathToFile {
    pub fn new(file_path: FilePath) -> Self {
        Self {
            file_path,
            path_in_archive: FilePath::default(),
        }
    }

    pub fn with_archive(file_path: FilePath, path_in_archive: FilePath) -> Self {
        Self {
            file_path,
            path_in_archive,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.file_path.is_empty() && self.path_in_archive.is_empty()
    }
}

impl fmt::Display for PathToFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_path)?;
        if !self.path_in_archive.is_empty() {
            write!(f, " [{}]", self.path_in_archive)?;
        }
        Ok(())
    }
}
