//! Ordered navigation across directory and archive boundaries.
//!
//! [`BookExplorer`] holds two parallel sorted file lists: the flat recursive
//! listing of the current root and, while an archive is open, the listing of
//! that archive. A single cursor per list provides next/previous stepping
//! that transparently enters archives whose extension the archive registry
//! recognizes and leaves them again when their entries run out. At most one
//! archive is open at a time.

use std::cmp::Ordering;

use crate::archive::{ArchiveReader, ArchiveRegistry};
use crate::filesystem::{EntryKinds, FileManager};
use crate::path::{common_prefix, have_same_directory, FilePath, PathToFile};

/// Per-file read ceiling; oversized files are unreadable, never truncated.
pub const MAX_FILE_SIZE: usize = 20 * 1024 * 1024;

/// Compares two names level-wise; `None` means equal at this level.
pub trait PathOrder {
    fn compare_names(&self, first: &str, second: &str) -> Option<Ordering>;

    /// Level-by-level path comparison: at the first differing level
    /// directories sort before files and names are compared
    /// case-insensitively via [`compare_names`](Self::compare_names);
    /// shallower paths sort first when one is a prefix of the other.
    fn compare(&self, first: &FilePath, second: &FilePath) -> Ordering {
        for level in 0..first.level().min(second.level()) {
            let first_is_dir = first.is_directory_at(level);
            if first_is_dir != second.is_directory_at(level) {
                return if first_is_dir {
                    Ordering::Less
                } else {
                    Ordering::Greater
                };
            }

            let name1 = first.name_at(level).to_lowercase();
            let name2 = second.name_at(level).to_lowercase();
            if let Some(order) = self.compare_names(&name1, &name2) {
                return order;
            }
        }

        match first.level().cmp(&second.level()) {
            Ordering::Equal => {}
            order => return order,
        }
        match (first.is_directory(), second.is_directory()) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => Ordering::Equal,
        }
    }
}

fn fetch_number(chars: &[char], pos: &mut usize) -> u128 {
    let mut value: u128 = 0;
    while *pos < chars.len() {
        match chars[*pos].to_digit(10) {
            Some(digit) => {
                value = value.saturating_mul(10).saturating_add(digit as u128);
                *pos += 1;
            }
            None => break,
        }
    }
    value
}

/// Natural ordering: names compare as sequences of words and digit runs,
/// digit runs compare numerically, so `file2` sorts before `file10`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WordNumberOrder;

impl PathOrder for WordNumberOrder {
    fn compare_names(&self, first: &str, second: &str) -> Option<Ordering> {
        let a: Vec<char> = first.chars().collect();
        let b: Vec<char> = second.chars().collect();
        let (mut i, mut j) = (0, 0);

        while i < a.len() && j < b.len() {
            let both_digits = a[i].is_ascii_digit() && b[j].is_ascii_digit();
            if both_digits {
                let first_number = fetch_number(&a, &mut i);
                let second_number = fetch_number(&b, &mut j);
                if first_number != second_number {
                    return Some(first_number.cmp(&second_number));
                }
                continue;
            }
            if a[i] != b[j] {
                return Some(a[i].cmp(&b[j]));
            }
            i += 1;
            j += 1;
        }

        if i != a.len() || j != b.len() {
            // One name is a strict prefix of the other.
            return Some((a.len() - i).cmp(&(b.len() - j)));
        }
        None
    }
}

/// Orders only by the sequence of embedded numbers, falling back to plain
/// comparison when no numeric difference exists. Meant for names where the
/// meaningful numbers are scattered with inconsistent padding.
#[derive(Clone, Copy, Debug, Default)]
pub struct NumberOrder;

impl PathOrder for NumberOrder {
    fn compare_names(&self, first: &str, second: &str) -> Option<Ordering> {
        let a: Vec<char> = first.chars().collect();
        let b: Vec<char> = second.chars().collect();
        let mut i = a.iter().position(|c| c.is_ascii_digit());
        let mut j = b.iter().position(|c| c.is_ascii_digit());

        while let (Some(mut pos_a), Some(mut pos_b)) = (i, j) {
            let first_number = fetch_number(&a, &mut pos_a);
            let second_number = fetch_number(&b, &mut pos_b);
            if first_number != second_number {
                return Some(first_number.cmp(&second_number));
            }
            i = a[pos_a..]
                .iter()
                .position(|c| c.is_ascii_digit())
                .map(|p| p + pos_a);
            j = b[pos_b..]
                .iter()
                .position(|c| c.is_ascii_digit())
                .map(|p| p + pos_b);
        }

        if first != second {
            return Some(first.cmp(second));
        }
        None
    }
}

/// Sort order selection for an explorer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    WordNumber,
    Number,
}

impl SortOrder {
    fn order(&self) -> &'static dyn PathOrder {
        match self {
            SortOrder::WordNumber => &WordNumberOrder,
            SortOrder::Number => &NumberOrder,
        }
    }
}

/// Folder completion: a recursive listing reports entries at arbitrary
/// nesting without guaranteeing that intermediate directories are present.
/// This pass sorts the listing and merge-inserts every missing ancestor
/// between consecutive entries, so stepping forward one entry at a time
/// passes through every intervening folder.
pub fn complete_folders(
    files: &mut Vec<FilePath>,
    root: &FilePath,
    order: &dyn PathOrder,
    files_only: bool,
) {
    if files.is_empty() {
        return;
    }

    files.sort_by(|a, b| order.compare(a, b));
    if files_only {
        return;
    }

    let mut prev_dir = root.to_directory();
    let mut extras: Vec<FilePath> = Vec::new();
    if !root.is_empty() && files[0] != *root {
        extras.push(root.to_directory());
    }

    for file in files.iter() {
        let current_dir = file.to_directory();
        if prev_dir == current_dir {
            continue;
        }

        if current_dir.level() < prev_dir.level() && prev_dir.starts_with(&current_dir) {
            // Stepping back up an already-visited chain.
            prev_dir = current_dir;
            continue;
        }

        if current_dir.level() == prev_dir.level() + 1
            && current_dir.starts_with(&prev_dir)
            && file.is_directory()
        {
            // Direct child directory.
            prev_dir = current_dir;
            continue;
        }

        let common_level = common_prefix(&prev_dir, &current_dir).level();
        let copy_till = current_dir.level().saturating_sub(1);
        for level in common_level..copy_till {
            extras.push(current_dir.prefix(level));
        }
        prev_dir = current_dir;
    }

    if extras.is_empty() {
        return;
    }
    extras.sort_by(|a, b| order.compare(a, b));

    let mut merged = Vec::with_capacity(files.len() + extras.len());
    let mut left = files.drain(..).peekable();
    let mut right = extras.into_iter().peekable();
    loop {
        match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => {
                if order.compare(a, b) != Ordering::Greater {
                    merged.push(left.next().unwrap());
                } else {
                    merged.push(right.next().unwrap());
                }
            }
            (Some(_), None) => merged.push(left.next().unwrap()),
            (None, Some(_)) => merged.push(right.next().unwrap()),
            (None, None) => break,
        }
    }
    merged.dedup();
    drop(left);
    *files = merged;
}

/// Locates `entry` in a sorted list: first the entry opening its directory,
/// then, for file targets, the entry matching the full path.
pub fn find_entry(files: &[FilePath], entry: &FilePath) -> Option<usize> {
    let dir_level = entry.dir_level();
    let first = files
        .iter()
        .position(|file| file.starts_with_at(entry, dir_level))?;

    if entry.is_directory() {
        return Some(first);
    }
    files[first..]
        .iter()
        .position(|file| file.starts_with_at(entry, entry.level()))
        .map(|offset| first + offset)
}

/// Index of the first entry sharing a directory with `files[current]`.
fn first_file_in_dir(files: &[FilePath], current: usize) -> usize {
    let current_path = &files[current];
    for index in (1..=current).rev() {
        if !have_same_directory(&files[index], current_path) {
            return index + 1;
        }
    }
    if have_same_directory(&files[0], current_path) {
        0
    } else {
        1
    }
}

pub struct BookExplorer {
    file_mgr: Box<dyn FileManager>,
    archives: ArchiveRegistry,
    kinds: EntryKinds,
    sort_order: SortOrder,
    root: FilePath,
    files: Vec<FilePath>,
    files_in_archive: Vec<FilePath>,
    fs_cursor: usize,
    archive_cursor: usize,
    current_archive: Option<Box<dyn ArchiveReader>>,
}

impl BookExplorer {
    pub fn new(file_mgr: Box<dyn FileManager>, archives: ArchiveRegistry) -> Self {
        Self::with_entry_kinds(file_mgr, archives, EntryKinds::Both)
    }

    pub fn with_entry_kinds(
        file_mgr: Box<dyn FileManager>,
        archives: ArchiveRegistry,
        kinds: EntryKinds,
    ) -> Self {
        Self {
            file_mgr,
            archives,
            kinds,
            sort_order: SortOrder::default(),
            root: FilePath::default(),
            files: Vec::new(),
            files_in_archive: Vec::new(),
            fs_cursor: 0,
            archive_cursor: 0,
            current_archive: None,
        }
    }

    pub fn set_sort_order(&mut self, sort_order: SortOrder) {
        self.sort_order = sort_order;
    }

    pub fn root(&self) -> &FilePath {
        &self.root
    }

    fn files_only(&self) -> bool {
        !self.kinds.includes_directories()
    }

    /// Lists everything under `root`, fixes up the folder structure and
    /// positions the cursor at the root.
    pub fn set_root(&mut self, root: &FilePath) -> bool {
        self.root = root.clone();
        self.close_archive();
        self.fs_cursor = 0;

        self.files = match self.file_mgr.file_list(root, self.kinds, true) {
            Ok(files) => files,
            Err(err) => {
                log::warn!("cannot list {}: {err}", root.path());
                self.files = Vec::new();
                return false;
            }
        };
        let files_only = self.files_only();
        complete_folders(
            &mut self.files,
            root,
            self.sort_order.order(),
            files_only,
        );
        log::debug!(
            "root {} holds {} entries",
            root.path(),
            self.files.len()
        );

        self.enter(&PathToFile::new(root.clone()))
    }

    /// Immediate children of the current position, one level deep, for
    /// directory-listing UI.
    pub fn file_list(&self) -> Vec<PathToFile> {
        let current = self.current_pos();
        if current.is_empty() {
            return Vec::new();
        }

        let mut result: Vec<PathToFile> = Vec::new();
        if self.current_archive.is_some() {
            if self.files_in_archive.is_empty() {
                return result;
            }
            let dir_level = current.path_in_archive.dir_level();
            let first = first_file_in_dir(&self.files_in_archive, self.archive_cursor);
            for file in &self.files_in_archive[first..] {
                if !file.starts_with_at(&current.path_in_archive, dir_level) {
                    break;
                }
                if file.level() > dir_level
                    && result
                        .last()
                        .map_or(true, |last| !file.starts_with(&last.path_in_archive))
                {
                    result.push(PathToFile::with_archive(
                        self.files[self.fs_cursor].clone(),
                        file.prefix(dir_level),
                    ));
                }
            }
        } else {
            let dir_level = current.file_path.dir_level();
            let first = first_file_in_dir(&self.files, self.fs_cursor);
            for file in &self.files[first..] {
                if !file.starts_with_at(&current.file_path, dir_level) {
                    break;
                }
                if file.level() > dir_level
                    && result
                        .last()
                        .map_or(true, |last| !file.starts_with(&last.file_path))
                {
                    result.push(PathToFile::new(file.prefix(dir_level)));
                }
            }
        }
        result
    }

    fn open_archive(&mut self, path: &FilePath, to_beginning: bool) -> bool {
        let Some(mut reader) = self.archives.recognize(self.file_mgr.as_ref(), path) else {
            return false;
        };

        let files_only = self.files_only();
        let mut list = reader.file_list(files_only);
        complete_folders(
            &mut list,
            &FilePath::default(),
            self.sort_order.order(),
            files_only,
        );

        self.archive_cursor = if to_beginning {
            0
        } else {
            list.len().saturating_sub(1)
        };
        self.files_in_archive = list;
        self.current_archive = Some(reader);
        true
    }

    fn close_archive(&mut self) {
        if self.current_archive.take().is_some() {
            if let Some(entry) = self.files.get(self.fs_cursor) {
                log::debug!("leaving archive {}", entry.path());
            }
        }
        self.files_in_archive.clear();
        self.archive_cursor = 0;
    }

    fn current_in_archive_file(&self) -> bool {
        self.archive_cursor < self.files_in_archive.len()
            && !self.files_in_archive[self.archive_cursor].is_directory()
    }

    /// Moves the cursor to an already-known position, opening or closing
    /// archives as needed. `false` leaves the position unchanged except for
    /// a failed archive open, which mirrors a failed filesystem lookup.
    pub fn enter(&mut self, path: &PathToFile) -> bool {
        if self.root.is_empty() || path.is_empty() {
            return false;
        }
        if self.current_pos() == *path {
            return true;
        }

        if path.file_path.is_directory() {
            if self.current_pos().file_path != path.file_path {
                let Some(index) = find_entry(&self.files, &path.file_path) else {
                    return false;
                };
                self.fs_cursor = index;
                self.close_archive();
                return true;
            }
            return false;
        }

        // A file: possibly an archive.
        if self.current_pos().file_path != path.file_path || self.current_archive.is_none() {
            let Some(index) = find_entry(&self.files, &path.file_path) else {
                return false;
            };
            self.fs_cursor = index;

            if !self.open_archive(&path.file_path, true) {
                if !path.path_in_archive.is_empty() {
                    return false;
                }
                // A plain file.
                self.close_archive();
                return true;
            }
        }

        match find_entry(&self.files_in_archive, &path.path_in_archive) {
            Some(index) => {
                self.archive_cursor = index;
                true
            }
            None => false,
        }
    }

    /// Steps to the parent of the current position.
    pub fn back(&mut self) -> bool {
        let mut target = self.current_pos();
        if !target.path_in_archive.is_empty() {
            target.path_in_archive.pop();
        } else {
            target.file_path.pop();
        }
        self.enter(&target)
    }

    fn advance(&mut self, forward: bool) -> bool {
        let saved = self.current_pos();

        loop {
            if self.current_archive.is_some() {
                if self.files_in_archive.is_empty() {
                    self.close_archive();
                    continue;
                }
                let at_boundary = if forward {
                    self.archive_cursor + 1 >= self.files_in_archive.len()
                } else {
                    self.archive_cursor == 0
                };
                if at_boundary {
                    self.close_archive();
                    continue;
                }
                if forward {
                    self.archive_cursor += 1;
                } else {
                    self.archive_cursor -= 1;
                }
                if self.files_in_archive[self.archive_cursor].is_directory() {
                    continue;
                }
                return true;
            }

            let at_boundary = if forward {
                self.files.is_empty() || self.fs_cursor + 1 >= self.files.len()
            } else {
                self.files.is_empty() || self.fs_cursor == 0
            };
            if at_boundary {
                // No further file: restore the pre-call position so the
                // cursor stays on the last valid entry.
                if !saved.is_empty() {
                    self.enter(&saved);
                }
                return false;
            }

            if forward {
                self.fs_cursor += 1;
            } else {
                self.fs_cursor -= 1;
            }
            let entry = self.files[self.fs_cursor].clone();
            if entry.is_directory() {
                continue;
            }
            if self.open_archive(&entry, forward) {
                if self.current_in_archive_file() {
                    return true;
                }
                // Directory-only archive entry: keep scanning.
                continue;
            }
            return true;
        }
    }

    /// Advances to the next file, entering and leaving archives as needed.
    /// `false` means no further file exists; the position is unchanged.
    pub fn to_next_file(&mut self) -> bool {
        self.advance(true)
    }

    pub fn to_previous_file(&mut self) -> bool {
        self.advance(false)
    }

    pub fn to_first_file(&mut self) -> bool {
        self.close_archive();
        self.fs_cursor = 0;
        if self.files.is_empty() {
            return false;
        }

        let entry = self.files[0].clone();
        if entry.is_directory() {
            return self.to_next_file();
        }
        if self.open_archive(&entry, true) && !self.current_in_archive_file() {
            return self.to_next_file();
        }
        true
    }

    pub fn to_last_file(&mut self) -> bool {
        self.close_archive();
        if self.files.is_empty() {
            return false;
        }
        self.fs_cursor = self.files.len() - 1;

        let entry = self.files[self.fs_cursor].clone();
        if entry.is_directory() {
            return self.to_previous_file();
        }
        if self.open_archive(&entry, false) && !self.current_in_archive_file() {
            return self.to_previous_file();
        }
        true
    }

    /// The current logical position; empty before a successful `set_root`.
    pub fn current_pos(&self) -> PathToFile {
        let mut result = PathToFile::default();
        if !self.files.is_empty() && self.fs_cursor < self.files.len() {
            result.file_path = self.files[self.fs_cursor].clone();
        }
        if self.current_archive.is_some()
            && !self.files_in_archive.is_empty()
            && self.archive_cursor < self.files_in_archive.len()
        {
            result.path_in_archive = self.files_in_archive[self.archive_cursor].clone();
        }
        result
    }

    /// Raw bytes of the file under the cursor; `None` for directories,
    /// oversized files and read failures.
    pub fn read_current_file(&mut self) -> Option<Vec<u8>> {
        if let Some(archive) = self.current_archive.as_mut() {
            if !self.files_in_archive.is_empty()
                && self.archive_cursor < self.files_in_archive.len()
                && !self.files_in_archive[self.archive_cursor].is_directory()
            {
                let path = &self.files_in_archive[self.archive_cursor];
                return match archive.read_file(path, MAX_FILE_SIZE) {
                    Ok(data) => Some(data),
                    Err(err) => {
                        log::debug!("cannot read {} from archive: {err}", path.path());
                        None
                    }
                };
            }
            return None;
        }

        if !self.files.is_empty()
            && self.fs_cursor < self.files.len()
            && !self.files[self.fs_cursor].is_directory()
        {
            let path = &self.files[self.fs_cursor];
            return match self.file_mgr.read_file(path, MAX_FILE_SIZE) {
                Ok(data) => Some(data),
                Err(err) => {
                    log::debug!("cannot read {}: {err}", path.path());
                    None
                }
            };
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(raw: &str, is_file: bool) -> FilePath {
        FilePath::new(raw, is_file)
    }

    mod ordering {
        use super::*;

        fn sorted(mut paths: Vec<FilePath>) -> Vec<String> {
            paths.sort_by(|a, b| WordNumberOrder.compare(a, b));
            paths.iter().map(|p| p.path()).collect()
        }

        #[test]
        fn numbers_compare_numerically() {
            let result = sorted(vec![
                path("/a/file10.jpg", true),
                path("/a/file2.jpg", true),
                path("/a/file1.jpg", true),
            ]);
            assert_eq!(result, ["/a/file1.jpg", "/a/file2.jpg", "/a/file10.jpg"]);
        }

        #[test]
        fn directories_sort_before_files_at_divergence() {
            let result = sorted(vec![
                path("/a/file1", true),
                path("/a/folder2/sub/file1", true),
            ]);
            assert_eq!(result, ["/a/folder2/sub/file1", "/a/file1"]);
        }

        #[test]
        fn shallower_paths_sort_first() {
            let result = sorted(vec![
                path("/a/folder1/sub1", false),
                path("/a/folder1", false),
            ]);
            assert_eq!(result, ["/a/folder1", "/a/folder1/sub1"]);
        }

        #[test]
        fn comparison_is_case_insensitive() {
            let result = sorted(vec![path("/a/B.jpg", true), path("/a/a.jpg", true)]);
            assert_eq!(result, ["/a/a.jpg", "/a/B.jpg"]);
        }

        #[test]
        fn prefix_names_sort_first() {
            let result = sorted(vec![path("/a/chapter1a", false), path("/a/chapter1", false)]);
            assert_eq!(result, ["/a/chapter1", "/a/chapter1a"]);
        }

        #[test]
        fn number_order_compares_digit_runs_only() {
            let mut paths = vec![
                path("/a/x9-page2.jpg", true),
                path("/a/y2-page10.jpg", true),
            ];
            paths.sort_by(|a, b| NumberOrder.compare(a, b));
            let result: Vec<_> = paths.iter().map(|p| p.path()).collect();
            assert_eq!(result, ["/a/y2-page10.jpg", "/a/x9-page2.jpg"]);
        }
    }

    mod folder_completion {
        use super::*;

        #[test]
        fn synthesizes_missing_ancestors() {
            let root = path("/a", false);
            let mut files = vec![path("/a/b/c/f1", true), path("/a/d/f2", true)];
            complete_folders(&mut files, &root, &WordNumberOrder, false);

            let rendered: Vec<_> = files.iter().map(|p| p.path()).collect();
            assert_eq!(
                rendered,
                ["/a", "/a/b", "/a/b/c", "/a/b/c/f1", "/a/d", "/a/d/f2"]
            );
            // No duplicates and every entry but the files is a directory.
            assert!(files[..3].iter().all(|p| p.is_directory()));
            assert!(files[4].is_directory());
        }

        #[test]
        fn existing_directories_are_not_duplicated() {
            let root = path("/a", false);
            let mut files = vec![
                path("/a", false),
                path("/a/b", false),
                path("/a/b/f1", true),
            ];
            complete_folders(&mut files, &root, &WordNumberOrder, false);
            let rendered: Vec<_> = files.iter().map(|p| p.path()).collect();
            assert_eq!(rendered, ["/a", "/a/b", "/a/b/f1"]);
        }

        #[test]
        fn files_only_mode_just_sorts() {
            let root = path("/a", false);
            let mut files = vec![path("/a/z.jpg", true), path("/a/b/c/f1.jpg", true)];
            complete_folders(&mut files, &root, &WordNumberOrder, true);
            let rendered: Vec<_> = files.iter().map(|p| p.path()).collect();
            assert_eq!(rendered, ["/a/b/c/f1.jpg", "/a/z.jpg"]);
        }
    }

    mod entry_search {
        use super::*;

        fn file_set() -> Vec<FilePath> {
            vec![
                path("/r", false),
                path("/r/ch1", false),
                path("/r/ch1/p1.jpg", true),
                path("/r/ch1/p2.jpg", true),
                path("/r/ch2", false),
                path("/r/ch2/p1.jpg", true),
            ]
        }

        #[test]
        fn finds_directories_at_their_first_entry() {
            let files = file_set();
            assert_eq!(find_entry(&files, &path("/r/ch1", false)), Some(1));
            assert_eq!(find_entry(&files, &path("/r", false)), Some(0));
        }

        #[test]
        fn finds_files_exactly() {
            let files = file_set();
            assert_eq!(find_entry(&files, &path("/r/ch1/p2.jpg", true)), Some(3));
            assert_eq!(find_entry(&files, &path("/r/ch2/p1.jpg", true)), Some(5));
        }

        #[test]
        fn missing_entries_are_not_found() {
            let files = file_set();
            assert_eq!(find_entry(&files, &path("/r/ch3/p9.jpg", true)), None);
        }
    }
}
