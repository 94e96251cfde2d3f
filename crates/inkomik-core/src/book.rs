//! Page-level caching and bookmarking on top of the explorer.
//!
//! A [`Book`] keeps three decoded-image slots: previous, current and next.
//! Navigation rotates them so a page turn never re-decodes the page that was
//! just shown, and [`Book::preload`] fills the neighbour slots after the
//! visible page is up, hiding decode latency behind the display refresh.
//! Files that fail to decode are skipped transparently in either direction.

use std::any::Any;
use std::mem;

use serde::{Deserialize, Serialize};

use crate::decoder::DecoderRegistry;
use crate::explorer::BookExplorer;
use crate::img::Image;
use crate::path::{FilePath, PathToFile};

/// A saved reading position, sufficient to resume a book later.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub root: FilePath,
    pub current_file: PathToFile,
}

/// Per-slot derived data attached by subscribers; cloned once per cache
/// slot so each slot's state is independent.
pub trait BookCache {
    fn clone_box(&self) -> Box<dyn BookCache>;

    /// Called with every freshly decoded image.
    fn on_loaded(&mut self, image: &Image) -> bool;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[derive(Default)]
struct Slot {
    image: Image,
    cache: Option<Box<dyn BookCache>>,
    bookmark: Bookmark,
}

impl Slot {
    fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// Drops the image and bookmark; the cache payload stays allocated and
    /// is overwritten by the next load.
    fn clear(&mut self) {
        self.image.destroy();
        self.bookmark = Bookmark::default();
    }
}

enum Direction {
    Forward,
    Backward,
}

fn load_slot(explorer: &mut BookExplorer, decoders: &DecoderRegistry, slot: &mut Slot) -> bool {
    let pos = explorer.current_pos();
    let file = if pos.path_in_archive.is_empty() {
        &pos.file_path
    } else {
        &pos.path_in_archive
    };
    let ext = file.extension().to_owned();

    let Some(data) = explorer.read_current_file() else {
        return false;
    };

    match decoders.decode(&ext, &data) {
        Ok(image) => {
            slot.image = image;
            slot.bookmark = Bookmark {
                root: explorer.root().clone(),
                current_file: pos,
            };
            if let Some(cache) = slot.cache.as_mut() {
                cache.on_loaded(&slot.image);
            }
            true
        }
        Err(err) => {
            log::debug!("skipping undecodable page {pos}: {err}");
            false
        }
    }
}

fn find_and_load(
    explorer: &mut BookExplorer,
    decoders: &DecoderRegistry,
    slot: &mut Slot,
    direction: Direction,
) -> bool {
    loop {
        let moved = match direction {
            Direction::Forward => explorer.to_next_file(),
            Direction::Backward => explorer.to_previous_file(),
        };
        if !moved {
            return false;
        }
        if load_slot(explorer, decoders, slot) {
            return true;
        }
    }
}

pub struct Book {
    explorer: BookExplorer,
    decoders: DecoderRegistry,
    previous: Slot,
    current: Slot,
    next: Slot,
}

impl Book {
    pub fn new(explorer: BookExplorer, decoders: DecoderRegistry) -> Self {
        Self {
            explorer,
            decoders,
            previous: Slot::default(),
            current: Slot::default(),
            next: Slot::default(),
        }
    }

    /// Installs the cache payload prototype: the prototype itself serves the
    /// current slot and two independent clones serve the neighbours. `None`
    /// clears all three.
    pub fn set_cache_prototype(&mut self, cache: Option<Box<dyn BookCache>>) {
        match cache {
            Some(cache) => {
                self.previous.cache = Some(cache.clone_box());
                self.next.cache = Some(cache.clone_box());
                self.current.cache = Some(cache);
            }
            None => {
                self.previous.cache = None;
                self.current.cache = None;
                self.next.cache = None;
            }
        }
    }

    pub fn set_root(&mut self, root: &FilePath) -> bool {
        self.previous.clear();
        self.current.clear();
        self.next.clear();
        self.explorer.set_root(root)
    }

    fn clear_slots(&mut self) {
        self.previous.clear();
        self.current.clear();
        self.next.clear();
    }

    /// Positions at the first decodable page of the book.
    pub fn to_first_file(&mut self) -> bool {
        self.clear_slots();
        if !self.explorer.to_first_file() {
            return false;
        }

        let Book {
            explorer,
            decoders,
            current,
            ..
        } = self;
        if load_slot(explorer, decoders, current) {
            return true;
        }
        find_and_load(explorer, decoders, current, Direction::Forward)
    }

    /// Positions at the last decodable page of the book.
    pub fn to_last_file(&mut self) -> bool {
        self.clear_slots();
        if !self.explorer.to_last_file() {
            return false;
        }

        let Book {
            explorer,
            decoders,
            current,
            ..
        } = self;
        if load_slot(explorer, decoders, current) {
            return true;
        }
        find_and_load(explorer, decoders, current, Direction::Backward)
    }

    /// Advances to the next decodable page. `false` leaves everything
    /// unchanged.
    pub fn increment_position(&mut self) -> bool {
        if self.current.is_empty() {
            return self.to_first_file();
        }

        if self.next.is_empty() {
            let position = self.current.bookmark.current_file.clone();
            if !self.explorer.enter(&position) {
                return false;
            }
            let Book {
                explorer,
                decoders,
                next,
                ..
            } = self;
            if !find_and_load(explorer, decoders, next, Direction::Forward) {
                return false;
            }
        }

        mem::swap(&mut self.previous, &mut self.current);
        mem::swap(&mut self.current, &mut self.next);
        self.next.clear();
        true
    }

    /// Steps back to the previous decodable page. `false` leaves everything
    /// unchanged.
    pub fn decrement_position(&mut self) -> bool {
        if self.current.is_empty() {
            return self.to_last_file();
        }

        if self.previous.is_empty() {
            let position = self.current.bookmark.current_file.clone();
            if !self.explorer.enter(&position) {
                return false;
            }
            let Book {
                explorer,
                decoders,
                previous,
                ..
            } = self;
            if !find_and_load(explorer, decoders, previous, Direction::Backward) {
                return false;
            }
        }

        mem::swap(&mut self.next, &mut self.current);
        mem::swap(&mut self.current, &mut self.previous);
        self.previous.clear();
        true
    }

    /// Fills the neighbour slots without moving the current position. Meant
    /// to run right after the visible page was drawn.
    pub fn preload(&mut self) {
        if self.current.is_empty() && !self.to_first_file() {
            return;
        }
        if !self.next.is_empty() && !self.previous.is_empty() {
            return;
        }

        let position = self.current.bookmark.current_file.clone();

        if self.previous.is_empty() && self.explorer.enter(&position) {
            let Book {
                explorer,
                decoders,
                previous,
                ..
            } = self;
            find_and_load(explorer, decoders, previous, Direction::Backward);
        }
        if self.next.is_empty() && self.explorer.enter(&position) {
            let Book {
                explorer,
                decoders,
                next,
                ..
            } = self;
            find_and_load(explorer, decoders, next, Direction::Forward);
        }
    }

    pub fn has_current_image(&self) -> bool {
        !self.current.is_empty()
    }

    pub fn current_image(&self) -> Option<&Image> {
        if self.current.is_empty() {
            None
        } else {
            Some(&self.current.image)
        }
    }

    pub fn current_path(&self) -> PathToFile {
        self.current.bookmark.current_file.clone()
    }

    pub fn current_cache(&self) -> Option<&dyn BookCache> {
        self.current.cache.as_deref()
    }

    pub fn current_cache_mut(&mut self) -> Option<&mut (dyn BookCache + 'static)> {
        self.current.cache.as_deref_mut()
    }

    /// The position to save for later. Prefers the loaded page's bookmark;
    /// the explorer cursor may sit on a neighbour after a preload scan.
    pub fn bookmark(&self) -> Bookmark {
        if !self.current.is_empty() {
            return self.current.bookmark.clone();
        }
        Bookmark {
            root: self.explorer.root().clone(),
            current_file: self.explorer.current_pos(),
        }
    }

    /// Re-opens the bookmarked root, repositions and decodes the bookmarked
    /// page (scanning forward past a page that has gone corrupt in the
    /// meantime). Not a cheap in-memory resume: the file tree is listed
    /// again.
    pub fn go_to_bookmark(&mut self, bookmark: &Bookmark) -> bool {
        if !self.explorer.set_root(&bookmark.root) || !self.explorer.enter(&bookmark.current_file)
        {
            return false;
        }
        self.clear_slots();

        let Book {
            explorer,
            decoders,
            current,
            ..
        } = self;
        if load_slot(explorer, decoders, current) {
            return true;
        }
        find_and_load(explorer, decoders, current, Direction::Forward)
    }

    pub fn explorer(&self) -> &BookExplorer {
        &self.explorer
    }
}
