//! Display-fit decision and slice paging for a fixed grayscale screen.
//!
//! On every freshly decoded page the scaler converts to gray and classifies
//! it: pages that already fit the screen (directly or rotated a quarter
//! turn) are kept whole; anything larger is scaled to fill the screen's
//! limiting dimension and read as three overlapping screen-sized slices,
//! stepped through with [`SliceCache::next_bounds`] /
//! [`SliceCache::previous_bounds`].

use std::any::Any;

use crate::book::BookCache;
use crate::img::{self, Image, Rect};
use crate::rotate::{rotate_into, RotateAngle};
use crate::scale::{scale_into, ScaleQuality};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Whether the cached image was rotated a quarter turn for display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Represent {
    /// Fits the screen as-is; drawn centered without scaling.
    #[default]
    Whole,
    /// Scaled strip read as three overlapping screen-width slices.
    Parts3,
}

const SLICE_COUNT: usize = 3;

/// The display-ready representation of one page.
#[derive(Default)]
pub struct SliceCache {
    pub orientation: Orientation,
    pub represent: Represent,
    pub bounds: Rect,
    pub image: Image,
    current_slice: usize,
}

impl SliceCache {
    fn reset(&mut self, orientation: Orientation, represent: Represent, screen: ScreenSize) {
        self.orientation = orientation;
        self.represent = represent;
        self.bounds = Rect::new(0, 0, screen.width as i32, screen.height as i32);
        self.current_slice = 0;
    }

    /// Slice x-offsets: left edge, centered, right edge.
    fn offset_for(&self, slice: usize) -> i32 {
        let span = (self.image.width() as i32 - self.bounds.width).max(0);
        match slice {
            0 => 0,
            1 => span / 2,
            _ => span,
        }
    }

    pub fn current_slice(&self) -> usize {
        self.current_slice
    }

    /// Steps to the next slice; `false` at the last one (or for whole-page
    /// representations), telling the caller to turn the page instead.
    pub fn next_bounds(&mut self) -> bool {
        if self.represent != Represent::Parts3 || self.current_slice + 1 >= SLICE_COUNT {
            return false;
        }
        self.current_slice += 1;
        self.bounds.x = self.offset_for(self.current_slice);
        true
    }

    /// Steps back one slice; `false` at the first one.
    pub fn previous_bounds(&mut self) -> bool {
        if self.represent != Represent::Parts3 || self.current_slice == 0 {
            return false;
        }
        self.current_slice -= 1;
        self.bounds.x = self.offset_for(self.current_slice);
        true
    }

    /// The currently visible part of the cached image.
    pub fn visible(&self) -> Option<Image> {
        img::copy_rect(&self.image, self.bounds)
    }
}

/// [`BookCache`] payload computing the best-fit representation of every
/// decoded page for one fixed screen.
pub struct CacheScaler {
    screen: ScreenSize,
    gray: Image,
    scaled: SliceCache,
}

impl CacheScaler {
    pub fn new(screen: ScreenSize) -> Self {
        let mut gray = Image::new();
        gray.enable_minimum_reallocations(true);
        let mut scaled = SliceCache::default();
        scaled.image.enable_minimum_reallocations(true);
        Self {
            screen,
            gray,
            scaled,
        }
    }

    pub fn scaled_gray(&self) -> &SliceCache {
        &self.scaled
    }

    pub fn scaled_gray_mut(&mut self) -> &mut SliceCache {
        &mut self.scaled
    }

    pub fn screen(&self) -> ScreenSize {
        self.screen
    }
}

impl BookCache for CacheScaler {
    fn clone_box(&self) -> Box<dyn BookCache> {
        Box::new(CacheScaler::new(self.screen))
    }

    fn on_loaded(&mut self, image: &Image) -> bool {
        if !img::to_gray_into(image, &mut self.gray) {
            return false;
        }

        let width = self.gray.width();
        let height = self.gray.height();
        let screen = self.screen;

        if width < screen.width && height < screen.height {
            self.scaled.reset(Orientation::Vertical, Represent::Whole, screen);
            img::copy_into(&self.gray, &mut self.scaled.image);
        } else if width < screen.height && height < screen.width {
            // Fits sideways.
            self.scaled
                .reset(Orientation::Horizontal, Represent::Whole, screen);
            rotate_into(&self.gray, &mut self.scaled.image, RotateAngle::Deg270);
        } else if width <= height {
            // Tall page: scale so the quarter-turned strip is exactly one
            // screen high, then read it sideways in three slices.
            self.scaled
                .reset(Orientation::Horizontal, Represent::Parts3, screen);
            let mut strip = Image::new();
            if !scale_into(&self.gray, &mut strip, ScaleQuality::High, screen.height, 0) {
                return false;
            }
            rotate_into(&strip, &mut self.scaled.image, RotateAngle::Deg270);
        } else {
            // Wide page: one screen high, panned horizontally.
            self.scaled
                .reset(Orientation::Vertical, Represent::Parts3, screen);
            if !scale_into(
                &self.gray,
                &mut self.scaled.image,
                ScaleQuality::High,
                0,
                screen.height,
            ) {
                return false;
            }
        }

        log::debug!(
            "page {}x{} cached as {:?}/{:?} ({}x{})",
            width,
            height,
            self.scaled.represent,
            self.scaled.orientation,
            self.scaled.image.width(),
            self.scaled.image.height()
        );
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;

    const SCREEN: ScreenSize = ScreenSize {
        width: 600,
        height: 800,
    };

    fn page(width: u32, height: u32) -> Image {
        let mut image = Image::alloc(width, height, 3, 1);
        for y in 0..height {
            for x in 0..width {
                let v = ((x + y) % 251) as u8;
                image.set_pixel(x, y, Rgba::opaque(v, v, v));
            }
        }
        image
    }

    #[test]
    fn small_page_stays_whole() {
        let mut scaler = CacheScaler::new(SCREEN);
        assert!(scaler.on_loaded(&page(300, 400)));

        let cache = scaler.scaled_gray();
        assert_eq!(cache.represent, Represent::Whole);
        assert_eq!(cache.orientation, Orientation::Vertical);
        assert_eq!(cache.image.depth(), 1);
        assert_eq!((cache.image.width(), cache.image.height()), (300, 400));
    }

    #[test]
    fn sideways_fitting_page_is_rotated() {
        // Wider than the screen but fits when turned a quarter.
        let mut scaler = CacheScaler::new(SCREEN);
        assert!(scaler.on_loaded(&page(700, 500)));

        let cache = scaler.scaled_gray();
        assert_eq!(cache.represent, Represent::Whole);
        assert_eq!(cache.orientation, Orientation::Horizontal);
        assert_eq!((cache.image.width(), cache.image.height()), (500, 700));
    }

    #[test]
    fn tall_page_becomes_three_slices() {
        let mut scaler = CacheScaler::new(SCREEN);
        assert!(scaler.on_loaded(&page(800, 2400)));

        let cache = scaler.scaled_gray();
        assert_eq!(cache.represent, Represent::Parts3);
        assert_eq!(cache.orientation, Orientation::Horizontal);
        // Strip is exactly one screen high and wider than the screen.
        assert_eq!(cache.image.height(), SCREEN.height);
        assert!(cache.image.width() > SCREEN.width);
        assert_eq!(cache.bounds, Rect::new(0, 0, 600, 800));
    }

    #[test]
    fn wide_page_keeps_orientation() {
        let mut scaler = CacheScaler::new(SCREEN);
        assert!(scaler.on_loaded(&page(3200, 900)));

        let cache = scaler.scaled_gray();
        assert_eq!(cache.represent, Represent::Parts3);
        assert_eq!(cache.orientation, Orientation::Vertical);
        assert_eq!(cache.image.height(), SCREEN.height);
    }

    #[test]
    fn slice_cycle_visits_three_offsets_and_stops() {
        let mut scaler = CacheScaler::new(SCREEN);
        assert!(scaler.on_loaded(&page(800, 2400)));

        let cache = scaler.scaled_gray_mut();
        let span = cache.image.width() as i32 - cache.bounds.width;
        assert_eq!(cache.bounds.x, 0);

        assert!(cache.next_bounds());
        assert_eq!(cache.bounds.x, span / 2);
        assert!(cache.next_bounds());
        assert_eq!(cache.bounds.x, span);
        assert!(!cache.next_bounds());

        assert!(cache.previous_bounds());
        assert_eq!(cache.bounds.x, span / 2);
        assert!(cache.previous_bounds());
        assert_eq!(cache.bounds.x, 0);
        assert!(!cache.previous_bounds());
    }

    #[test]
    fn whole_pages_have_no_slices() {
        let mut scaler = CacheScaler::new(SCREEN);
        assert!(scaler.on_loaded(&page(100, 100)));
        let cache = scaler.scaled_gray_mut();
        assert!(!cache.next_bounds());
        assert!(!cache.previous_bounds());
    }

    #[test]
    fn visible_window_is_screen_sized() {
        let mut scaler = CacheScaler::new(SCREEN);
        assert!(scaler.on_loaded(&page(800, 2400)));
        let cache = scaler.scaled_gray();
        let visible = cache.visible().unwrap();
        assert_eq!(visible.width(), SCREEN.width);
        assert_eq!(visible.height(), SCREEN.height);
    }

    #[test]
    fn clone_box_starts_fresh_for_its_own_slot() {
        let mut scaler = CacheScaler::new(SCREEN);
        assert!(scaler.on_loaded(&page(100, 100)));

        let clone = scaler.clone_box();
        let clone = clone.as_any().downcast_ref::<CacheScaler>().unwrap();
        assert!(clone.scaled_gray().image.is_empty());
        assert_eq!(clone.screen(), SCREEN);
    }
}
