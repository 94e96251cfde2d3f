//! The pixel buffer shared by decoders, transforms and the page cache.
//!
//! An [`Image`] owns one [`ByteArray`] of pixel data tagged with width,
//! height, byte depth (1 = gray, 3 = RGB family, 4 = RGBA family) and a row
//! alignment: rows are padded up to a multiple of the alignment so decoders
//! can match a device's native bitmap stride. Cloning shares the buffer
//! copy-on-write.

use crate::bytes::ByteArray;
use crate::color::{GrayLayout, PixelLayout, RgbLayout, Rgba, RgbaLayout};

/// Upper bound on the pixel buffer size; dimensions coming from untrusted
/// headers are rejected before any allocation happens.
pub const MAX_IMAGE_BYTES: usize = 1024 * 1024 * 1024;

/// Integer rectangle used for slice windows and region copies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn clear(&mut self) {
        *self = Rect::default();
    }
}

/// Clamps `rect` into `bounds`; the result may have non-positive extent.
pub fn restrict_by(rect: Rect, bounds: Rect) -> Rect {
    let x1 = rect.x.max(bounds.x);
    let y1 = rect.y.max(bounds.y);
    let x2 = (rect.x + rect.width).min(bounds.x + bounds.width);
    let y2 = (rect.y + rect.height).min(bounds.y + bounds.height);
    Rect::new(x1, y1, x2 - x1, y2 - y1)
}

fn align_up(value: usize, align: usize) -> usize {
    if align <= 1 || value % align == 0 {
        value
    } else {
        (value / align + 1) * align
    }
}

/// Row stride for the given geometry, padded when `with_alignment`.
pub fn scanline_for(width: u32, depth: u8, align: usize, with_alignment: bool) -> usize {
    let packed = width as usize * depth as usize;
    if with_alignment {
        align_up(packed, align)
    } else {
        packed
    }
}

/// Rejects zero extents, unsupported depths and any geometry whose buffer
/// size would exceed [`MAX_IMAGE_BYTES`] or overflow.
pub fn valid_dimensions(width: u32, height: u32, depth: u8, align: usize) -> bool {
    if width == 0 || height == 0 || !matches!(depth, 1 | 3 | 4) {
        return false;
    }
    let stride = match (width as usize)
        .checked_mul(depth as usize)
        .map(|packed| align_up(packed, align.max(1)))
    {
        Some(stride) => stride,
        None => return false,
    };
    match stride.checked_mul(height as usize) {
        Some(total) => total <= MAX_IMAGE_BYTES,
        None => false,
    }
}

#[derive(Clone, Debug, Default)]
pub struct Image {
    data: ByteArray,
    width: u32,
    height: u32,
    depth: u8,
    align: usize,
    min_realloc: bool,
}

impl Image {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a zero-filled image. Panics on invalid geometry; callers
    /// dealing with untrusted dimensions check [`valid_dimensions`] first.
    pub fn alloc(width: u32, height: u32, depth: u8, align: usize) -> Self {
        let mut image = Self::new();
        image.create(width, height, depth, align);
        image
    }

    /// (Re)creates the pixel buffer. In minimum-reallocations mode an
    /// existing buffer is kept when it is already large enough, which the
    /// long-lived page-cache slots use to avoid churn while flipping pages.
    pub fn create(&mut self, width: u32, height: u32, depth: u8, align: usize) {
        assert!(
            matches!(depth, 1 | 3 | 4),
            "unsupported image depth {depth}"
        );
        assert!(
            valid_dimensions(width, height, depth, align),
            "image dimensions rejected: {width}x{height}x{depth}"
        );

        let align = align.max(1);
        let new_size = scanline_for(width, depth, align, true) * height as usize;
        if !self.min_realloc || new_size > self.data.len() {
            self.data.resize(new_size);
        }
        self.width = width;
        self.height = height;
        self.depth = depth;
        self.align = align;
    }

    /// Recreates with another image's geometry.
    pub fn create_same(&mut self, other: &Image) {
        self.create(other.width, other.height, other.depth, other.align);
    }

    pub fn destroy(&mut self) {
        self.data.reset();
        self.width = 0;
        self.height = 0;
        self.depth = 0;
        self.align = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u8 {
        self.depth
    }

    pub fn alignment(&self) -> usize {
        self.align.max(1)
    }

    pub fn scanline(&self, with_alignment: bool) -> usize {
        scanline_for(self.width, self.depth, self.alignment(), with_alignment)
    }

    pub fn set_depth(&mut self, depth: u8) {
        self.depth = depth;
    }

    pub fn set_width(&mut self, width: u32) {
        self.width = width;
    }

    pub fn set_height(&mut self, height: u32) {
        self.height = height;
    }

    pub fn enable_minimum_reallocations(&mut self, enable: bool) {
        self.min_realloc = enable;
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    /// Mutable pixel data; acquires a private copy when shared.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.scanline(true);
        let start = y as usize * stride;
        &self.data()[start..start + stride]
    }

    pub fn shares_buffer(&self, other: &Image) -> bool {
        self.data.shares_buffer(&other.data)
    }

    /// Reads a pixel through the layout matching the depth. Panics on an
    /// unsupported depth; that is a programmer error, not input-dependent.
    pub fn get_pixel(&self, x: u32, y: u32) -> Rgba {
        let pos = y as usize * self.scanline(true) + x as usize * self.depth as usize;
        let src = &self.data()[pos..];
        match self.depth {
            1 => GrayLayout::read(src),
            3 => RgbLayout::read(src),
            4 => RgbaLayout::read(src),
            depth => panic!("cannot read pixel at depth {depth}"),
        }
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, px: Rgba) {
        let pos = y as usize * self.scanline(true) + x as usize * self.depth as usize;
        let depth = self.depth;
        let dst = &mut self.data_mut()[pos..];
        match depth {
            1 => GrayLayout::write(dst, px),
            3 => RgbLayout::write(dst, px),
            4 => RgbaLayout::write(dst, px),
            depth => panic!("cannot write pixel at depth {depth}"),
        }
    }
}

/// Full-image rectangle.
pub fn image_rect(src: &Image) -> Rect {
    Rect::new(0, 0, src.width() as i32, src.height() as i32)
}

/// Bytes of pixel data including row padding.
pub fn data_size(src: &Image) -> usize {
    src.scanline(true) * src.height() as usize
}

/// Deep copy into `dst`, reusing its buffer when possible.
pub fn copy_into(src: &Image, dst: &mut Image) {
    dst.create_same(src);
    let len = data_size(src);
    dst.data_mut()[..len].copy_from_slice(&src.data()[..len]);
}

fn convert_rows<SrcL: PixelLayout, DstL: PixelLayout>(src: &Image, dst: &mut Image) {
    let width = src.width() as usize;
    let src_stride = src.scanline(true);
    let dst_stride = dst.scanline(true);
    let src_data = src.data();
    let dst_data = dst.data_mut();

    for y in 0..src.height() as usize {
        let src_row = &src_data[y * src_stride..];
        let dst_row = &mut dst_data[y * dst_stride..];
        for x in 0..width {
            let px = SrcL::read(&src_row[x * SrcL::BYTES..]);
            DstL::write(&mut dst_row[x * DstL::BYTES..], px);
        }
    }
}

/// Collapses an RGB-family image to 8-bit gray using the fixed luma
/// weighting. Gray input is copied through. Returns `false` for empty input
/// or unconvertible depth.
pub fn to_gray_into(src: &Image, dst: &mut Image) -> bool {
    if src.is_empty() {
        return false;
    }
    match src.depth() {
        1 => {
            copy_into(src, dst);
            true
        }
        3 => {
            dst.create(src.width(), src.height(), 1, src.alignment());
            convert_rows::<RgbLayout, GrayLayout>(src, dst);
            true
        }
        4 => {
            dst.create(src.width(), src.height(), 1, src.alignment());
            convert_rows::<RgbaLayout, GrayLayout>(src, dst);
            true
        }
        _ => false,
    }
}

pub fn to_gray(src: &Image) -> Option<Image> {
    let mut dst = Image::new();
    to_gray_into(src, &mut dst).then_some(dst)
}

/// Swaps the red and blue channels in place over a copy of `src`.
pub fn to_bgr(src: &Image) -> Option<Image> {
    if src.is_empty() || !matches!(src.depth(), 3 | 4) {
        return None;
    }
    let mut dst = src.clone();
    let stride = dst.scanline(true);
    let packed = dst.scanline(false);
    let step = dst.depth() as usize;
    let height = dst.height() as usize;
    let data = dst.data_mut();
    for y in 0..height {
        let row = &mut data[y * stride..y * stride + packed];
        for px in row.chunks_exact_mut(step) {
            px.swap(0, 2);
        }
    }
    Some(dst)
}

pub fn rgba_to_rgb(src: &Image) -> Option<Image> {
    if src.is_empty() || src.depth() != 4 {
        return None;
    }
    let mut dst = Image::alloc(src.width(), src.height(), 3, src.alignment());
    convert_rows::<RgbaLayout, RgbLayout>(src, &mut dst);
    Some(dst)
}

pub fn rgb_to_rgba(src: &Image) -> Option<Image> {
    if src.is_empty() || src.depth() != 3 {
        return None;
    }
    let mut dst = Image::alloc(src.width(), src.height(), 4, src.alignment());
    convert_rows::<RgbLayout, RgbaLayout>(src, &mut dst);
    Some(dst)
}

pub fn gray_to_rgba(src: &Image) -> Option<Image> {
    if src.is_empty() || src.depth() != 1 {
        return None;
    }
    let mut dst = Image::alloc(src.width(), src.height(), 4, src.alignment());
    convert_rows::<GrayLayout, RgbaLayout>(src, &mut dst);
    Some(dst)
}

/// Extracts the part of `src` under `rect` (clamped to the image) into a
/// packed destination. Returns `None` when the clamped rect is degenerate.
pub fn copy_rect(src: &Image, rect: Rect) -> Option<Image> {
    if src.is_empty() {
        return None;
    }
    let rect = restrict_by(rect, image_rect(src));
    if rect.width <= 0 || rect.height <= 0 {
        return None;
    }

    let depth = src.depth() as usize;
    let mut dst = Image::alloc(rect.width as u32, rect.height as u32, src.depth(), 1);
    let src_stride = src.scanline(true);
    let dst_stride = dst.scanline(true);
    let row_bytes = rect.width as usize * depth;
    let src_data = src.data();
    let dst_data = dst.data_mut();

    for row in 0..rect.height as usize {
        let src_pos = (rect.y as usize + row) * src_stride + rect.x as usize * depth;
        let dst_pos = row * dst_stride;
        dst_data[dst_pos..dst_pos + row_bytes]
            .copy_from_slice(&src_data[src_pos..src_pos + row_bytes]);
    }
    Some(dst)
}
