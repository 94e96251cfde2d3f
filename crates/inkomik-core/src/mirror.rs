//! Horizontal and vertical flips, honoring row alignment padding.

use crate::img::Image;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MirrorType {
    /// Left-right flip.
    LeftToRight,
    /// Top-bottom flip.
    UpsideDown,
}

/// Flips `image` in place.
pub fn mirror_in_place(image: &mut Image, mirror_type: MirrorType) {
    if image.is_empty() {
        return;
    }

    let height = image.height() as usize;
    let width = image.width() as usize;
    let stride = image.scanline(true);
    let packed = image.scanline(false);
    let depth = image.depth() as usize;
    let data = image.data_mut();

    match mirror_type {
        MirrorType::UpsideDown => {
            for top in 0..height / 2 {
                let bottom = height - 1 - top;
                let (head, tail) = data.split_at_mut(bottom * stride);
                head[top * stride..top * stride + packed].swap_with_slice(&mut tail[..packed]);
            }
        }
        MirrorType::LeftToRight => {
            for y in 0..height {
                let row = &mut data[y * stride..y * stride + packed];
                for x in 0..width / 2 {
                    let left = x * depth;
                    let right = (width - 1 - x) * depth;
                    for channel in 0..depth {
                        row.swap(left + channel, right + channel);
                    }
                }
            }
        }
    }
}

/// Flips `src` into `dst` with the same geometry.
pub fn mirror_into(src: &Image, dst: &mut Image, mirror_type: MirrorType) -> bool {
    if src.is_empty() {
        return false;
    }
    dst.create_same(src);

    let height = src.height() as usize;
    let width = src.width() as usize;
    let stride = src.scanline(true);
    let packed = src.scanline(false);
    let depth = src.depth() as usize;
    let src_data = src.data();
    let dst_data = dst.data_mut();

    match mirror_type {
        MirrorType::UpsideDown => {
            for y in 0..height {
                let flipped = height - 1 - y;
                dst_data[flipped * stride..flipped * stride + packed]
                    .copy_from_slice(&src_data[y * stride..y * stride + packed]);
            }
        }
        MirrorType::LeftToRight => {
            for y in 0..height {
                let src_row = &src_data[y * stride..];
                let dst_row = &mut dst_data[y * stride..];
                for x in 0..width {
                    let from = x * depth;
                    let to = (width - 1 - x) * depth;
                    dst_row[to..to + depth].copy_from_slice(&src_row[from..from + depth]);
                }
            }
        }
    }
    true
}
