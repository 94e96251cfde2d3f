//! Quarter-turn rotation by explicit index remapping.

use crate::img::Image;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotateAngle {
    Deg90,
    Deg180,
    Deg270,
}

fn rotate_pixels<const DEPTH: usize>(src: &Image, dst: &mut Image, angle: RotateAngle) {
    let orig_width = src.width() as usize;
    let orig_height = src.height() as usize;
    let new_width = dst.width() as usize;

    let src_stride = src.scanline(true);
    let dst_stride = dst.scanline(true);
    let src_data = src.data();
    let dst_data = dst.data_mut();

    for y in 0..orig_height {
        let src_row = &src_data[y * src_stride..];
        for x in 0..orig_width {
            let (dst_x, dst_y) = match angle {
                RotateAngle::Deg90 => (new_width - y - 1, x),
                RotateAngle::Deg180 => (new_width - x - 1, orig_height - y - 1),
                RotateAngle::Deg270 => (y, orig_width - x - 1),
            };
            let src_pos = x * DEPTH;
            let dst_pos = dst_y * dst_stride + dst_x * DEPTH;
            dst_data[dst_pos..dst_pos + DEPTH].copy_from_slice(&src_row[src_pos..src_pos + DEPTH]);
        }
    }
}

/// Rotates `src` into `dst`, reusing `dst`'s buffer when it is in
/// minimum-reallocations mode. Width and height swap for quarter turns.
pub fn rotate_into(src: &Image, dst: &mut Image, angle: RotateAngle) -> bool {
    if src.is_empty() {
        return false;
    }

    let (new_width, new_height) = match angle {
        RotateAngle::Deg90 | RotateAngle::Deg270 => (src.height(), src.width()),
        RotateAngle::Deg180 => (src.width(), src.height()),
    };
    dst.create(new_width, new_height, src.depth(), src.alignment());

    match src.depth() {
        1 => rotate_pixels::<1>(src, dst, angle),
        3 => rotate_pixels::<3>(src, dst, angle),
        4 => rotate_pixels::<4>(src, dst, angle),
        _ => return false,
    }
    true
}

pub fn rotate(src: &Image, angle: RotateAngle) -> Image {
    let mut dst = Image::new();
    if !rotate_into(src, &mut dst, angle) {
        return Image::new();
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;

    fn numbered(width: u32, height: u32, depth: u8) -> Image {
        let mut image = Image::alloc(width, height, depth, 1);
        for y in 0..height {
            for x in 0..width {
                let v = (y * width + x) as u8;
                image.set_pixel(x, y, Rgba::opaque(v, v.wrapping_add(1), v.wrapping_add(2)));
            }
        }
        image
    }

    #[test]
    fn ninety_degrees_swaps_dimensions() {
        let src = numbered(3, 2, 1);
        let turned = rotate(&src, RotateAngle::Deg90);
        assert_eq!(turned.width(), 2);
        assert_eq!(turned.height(), 3);
        // Top-left of the source lands in the top-right corner.
        assert_eq!(turned.get_pixel(1, 0), src.get_pixel(0, 0));
        // Bottom-left of the source lands in the top-left corner.
        assert_eq!(turned.get_pixel(0, 0), src.get_pixel(0, 1));
    }

    #[test]
    fn two_hundred_seventy_is_the_inverse_of_ninety() {
        for depth in [1u8, 3] {
            let src = numbered(5, 3, depth);
            let back = rotate(&rotate(&src, RotateAngle::Deg90), RotateAngle::Deg270);
            assert_eq!(back.width(), src.width());
            assert_eq!(back.height(), src.height());
            assert_eq!(back.data(), src.data(), "depth {depth}");
        }
    }

    #[test]
    fn four_quarter_turns_restore_the_image() {
        for depth in [1u8, 3, 4] {
            let src = numbered(4, 7, depth);
            let mut turned = src.clone();
            for _ in 0..4 {
                turned = rotate(&turned, RotateAngle::Deg90);
            }
            assert_eq!(turned.data(), src.data(), "depth {depth}");
        }
    }

    #[test]
    fn half_turn_twice_restores_the_image() {
        let src = numbered(6, 4, 3);
        let back = rotate(&rotate(&src, RotateAngle::Deg180), RotateAngle::Deg180);
        assert_eq!(back.data(), src.data());
    }

    #[test]
    fn half_turn_moves_corner_pixels() {
        let src = numbered(3, 3, 1);
        let turned = rotate(&src, RotateAngle::Deg180);
        assert_eq!(turned.get_pixel(0, 0), src.get_pixel(2, 2));
        assert_eq!(turned.get_pixel(2, 2), src.get_pixel(0, 0));
    }
}
