//! Native BMP decoder.
//!
//! Parses the file header plus one of four info-header versions (V1, V3, V4,
//! V5 by declared size) and dispatches among depth-specific unpackers: 1 bpp
//! monochrome, 4/8 bpp palette (raw or RLE4/RLE8), 16 bpp (fixed 5-5-5 or
//! bitfield masks, explicit from a V3+ header or recovered from the legacy
//! palette-encoded convention), 24 bpp and 32 bpp (with the skip-first-byte
//! bitfield variant). All paths write through a direction-aware row writer
//! supporting the sign-of-height convention.
//!
//! Destination overrun is not an abort: real-world files overrun slightly
//! and remain usable once clipped, so the writer records the condition and
//! the decoder's [`TruncationPolicy`] decides whether the partially decoded,
//! zero-filled image is reported as success.

use crate::color::{luma, OPAQUE};
use crate::img::{self, Image};

use super::{DecodeError, DecodeOptions, ImageDecoder};

const BMP_MAGIC: [u8; 2] = [b'B', b'M'];
const FILE_HEADER_LEN: usize = 14;
/// Palette data always follows the V1 info header, independent of the
/// actual header version.
const PALETTE_OFFSET: usize = FILE_HEADER_LEN + 40;

const HEADER_V1: u32 = 40;
const HEADER_V3: u32 = 56;
const HEADER_V4: u32 = 108;
const HEADER_V5: u32 = 124;

const COMP_NONE: u32 = 0;
const COMP_RLE8: u32 = 1;
const COMP_RLE4: u32 = 2;
const COMP_BITFIELDS: u32 = 3;

/// What to report when pixel data runs past the declared image bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TruncationPolicy {
    /// Stop writing, zero-fill the remaining rows and report success.
    #[default]
    ZeroFillAndSucceed,
    /// Report [`DecodeError::Truncated`].
    Fail,
}

pub struct BmpDecoder {
    truncation: TruncationPolicy,
}

impl Default for BmpDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BmpDecoder {
    pub fn new() -> Self {
        Self {
            truncation: TruncationPolicy::default(),
        }
    }

    pub fn with_truncation_policy(truncation: TruncationPolicy) -> Self {
        Self { truncation }
    }
}

fn u16_at(data: &[u8], off: usize) -> Option<u16> {
    Some(u16::from_le_bytes(data.get(off..off + 2)?.try_into().ok()?))
}

fn u32_at(data: &[u8], off: usize) -> Option<u32> {
    Some(u32::from_le_bytes(data.get(off..off + 4)?.try_into().ok()?))
}

fn i32_at(data: &[u8], off: usize) -> Option<i32> {
    Some(i32::from_le_bytes(data.get(off..off + 4)?.try_into().ok()?))
}

/// BMP rows are padded to 32-bit boundaries in the file.
fn align4(bytes: usize) -> usize {
    (bytes + 3) & !3
}

struct Header {
    declared_file_size: u32,
    off_bits: u32,
    header_size: u32,
    width: u32,
    height: u32,
    top_down: bool,
    bit_count: u16,
    compression: u32,
    size_image: u32,
    clr_used: u32,
    clr_important: u32,
    masks: [u32; 4],
}

impl Header {
    fn parse(data: &[u8]) -> Result<Header, DecodeError> {
        if !data.starts_with(&BMP_MAGIC) {
            return Err(DecodeError::Unrecognized);
        }
        if data.len() < FILE_HEADER_LEN + 4 {
            return Err(DecodeError::Truncated);
        }

        let header_size = u32_at(data, FILE_HEADER_LEN).unwrap();
        if !matches!(header_size, HEADER_V1 | HEADER_V3 | HEADER_V4 | HEADER_V5) {
            return Err(DecodeError::InvalidHeader("unknown info header size"));
        }
        if data.len() < FILE_HEADER_LEN + header_size as usize {
            return Err(DecodeError::Truncated);
        }

        let off_bits = u32_at(data, 10).unwrap();
        if (data.len() as u64) < off_bits as u64 {
            return Err(DecodeError::Truncated);
        }

        let width_raw = i32_at(data, 18).unwrap();
        if width_raw <= 0 {
            return Err(DecodeError::InvalidHeader("non-positive width"));
        }
        let height_raw = i32_at(data, 22).unwrap();

        let masks = if header_size >= HEADER_V3 {
            [
                u32_at(data, 54).unwrap(),
                u32_at(data, 58).unwrap(),
                u32_at(data, 62).unwrap(),
                u32_at(data, 66).unwrap(),
            ]
        } else {
            [0; 4]
        };

        Ok(Header {
            declared_file_size: u32_at(data, 2).unwrap(),
            off_bits,
            header_size,
            width: width_raw as u32,
            height: height_raw.unsigned_abs(),
            top_down: height_raw < 0,
            bit_count: u16_at(data, 28).unwrap(),
            compression: u32_at(data, 30).unwrap(),
            size_image: u32_at(data, 34).unwrap(),
            clr_used: u32_at(data, 46).unwrap(),
            clr_important: u32_at(data, 50).unwrap(),
            masks,
        })
    }

    fn palette_cap(&self) -> u32 {
        match self.bit_count {
            1 => 2,
            4 => 16,
            8 => 256,
            16 => 3,
            _ => 0,
        }
    }

    fn validate(&self, align: usize) -> Result<(), DecodeError> {
        let compression_valid = self.compression == COMP_NONE
            || (self.bit_count == 8 && self.compression == COMP_RLE8)
            || (self.bit_count == 4 && self.compression == COMP_RLE4)
            || self.compression == COMP_BITFIELDS;
        if !compression_valid {
            return Err(DecodeError::InvalidHeader("unsupported compression"));
        }

        let worst_depth = if self.bit_count == 32 { 4 } else { 3 };
        if !img::valid_dimensions(self.width, self.height, worst_depth, align) {
            return Err(DecodeError::DimensionsRejected {
                width: self.width,
                height: self.height,
            });
        }

        if self.clr_used > self.palette_cap() {
            return Err(DecodeError::InvalidHeader("oversized palette"));
        }
        if self.clr_important > self.clr_used {
            return Err(DecodeError::InvalidHeader(
                "more important colors than used colors",
            ));
        }
        Ok(())
    }

    fn palette<'a>(&self, data: &'a [u8]) -> Palette<'a> {
        let begin = PALETTE_OFFSET.min(data.len());
        let end = (self.off_bits as usize).clamp(begin, data.len());
        Palette { data: &data[begin..end] }
    }

    /// Declared pixel-data size; for uncompressed files without one it is
    /// recovered from the declared file size.
    fn image_size_in_bytes(&self) -> u32 {
        if self.size_image != 0 {
            return self.size_image;
        }
        if self.compression == COMP_NONE && self.declared_file_size > self.off_bits {
            return self.declared_file_size - self.off_bits;
        }
        0
    }
}

struct Palette<'a> {
    data: &'a [u8],
}

impl<'a> Palette<'a> {
    /// Entry as BGR bytes; entries are 4 bytes wide in the file.
    fn color(&self, index: u32) -> Result<&'a [u8], DecodeError> {
        let off = index as usize * 4;
        self.data
            .get(off..off + 3)
            .ok_or(DecodeError::InvalidData("palette index out of range"))
    }

    /// First two bytes of an entry, the legacy encoding of a channel mask.
    fn legacy_mask(&self, index: usize) -> Option<u16> {
        let off = index * 4;
        Some(u16::from_le_bytes(
            self.data.get(off..off + 2)?.try_into().ok()?,
        ))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Algo {
    Mono,
    Pal16,
    Pal16Rle4,
    Pal256,
    Pal256Rle8,
    Bits16 { masks: [u16; 4] },
    Color24,
    Color32,
    Color32SkipFirst,
}

impl Algo {
    fn preferred_depth(self) -> u8 {
        match self {
            Algo::Bits16 { masks } if masks[3] != 0 => 4,
            Algo::Color32 | Algo::Color32SkipFirst => 4,
            _ => 3,
        }
    }
}

fn select_algorithm(header: &Header, data: &[u8]) -> Result<Algo, DecodeError> {
    let data_size = (data.len() - header.off_bits as usize) as u32;
    if data_size != header.image_size_in_bytes() {
        return Err(DecodeError::InvalidHeader(
            "pixel data size does not match the declaration",
        ));
    }

    match header.bit_count {
        1 => Ok(Algo::Mono),
        4 => Ok(if header.compression == COMP_NONE {
            Algo::Pal16
        } else {
            Algo::Pal16Rle4
        }),
        8 => Ok(if header.compression == COMP_NONE {
            Algo::Pal256
        } else {
            Algo::Pal256Rle8
        }),
        16 => {
            let masks = if header.compression == COMP_NONE {
                // Fixed 5-5-5 layout.
                [0x1F << 10, 0x1F << 5, 0x1F, 0]
            } else if header.header_size >= HEADER_V3 {
                [
                    header.masks[0] as u16,
                    header.masks[1] as u16,
                    header.masks[2] as u16,
                    header.masks[3] as u16,
                ]
            } else {
                // Legacy convention: masks ride in the first three palette
                // entries, alpha is whatever they leave uncovered.
                let palette = header.palette(data);
                let red = palette
                    .legacy_mask(0)
                    .ok_or(DecodeError::InvalidHeader("missing bitfield masks"))?;
                let green = palette
                    .legacy_mask(1)
                    .ok_or(DecodeError::InvalidHeader("missing bitfield masks"))?;
                let blue = palette
                    .legacy_mask(2)
                    .ok_or(DecodeError::InvalidHeader("missing bitfield masks"))?;
                [red, green, blue, !(red | green | blue)]
            };
            Ok(Algo::Bits16 { masks })
        }
        24 => Ok(Algo::Color24),
        32 => Ok(if header.compression == COMP_BITFIELDS {
            Algo::Color32SkipFirst
        } else {
            Algo::Color32
        }),
        _ => Err(DecodeError::InvalidHeader("unsupported bit count")),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Unpack {
    Complete,
    Truncated,
}

type UnpackResult = Result<Unpack, DecodeError>;

/// Direction-aware destination writer. Bottom-up sources (the positive
/// height convention) write rows from the last buffer row upward; top-down
/// sources write forward. Out-of-bounds writes are dropped and recorded
/// instead of aborting.
struct DestWriter<'a> {
    buf: &'a mut [u8],
    stride: usize,
    depth: usize,
    reversed: bool,
    line_begin: i64,
    line_end: i64,
    pos: i64,
    truncated: bool,
}

impl<'a> DestWriter<'a> {
    fn new(buf: &'a mut [u8], stride: usize, depth: usize, reversed: bool) -> Self {
        let line_begin = if reversed {
            buf.len() as i64 - stride as i64
        } else {
            0
        };
        Self {
            buf,
            stride,
            depth,
            reversed,
            line_begin,
            line_end: line_begin + stride as i64,
            pos: line_begin,
            truncated: false,
        }
    }

    fn write_ok(&self) -> bool {
        self.pos >= 0
            && self.pos >= self.line_begin
            && self.pos + self.depth as i64 <= self.buf.len() as i64
    }

    /// Writes one pixel given as B, G, R (+A) source channels, converting to
    /// the destination depth. `false` once the destination is exhausted.
    fn write_bgra(&mut self, b: u8, g: u8, r: u8, a: u8) -> bool {
        if !self.write_ok() {
            self.truncated = true;
            return false;
        }
        let pos = self.pos as usize;
        match self.depth {
            1 => self.buf[pos] = luma(r, g, b),
            3 => {
                self.buf[pos] = r;
                self.buf[pos + 1] = g;
                self.buf[pos + 2] = b;
            }
            _ => {
                self.buf[pos] = r;
                self.buf[pos + 1] = g;
                self.buf[pos + 2] = b;
                self.buf[pos + 3] = a;
            }
        }
        self.pos += self.depth as i64;
        true
    }

    fn write_bgr(&mut self, bgr: &[u8]) -> bool {
        self.write_bgra(bgr[0], bgr[1], bgr[2], OPAQUE)
    }

    /// Zero-fills the rest of the current row and steps to the next one.
    fn next_line(&mut self) -> bool {
        if !self.complete_line() {
            return false;
        }
        self.iterate_line();
        true
    }

    fn complete_line(&mut self) -> bool {
        while self.pos < self.line_end {
            if self.pos < 0 || self.pos < self.line_begin || self.pos >= self.buf.len() as i64 {
                self.truncated = true;
                return false;
            }
            self.buf[self.pos as usize] = 0;
            self.pos += 1;
        }
        true
    }

    fn iterate_line(&mut self) {
        if self.reversed {
            self.line_begin -= self.stride as i64;
        } else {
            self.line_begin += self.stride as i64;
        }
        self.line_end = self.line_begin + self.stride as i64;
        self.pos = self.line_begin;
    }

    /// RLE delta opcode: moves right by `dx` pixels and down by `dy` rows in
    /// source orientation.
    fn skip(&mut self, dx: u8, dy: u8) {
        let lines = dy as i64 * self.stride as i64;
        let total = lines + dx as i64 * self.depth as i64;
        if self.reversed {
            self.pos -= total;
            self.line_begin -= lines;
        } else {
            self.pos += total;
            self.line_begin += lines;
        }
        self.line_end = self.line_begin + self.stride as i64;
    }

    /// Whether a run of `pixels` pixels stays inside the current row.
    fn fits_in_line(&self, pixels: usize) -> bool {
        let end = self.pos + (pixels * self.depth) as i64;
        self.pos >= self.line_begin && end <= self.line_end
    }

    /// Zero-fills every remaining row (RLE end-of-bitmap).
    fn finish(&mut self) {
        while self.pos >= 0 && self.pos < self.buf.len() as i64 {
            if !self.complete_line() {
                break;
            }
            self.iterate_line();
        }
    }
}

/// Bounds-checked cursor over the encoded pixel section.
struct SrcCursor<'a> {
    data: &'a [u8],
    line: usize,
    pos: usize,
    scanline: usize,
}

impl<'a> SrcCursor<'a> {
    fn new(data: &'a [u8], scanline: usize) -> Self {
        Self {
            data,
            line: 0,
            pos: 0,
            scanline,
        }
    }

    fn line_valid(&self) -> bool {
        self.line < self.data.len()
    }

    fn next_line(&mut self) {
        self.line += self.scanline;
        self.pos = self.line;
    }

    fn take(&mut self, count: usize) -> Option<&'a [u8]> {
        let slice = self.data.get(self.pos..self.pos + count)?;
        self.pos += count;
        Some(slice)
    }

    fn take_u8(&mut self) -> Option<u8> {
        let byte = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn skip(&mut self, count: usize) {
        self.pos = self.pos.saturating_add(count);
    }

    fn has(&self, count: usize) -> bool {
        self.pos + count <= self.data.len()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn exactly_at_end(&self) -> bool {
        self.pos == self.data.len()
    }
}

fn check_source_size(scanline: usize, height: u32, available: usize) -> Result<(), DecodeError> {
    if scanline * height as usize > available {
        Err(DecodeError::Truncated)
    } else {
        Ok(())
    }
}

fn unpack_mono(
    header: &Header,
    src: &[u8],
    palette: &Palette<'_>,
    writer: &mut DestWriter<'_>,
) -> UnpackResult {
    let scanline = align4(header.width.div_ceil(8) as usize);
    check_source_size(scanline, header.height, src.len())?;
    let mut cursor = SrcCursor::new(src, scanline);

    for _ in 0..header.height {
        if !cursor.line_valid() {
            return Err(DecodeError::Truncated);
        }
        let mut x = 0;
        while x < header.width {
            let byte = cursor.take_u8().ok_or(DecodeError::Truncated)?;
            let step = (header.width - x).min(8);
            for bit in 0..step {
                let index = (byte >> (7 - bit)) & 1;
                if !writer.write_bgr(palette.color(index as u32)?) {
                    return Ok(Unpack::Truncated);
                }
            }
            x += step;
        }
        if !writer.next_line() {
            return Ok(Unpack::Truncated);
        }
        cursor.next_line();
    }
    Ok(Unpack::Complete)
}

fn unpack_pal16(
    header: &Header,
    src: &[u8],
    palette: &Palette<'_>,
    writer: &mut DestWriter<'_>,
) -> UnpackResult {
    let scanline = align4(header.width.div_ceil(2) as usize);
    check_source_size(scanline, header.height, src.len())?;
    let mut cursor = SrcCursor::new(src, scanline);

    for _ in 0..header.height {
        if !cursor.line_valid() {
            return Err(DecodeError::Truncated);
        }
        for _ in 0..header.width / 2 {
            let pair = cursor.take_u8().ok_or(DecodeError::Truncated)?;
            if !writer.write_bgr(palette.color((pair >> 4) as u32)?)
                || !writer.write_bgr(palette.color((pair & 0xF) as u32)?)
            {
                return Ok(Unpack::Truncated);
            }
        }
        if header.width % 2 == 1 {
            let pair = cursor.take_u8().ok_or(DecodeError::Truncated)?;
            if !writer.write_bgr(palette.color((pair >> 4) as u32)?) {
                return Ok(Unpack::Truncated);
            }
        }
        if !writer.next_line() {
            return Ok(Unpack::Truncated);
        }
        cursor.next_line();
    }
    Ok(Unpack::Complete)
}

fn unpack_pal256(
    header: &Header,
    src: &[u8],
    palette: &Palette<'_>,
    writer: &mut DestWriter<'_>,
) -> UnpackResult {
    let scanline = align4(header.width as usize);
    check_source_size(scanline, header.height, src.len())?;
    let mut cursor = SrcCursor::new(src, scanline);

    for _ in 0..header.height {
        if !cursor.line_valid() {
            return Err(DecodeError::Truncated);
        }
        for _ in 0..header.width {
            let index = cursor.take_u8().ok_or(DecodeError::Truncated)?;
            if !writer.write_bgr(palette.color(index as u32)?) {
                return Ok(Unpack::Truncated);
            }
        }
        if !writer.next_line() {
            return Ok(Unpack::Truncated);
        }
        cursor.next_line();
    }
    Ok(Unpack::Complete)
}

fn unpack_bits16(
    header: &Header,
    src: &[u8],
    masks: [u16; 4],
    writer: &mut DestWriter<'_>,
) -> UnpackResult {
    let scanline = align4(header.width as usize * 2);
    check_source_size(scanline, header.height, src.len())?;

    let [mask_r, mask_g, mask_b, mask_a] = masks;
    if mask_r == 0 || mask_g == 0 || mask_b == 0 {
        return Err(DecodeError::InvalidData("zero bitfield mask"));
    }
    let has_alpha = mask_a != 0;

    let r_off = mask_r.trailing_zeros();
    let g_off = mask_g.trailing_zeros();
    let b_off = mask_b.trailing_zeros();
    let a_off = if has_alpha { mask_a.trailing_zeros() } else { 0 };

    let r_mult = 255.0 / (mask_r >> r_off) as f64;
    let g_mult = 255.0 / (mask_g >> g_off) as f64;
    let b_mult = 255.0 / (mask_b >> b_off) as f64;
    let a_mult = if has_alpha {
        255.0 / (mask_a >> a_off) as f64
    } else {
        0.0
    };

    let expand = |value: u16, mask: u16, off: u32, mult: f64| -> u8 {
        (((value & mask) >> off) as f64 * mult + 0.5).floor() as u8
    };

    for y in 0..header.height as usize {
        let line = &src[y * scanline..];
        for x in 0..header.width as usize {
            let value = u16::from_le_bytes([line[x * 2], line[x * 2 + 1]]);
            let b = expand(value, mask_b, b_off, b_mult);
            let g = expand(value, mask_g, g_off, g_mult);
            let r = expand(value, mask_r, r_off, r_mult);
            let a = if has_alpha {
                expand(value, mask_a, a_off, a_mult)
            } else {
                OPAQUE
            };
            if !writer.write_bgra(b, g, r, a) {
                return Ok(Unpack::Truncated);
            }
        }
        if !writer.next_line() {
            return Ok(Unpack::Truncated);
        }
    }
    Ok(Unpack::Complete)
}

fn unpack_colorfull(
    header: &Header,
    src: &[u8],
    src_bpp: usize,
    skip_first: bool,
    writer: &mut DestWriter<'_>,
) -> UnpackResult {
    let scanline = align4(header.width as usize * src_bpp);
    check_source_size(scanline, header.height, src.len())?;
    let channel_off = usize::from(skip_first);
    let with_alpha = src_bpp == 4 && !skip_first;

    for y in 0..header.height as usize {
        let line = &src[y * scanline..];
        for x in 0..header.width as usize {
            let px = &line[x * src_bpp + channel_off..];
            let ok = if with_alpha {
                writer.write_bgra(px[0], px[1], px[2], px[3])
            } else {
                writer.write_bgra(px[0], px[1], px[2], OPAQUE)
            };
            if !ok {
                return Ok(Unpack::Truncated);
            }
        }
        if !writer.next_line() {
            return Ok(Unpack::Truncated);
        }
    }
    Ok(Unpack::Complete)
}

// RLE opcodes following a zero count byte.
const RLE_END_OF_LINE: u8 = 0;
const RLE_END_OF_BITMAP: u8 = 1;
const RLE_DELTA: u8 = 2;

fn unpack_rle(
    src: &[u8],
    palette: &Palette<'_>,
    writer: &mut DestWriter<'_>,
    four_bit: bool,
) -> UnpackResult {
    let mut cursor = SrcCursor::new(src, 0);

    while !cursor.at_end() {
        let count = cursor.take_u8().ok_or(DecodeError::Truncated)?;
        if cursor.at_end() {
            return Err(DecodeError::Truncated);
        }

        if count > 0 {
            // Encoded run: one byte repeated as pixels (or nibble pairs).
            let color_byte = cursor.take_u8().ok_or(DecodeError::Truncated)?;
            if !writer.fits_in_line(count as usize) {
                return Err(DecodeError::InvalidData("encoded run overflows the row"));
            }
            if four_bit {
                for i in 0..count {
                    let index = if i % 2 == 0 {
                        color_byte >> 4
                    } else {
                        color_byte & 0xF
                    };
                    if !writer.write_bgr(palette.color(index as u32)?) {
                        return Ok(Unpack::Truncated);
                    }
                }
            } else {
                let bgr = palette.color(color_byte as u32)?;
                for _ in 0..count {
                    if !writer.write_bgr(bgr) {
                        return Ok(Unpack::Truncated);
                    }
                }
            }
            continue;
        }

        let command = cursor.take_u8().ok_or(DecodeError::Truncated)?;
        match command {
            RLE_END_OF_LINE => {
                if !writer.next_line() {
                    return Ok(Unpack::Truncated);
                }
            }
            RLE_END_OF_BITMAP => {
                writer.finish();
                return if cursor.exactly_at_end() {
                    Ok(Unpack::Complete)
                } else {
                    Err(DecodeError::InvalidData("data after end-of-bitmap"))
                };
            }
            RLE_DELTA => {
                let dx = cursor.take_u8().ok_or(DecodeError::Truncated)?;
                let dy = cursor.take_u8().ok_or(DecodeError::Truncated)?;
                writer.skip(dx, dy);
            }
            pixels => {
                // Absolute run: literal pixels, padded to a word boundary.
                let pixels = pixels as usize;
                let src_bytes = if four_bit { pixels.div_ceil(2) } else { pixels };
                if !writer.fits_in_line(pixels) {
                    return Err(DecodeError::InvalidData("absolute run overflows the row"));
                }
                if !cursor.has(src_bytes) {
                    return Err(DecodeError::Truncated);
                }

                if four_bit {
                    let bytes = cursor.take(src_bytes).unwrap();
                    for i in 0..pixels {
                        let byte = bytes[i / 2];
                        let index = if i % 2 == 0 { byte >> 4 } else { byte & 0xF };
                        if !writer.write_bgr(palette.color(index as u32)?) {
                            return Ok(Unpack::Truncated);
                        }
                    }
                } else {
                    let bytes = cursor.take(src_bytes).unwrap();
                    for &index in bytes {
                        if !writer.write_bgr(palette.color(index as u32)?) {
                            return Ok(Unpack::Truncated);
                        }
                    }
                }
                if src_bytes % 2 == 1 {
                    cursor.skip(1);
                }
            }
        }
    }

    // A missing end-of-bitmap marker is common and harmless.
    Ok(Unpack::Complete)
}

impl ImageDecoder for BmpDecoder {
    fn extensions(&self) -> &[&'static str] {
        &["bmp", "dib"]
    }

    fn decode(&self, data: &[u8], options: &DecodeOptions) -> Result<Image, DecodeError> {
        let header = Header::parse(data)?;
        header.validate(options.align)?;
        let algo = select_algorithm(&header, data)?;

        let dst_depth = options.mode.depth().unwrap_or(algo.preferred_depth());
        if !img::valid_dimensions(header.width, header.height, dst_depth, options.align) {
            return Err(DecodeError::DimensionsRejected {
                width: header.width,
                height: header.height,
            });
        }

        let mut image = Image::alloc(header.width, header.height, dst_depth, options.align);
        let stride = image.scanline(true);
        let palette = header.palette(data);
        let src = &data[header.off_bits as usize..];

        let outcome = {
            // Bottom-up files (positive height) fill the buffer from the
            // last row upward.
            let mut writer =
                DestWriter::new(image.data_mut(), stride, dst_depth as usize, !header.top_down);
            match algo {
                Algo::Mono => unpack_mono(&header, src, &palette, &mut writer),
                Algo::Pal16 => unpack_pal16(&header, src, &palette, &mut writer),
                Algo::Pal256 => unpack_pal256(&header, src, &palette, &mut writer),
                Algo::Pal16Rle4 => unpack_rle(src, &palette, &mut writer, true),
                Algo::Pal256Rle8 => unpack_rle(src, &palette, &mut writer, false),
                Algo::Bits16 { masks } => unpack_bits16(&header, src, masks, &mut writer),
                Algo::Color24 => unpack_colorfull(&header, src, 3, false, &mut writer),
                Algo::Color32 => unpack_colorfull(&header, src, 4, false, &mut writer),
                Algo::Color32SkipFirst => unpack_colorfull(&header, src, 4, true, &mut writer),
            }?
        };

        if outcome == Unpack::Truncated {
            log::debug!(
                "bmp pixel data overran {}x{} bounds; remainder zero-filled",
                header.width,
                header.height
            );
            if self.truncation == TruncationPolicy::Fail {
                return Err(DecodeError::Truncated);
            }
        }
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;
    use crate::decoder::DecodeMode;

    struct BmpBuilder {
        width: i32,
        height: i32,
        bit_count: u16,
        compression: u32,
        palette: Vec<[u8; 4]>,
        masks: Option<[u32; 4]>,
        pixels: Vec<u8>,
    }

    impl BmpBuilder {
        fn new(width: i32, height: i32, bit_count: u16) -> Self {
            Self {
                width,
                height,
                bit_count,
                compression: COMP_NONE,
                palette: Vec::new(),
                masks: None,
                pixels: Vec::new(),
            }
        }

        fn compression(mut self, compression: u32) -> Self {
            self.compression = compression;
            self
        }

        fn palette(mut self, entries: &[[u8; 4]]) -> Self {
            self.palette = entries.to_vec();
            self
        }

        fn masks(mut self, masks: [u32; 4]) -> Self {
            self.masks = Some(masks);
            self
        }

        fn pixels(mut self, pixels: &[u8]) -> Self {
            self.pixels = pixels.to_vec();
            self
        }

        fn build(self) -> Vec<u8> {
            let header_size: u32 = if self.masks.is_some() { HEADER_V3 } else { HEADER_V1 };
            let off_bits = FILE_HEADER_LEN as u32 + header_size + self.palette.len() as u32 * 4;
            let file_size = off_bits + self.pixels.len() as u32;

            let mut out = Vec::new();
            out.extend_from_slice(&BMP_MAGIC);
            out.extend_from_slice(&file_size.to_le_bytes());
            out.extend_from_slice(&[0; 4]);
            out.extend_from_slice(&off_bits.to_le_bytes());

            out.extend_from_slice(&header_size.to_le_bytes());
            out.extend_from_slice(&self.width.to_le_bytes());
            out.extend_from_slice(&self.height.to_le_bytes());
            out.extend_from_slice(&1u16.to_le_bytes());
            out.extend_from_slice(&self.bit_count.to_le_bytes());
            out.extend_from_slice(&self.compression.to_le_bytes());
            out.extend_from_slice(&(self.pixels.len() as u32).to_le_bytes());
            out.extend_from_slice(&[0; 8]); // resolution
            out.extend_from_slice(&0u32.to_le_bytes()); // clrUsed
            out.extend_from_slice(&0u32.to_le_bytes()); // clrImportant
            if let Some(masks) = self.masks {
                for mask in masks {
                    out.extend_from_slice(&mask.to_le_bytes());
                }
            }
            for entry in &self.palette {
                out.extend_from_slice(entry);
            }
            out.extend_from_slice(&self.pixels);
            out
        }
    }

    fn decode(data: &[u8]) -> Image {
        BmpDecoder::new()
            .decode(data, &DecodeOptions::default())
            .unwrap()
    }

    #[test]
    fn decodes_24bpp_bottom_up() {
        // Rows in the file are stored bottom first; each row is padded to 4
        // bytes (2 px * 3 = 6 -> 8).
        let pixels = [
            255, 0, 0, 0, 255, 0, 0, 0, // bottom row: blue, green
            0, 0, 255, 255, 255, 255, 0, 0, // top row: red, white
        ];
        let data = BmpBuilder::new(2, 2, 24).pixels(&pixels).build();
        let image = decode(&data);

        assert_eq!((image.width(), image.height(), image.depth()), (2, 2, 3));
        assert_eq!(image.get_pixel(0, 0), Rgba::opaque(255, 0, 0));
        assert_eq!(image.get_pixel(1, 0), Rgba::opaque(255, 255, 255));
        assert_eq!(image.get_pixel(0, 1), Rgba::opaque(0, 0, 255));
        assert_eq!(image.get_pixel(1, 1), Rgba::opaque(0, 255, 0));
    }

    #[test]
    fn top_down_decodes_to_identical_content() {
        let bottom_up = [
            255, 0, 0, 0, 255, 0, 0, 0, //
            0, 0, 255, 255, 255, 255, 0, 0,
        ];
        let top_down = [
            0, 0, 255, 255, 255, 255, 0, 0, //
            255, 0, 0, 0, 255, 0, 0, 0,
        ];
        let first = decode(&BmpBuilder::new(2, 2, 24).pixels(&bottom_up).build());
        let second = decode(&BmpBuilder::new(2, -2, 24).pixels(&top_down).build());
        assert_eq!(first.data(), second.data());
    }

    #[test]
    fn decodes_1bpp_palette() {
        // 8x1, bits 10110000 -> palette 1,0,1,1,0,0,0,0.
        let data = BmpBuilder::new(8, 1, 1)
            .palette(&[[0, 0, 0, 0], [255, 255, 255, 0]])
            .pixels(&[0b1011_0000, 0, 0, 0])
            .build();
        let image = decode(&data);
        let expected = [255u8, 0, 255, 255, 0, 0, 0, 0];
        for (x, &value) in expected.iter().enumerate() {
            assert_eq!(
                image.get_pixel(x as u32, 0),
                Rgba::opaque(value, value, value),
                "pixel {x}"
            );
        }
    }

    #[test]
    fn decodes_4bpp_palette_with_odd_width() {
        let data = BmpBuilder::new(3, 1, 4)
            .palette(&[[0, 0, 0, 0], [0, 0, 255, 0], [0, 255, 0, 0]])
            // Nibbles 1, 2, 1; byte pair padded to a 4-byte row.
            .pixels(&[0x12, 0x10, 0, 0])
            .build();
        let image = decode(&data);
        assert_eq!(image.get_pixel(0, 0), Rgba::opaque(255, 0, 0));
        assert_eq!(image.get_pixel(1, 0), Rgba::opaque(0, 255, 0));
        assert_eq!(image.get_pixel(2, 0), Rgba::opaque(255, 0, 0));
    }

    #[test]
    fn decodes_8bpp_palette() {
        let data = BmpBuilder::new(2, 1, 8)
            .palette(&[[10, 20, 30, 0], [40, 50, 60, 0]])
            .pixels(&[1, 0, 0, 0])
            .build();
        let image = decode(&data);
        assert_eq!(image.get_pixel(0, 0), Rgba::opaque(60, 50, 40));
        assert_eq!(image.get_pixel(1, 0), Rgba::opaque(30, 20, 10));
    }

    #[test]
    fn decodes_16bpp_555() {
        // Red 0x7C00, green 0x03E0, blue 0x001F, white 0x7FFF.
        let pixels = [
            0x00, 0x7C, 0xE0, 0x03, // red, green
            0x1F, 0x00, 0xFF, 0x7F, // blue, white
        ];
        let data = BmpBuilder::new(2, -2, 16).pixels(&pixels).build();
        let image = decode(&data);
        assert_eq!(image.get_pixel(0, 0), Rgba::opaque(255, 0, 0));
        assert_eq!(image.get_pixel(1, 0), Rgba::opaque(0, 255, 0));
        assert_eq!(image.get_pixel(0, 1), Rgba::opaque(0, 0, 255));
        assert_eq!(image.get_pixel(1, 1), Rgba::opaque(255, 255, 255));
    }

    #[test]
    fn decodes_16bpp_565_masks_from_v3_header() {
        // Full green in 5-6-5 is 0x07E0.
        let data = BmpBuilder::new(1, 1, 16)
            .compression(COMP_BITFIELDS)
            .masks([0xF800, 0x07E0, 0x001F, 0])
            .pixels(&[0xE0, 0x07, 0, 0])
            .build();
        let image = decode(&data);
        assert_eq!(image.get_pixel(0, 0), Rgba::opaque(0, 255, 0));
    }

    #[test]
    fn decodes_16bpp_legacy_palette_masks() {
        // V1 header + bitfields: masks ride in the palette. 5-5-5 with the
        // leftover top bit acting as alpha.
        let data = BmpBuilder::new(1, 1, 16)
            .compression(COMP_BITFIELDS)
            .palette(&[
                [0x00, 0x7C, 0, 0], // red mask 0x7C00
                [0xE0, 0x03, 0, 0], // green mask 0x03E0
                [0x1F, 0x00, 0, 0], // blue mask 0x001F
            ])
            .pixels(&[0xFF, 0xFF, 0, 0])
            .build();
        let image = decode(&data);
        assert_eq!(image.depth(), 4);
        assert_eq!(image.get_pixel(0, 0), Rgba::new(255, 255, 255, 255));
    }

    #[test]
    fn decodes_32bpp() {
        let data = BmpBuilder::new(1, 1, 32)
            .pixels(&[10, 20, 30, 200])
            .build();
        let image = decode(&data);
        assert_eq!(image.depth(), 4);
        assert_eq!(image.get_pixel(0, 0), Rgba::new(30, 20, 10, 200));
    }

    #[test]
    fn decodes_32bpp_bitfields_skip_first_byte() {
        let data = BmpBuilder::new(1, -1, 32)
            .compression(COMP_BITFIELDS)
            .pixels(&[99, 10, 20, 30])
            .build();
        let image = decode(&data);
        // First byte skipped, remaining read as B, G, R.
        assert_eq!(image.get_pixel(0, 0), Rgba::new(30, 20, 10, 255));
    }

    #[test]
    fn decodes_rle8() {
        let palette = [[0, 0, 255, 0], [255, 0, 0, 0], [0, 255, 0, 0]];
        // Bottom row: encoded run of two palette[1] pixels, end of line.
        // Top row: absolute run of palette[2] and palette[0], end of bitmap.
        let data = BmpBuilder::new(2, 2, 8)
            .compression(COMP_RLE8)
            .palette(&palette)
            .pixels(&[2, 1, 0, 0, 0, 2, 2, 0, 0, 1])
            .build();
        let image = decode(&data);
        // Bottom row: blue, blue. Top row: green, red.
        assert_eq!(image.get_pixel(0, 1), Rgba::opaque(0, 0, 255));
        assert_eq!(image.get_pixel(1, 1), Rgba::opaque(0, 0, 255));
        assert_eq!(image.get_pixel(0, 0), Rgba::opaque(0, 255, 0));
        assert_eq!(image.get_pixel(1, 0), Rgba::opaque(255, 0, 0));
    }

    #[test]
    fn decodes_rle4() {
        let palette = [[0, 0, 0, 0], [255, 255, 255, 0]];
        // 4x1: encoded run of 4 nibble-alternating pixels 1,0,1,0 then EOB.
        let data = BmpBuilder::new(4, 1, 4)
            .compression(COMP_RLE4)
            .palette(&palette)
            .pixels(&[4, 0x10, 0, 1])
            .build();
        let image = decode(&data);
        let expected = [255u8, 0, 255, 0];
        for (x, &value) in expected.iter().enumerate() {
            assert_eq!(image.get_pixel(x as u32, 0).r, value, "pixel {x}");
        }
    }

    #[test]
    fn rle_delta_skips_pixels_as_zero() {
        let palette = [[0, 0, 0, 0], [255, 255, 255, 0]];
        // 4x1 top-down: one white pixel, delta right 2, one white, EOB.
        let data = BmpBuilder::new(4, -1, 8)
            .compression(COMP_RLE8)
            .palette(&palette)
            .pixels(&[1, 1, 0, 2, 2, 0, 1, 1, 0, 1])
            .build();
        let image = decode(&data);
        assert_eq!(image.get_pixel(0, 0).r, 255);
        assert_eq!(image.get_pixel(1, 0).r, 0);
        assert_eq!(image.get_pixel(2, 0).r, 0);
        assert_eq!(image.get_pixel(3, 0).r, 255);
    }

    #[test]
    fn forced_gray_mode_converts_palette_colors() {
        let data = BmpBuilder::new(1, 1, 8)
            .palette(&[[255, 255, 255, 0]])
            .pixels(&[0, 0, 0, 0])
            .build();
        let options = DecodeOptions {
            mode: DecodeMode::Gray,
            align: 1,
        };
        let image = BmpDecoder::new().decode(&data, &options).unwrap();
        assert_eq!(image.depth(), 1);
        assert_eq!(image.data()[0], 255);
    }

    #[test]
    fn rejects_wrong_magic_and_truncated_header() {
        let decoder = BmpDecoder::new();
        assert!(matches!(
            decoder.decode(b"PNG whatever", &DecodeOptions::default()),
            Err(DecodeError::Unrecognized)
        ));
        assert!(decoder.decode(b"BM\x01\x02", &DecodeOptions::default()).is_err());
    }

    #[test]
    fn rejects_short_pixel_data() {
        let mut data = BmpBuilder::new(2, 2, 24)
            .pixels(&[0; 16])
            .build();
        data.truncate(data.len() - 4);
        assert!(BmpDecoder::new()
            .decode(&data, &DecodeOptions::default())
            .is_err());
    }

    #[test]
    fn rejects_pathological_dimensions() {
        let data = BmpBuilder::new(1_000_000, 1_000_000, 24).pixels(&[0; 8]).build();
        assert!(matches!(
            BmpDecoder::new().decode(&data, &DecodeOptions::default()),
            Err(DecodeError::DimensionsRejected { .. })
        ));
    }

    #[test]
    fn overrun_policy_is_explicit() {
        let palette = [[0, 0, 0, 0], [255, 255, 255, 0]];
        // 1x1 top-down, then an end-of-line and one more pixel: the second
        // write lands outside the declared bounds.
        let pixels = [1u8, 1, 0, 0, 1, 1];
        let tolerant = BmpBuilder::new(1, -1, 8)
            .compression(COMP_RLE8)
            .palette(&palette)
            .pixels(&pixels)
            .build();

        let image = BmpDecoder::new()
            .decode(&tolerant, &DecodeOptions::default())
            .unwrap();
        assert_eq!(image.data()[0], 255);

        assert!(matches!(
            BmpDecoder::with_truncation_policy(TruncationPolicy::Fail)
                .decode(&tolerant, &DecodeOptions::default()),
            Err(DecodeError::Truncated)
        ));
    }

    #[test]
    fn aligned_rows_are_padded() {
        let data = BmpBuilder::new(1, 1, 24).pixels(&[1, 2, 3, 0]).build();
        let options = DecodeOptions {
            mode: DecodeMode::Rgb,
            align: 8,
        };
        let image = BmpDecoder::new().decode(&data, &options).unwrap();
        assert_eq!(image.scanline(true), 8);
        assert_eq!(image.data().len(), 8);
        assert_eq!(&image.data()[..3], &[3, 2, 1]);
    }
}
