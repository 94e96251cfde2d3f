//! Image format plugins and the format-sniffing registry.
//!
//! `decode(ext, bytes)` first tries the decoder registered for the
//! extension, then probes every other registered decoder in registration
//! order; each plugin validates magic bytes before committing, so probing
//! files with wrong or missing extensions is safe.

mod bmp;
mod jpeg;
mod png;

pub use bmp::{BmpDecoder, TruncationPolicy};
pub use jpeg::JpegDecoder;
pub use png::PngDecoder;

use std::collections::HashMap;

use thiserror::Error;

use crate::img::{self, Image};

/// Target pixel format requested from decoders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// Keep the format closest to the encoded data.
    #[default]
    AsIs,
    Gray,
    Rgb,
    Rgba,
}

impl DecodeMode {
    /// Byte depth for a fixed mode, `None` for [`DecodeMode::AsIs`].
    pub fn depth(self) -> Option<u8> {
        match self {
            DecodeMode::AsIs => None,
            DecodeMode::Gray => Some(1),
            DecodeMode::Rgb => Some(3),
            DecodeMode::Rgba => Some(4),
        }
    }
}

/// Preferences propagated from the registry to every plugin.
#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    pub mode: DecodeMode,
    /// Row alignment of produced images, in bytes.
    pub align: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            mode: DecodeMode::AsIs,
            align: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized image format")]
    Unrecognized,
    #[error("truncated image data")]
    Truncated,
    #[error("invalid image header: {0}")]
    InvalidHeader(&'static str),
    #[error("invalid image data: {0}")]
    InvalidData(&'static str),
    #[error("image dimensions rejected: {width}x{height}")]
    DimensionsRejected { width: u32, height: u32 },
    #[error("codec error: {0}")]
    Codec(String),
}

pub trait ImageDecoder {
    /// Preferred file extensions, lowercase, without the dot.
    fn extensions(&self) -> &[&'static str];

    fn decode(&self, data: &[u8], options: &DecodeOptions) -> Result<Image, DecodeError>;
}

/// Explicitly constructed decoder registry; nothing is process-global, so
/// independent book sessions never share mutable state.
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn ImageDecoder>>,
    by_ext: HashMap<String, usize>,
    options: DecodeOptions,
}

impl DecoderRegistry {
    pub fn new(options: DecodeOptions) -> Self {
        Self {
            decoders: Vec::new(),
            by_ext: HashMap::new(),
            options,
        }
    }

    /// Registry with the built-in BMP, JPEG and PNG plugins.
    pub fn with_default_decoders(options: DecodeOptions) -> Self {
        let mut registry = Self::new(options);
        registry.register(Box::new(BmpDecoder::new()));
        registry.register(Box::new(JpegDecoder::new()));
        registry.register(Box::new(PngDecoder::new()));
        registry
    }

    pub fn register(&mut self, decoder: Box<dyn ImageDecoder>) {
        let index = self.decoders.len();
        for ext in decoder.extensions() {
            self.by_ext.insert(ext.to_ascii_lowercase(), index);
        }
        self.decoders.push(decoder);
    }

    pub fn unregister_extension(&mut self, ext: &str) {
        self.by_ext.remove(&ext.to_ascii_lowercase());
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Decodes `data`, trying the extension match first and then probing
    /// every other registered decoder.
    pub fn decode(&self, ext: &str, data: &[u8]) -> Result<Image, DecodeError> {
        let preferred = self.by_ext.get(&ext.to_ascii_lowercase()).copied();

        if let Some(index) = preferred {
            match self.decoders[index].decode(data, &self.options) {
                Ok(image) => return Ok(image),
                Err(err) => log::debug!("decoder for '{ext}' failed: {err}"),
            }
        }

        for (index, decoder) in self.decoders.iter().enumerate() {
            if Some(index) == preferred {
                continue;
            }
            match decoder.decode(data, &self.options) {
                Ok(image) => return Ok(image),
                Err(DecodeError::Unrecognized) => {}
                Err(err) => log::debug!("probing decoder {index} failed: {err}"),
            }
        }

        Err(DecodeError::Unrecognized)
    }
}

/// Copies a decoded `image` crate buffer into an [`Image`] honoring the
/// registry's alignment and color-mode preferences.
pub(crate) fn dynamic_to_image(
    decoded: image::DynamicImage,
    options: &DecodeOptions,
) -> Result<Image, DecodeError> {
    use image::DynamicImage;

    let width = decoded.width();
    let height = decoded.height();

    let target_depth = options.mode.depth().unwrap_or(match decoded {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) => 1,
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLumaA16(_)
        | DynamicImage::ImageRgba8(_)
        | DynamicImage::ImageRgba16(_)
        | DynamicImage::ImageRgba32F(_) => 4,
        _ => 3,
    });

    if !img::valid_dimensions(width, height, target_depth, options.align) {
        return Err(DecodeError::DimensionsRejected { width, height });
    }

    let mut result = Image::alloc(width, height, target_depth, options.align);
    let packed = result.scanline(false);
    let stride = result.scanline(true);

    match target_depth {
        1 => copy_rows(result.data_mut(), &decoded.into_luma8(), packed, stride),
        3 => copy_rows(result.data_mut(), &decoded.into_rgb8(), packed, stride),
        4 => copy_rows(result.data_mut(), &decoded.into_rgba8(), packed, stride),
        _ => unreachable!(),
    }
    Ok(result)
}

fn copy_rows<P>(
    dst: &mut [u8],
    src: &image::ImageBuffer<P, Vec<u8>>,
    packed: usize,
    stride: usize,
) where
    P: image::Pixel<Subpixel = u8>,
{
    let raw = src.as_raw();
    for y in 0..src.height() as usize {
        dst[y * stride..y * stride + packed].copy_from_slice(&raw[y * packed..(y + 1) * packed]);
    }
}
