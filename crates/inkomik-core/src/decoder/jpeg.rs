//! JPEG plugin wrapping the `image` crate's baseline/progressive codec,
//! decoding straight from memory.

use std::io::Cursor;

use crate::img::Image;

use super::{dynamic_to_image, DecodeError, DecodeOptions, ImageDecoder};

const SOI_MARKER: [u8; 2] = [0xFF, 0xD8];

#[derive(Default)]
pub struct JpegDecoder;

impl JpegDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl ImageDecoder for JpegDecoder {
    fn extensions(&self) -> &[&'static str] {
        &["jpeg", "jpg", "jpe", "pjpe", "pjpeg", "pjpg"]
    }

    fn decode(&self, data: &[u8], options: &DecodeOptions) -> Result<Image, DecodeError> {
        if !data.starts_with(&SOI_MARKER) {
            return Err(DecodeError::Unrecognized);
        }

        let codec = image::codecs::jpeg::JpegDecoder::new(Cursor::new(data))
            .map_err(|err| DecodeError::Codec(err.to_string()))?;
        let decoded = image::DynamicImage::from_decoder(codec)
            .map_err(|err| DecodeError::Codec(err.to_string()))?;
        dynamic_to_image(decoded, options)
    }
}
