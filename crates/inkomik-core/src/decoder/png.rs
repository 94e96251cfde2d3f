//! PNG plugin wrapping the `image` crate's codec, decoding straight from
//! memory.

use std::io::Cursor;

use crate::img::Image;

use super::{dynamic_to_image, DecodeError, DecodeOptions, ImageDecoder};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Default)]
pub struct PngDecoder;

impl PngDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl ImageDecoder for PngDecoder {
    fn extensions(&self) -> &[&'static str] {
        &["png", "x-png"]
    }

    fn decode(&self, data: &[u8], options: &DecodeOptions) -> Result<Image, DecodeError> {
        if !data.starts_with(&PNG_SIGNATURE) {
            return Err(DecodeError::Unrecognized);
        }

        let codec = image::codecs::png::PngDecoder::new(Cursor::new(data))
            .map_err(|err| DecodeError::Codec(err.to_string()))?;
        let decoded = image::DynamicImage::from_decoder(codec)
            .map_err(|err| DecodeError::Codec(err.to_string()))?;
        dynamic_to_image(decoded, options)
    }
}
