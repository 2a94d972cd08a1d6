//! Image validation for uploaded frames.
//!
//! The payload is fully decoded, not just sniffed, so a frame with an intact
//! header but missing scan data is rejected.

use crate::error::IngestError;
use image::{GenericImageView, ImageFormat, ImageReader};
use std::io::Cursor;

/// Dimensions and container format of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

impl ImageInfo {
    /// Upper-case container name, e.g. `JPEG`.
    pub fn format_tag(&self) -> String {
        match self.format {
            ImageFormat::Jpeg => "JPEG".to_string(),
            ImageFormat::Png => "PNG".to_string(),
            ImageFormat::Bmp => "BMP".to_string(),
            ImageFormat::Gif => "GIF".to_string(),
            other => format!("{:?}", other).to_uppercase(),
        }
    }

    /// File extension used when the frame is written to disk.
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }

    /// `WIDTHxHEIGHT`
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Decode `bytes` and report what they contain.
pub fn probe(bytes: &[u8]) -> Result<ImageInfo, IngestError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| IngestError::DecodeFailure(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| IngestError::DecodeFailure("unrecognized image format".to_string()))?;

    let image = reader
        .decode()
        .map_err(|e| IngestError::DecodeFailure(e.to_string()))?;
    let (width, height) = image.dimensions();

    Ok(ImageInfo {
        width,
        height,
        format,
    })
}

/// Encode a black `width`x`height` frame in `format`.
#[cfg(test)]
pub(crate) fn encode_test_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode test image");
    buf
}
