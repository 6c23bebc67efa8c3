use image::DynamicImage;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Failed to load image: {0}")]
    Load(#[from] image::ImageError),
    #[error("Failed to encode transformed image: {0}")]
    Encode(String),
    #[error("Image transform worker failed: {0}")]
    Worker(String),
}

/// Decode any supported image and re-encode it as an 8-bit grayscale PNG.
pub fn to_grayscale(data: &[u8]) -> Result<Vec<u8>, TransformError> {
    let img = image::load_from_memory(data)?;
    encode_as_png(DynamicImage::ImageLuma8(img.to_luma8()))
}

/// Decode any supported image and re-encode its colour complement as PNG.
///
/// The image is read as 8-bit RGB (alpha is dropped) and every channel `v`
/// becomes `255 - v`.
pub fn invert(data: &[u8]) -> Result<Vec<u8>, TransformError> {
    let mut rgb = image::load_from_memory(data)?.to_rgb8();
    image::imageops::invert(&mut rgb);
    encode_as_png(DynamicImage::ImageRgb8(rgb))
}

fn encode_as_png(img: DynamicImage) -> Result<Vec<u8>, TransformError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| TransformError::Encode(e.to_string()))?;
    Ok(buf)
}
