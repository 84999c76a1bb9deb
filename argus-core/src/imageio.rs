//! Still-image decode/encode between files or byte buffers and BGR
//! frames. JPEG, PNG, BMP, TIFF, and WebP are accepted.

use std::path::Path;

use image::ImageReader;

use argus_model::Frame;

use crate::error::{EngineError, Result};

fn to_frame(image: image::DynamicImage) -> Result<Frame> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    for pixel in rgb.pixels() {
        data.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
    }
    Frame::from_bgr(width, height, data).map_err(Into::into)
}

/// Decode an image file into a BGR frame.
pub fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path)?;
    to_frame(image)
}

/// Decode an in-memory image (uploaded bytes) into a BGR frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let reader = ImageReader::new(std::io::Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EngineError::InvalidInput(format!("unreadable image bytes: {e}")))?;
    to_frame(reader.decode()?)
}

/// Encode a BGR frame as JPEG at the given path.
pub fn save_frame_jpeg(frame: &Frame, path: &Path) -> Result<()> {
    let (width, height) = (frame.width(), frame.height());
    let mut rgb = image::RgbImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let [b, g, r] = frame.pixel(x, y);
            rgb.put_pixel(x, y, image::Rgb([r, g, b]));
        }
    }
    rgb.save(path)?;
    Ok(())
}
