use std::fmt;

use crate::error::{ModelError, Result};

/// A raw 3-channel image, 8-bit samples in blue-green-red channel order.
///
/// Frames are owned by the pipeline call that produced them; detectors read
/// them by reference and never retain one beyond the call.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap an interleaved BGR buffer. The buffer length must be
    /// exactly `width * height * 3`.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(ModelError::InvalidFrame(format!(
                "buffer length {} does not match {}x{}x3 = {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Frame {
            width,
            height,
            data,
        })
    }

    /// Solid-color frame, mostly useful for tests and synthetic inputs.
    pub fn filled(width: u32, height: u32, b: u8, g: u8, r: u8) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&[b, g, r]);
        }
        Frame {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Interleaved BGR bytes, row-major.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// One row of interleaved BGR bytes.
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * 3;
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    /// BGR triple at (x, y). Callers must stay in bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, bgr: [u8; 3]) {
        let i = (y as usize * self.width as usize + x as usize) * 3;
        self.data[i..i + 3].copy_from_slice(&bgr);
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::from_bgr(4, 4, vec![0; 47]).is_err());
        assert!(Frame::from_bgr(4, 4, vec![0; 48]).is_ok());
    }

    #[test]
    fn pixel_access() {
        let mut frame = Frame::filled(3, 2, 1, 2, 3);
        assert_eq!(frame.pixel(2, 1), [1, 2, 3]);
        frame.set_pixel(0, 0, [9, 8, 7]);
        assert_eq!(frame.pixel(0, 0), [9, 8, 7]);
        assert_eq!(frame.row(0).len(), 9);
    }
}
