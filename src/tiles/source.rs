use crate::core::constants::BYTES_PER_PIXEL;
use crate::{PyramidError, Result};

/// Decoded RGBA8 pixels of one tile
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Wraps tightly packed RGBA8 rows
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(Box::new(PyramidError::Decode(format!(
                "pixel buffer is {} bytes, {}x{} RGBA needs {}",
                data.len(),
                width,
                height,
                expected
            ))));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A buffer filled with one color
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * BYTES_PER_PIXEL)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Terminal result of decoding a tile
#[derive(Debug, Clone, PartialEq)]
pub enum TileDecodeResult {
    Pixels(PixelBuffer),
    /// The tile does not exist or could not be decoded
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_buffer_size_check() {
        assert!(PixelBuffer::new(2, 2, vec![0; 16]).is_ok());
        assert!(PixelBuffer::new(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn test_solid() {
        let buf = PixelBuffer::solid(2, 1, [1, 2, 3, 4]);
        assert_eq!(buf.data, vec![1, 2, 3, 4, 1, 2, 3, 4]);
        assert_eq!(buf.byte_len(), 8);
    }
}
