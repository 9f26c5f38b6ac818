//! CPU-side RGBA pixel buffers.

use crate::{GpuError, Resolution};

/// A tightly packed RGBA8 image in CPU memory.
///
/// Camera frames arrive as [`PixelBuffer`]s, and render targets are read back into one when the
/// detector, the photo capture, or the recorder needs their contents.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    resolution: Resolution,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wraps existing RGBA8 pixel data.
    ///
    /// Returns an error if `data` is not exactly `width * height * 4` bytes long.
    pub fn new(resolution: Resolution, data: Vec<u8>) -> Result<Self, GpuError> {
        if data.len() != resolution.num_pixels() * 4 {
            return Err(GpuError::BufferSize {
                len: data.len(),
                resolution,
            });
        }
        Ok(Self { resolution, data })
    }

    /// Creates a buffer filled with a single RGBA color.
    pub fn filled(resolution: Resolution, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(resolution.num_pixels() * 4)
            .collect();
        Self { resolution, data }
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns the RGBA value of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        assert!(x < self.resolution.width() && y < self.resolution.height());
        let i = (y as usize * self.resolution.width() as usize + x as usize) * 4;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// Sets the alpha channel of every pixel to 255.
    pub fn make_opaque(&mut self) {
        for px in self.data.chunks_exact_mut(4) {
            px[3] = 255;
        }
    }

    /// Mirrors the image around its vertical axis.
    pub fn mirror_horizontally(&mut self) {
        let row_len = self.resolution.width() as usize * 4;
        if row_len == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(row_len) {
            let width = row.len() / 4;
            for x in 0..width / 2 {
                let (l, r) = (x * 4, (width - 1 - x) * 4);
                for c in 0..4 {
                    row.swap(l + c, r + c);
                }
            }
        }
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        let err = PixelBuffer::new(Resolution::new(2, 2), vec![0; 15]).unwrap_err();
        assert!(matches!(err, GpuError::BufferSize { len: 15, .. }));
    }

    #[test]
    fn opaque_and_mirror() {
        let data = vec![
            1, 0, 0, 0, //
            2, 0, 0, 10, //
            3, 0, 0, 20, //
        ];
        let mut buf = PixelBuffer::new(Resolution::new(3, 1), data).unwrap();
        buf.make_opaque();
        buf.mirror_horizontally();
        assert_eq!(buf.pixel(0, 0), [3, 0, 0, 255]);
        assert_eq!(buf.pixel(1, 0), [2, 0, 0, 255]);
        assert_eq!(buf.pixel(2, 0), [1, 0, 0, 255]);
    }
}
