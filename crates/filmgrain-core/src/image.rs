//! Image representation for the grain pipeline.
//!
//! Pixels are 8-bit, interleaved and row-major. The buffer length always
//! equals `width × height × channels`; every constructor and mutator keeps
//! that invariant, which is why the fields are private.

use std::fmt;

use crate::error::{FilmGrainError, Result};

/// An owned 8-bit image buffer with 1 (gray), 3 (RGB) or 4 (RGBA) channels.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Image {
    /// Allocate a zero-filled image.
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        let mut image = Self::default();
        image.allocate(width, height, channels);
        image
    }

    /// Allocate an image filled with a single pixel value.
    ///
    /// `pixel` supplies one value per channel; missing entries are zero.
    pub fn filled(width: u32, height: u32, channels: u8, pixel: &[u8]) -> Self {
        let mut image = Self::new(width, height, channels);
        let ch = channels as usize;
        if ch > 0 {
            for px in image.data.chunks_exact_mut(ch) {
                for (dst, src) in px.iter_mut().zip(pixel) {
                    *dst = *src;
                }
            }
        }
        image
    }

    /// Wrap existing pixel data. The length must match the dimensions.
    pub fn from_raw(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        if data.len() != byte_len(width, height, channels) {
            return Err(FilmGrainError::InvalidImage {
                width,
                height,
                channels,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Raw interleaved pixel bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the pixel bytes. The length cannot change.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the image and return its pixel bytes.
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Non-empty dimensions, at least one channel, and pixel data present.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.channels > 0 && !self.data.is_empty()
    }

    /// Returns `Ok(())` for a valid image, the matching error otherwise.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(FilmGrainError::InvalidImage {
                width: self.width,
                height: self.height,
                channels: self.channels,
                len: self.data.len(),
            })
        }
    }

    /// Derived buffer size in bytes.
    pub fn data_size(&self) -> usize {
        byte_len(self.width, self.height, self.channels)
    }

    /// Number of leading channels that carry color (1 for gray, 3 otherwise).
    ///
    /// A fourth channel is alpha and is never touched by tonal or grain
    /// operations.
    pub fn color_channels(&self) -> usize {
        if self.channels >= 3 { 3 } else { 1 }
    }

    /// Channel values of the pixel at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        let offset = self.offset(x, y)?;
        Some(&self.data[offset..offset + self.channels as usize])
    }

    /// Mutable channel values of the pixel at `(x, y)`.
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> Option<&mut [u8]> {
        let offset = self.offset(x, y)?;
        let ch = self.channels as usize;
        Some(&mut self.data[offset..offset + ch])
    }

    /// Write an RGBA value, keeping only as many components as the image has.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if let Some(px) = self.pixel_mut(x, y) {
            for (dst, src) in px.iter_mut().zip(rgba) {
                *dst = src;
            }
        }
    }

    /// Read a pixel as RGBA.
    ///
    /// Gray replicates into R, G and B; missing alpha reads as 255. Outside
    /// the image the result is all zeros.
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let Some(px) = self.pixel(x, y) else {
            return [0; 4];
        };
        match px.len() {
            1 => [px[0], px[0], px[0], 255],
            2 => [px[0], px[0], px[0], px[1]],
            3 => [px[0], px[1], px[2], 255],
            _ => [px[0], px[1], px[2], px[3]],
        }
    }

    /// Reshape to the given dimensions and zero the buffer.
    pub fn allocate(&mut self, width: u32, height: u32, channels: u8) {
        self.width = width;
        self.height = height;
        self.channels = channels;
        self.data.clear();
        self.data.resize(byte_len(width, height, channels), 0);
    }

    /// Nearest-neighbour resample to a new size.
    ///
    /// Returns `false` and leaves the image unchanged when either target
    /// dimension is zero or the image has no pixels to sample from.
    pub fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || !self.is_valid() {
            return false;
        }

        let ch = self.channels as usize;
        let mut resized = vec![0u8; byte_len(width, height, self.channels)];
        for y in 0..height {
            let src_y = (y as u64 * self.height as u64 / height as u64) as u32;
            for x in 0..width {
                let src_x = (x as u64 * self.width as u64 / width as u64) as u32;
                let src = (src_y as usize * self.width as usize + src_x as usize) * ch;
                let dst = (y as usize * width as usize + x as usize) * ch;
                resized[dst..dst + ch].copy_from_slice(&self.data[src..src + ch]);
            }
        }

        self.width = width;
        self.height = height;
        self.data = resized;
        true
    }

    /// Reset to an empty, invalid image.
    pub fn clear(&mut self) {
        self.width = 0;
        self.height = 0;
        self.channels = 0;
        self.data.clear();
    }

    /// Overwrite this image with a copy of `other`, reusing the allocation.
    pub fn copy_from(&mut self, other: &Image) {
        self.width = other.width;
        self.height = other.height;
        self.channels = other.channels;
        self.data.clear();
        self.data.extend_from_slice(&other.data);
    }

    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * self.channels as usize)
    }
}

fn byte_len(width: u32, height: u32, channels: u8) -> usize {
    width as usize * height as usize * channels as usize
}
