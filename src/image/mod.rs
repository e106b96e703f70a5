//! Image views, decoding and canonicalization.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride;
//! correlation kernels scan over it. The stride counts elements between the
//! starts of consecutive rows, so a stride larger than the width represents
//! padded rows.
//!
//! Everything that enters a matcher first passes through [`ImageNormalizer`],
//! which brings it to the canonical size and color mode the matchers expect.

use crate::util::{IconMatchError, IconMatchResult};

pub mod io;
mod normalize;
pub mod pyramid;
pub(crate) mod resize;

pub use normalize::{
    strip_background, CanonicalSize, ImageNormalizer, NormalizeConfig, NormalizeMode,
    NormalizedImage, BACKGROUND_COLOR,
};
pub use resize::{resize_area_gray, resize_area_rgb};

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> IconMatchResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> IconMatchResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(IconMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the backing slice including any row padding.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }
}

impl<'a> ImageView<'a, u8> {
    /// Borrows a grayscale buffer from the `image` crate.
    pub fn from_gray(img: &'a ::image::GrayImage) -> IconMatchResult<Self> {
        Self::from_slice(img.as_raw(), img.width() as usize, img.height() as usize)
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> IconMatchResult<usize> {
    if width == 0 || height == 0 {
        return Err(IconMatchError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(IconMatchError::InvalidDimensions { width, height });
    }
    let needed = (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(IconMatchError::InvalidDimensions { width, height })?;
    Ok(needed)
}
