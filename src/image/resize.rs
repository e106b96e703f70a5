//! Area-averaging resize for `u8` images.
//!
//! Each destination pixel is the coverage-weighted mean of the source pixels
//! its footprint overlaps, so fractional scale factors keep every source pixel
//! contributing. Enlargement falls back to a triangle filter, since area
//! averaging degenerates to nearest-neighbour there.

use ::image::imageops::{self, FilterType};
use ::image::{GrayImage, ImageBuffer, Pixel, RgbImage};

/// Source footprint of one destination index: `(source index, weight)` pairs.
type Footprint = Vec<(usize, f32)>;

fn axis_footprints(src_len: usize, dst_len: usize) -> Vec<Footprint> {
    let scale = src_len as f64 / dst_len as f64;
    let mut out = Vec::with_capacity(dst_len);
    for d in 0..dst_len {
        let start = d as f64 * scale;
        let end = ((d + 1) as f64 * scale).min(src_len as f64);
        let first = start.floor() as usize;
        let last = (end.ceil() as usize).min(src_len);
        let mut taps = Vec::with_capacity(last.saturating_sub(first));
        for s in first..last {
            let lo = start.max(s as f64);
            let hi = end.min((s + 1) as f64);
            let w = hi - lo;
            if w > 1e-9 {
                taps.push((s, (w / scale) as f32));
            }
        }
        out.push(taps);
    }
    out
}

fn resize_area_raw(
    src: &[u8],
    src_w: usize,
    src_h: usize,
    channels: usize,
    dst_w: usize,
    dst_h: usize,
) -> Vec<u8> {
    let xs = axis_footprints(src_w, dst_w);
    let ys = axis_footprints(src_h, dst_h);
    let mut dst = vec![0u8; dst_w * dst_h * channels];
    let mut acc = vec![0f32; channels];

    for (dy, ytaps) in ys.iter().enumerate() {
        for (dx, xtaps) in xs.iter().enumerate() {
            acc.iter_mut().for_each(|a| *a = 0.0);
            for &(sy, wy) in ytaps {
                let row = sy * src_w * channels;
                for &(sx, wx) in xtaps {
                    let w = wx * wy;
                    let base = row + sx * channels;
                    for (c, a) in acc.iter_mut().enumerate() {
                        *a += w * src[base + c] as f32;
                    }
                }
            }
            let out = (dy * dst_w + dx) * channels;
            for (c, a) in acc.iter().enumerate() {
                dst[out + c] = a.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    dst
}

fn resize_buffer<P>(
    img: &ImageBuffer<P, Vec<u8>>,
    width: u32,
    height: u32,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    if img.width() == width && img.height() == height {
        return img.clone();
    }
    if width > img.width() || height > img.height() {
        return imageops::resize(img, width, height, FilterType::Triangle);
    }
    let channels = usize::from(P::CHANNEL_COUNT);
    let data = resize_area_raw(
        img.as_raw(),
        img.width() as usize,
        img.height() as usize,
        channels,
        width as usize,
        height as usize,
    );
    // Length is dst_w * dst_h * channels by construction.
    ImageBuffer::from_raw(width, height, data)
        .unwrap_or_else(|| ImageBuffer::new(width, height))
}

/// Resizes a grayscale image with area averaging.
pub fn resize_area_gray(img: &GrayImage, width: u32, height: u32) -> GrayImage {
    resize_buffer(img, width, height)
}

/// Resizes an RGB image with area averaging.
pub fn resize_area_rgb(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    resize_buffer(img, width, height)
}
