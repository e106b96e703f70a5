//! Decoding helpers built on the `image` crate.
//!
//! Every decode failure maps to `IconMatchError::InvalidImage`, and so does a
//! successfully decoded image with zero area.

use crate::util::{IconMatchError, IconMatchResult};
use ::image::DynamicImage;
use std::path::Path;

/// File extensions recognized as base or target images.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "bmp"];

/// Returns true if `path` carries one of [`IMAGE_EXTENSIONS`] (case-insensitive).
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Decodes an encoded image buffer (format sniffed from content).
pub fn decode_image(bytes: &[u8]) -> IconMatchResult<DynamicImage> {
    let img = ::image::load_from_memory(bytes)
        .map_err(|err| IconMatchError::invalid_image(err.to_string()))?;
    ensure_area(img)
}

/// Loads an image from disk.
pub fn load_image<P: AsRef<Path>>(path: P) -> IconMatchResult<DynamicImage> {
    let path = path.as_ref();
    let img = ::image::open(path).map_err(|err| {
        IconMatchError::invalid_image(format!("{}: {err}", path.display()))
    })?;
    ensure_area(img)
}

fn ensure_area(img: DynamicImage) -> IconMatchResult<DynamicImage> {
    if img.width() == 0 || img.height() == 0 {
        return Err(IconMatchError::invalid_image("decoded image has zero area"));
    }
    Ok(img)
}
