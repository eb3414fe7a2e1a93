// Toast-notification thumbnail: the capture scaled to a 360-pixel longest
// edge, written to a fixed temp path the host's toast layer knows about.

use std::path::PathBuf;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::RgbaImage;
use tracing::debug;

use crate::color::SdrBitmap;

/// Longest edge of the thumbnail.
const MAX_EDGE: u32 = 360;

/// Fixed basename under the process temp directory.
const BASENAME: &str = "scrgbshot_thumb.png";

/// Deterministic thumbnail location for the host's toast layer.
pub fn thumbnail_path() -> PathBuf {
    std::env::temp_dir().join(BASENAME)
}

/// Thumbnail dimensions: longest edge capped at 360, aspect preserved,
/// neither dimension below 1.
pub fn thumbnail_dimensions(width: u32, height: u32) -> (u32, u32) {
    let (mut w, mut h) = (width, height);
    if w > MAX_EDGE || h > MAX_EDGE {
        if w >= h {
            h = h * MAX_EDGE / w;
            w = MAX_EDGE;
        } else {
            w = w * MAX_EDGE / h;
            h = MAX_EDGE;
        }
    }
    (w.max(1), h.max(1))
}

/// Scale the bitmap down and write it to the temp path, deleting any stale
/// thumbnail from a previous capture first.
pub fn write_thumbnail(bitmap: &SdrBitmap) -> Result<PathBuf> {
    let path = thumbnail_path();
    let _ = std::fs::remove_file(&path);

    let mut rgba = bitmap.pixels.clone();
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    let full = RgbaImage::from_raw(bitmap.width, bitmap.height, rgba)
        .context("bitmap dimensions do not match pixel buffer")?;

    let (w, h) = thumbnail_dimensions(bitmap.width, bitmap.height);
    let thumb = image::imageops::resize(&full, w, h, FilterType::Triangle);
    thumb
        .save(&path)
        .with_context(|| format!("failed to write thumbnail to {}", path.display()))?;

    debug!(path = %path.display(), width = w, height = h, "thumbnail written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_caps_width_at_360() {
        assert_eq!(thumbnail_dimensions(1920, 1080), (360, 202));
    }

    #[test]
    fn portrait_caps_height_at_360() {
        assert_eq!(thumbnail_dimensions(1080, 1920), (202, 360));
    }

    #[test]
    fn small_images_are_not_upscaled() {
        assert_eq!(thumbnail_dimensions(100, 50), (100, 50));
    }

    #[test]
    fn extreme_aspect_never_reaches_zero() {
        assert_eq!(thumbnail_dimensions(10000, 10), (360, 1));
        assert_eq!(thumbnail_dimensions(10, 10000), (1, 360));
    }

    #[test]
    fn write_uses_the_fixed_temp_path() {
        let bitmap = SdrBitmap {
            width: 4,
            height: 4,
            pixels: vec![128; 64],
        };
        // Two writes in a row target the same deterministic path.
        let first = write_thumbnail(&bitmap).unwrap();
        let second = write_thumbnail(&bitmap).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, thumbnail_path());
    }
}
