// PNG encoding for SDR bitmaps.

use anyhow::Result;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};

use crate::color::SdrBitmap;

/// Encode a BGRA8 bitmap as PNG bytes.
///
/// PNG has no BGRA layout, so channels are swizzled to RGBA before
/// encoding; the output is 8-bit sRGB with no embedded color profile.
pub fn encode_png(bitmap: &SdrBitmap) -> Result<Vec<u8>> {
    let mut rgba = bitmap.pixels.clone();
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }

    let mut out = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut out, CompressionType::Fast, FilterType::Sub);
    encoder.write_image(&rgba, bitmap.width, bitmap.height, ExtendedColorType::Rgba8)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_a_decodable_png_with_swizzled_channels() {
        // A single blue-ish BGRA pixel: B=200, G=100, R=50.
        let bitmap = SdrBitmap {
            width: 1,
            height: 1,
            pixels: vec![200, 100, 50, 255],
        };
        let png = encode_png(&bitmap).unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (1, 1));
        // RGBA in the decoded image.
        assert_eq!(decoded.get_pixel(0, 0).0, [50, 100, 200, 255]);
    }

    #[test]
    fn source_bitmap_is_not_mutated() {
        let pixels = vec![1, 2, 3, 255, 4, 5, 6, 255];
        let bitmap = SdrBitmap {
            width: 2,
            height: 1,
            pixels: pixels.clone(),
        };
        let _ = encode_png(&bitmap).unwrap();
        assert_eq!(bitmap.pixels, pixels);
    }
}
