// scRGB FP16 → BGRA8 tone mapping.
//
// The captured scRGB buffer encodes SDR white at paperWhiteNits / 80 and
// HDR highlights above that. A correct SDR rendition divides by that
// ratio (SDR white returns to 1.0 linear), hard-clips what remains above
// 1.0 exactly as an SDR display would, then applies the sRGB transfer
// and quantizes.

use anyhow::{bail, Result};
use tracing::debug;

use crate::color::white_level::{primary_monitor_sdr_white_nits, DEFAULT_SDR_WHITE_NITS};
use crate::color::SdrBitmap;
use crate::frame::{Frame, PixelFormat};
use crate::pixel::{half_to_float, linear_to_srgb, unorm8};

/// Tone-map a frame into an SDR bitmap, normalizing against the primary
/// monitor's current SDR white level.
///
/// The frame must carry CPU pixels (materialize first). BGRA8 frames pass
/// through unchanged; anything other than BGRA8/RGBA16F fails.
pub fn tone_map(frame: &Frame) -> Result<SdrBitmap> {
    tone_map_with_paper_white(frame, primary_monitor_sdr_white_nits())
}

/// Tone-map against an explicit paper-white level (in nits).
pub fn tone_map_with_paper_white(frame: &Frame, paper_white_nits: f32) -> Result<SdrBitmap> {
    let Some(pixels) = frame.pixels.as_deref() else {
        bail!("tone mapping requires CPU pixels; call materialize_pixels first");
    };
    if pixels.len() != frame.expected_len() {
        bail!(
            "frame buffer size mismatch: got {}, expected {}",
            pixels.len(),
            frame.expected_len()
        );
    }

    match frame.format {
        PixelFormat::Bgra8 => Ok(SdrBitmap {
            width: frame.width,
            height: frame.height,
            pixels: pixels.to_vec(),
        }),
        PixelFormat::Rgba16f => {
            let paper_white = if paper_white_nits > 0.0 {
                paper_white_nits
            } else {
                DEFAULT_SDR_WHITE_NITS
            };
            // scRGB defines 1.0 as 80 nits, so SDR white sits at
            // paperWhite / 80; multiplying by the reciprocal brings it
            // back to 1.0 linear.
            let scale = 80.0 / paper_white;
            debug!(paper_white, scale, "tone-mapping scRGB frame");
            Ok(SdrBitmap {
                width: frame.width,
                height: frame.height,
                pixels: scrgb_to_bgra8(pixels, scale),
            })
        }
    }
}

/// Per-pixel mapping: decode halfs, drop below-black, normalize, clip
/// highlights, sRGB-encode, quantize. Output is BGRA with opaque alpha.
fn scrgb_to_bgra8(src: &[u8], scale: f32) -> Vec<u8> {
    let mut out = vec![0u8; src.len() / 2];

    for (src_px, dst_px) in src.chunks_exact(8).zip(out.chunks_exact_mut(4)) {
        let r = half_to_float(u16::from_le_bytes([src_px[0], src_px[1]]));
        let g = half_to_float(u16::from_le_bytes([src_px[2], src_px[3]]));
        let b = half_to_float(u16::from_le_bytes([src_px[4], src_px[5]]));
        // Alpha is discarded; the desktop is opaque.

        let r = (r.max(0.0) * scale).min(1.0);
        let g = (g.max(0.0) * scale).min(1.0);
        let b = (b.max(0.0) * scale).min(1.0);

        dst_px[0] = unorm8(linear_to_srgb(b));
        dst_px[1] = unorm8(linear_to_srgb(g));
        dst_px[2] = unorm8(linear_to_srgb(r));
        dst_px[3] = 255;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;

    fn scrgb_frame(width: u32, height: u32, rgba: [f32; 4]) -> Frame {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 8);
        for _ in 0..width * height {
            for channel in rgba {
                pixels.extend_from_slice(&f16::from_f32(channel).to_bits().to_le_bytes());
            }
        }
        Frame {
            width,
            height,
            format: PixelFormat::Rgba16f,
            texture: None,
            pixels: Some(pixels),
        }
    }

    fn first_pixel(bitmap: &SdrBitmap) -> [u8; 4] {
        [
            bitmap.pixels[0],
            bitmap.pixels[1],
            bitmap.pixels[2],
            bitmap.pixels[3],
        ]
    }

    #[test]
    fn reference_white_at_80_nits_maps_to_full_scale() {
        let frame = scrgb_frame(2, 2, [1.0, 1.0, 1.0, 1.0]);
        let bitmap = tone_map_with_paper_white(&frame, 80.0).unwrap();
        assert_eq!(first_pixel(&bitmap), [255, 255, 255, 255]);
    }

    #[test]
    fn sdr_white_on_200_nit_desktop_maps_to_full_scale() {
        // At 200 nits paper white, SDR white sits at scRGB 2.5.
        let frame = scrgb_frame(2, 2, [2.5, 2.5, 2.5, 1.0]);
        let bitmap = tone_map_with_paper_white(&frame, 200.0).unwrap();
        assert_eq!(first_pixel(&bitmap), [255, 255, 255, 255]);
    }

    #[test]
    fn hdr_highlight_is_clipped_to_full_scale() {
        let frame = scrgb_frame(2, 2, [5.0, 5.0, 5.0, 1.0]);
        let bitmap = tone_map_with_paper_white(&frame, 200.0).unwrap();
        assert_eq!(first_pixel(&bitmap), [255, 255, 255, 255]);
    }

    #[test]
    fn below_black_is_clamped_to_zero() {
        let frame = scrgb_frame(1, 1, [-0.25, -1.0, -0.001, 1.0]);
        let bitmap = tone_map_with_paper_white(&frame, 80.0).unwrap();
        assert_eq!(first_pixel(&bitmap), [0, 0, 0, 255]);
    }

    #[test]
    fn half_intensity_matches_srgb_encoding() {
        let frame = scrgb_frame(1, 1, [0.5, 0.5, 0.5, 1.0]);
        let bitmap = tone_map_with_paper_white(&frame, 80.0).unwrap();
        let expected = unorm8(linear_to_srgb(0.5));
        assert_eq!(first_pixel(&bitmap), [expected, expected, expected, 255]);
    }

    #[test]
    fn channels_are_swizzled_to_bgra() {
        // Pure red in scRGB must land in the B+2 slot of BGRA.
        let frame = scrgb_frame(1, 1, [1.0, 0.0, 0.0, 1.0]);
        let bitmap = tone_map_with_paper_white(&frame, 80.0).unwrap();
        assert_eq!(first_pixel(&bitmap), [0, 0, 255, 255]);
    }

    #[test]
    fn bgra8_frame_passes_through_byte_for_byte() {
        let pixels: Vec<u8> = (0..4 * 4 * 4).map(|i| i as u8).collect();
        let frame = Frame {
            width: 4,
            height: 4,
            format: PixelFormat::Bgra8,
            texture: None,
            pixels: Some(pixels.clone()),
        };
        let bitmap = tone_map_with_paper_white(&frame, 200.0).unwrap();
        assert_eq!(bitmap.pixels, pixels);
    }

    #[test]
    fn non_positive_paper_white_defaults_to_reference() {
        let frame = scrgb_frame(1, 1, [1.0, 1.0, 1.0, 1.0]);
        let bitmap = tone_map_with_paper_white(&frame, 0.0).unwrap();
        assert_eq!(first_pixel(&bitmap), [255, 255, 255, 255]);
    }

    #[test]
    fn missing_cpu_pixels_fails() {
        let frame = Frame {
            width: 4,
            height: 4,
            format: PixelFormat::Rgba16f,
            texture: None,
            pixels: None,
        };
        assert!(tone_map_with_paper_white(&frame, 80.0).is_err());
    }
}
