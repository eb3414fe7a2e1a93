// End-to-end tone-mapping scenarios over fabricated frames.

#![cfg(windows)]

use half::f16;
use scrgbshot::{tone_map_with_paper_white, Frame, PixelFormat, Rect};

/// Build an RGBA16F frame filled with one color, with a rectangular patch
/// of another color.
fn scrgb_frame_with_patch(
    width: u32,
    height: u32,
    base: [f32; 3],
    patch: [f32; 3],
    patch_rect: Rect,
) -> Frame {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 8);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let rgb = if patch_rect.contains(x, y) { patch } else { base };
            for channel in rgb {
                pixels.extend_from_slice(&f16::from_f32(channel).to_bits().to_le_bytes());
            }
            pixels.extend_from_slice(&f16::from_f32(1.0).to_bits().to_le_bytes());
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

fn pixel_at(bitmap: &scrgbshot::SdrBitmap, x: u32, y: u32) -> [u8; 4] {
    let off = ((y * bitmap.width + x) * 4) as usize;
    bitmap.pixels[off..off + 4].try_into().unwrap()
}

/// An HDR desktop at 200 nits paper white: the SDR-white patch (scRGB 2.5)
/// must map to full scale, and mid-gray content must stay mid-gray.
#[test]
fn hdr_desktop_white_patch_maps_to_full_scale() {
    let frame = scrgb_frame_with_patch(
        64,
        64,
        [0.5, 0.5, 0.5],
        [2.5, 2.5, 2.5],
        Rect::new(16, 16, 48, 48),
    );
    let bitmap = tone_map_with_paper_white(&frame, 200.0).unwrap();

    assert_eq!(pixel_at(&bitmap, 32, 32), [255, 255, 255, 255]);

    // Outside the patch: 0.5 scRGB at 200-nit paper white is 0.2 linear.
    let expected = {
        let linear: f32 = 0.5 * 80.0 / 200.0;
        let srgb = 1.055 * linear.powf(1.0 / 2.4) - 0.055;
        (srgb * 255.0 + 0.5) as u8
    };
    let got = pixel_at(&bitmap, 0, 0);
    for channel in &got[..3] {
        assert!(
            channel.abs_diff(expected) <= 1,
            "expected ~{expected}, got {channel}"
        );
    }
    assert_eq!(got[3], 255);
}

/// Highlights brighter than SDR white clip to the same full scale.
#[test]
fn hdr_highlight_clips_like_an_sdr_display() {
    let frame = scrgb_frame_with_patch(
        8,
        8,
        [2.5, 2.5, 2.5],
        [5.0, 5.0, 5.0],
        Rect::new(0, 0, 4, 8),
    );
    let bitmap = tone_map_with_paper_white(&frame, 200.0).unwrap();
    assert_eq!(pixel_at(&bitmap, 0, 0), pixel_at(&bitmap, 7, 7));
    assert_eq!(pixel_at(&bitmap, 0, 0), [255, 255, 255, 255]);
}

/// Scenario: region selection over a BGRA8 checkerboard. Cropping and
/// tone-mapping must reproduce the source sub-rectangle bit-exactly.
#[test]
fn checkerboard_region_crop_is_bit_exact() {
    let (width, height) = (1920u32, 1080u32);
    let mut pixels = vec![0u8; (width * height * 4) as usize];
    for y in 0..height {
        for x in 0..width {
            let off = ((y * width + x) * 4) as usize;
            let on = (x / 8 + y / 8) % 2 == 0;
            let v = if on { 0xE0 } else { 0x20 };
            pixels[off] = v;
            pixels[off + 1] = v;
            pixels[off + 2] = v;
            pixels[off + 3] = 255;
        }
    }
    let frame = Frame {
        width,
        height,
        format: PixelFormat::Bgra8,
        texture: None,
        pixels: Some(pixels.clone()),
    };

    let cropped = frame.crop(Rect::new(10, 10, 110, 110)).unwrap();
    assert_eq!((cropped.width, cropped.height), (100, 100));

    let bitmap = tone_map_with_paper_white(&cropped, 80.0).unwrap();
    assert_eq!((bitmap.width, bitmap.height), (100, 100));

    // Compare against the source sub-rectangle row by row.
    for row in 0..100usize {
        let src_off = ((10 + row) * width as usize + 10) * 4;
        let dst_off = row * 100 * 4;
        assert_eq!(
            &bitmap.pixels[dst_off..dst_off + 400],
            &pixels[src_off..src_off + 400],
            "row {row} differs"
        );
    }
}

/// Tone-mapped output always has stride width × 4 with opaque alpha.
#[test]
fn output_is_tightly_packed_opaque_bgra() {
    let frame = scrgb_frame_with_patch(33, 7, [0.1, 0.2, 0.3], [0.1, 0.2, 0.3], Rect::default());
    let bitmap = tone_map_with_paper_white(&frame, 80.0).unwrap();
    assert_eq!(bitmap.pixels.len(), 33 * 7 * 4);
    assert!(bitmap.pixels.chunks_exact(4).all(|px| px[3] == 255));
}
