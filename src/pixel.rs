// Pure pixel math shared by the tone mapper and the readback/crop helpers.
//
// The half-float decoder is implemented by hand rather than delegated to a
// crate: the capture pipeline depends on its exact IEEE 754 binary16
// behavior (subnormals, signed zeros, inf/NaN), and the tests pin it
// against the `half` crate's reference implementation.

use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_B8G8R8A8_UNORM_SRGB,
    DXGI_FORMAT_R10G10B10A2_UNORM, DXGI_FORMAT_R16G16B16A16_FLOAT, DXGI_FORMAT_R8G8B8A8_UNORM,
};

/// Decode an IEEE 754 binary16 value to f32.
///
/// Subnormal mantissas are normalized iteratively (exponent biased by 113);
/// exponent 31 maps to infinity/NaN with the mantissa carried into the f32
/// payload; both zeros keep their sign.
pub fn half_to_float(h: u16) -> f32 {
    let sign = (u32::from(h) & 0x8000) << 16;
    let exp = (u32::from(h) >> 10) & 0x1F;
    let mant = u32::from(h) & 0x03FF;

    let bits = if exp == 0 {
        if mant == 0 {
            sign
        } else {
            // Subnormal: shift the mantissa up until the implicit bit
            // appears, adjusting the exponent as we go.
            let mut m = mant;
            let mut e = 113u32;
            while m & 0x0400 == 0 {
                m <<= 1;
                e -= 1;
            }
            m &= 0x03FF;
            sign | (e << 23) | (m << 13)
        }
    } else if exp == 31 {
        sign | 0x7F80_0000 | (mant << 13)
    } else {
        sign | ((exp + 112) << 23) | (mant << 13)
    };

    f32::from_bits(bits)
}

/// Linear light in [0, 1] to the sRGB transfer function.
///
/// Undefined for negative inputs; callers clamp first.
pub fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Clamp to [0, 1] and quantize to an 8-bit code, rounding to nearest.
pub fn unorm8(v: f32) -> u8 {
    let c = v.clamp(0.0, 1.0);
    (c * 255.0 + 0.5) as u8
}

/// Bytes per pixel for the DXGI formats the pipeline handles.
///
/// Returns 0 for unrecognized formats; callers must reject those frames.
pub fn bytes_per_pixel(format: DXGI_FORMAT) -> u32 {
    match format {
        DXGI_FORMAT_B8G8R8A8_UNORM
        | DXGI_FORMAT_B8G8R8A8_UNORM_SRGB
        | DXGI_FORMAT_R8G8B8A8_UNORM
        | DXGI_FORMAT_R10G10B10A2_UNORM => 4,
        DXGI_FORMAT_R16G16B16A16_FLOAT => 8,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use half::f16;
    use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_UNKNOWN;

    /// IEEE binary16 corpus: zeros, smallest subnormals, one, the
    /// largest normal, infinities, and a quiet NaN.
    #[test]
    fn half_decode_ieee_corpus() {
        let cases: &[(u16, f32)] = &[
            (0x0000, 0.0),
            (0x8000, -0.0),
            (0x0001, 5.960_464_5e-8),  // +min subnormal
            (0x8001, -5.960_464_5e-8), // -min subnormal
            (0x3C00, 1.0),
            (0xBC00, -1.0),
            (0x7BFF, 65504.0),  // +max normal
            (0xFBFF, -65504.0), // -max normal
        ];
        for &(bits, expected) in cases {
            let got = half_to_float(bits);
            assert_eq!(got, expected, "0x{bits:04X}");
            assert_eq!(
                got.is_sign_negative(),
                expected.is_sign_negative(),
                "sign of 0x{bits:04X}"
            );
        }

        assert_eq!(half_to_float(0x7C00), f32::INFINITY);
        assert_eq!(half_to_float(0xFC00), f32::NEG_INFINITY);
        assert!(half_to_float(0x7E00).is_nan());
    }

    /// Exhaustive cross-check against the `half` crate.
    #[test]
    fn half_decode_matches_reference() {
        for bits in 0..=u16::MAX {
            let got = half_to_float(bits);
            let reference = f16::from_bits(bits).to_f32();
            if reference.is_nan() {
                assert!(got.is_nan(), "0x{bits:04X} should decode to NaN");
            } else {
                assert_eq!(got.to_bits(), reference.to_bits(), "0x{bits:04X}");
            }
        }
    }

    #[test]
    fn srgb_transfer_anchor_points() {
        assert_eq!(linear_to_srgb(0.0), 0.0);
        assert!((linear_to_srgb(1.0) - 1.0).abs() < 1e-5);
        assert!((linear_to_srgb(0.003_130_8) - 0.04045).abs() < 1e-4);
    }

    #[test]
    fn srgb_transfer_is_monotonic() {
        let mut prev = linear_to_srgb(0.0);
        for i in 1..=1000 {
            let cur = linear_to_srgb(i as f32 / 1000.0);
            assert!(cur >= prev, "non-monotonic at step {i}");
            prev = cur;
        }
    }

    /// Quantizing x/255 must reproduce x for every 8-bit code.
    #[test]
    fn unorm8_roundtrip_is_idempotent() {
        for x in 0..=255u32 {
            assert_eq!(unorm8(x as f32 / 255.0), x as u8);
        }
    }

    #[test]
    fn unorm8_clamps_out_of_range() {
        assert_eq!(unorm8(-0.5), 0);
        assert_eq!(unorm8(2.0), 255);
    }

    #[test]
    fn bytes_per_pixel_table() {
        assert_eq!(bytes_per_pixel(DXGI_FORMAT_B8G8R8A8_UNORM), 4);
        assert_eq!(bytes_per_pixel(DXGI_FORMAT_R8G8B8A8_UNORM), 4);
        assert_eq!(bytes_per_pixel(DXGI_FORMAT_R10G10B10A2_UNORM), 4);
        assert_eq!(bytes_per_pixel(DXGI_FORMAT_R16G16B16A16_FLOAT), 8);
        assert_eq!(bytes_per_pixel(DXGI_FORMAT_UNKNOWN), 0);
    }
}
