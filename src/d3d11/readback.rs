// GPU→CPU readback: populate a frame's CPU pixel buffer from its texture.

use anyhow::{bail, Context, Result};
use windows::Win32::Graphics::Direct3D11::{
    ID3D11DeviceContext, D3D11_CPU_ACCESS_READ, D3D11_MAPPED_SUBRESOURCE, D3D11_MAP_READ,
    D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::DXGI_SAMPLE_DESC;

use crate::frame::Frame;
use crate::pixel;

/// Ensure `frame.pixels` is populated.
///
/// No-op when CPU pixels already exist. Otherwise allocates a staging
/// texture matching the GPU texture, issues a full-resource copy, maps it,
/// and copies rows into a tightly packed buffer. The driver's row pitch
/// may exceed width × bpp due to alignment, so rows are repacked
/// individually. The staging texture is unmapped before returning.
pub fn materialize_pixels(frame: &mut Frame, context: &ID3D11DeviceContext) -> Result<()> {
    if frame.pixels.is_some() {
        return Ok(());
    }
    let Some(texture) = frame.texture.as_ref() else {
        bail!("frame has neither CPU pixels nor a GPU texture");
    };

    // SAFETY: all calls operate on valid COM objects created against the
    // same device; the mapped pointer is only read between Map and Unmap.
    unsafe {
        let mut desc = D3D11_TEXTURE2D_DESC::default();
        texture.GetDesc(&mut desc);

        // Stride comes from the texture's actual format, not the tag.
        let bpp = pixel::bytes_per_pixel(desc.Format) as usize;
        if bpp == 0 {
            bail!("texture format {:?} has no CPU representation", desc.Format);
        }

        let device = context.GetDevice().context("context has no device")?;

        let staging_desc = D3D11_TEXTURE2D_DESC {
            Width: desc.Width,
            Height: desc.Height,
            MipLevels: 1,
            ArraySize: 1,
            Format: desc.Format,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };

        let mut staging = None;
        device
            .CreateTexture2D(&staging_desc, None, Some(&mut staging))
            .context("failed to create staging texture for readback")?;
        let staging = staging.unwrap();

        context.CopyResource(&staging, texture);

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        context
            .Map(&staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
            .context("failed to map staging texture")?;

        let tight_stride = desc.Width as usize * bpp;
        let row_pitch = mapped.RowPitch as usize;

        let mut pixels = vec![0u8; tight_stride * desc.Height as usize];
        let src = mapped.pData as *const u8;
        for row in 0..desc.Height as usize {
            let src_row = std::slice::from_raw_parts(src.add(row * row_pitch), tight_stride);
            pixels[row * tight_stride..(row + 1) * tight_stride].copy_from_slice(src_row);
        }

        context.Unmap(&staging, 0);

        frame.pixels = Some(pixels);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::d3d11::create_device;
    use crate::frame::PixelFormat;
    use windows::Win32::Graphics::Direct3D11::{D3D11_SUBRESOURCE_DATA, D3D11_USAGE_DEFAULT};
    use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_R16G16B16A16_FLOAT;

    /// Readback of a known 2×2 FP16 texture yields tight rows with the
    /// source texels, regardless of the driver's staging pitch.
    #[test]
    fn readback_repacks_rows_tightly() {
        let (device, context) = create_device().unwrap();

        // Solid red: (1.0, 0.0, 0.0, 1.0) per pixel.
        let pixel: [u16; 4] = [0x3C00, 0x0000, 0x0000, 0x3C00];
        let mut init = Vec::new();
        for _ in 0..4 {
            for v in pixel {
                init.extend_from_slice(&v.to_le_bytes());
            }
        }

        let desc = D3D11_TEXTURE2D_DESC {
            Width: 2,
            Height: 2,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_R16G16B16A16_FLOAT,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: 0,
            CPUAccessFlags: 0,
            MiscFlags: 0,
        };
        let subresource = D3D11_SUBRESOURCE_DATA {
            pSysMem: init.as_ptr() as *const _,
            SysMemPitch: 16,
            SysMemSlicePitch: 0,
        };

        // SAFETY: desc and init data are fully initialized.
        let texture = unsafe {
            let mut tex = None;
            device
                .CreateTexture2D(&desc, Some(&subresource), Some(&mut tex))
                .unwrap();
            tex.unwrap()
        };

        let mut frame = Frame {
            width: 2,
            height: 2,
            format: PixelFormat::Rgba16f,
            texture: Some(texture),
            pixels: None,
        };

        materialize_pixels(&mut frame, &context).unwrap();

        let pixels = frame.pixels.as_deref().unwrap();
        assert_eq!(pixels.len(), frame.expected_len());
        // Every pixel should be the red texel.
        for px in pixels.chunks_exact(8) {
            assert_eq!(u16::from_le_bytes([px[0], px[1]]), 0x3C00);
            assert_eq!(u16::from_le_bytes([px[2], px[3]]), 0x0000);
            assert_eq!(u16::from_le_bytes([px[6], px[7]]), 0x3C00);
        }

        // Second call is a no-op.
        materialize_pixels(&mut frame, &context).unwrap();
        assert_eq!(frame.pixels.as_deref().unwrap().len(), frame.expected_len());
    }
}
