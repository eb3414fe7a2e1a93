// Persistent desktop-duplication engine.
//
// Initialized once against the shared device; capture() then produces a
// single GPU-resident RGBA16F linear-scRGB texture spanning the whole
// virtual desktop. Outputs that deliver BGRA8 are promoted on the GPU by
// the sRGB→linear compute kernel; FP16 outputs are blitted directly.

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};
use windows::core::Interface;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Buffer, ID3D11Device, ID3D11DeviceContext, ID3D11ShaderResourceView, ID3D11Texture2D,
    ID3D11UnorderedAccessView, D3D11_BIND_SHADER_RESOURCE, D3D11_BIND_UNORDERED_ACCESS, D3D11_BOX,
    D3D11_TEXTURE2D_DESC, D3D11_USAGE_DEFAULT,
};
use windows::Win32::Graphics::Dwm::DwmFlush;
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_R16G16B16A16_FLOAT, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    DXGI_ERROR_NOT_FOUND, DXGI_OUTDUPL_FRAME_INFO, DXGI_OUTPUT_DESC, IDXGIDevice, IDXGIOutput,
    IDXGIOutput1, IDXGIOutput5, IDXGIOutputDuplication, IDXGIResource,
};

use crate::d3d11::compute::{create_const_buffer, create_srv, create_uav, ComputeShader};
use crate::frame::{Frame, PixelFormat, Rect};
use crate::shader::CONVERT_BGRA8_HLSL;

/// Per-output acquire timeout.
const ACQUIRE_TIMEOUT_MS: u32 = 1000;

/// Thread-group edge of the conversion kernel (matches the HLSL).
const CONVERT_GROUP_SIZE: u32 = 16;

/// Duplicator lifecycle. `Stale` is entered when a capture fails on every
/// output; recovery is solely by re-initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DuplicatorState {
    Ready,
    Stale,
}

/// One output's duplication session paired with its descriptor
/// (desktop coordinates and rotation).
struct OutputDuplication {
    duplication: IDXGIOutputDuplication,
    desc: DXGI_OUTPUT_DESC,
}

/// Source/destination pairing for one output's blit into the composite,
/// clamped so nothing lands outside the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlitRect {
    src_x: i32,
    src_y: i32,
    dst_x: i32,
    dst_y: i32,
    width: i32,
    height: i32,
}

/// Constant-buffer layout matching the conversion kernel's BlitParams.
/// Trailing pad keeps the cbuffer at a 16-byte multiple.
#[repr(C)]
#[derive(Clone, Copy)]
struct BlitParams {
    src_offset: [i32; 2],
    dst_offset: [i32; 2],
    blit_size: [i32; 2],
    _pad: [i32; 2],
}

/// Clamp an output's frame to the composite.
///
/// `output_rect` is the output's desktop coordinates, `bounds` the virtual
/// desktop; `tex_w`/`tex_h` the acquired texture's dimensions. Returns
/// `None` when nothing of the output lands inside the composite.
fn clamp_blit(output_rect: Rect, bounds: Rect, tex_w: u32, tex_h: u32) -> Option<BlitRect> {
    let comp_w = bounds.width() as i32;
    let comp_h = bounds.height() as i32;

    let mut dst_x = output_rect.left - bounds.left;
    let mut dst_y = output_rect.top - bounds.top;
    let mut src_x = 0;
    let mut src_y = 0;
    let mut width = tex_w as i32;
    let mut height = tex_h as i32;

    if dst_x < 0 {
        src_x = -dst_x;
        width -= src_x;
        dst_x = 0;
    }
    if dst_y < 0 {
        src_y = -dst_y;
        height -= src_y;
        dst_y = 0;
    }
    if dst_x + width > comp_w {
        width = comp_w - dst_x;
    }
    if dst_y + height > comp_h {
        height = comp_h - dst_y;
    }

    if width <= 0 || height <= 0 {
        return None;
    }
    Some(BlitRect {
        src_x,
        src_y,
        dst_x,
        dst_y,
        width,
        height,
    })
}

/// Request a duplication session for one output, preferring native FP16
/// delivery and falling back to the legacy BGRA8-only API.
fn create_duplication(
    output: &IDXGIOutput,
    device: &ID3D11Device,
) -> Result<IDXGIOutputDuplication> {
    if let Ok(output5) = output.cast::<IDXGIOutput5>() {
        let formats = [DXGI_FORMAT_R16G16B16A16_FLOAT, DXGI_FORMAT_B8G8R8A8_UNORM];
        // SAFETY: DuplicateOutput1 over valid COM objects.
        if let Ok(duplication) = unsafe { output5.DuplicateOutput1(device, 0, &formats) } {
            return Ok(duplication);
        }
    }

    let output1: IDXGIOutput1 = output.cast().context("IDXGIOutput1 not available")?;
    // SAFETY: DuplicateOutput over valid COM objects.
    unsafe { output1.DuplicateOutput(device) }.context("DuplicateOutput failed")
}

pub struct DesktopDuplicator {
    device: ID3D11Device,
    context: ID3D11DeviceContext,
    /// Pre-compiled sRGB→linear kernel. Compile failure is not fatal at
    /// init; mixed-format desktops then skip the conversion path.
    convert_cs: Option<ComputeShader>,
    outputs: Vec<OutputDuplication>,
    bounds: Rect,
    state: DuplicatorState,
}

impl DesktopDuplicator {
    /// Enumerate attached outputs and open a duplication session per
    /// output. Fails only when no output yields a working session.
    pub fn new(device: &ID3D11Device) -> Result<Self> {
        // SAFETY: immediate-context query on a valid device.
        let context = unsafe {
            device
                .GetImmediateContext()
                .context("device has no immediate context")?
        };

        let convert_cs = match ComputeShader::compile(device, CONVERT_BGRA8_HLSL, "main") {
            Ok(cs) => Some(cs),
            Err(e) => {
                warn!("conversion kernel unavailable: {e:#}");
                None
            }
        };

        let dxgi: IDXGIDevice = device.cast().context("device is not a DXGI device")?;
        // SAFETY: adapter query on a valid DXGI device.
        let adapter = unsafe { dxgi.GetAdapter() }.context("GetAdapter failed")?;

        // Keep only outputs attached to the desktop.
        let mut attached: Vec<(IDXGIOutput, DXGI_OUTPUT_DESC)> = Vec::new();
        for i in 0.. {
            // SAFETY: EnumOutputs returns DXGI_ERROR_NOT_FOUND past the end.
            let output = match unsafe { adapter.EnumOutputs(i) } {
                Ok(output) => output,
                Err(e) if e.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(_) => continue,
            };
            // SAFETY: descriptor query on a valid output.
            let Ok(desc) = (unsafe { output.GetDesc() }) else {
                continue;
            };
            if desc.AttachedToDesktop.as_bool() {
                attached.push((output, desc));
            }
        }
        if attached.is_empty() {
            bail!("no outputs attached to the desktop");
        }

        // Virtual-desktop bounding rect: union of all output rects.
        let mut bounds = rect_from_win32(&attached[0].1.DesktopCoordinates);
        for (_, desc) in &attached[1..] {
            bounds = bounds.union(&rect_from_win32(&desc.DesktopCoordinates));
        }

        let mut outputs = Vec::with_capacity(attached.len());
        for (output, desc) in attached {
            match create_duplication(&output, device) {
                Ok(duplication) => outputs.push(OutputDuplication { duplication, desc }),
                Err(e) => {
                    let r = rect_from_win32(&desc.DesktopCoordinates);
                    warn!(
                        output = ?(r.left, r.top, r.right, r.bottom),
                        "duplication session denied: {e:#}"
                    );
                }
            }
        }
        if outputs.is_empty() {
            bail!("no output accepted a duplication session");
        }

        debug!(
            outputs = outputs.len(),
            bounds = ?(bounds.left, bounds.top, bounds.right, bounds.bottom),
            "desktop duplicator ready"
        );

        Ok(Self {
            device: device.clone(),
            context,
            convert_cs,
            outputs,
            bounds,
            state: DuplicatorState::Ready,
        })
    }

    /// Virtual-desktop bounding rect (union of all attached outputs).
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Acquire one frame from every output and composite them into a
    /// single FP16 linear-scRGB texture.
    ///
    /// Failed outputs are skipped; the capture succeeds as long as at
    /// least one output delivered. Total failure marks the duplicator
    /// stale (the display topology has likely changed) and only a re-init
    /// can recover.
    pub fn capture(&mut self) -> Result<Frame> {
        if self.state != DuplicatorState::Ready {
            bail!("duplicator is stale; re-initialize before capturing");
        }

        let total_w = self.bounds.width();
        let total_h = self.bounds.height();

        // UAV binding is required for the compute-conversion path.
        let composite_desc = D3D11_TEXTURE2D_DESC {
            Width: total_w,
            Height: total_h,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_R16G16B16A16_FLOAT,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32 | D3D11_BIND_UNORDERED_ACCESS.0 as u32,
            CPUAccessFlags: 0,
            MiscFlags: 0,
        };
        // SAFETY: desc is fully initialized.
        let composite = unsafe {
            let mut tex = None;
            self.device
                .CreateTexture2D(&composite_desc, None, Some(&mut tex))
                .context("failed to create composite texture")?;
            tex.unwrap()
        };

        let mut any_captured = false;
        for i in 0..self.outputs.len() {
            match self.blit_output(i, &composite) {
                Ok(()) => any_captured = true,
                Err(e) => {
                    let r = rect_from_win32(&self.outputs[i].desc.DesktopCoordinates);
                    warn!(output = ?(r.left, r.top), "output skipped: {e:#}");
                }
            }
        }

        if !any_captured {
            self.state = DuplicatorState::Stale;
            bail!("every output failed to deliver a frame");
        }

        Ok(Frame {
            width: total_w,
            height: total_h,
            format: PixelFormat::Rgba16f,
            texture: Some(composite),
            pixels: None,
        })
    }

    /// Capture with the bounded recovery sequence: on failure, rebuild the
    /// duplication sessions once, force a composition cycle, and retry.
    /// A second failure propagates to the caller.
    pub fn capture_with_recovery(&mut self) -> Result<Frame> {
        match self.capture() {
            Ok(frame) => Ok(frame),
            Err(first) => {
                warn!("capture failed, re-initializing duplication: {first:#}");
                self.reinit()
                    .context("re-initialization after failed capture")?;
                // SAFETY: DwmFlush blocks until the next composition pass,
                // guaranteeing the rebuilt sessions have a frame to hand out.
                unsafe {
                    let _ = DwmFlush();
                }
                self.capture()
                    .context("capture failed again after re-initialization")
            }
        }
    }

    /// Tear down and re-create every duplication session, re-deriving the
    /// virtual-desktop bounds.
    pub fn reinit(&mut self) -> Result<()> {
        let device = self.device.clone();
        *self = Self::new(&device)?;
        Ok(())
    }

    /// Acquire one output's frame and blit it into the composite.
    fn blit_output(&self, index: usize, composite: &ID3D11Texture2D) -> Result<()> {
        let output = &self.outputs[index];

        let mut info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;
        // SAFETY: AcquireNextFrame writes into the out parameters; every
        // exit path below releases the frame.
        unsafe {
            output
                .duplication
                .AcquireNextFrame(ACQUIRE_TIMEOUT_MS, &mut info, &mut resource)
        }
        .context("AcquireNextFrame failed")?;

        let result = (|| -> Result<()> {
            let resource = resource.context("acquired frame carried no resource")?;
            let texture: ID3D11Texture2D = resource
                .cast()
                .context("acquired resource is not a texture")?;

            let mut tex_desc = D3D11_TEXTURE2D_DESC::default();
            // SAFETY: descriptor query on the acquired texture.
            unsafe { texture.GetDesc(&mut tex_desc) };

            let output_rect = rect_from_win32(&output.desc.DesktopCoordinates);
            let blit = clamp_blit(output_rect, self.bounds, tex_desc.Width, tex_desc.Height)
                .context("output lies entirely outside the composite")?;

            if tex_desc.Format == DXGI_FORMAT_R16G16B16A16_FLOAT {
                // Same format as the composite: direct GPU sub-rect copy.
                let src_box = D3D11_BOX {
                    left: blit.src_x as u32,
                    top: blit.src_y as u32,
                    front: 0,
                    right: (blit.src_x + blit.width) as u32,
                    bottom: (blit.src_y + blit.height) as u32,
                    back: 1,
                };
                // SAFETY: both textures are valid and format-compatible.
                unsafe {
                    self.context.CopySubresourceRegion(
                        composite,
                        0,
                        blit.dst_x as u32,
                        blit.dst_y as u32,
                        0,
                        &texture,
                        0,
                        Some(&src_box),
                    );
                }
            } else {
                let cs = self
                    .convert_cs
                    .as_ref()
                    .context("mixed-format desktop but conversion kernel unavailable")?;
                dispatch_convert(
                    &self.device,
                    &self.context,
                    cs,
                    &texture,
                    &tex_desc,
                    composite,
                    blit,
                )?;
            }

            Ok(())
        })();

        // SAFETY: release regardless of outcome; the handle must not be
        // held across captures.
        unsafe {
            let _ = output.duplication.ReleaseFrame();
        }

        result
    }
}

/// GPU format promotion: copy the duplication texture to a temp SRV-capable
/// texture (duplication surfaces are DWM-owned and not SRV-bindable), then
/// dispatch the sRGB→linear kernel writing into the composite UAV.
fn dispatch_convert(
    device: &ID3D11Device,
    context: &ID3D11DeviceContext,
    cs: &ComputeShader,
    source: &ID3D11Texture2D,
    source_desc: &D3D11_TEXTURE2D_DESC,
    composite: &ID3D11Texture2D,
    blit: BlitRect,
) -> Result<()> {
    let temp_desc = D3D11_TEXTURE2D_DESC {
        Width: source_desc.Width,
        Height: source_desc.Height,
        MipLevels: 1,
        ArraySize: 1,
        Format: source_desc.Format,
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
        CPUAccessFlags: 0,
        MiscFlags: 0,
    };
    // SAFETY: desc is fully initialized.
    let temp = unsafe {
        let mut tex = None;
        device
            .CreateTexture2D(&temp_desc, None, Some(&mut tex))
            .context("failed to create conversion temp texture")?;
        tex.unwrap()
    };
    // SAFETY: full-resource copy between same-format textures.
    unsafe { context.CopyResource(&temp, source) };

    let srv = create_srv(device, &temp)?;
    let uav = create_uav(device, composite)?;

    let params = BlitParams {
        src_offset: [blit.src_x, blit.src_y],
        dst_offset: [blit.dst_x, blit.dst_y],
        blit_size: [blit.width, blit.height],
        _pad: [0, 0],
    };
    let cb: ID3D11Buffer = create_const_buffer(device, &params)?;

    let groups_x = (blit.width as u32).div_ceil(CONVERT_GROUP_SIZE);
    let groups_y = (blit.height as u32).div_ceil(CONVERT_GROUP_SIZE);

    // SAFETY: standard bind → dispatch → unbind sequence over valid COM
    // objects; unbinding prevents hazards with later render passes.
    unsafe {
        context.CSSetShader(&cs.shader, None);
        context.CSSetShaderResources(0, Some(&[Some(srv.clone())]));
        let uavs = [Some(uav.clone())];
        context.CSSetUnorderedAccessViews(0, 1, Some(uavs.as_ptr()), None);
        context.CSSetConstantBuffers(0, Some(&[Some(cb.clone())]));

        context.Dispatch(groups_x, groups_y, 1);

        let no_srv: [Option<ID3D11ShaderResourceView>; 1] = [None];
        let no_uav: [Option<ID3D11UnorderedAccessView>; 1] = [None];
        let no_cb: [Option<ID3D11Buffer>; 1] = [None];
        context.CSSetShaderResources(0, Some(&no_srv));
        context.CSSetUnorderedAccessViews(0, 1, Some(no_uav.as_ptr()), None);
        context.CSSetConstantBuffers(0, Some(&no_cb));
        context.CSSetShader(None, None);
    }

    Ok(())
}

fn rect_from_win32(r: &windows::Win32::Foundation::RECT) -> Rect {
    Rect::new(r.left, r.top, r.right, r.bottom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blit_fully_inside_composite() {
        let bounds = Rect::new(0, 0, 4480, 1440);
        let output = Rect::new(1920, 0, 4480, 1440);
        let blit = clamp_blit(output, bounds, 2560, 1440).unwrap();
        assert_eq!(
            blit,
            BlitRect {
                src_x: 0,
                src_y: 0,
                dst_x: 1920,
                dst_y: 0,
                width: 2560,
                height: 1440,
            }
        );
    }

    #[test]
    fn blit_clamps_negative_origin() {
        // Output extends above/left of the composite origin.
        let bounds = Rect::new(0, 0, 1920, 1080);
        let output = Rect::new(-100, -50, 1820, 1030);
        let blit = clamp_blit(output, bounds, 1920, 1080).unwrap();
        assert_eq!(blit.src_x, 100);
        assert_eq!(blit.src_y, 50);
        assert_eq!(blit.dst_x, 0);
        assert_eq!(blit.dst_y, 0);
        assert_eq!(blit.width, 1820);
        assert_eq!(blit.height, 1030);
    }

    #[test]
    fn blit_clamps_overhang() {
        let bounds = Rect::new(0, 0, 1920, 1080);
        let output = Rect::new(1000, 600, 2920, 1680);
        let blit = clamp_blit(output, bounds, 1920, 1080).unwrap();
        assert_eq!(blit.width, 920);
        assert_eq!(blit.height, 480);
        assert_eq!(blit.dst_x, 1000);
        assert_eq!(blit.dst_y, 600);
    }

    #[test]
    fn blit_outside_composite_is_none() {
        let bounds = Rect::new(0, 0, 1920, 1080);
        let output = Rect::new(5000, 0, 6920, 1080);
        assert!(clamp_blit(output, bounds, 1920, 1080).is_none());
    }

    /// Two monitors side-by-side, top-aligned: composite bounds span both.
    #[test]
    fn bounds_union_of_side_by_side_outputs() {
        let left = Rect::new(0, 0, 1920, 1080);
        let right = Rect::new(1920, 0, 4480, 1440);
        let bounds = left.union(&right);
        assert_eq!(bounds.width(), 4480);
        assert_eq!(bounds.height(), 1440);

        // The left monitor occupies the top-left of the composite; the
        // rows below y = 1080 on its side stay at the cleared state.
        let blit = clamp_blit(left, bounds, 1920, 1080).unwrap();
        assert_eq!((blit.dst_x, blit.dst_y), (0, 0));
        assert_eq!((blit.width, blit.height), (1920, 1080));
    }
}
