// Single-window acquisition via Windows.Graphics.Capture.
//
// Unlike cropping the desktop composite, the per-window API delivers the
// window's own swap-chain content, so the result is correct even when the
// window is occluded. One-shot protocol: create pool + session, wait for
// the first frame, copy it out, close everything.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};
use windows::core::{IInspectable, Interface};
use windows::Foundation::TypedEventHandler;
use windows::Graphics::Capture::{
    Direct3D11CaptureFramePool, GraphicsCaptureItem, GraphicsCaptureSession,
};
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Device, ID3D11Texture2D, D3D11_BIND_SHADER_RESOURCE, D3D11_TEXTURE2D_DESC,
    D3D11_USAGE_DEFAULT,
};
use windows::Win32::System::WinRT::Direct3D11::IDirect3DDxgiInterfaceAccess;
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;
use windows::Win32::UI::WindowsAndMessaging::IsWindow;

use crate::d3d11::readback::materialize_pixels;
use crate::d3d11::winrt_device;
use crate::frame::{Frame, PixelFormat};

/// How long to wait for the session's first frame.
const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Capture a single window into a Frame carrying both a GPU texture and a
/// tight CPU pixel buffer.
///
/// Fails when the window handle is invalid, the capture API is
/// unavailable, the item reports a non-positive size, or no frame arrives
/// within the timeout. The pool prefers FP16 so HDR window content
/// (scRGB swap chains) survives; BGRA8 is the fallback.
pub fn capture_window(hwnd: HWND, device: &ID3D11Device) -> Result<Frame> {
    // SAFETY: IsWindow tolerates arbitrary handle values.
    if hwnd.0.is_null() || !unsafe { IsWindow(Some(hwnd)) }.as_bool() {
        bail!("window handle is not valid");
    }

    let winrt = winrt_device(device)?;

    let interop: IGraphicsCaptureItemInterop =
        windows::core::factory::<GraphicsCaptureItem, IGraphicsCaptureItemInterop>()
            .context("GraphicsCaptureItem interop factory unavailable")?;
    // SAFETY: interop call over a validated HWND.
    let item: GraphicsCaptureItem = unsafe { interop.CreateForWindow(hwnd) }
        .context("CreateForWindow failed")?;

    let size = item.Size().context("capture item has no size")?;
    if size.Width <= 0 || size.Height <= 0 {
        bail!("capture item has empty bounds: {}x{}", size.Width, size.Height);
    }

    // Single-buffer pool: one frame is all a screenshot needs.
    let frame_pool = match Direct3D11CaptureFramePool::CreateFreeThreaded(
        &winrt,
        DirectXPixelFormat::R16G16B16A16Float,
        1,
        size,
    ) {
        Ok(pool) => pool,
        Err(e) => {
            debug!("FP16 frame pool unavailable ({e}), falling back to BGRA8");
            Direct3D11CaptureFramePool::CreateFreeThreaded(
                &winrt,
                DirectXPixelFormat::B8G8R8A8UIntNormalized,
                1,
                size,
            )
            .context("failed to create capture frame pool")?
        }
    };

    let session = match frame_pool.CreateCaptureSession(&item) {
        Ok(session) => session,
        Err(e) => {
            let _ = frame_pool.Close();
            return Err(e).context("CreateCaptureSession failed");
        }
    };

    // Best-effort: no yellow capture border, no cursor. Older OS builds
    // reject these setters.
    if session.SetIsBorderRequired(false).is_err() {
        debug!("capture border opt-out not supported");
    }
    if session.SetIsCursorCaptureEnabled(false).is_err() {
        debug!("cursor capture opt-out not supported");
    }

    let result = acquire_first_frame(&frame_pool, &session, device);

    // Close on every exit path; nothing here may outlive this call.
    let _ = session.Close();
    let _ = frame_pool.Close();

    result
}

/// Start the session and block until the first frame arrives, then copy
/// it out of the pool.
///
/// The pool is free-threaded: `FrameArrived` fires on an OS worker thread.
/// An atomic swap arms exactly one delivery and a condvar carries the
/// signal back to the calling thread; all further access happens here.
fn acquire_first_frame(
    frame_pool: &Direct3D11CaptureFramePool,
    session: &GraphicsCaptureSession,
    device: &ID3D11Device,
) -> Result<Frame> {
    let signal = Arc::new((Mutex::new(false), Condvar::new()));
    let armed = Arc::new(AtomicBool::new(false));

    let handler = {
        let signal = Arc::clone(&signal);
        let armed = Arc::clone(&armed);
        TypedEventHandler::<Direct3D11CaptureFramePool, IInspectable>::new(move |_, _| {
            if !armed.swap(true, Ordering::SeqCst) {
                let (fired, cvar) = &*signal;
                *fired.lock().unwrap() = true;
                cvar.notify_one();
            }
            Ok(())
        })
    };
    let token = frame_pool
        .FrameArrived(&handler)
        .context("FrameArrived registration failed")?;

    session.StartCapture().context("StartCapture failed")?;

    let (fired, cvar) = &*signal;
    let guard = fired.lock().unwrap();
    let (guard, _timeout) = cvar
        .wait_timeout_while(guard, FIRST_FRAME_TIMEOUT, |fired| !*fired)
        .unwrap();
    let got_frame = *guard;
    drop(guard);

    let _ = frame_pool.RemoveFrameArrived(token);

    if !got_frame {
        bail!("no frame arrived within {FIRST_FRAME_TIMEOUT:?}");
    }

    let wgc_frame = frame_pool
        .TryGetNextFrame()
        .context("frame pool signalled but held no frame")?;

    let result = copy_frame_texture(&wgc_frame, device);
    let _ = wgc_frame.Close();
    result
}

/// Extract the frame's underlying D3D11 texture and copy it into a new
/// Frame: a device-owned GPU copy plus tight CPU pixels.
fn copy_frame_texture(
    wgc_frame: &windows::Graphics::Capture::Direct3D11CaptureFrame,
    device: &ID3D11Device,
) -> Result<Frame> {
    let surface = wgc_frame.Surface().context("frame has no surface")?;
    let access: IDirect3DDxgiInterfaceAccess = surface
        .cast()
        .context("surface does not expose DXGI interop")?;
    // SAFETY: interop query returning the backing texture.
    let source: ID3D11Texture2D =
        unsafe { access.GetInterface() }.context("surface has no D3D11 texture")?;

    let mut desc = D3D11_TEXTURE2D_DESC::default();
    // SAFETY: descriptor query on the backing texture.
    unsafe { source.GetDesc(&mut desc) };

    let format = PixelFormat::from_dxgi(desc.Format)
        .context("window capture delivered an unsupported format")?;

    let context = unsafe {
        device
            .GetImmediateContext()
            .context("device has no immediate context")?
    };

    // The pool's texture is recycled after Close; keep our own copy.
    let copy_desc = D3D11_TEXTURE2D_DESC {
        Width: desc.Width,
        Height: desc.Height,
        MipLevels: 1,
        ArraySize: 1,
        Format: desc.Format,
        SampleDesc: desc.SampleDesc,
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
        CPUAccessFlags: 0,
        MiscFlags: 0,
    };
    // SAFETY: texture creation + full-resource copy on the shared device's
    // immediate context.
    let texture = unsafe {
        let mut tex = None;
        device
            .CreateTexture2D(&copy_desc, None, Some(&mut tex))
            .context("failed to create window frame copy")?;
        let tex = tex.unwrap();
        context.CopyResource(&tex, &source);
        tex
    };

    let mut frame = Frame {
        width: desc.Width,
        height: desc.Height,
        format,
        texture: Some(texture),
        pixels: None,
    };

    // Populate CPU pixels eagerly (tight rows, pitch-corrected); the
    // tone mapper consumes them directly.
    if let Err(e) = materialize_pixels(&mut frame, &context) {
        warn!("window frame readback failed: {e:#}");
        return Err(e);
    }

    debug!(
        width = frame.width,
        height = frame.height,
        format = ?frame.format,
        "window capture complete"
    );
    Ok(frame)
}
