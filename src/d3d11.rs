// D3D11 device plumbing shared by every GPU-touching component.
//
// The host creates one device at startup and passes it into the duplicator,
// the preview, the window-capture adapter, and readback; everything runs on
// the single immediate context, so no locking is needed.

pub mod compute;
pub mod readback;

use anyhow::{Context, Result};
use tracing::debug;
use windows::core::Interface;
use windows::Graphics::DirectX::Direct3D11::IDirect3DDevice;
use windows::Win32::Foundation::HMODULE;
use windows::Win32::Graphics::Direct3D::{D3D_DRIVER_TYPE_HARDWARE, D3D_FEATURE_LEVEL_11_0};
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, D3D11_CREATE_DEVICE_BGRA_SUPPORT,
    D3D11_SDK_VERSION,
};
use windows::Win32::Graphics::Dxgi::IDXGIDevice;
use windows::Win32::System::WinRT::Direct3D11::CreateDirect3D11DeviceFromDXGIDevice;

/// Create the shared hardware device and its immediate context.
///
/// BGRA support is required for the swap-chain fallback path and D2D
/// interop.
pub fn create_device() -> Result<(ID3D11Device, ID3D11DeviceContext)> {
    // SAFETY: D3D11CreateDevice writes the created COM objects into the
    // caller-provided out parameters.
    let (device, context) = unsafe {
        let mut device = None;
        let mut context = None;
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            HMODULE::default(),
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            Some(&[D3D_FEATURE_LEVEL_11_0]),
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )
        .context("D3D11CreateDevice failed")?;
        (device.unwrap(), context.unwrap())
    };

    if let Ok(dxgi) = device.cast::<IDXGIDevice>() {
        log_adapter(&dxgi);
    }

    Ok((device, context))
}

/// Wrap the D3D11 device as a WinRT `IDirect3DDevice` for the
/// Windows.Graphics.Capture frame pool.
pub fn winrt_device(device: &ID3D11Device) -> Result<IDirect3DDevice> {
    let dxgi: IDXGIDevice = device.cast().context("device is not a DXGI device")?;
    // SAFETY: interop call over a valid IDXGIDevice; returns an IInspectable
    // that projects to IDirect3DDevice.
    let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi) }
        .context("CreateDirect3D11DeviceFromDXGIDevice failed")?;
    inspectable
        .cast()
        .context("interop device does not expose IDirect3DDevice")
}

fn log_adapter(dxgi_device: &IDXGIDevice) {
    // SAFETY: GetAdapter/GetDesc read from valid COM objects.
    unsafe {
        if let Ok(adapter) = dxgi_device.GetAdapter() {
            if let Ok(desc) = adapter.GetDesc() {
                let name = String::from_utf16_lossy(&desc.Description);
                debug!(
                    adapter = name.trim_end_matches('\0'),
                    vram_mb = desc.DedicatedVideoMemory / 1024 / 1024,
                    "created D3D11 device"
                );
            }
        }
    }
}
