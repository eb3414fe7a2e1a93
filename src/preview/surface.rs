// D3D11 side of the preview window: swap chain, fullscreen-triangle
// shaders, and the composite SRV.
//
// The swap chain prefers an FP16 back buffer with the linear-scRGB color
// space so HDR preview is pure passthrough: the composite reaches the
// compositor untouched and the color-space tag does the hand-off. SDR
// systems fall back to BGRA8 + sRGB.

use anyhow::{Context, Result};
use tracing::{debug, warn};
use windows::core::Interface;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D::D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Device, ID3D11DeviceContext, ID3D11PixelShader, ID3D11RenderTargetView,
    ID3D11SamplerState, ID3D11ShaderResourceView, ID3D11Texture2D, ID3D11VertexShader,
    D3D11_BIND_SHADER_RESOURCE, D3D11_COMPARISON_NEVER, D3D11_FILTER_MIN_MAG_MIP_LINEAR,
    D3D11_FLOAT32_MAX, D3D11_SAMPLER_DESC, D3D11_SUBRESOURCE_DATA, D3D11_TEXTURE2D_DESC,
    D3D11_TEXTURE_ADDRESS_CLAMP, D3D11_USAGE_DEFAULT, D3D11_VIEWPORT,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_COLOR_SPACE_RGB_FULL_G10_NONE_P709, DXGI_COLOR_SPACE_RGB_FULL_G22_NONE_P709,
    DXGI_COLOR_SPACE_TYPE, DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM,
    DXGI_FORMAT_R16G16B16A16_FLOAT, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory2, IDXGIFactory2, IDXGISwapChain1, IDXGISwapChain3,
    DXGI_CREATE_FACTORY_FLAGS, DXGI_MWA_NO_ALT_ENTER, DXGI_PRESENT, DXGI_SCALING_STRETCH,
    DXGI_SWAP_CHAIN_COLOR_SPACE_SUPPORT_FLAG_PRESENT, DXGI_SWAP_CHAIN_DESC1,
    DXGI_SWAP_EFFECT_FLIP_DISCARD, DXGI_USAGE_RENDER_TARGET_OUTPUT,
};

use crate::d3d11::compute::compile_hlsl;
use crate::frame::Frame;
use crate::shader::FULLSCREEN_HLSL;

const BUFFER_COUNT: u32 = 2;

pub struct PreviewSurface {
    pub device: ID3D11Device,
    pub context: ID3D11DeviceContext,
    pub swap_chain: IDXGISwapChain3,
    pub back_buffer_format: DXGI_FORMAT,
    rtv: ID3D11RenderTargetView,
    vs: ID3D11VertexShader,
    ps: ID3D11PixelShader,
    sampler: ID3D11SamplerState,
    srv: Option<ID3D11ShaderResourceView>,
    width: u32,
    height: u32,
}

impl PreviewSurface {
    pub fn new(device: &ID3D11Device, hwnd: HWND, width: u32, height: u32) -> Result<Self> {
        let context = unsafe {
            device
                .GetImmediateContext()
                .context("device has no immediate context")?
        };

        // SAFETY: factory creation is side-effect free.
        let factory: IDXGIFactory2 = unsafe { CreateDXGIFactory2(DXGI_CREATE_FACTORY_FLAGS(0)) }
            .context("CreateDXGIFactory2 failed")?;

        let mut desc = DXGI_SWAP_CHAIN_DESC1 {
            Width: width,
            Height: height,
            Format: DXGI_FORMAT_R16G16B16A16_FLOAT,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
            BufferCount: BUFFER_COUNT,
            Scaling: DXGI_SCALING_STRETCH,
            SwapEffect: DXGI_SWAP_EFFECT_FLIP_DISCARD,
            ..Default::default()
        };

        // Prefer scRGB FP16; fall back to BGRA8 + sRGB on refusal.
        let mut back_buffer_format = DXGI_FORMAT_R16G16B16A16_FLOAT;
        let mut color_space: DXGI_COLOR_SPACE_TYPE = DXGI_COLOR_SPACE_RGB_FULL_G10_NONE_P709;
        // SAFETY: swap-chain creation over valid device/hwnd.
        let sc1: IDXGISwapChain1 = match unsafe {
            factory.CreateSwapChainForHwnd(device, hwnd, &desc, None, None)
        } {
            Ok(sc) => sc,
            Err(e) => {
                debug!("FP16 swap chain unavailable ({e}), falling back to BGRA8");
                back_buffer_format = DXGI_FORMAT_B8G8R8A8_UNORM;
                color_space = DXGI_COLOR_SPACE_RGB_FULL_G22_NONE_P709;
                desc.Format = back_buffer_format;
                unsafe { factory.CreateSwapChainForHwnd(device, hwnd, &desc, None, None) }
                    .context("swap chain creation failed")?
            }
        };
        let swap_chain: IDXGISwapChain3 =
            sc1.cast().context("IDXGISwapChain3 not available")?;

        // SAFETY: color-space negotiation on the created swap chain.
        unsafe {
            if let Ok(support) = swap_chain.CheckColorSpaceSupport(color_space) {
                if support & DXGI_SWAP_CHAIN_COLOR_SPACE_SUPPORT_FLAG_PRESENT.0 as u32 != 0 {
                    if let Err(e) = swap_chain.SetColorSpace1(color_space) {
                        warn!("SetColorSpace1 failed: {e}");
                    }
                }
            }
            let _ = factory.MakeWindowAssociation(hwnd, DXGI_MWA_NO_ALT_ENTER);
        }

        // SAFETY: back-buffer RTV over the new swap chain.
        let rtv = unsafe {
            let back_buffer: ID3D11Texture2D = swap_chain.GetBuffer(0)?;
            let mut rtv = None;
            device
                .CreateRenderTargetView(&back_buffer, None, Some(&mut rtv))
                .context("CreateRenderTargetView failed")?;
            rtv.unwrap()
        };

        let vs_bytecode = compile_hlsl(FULLSCREEN_HLSL, "vs_main", "vs_5_0")?;
        let ps_bytecode = compile_hlsl(FULLSCREEN_HLSL, "ps_main", "ps_5_0")?;
        // SAFETY: bytecode produced by D3DCompile above.
        let (vs, ps) = unsafe {
            let mut vs = None;
            device
                .CreateVertexShader(&vs_bytecode, None, Some(&mut vs))
                .context("CreateVertexShader failed")?;
            let mut ps = None;
            device
                .CreatePixelShader(&ps_bytecode, None, Some(&mut ps))
                .context("CreatePixelShader failed")?;
            (vs.unwrap(), ps.unwrap())
        };

        let sampler_desc = D3D11_SAMPLER_DESC {
            Filter: D3D11_FILTER_MIN_MAG_MIP_LINEAR,
            AddressU: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressV: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressW: D3D11_TEXTURE_ADDRESS_CLAMP,
            MipLODBias: 0.0,
            MaxAnisotropy: 1,
            ComparisonFunc: D3D11_COMPARISON_NEVER,
            BorderColor: [0.0; 4],
            MinLOD: 0.0,
            MaxLOD: D3D11_FLOAT32_MAX,
        };
        // SAFETY: sampler desc fully initialized.
        let sampler = unsafe {
            let mut s = None;
            device
                .CreateSamplerState(&sampler_desc, Some(&mut s))
                .context("CreateSamplerState failed")?;
            s.unwrap()
        };

        Ok(Self {
            device: device.clone(),
            context,
            swap_chain,
            back_buffer_format,
            rtv,
            vs,
            ps,
            sampler,
            srv: None,
            width,
            height,
        })
    }

    /// Bind the captured composite as the preview's shader resource.
    ///
    /// GPU-resident frames are wrapped directly; CPU-only frames (the
    /// window-capture shape) are uploaded first.
    pub fn upload(&mut self, frame: &Frame) -> Result<()> {
        let texture = match frame.texture.as_ref() {
            Some(texture) => texture.clone(),
            None => {
                let pixels = frame
                    .pixels
                    .as_deref()
                    .context("frame has neither GPU texture nor CPU pixels")?;
                let desc = D3D11_TEXTURE2D_DESC {
                    Width: frame.width,
                    Height: frame.height,
                    MipLevels: 1,
                    ArraySize: 1,
                    Format: frame.format.dxgi(),
                    SampleDesc: DXGI_SAMPLE_DESC {
                        Count: 1,
                        Quality: 0,
                    },
                    Usage: D3D11_USAGE_DEFAULT,
                    BindFlags: D3D11_BIND_SHADER_RESOURCE.0 as u32,
                    CPUAccessFlags: 0,
                    MiscFlags: 0,
                };
                let init = D3D11_SUBRESOURCE_DATA {
                    pSysMem: pixels.as_ptr() as *const _,
                    SysMemPitch: frame.width * frame.bytes_per_pixel(),
                    SysMemSlicePitch: 0,
                };
                // SAFETY: desc and init data fully initialized.
                unsafe {
                    let mut tex = None;
                    self.device
                        .CreateTexture2D(&desc, Some(&init), Some(&mut tex))
                        .context("composite upload failed")?;
                    tex.unwrap()
                }
            }
        };

        // SAFETY: SRV over a texture with SHADER_RESOURCE binding.
        let srv = unsafe {
            let mut srv = None;
            self.device
                .CreateShaderResourceView(&texture, None, Some(&mut srv))
                .context("composite SRV creation failed")?;
            srv.unwrap()
        };
        self.srv = Some(srv);
        Ok(())
    }

    /// Draw the composite into the back buffer without presenting, leaving
    /// the render target unbound so the D2D overlay can draw on top.
    pub fn render_base(&self) {
        // SAFETY: fixed-function state setting over valid COM objects.
        unsafe {
            self.context
                .ClearRenderTargetView(&self.rtv, &[0.0, 0.0, 0.0, 1.0]);
            self.context
                .OMSetRenderTargets(Some(&[Some(self.rtv.clone())]), None);

            let viewport = D3D11_VIEWPORT {
                TopLeftX: 0.0,
                TopLeftY: 0.0,
                Width: self.width as f32,
                Height: self.height as f32,
                MinDepth: 0.0,
                MaxDepth: 1.0,
            };
            self.context.RSSetViewports(Some(&[viewport]));

            self.context.VSSetShader(&self.vs, None);
            self.context.PSSetShader(&self.ps, None);
            self.context
                .PSSetShaderResources(0, Some(&[self.srv.clone()]));
            self.context
                .PSSetSamplers(0, Some(&[Some(self.sampler.clone())]));

            self.context
                .IASetPrimitiveTopology(D3D_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            self.context.Draw(3, 0);

            let no_rtv: [Option<ID3D11RenderTargetView>; 1] = [None];
            self.context.OMSetRenderTargets(Some(&no_rtv), None);
        }
    }

    pub fn present(&self) {
        // SAFETY: Present on a valid swap chain; refusal (occluded window,
        // device removal) is reported on the next capture instead.
        unsafe {
            let _ = self.swap_chain.Present(1, DXGI_PRESENT(0));
        }
    }

    /// Flush outstanding GPU work. Called after the overlay is released
    /// and before the window is destroyed.
    pub fn teardown(&self) {
        // SAFETY: state clear + flush on the immediate context.
        unsafe {
            self.context.ClearState();
            self.context.Flush();
        }
    }
}
