// Compute-shader runtime: compile HLSL at init, create views and constant
// buffers, and keep the bind → dispatch → unbind discipline in one place.

use anyhow::{bail, Context, Result};
use windows::core::PCSTR;
use windows::Win32::Graphics::Direct3D::Fxc::{D3DCompile, D3DCOMPILE_OPTIMIZATION_LEVEL3};
use windows::Win32::Graphics::Direct3D::ID3DBlob;
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Buffer, ID3D11ComputeShader, ID3D11Device, ID3D11ShaderResourceView, ID3D11Texture2D,
    ID3D11UnorderedAccessView, D3D11_BIND_CONSTANT_BUFFER, D3D11_BUFFER_DESC,
    D3D11_SUBRESOURCE_DATA, D3D11_USAGE_DEFAULT,
};

/// Compile HLSL source for the given profile (`cs_5_0`, `vs_5_0`, ...)
/// and return the raw bytecode.
pub fn compile_hlsl(hlsl: &str, entry_point: &str, target: &str) -> Result<Vec<u8>> {
    let mut blob: Option<ID3DBlob> = None;
    let mut error_blob: Option<ID3DBlob> = None;

    let entry = format!("{entry_point}\0");
    let target = format!("{target}\0");

    // SAFETY: D3DCompile reads the source slice and writes COM blobs;
    // all pointers stay valid for the duration of the call.
    let hr = unsafe {
        D3DCompile(
            hlsl.as_ptr() as *const _,
            hlsl.len(),
            None,
            None,
            None,
            PCSTR(entry.as_ptr()),
            PCSTR(target.as_ptr()),
            D3DCOMPILE_OPTIMIZATION_LEVEL3,
            0,
            &mut blob,
            Some(&mut error_blob),
        )
    };

    if hr.is_err() {
        let msg = error_blob
            .as_ref()
            .map(|b| {
                // SAFETY: the error blob holds a NUL-terminated message.
                unsafe {
                    let ptr = b.GetBufferPointer() as *const u8;
                    let len = b.GetBufferSize();
                    String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).to_string()
                }
            })
            .unwrap_or_else(|| format!("D3DCompile failed: {hr:?}"));
        bail!("shader compilation failed: {}", msg.trim_end_matches('\0'));
    }

    let blob = blob.context("D3DCompile succeeded but returned no bytecode")?;
    // SAFETY: the blob holds valid bytecode produced above.
    unsafe {
        let bytes =
            std::slice::from_raw_parts(blob.GetBufferPointer() as *const u8, blob.GetBufferSize());
        Ok(bytes.to_vec())
    }
}

/// A compiled compute shader, ready to bind.
pub struct ComputeShader {
    pub(crate) shader: ID3D11ComputeShader,
}

impl ComputeShader {
    /// Compile HLSL source for the cs_5_0 profile.
    pub fn compile(device: &ID3D11Device, hlsl: &str, entry_point: &str) -> Result<Self> {
        let bytecode = compile_hlsl(hlsl, entry_point, "cs_5_0")?;

        // SAFETY: bytecode was produced by D3DCompile above.
        let shader = unsafe {
            let mut cs = None;
            device
                .CreateComputeShader(&bytecode, None, Some(&mut cs))
                .context("CreateComputeShader failed")?;
            cs.unwrap()
        };

        Ok(Self { shader })
    }
}

/// Create an SRV over an existing texture (read-only shader input).
pub fn create_srv(
    device: &ID3D11Device,
    texture: &ID3D11Texture2D,
) -> Result<ID3D11ShaderResourceView> {
    // SAFETY: texture is a valid resource with SRV binding.
    unsafe {
        let mut srv = None;
        device
            .CreateShaderResourceView(texture, None, Some(&mut srv))
            .context("CreateShaderResourceView failed")?;
        Ok(srv.unwrap())
    }
}

/// Create a UAV over an existing texture (read-write shader output).
pub fn create_uav(
    device: &ID3D11Device,
    texture: &ID3D11Texture2D,
) -> Result<ID3D11UnorderedAccessView> {
    // SAFETY: texture is a valid resource with UAV binding.
    unsafe {
        let mut uav = None;
        device
            .CreateUnorderedAccessView(texture, None, Some(&mut uav))
            .context("CreateUnorderedAccessView failed")?;
        Ok(uav.unwrap())
    }
}

/// Create an immutable constant buffer initialized from a POD value.
///
/// The payload must already satisfy HLSL's 16-byte cbuffer alignment.
pub fn create_const_buffer<T: Copy>(device: &ID3D11Device, value: &T) -> Result<ID3D11Buffer> {
    let desc = D3D11_BUFFER_DESC {
        ByteWidth: std::mem::size_of::<T>() as u32,
        Usage: D3D11_USAGE_DEFAULT,
        BindFlags: D3D11_BIND_CONSTANT_BUFFER.0 as u32,
        CPUAccessFlags: 0,
        MiscFlags: 0,
        StructureByteStride: 0,
    };
    let init = D3D11_SUBRESOURCE_DATA {
        pSysMem: value as *const T as *const _,
        SysMemPitch: 0,
        SysMemSlicePitch: 0,
    };

    // SAFETY: desc and init reference live caller memory for the call.
    unsafe {
        let mut buffer = None;
        device
            .CreateBuffer(&desc, Some(&init), Some(&mut buffer))
            .context("CreateBuffer for constants failed")?;
        Ok(buffer.unwrap())
    }
}
