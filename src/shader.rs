/// Embedded HLSL sources, compiled at runtime with `D3DCompile`.
///
/// - `CONVERT_BGRA8_HLSL`: sRGB→linear promotion kernel used by the
///   desktop duplicator for outputs that do not deliver FP16 natively.
/// - `FULLSCREEN_HLSL`: fullscreen-triangle vertex shader plus identity
///   pixel shader for the preview window (entry points `vs_main`/`ps_main`).
pub const CONVERT_BGRA8_HLSL: &str = include_str!("shader/convert_bgra8.hlsl");
pub const FULLSCREEN_HLSL: &str = include_str!("shader/fullscreen.hlsl");
