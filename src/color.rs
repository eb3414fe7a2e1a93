// Color pipeline: SDR white-level query and scRGB→SDR tone mapping.

pub mod tone_map;
pub mod white_level;

pub use tone_map::{tone_map, tone_map_with_paper_white};
pub use white_level::{primary_monitor_sdr_white_nits, query_sdr_white_nits};

/// The tone mapper's output: a tightly packed BGRA8 bitmap with opaque
/// alpha, ready for PNG encoding or DIB packaging.
pub struct SdrBitmap {
    pub width: u32,
    pub height: u32,
    /// BGRA bytes, row-major, stride = width × 4 (no padding).
    pub pixels: Vec<u8>,
}
