// scrgbshot: HDR-correct screen capture for Windows.
//
// On an HDR desktop the composited framebuffer is half-float linear scRGB,
// not 8-bit BGRA; reading it naively produces the washed-out screenshots
// every SDR-era tool takes. This crate captures each output in its native
// format, composites the virtual desktop into a single linear FP16 texture
// on the GPU, and tone-maps against the monitor's SDR paper-white level to
// produce an SDR image that matches what the user actually sees.
//
// The host (tray icon, hotkeys, save dialog, clipboard syscall) lives
// elsewhere; it drives this crate through `DesktopDuplicator` plus the
// three preview operations, and receives finished bitmaps through
// `OutputSink`.

#![cfg(windows)]

pub mod capture;
pub mod color;
pub mod d3d11;
pub mod frame;
pub mod output;
pub mod pixel;
pub mod preview;
pub(crate) mod shader;

pub use capture::{capture_window, enable_dpi_awareness, DesktopDuplicator};
pub use color::{tone_map, tone_map_with_paper_white, SdrBitmap};
pub use frame::{Frame, PixelFormat, Rect};
pub use output::{CaptureOutcome, OutputSink};
pub use preview::{capture_full_desktop, capture_region, capture_window_pick};
