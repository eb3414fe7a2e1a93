// Frame acquisition: the multi-output desktop duplicator and the
// per-window Windows.Graphics.Capture adapter.

pub mod duplicator;
pub mod window;

pub use duplicator::DesktopDuplicator;
pub use window::capture_window;

use windows::Win32::UI::HiDpi::{
    SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
};

/// Enable per-monitor DPI awareness.
///
/// Ensures duplication dimensions match physical screen metrics. Safe to
/// call repeatedly; the call fails harmlessly when the host process has
/// already chosen an awareness mode.
pub fn enable_dpi_awareness() {
    // SAFETY: best-effort process-wide setting; a FALSE return only means
    // the mode was set earlier.
    unsafe {
        let _ = SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2);
    }
}
