// Window enumeration for the hover-pick overlay.
//
// EnumWindows walks top-level windows front to back; preserving that
// order means the first rectangle containing the pointer is the topmost
// visible window.

use windows::core::BOOL;
use windows::Win32::Foundation::{HWND, LPARAM, RECT};
use windows::Win32::Graphics::Dwm::{
    DwmGetWindowAttribute, DWMWA_CLOAKED, DWMWA_EXTENDED_FRAME_BOUNDS,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowRect, IsIconic, IsWindowVisible,
};

use crate::frame::Rect;

/// A pickable top-level window: its handle plus the rectangle the user
/// perceives as "the window" (extended frame bounds, no drop shadow).
pub struct WindowInfo {
    pub hwnd: HWND,
    pub rect: Rect,
}

/// Enumerate visible top-level windows in Z-order.
///
/// Skips invisible and minimized windows, cloaked windows (hidden UWP
/// containers, other virtual desktops), and degenerate rectangles.
pub fn enumerate_visible_windows() -> Vec<WindowInfo> {
    let mut windows: Vec<WindowInfo> = Vec::new();
    // SAFETY: the callback runs synchronously on this thread; the Vec
    // outlives the EnumWindows call.
    unsafe {
        let _ = EnumWindows(
            Some(enum_proc),
            LPARAM(&mut windows as *mut Vec<WindowInfo> as isize),
        );
    }
    windows
}

unsafe extern "system" fn enum_proc(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let windows = &mut *(lparam.0 as *mut Vec<WindowInfo>);

    if !IsWindowVisible(hwnd).as_bool() || IsIconic(hwnd).as_bool() {
        return BOOL(1);
    }

    // Cloaked windows are "visible" to EnumWindows but not to the user.
    let mut cloaked = 0u32;
    let cloak_query = DwmGetWindowAttribute(
        hwnd,
        DWMWA_CLOAKED,
        &mut cloaked as *mut u32 as *mut _,
        std::mem::size_of::<u32>() as u32,
    );
    if cloak_query.is_ok() && cloaked != 0 {
        return BOOL(1);
    }

    // Prefer the DWM extended frame bounds over the raw window rect.
    let mut rect = RECT::default();
    let have_rect = DwmGetWindowAttribute(
        hwnd,
        DWMWA_EXTENDED_FRAME_BOUNDS,
        &mut rect as *mut RECT as *mut _,
        std::mem::size_of::<RECT>() as u32,
    )
    .is_ok()
        || GetWindowRect(hwnd, &mut rect).is_ok();
    if !have_rect {
        return BOOL(1);
    }

    if rect.right - rect.left <= 1 || rect.bottom - rect.top <= 1 {
        return BOOL(1);
    }

    windows.push(WindowInfo {
        hwnd,
        rect: Rect::new(rect.left, rect.top, rect.right, rect.bottom),
    });
    BOOL(1)
}

/// Index of the topmost window containing a screen-space point.
///
/// The list is already front-to-back, so the first hit wins.
pub fn window_at_point(windows: &[WindowInfo], x: i32, y: i32) -> Option<usize> {
    windows.iter().position(|w| w.rect.contains(x, y))
}
