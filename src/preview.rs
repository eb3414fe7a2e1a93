// Interactive preview: a fullscreen top-most window spanning the virtual
// desktop that shows the captured composite and lets the user confirm the
// whole desktop, drag a rectangle, or hover-pick a window.
//
// All three modes share the same shell (window + swap chain + overlay)
// and differ only in input handling and chrome. On confirmation the CPU
// pixels are materialized (and cropped, or replaced by a per-window
// capture), tone-mapped, and handed to the saver/clipboard helper.

pub mod overlay;
pub mod picker;
pub mod surface;

use anyhow::{bail, Context, Result};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};
use windows::core::{w, BOOL, PCWSTR};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows::Win32::Graphics::Direct3D11::{ID3D11Device, ID3D11DeviceContext};
use windows::Win32::Graphics::Gdi::{EnumDisplayMonitors, HDC, HMONITOR};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::Input::KeyboardAndMouse::{ReleaseCapture, SetCapture, VK_ESCAPE};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW,
    GetSystemMetrics, GetWindowLongPtrW, LoadCursorW, PeekMessageW, RegisterClassExW, SetCursor,
    SetForegroundWindow, SetWindowLongPtrW, ShowWindow,
    TranslateMessage, WaitMessage, CREATESTRUCTW, CS_HREDRAW, CS_VREDRAW, GWLP_USERDATA, HTCLIENT,
    IDC_ARROW, IDC_CROSS, IDC_HAND, MSG, PM_REMOVE, SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN,
    SM_XVIRTUALSCREEN, SM_YVIRTUALSCREEN, SW_SHOW, WM_DESTROY, WM_KEYDOWN, WM_LBUTTONDOWN,
    WM_LBUTTONUP, WM_MBUTTONUP, WM_MOUSEMOVE, WM_NCCREATE, WM_QUIT, WM_RBUTTONUP, WM_SETCURSOR,
    WNDCLASSEXW, WS_EX_TOPMOST, WS_POPUP,
};

use crate::capture::capture_window;
use crate::color::tone_map;
use crate::d3d11::readback::materialize_pixels;
use crate::frame::{Frame, Rect};
use crate::output::{self, CaptureOutcome, OutputSink};
use crate::preview::overlay::Overlay;
use crate::preview::picker::WindowInfo;
use crate::preview::surface::PreviewSurface;

const WINDOW_CLASS: PCWSTR = w!("ScrgbShot.Preview");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreviewMode {
    FullDesktop,
    Region,
    WindowPick,
}

/// Mutable interaction state shared between the window procedure and the
/// message pump. Lives in a Box whose address is stored in the window's
/// user data; everything runs on one thread.
struct PreviewState {
    mode: PreviewMode,
    /// Virtual-desktop rect in screen coordinates; client (0,0) maps to
    /// its top-left corner.
    desktop: Rect,
    done: bool,
    /// Full-desktop mode: the user clicked to confirm.
    confirmed: bool,
    needs_redraw: bool,
    dragging: bool,
    drag_start: (i32, i32),
    drag_end: (i32, i32),
    /// Finalized selection in client (= composite) coordinates. In
    /// window-pick mode this is the fallback crop rect.
    selection: Option<Rect>,
    windows: Vec<WindowInfo>,
    hovered: Option<usize>,
    picked: Option<HWND>,
}

/// Show the full-desktop preview; any click confirms saving the whole
/// composite, Esc cancels.
pub fn capture_full_desktop(
    frame: Frame,
    device: &ID3D11Device,
    to_clipboard: bool,
    sink: &mut dyn OutputSink,
) -> Result<CaptureOutcome> {
    run_preview(frame, device, PreviewMode::FullDesktop, to_clipboard, sink)
}

/// Show the drag-to-select preview and save the chosen rectangle.
pub fn capture_region(
    frame: Frame,
    device: &ID3D11Device,
    to_clipboard: bool,
    sink: &mut dyn OutputSink,
) -> Result<CaptureOutcome> {
    run_preview(frame, device, PreviewMode::Region, to_clipboard, sink)
}

/// Show the window-picker preview and save the hovered window, using the
/// per-window capture API with a composite-crop fallback.
pub fn capture_window_pick(
    frame: Frame,
    device: &ID3D11Device,
    to_clipboard: bool,
    sink: &mut dyn OutputSink,
) -> Result<CaptureOutcome> {
    run_preview(frame, device, PreviewMode::WindowPick, to_clipboard, sink)
}

fn run_preview(
    mut frame: Frame,
    device: &ID3D11Device,
    mode: PreviewMode,
    to_clipboard: bool,
    sink: &mut dyn OutputSink,
) -> Result<CaptureOutcome> {
    // Enumerate pick targets before our own fullscreen window exists, so
    // it cannot appear in its own list.
    let windows = if mode == PreviewMode::WindowPick {
        let windows = picker::enumerate_visible_windows();
        if windows.is_empty() {
            bail!("no visible windows to pick from");
        }
        windows
    } else {
        Vec::new()
    };

    let desktop = virtual_desktop_rect();
    let width = desktop.width();
    let height = desktop.height();

    let mut state = Box::new(PreviewState {
        mode,
        desktop,
        done: false,
        confirmed: false,
        needs_redraw: false,
        dragging: false,
        drag_start: (0, 0),
        drag_end: (0, 0),
        selection: None,
        windows,
        hovered: None,
        picked: None,
    });
    let state_ptr: *mut PreviewState = &mut *state;

    let hwnd = create_preview_window(desktop, state_ptr)?;

    let shell = (|| -> Result<(PreviewSurface, Option<Overlay>)> {
        let mut surface = PreviewSurface::new(device, hwnd, width, height)?;
        surface.upload(&frame)?;
        let overlay = match Overlay::new(&surface) {
            Ok(overlay) => Some(overlay),
            // Full-desktop mode degrades to a plain preview without
            // chrome; the selection modes cannot work without it.
            Err(e) if mode == PreviewMode::FullDesktop => {
                warn!("overlay unavailable: {e:#}");
                None
            }
            Err(e) => return Err(e),
        };
        Ok((surface, overlay))
    })();

    let (surface, overlay) = match shell {
        Ok(pair) => pair,
        Err(e) => {
            // SAFETY: hwnd was created above and not yet destroyed.
            unsafe {
                let _ = DestroyWindow(hwnd);
            }
            return Err(e);
        }
    };

    // SAFETY: window show/focus calls on the new window.
    unsafe {
        let _ = ShowWindow(hwnd, SW_SHOW);
        let _ = SetForegroundWindow(hwnd);
    }

    // Initial render + mode-specific pump.
    match mode {
        PreviewMode::FullDesktop => {
            surface.render_base();
            if let Some(overlay) = overlay.as_ref() {
                let monitors = monitor_rects();
                overlay.draw_monitor_borders(&monitors, desktop);
            }
            surface.present();
            pump_blocking(state_ptr);
        }
        PreviewMode::Region => {
            let overlay = overlay.as_ref().unwrap();
            surface.render_base();
            overlay.draw_full_dim(width, height);
            surface.present();
            pump_redraw(state_ptr, |st| {
                if !st.dragging {
                    return false;
                }
                let sel = Rect::from_points(
                    st.drag_start.0,
                    st.drag_start.1,
                    st.drag_end.0,
                    st.drag_end.1,
                );
                surface.render_base();
                overlay.draw_selection(sel, width, height);
                surface.present();
                true
            });
        }
        PreviewMode::WindowPick => {
            let overlay = overlay.as_ref().unwrap();
            surface.render_base();
            overlay.draw_window_hover(None, desktop, width, height);
            surface.present();
            pump_redraw(state_ptr, |st| {
                let hovered = st.hovered.map(|i| st.windows[i].rect);
                surface.render_base();
                overlay.draw_window_hover(hovered, desktop, width, height);
                surface.present();
                true
            });
        }
    }

    // Reverse construction order: overlay resources first, then the
    // context flush, then the window.
    drop(overlay);
    surface.teardown();
    // SAFETY: hwnd is still alive; WM_DESTROY only flips the done flag.
    unsafe {
        let _ = DestroyWindow(hwnd);
    }

    // The pump has drained; decide what the user asked for.
    let context = immediate_context(device)?;
    match state.mode {
        PreviewMode::FullDesktop => {
            if !state.confirmed {
                debug!("full-desktop preview cancelled");
                return Ok(CaptureOutcome::Canceled);
            }
            materialize_pixels(&mut frame, &context)?;
            let bitmap = tone_map(&frame)?;
            output::deliver(&bitmap, to_clipboard, sink)
        }
        PreviewMode::Region => {
            let Some(selection) = state.selection else {
                debug!("region preview cancelled");
                return Ok(CaptureOutcome::Canceled);
            };
            materialize_pixels(&mut frame, &context)?;
            let cropped = frame.crop(selection)?;
            if cropped.width == 0 || cropped.height == 0 {
                return Ok(CaptureOutcome::Canceled);
            }
            let bitmap = tone_map(&cropped)?;
            output::deliver(&bitmap, to_clipboard, sink)
        }
        PreviewMode::WindowPick => {
            let Some(picked) = state.picked else {
                debug!("window-picker preview cancelled");
                return Ok(CaptureOutcome::Canceled);
            };
            match capture_window(picked, device) {
                Ok(window_frame) => {
                    let bitmap = tone_map(&window_frame)?;
                    output::deliver(&bitmap, to_clipboard, sink)
                }
                Err(e) => {
                    // Losing the per-window path costs occlusion
                    // robustness, not the capture itself.
                    warn!("window capture failed, cropping composite instead: {e:#}");
                    let selection = state
                        .selection
                        .context("no fallback rectangle for picked window")?;
                    materialize_pixels(&mut frame, &context)?;
                    let cropped = frame.crop(selection)?;
                    if cropped.width == 0 || cropped.height == 0 {
                        bail!("picked window lies outside the composite");
                    }
                    let bitmap = tone_map(&cropped)?;
                    output::deliver(&bitmap, to_clipboard, sink)
                }
            }
        }
    }
}

fn immediate_context(device: &ID3D11Device) -> Result<ID3D11DeviceContext> {
    // SAFETY: immediate-context query on a valid device.
    unsafe {
        device
            .GetImmediateContext()
            .context("device has no immediate context")
    }
}

// ---------------------------------------------------------------------------
// Window creation and message pumps
// ---------------------------------------------------------------------------

fn create_preview_window(desktop: Rect, state: *mut PreviewState) -> Result<HWND> {
    static CLASS: OnceCell<u16> = OnceCell::new();

    // SAFETY: class registration and window creation on this thread; the
    // state pointer outlives the window.
    unsafe {
        let instance = GetModuleHandleW(None).context("GetModuleHandleW failed")?;

        let atom = *CLASS.get_or_try_init(|| -> Result<u16> {
            let wc = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(preview_wndproc),
                hInstance: instance.into(),
                hCursor: LoadCursorW(None, IDC_ARROW)?,
                lpszClassName: WINDOW_CLASS,
                ..Default::default()
            };
            let atom = RegisterClassExW(&wc);
            if atom == 0 {
                bail!("RegisterClassExW failed");
            }
            Ok(atom)
        })?;
        let _ = atom;

        let hwnd = CreateWindowExW(
            WS_EX_TOPMOST,
            WINDOW_CLASS,
            w!("ScrgbShot Preview"),
            WS_POPUP,
            desktop.left,
            desktop.top,
            desktop.width() as i32,
            desktop.height() as i32,
            None,
            None,
            Some(instance.into()),
            Some(state as *const _),
        )
        .context("CreateWindowExW failed")?;

        Ok(hwnd)
    }
}

/// Plain blocking pump for the full-desktop mode: nothing redraws until
/// the user acts.
fn pump_blocking(state: *mut PreviewState) {
    let mut msg = MSG::default();
    // SAFETY: classic GetMessage loop; state is read between dispatches on
    // the same thread that mutates it inside the window procedure.
    unsafe {
        while !(*state).done {
            let ret = GetMessageW(&mut msg, None, 0, 0);
            if ret.0 <= 0 {
                break;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

/// Peek-and-wait pump for the selection modes: drains pending messages,
/// redraws only when the window procedure raised the flag, and otherwise
/// sleeps in WaitMessage to avoid a busy spin.
fn pump_redraw(state: *mut PreviewState, mut redraw: impl FnMut(&PreviewState) -> bool) {
    let mut msg = MSG::default();
    // SAFETY: same single-threaded discipline as pump_blocking.
    unsafe {
        loop {
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                if msg.message == WM_QUIT {
                    (*state).done = true;
                    break;
                }
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
            if (*state).done {
                break;
            }

            if (*state).needs_redraw {
                (*state).needs_redraw = false;
                if !redraw(&*state) {
                    let _ = WaitMessage();
                }
            } else {
                let _ = WaitMessage();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Window procedure
// ---------------------------------------------------------------------------

fn lparam_point(lp: LPARAM) -> (i32, i32) {
    let x = (lp.0 & 0xFFFF) as u16 as i16 as i32;
    let y = ((lp.0 >> 16) & 0xFFFF) as u16 as i16 as i32;
    (x, y)
}

unsafe extern "system" fn preview_wndproc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if msg == WM_NCCREATE {
        let cs = lparam.0 as *const CREATESTRUCTW;
        SetWindowLongPtrW(hwnd, GWLP_USERDATA, (*cs).lpCreateParams as isize);
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    }

    let state_ptr = GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *mut PreviewState;
    let Some(state) = state_ptr.as_mut() else {
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    };

    match msg {
        WM_KEYDOWN => {
            if wparam.0 as u16 == VK_ESCAPE.0 {
                state.done = true;
            }
            LRESULT(0)
        }

        WM_SETCURSOR => {
            if (lparam.0 & 0xFFFF) as u32 == HTCLIENT {
                let id = match state.mode {
                    PreviewMode::Region => IDC_CROSS,
                    PreviewMode::WindowPick => IDC_HAND,
                    PreviewMode::FullDesktop => IDC_ARROW,
                };
                if let Ok(cursor) = LoadCursorW(None, id) {
                    let _ = SetCursor(Some(cursor));
                }
                return LRESULT(1);
            }
            DefWindowProcW(hwnd, msg, wparam, lparam)
        }

        WM_LBUTTONDOWN => {
            if state.mode == PreviewMode::Region {
                let pt = lparam_point(lparam);
                state.dragging = true;
                state.drag_start = pt;
                state.drag_end = pt;
                state.needs_redraw = true;
                let _ = SetCapture(hwnd);
            }
            LRESULT(0)
        }

        WM_MOUSEMOVE => {
            match state.mode {
                PreviewMode::WindowPick => {
                    let (cx, cy) = lparam_point(lparam);
                    let hovered = picker::window_at_point(
                        &state.windows,
                        cx + state.desktop.left,
                        cy + state.desktop.top,
                    );
                    if hovered != state.hovered {
                        state.hovered = hovered;
                        state.needs_redraw = true;
                    }
                }
                PreviewMode::Region if state.dragging => {
                    state.drag_end = lparam_point(lparam);
                    state.needs_redraw = true;
                }
                _ => {}
            }
            LRESULT(0)
        }

        WM_LBUTTONUP => {
            match state.mode {
                PreviewMode::Region if state.dragging => {
                    let _ = ReleaseCapture();
                    state.dragging = false;
                    state.drag_end = lparam_point(lparam);
                    let sel = Rect::from_points(
                        state.drag_start.0,
                        state.drag_start.1,
                        state.drag_end.0,
                        state.drag_end.1,
                    );
                    // Sub-2px drags are noise, not a selection; the user
                    // can drag again.
                    if sel.width() > 1 && sel.height() > 1 {
                        state.selection = Some(sel);
                        state.done = true;
                    }
                }
                PreviewMode::WindowPick => {
                    if let Some(index) = state.hovered {
                        let info = &state.windows[index];
                        state.picked = Some(info.hwnd);
                        // Fallback crop rect in composite coordinates.
                        state.selection = Some(Rect::new(
                            info.rect.left - state.desktop.left,
                            info.rect.top - state.desktop.top,
                            info.rect.right - state.desktop.left,
                            info.rect.bottom - state.desktop.top,
                        ));
                        state.done = true;
                    }
                }
                PreviewMode::FullDesktop => {
                    state.confirmed = true;
                    state.done = true;
                }
                _ => {}
            }
            LRESULT(0)
        }

        WM_RBUTTONUP | WM_MBUTTONUP => {
            if state.mode == PreviewMode::FullDesktop {
                // Any button confirms the full-desktop capture.
                state.confirmed = true;
            }
            state.done = true;
            LRESULT(0)
        }

        WM_DESTROY => {
            state.done = true;
            LRESULT(0)
        }

        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

// ---------------------------------------------------------------------------
// Screen geometry
// ---------------------------------------------------------------------------

/// The virtual desktop in screen coordinates (union of all monitors).
pub fn virtual_desktop_rect() -> Rect {
    // SAFETY: GetSystemMetrics has no failure mode.
    unsafe {
        let left = GetSystemMetrics(SM_XVIRTUALSCREEN);
        let top = GetSystemMetrics(SM_YVIRTUALSCREEN);
        Rect::new(
            left,
            top,
            left + GetSystemMetrics(SM_CXVIRTUALSCREEN),
            top + GetSystemMetrics(SM_CYVIRTUALSCREEN),
        )
    }
}

/// Desktop rectangles of all monitors, for the full-desktop overlay.
fn monitor_rects() -> Vec<Rect> {
    let mut rects: Vec<Rect> = Vec::new();
    // SAFETY: the callback runs synchronously; the Vec outlives the call.
    unsafe {
        let _ = EnumDisplayMonitors(
            None,
            None,
            Some(monitor_enum_proc),
            LPARAM(&mut rects as *mut Vec<Rect> as isize),
        );
    }
    rects
}

unsafe extern "system" fn monitor_enum_proc(
    _monitor: HMONITOR,
    _hdc: HDC,
    rect: *mut RECT,
    lparam: LPARAM,
) -> BOOL {
    let rects = &mut *(lparam.0 as *mut Vec<Rect>);
    if let Some(r) = rect.as_ref() {
        rects.push(Rect::new(r.left, r.top, r.right, r.bottom));
    }
    BOOL(1)
}
