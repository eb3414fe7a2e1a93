// Direct2D selection chrome drawn over the swap-chain back buffer:
// dimming, the double-stroked selection border, dimension labels, and
// monitor outlines.

use anyhow::{Context, Result};
use windows::core::{w, Interface};
use windows::Win32::Graphics::Direct2D::Common::{
    D2D1_ALPHA_MODE_PREMULTIPLIED, D2D1_COLOR_F, D2D1_PIXEL_FORMAT, D2D_RECT_F,
};
use windows::Win32::Graphics::Direct2D::{
    D2D1CreateFactory, ID2D1Bitmap1, ID2D1Device, ID2D1DeviceContext, ID2D1Factory1, ID2D1Image,
    ID2D1SolidColorBrush, D2D1_BITMAP_OPTIONS_CANNOT_DRAW, D2D1_BITMAP_OPTIONS_TARGET,
    D2D1_BITMAP_PROPERTIES1, D2D1_DEVICE_CONTEXT_OPTIONS_NONE, D2D1_DRAW_TEXT_OPTIONS_NONE,
    D2D1_FACTORY_TYPE_SINGLE_THREADED,
};
use windows::Win32::Graphics::DirectWrite::{
    DWriteCreateFactory, IDWriteFactory, IDWriteTextFormat, DWRITE_FACTORY_TYPE_SHARED,
    DWRITE_FONT_STRETCH_NORMAL, DWRITE_FONT_STYLE_NORMAL, DWRITE_FONT_WEIGHT_BOLD,
    DWRITE_MEASURING_MODE_NATURAL, DWRITE_TEXT_ALIGNMENT_TRAILING,
};
use windows::Win32::Graphics::Dxgi::{IDXGIDevice, IDXGISurface};

use crate::frame::Rect;
use crate::preview::surface::PreviewSurface;

const OUTER_STROKE: f32 = 4.0;
const INNER_STROKE: f32 = 3.0;
const LABEL_W: f32 = 200.0;
const LABEL_H: f32 = 30.0;
const LABEL_PAD: f32 = 10.0;

struct Brushes {
    dim: ID2D1SolidColorBrush,
    black: ID2D1SolidColorBrush,
    green: ID2D1SolidColorBrush,
}

/// Per-invocation D2D state over the swap chain's back buffer.
///
/// Dropped before the swap chain is torn down; field order keeps the
/// target bitmap ahead of the device objects it was created from.
pub struct Overlay {
    target: ID2D1Bitmap1,
    ctx: ID2D1DeviceContext,
    text_format: IDWriteTextFormat,
    _dwrite: IDWriteFactory,
    _device: ID2D1Device,
    _factory: ID2D1Factory1,
}

impl Overlay {
    pub fn new(surface: &PreviewSurface) -> Result<Self> {
        // SAFETY: D2D object graph built over the existing D3D11 device
        // and the swap chain's back-buffer surface.
        unsafe {
            let factory: ID2D1Factory1 =
                D2D1CreateFactory(D2D1_FACTORY_TYPE_SINGLE_THREADED, None)
                    .context("D2D1CreateFactory failed")?;

            let dxgi_device: IDXGIDevice = surface
                .device
                .cast()
                .context("device is not a DXGI device")?;
            let device = factory
                .CreateDevice(&dxgi_device)
                .context("D2D CreateDevice failed")?;
            let ctx = device
                .CreateDeviceContext(D2D1_DEVICE_CONTEXT_OPTIONS_NONE)
                .context("D2D CreateDeviceContext failed")?;

            let back_buffer: IDXGISurface = surface.swap_chain.GetBuffer(0)?;
            let props = D2D1_BITMAP_PROPERTIES1 {
                pixelFormat: D2D1_PIXEL_FORMAT {
                    format: surface.back_buffer_format,
                    alphaMode: D2D1_ALPHA_MODE_PREMULTIPLIED,
                },
                bitmapOptions: D2D1_BITMAP_OPTIONS_TARGET | D2D1_BITMAP_OPTIONS_CANNOT_DRAW,
                ..Default::default()
            };
            let target = ctx
                .CreateBitmapFromDxgiSurface(&back_buffer, Some(&props))
                .context("CreateBitmapFromDxgiSurface failed")?;

            let dwrite: IDWriteFactory = DWriteCreateFactory(DWRITE_FACTORY_TYPE_SHARED)
                .context("DWriteCreateFactory failed")?;
            let text_format = dwrite
                .CreateTextFormat(
                    w!("Segoe UI"),
                    None,
                    DWRITE_FONT_WEIGHT_BOLD,
                    DWRITE_FONT_STYLE_NORMAL,
                    DWRITE_FONT_STRETCH_NORMAL,
                    22.0,
                    w!("en-us"),
                )
                .context("CreateTextFormat failed")?;

            Ok(Self {
                target,
                ctx,
                text_format,
                _dwrite: dwrite,
                _device: device,
                _factory: factory,
            })
        }
    }

    /// Dim the entire viewport at 50% black (initial region/picker state).
    pub fn draw_full_dim(&self, width: u32, height: u32) {
        self.draw(|ov, brushes| {
            let all = rect_f(0.0, 0.0, width as f32, height as f32);
            // SAFETY: draw call between BeginDraw/EndDraw.
            unsafe { ov.ctx.FillRectangle(&all, &brushes.dim) };
        });
    }

    /// Region-selection chrome: dim the four strips outside `sel`, then
    /// the double-stroked border and the dimension label.
    pub fn draw_selection(&self, sel: Rect, width: u32, height: u32) {
        self.draw(|ov, brushes| {
            ov.dim_around(brushes, sel, width as f32, height as f32);
            ov.border_and_label(
                brushes,
                sel,
                sel.width() as i32,
                sel.height() as i32,
            );
        });
    }

    /// Window-picker chrome: highlight the hovered rectangle (clamped to
    /// the viewport) or dim everything when nothing is hovered.
    pub fn draw_window_hover(
        &self,
        hovered: Option<Rect>,
        desktop: Rect,
        width: u32,
        height: u32,
    ) {
        match hovered {
            None => self.draw_full_dim(width, height),
            Some(screen_rect) => {
                // Screen space → client space, clamped to the viewport.
                let local = Rect::new(
                    (screen_rect.left - desktop.left).max(0),
                    (screen_rect.top - desktop.top).max(0),
                    (screen_rect.right - desktop.left).min(width as i32),
                    (screen_rect.bottom - desktop.top).min(height as i32),
                );
                self.draw(|ov, brushes| {
                    ov.dim_around(brushes, local, width as f32, height as f32);
                    // The label shows the window's true size, not the
                    // clamped on-screen portion.
                    ov.border_and_label(
                        brushes,
                        local,
                        screen_rect.width() as i32,
                        screen_rect.height() as i32,
                    );
                });
            }
        }
    }

    /// Full-desktop chrome: outline each monitor and label its size.
    pub fn draw_monitor_borders(&self, monitors: &[Rect], desktop: Rect) {
        self.draw(|ov, brushes| {
            for mon in monitors {
                let local = Rect::new(
                    mon.left - desktop.left,
                    mon.top - desktop.top,
                    mon.right - desktop.left,
                    mon.bottom - desktop.top,
                );
                ov.border_and_label(
                    brushes,
                    local,
                    mon.width() as i32,
                    mon.height() as i32,
                );
            }
        });
    }

    fn draw(&self, body: impl FnOnce(&Self, &Brushes)) {
        // SAFETY: SetTarget/BeginDraw/EndDraw bracket all drawing; the
        // target is detached afterwards so D3D can render the next frame.
        unsafe {
            self.ctx.SetTarget(&self.target);
            self.ctx.BeginDraw();
            if let Ok(brushes) = self.brushes() {
                body(self, &brushes);
            }
            let _ = self.ctx.EndDraw(None, None);
            self.ctx.SetTarget(None::<&ID2D1Image>);
        }
    }

    fn brushes(&self) -> Result<Brushes> {
        // SAFETY: brush creation on a valid device context.
        unsafe {
            Ok(Brushes {
                dim: self.ctx.CreateSolidColorBrush(&color(0.0, 0.0, 0.0, 0.5), None)?,
                black: self.ctx.CreateSolidColorBrush(&color(0.0, 0.0, 0.0, 0.9), None)?,
                green: self.ctx.CreateSolidColorBrush(&color(0.0, 1.0, 0.0, 1.0), None)?,
            })
        }
    }

    /// Fill the four strips outside the cutout.
    fn dim_around(&self, brushes: &Brushes, cutout: Rect, sw: f32, sh: f32) {
        let (l, t, r, b) = (
            cutout.left as f32,
            cutout.top as f32,
            cutout.right as f32,
            cutout.bottom as f32,
        );
        // SAFETY: draw calls between BeginDraw/EndDraw.
        unsafe {
            if t > 0.0 {
                self.ctx.FillRectangle(&rect_f(0.0, 0.0, sw, t), &brushes.dim);
            }
            if b < sh {
                self.ctx.FillRectangle(&rect_f(0.0, b, sw, sh), &brushes.dim);
            }
            if l > 0.0 {
                self.ctx.FillRectangle(&rect_f(0.0, t, l, b), &brushes.dim);
            }
            if r < sw {
                self.ctx.FillRectangle(&rect_f(r, t, sw, b), &brushes.dim);
            }
        }
    }

    /// 4 px black outer stroke, 3 px green inner stroke, and a "W × H"
    /// label tucked into the lower-right corner.
    fn border_and_label(&self, brushes: &Brushes, rect: Rect, label_w: i32, label_h: i32) {
        let (l, t, r, b) = (
            rect.left as f32,
            rect.top as f32,
            rect.right as f32,
            rect.bottom as f32,
        );
        // SAFETY: draw calls between BeginDraw/EndDraw.
        unsafe {
            self.ctx
                .DrawRectangle(&rect_f(l, t, r, b), &brushes.black, OUTER_STROKE, None);
            self.ctx.DrawRectangle(
                &rect_f(
                    l + OUTER_STROKE,
                    t + OUTER_STROKE,
                    r - OUTER_STROKE,
                    b - OUTER_STROKE,
                ),
                &brushes.green,
                INNER_STROKE,
                None,
            );

            if label_w <= 0 || label_h <= 0 {
                return;
            }

            let text: Vec<u16> = format!("{label_w} \u{00D7} {label_h}")
                .encode_utf16()
                .collect();

            let label_x = r - LABEL_PAD - LABEL_W;
            let label_y = b - LABEL_PAD - LABEL_H;

            self.ctx.FillRectangle(
                &rect_f(
                    label_x - 4.0,
                    label_y - 2.0,
                    label_x + LABEL_W + 4.0,
                    label_y + LABEL_H + 2.0,
                ),
                &brushes.black,
            );
            let _ = self.text_format.SetTextAlignment(DWRITE_TEXT_ALIGNMENT_TRAILING);
            self.ctx.DrawText(
                &text,
                &self.text_format,
                &rect_f(label_x, label_y, label_x + LABEL_W, label_y + LABEL_H),
                &brushes.green,
                D2D1_DRAW_TEXT_OPTIONS_NONE,
                DWRITE_MEASURING_MODE_NATURAL,
            );
        }
    }
}

fn rect_f(left: f32, top: f32, right: f32, bottom: f32) -> D2D_RECT_F {
    D2D_RECT_F {
        left,
        top,
        right,
        bottom,
    }
}

fn color(r: f32, g: f32, b: f32, a: f32) -> D2D1_COLOR_F {
    D2D1_COLOR_F { r, g, b, a }
}
