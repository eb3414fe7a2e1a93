// In-flight frame container and the CPU-side geometric helpers.
//
// A Frame is produced by the desktop duplicator or the window-capture
// adapter, optionally gains a CPU pixel buffer through readback, and is
// consumed by the tone mapper. Invariant: at least one of {GPU texture,
// CPU buffer} is populated; when both are present they hold the same image.

use anyhow::{bail, Result};
use windows::Win32::Graphics::Direct3D11::ID3D11Texture2D;
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_FORMAT_R16G16B16A16_FLOAT,
};

/// Pixel format tag for the two frame layouts the pipeline carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit BGRA, display-referred (SDR desktops, tone-mapped output).
    Bgra8,
    /// 16-bit float RGBA, linear scRGB (HDR desktops, the composite).
    Rgba16f,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Bgra8 => 4,
            PixelFormat::Rgba16f => 8,
        }
    }

    pub fn dxgi(self) -> DXGI_FORMAT {
        match self {
            PixelFormat::Bgra8 => DXGI_FORMAT_B8G8R8A8_UNORM,
            PixelFormat::Rgba16f => DXGI_FORMAT_R16G16B16A16_FLOAT,
        }
    }

    pub fn from_dxgi(format: DXGI_FORMAT) -> Result<Self> {
        match format {
            DXGI_FORMAT_B8G8R8A8_UNORM => Ok(PixelFormat::Bgra8),
            DXGI_FORMAT_R16G16B16A16_FLOAT => Ok(PixelFormat::Rgba16f),
            _ => bail!("unsupported DXGI format for frame container: {:?}", format),
        }
    }
}

/// Signed screen-space rectangle, half-open on the right/bottom edges.
///
/// Used for virtual-desktop bounds, drag selections, window rectangles,
/// and crop regions alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }

    /// Normalize two drag endpoints into a well-ordered rectangle.
    pub fn from_points(ax: i32, ay: i32, bx: i32, by: i32) -> Self {
        Self {
            left: ax.min(bx),
            top: ay.min(by),
            right: ax.max(bx),
            bottom: ay.max(by),
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Axis-aligned union, the building block of the virtual-desktop bounds.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// A captured frame: dimensions, format, and one or both of a GPU texture
/// and a tightly packed CPU pixel buffer (no row padding).
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// GPU-resident image; absent for CPU-only frames such as crops.
    pub texture: Option<ID3D11Texture2D>,
    /// Tight CPU pixels; populated lazily via readback.
    pub pixels: Option<Vec<u8>>,
}

impl Frame {
    pub fn bytes_per_pixel(&self) -> u32 {
        self.format.bytes_per_pixel()
    }

    /// Expected size of the CPU buffer when present.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.bytes_per_pixel() as usize
    }

    /// Extract a sub-rectangle from the CPU pixel buffer into a new frame.
    ///
    /// Each edge is clamped to the frame bounds; an empty intersection
    /// yields a zero-area frame rather than an error. The result is
    /// CPU-only: crop runs once, on the final confirmed capture, so the
    /// GPU handle is not carried over.
    pub fn crop(&self, rect: Rect) -> Result<Frame> {
        let Some(src) = self.pixels.as_deref() else {
            bail!("crop requires CPU pixels; call materialize_pixels first");
        };

        let w = self.width as i32;
        let h = self.height as i32;
        let left = rect.left.clamp(0, w);
        let top = rect.top.clamp(0, h);
        let right = rect.right.clamp(0, w);
        let bottom = rect.bottom.clamp(0, h);

        let crop_w = (right - left).max(0) as u32;
        let crop_h = (bottom - top).max(0) as u32;

        let bpp = self.bytes_per_pixel() as usize;
        let src_stride = self.width as usize * bpp;
        let dst_stride = crop_w as usize * bpp;

        let mut pixels = vec![0u8; dst_stride * crop_h as usize];
        for row in 0..crop_h as usize {
            let src_off = (top as usize + row) * src_stride + left as usize * bpp;
            let dst_off = row * dst_stride;
            pixels[dst_off..dst_off + dst_stride]
                .copy_from_slice(&src[src_off..src_off + dst_stride]);
        }

        Ok(Frame {
            width: crop_w,
            height: crop_h,
            format: self.format,
            texture: None,
            pixels: Some(pixels),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A CPU-only frame with a recognizable per-pixel byte pattern.
    fn patterned_frame(width: u32, height: u32) -> Frame {
        let bpp = 4usize;
        let mut pixels = vec![0u8; width as usize * height as usize * bpp];
        for y in 0..height as usize {
            for x in 0..width as usize {
                let off = (y * width as usize + x) * bpp;
                pixels[off] = x as u8;
                pixels[off + 1] = y as u8;
                pixels[off + 2] = (x ^ y) as u8;
                pixels[off + 3] = 255;
            }
        }
        Frame {
            width,
            height,
            format: PixelFormat::Bgra8,
            texture: None,
            pixels: Some(pixels),
        }
    }

    #[test]
    fn crop_full_bounds_is_bitwise_identity() {
        let frame = patterned_frame(16, 9);
        let cropped = frame.crop(Rect::new(0, 0, 16, 9)).unwrap();
        assert_eq!(cropped.width, 16);
        assert_eq!(cropped.height, 9);
        assert_eq!(cropped.pixels, frame.pixels);
    }

    #[test]
    fn crop_extracts_expected_rows() {
        let frame = patterned_frame(8, 8);
        let cropped = frame.crop(Rect::new(2, 3, 6, 7)).unwrap();
        assert_eq!((cropped.width, cropped.height), (4, 4));

        let pixels = cropped.pixels.unwrap();
        // Top-left pixel of the crop came from (2, 3).
        assert_eq!(&pixels[0..3], &[2, 3, 2 ^ 3]);
        // Last pixel came from (5, 6).
        let last = pixels.len() - 4;
        assert_eq!(&pixels[last..last + 3], &[5, 6, 5 ^ 6]);
    }

    #[test]
    fn crop_clamps_out_of_range_rect() {
        let frame = patterned_frame(8, 8);
        let cropped = frame.crop(Rect::new(-10, -10, 100, 100)).unwrap();
        assert_eq!((cropped.width, cropped.height), (8, 8));
        assert_eq!(cropped.pixels, frame.pixels);
    }

    #[test]
    fn crop_empty_intersection_is_zero_area() {
        let frame = patterned_frame(8, 8);
        let cropped = frame.crop(Rect::new(20, 20, 30, 30)).unwrap();
        assert_eq!((cropped.width, cropped.height), (0, 0));
        assert_eq!(cropped.pixels.unwrap().len(), 0);
    }

    #[test]
    fn crop_without_cpu_pixels_fails() {
        let frame = Frame {
            width: 4,
            height: 4,
            format: PixelFormat::Rgba16f,
            texture: None,
            pixels: None,
        };
        assert!(frame.crop(Rect::new(0, 0, 2, 2)).is_err());
    }

    #[test]
    fn rect_normalization_and_union() {
        let r = Rect::from_points(10, 20, 3, 5);
        assert_eq!(r, Rect::new(3, 5, 10, 20));

        let a = Rect::new(0, 0, 1920, 1080);
        let b = Rect::new(1920, -200, 4480, 1240);
        assert_eq!(a.union(&b), Rect::new(0, -200, 4480, 1240));

        assert!(r.contains(3, 5));
        assert!(!r.contains(10, 5));
    }
}
