// CF_DIB packaging for clipboard hand-off.
//
// Layout: a 40-byte BITMAPINFOHEADER (planes = 1, 32 bpp, BI_RGB,
// positive biHeight meaning bottom-up) followed by the pixel rows in
// bottom-up order, BGRA, 4-byte stride. Assembled as plain bytes so the
// clipboard syscall stays on the host's side of the boundary.

use crate::color::SdrBitmap;

const BITMAPINFOHEADER_SIZE: u32 = 40;
const BI_RGB: u32 = 0;

/// Build a CF_DIB-compatible memory block from a BGRA8 bitmap.
pub fn build_dib(bitmap: &SdrBitmap) -> Vec<u8> {
    let stride = bitmap.width as usize * 4;
    let image_size = stride * bitmap.height as usize;

    let mut block = Vec::with_capacity(BITMAPINFOHEADER_SIZE as usize + image_size);

    // BITMAPINFOHEADER, field by field, little-endian.
    block.extend_from_slice(&BITMAPINFOHEADER_SIZE.to_le_bytes()); // biSize
    block.extend_from_slice(&(bitmap.width as i32).to_le_bytes()); // biWidth
    block.extend_from_slice(&(bitmap.height as i32).to_le_bytes()); // biHeight (positive = bottom-up)
    block.extend_from_slice(&1u16.to_le_bytes()); // biPlanes
    block.extend_from_slice(&32u16.to_le_bytes()); // biBitCount
    block.extend_from_slice(&BI_RGB.to_le_bytes()); // biCompression
    block.extend_from_slice(&(image_size as u32).to_le_bytes()); // biSizeImage
    block.extend_from_slice(&0i32.to_le_bytes()); // biXPelsPerMeter
    block.extend_from_slice(&0i32.to_le_bytes()); // biYPelsPerMeter
    block.extend_from_slice(&0u32.to_le_bytes()); // biClrUsed
    block.extend_from_slice(&0u32.to_le_bytes()); // biClrImportant

    // Rows in reverse: top-down source becomes bottom-up DIB.
    for row in (0..bitmap.height as usize).rev() {
        let off = row * stride;
        block.extend_from_slice(&bitmap.pixels[off..off + stride]);
    }

    block
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_u32(block: &[u8], off: usize) -> u32 {
        u32::from_le_bytes(block[off..off + 4].try_into().unwrap())
    }

    fn read_i32(block: &[u8], off: usize) -> i32 {
        i32::from_le_bytes(block[off..off + 4].try_into().unwrap())
    }

    fn read_u16(block: &[u8], off: usize) -> u16 {
        u16::from_le_bytes(block[off..off + 2].try_into().unwrap())
    }

    #[test]
    fn header_fields_match_the_dib_contract() {
        let bitmap = SdrBitmap {
            width: 3,
            height: 2,
            pixels: vec![0; 24],
        };
        let block = build_dib(&bitmap);

        assert_eq!(block.len(), 40 + 24);
        assert_eq!(read_u32(&block, 0), 40); // biSize
        assert_eq!(read_i32(&block, 4), 3); // biWidth
        assert_eq!(read_i32(&block, 8), 2); // biHeight, positive
        assert_eq!(read_u16(&block, 12), 1); // biPlanes
        assert_eq!(read_u16(&block, 14), 32); // biBitCount
        assert_eq!(read_u32(&block, 16), 0); // BI_RGB
        assert_eq!(read_u32(&block, 20), 24); // biSizeImage
    }

    #[test]
    fn rows_are_stored_bottom_up() {
        // Two rows with distinct bytes: top row 0xAA, bottom row 0xBB.
        let mut pixels = vec![0xAA; 8];
        pixels.extend_from_slice(&[0xBB; 8]);
        let bitmap = SdrBitmap {
            width: 2,
            height: 2,
            pixels,
        };
        let block = build_dib(&bitmap);

        // The DIB's first stored row must be the source's bottom row.
        assert!(block[40..48].iter().all(|&b| b == 0xBB));
        assert!(block[48..56].iter().all(|&b| b == 0xAA));
    }
}
