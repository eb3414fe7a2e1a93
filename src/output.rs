// Output packaging: PNG encoding, CF_DIB assembly, toast thumbnail, and
// the hand-off boundary to the host's saver/clipboard helper.

pub mod dib;
pub mod png;
pub mod thumbnail;

use anyhow::Result;
use tracing::{debug, warn};

use crate::color::SdrBitmap;

/// Where a finished SDR bitmap ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Written to the user's chosen file or placed on the clipboard.
    Saved,
    /// The user backed out (Esc, right-click, cancelled dialog).
    Canceled,
}

/// The host-implemented boundary for persisting a finished capture.
///
/// The core encodes; the host owns the file-save dialog and the clipboard
/// syscall.
pub trait OutputSink {
    /// Ask the user for a destination and write the PNG bytes there.
    /// `Ok(false)` means the user cancelled the dialog.
    fn save_png(&mut self, png: &[u8]) -> Result<bool>;

    /// Hand a CF_DIB-compatible memory block to the clipboard. The system
    /// takes ownership on success.
    fn place_dib(&mut self, dib: &[u8]) -> Result<()>;
}

/// Encode and hand off a finished bitmap, then refresh the toast
/// thumbnail.
///
/// Thumbnail failure is non-fatal; the capture itself already succeeded.
pub fn deliver(
    bitmap: &SdrBitmap,
    to_clipboard: bool,
    sink: &mut dyn OutputSink,
) -> Result<CaptureOutcome> {
    if to_clipboard {
        let block = dib::build_dib(bitmap);
        sink.place_dib(&block)?;
    } else {
        let encoded = png::encode_png(bitmap)?;
        if !sink.save_png(&encoded)? {
            debug!("save dialog cancelled");
            return Ok(CaptureOutcome::Canceled);
        }
    }

    if let Err(e) = thumbnail::write_thumbnail(bitmap) {
        warn!("thumbnail write failed: {e:#}");
    }

    Ok(CaptureOutcome::Saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        png: Option<Vec<u8>>,
        dib: Option<Vec<u8>>,
        cancel_save: bool,
    }

    impl OutputSink for RecordingSink {
        fn save_png(&mut self, png: &[u8]) -> Result<bool> {
            if self.cancel_save {
                return Ok(false);
            }
            self.png = Some(png.to_vec());
            Ok(true)
        }

        fn place_dib(&mut self, dib: &[u8]) -> Result<()> {
            self.dib = Some(dib.to_vec());
            Ok(())
        }
    }

    fn bitmap() -> SdrBitmap {
        SdrBitmap {
            width: 2,
            height: 2,
            pixels: vec![255; 16],
        }
    }

    #[test]
    fn deliver_to_file_hands_png_to_sink() {
        let mut sink = RecordingSink {
            png: None,
            dib: None,
            cancel_save: false,
        };
        let outcome = deliver(&bitmap(), false, &mut sink).unwrap();
        assert_eq!(outcome, CaptureOutcome::Saved);
        let png = sink.png.expect("sink received no PNG");
        assert_eq!(&png[1..4], b"PNG");
        assert!(sink.dib.is_none());
    }

    #[test]
    fn deliver_to_clipboard_hands_dib_to_sink() {
        let mut sink = RecordingSink {
            png: None,
            dib: None,
            cancel_save: false,
        };
        let outcome = deliver(&bitmap(), true, &mut sink).unwrap();
        assert_eq!(outcome, CaptureOutcome::Saved);
        assert!(sink.png.is_none());
        assert!(sink.dib.is_some());
    }

    #[test]
    fn cancelled_dialog_is_not_an_error() {
        let mut sink = RecordingSink {
            png: None,
            dib: None,
            cancel_save: true,
        };
        let outcome = deliver(&bitmap(), false, &mut sink).unwrap();
        assert_eq!(outcome, CaptureOutcome::Canceled);
    }
}
