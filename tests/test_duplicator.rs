// Hardware integration tests: these need a real Windows desktop session
// with at least one attached monitor, so they are ignored by default.
// Run with `cargo test -- --ignored` on a capture-capable machine.

#![cfg(windows)]

use scrgbshot::{d3d11, enable_dpi_awareness, DesktopDuplicator, PixelFormat};

#[test]
#[ignore = "requires an interactive desktop session"]
fn duplicator_composites_the_virtual_desktop() {
    enable_dpi_awareness();
    let (device, context) = d3d11::create_device().expect("device creation failed");
    let mut duplicator = DesktopDuplicator::new(&device).expect("duplicator init failed");

    let bounds = duplicator.bounds();
    assert!(bounds.width() > 0 && bounds.height() > 0);

    let mut frame = duplicator
        .capture_with_recovery()
        .expect("desktop capture failed");

    // Composite dimensions equal virtual-desktop bounds, format is FP16.
    assert_eq!(frame.width, bounds.width());
    assert_eq!(frame.height, bounds.height());
    assert_eq!(frame.format, PixelFormat::Rgba16f);
    assert!(frame.texture.is_some());
    assert!(frame.pixels.is_none(), "readback must be lazy");

    d3d11::readback::materialize_pixels(&mut frame, &context).expect("readback failed");
    let pixels = frame.pixels.as_deref().unwrap();
    assert_eq!(pixels.len(), frame.expected_len());
    assert!(
        pixels.iter().any(|&b| b != 0),
        "captured desktop is entirely black"
    );
}

#[test]
#[ignore = "requires an interactive desktop session"]
fn duplicator_recovers_after_reinit() {
    enable_dpi_awareness();
    let (device, _context) = d3d11::create_device().expect("device creation failed");
    let mut duplicator = DesktopDuplicator::new(&device).expect("duplicator init failed");

    let first = duplicator.capture().expect("first capture failed");
    assert!(first.texture.is_some());

    // Rebuilding the sessions must yield a working duplicator again.
    duplicator.reinit().expect("reinit failed");
    let second = duplicator.capture().expect("capture after reinit failed");
    assert_eq!(second.width, first.width);
    assert_eq!(second.height, first.height);
}
