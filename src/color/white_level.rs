// SDR white level ("paper white") via the DisplayConfig API.
//
// On an HDR desktop the DWM composes into linear scRGB where 1.0 = 80
// nits; the user's "SDR content brightness" slider decides which scRGB
// value SDR white lands on (paperWhiteNits / 80). The tone mapper divides
// that back out, so this query is the anchor of the whole pipeline.

use tracing::debug;
use windows::Win32::Devices::Display::{
    DisplayConfigGetDeviceInfo, GetDisplayConfigBufferSizes, QueryDisplayConfig,
    DISPLAYCONFIG_DEVICE_INFO_GET_SDR_WHITE_LEVEL, DISPLAYCONFIG_DEVICE_INFO_GET_SOURCE_NAME,
    DISPLAYCONFIG_DEVICE_INFO_HEADER, DISPLAYCONFIG_MODE_INFO, DISPLAYCONFIG_PATH_INFO,
    DISPLAYCONFIG_SDR_WHITE_LEVEL, DISPLAYCONFIG_SOURCE_DEVICE_NAME, QDC_ONLY_ACTIVE_PATHS,
};
use windows::Win32::Foundation::{ERROR_SUCCESS, POINT};
use windows::Win32::Graphics::Gdi::{
    GetMonitorInfoW, MonitorFromPoint, HMONITOR, MONITORINFOEXW, MONITOR_DEFAULTTOPRIMARY,
};

/// scRGB reference white. Also the fallback when the query fails, which
/// makes the normalization scale 1, an identity that is safe on SDR
/// desktops.
pub const DEFAULT_SDR_WHITE_NITS: f32 = 80.0;

/// SDR white level of the primary monitor, in nits.
pub fn primary_monitor_sdr_white_nits() -> f32 {
    // SAFETY: MonitorFromPoint with DEFAULTTOPRIMARY always yields a
    // monitor handle.
    let primary = unsafe { MonitorFromPoint(POINT { x: 0, y: 0 }, MONITOR_DEFAULTTOPRIMARY) };
    query_sdr_white_nits(primary)
}

/// SDR white level for the given monitor, in nits.
///
/// Falls back to [`DEFAULT_SDR_WHITE_NITS`] when any step of the
/// DisplayConfig walk fails or the reported value is not positive.
pub fn query_sdr_white_nits(monitor: HMONITOR) -> f32 {
    let nits = sdr_white_nits(monitor).unwrap_or(DEFAULT_SDR_WHITE_NITS);
    let nits = if nits > 0.0 {
        nits
    } else {
        DEFAULT_SDR_WHITE_NITS
    };
    debug!(nits, "SDR white level");
    nits
}

/// HMONITOR → GDI device name → matching active path → SDR white level.
fn sdr_white_nits(monitor: HMONITOR) -> Option<f32> {
    let device_name = monitor_device_name(monitor)?;
    let path = matching_path(&device_name)?;
    target_white_level(&path)
}

fn monitor_device_name(monitor: HMONITOR) -> Option<[u16; 32]> {
    if monitor.0.is_null() {
        return None;
    }
    // SAFETY: GetMonitorInfoW fills a caller-provided MONITORINFOEXW;
    // cbSize must be set beforehand.
    unsafe {
        let mut info = MONITORINFOEXW::default();
        info.monitorInfo.cbSize = std::mem::size_of::<MONITORINFOEXW>() as u32;
        if !GetMonitorInfoW(monitor, &mut info.monitorInfo).as_bool() {
            return None;
        }
        Some(info.szDevice)
    }
}

/// Walk the active display-configuration paths and return the one whose
/// source GDI device name matches.
fn matching_path(device_name: &[u16; 32]) -> Option<DISPLAYCONFIG_PATH_INFO> {
    // SAFETY: the buffer-size handshake allocates exactly what
    // QueryDisplayConfig asks for; DisplayConfigGetDeviceInfo fills
    // caller-provided structs with header type/size set.
    unsafe {
        let mut num_paths = 0u32;
        let mut num_modes = 0u32;
        if GetDisplayConfigBufferSizes(QDC_ONLY_ACTIVE_PATHS, &mut num_paths, &mut num_modes)
            != ERROR_SUCCESS
        {
            return None;
        }

        let mut paths = vec![DISPLAYCONFIG_PATH_INFO::default(); num_paths as usize];
        let mut modes = vec![DISPLAYCONFIG_MODE_INFO::default(); num_modes as usize];
        if QueryDisplayConfig(
            QDC_ONLY_ACTIVE_PATHS,
            &mut num_paths,
            paths.as_mut_ptr(),
            &mut num_modes,
            modes.as_mut_ptr(),
            None,
        ) != ERROR_SUCCESS
        {
            return None;
        }
        paths.truncate(num_paths as usize);

        for path in paths {
            let mut source = DISPLAYCONFIG_SOURCE_DEVICE_NAME {
                header: DISPLAYCONFIG_DEVICE_INFO_HEADER {
                    r#type: DISPLAYCONFIG_DEVICE_INFO_GET_SOURCE_NAME,
                    size: std::mem::size_of::<DISPLAYCONFIG_SOURCE_DEVICE_NAME>() as u32,
                    adapterId: path.sourceInfo.adapterId,
                    id: path.sourceInfo.id,
                },
                ..Default::default()
            };
            if DisplayConfigGetDeviceInfo(&mut source.header) != 0 {
                continue;
            }
            if source.viewGdiDeviceName == *device_name {
                return Some(path);
            }
        }
    }
    None
}

/// Read the target-specific SDR white level from a resolved path.
///
/// The OS reports the value as 80-nit multiples scaled by 1000:
/// nits = (value / 1000) × 80.
fn target_white_level(path: &DISPLAYCONFIG_PATH_INFO) -> Option<f32> {
    // SAFETY: caller-provided struct with header type/size set.
    unsafe {
        let mut level = DISPLAYCONFIG_SDR_WHITE_LEVEL {
            header: DISPLAYCONFIG_DEVICE_INFO_HEADER {
                r#type: DISPLAYCONFIG_DEVICE_INFO_GET_SDR_WHITE_LEVEL,
                size: std::mem::size_of::<DISPLAYCONFIG_SDR_WHITE_LEVEL>() as u32,
                adapterId: path.targetInfo.adapterId,
                id: path.targetInfo.id,
            },
            SDRWhiteLevel: 0,
        };
        if DisplayConfigGetDeviceInfo(&mut level.header) != 0 {
            return None;
        }
        Some(level.SDRWhiteLevel as f32 / 1000.0 * 80.0)
    }
}
