//! Paired Bluetooth devices via the Win32 Bluetooth API

use crate::devices::connection::{PairedDevice, PairedDeviceSource};
use crate::error::{AppError, Result};
use log::debug;
use std::mem;
use windows::Win32::Devices::Bluetooth::{
    BluetoothFindDeviceClose, BluetoothFindFirstDevice, BluetoothFindNextDevice,
    BLUETOOTH_DEVICE_INFO, BLUETOOTH_DEVICE_SEARCH_PARAMS,
};
use windows::Win32::Foundation::{BOOL, HANDLE};

/// Remembered and connected devices known to the local radio
#[derive(Debug, Default, Clone, Copy)]
pub struct BluetoothRadioSource;

impl BluetoothRadioSource {
    pub fn new() -> Self {
        Self
    }
}

impl PairedDeviceSource for BluetoothRadioSource {
    fn paired_devices(&self) -> Result<Vec<PairedDevice>> {
        let mut search_params = BLUETOOTH_DEVICE_SEARCH_PARAMS {
            dwSize: mem::size_of::<BLUETOOTH_DEVICE_SEARCH_PARAMS>() as u32,
            fReturnAuthenticated: BOOL(1),
            fReturnRemembered: BOOL(1),
            fReturnUnknown: BOOL(0),
            fReturnConnected: BOOL(1),
            fIssueInquiry: BOOL(0),
            cTimeoutMultiplier: 1,
            hRadio: HANDLE::default(),
        };
        let mut device_info = new_device_info();

        let h_find = match unsafe { BluetoothFindFirstDevice(&mut search_params, &mut device_info) } {
            Ok(handle) if !handle.is_invalid() => handle,
            // No radio or nothing paired
            Ok(_) => return Ok(Vec::new()),
            Err(e) => {
                debug!("BluetoothFindFirstDevice: {}", e);
                return Ok(Vec::new());
            }
        };

        let mut devices = vec![to_paired(&device_info)];
        loop {
            let mut next = new_device_info();
            if unsafe { BluetoothFindNextDevice(h_find, &mut next) }.is_err() {
                break;
            }
            devices.push(to_paired(&next));
        }

        unsafe {
            let _ = BluetoothFindDeviceClose(h_find);
        }

        if devices.iter().all(|d| d.name.is_empty()) {
            return Err(AppError::EnumerationFailed(
                "Paired-device search returned only unnamed devices".to_string(),
            ));
        }
        Ok(devices)
    }
}

fn new_device_info() -> BLUETOOTH_DEVICE_INFO {
    BLUETOOTH_DEVICE_INFO {
        dwSize: mem::size_of::<BLUETOOTH_DEVICE_INFO>() as u32,
        ..Default::default()
    }
}

fn to_paired(info: &BLUETOOTH_DEVICE_INFO) -> PairedDevice {
    PairedDevice {
        name: device_name_from_info(info),
        connected: info.fConnected.as_bool(),
    }
}

/// Extract device name from BLUETOOTH_DEVICE_INFO
fn device_name_from_info(info: &BLUETOOTH_DEVICE_INFO) -> String {
    let name_u16: Vec<u16> = info
        .szName
        .iter()
        .take_while(|&&c| c != 0)
        .copied()
        .collect();

    String::from_utf16_lossy(&name_u16)
}
