//! WASAPI endpoint enumeration
//!
//! Must be used from a thread with COM initialized.

use crate::profile::endpoint::{name_matches, AudioEndpoint, EndpointEnumerator};
use log::{debug, warn};
use std::sync::Mutex;
use windows::core::{Interface, GUID, PWSTR};
use windows::Win32::Media::Audio::{
    eAll, eCapture, eRender, EDataFlow, IMMDevice, IMMDeviceEnumerator, IMMEndpoint,
    MMDeviceEnumerator, DEVICE_STATE_ACTIVE,
};
use windows::Win32::System::Com::{CoCreateInstance, CoTaskMemFree, CLSCTX_ALL, STGM_READ};
use windows::Win32::UI::Shell::PropertiesSystem::{IPropertyStore, PROPERTYKEY};

/// PKEY_Device_FriendlyName
const PKEY_DEVICE_FRIENDLY_NAME: PROPERTYKEY = PROPERTYKEY {
    fmtid: GUID::from_u128(0xa45c254e_df1c_4efd_8020_67d146a850e0),
    pid: 14,
};

/// PKEY_Device_DeviceDesc
const PKEY_DEVICE_DESC: PROPERTYKEY = PROPERTYKEY {
    fmtid: GUID::from_u128(0xa45c254e_df1c_4efd_8020_67d146a850e0),
    pid: 2,
};

/// PKEY_Device_EnumeratorName
const PKEY_DEVICE_ENUMERATOR_NAME: PROPERTYKEY = PROPERTYKEY {
    fmtid: GUID::from_u128(0xa45c254e_df1c_4efd_8020_67d146a850e0),
    pid: 24,
};

/// Cached list of active Bluetooth endpoints, rebuilt on `refresh`
pub struct WasapiEndpoints {
    cache: Mutex<Option<Vec<AudioEndpoint>>>,
}

impl WasapiEndpoints {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(None),
        }
    }

    fn enumerate() -> windows::core::Result<Vec<AudioEndpoint>> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)?;
            let collection = enumerator.EnumAudioEndpoints(eAll, DEVICE_STATE_ACTIVE)?;
            let count = collection.GetCount()?;
            let mut endpoints = Vec::with_capacity(count as usize);

            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                match Self::to_endpoint(&device) {
                    Ok(Some(endpoint)) => endpoints.push(endpoint),
                    Ok(None) => {}
                    Err(e) => debug!("Skipping endpoint {}: {}", i, e),
                }
            }

            Ok(endpoints)
        }
    }

    /// `None` for endpoints that are not Bluetooth-backed
    fn to_endpoint(device: &IMMDevice) -> windows::core::Result<Option<AudioEndpoint>> {
        unsafe {
            let id_pwstr: PWSTR = device.GetId()?;
            let id = id_pwstr.to_string().unwrap_or_default();
            CoTaskMemFree(Some(id_pwstr.0 as *const _));

            let props = device.OpenPropertyStore(STGM_READ)?;
            let friendly_name = read_string(&props, &PKEY_DEVICE_FRIENDLY_NAME).unwrap_or_default();
            let description = read_string(&props, &PKEY_DEVICE_DESC);
            let enumerator_name = read_string(&props, &PKEY_DEVICE_ENUMERATOR_NAME);

            if !is_bluetooth_endpoint(&id, &friendly_name, description.as_deref(), enumerator_name.as_deref()) {
                return Ok(None);
            }

            let flow: EDataFlow = device.cast::<IMMEndpoint>()?.GetDataFlow()?;
            let endpoint = AudioEndpoint::new(id, friendly_name, flow == eRender, flow == eCapture);
            debug!(
                "BT endpoint: '{}' ({:?}, playback={}, recording={})",
                endpoint.friendly_name,
                endpoint.profile,
                endpoint.is_playback_capable,
                endpoint.is_recording_capable
            );
            Ok(Some(endpoint))
        }
    }
}

impl Default for WasapiEndpoints {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointEnumerator for WasapiEndpoints {
    fn endpoints_for_device(&self, device_name: &str) -> Vec<AudioEndpoint> {
        let needs_refresh = self
            .cache
            .lock()
            .map(|cache| cache.is_none())
            .unwrap_or(true);
        if needs_refresh {
            self.refresh();
        }

        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter(|e| name_matches(&e.friendly_name, device_name))
            .cloned()
            .collect()
    }

    fn refresh(&self) {
        let endpoints = match Self::enumerate() {
            Ok(endpoints) => endpoints,
            Err(e) => {
                warn!("Audio endpoint enumeration failed: {}", e);
                Vec::new()
            }
        };
        debug!("Refreshed audio endpoints: {} Bluetooth endpoints", endpoints.len());
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = Some(endpoints);
    }
}

fn read_string(props: &IPropertyStore, key: &PROPERTYKEY) -> Option<String> {
    unsafe {
        let value = props.GetValue(key).ok()?;
        let text = value.to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Bluetooth enumerator, BTHENUM device path, or Bluetooth in the description
fn is_bluetooth_endpoint(
    id: &str,
    friendly_name: &str,
    description: Option<&str>,
    enumerator_name: Option<&str>,
) -> bool {
    let contains = |haystack: &str, needle: &str| haystack.to_lowercase().contains(needle);

    if enumerator_name
        .map(|e| contains(e, "bth") || contains(e, "bluetooth"))
        .unwrap_or(false)
    {
        return true;
    }
    if description.map(|d| contains(d, "bluetooth")).unwrap_or(false) {
        return true;
    }
    contains(id, "bthenum") || contains(id, "bthhfenum") || contains(friendly_name, "bluetooth")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bluetooth_detection() {
        assert!(is_bluetooth_endpoint("{0.0.0}.{abc}", "Headphones", None, Some("BTHENUM")));
        assert!(is_bluetooth_endpoint("{0.0.0}.{abc}", "Headset", Some("Bluetooth Hands-free Audio"), None));
        assert!(!is_bluetooth_endpoint("{0.0.0}.{abc}", "Speakers", Some("Realtek Audio"), Some("HDAUDIO")));
    }
}
