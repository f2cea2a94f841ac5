//! SetupAPI / CfgMgr32 implementation of the device gateway

use crate::devices::gateway::{
    DevNodeStatus, DeviceClass, DeviceGateway, DeviceNode, PropertyKind, ToggleResult,
};
use log::{debug, info, warn};
use std::mem;
use windows::core::{GUID, PCWSTR};
use windows::Win32::Devices::DeviceAndDriverInstallation::{
    CM_Get_DevNode_Status, SetupDiCallClassInstaller, SetupDiDestroyDeviceInfoList,
    SetupDiEnumDeviceInfo, SetupDiGetClassDevsW, SetupDiGetDeviceInstanceIdW,
    SetupDiGetDeviceRegistryPropertyW, SetupDiSetClassInstallParamsW, CM_DEVNODE_STATUS_FLAGS,
    CM_PROB, CR_SUCCESS, DICS_DISABLE, DICS_ENABLE, DICS_FLAG_GLOBAL, DIF_PROPERTYCHANGE,
    DIGCF_PRESENT, DN_DISABLEABLE, DN_STARTED, HDEVINFO, SETUP_DI_REGISTRY_PROPERTY,
    SPDRP_DEVICEDESC, SPDRP_FRIENDLYNAME, SP_CLASSINSTALL_HEADER, SP_DEVINFO_DATA,
    SP_PROPCHANGE_PARAMS,
};
use windows::Win32::Foundation::{ERROR_ACCESS_DENIED, HWND};

const GUID_DEVCLASS_BLUETOOTH: GUID = GUID::from_u128(0xe0cbf06c_cd8b_4647_bb8a_263b43f0f974);
const GUID_DEVCLASS_MEDIA: GUID = GUID::from_u128(0x4d36e96c_e325_11ce_bfc1_08002be10318);
const GUID_DEVCLASS_SOUND: GUID = GUID::from_u128(0x4d36e97c_e325_11ce_bfc1_08002be10318);

/// Classes searched when acting on a node by instance id
const ALL_CLASSES: [DeviceClass; 3] = [DeviceClass::Media, DeviceClass::Sound, DeviceClass::Bluetooth];

fn class_guid(class: DeviceClass) -> GUID {
    match class {
        DeviceClass::Bluetooth => GUID_DEVCLASS_BLUETOOTH,
        DeviceClass::Media => GUID_DEVCLASS_MEDIA,
        DeviceClass::Sound => GUID_DEVCLASS_SOUND,
    }
}

/// Owned device information set, destroyed on drop
struct DevInfoList(HDEVINFO);

impl DevInfoList {
    fn open(class: DeviceClass) -> Option<Self> {
        let guid = class_guid(class);
        let handle = unsafe {
            SetupDiGetClassDevsW(
                Some(&guid as *const GUID),
                PCWSTR::null(),
                HWND::default(),
                DIGCF_PRESENT,
            )
        };

        match handle {
            Ok(handle) if !handle.is_invalid() => Some(Self(handle)),
            Ok(_) => {
                warn!("Invalid device info set for {:?} class", class);
                None
            }
            Err(e) => {
                warn!("Failed to get device info set for {:?} class: {}", class, e);
                None
            }
        }
    }

    /// Device info records in enumeration order
    fn entries(&self) -> Vec<SP_DEVINFO_DATA> {
        let mut entries = Vec::new();
        for index in 0u32.. {
            let mut data = SP_DEVINFO_DATA {
                cbSize: mem::size_of::<SP_DEVINFO_DATA>() as u32,
                ..Default::default()
            };
            if unsafe { SetupDiEnumDeviceInfo(self.0, index, &mut data) }.is_err() {
                break;
            }
            entries.push(data);
        }
        entries
    }

    fn registry_property(
        &self,
        data: &SP_DEVINFO_DATA,
        property: SETUP_DI_REGISTRY_PROPERTY,
    ) -> Option<String> {
        unsafe {
            // First call only negotiates the buffer size
            let mut required = 0u32;
            let _ = SetupDiGetDeviceRegistryPropertyW(
                self.0,
                data,
                property,
                None,
                None,
                Some(&mut required as *mut u32),
            );
            if required == 0 {
                return None;
            }

            let mut buffer = vec![0u8; required as usize];
            SetupDiGetDeviceRegistryPropertyW(self.0, data, property, None, Some(&mut buffer), None)
                .ok()?;

            let wide: Vec<u16> = buffer
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .take_while(|&c| c != 0)
                .collect();
            let value = String::from_utf16_lossy(&wide);
            if value.is_empty() {
                None
            } else {
                Some(value)
            }
        }
    }

    fn instance_id(&self, data: &SP_DEVINFO_DATA) -> Option<String> {
        unsafe {
            let mut required = 0u32;
            let _ = SetupDiGetDeviceInstanceIdW(self.0, data, None, Some(&mut required as *mut u32));
            if required == 0 {
                return None;
            }

            let mut buffer = vec![0u16; required as usize];
            SetupDiGetDeviceInstanceIdW(self.0, data, Some(&mut buffer), None).ok()?;

            let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
            Some(String::from_utf16_lossy(&buffer[..len]))
        }
    }

    fn find(&self, instance_id: &str) -> Option<SP_DEVINFO_DATA> {
        self.entries().into_iter().find(|data| {
            self.instance_id(data)
                .map(|id| id.eq_ignore_ascii_case(instance_id))
                .unwrap_or(false)
        })
    }

    fn set_state(&self, data: &SP_DEVINFO_DATA, enabled: bool) -> windows::core::Result<()> {
        let params = SP_PROPCHANGE_PARAMS {
            ClassInstallHeader: SP_CLASSINSTALL_HEADER {
                cbSize: mem::size_of::<SP_CLASSINSTALL_HEADER>() as u32,
                InstallFunction: DIF_PROPERTYCHANGE,
            },
            StateChange: if enabled { DICS_ENABLE } else { DICS_DISABLE },
            Scope: DICS_FLAG_GLOBAL,
            HwProfile: 0,
        };

        unsafe {
            SetupDiSetClassInstallParamsW(
                self.0,
                Some(data as *const SP_DEVINFO_DATA),
                Some(&params.ClassInstallHeader as *const SP_CLASSINSTALL_HEADER),
                mem::size_of::<SP_PROPCHANGE_PARAMS>() as u32,
            )?;
            SetupDiCallClassInstaller(DIF_PROPERTYCHANGE, self.0, Some(data as *const SP_DEVINFO_DATA))
        }
    }
}

impl Drop for DevInfoList {
    fn drop(&mut self) {
        unsafe {
            let _ = SetupDiDestroyDeviceInfoList(self.0);
        }
    }
}

/// Gateway backed by SetupAPI. Stateless; every call re-enumerates.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetupApiGateway;

impl SetupApiGateway {
    pub fn new() -> Self {
        Self
    }

    /// Open each class in turn and run `f` on the first node with `instance_id`
    fn with_node<T>(
        &self,
        instance_id: &str,
        f: impl Fn(&DevInfoList, &SP_DEVINFO_DATA) -> T,
    ) -> Option<T> {
        for class in ALL_CLASSES {
            let Some(list) = DevInfoList::open(class) else {
                continue;
            };
            if let Some(data) = list.find(instance_id) {
                debug!("Found device {} in {:?} class", instance_id, class);
                return Some(f(&list, &data));
            }
        }
        None
    }
}

impl DeviceGateway for SetupApiGateway {
    fn list_devices(&self, class: DeviceClass) -> Vec<DeviceNode> {
        let Some(list) = DevInfoList::open(class) else {
            return Vec::new();
        };

        list.entries()
            .iter()
            .filter_map(|data| {
                let instance_id = list.instance_id(data)?;
                Some(DeviceNode {
                    friendly_name: list.registry_property(data, SPDRP_FRIENDLYNAME),
                    description: list.registry_property(data, SPDRP_DEVICEDESC),
                    instance_id,
                })
            })
            .collect()
    }

    fn get_property(&self, instance_id: &str, kind: PropertyKind) -> Option<String> {
        let property = match kind {
            PropertyKind::FriendlyName => SPDRP_FRIENDLYNAME,
            PropertyKind::Description => SPDRP_DEVICEDESC,
        };
        self.with_node(instance_id, |list, data| list.registry_property(data, property))
            .flatten()
    }

    fn set_enabled(&self, instance_id: &str, enabled: bool) -> ToggleResult {
        let action = if enabled { "enable" } else { "disable" };
        debug!("SetDeviceState: {}, enable={}", instance_id, enabled);

        let outcome = self.with_node(instance_id, |list, data| list.set_state(data, enabled));

        match outcome {
            None => {
                warn!("Device not found by instance id: {}", instance_id);
                ToggleResult::NotFound
            }
            Some(Ok(())) => {
                info!("Successfully {}d device {}", action, instance_id);
                ToggleResult::Done
            }
            Some(Err(e)) if e.code() == ERROR_ACCESS_DENIED.to_hresult() => {
                warn!("Access denied trying to {} device {}", action, instance_id);
                ToggleResult::AccessDenied
            }
            Some(Err(e)) => {
                warn!("Failed to {} device {}: {}", action, instance_id, e);
                ToggleResult::Failed(e.code().0 as u32)
            }
        }
    }

    fn run_state(&self, instance_id: &str) -> Option<DevNodeStatus> {
        self.with_node(instance_id, |_, data| {
            let mut status = CM_DEVNODE_STATUS_FLAGS::default();
            let mut problem = CM_PROB::default();
            let result = unsafe { CM_Get_DevNode_Status(&mut status, &mut problem, data.DevInst, 0) };
            if result != CR_SUCCESS {
                debug!("CM_Get_DevNode_Status failed for {}: {:?}", instance_id, result);
                return None;
            }
            Some(DevNodeStatus {
                started: status.0 & DN_STARTED.0 != 0,
                disableable: status.0 & DN_DISABLEABLE.0 != 0,
                problem: problem.0,
            })
        })
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_guids_are_distinct() {
        assert_ne!(class_guid(DeviceClass::Media), class_guid(DeviceClass::Sound));
        assert_ne!(class_guid(DeviceClass::Media), class_guid(DeviceClass::Bluetooth));
    }

    /// Requires real hardware
    #[test]
    #[ignore]
    fn test_enumerate_media_class() {
        let gateway = SetupApiGateway::new();
        let devices = gateway.list_devices(DeviceClass::Media);
        for device in &devices {
            println!("{} ({})", device.display_name(), device.instance_id);
        }
    }

    #[test]
    fn test_unknown_instance_is_not_found() {
        let gateway = SetupApiGateway::new();
        assert_eq!(
            gateway.set_enabled("NOT\\A\\REAL\\DEVICE", true),
            ToggleResult::NotFound
        );
    }
}
