//! Device enumeration and enable/disable gateway
//!
//! Every operation is self-contained: open an enumeration of the device class, find
//! the node, act, close. Nothing is cached between calls because the device tree
//! changes independently of this program.

use crate::profile::endpoint::{is_hfp_node_name, name_matches};
use log::debug;

/// Device-manager setup classes the gateway can enumerate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Bluetooth,
    Media,
    Sound,
}

impl DeviceClass {
    /// Classes that hold Bluetooth audio nodes, in search order
    pub const AUDIO: [DeviceClass; 2] = [DeviceClass::Media, DeviceClass::Sound];
}

/// String properties readable from a device node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    FriendlyName,
    Description,
}

/// One present device node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNode {
    pub friendly_name: Option<String>,
    pub description: Option<String>,
    pub instance_id: String,
}

impl DeviceNode {
    /// Friendly name, falling back to the description
    pub fn display_name(&self) -> &str {
        self.friendly_name
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or("")
    }
}

/// Outcome of an enable/disable request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleResult {
    Done,
    /// The OS rejected the change for lack of administrative rights
    AccessDenied,
    /// No present node has the requested instance id
    NotFound,
    /// Any other OS rejection, with its error code
    Failed(u32),
}

impl ToggleResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ToggleResult::Done)
    }
}

/// Run-state flags of a device node, independent of administrative enablement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DevNodeStatus {
    pub started: bool,
    pub disableable: bool,
    pub problem: u32,
}

/// Low-level device configuration API
pub trait DeviceGateway: Send + Sync {
    /// All present devices of `class`; empty if the enumeration handle cannot be obtained
    fn list_devices(&self, class: DeviceClass) -> Vec<DeviceNode>;

    /// A string property of the node, `None` if absent
    fn get_property(&self, instance_id: &str, kind: PropertyKind) -> Option<String>;

    /// Enable or disable the node globally
    fn set_enabled(&self, instance_id: &str, enabled: bool) -> ToggleResult;

    /// Current run state, when the platform can report it
    fn run_state(&self, _instance_id: &str) -> Option<DevNodeStatus> {
        None
    }
}

/// Locate the hands-free node of `device_name` across the audio device classes
pub fn find_hfp_node(gateway: &dyn DeviceGateway, device_name: &str) -> Option<DeviceNode> {
    for class in DeviceClass::AUDIO {
        let found = gateway.list_devices(class).into_iter().find(|node| {
            let name = node.display_name();
            name_matches(name, device_name) && is_hfp_node_name(name)
        });

        if let Some(node) = found {
            debug!(
                "Found HFP node in {:?} class: {} ({})",
                class,
                node.display_name(),
                node.instance_id
            );
            return Some(node);
        }
    }

    debug!("HFP node not found for {}", device_name);
    None
}

/// Mock implementations for testing
/// Available in tests and with the "test-mocks" feature
#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks {
    use super::*;
    use crate::profile::endpoint::mocks::MockEndpoints;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    struct MockNode {
        class: DeviceClass,
        node: DeviceNode,
        enabled: bool,
        /// Device name whose hands-free endpoints follow this node's enablement
        drives_headset: Option<String>,
    }

    /// In-memory device tree
    pub struct MockGateway {
        nodes: Mutex<Vec<MockNode>>,
        deny_access: AtomicBool,
        fail_code: Mutex<Option<u32>>,
        calls: Mutex<Vec<(String, bool)>>,
        endpoints: Option<Arc<MockEndpoints>>,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self {
                nodes: Mutex::new(Vec::new()),
                deny_access: AtomicBool::new(false),
                fail_code: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
                endpoints: None,
            }
        }

        /// Toggling a headset's HFP node also adds or removes its hands-free endpoints
        pub fn linked_to(endpoints: Arc<MockEndpoints>) -> Self {
            Self {
                endpoints: Some(endpoints),
                ..Self::new()
            }
        }

        pub fn add_node(&self, class: DeviceClass, friendly_name: &str, instance_id: &str) {
            self.nodes.lock().unwrap().push(MockNode {
                class,
                node: DeviceNode {
                    friendly_name: Some(friendly_name.to_string()),
                    description: None,
                    instance_id: instance_id.to_string(),
                },
                enabled: true,
                drives_headset: None,
            });
        }

        /// Add the hands-free node of a headset, initially `enabled`
        pub fn add_hfp_node(&self, device_name: &str, enabled: bool) -> String {
            let instance_id = format!("BTHHFENUM\\{}\\HFP", device_name.to_uppercase());
            self.nodes.lock().unwrap().push(MockNode {
                class: DeviceClass::Media,
                node: DeviceNode {
                    friendly_name: Some(format!("{} Hands-Free AG Audio", device_name)),
                    description: Some("Bluetooth Hands-free Audio".to_string()),
                    instance_id: instance_id.clone(),
                },
                enabled,
                drives_headset: Some(device_name.to_string()),
            });
            instance_id
        }

        pub fn deny_access(&self, deny: bool) {
            self.deny_access.store(deny, Ordering::SeqCst);
        }

        pub fn fail_with(&self, code: Option<u32>) {
            *self.fail_code.lock().unwrap() = code;
        }

        pub fn is_enabled(&self, instance_id: &str) -> Option<bool> {
            self.nodes
                .lock()
                .unwrap()
                .iter()
                .find(|n| n.node.instance_id.eq_ignore_ascii_case(instance_id))
                .map(|n| n.enabled)
        }

        /// Every `set_enabled` call in order
        pub fn calls(&self) -> Vec<(String, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Default for MockGateway {
        fn default() -> Self {
            Self::new()
        }
    }

    impl DeviceGateway for MockGateway {
        fn list_devices(&self, class: DeviceClass) -> Vec<DeviceNode> {
            self.nodes
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.class == class)
                .map(|n| n.node.clone())
                .collect()
        }

        fn get_property(&self, instance_id: &str, kind: PropertyKind) -> Option<String> {
            let nodes = self.nodes.lock().unwrap();
            let node = nodes
                .iter()
                .find(|n| n.node.instance_id.eq_ignore_ascii_case(instance_id))?;
            match kind {
                PropertyKind::FriendlyName => node.node.friendly_name.clone(),
                PropertyKind::Description => node.node.description.clone(),
            }
        }

        fn set_enabled(&self, instance_id: &str, enabled: bool) -> ToggleResult {
            self.calls
                .lock()
                .unwrap()
                .push((instance_id.to_string(), enabled));

            if self.deny_access.load(Ordering::SeqCst) {
                return ToggleResult::AccessDenied;
            }
            if let Some(code) = *self.fail_code.lock().unwrap() {
                return ToggleResult::Failed(code);
            }

            let mut nodes = self.nodes.lock().unwrap();
            let Some(node) = nodes
                .iter_mut()
                .find(|n| n.node.instance_id.eq_ignore_ascii_case(instance_id))
            else {
                return ToggleResult::NotFound;
            };
            node.enabled = enabled;

            if let (Some(endpoints), Some(device)) = (&self.endpoints, &node.drives_headset) {
                endpoints.set_headset(device, enabled);
            }
            ToggleResult::Done
        }

        fn run_state(&self, instance_id: &str) -> Option<DevNodeStatus> {
            self.is_enabled(instance_id).map(|enabled| DevNodeStatus {
                started: enabled,
                disableable: true,
                problem: if enabled { 0 } else { 22 },
            })
        }
    }
}
