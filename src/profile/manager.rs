//! Profile state resolver
//!
//! Derives a headset's current profile from its live audio endpoints and switches
//! between Music and Calls by disabling or enabling the hands-free device node.
//! Cached states are an optimistic view only; every query re-reads the endpoints.

use crate::devices::elevation::ElevationProbe;
use crate::devices::gateway::{find_hfp_node, DeviceGateway, ToggleResult};
use crate::events::{EventBus, Subscription};
use crate::profile::endpoint::{AmbiguousEndpointPolicy, EndpointEnumerator};
use crate::profile::mode::{determine_mode, AudioProfile, DeviceProfileState};
use crate::retry::RetryPolicy;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Result of a Music/Calls switch request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// The OS accepted the device-node change
    Applied,
    /// Not elevated, or the OS refused for lack of rights
    PermissionDenied,
    /// No hands-free node matches the device name
    HfpNodeNotFound,
    /// The OS rejected the change for another reason
    Rejected,
}

impl SwitchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, SwitchOutcome::Applied)
    }
}

pub struct ProfileManager {
    gateway: Arc<dyn DeviceGateway>,
    endpoints: Arc<dyn EndpointEnumerator>,
    elevation: Arc<dyn ElevationProbe>,
    ambiguous_policy: Mutex<AmbiguousEndpointPolicy>,
    states: Mutex<HashMap<String, DeviceProfileState>>,
    changes: EventBus<DeviceProfileState>,
}

impl ProfileManager {
    pub fn new(
        gateway: Arc<dyn DeviceGateway>,
        endpoints: Arc<dyn EndpointEnumerator>,
        elevation: Arc<dyn ElevationProbe>,
    ) -> Self {
        Self {
            gateway,
            endpoints,
            elevation,
            ambiguous_policy: Mutex::new(AmbiguousEndpointPolicy::default()),
            states: Mutex::new(HashMap::new()),
            changes: EventBus::new(),
        }
    }

    pub fn with_ambiguous_policy(self, policy: AmbiguousEndpointPolicy) -> Self {
        self.set_ambiguous_policy(policy);
        self
    }

    pub fn set_ambiguous_policy(&self, policy: AmbiguousEndpointPolicy) {
        *self
            .ambiguous_policy
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = policy;
    }

    fn ambiguous_policy(&self) -> AmbiguousEndpointPolicy {
        *self
            .ambiguous_policy
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// State changes applied by this manager (optimistic and confirmed)
    pub fn subscribe(&self) -> Subscription<DeviceProfileState> {
        self.changes.subscribe()
    }

    pub fn is_elevated(&self) -> bool {
        self.elevation.is_elevated()
    }

    /// Force the endpoint collaborator to re-enumerate
    pub fn refresh_endpoints(&self) {
        self.endpoints.refresh();
    }

    /// Live profile state of `device_name`; `None` when no endpoint matches
    pub fn get_state(&self, device_name: &str) -> Option<DeviceProfileState> {
        let endpoints = self.endpoints.endpoints_for_device(device_name);

        if endpoints.is_empty() {
            debug!("No audio endpoints for '{}', treating as not connected", device_name);
            self.forget(device_name);
            return None;
        }

        let has_hfp = endpoints.iter().any(|e| e.is_hfp());
        let has_a2dp = endpoints.iter().any(|e| e.is_a2dp())
            || (self.ambiguous_policy() == AmbiguousEndpointPolicy::AssumeA2dp && !has_hfp);

        let hfp_node = find_hfp_node(self.gateway.as_ref(), device_name);
        if let Some(node) = &hfp_node {
            if let Some(status) = self.gateway.run_state(&node.instance_id) {
                debug!(
                    "HFP node {} run state: started={}, disableable={}, problem={}",
                    node.instance_id, status.started, status.disableable, status.problem
                );
            }
        }

        let device_id = endpoints
            .iter()
            .find(|e| e.is_a2dp())
            .or_else(|| endpoints.iter().find(|e| e.is_hfp()))
            .unwrap_or(&endpoints[0])
            .id
            .clone();

        let state = DeviceProfileState {
            device_id,
            device_name: device_name.to_string(),
            current_mode: determine_mode(has_a2dp, has_hfp),
            is_a2dp_enabled: has_a2dp,
            is_hfp_enabled: has_hfp,
            hfp_device_instance_id: hfp_node.map(|n| n.instance_id),
        };

        debug!(
            "State of '{}': {} (a2dp={}, hfp={}, {} endpoints)",
            device_name,
            state.current_mode,
            has_a2dp,
            has_hfp,
            endpoints.len()
        );

        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(cache_key(device_name), state.clone());
        Some(state)
    }

    /// Last state seen or applied for `device_name`, without touching the OS
    pub fn cached_state(&self, device_name: &str) -> Option<DeviceProfileState> {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&cache_key(device_name))
            .cloned()
    }

    /// Drop the cached state of a device that went away
    pub fn forget(&self, device_name: &str) {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&cache_key(device_name));
    }

    /// Disable the hands-free node so only the stereo profile remains
    pub fn set_music(&self, device_name: &str) -> SwitchOutcome {
        self.switch(device_name, AudioProfile::Music)
    }

    /// Enable the hands-free node
    pub fn set_calls(&self, device_name: &str) -> SwitchOutcome {
        self.switch(device_name, AudioProfile::Calls)
    }

    /// Switch to the opposite profile and return the intended target.
    ///
    /// The returned profile is what was requested, not a confirmation. A device
    /// that is not connected returns `Unknown` without any OS call.
    pub fn toggle(&self, device_name: &str) -> AudioProfile {
        let Some(state) = self.get_state(device_name) else {
            info!("Toggle ignored, '{}' is not connected", device_name);
            return AudioProfile::Unknown;
        };

        let target = state.current_mode.toggled();
        let outcome = self.switch(device_name, target);
        debug!("Toggle '{}' {} -> {}: {:?}", device_name, state.current_mode, target, outcome);
        target
    }

    /// Re-query until the device reports `expected` or `policy` runs out.
    ///
    /// Returns the last state observed, which may still differ from `expected`.
    pub fn confirm(
        &self,
        device_name: &str,
        expected: AudioProfile,
        policy: &RetryPolicy,
    ) -> Option<DeviceProfileState> {
        let mut last = None;
        let confirmed = policy.run(|attempt| {
            self.endpoints.refresh();
            let state = self.get_state(device_name);
            let matches = state.as_ref().map(|s| s.current_mode) == Some(expected);
            debug!(
                "Confirm '{}' attempt {}: {:?}",
                device_name,
                attempt,
                state.as_ref().map(|s| s.current_mode)
            );
            last = state;
            if matches {
                last.clone()
            } else {
                None
            }
        });

        if confirmed.is_none() {
            warn!(
                "'{}' did not reach {} after {} attempts",
                device_name, expected, policy.max_attempts
            );
        }
        if let Some(state) = &last {
            self.changes.publish(state);
        }
        last
    }

    fn switch(&self, device_name: &str, target: AudioProfile) -> SwitchOutcome {
        if !self.elevation.is_elevated() {
            warn!("Switching '{}' to {} requires administrator rights", device_name, target);
            return SwitchOutcome::PermissionDenied;
        }

        let Some(node) = find_hfp_node(self.gateway.as_ref(), device_name) else {
            debug!("No HFP node for '{}', cannot switch to {}", device_name, target);
            return SwitchOutcome::HfpNodeNotFound;
        };

        let enable_hfp = target == AudioProfile::Calls;
        let outcome = match self.gateway.set_enabled(&node.instance_id, enable_hfp) {
            ToggleResult::Done => SwitchOutcome::Applied,
            ToggleResult::AccessDenied => SwitchOutcome::PermissionDenied,
            ToggleResult::NotFound => SwitchOutcome::HfpNodeNotFound,
            ToggleResult::Failed(code) => {
                warn!("Switching '{}' to {} failed with code {:#x}", device_name, target, code);
                SwitchOutcome::Rejected
            }
        };

        if outcome.is_applied() {
            info!("Switched '{}' to {}", device_name, target);
            self.apply_optimistic(device_name, target, &node.instance_id);
            self.endpoints.refresh();
        }
        outcome
    }

    fn apply_optimistic(&self, device_name: &str, target: AudioProfile, instance_id: &str) {
        let updated = {
            let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
            states.get_mut(&cache_key(device_name)).map(|state| {
                state.current_mode = target;
                state.is_hfp_enabled = target == AudioProfile::Calls;
                state.is_a2dp_enabled = true;
                state.hfp_device_instance_id = Some(instance_id.to_string());
                state.clone()
            })
        };

        if let Some(state) = updated {
            self.changes.publish(&state);
        }
    }
}

fn cache_key(device_name: &str) -> String {
    device_name.trim().to_lowercase()
}
