//! Tests for headset profile resolution and switching

use bt_profile_switcher::devices::elevation::mocks::MockElevation;
use bt_profile_switcher::devices::gateway::mocks::MockGateway;
use bt_profile_switcher::profile::endpoint::mocks::MockEndpoints;
use bt_profile_switcher::profile::endpoint::{classify_endpoint_name, name_matches};
use bt_profile_switcher::profile::{AudioProfile, EndpointProfile, ProfileManager, SwitchOutcome};
use std::sync::Arc;

const DEVICE: &str = "WH-1000XM4";

struct Fixture {
    manager: ProfileManager,
    gateway: Arc<MockGateway>,
    elevation: Arc<MockElevation>,
    hfp_node: String,
}

fn fixture(hfp_active: bool) -> Fixture {
    let endpoints = Arc::new(MockEndpoints::headset(DEVICE, hfp_active));
    let gateway = Arc::new(MockGateway::linked_to(endpoints.clone()));
    let hfp_node = gateway.add_hfp_node(DEVICE, hfp_active);
    let elevation = Arc::new(MockElevation::new(true));
    let manager = ProfileManager::new(gateway.clone(), endpoints, elevation.clone());
    Fixture {
        manager,
        gateway,
        elevation,
        hfp_node,
    }
}

#[test]
fn test_name_matching_is_loose() {
    assert!(name_matches("Headphones (WH-1000XM4 Stereo)", "wh-1000xm4"));
    assert_eq!(
        classify_endpoint_name("Headphones (WH-1000XM4 Stereo)"),
        EndpointProfile::A2dp
    );

    let f = fixture(false);
    let state = f.manager.get_state("wh-1000xm4").expect("headset should resolve");
    assert_eq!(state.current_mode, AudioProfile::Music);
    assert!(state.is_a2dp_enabled);
    assert!(!state.is_hfp_enabled);
    assert_eq!(state.hfp_device_instance_id.as_deref(), Some(f.hfp_node.as_str()));
}

#[test]
fn test_unknown_device_is_not_connected() {
    let f = fixture(false);
    assert!(f.manager.get_state("Galaxy Buds").is_none());
}

#[test]
fn test_set_music_is_idempotent() {
    let f = fixture(false);
    assert_eq!(f.manager.set_music(DEVICE), SwitchOutcome::Applied);
    assert_eq!(f.manager.set_music(DEVICE), SwitchOutcome::Applied);
    assert_eq!(f.manager.get_state(DEVICE).unwrap().current_mode, AudioProfile::Music);
    assert_eq!(f.gateway.is_enabled(&f.hfp_node), Some(false));
}

#[test]
fn test_toggle_alternates() {
    let f = fixture(false);
    assert_eq!(f.manager.toggle(DEVICE), AudioProfile::Calls);
    assert_eq!(f.manager.get_state(DEVICE).unwrap().current_mode, AudioProfile::Calls);

    assert_eq!(f.manager.toggle(DEVICE), AudioProfile::Music);
    assert_eq!(f.manager.get_state(DEVICE).unwrap().current_mode, AudioProfile::Music);
}

#[test]
fn test_toggle_disconnected_device() {
    let f = fixture(false);
    assert_eq!(f.manager.toggle("Galaxy Buds"), AudioProfile::Unknown);
    assert!(f.gateway.calls().is_empty());
}

#[test]
fn test_switch_without_rights_leaves_state() {
    let f = fixture(false);
    f.manager.get_state(DEVICE);
    f.elevation.set_elevated(false);

    assert_eq!(f.manager.set_calls(DEVICE), SwitchOutcome::PermissionDenied);
    assert!(f.gateway.calls().is_empty());
    assert_eq!(
        f.manager.cached_state(DEVICE).map(|s| s.current_mode),
        Some(AudioProfile::Music)
    );
}

#[test]
fn test_rejected_switch_leaves_state() {
    let f = fixture(false);
    f.manager.get_state(DEVICE);

    f.gateway.deny_access(true);
    assert_eq!(f.manager.set_calls(DEVICE), SwitchOutcome::PermissionDenied);

    f.gateway.deny_access(false);
    f.gateway.fail_with(Some(0x17));
    assert_eq!(f.manager.set_calls(DEVICE), SwitchOutcome::Rejected);

    assert_eq!(
        f.manager.cached_state(DEVICE).map(|s| s.current_mode),
        Some(AudioProfile::Music)
    );
    assert_eq!(f.gateway.is_enabled(&f.hfp_node), Some(false));
}
