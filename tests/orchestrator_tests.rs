//! Tests for the auto-switch episode and the profile worker

use bt_profile_switcher::app::{Notice, Orchestrator, OrchestratorSettings, ProfileWorker, WorkerCommand, WorkerEvent};
use bt_profile_switcher::autoswitch::watcher::mocks::MockProcessSource;
use bt_profile_switcher::autoswitch::{AutoSwitchResolver, ProfileRule};
use bt_profile_switcher::devices::elevation::mocks::MockElevation;
use bt_profile_switcher::devices::gateway::mocks::MockGateway;
use bt_profile_switcher::devices::ConnectionChange;
use bt_profile_switcher::profile::endpoint::mocks::MockEndpoints;
use bt_profile_switcher::profile::{AmbiguousEndpointPolicy, AudioProfile, ProfileManager};
use bt_profile_switcher::retry::RetryPolicy;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEVICE: &str = "WH-1000XM4";

fn settings(default_profile: AudioProfile) -> OrchestratorSettings {
    OrchestratorSettings {
        device_name: DEVICE.to_string(),
        default_profile,
        auto_switch_on_connect: true,
        by_app: true,
        ambiguous_endpoints: AmbiguousEndpointPolicy::AssumeA2dp,
        confirm: RetryPolicy::new(1, Duration::ZERO),
        endpoint_wait: RetryPolicy::new(2, Duration::ZERO),
    }
}

struct Setup {
    orchestrator: Orchestrator,
    resolver: Arc<AutoSwitchResolver>,
    endpoints: Arc<MockEndpoints>,
}

fn setup(default_profile: AudioProfile) -> Setup {
    let endpoints = Arc::new(MockEndpoints::headset(DEVICE, false));
    let gateway = Arc::new(MockGateway::linked_to(endpoints.clone()));
    gateway.add_hfp_node(DEVICE, false);
    let profiles = Arc::new(ProfileManager::new(
        gateway,
        endpoints.clone(),
        Arc::new(MockElevation::new(true)),
    ));
    let resolver = Arc::new(AutoSwitchResolver::with_rules(
        Arc::new(MockProcessSource::new()),
        &[ProfileRule::new("zoom.exe", "Zoom", AudioProfile::Calls, 100)],
    ));
    let orchestrator = Orchestrator::new(profiles, resolver.clone(), settings(default_profile));
    Setup {
        orchestrator,
        resolver,
        endpoints,
    }
}

#[test]
fn test_restores_marker_not_default() {
    let Setup {
        mut orchestrator,
        resolver,
        ..
    } = setup(AudioProfile::Calls);
    let required = resolver.subscribe();
    orchestrator.refresh();

    resolver.process_started(100, "zoom.exe");
    for change in required.drain() {
        orchestrator.handle_required_change(&change);
    }
    assert_eq!(orchestrator.pre_auto_switch_profile(), Some(AudioProfile::Music));
    assert_eq!(orchestrator.current_state().unwrap().current_mode, AudioProfile::Calls);

    resolver.process_stopped(100, "zoom.exe");
    for change in required.drain() {
        orchestrator.handle_required_change(&change);
    }
    assert!(!orchestrator.in_auto_switch_episode());
    assert_eq!(orchestrator.current_state().unwrap().current_mode, AudioProfile::Music);
}

#[test]
fn test_marker_survives_reconnect() {
    let Setup {
        mut orchestrator,
        resolver,
        endpoints,
    } = setup(AudioProfile::Calls);
    let notices = orchestrator.subscribe_notices();
    let required = resolver.subscribe();
    orchestrator.refresh();

    resolver.process_started(100, "zoom.exe");
    for change in required.drain() {
        orchestrator.handle_required_change(&change);
    }
    assert_eq!(orchestrator.pre_auto_switch_profile(), Some(AudioProfile::Music));

    endpoints.clear();
    orchestrator.handle_connection(&ConnectionChange {
        device_name: "wh-1000xm4".into(),
        connected: false,
    });
    assert!(orchestrator.in_auto_switch_episode());
    assert!(orchestrator.current_state().is_none());

    endpoints.set_headset(DEVICE, true);
    orchestrator.handle_connection(&ConnectionChange {
        device_name: DEVICE.into(),
        connected: true,
    });
    assert_eq!(orchestrator.pre_auto_switch_profile(), Some(AudioProfile::Music));
    assert_eq!(orchestrator.current_state().unwrap().current_mode, AudioProfile::Calls);

    resolver.process_stopped(100, "zoom.exe");
    for change in required.drain() {
        orchestrator.handle_required_change(&change);
    }
    assert!(!orchestrator.in_auto_switch_episode());
    assert_eq!(orchestrator.current_state().unwrap().current_mode, AudioProfile::Music);

    let notices = notices.drain();
    assert!(notices.contains(&Notice::Disconnected { device: DEVICE.into() }));
    assert!(notices.contains(&Notice::Restored { profile: AudioProfile::Music }));
}

#[test]
fn test_other_device_connection_is_ignored() {
    let Setup { mut orchestrator, .. } = setup(AudioProfile::Music);
    let notices = orchestrator.subscribe_notices();

    orchestrator.handle_connection(&ConnectionChange {
        device_name: "Galaxy Buds".into(),
        connected: true,
    });
    assert!(notices.drain().is_empty());
    assert!(orchestrator.current_state().is_none());
}

fn wait_for<F>(worker: &ProfileWorker, mut matches: F) -> bool
where
    F: FnMut(&WorkerEvent) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if let Some(event) = worker.recv_event_timeout(Duration::from_millis(100)) {
            if matches(&event) {
                return true;
            }
        }
    }
    false
}

#[test]
fn test_worker_applies_manual_toggle() {
    let Setup { orchestrator, .. } = setup(AudioProfile::Music);
    let mut worker = ProfileWorker::start(orchestrator).expect("worker should start");

    worker.send(WorkerCommand::Refresh).unwrap();
    assert!(wait_for(&worker, |e| matches!(
        e,
        WorkerEvent::StateChanged(Some(s)) if s.current_mode == AudioProfile::Music
    )));

    worker.send(WorkerCommand::Toggle).unwrap();
    assert!(wait_for(&worker, |e| matches!(
        e,
        WorkerEvent::Notice(Notice::ModeChanged { profile: AudioProfile::Calls })
    )));

    worker.shutdown();
}

#[test]
fn test_worker_follows_resolver() {
    let Setup {
        orchestrator,
        resolver,
        ..
    } = setup(AudioProfile::Music);
    let mut worker = ProfileWorker::start(orchestrator).expect("worker should start");
    worker.send(WorkerCommand::Refresh).unwrap();

    resolver.process_started(7, "zoom.exe");
    assert!(wait_for(&worker, |e| matches!(
        e,
        WorkerEvent::Notice(Notice::AutoSwitch { profile: AudioProfile::Calls, .. })
    )));

    resolver.process_stopped(7, "zoom.exe");
    assert!(wait_for(&worker, |e| matches!(
        e,
        WorkerEvent::Notice(Notice::Restored { profile: AudioProfile::Music })
    )));

    worker.shutdown();
}
