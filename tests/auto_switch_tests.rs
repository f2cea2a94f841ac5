//! Tests for rule-based required-profile resolution

use bt_profile_switcher::autoswitch::watcher::mocks::MockProcessSource;
use bt_profile_switcher::autoswitch::{AutoSwitchResolver, ProcessWatcher, ProfileRule};
use bt_profile_switcher::profile::AudioProfile;
use std::sync::Arc;
use std::time::Duration;

fn resolver_with(rules: &[ProfileRule]) -> (Arc<MockProcessSource>, AutoSwitchResolver) {
    let source = Arc::new(MockProcessSource::new());
    let resolver = AutoSwitchResolver::with_rules(source.clone(), rules);
    (source, resolver)
}

#[test]
fn test_priority_resolution() {
    let (_, resolver) = resolver_with(&[
        ProfileRule::new("zoom.exe", "Zoom", AudioProfile::Calls, 100),
        ProfileRule::new("spotify.exe", "Spotify", AudioProfile::Music, 90),
    ]);

    resolver.process_started(10, "Spotify.exe");
    resolver.process_started(20, "zoom.exe");
    assert_eq!(resolver.required_profile(), Some(AudioProfile::Calls));

    resolver.process_stopped(20, "zoom.exe");
    assert_eq!(resolver.required_profile(), Some(AudioProfile::Music));

    resolver.process_stopped(10, "Spotify.exe");
    assert_eq!(resolver.required_profile(), None);
}

#[test]
fn test_rule_replacement_takes_effect_immediately() {
    let (source, resolver) = resolver_with(&[ProfileRule::new("x.exe", "R1", AudioProfile::Calls, 10)]);
    source.spawn(7, "x.exe");
    resolver.check_running_processes();
    assert_eq!(resolver.required_profile(), Some(AudioProfile::Calls));

    let changes = resolver.subscribe();
    resolver.update_rules(&[ProfileRule::new("x.exe", "R2", AudioProfile::Music, 10)]);

    assert_eq!(resolver.required_profile(), Some(AudioProfile::Music));
    let events = changes.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].required, Some(AudioProfile::Music));
    assert_eq!(events[0].rule.as_ref().map(|r| r.label()), Some("R2"));
}

#[test]
fn test_no_event_when_required_profile_unchanged() {
    let (_, resolver) = resolver_with(&[
        ProfileRule::new("discord.exe", "Discord", AudioProfile::Calls, 90),
        ProfileRule::new("slack.exe", "Slack", AudioProfile::Calls, 90),
    ]);
    let changes = resolver.subscribe();

    resolver.process_started(1, "discord.exe");
    resolver.process_started(2, "slack.exe");
    resolver.process_stopped(1, "discord.exe");

    let events = changes.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].required, Some(AudioProfile::Calls));
    assert_eq!(resolver.tracked_count(), 1);
}

#[test]
fn test_disabled_rules_are_ignored() {
    let mut rule = ProfileRule::new("teams.exe", "Teams", AudioProfile::Calls, 100);
    rule.enabled = false;
    let (_, resolver) = resolver_with(&[rule]);

    resolver.process_started(3, "teams.exe");
    assert_eq!(resolver.required_profile(), None);
    assert_eq!(resolver.tracked_count(), 0);
}

#[test]
fn test_watcher_tracks_processes_already_running() {
    let source = Arc::new(MockProcessSource::new());
    source.spawn(5, "zoom.exe");
    let resolver = Arc::new(AutoSwitchResolver::with_rules(
        source.clone(),
        &[ProfileRule::new("zoom", "Zoom", AudioProfile::Calls, 100)],
    ));
    let changes = resolver.subscribe();

    let mut watcher = ProcessWatcher::new(resolver.clone(), Duration::from_millis(10));
    watcher.start_watching().expect("watcher should start");
    assert_eq!(resolver.required_profile(), Some(AudioProfile::Calls));

    source.kill(5);
    let cleared = changes.recv_timeout(Duration::from_secs(2));
    let cleared = match cleared {
        Some(change) if change.required.is_some() => changes.recv_timeout(Duration::from_secs(2)),
        other => other,
    };
    assert_eq!(cleared.map(|c| c.required), Some(None));

    watcher.stop_watching();
    assert!(!watcher.is_watching());
}

#[test]
fn test_watcher_start_fails_without_process_list() {
    let source = Arc::new(MockProcessSource::new());
    source.fail(true);
    let resolver = Arc::new(AutoSwitchResolver::new(source));

    let mut watcher = ProcessWatcher::new(resolver, Duration::from_millis(10));
    assert!(watcher.start_watching().is_err());
    assert!(!watcher.is_watching());
}

#[test]
fn test_stopping_watcher_clears_required_profile() {
    let source = Arc::new(MockProcessSource::new());
    source.spawn(5, "zoom.exe");
    let resolver = Arc::new(AutoSwitchResolver::with_rules(
        source.clone(),
        &[ProfileRule::new("zoom", "Zoom", AudioProfile::Calls, 100)],
    ));
    let changes = resolver.subscribe();
    let mut watcher = ProcessWatcher::new(resolver.clone(), Duration::from_millis(10));

    watcher.start_watching().expect("watcher should start");
    watcher.stop_watching();
    assert_eq!(resolver.required_profile(), None);

    // Re-enabling publishes the still-running process again
    watcher.start_watching().expect("watcher should restart");
    assert_eq!(resolver.required_profile(), Some(AudioProfile::Calls));
    let required: Vec<_> = changes.drain().into_iter().map(|c| c.required).collect();
    assert_eq!(required, vec![Some(AudioProfile::Calls), None, Some(AudioProfile::Calls)]);

    watcher.stop_watching();
}

#[test]
fn test_rule_update_during_scan_failure_keeps_tracking() {
    let source = Arc::new(MockProcessSource::new());
    source.spawn(5, "zoom.exe");
    let rules = [ProfileRule::new("zoom", "Zoom", AudioProfile::Calls, 100)];
    let resolver = Arc::new(AutoSwitchResolver::with_rules(source.clone(), &rules));
    let mut watcher = ProcessWatcher::new(resolver.clone(), Duration::from_millis(10));
    watcher.start_watching().expect("watcher should start");
    let changes = resolver.subscribe();

    source.fail(true);
    resolver.update_rules(&rules);
    source.fail(false);
    std::thread::sleep(Duration::from_millis(300));

    assert_eq!(resolver.required_profile(), Some(AudioProfile::Calls));
    assert_eq!(resolver.tracked_count(), 1);
    assert!(changes.drain().is_empty());

    watcher.stop_watching();
}
