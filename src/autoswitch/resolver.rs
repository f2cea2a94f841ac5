//! Rule-based auto-switch resolver
//!
//! Tracks running processes that match an active rule and derives the single
//! profile currently required by them. The rule set, the running index and the
//! derived profile share one lock, so a rule swap and a process event never
//! interleave.

use crate::autoswitch::rules::{ProfileRule, RuleSet};
use crate::autoswitch::watcher::{ProcessInfo, ProcessSource};
use crate::error::Result;
use crate::events::{EventBus, Subscription};
use crate::profile::mode::AudioProfile;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Emitted whenever the required profile changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileChangeRequired {
    /// `None` when no running process asserts a profile any more
    pub required: Option<AudioProfile>,
    /// Winning rule after the change
    pub rule: Option<ProfileRule>,
    /// Process whose start or stop caused the change; `None` after a full rescan
    pub process_name: Option<String>,
}

/// A running process matched by a rule
#[derive(Debug, Clone)]
struct Tracked {
    name: String,
    rule: ProfileRule,
}

struct ResolverState {
    rules: RuleSet,
    /// Keyed by pid; iteration order makes the lowest pid win priority ties
    running: BTreeMap<u32, Tracked>,
    required: Option<AudioProfile>,
}

impl ResolverState {
    /// The tracked processes as a snapshot, for re-filtering when a live scan fails
    fn tracked_processes(&self) -> Vec<ProcessInfo> {
        self.running
            .iter()
            .map(|(&pid, tracked)| ProcessInfo::new(pid, tracked.name.clone()))
            .collect()
    }
}

pub struct AutoSwitchResolver {
    source: Arc<dyn ProcessSource>,
    state: Mutex<ResolverState>,
    changes: EventBus<ProfileChangeRequired>,
}

impl AutoSwitchResolver {
    /// Resolver with no rules
    pub fn new(source: Arc<dyn ProcessSource>) -> Self {
        Self {
            source,
            state: Mutex::new(ResolverState {
                rules: RuleSet::default(),
                running: BTreeMap::new(),
                required: None,
            }),
            changes: EventBus::new(),
        }
    }

    /// Resolver with `rules` active; running processes are not scanned yet
    pub fn with_rules(source: Arc<dyn ProcessSource>, rules: &[ProfileRule]) -> Self {
        let resolver = Self::new(source);
        resolver.lock().rules = RuleSet::from_rules(rules);
        resolver
    }

    fn lock(&self) -> MutexGuard<'_, ResolverState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> Subscription<ProfileChangeRequired> {
        self.changes.subscribe()
    }

    pub fn process_source(&self) -> Arc<dyn ProcessSource> {
        Arc::clone(&self.source)
    }

    /// Current derived value; `None` means nothing requires a profile
    pub fn required_profile(&self) -> Option<AudioProfile> {
        self.lock().required
    }

    /// Rule currently deciding the required profile
    pub fn active_rule(&self) -> Option<ProfileRule> {
        let state = self.lock();
        winner(&state.running).map(|(_, tracked)| tracked.rule.clone())
    }

    /// Number of tracked processes
    pub fn tracked_count(&self) -> usize {
        self.lock().running.len()
    }

    /// Swap the whole rule set and rebuild the index from the live process list.
    ///
    /// If the process list cannot be read, the processes already tracked are
    /// re-matched against the new rules instead.
    pub fn update_rules(&self, rules: &[ProfileRule]) {
        let snapshot = self.source.snapshot();
        let mut state = self.lock();
        state.rules = RuleSet::from_rules(rules);
        info!("Auto-switch rules updated: {} active", state.rules.len());
        let processes = scanned_or_tracked(snapshot, &state);
        self.rebuild(&mut state, &processes);
    }

    /// Rebuild the index from the live process list with the current rules
    pub fn check_running_processes(&self) {
        let snapshot = self.source.snapshot();
        let mut state = self.lock();
        let processes = scanned_or_tracked(snapshot, &state);
        self.rebuild(&mut state, &processes);
    }

    /// Rebuild the index from an already-taken snapshot
    pub fn rescan_with(&self, processes: &[ProcessInfo]) {
        let mut state = self.lock();
        self.rebuild(&mut state, processes);
    }

    pub fn process_started(&self, pid: u32, name: &str) {
        let mut state = self.lock();
        let Some(rule) = state.rules.find(name).cloned() else {
            return;
        };
        debug!("Tracked process started: {} ({}) -> {}", name, pid, rule.target_profile);
        state.running.insert(
            pid,
            Tracked {
                name: name.to_string(),
                rule,
            },
        );
        self.recompute(&mut state, Some(name));
    }

    pub fn process_stopped(&self, pid: u32, name: &str) {
        let mut state = self.lock();
        if state.running.remove(&pid).is_none() {
            return;
        }
        debug!("Tracked process stopped: {} ({})", name, pid);
        self.recompute(&mut state, Some(name));
    }

    fn rebuild(&self, state: &mut ResolverState, processes: &[ProcessInfo]) {
        let running: BTreeMap<u32, Tracked> = processes
            .iter()
            .filter_map(|p| {
                state.rules.find(&p.name).map(|rule| {
                    (
                        p.pid,
                        Tracked {
                            name: p.name.clone(),
                            rule: rule.clone(),
                        },
                    )
                })
            })
            .collect();
        debug!("Rescan: {} of {} processes match a rule", running.len(), processes.len());
        state.running = running;
        self.recompute(state, None);
    }

    /// Publishes under the lock so subscribers see changes in order
    fn recompute(&self, state: &mut ResolverState, process_name: Option<&str>) {
        let win = winner(&state.running).map(|(_, tracked)| tracked.rule.clone());
        let required = win.as_ref().map(|rule| rule.target_profile);
        if required == state.required {
            return;
        }

        info!(
            "Required profile: {:?} -> {:?} (rule: {})",
            state.required,
            required,
            win.as_ref().map(|r| r.label()).unwrap_or("none")
        );
        state.required = required;
        self.changes.publish(&ProfileChangeRequired {
            required,
            rule: win,
            process_name: process_name.map(str::to_string),
        });
    }
}

/// Live process list, or the tracked processes when the scan failed
fn scanned_or_tracked(snapshot: Result<Vec<ProcessInfo>>, state: &ResolverState) -> Vec<ProcessInfo> {
    snapshot.unwrap_or_else(|e| {
        warn!(
            "Process scan failed, keeping {} tracked processes: {}",
            state.running.len(),
            e
        );
        state.tracked_processes()
    })
}

/// Highest priority wins.
///
/// Equal priorities are settled by the lowest process id. This is the tie-break
/// policy, not an accident of map order: it keeps the winner stable across
/// rescans, which may discover processes in any order.
fn winner(running: &BTreeMap<u32, Tracked>) -> Option<(u32, &Tracked)> {
    let mut best: Option<(u32, &Tracked)> = None;
    for (&pid, tracked) in running {
        match best {
            Some((_, current)) if current.rule.priority >= tracked.rule.priority => {}
            _ => best = Some((pid, tracked)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoswitch::watcher::mocks::MockProcessSource;

    fn rules() -> Vec<ProfileRule> {
        vec![
            ProfileRule::new("zoom.exe", "Zoom", AudioProfile::Calls, 100),
            ProfileRule::new("spotify.exe", "Spotify", AudioProfile::Music, 50),
            ProfileRule::new("discord.exe", "Discord", AudioProfile::Calls, 90),
        ]
    }

    fn resolver() -> (AutoSwitchResolver, Arc<MockProcessSource>) {
        let source = Arc::new(MockProcessSource::new());
        (AutoSwitchResolver::with_rules(source.clone(), &rules()), source)
    }

    #[test]
    fn test_unmatched_process_is_ignored() {
        let (resolver, _) = resolver();
        resolver.process_started(1, "notepad.exe");
        assert_eq!(resolver.tracked_count(), 0);
        assert_eq!(resolver.required_profile(), None);
    }

    #[test]
    fn test_highest_priority_wins() {
        let (resolver, _) = resolver();
        resolver.process_started(5, "Spotify.exe");
        assert_eq!(resolver.required_profile(), Some(AudioProfile::Music));

        resolver.process_started(6, "zoom.exe");
        assert_eq!(resolver.required_profile(), Some(AudioProfile::Calls));

        resolver.process_stopped(6, "zoom.exe");
        assert_eq!(resolver.required_profile(), Some(AudioProfile::Music));
    }

    #[test]
    fn test_tie_goes_to_lowest_pid() {
        let source = Arc::new(MockProcessSource::new());
        let resolver = AutoSwitchResolver::with_rules(
            source,
            &[
                ProfileRule::new("a.exe", "A", AudioProfile::Calls, 10),
                ProfileRule::new("b.exe", "B", AudioProfile::Music, 10),
            ],
        );
        resolver.process_started(20, "a.exe");
        resolver.process_started(3, "b.exe");
        assert_eq!(resolver.active_rule().unwrap().process_name, "b.exe");
        assert_eq!(resolver.required_profile(), Some(AudioProfile::Music));
    }

    #[test]
    fn test_event_carries_rule_and_process() {
        let (resolver, _) = resolver();
        let sub = resolver.subscribe();
        resolver.process_started(9, "Discord.exe");

        let change = sub.try_recv().unwrap();
        assert_eq!(change.required, Some(AudioProfile::Calls));
        assert_eq!(change.rule.unwrap().display_name, "Discord");
        assert_eq!(change.process_name.as_deref(), Some("Discord.exe"));
    }

    #[test]
    fn test_same_profile_emits_once() {
        let (resolver, _) = resolver();
        let sub = resolver.subscribe();
        resolver.process_started(1, "discord.exe");
        resolver.process_started(2, "zoom.exe");
        resolver.process_stopped(1, "discord.exe");
        assert_eq!(sub.drain().len(), 1);
    }

    #[test]
    fn test_stop_of_untracked_pid_is_ignored() {
        let (resolver, _) = resolver();
        let sub = resolver.subscribe();
        resolver.process_stopped(77, "zoom.exe");
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_rescan_event_has_no_process_name() {
        let (resolver, source) = resolver();
        source.spawn(4, "zoom.exe");
        let sub = resolver.subscribe();
        resolver.check_running_processes();

        let change = sub.try_recv().unwrap();
        assert_eq!(change.required, Some(AudioProfile::Calls));
        assert!(change.process_name.is_none());
    }

    #[test]
    fn test_update_rules_drops_disabled() {
        let (resolver, source) = resolver();
        source.spawn(4, "zoom.exe");
        resolver.check_running_processes();

        let mut disabled = ProfileRule::new("zoom.exe", "Zoom", AudioProfile::Calls, 100);
        disabled.enabled = false;
        resolver.update_rules(&[disabled]);
        assert_eq!(resolver.required_profile(), None);
        assert_eq!(resolver.tracked_count(), 0);
    }

    #[test]
    fn test_failed_scan_keeps_tracked_processes() {
        let (resolver, source) = resolver();
        source.spawn(4, "zoom.exe");
        source.spawn(5, "spotify.exe");
        resolver.check_running_processes();
        let sub = resolver.subscribe();

        source.fail(true);
        resolver.check_running_processes();
        assert_eq!(resolver.tracked_count(), 2);
        assert_eq!(resolver.required_profile(), Some(AudioProfile::Calls));

        // New rules are applied to the tracked processes
        resolver.update_rules(&[ProfileRule::new("spotify", "Spotify", AudioProfile::Music, 50)]);
        assert_eq!(resolver.tracked_count(), 1);
        assert_eq!(resolver.required_profile(), Some(AudioProfile::Music));
        assert_eq!(
            sub.drain().into_iter().map(|c| c.required).collect::<Vec<_>>(),
            vec![Some(AudioProfile::Music)]
        );
    }

    #[test]
    fn test_failed_scan_with_nothing_tracked() {
        let (resolver, source) = resolver();
        source.spawn(4, "zoom.exe");
        source.fail(true);
        resolver.check_running_processes();
        assert_eq!(resolver.required_profile(), None);
    }
}
