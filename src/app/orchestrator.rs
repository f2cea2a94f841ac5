//! Reconciliation of manual actions, auto-switch requests and device connections
//!
//! The orchestrator remembers the profile that was active before an auto-switch
//! episode began and restores it once no running application requires a profile.
//! It is owned by a single worker thread; nothing here is shared.

use crate::autoswitch::resolver::{AutoSwitchResolver, ProfileChangeRequired};
use crate::devices::connection::{match_device_name, ConnectionChange, MatchQuality};
use crate::events::{EventBus, Subscription};
use crate::profile::endpoint::AmbiguousEndpointPolicy;
use crate::profile::manager::{ProfileManager, SwitchOutcome};
use crate::profile::mode::{AudioProfile, DeviceProfileState};
use crate::retry::RetryPolicy;
use crate::settings::config::AppConfig;
use log::{debug, info, warn};
use std::sync::Arc;

/// User-facing status emitted by the orchestrator; rendered by the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// An application rule switched the headset
    AutoSwitch { rule_name: String, profile: AudioProfile },
    /// The last triggering application exited and the earlier profile was restored
    Restored { profile: AudioProfile },
    Connected { device: String },
    Disconnected { device: String },
    /// No device was configured; this one was adopted as the default
    DefaultDeviceSelected { device: String },
    /// Switching needs administrator rights
    AdminRequired,
    SwitchFailed { profile: AudioProfile },
    /// A manual switch was applied
    ModeChanged { profile: AudioProfile },
}

/// Values the orchestrator needs from the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub device_name: String,
    pub default_profile: AudioProfile,
    pub auto_switch_on_connect: bool,
    pub by_app: bool,
    pub ambiguous_endpoints: AmbiguousEndpointPolicy,
    /// Delayed re-query after a successful switch
    pub confirm: RetryPolicy,
    /// Bounded wait for endpoints after a connect
    pub endpoint_wait: RetryPolicy,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            device_name: config.device.default_device_name.trim().to_string(),
            default_profile: config.device.default_profile,
            auto_switch_on_connect: config.device.auto_switch_on_connect,
            by_app: config.auto_switch.by_app,
            ambiguous_endpoints: config.device.ambiguous_endpoints,
            confirm: config.timing.confirm_policy(),
            endpoint_wait: config.timing.endpoint_wait_policy(),
        }
    }
}

/// An auto-switch episode in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Episode {
    /// Profile in effect before the first auto-switch; `None` if it was unknown
    before: Option<AudioProfile>,
}

pub struct Orchestrator {
    profiles: Arc<ProfileManager>,
    resolver: Arc<AutoSwitchResolver>,
    settings: OrchestratorSettings,
    current: Option<DeviceProfileState>,
    episode: Option<Episode>,
    notices: EventBus<Notice>,
}

impl Orchestrator {
    pub fn new(
        profiles: Arc<ProfileManager>,
        resolver: Arc<AutoSwitchResolver>,
        settings: OrchestratorSettings,
    ) -> Self {
        profiles.set_ambiguous_policy(settings.ambiguous_endpoints);
        Self {
            profiles,
            resolver,
            settings,
            current: None,
            episode: None,
            notices: EventBus::new(),
        }
    }

    pub fn subscribe_notices(&self) -> Subscription<Notice> {
        self.notices.subscribe()
    }

    pub fn resolver(&self) -> &Arc<AutoSwitchResolver> {
        &self.resolver
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn current_state(&self) -> Option<&DeviceProfileState> {
        self.current.as_ref()
    }

    /// Profile recorded when the running auto-switch episode started
    pub fn pre_auto_switch_profile(&self) -> Option<AudioProfile> {
        self.episode.and_then(|e| e.before)
    }

    pub fn in_auto_switch_episode(&self) -> bool {
        self.episode.is_some()
    }

    fn device(&self) -> Option<String> {
        let name = self.settings.device_name.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    fn notify(&self, notice: Notice) {
        debug!("Notice: {:?}", notice);
        self.notices.publish(&notice);
    }

    fn current_mode(&self) -> AudioProfile {
        self.current
            .as_ref()
            .map(|s| s.current_mode)
            .unwrap_or_default()
    }

    /// Re-read the configured device's live state
    pub fn refresh(&mut self) -> Option<&DeviceProfileState> {
        self.current = match self.device() {
            Some(device) => {
                self.profiles.refresh_endpoints();
                self.profiles.get_state(&device)
            }
            None => None,
        };
        self.current.as_ref()
    }

    /// Manual switch to `profile`. Never touches the auto-switch marker.
    pub fn set_mode(&mut self, profile: AudioProfile) -> Option<SwitchOutcome> {
        let device = self.device()?;
        if !profile.is_known() {
            return None;
        }
        if !self.profiles.is_elevated() {
            self.notify(Notice::AdminRequired);
            return Some(SwitchOutcome::PermissionDenied);
        }

        let outcome = self.switch(&device, profile);
        self.report_manual(&device, profile, outcome);
        Some(outcome)
    }

    /// Manual toggle; returns the intended target, `Unknown` when not connected
    pub fn toggle(&mut self) -> AudioProfile {
        let Some(device) = self.device() else {
            return AudioProfile::Unknown;
        };
        if !self.profiles.is_elevated() {
            self.notify(Notice::AdminRequired);
            return AudioProfile::Unknown;
        }

        let target = self.profiles.toggle(&device);
        if !target.is_known() {
            self.current = None;
            return target;
        }

        // The cache only reaches the target when the OS accepted the change
        let applied = self
            .profiles
            .cached_state(&device)
            .map(|s| s.current_mode == target)
            .unwrap_or(false);
        let outcome = if applied {
            SwitchOutcome::Applied
        } else {
            SwitchOutcome::Rejected
        };
        self.report_manual(&device, target, outcome);
        target
    }

    fn report_manual(&mut self, device: &str, profile: AudioProfile, outcome: SwitchOutcome) {
        match outcome {
            SwitchOutcome::Applied => {
                self.notify(Notice::ModeChanged { profile });
                self.confirm(device, profile);
            }
            SwitchOutcome::PermissionDenied => self.notify(Notice::AdminRequired),
            SwitchOutcome::HfpNodeNotFound | SwitchOutcome::Rejected => {
                self.notify(Notice::SwitchFailed { profile })
            }
        }
    }

    fn switch(&self, device: &str, profile: AudioProfile) -> SwitchOutcome {
        match profile {
            AudioProfile::Calls => self.profiles.set_calls(device),
            _ => self.profiles.set_music(device),
        }
    }

    fn confirm(&mut self, device: &str, expected: AudioProfile) {
        self.current = self.profiles.confirm(device, expected, &self.settings.confirm);
        if let Some(state) = &self.current {
            if state.current_mode != expected {
                warn!(
                    "'{}' reports {} after switching to {}",
                    device, state.current_mode, expected
                );
            }
        }
    }

    /// Switch on behalf of the auto-switch logic; `true` when the device is at `target`
    fn auto_switch(&mut self, device: &str, target: AudioProfile) -> bool {
        if self.current_mode() == target {
            debug!("'{}' already in {}", device, target);
            return true;
        }

        match self.switch(device, target) {
            SwitchOutcome::Applied => {
                self.confirm(device, target);
                true
            }
            SwitchOutcome::PermissionDenied => {
                self.notify(Notice::AdminRequired);
                false
            }
            outcome => {
                warn!("Auto-switch of '{}' to {} failed: {:?}", device, target, outcome);
                self.notify(Notice::SwitchFailed { profile: target });
                false
            }
        }
    }

    fn begin_episode(&mut self) {
        if self.episode.is_none() {
            let mode = self.current_mode();
            let before = mode.is_known().then_some(mode);
            info!("Auto-switch episode started, previous profile {:?}", before);
            self.episode = Some(Episode { before });
        }
    }

    /// React to the resolver's required profile changing
    pub fn handle_required_change(&mut self, change: &ProfileChangeRequired) {
        if !self.settings.by_app {
            debug!("Auto-switch by app disabled, ignoring {:?}", change.required);
            return;
        }
        let Some(device) = self.device() else {
            return;
        };
        if self.current.is_none() && self.refresh().is_none() {
            debug!("'{}' not connected, ignoring required profile change", device);
            return;
        }

        match change.required {
            Some(profile) => {
                self.begin_episode();
                let already = self.current_mode() == profile;
                if self.auto_switch(&device, profile) && !already {
                    let rule_name = change
                        .rule
                        .as_ref()
                        .map(|r| r.label().to_string())
                        .or_else(|| change.process_name.clone())
                        .unwrap_or_default();
                    self.notify(Notice::AutoSwitch { rule_name, profile });
                }
            }
            None => {
                if let Some(episode) = self.episode.take() {
                    self.restore(&device, episode);
                }
            }
        }
    }

    /// End `episode` by switching back to the profile it recorded
    fn restore(&mut self, device: &str, episode: Episode) {
        let target = episode.before.unwrap_or(self.settings.default_profile);
        info!("Auto-switch episode ended, restoring {}", target);
        let already = self.current_mode() == target;
        if self.auto_switch(device, target) && !already {
            self.notify(Notice::Restored { profile: target });
        }
    }

    /// React to a paired device connecting or disconnecting
    pub fn handle_connection(&mut self, change: &ConnectionChange) {
        if change.connected {
            self.on_connected(&change.device_name);
        } else {
            self.on_disconnected(&change.device_name);
        }
    }

    fn on_connected(&mut self, reported: &str) {
        match self.device() {
            None => {
                info!("No device configured, adopting '{}'", reported);
                self.settings.device_name = reported.to_string();
                self.notify(Notice::DefaultDeviceSelected {
                    device: reported.to_string(),
                });
            }
            Some(configured) => {
                if match_device_name(&configured, reported) == MatchQuality::NoMatch {
                    debug!("Ignoring connection of '{}'", reported);
                    return;
                }
            }
        }

        let Some(device) = self.device() else {
            return;
        };
        self.notify(Notice::Connected {
            device: device.clone(),
        });

        let profiles = Arc::clone(&self.profiles);
        self.current = self.settings.endpoint_wait.run(|attempt| {
            profiles.refresh_endpoints();
            let state = profiles.get_state(&device);
            if state.is_none() {
                debug!("Waiting for '{}' endpoints (attempt {})", device, attempt);
            }
            state
        });

        if self.current.is_none() {
            warn!("No audio endpoints appeared for '{}'", device);
            return;
        }

        let required = if self.settings.by_app {
            self.resolver.required_profile()
        } else {
            None
        };
        // The triggering applications exited while the device was away
        if required.is_none() {
            if let Some(episode) = self.episode.take() {
                self.restore(&device, episode);
                return;
            }
        }
        if !self.settings.auto_switch_on_connect {
            return;
        }

        let target = match required {
            Some(profile) => {
                self.begin_episode();
                profile
            }
            None => self.settings.default_profile,
        };
        info!("'{}' connected, applying {}", device, target);
        self.auto_switch(&device, target);
    }

    fn on_disconnected(&mut self, reported: &str) {
        let Some(device) = self.device() else {
            return;
        };
        if match_device_name(&device, reported) == MatchQuality::NoMatch {
            return;
        }

        info!("'{}' disconnected", device);
        self.current = None;
        self.profiles.forget(&device);
        self.notify(Notice::Disconnected { device });
    }

    /// Replace settings; turning auto-switch by app off ends any episode
    pub fn apply_settings(&mut self, settings: OrchestratorSettings) {
        if !settings.by_app && self.episode.take().is_some() {
            info!("Auto-switch by app disabled, episode discarded");
        }
        if settings.device_name != self.settings.device_name {
            self.current = None;
            self.episode = None;
        }
        self.profiles.set_ambiguous_policy(settings.ambiguous_endpoints);
        self.settings = settings;
    }
}
