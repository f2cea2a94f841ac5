//! Process-to-profile rules

use crate::profile::mode::AudioProfile;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maps an executable to the profile it needs while running
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRule {
    pub process_name: String,
    #[serde(default)]
    pub display_name: String,
    pub target_profile: AudioProfile,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ProfileRule {
    pub fn new(
        process_name: impl Into<String>,
        display_name: impl Into<String>,
        target_profile: AudioProfile,
        priority: i32,
    ) -> Self {
        Self {
            process_name: process_name.into(),
            display_name: display_name.into(),
            target_profile,
            priority,
            enabled: true,
        }
    }

    /// Normalized lookup key of this rule
    pub fn key(&self) -> String {
        normalize_process_key(&self.process_name)
    }

    /// Display name, or the process name when none was given
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.process_name
        } else {
            &self.display_name
        }
    }
}

/// Lowercase, trimmed, without a trailing `.exe`
pub fn normalize_process_key(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Built-in rules for common call and music applications
pub fn default_rules() -> Vec<ProfileRule> {
    use AudioProfile::{Calls, Music};

    vec![
        ProfileRule::new("zoom.exe", "Zoom", Calls, 100),
        ProfileRule::new("teams.exe", "Microsoft Teams (classic)", Calls, 100),
        ProfileRule::new("ms-teams.exe", "Microsoft Teams", Calls, 100),
        ProfileRule::new("skype.exe", "Skype", Calls, 100),
        ProfileRule::new("skypeapp.exe", "Skype (Store)", Calls, 100),
        ProfileRule::new("webexmta.exe", "Webex", Calls, 100),
        ProfileRule::new("telemost.exe", "Yandex Telemost", Calls, 100),
        ProfileRule::new("discord.exe", "Discord", Calls, 90),
        ProfileRule::new("slack.exe", "Slack", Calls, 90),
        ProfileRule::new("signal.exe", "Signal", Calls, 80),
        ProfileRule::new("viber.exe", "Viber", Calls, 80),
        ProfileRule::new("whatsapp.exe", "WhatsApp", Calls, 80),
        ProfileRule::new("telegram.exe", "Telegram", Calls, 70),
        ProfileRule::new("spotify.exe", "Spotify", Music, 50),
        ProfileRule::new("aimp.exe", "AIMP", Music, 50),
        ProfileRule::new("foobar2000.exe", "foobar2000", Music, 50),
        ProfileRule::new("yandexmusic.exe", "Yandex Music", Music, 50),
    ]
}

/// Active rules indexed by process key
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: HashMap<String, ProfileRule>,
}

impl RuleSet {
    /// Index enabled rules. A later rule with the same key replaces an earlier one.
    pub fn from_rules(rules: &[ProfileRule]) -> Self {
        let mut indexed = HashMap::new();
        for rule in rules {
            if !rule.enabled {
                continue;
            }
            if !rule.target_profile.is_known() {
                warn!("Ignoring rule for {} with unknown target profile", rule.process_name);
                continue;
            }
            let key = rule.key();
            if key.is_empty() {
                continue;
            }
            if indexed.insert(key, rule.clone()).is_some() {
                debug!("Rule for {} replaced by a later entry", rule.process_name);
            }
        }
        Self { rules: indexed }
    }

    /// Rule for a process name as reported by the OS
    pub fn find(&self, process_name: &str) -> Option<&ProfileRule> {
        self.rules.get(&normalize_process_key(process_name))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Insert `rule`, replacing any rule with the same process key in place
pub fn add_rule(rules: &mut Vec<ProfileRule>, rule: ProfileRule) {
    let key = rule.key();
    match rules.iter_mut().find(|r| r.key() == key) {
        Some(existing) => *existing = rule,
        None => rules.push(rule),
    }
}

/// Collapse rules sharing a process key; the later rule wins, in the earlier one's place
pub fn dedup_rules(rules: &mut Vec<ProfileRule>) -> usize {
    let before = rules.len();
    let mut unique = Vec::with_capacity(before);
    for rule in rules.drain(..) {
        add_rule(&mut unique, rule);
    }
    *rules = unique;
    before - rules.len()
}

pub fn reset_to_defaults(rules: &mut Vec<ProfileRule>) {
    *rules = default_rules();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_process_key() {
        assert_eq!(normalize_process_key("Discord.exe"), "discord");
        assert_eq!(normalize_process_key("discord"), "discord");
        assert_eq!(normalize_process_key("  ZOOM.EXE "), "zoom");
        assert_eq!(normalize_process_key("my.exe.helper"), "my.exe.helper");
    }

    #[test]
    fn test_default_rules_are_well_formed() {
        let rules = default_rules();
        assert_eq!(rules.len(), 17);
        assert!(rules.iter().all(|r| r.enabled && r.target_profile.is_known()));

        let set = RuleSet::from_rules(&rules);
        assert_eq!(set.len(), 17);
        assert_eq!(set.find("Zoom.exe").unwrap().priority, 100);
        assert_eq!(set.find("spotify").unwrap().target_profile, AudioProfile::Music);
    }

    #[test]
    fn test_rule_set_skips_disabled_and_unknown() {
        let mut disabled = ProfileRule::new("a.exe", "A", AudioProfile::Calls, 10);
        disabled.enabled = false;
        let unknown = ProfileRule::new("b.exe", "B", AudioProfile::Unknown, 10);

        let set = RuleSet::from_rules(&[disabled, unknown]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_rule_set_last_duplicate_wins() {
        let set = RuleSet::from_rules(&[
            ProfileRule::new("x.exe", "X", AudioProfile::Calls, 10),
            ProfileRule::new("X", "X again", AudioProfile::Music, 20),
        ]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.find("x.exe").unwrap().target_profile, AudioProfile::Music);
    }

    #[test]
    fn test_add_rule_replaces_same_key() {
        let mut rules = vec![ProfileRule::new("x.exe", "X", AudioProfile::Calls, 10)];
        add_rule(&mut rules, ProfileRule::new("X", "X", AudioProfile::Music, 5));
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].target_profile, AudioProfile::Music);

        add_rule(&mut rules, ProfileRule::new("y.exe", "Y", AudioProfile::Calls, 1));
        assert_eq!(rules.len(), 2);
    }

    #[test]
    fn test_dedup_keeps_position_of_first() {
        let mut rules = vec![
            ProfileRule::new("Zoom.exe", "Zoom", AudioProfile::Calls, 100),
            ProfileRule::new("spotify", "Spotify", AudioProfile::Music, 50),
            ProfileRule::new("zoom", "Zoom (music)", AudioProfile::Music, 10),
        ];
        assert_eq!(dedup_rules(&mut rules), 1);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].display_name, "Zoom (music)");
        assert_eq!(rules[1].process_name, "spotify");

        assert_eq!(dedup_rules(&mut rules), 0);
    }

    #[test]
    fn test_reset_to_defaults() {
        let mut rules = vec![ProfileRule::new("x.exe", "X", AudioProfile::Calls, 10)];
        reset_to_defaults(&mut rules);
        assert_eq!(rules, default_rules());
    }

    #[test]
    fn test_label_falls_back_to_process_name() {
        let rule = ProfileRule::new("tool.exe", " ", AudioProfile::Calls, 1);
        assert_eq!(rule.label(), "tool.exe");
    }

    #[test]
    fn test_rule_toml_defaults() {
        let rule: ProfileRule = toml::from_str(
            r#"
            process_name = "obs64.exe"
            target_profile = "calls"
            "#,
        )
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.priority, 0);
        assert_eq!(rule.target_profile, AudioProfile::Calls);
    }
}
