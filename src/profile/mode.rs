//! Audio profile values and per-device profile state

use serde::{Deserialize, Serialize};

/// User-facing audio profile of a Bluetooth headset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioProfile {
    /// High-quality stereo output, no microphone (A2DP)
    Music,
    /// Bidirectional audio with microphone (HFP)
    Calls,
    /// Not resolved yet, or no classifiable endpoint
    #[default]
    Unknown,
}

impl std::fmt::Display for AudioProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioProfile::Music => write!(f, "Music"),
            AudioProfile::Calls => write!(f, "Calls"),
            AudioProfile::Unknown => write!(f, "Unknown"),
        }
    }
}

impl AudioProfile {
    /// `Music` or `Calls`
    pub fn is_known(&self) -> bool {
        !matches!(self, AudioProfile::Unknown)
    }

    /// Profile a toggle moves to. Anything that is not Music goes to Music.
    pub fn toggled(&self) -> AudioProfile {
        match self {
            AudioProfile::Music => AudioProfile::Calls,
            AudioProfile::Calls | AudioProfile::Unknown => AudioProfile::Music,
        }
    }
}

/// Snapshot of one device's profile, rebuilt from live enumeration on every query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfileState {
    pub device_id: String,
    pub device_name: String,
    pub current_mode: AudioProfile,
    pub is_a2dp_enabled: bool,
    pub is_hfp_enabled: bool,
    pub hfp_device_instance_id: Option<String>,
}

/// HFP wins over A2DP when both are present
pub fn determine_mode(has_a2dp: bool, has_hfp: bool) -> AudioProfile {
    if has_hfp {
        AudioProfile::Calls
    } else if has_a2dp {
        AudioProfile::Music
    } else {
        AudioProfile::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_display() {
        assert_eq!(format!("{}", AudioProfile::Music), "Music");
        assert_eq!(format!("{}", AudioProfile::Calls), "Calls");
        assert_eq!(format!("{}", AudioProfile::Unknown), "Unknown");
    }

    #[test]
    fn test_hfp_takes_priority() {
        assert_eq!(determine_mode(true, true), AudioProfile::Calls);
        assert_eq!(determine_mode(false, true), AudioProfile::Calls);
        assert_eq!(determine_mode(true, false), AudioProfile::Music);
        assert_eq!(determine_mode(false, false), AudioProfile::Unknown);
    }

    #[test]
    fn test_toggled() {
        assert_eq!(AudioProfile::Music.toggled(), AudioProfile::Calls);
        assert_eq!(AudioProfile::Calls.toggled(), AudioProfile::Music);
        assert_eq!(AudioProfile::Unknown.toggled(), AudioProfile::Music);
    }

    #[test]
    fn test_serde_lowercase() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            profile: AudioProfile,
        }
        let parsed: Wrapper = toml::from_str("profile = \"calls\"").unwrap();
        assert_eq!(parsed.profile, AudioProfile::Calls);
        let out = toml::to_string(&Wrapper { profile: AudioProfile::Music }).unwrap();
        assert!(out.contains("\"music\""));
    }
}
