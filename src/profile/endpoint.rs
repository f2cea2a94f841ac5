//! Audio endpoint model, name matching and profile classification
//!
//! Endpoint names exposed by Windows and paired-device names are not guaranteed to be
//! identical strings, so matching is a case-insensitive substring test and the
//! Bluetooth profile of an endpoint is guessed from markers in its friendly name.

use serde::{Deserialize, Serialize};

/// Markers that identify a hands-free (HFP) endpoint or device node
const HFP_MARKERS: &[&str] = &["hands-free", "headset", "гарнитура"];

/// Markers that identify a stereo (A2DP) endpoint
const A2DP_MARKERS: &[&str] = &["stereo", "headphones", "speaker", "наушники", "динамик"];

/// Bluetooth profile an endpoint appears to belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointProfile {
    A2dp,
    Hfp,
    Unknown,
}

/// How endpoints without any profile marker are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousEndpointPolicy {
    /// Unmarked endpoints count as A2DP when no HFP endpoint exists
    #[default]
    AssumeA2dp,
    /// Only explicitly marked endpoints count; otherwise the mode is Unknown
    Strict,
}

/// An OS-level audio rendering or capture endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEndpoint {
    pub id: String,
    pub friendly_name: String,
    pub is_playback_capable: bool,
    pub is_recording_capable: bool,
    pub profile: EndpointProfile,
}

impl AudioEndpoint {
    /// Build an endpoint, classifying it from its friendly name
    pub fn new(
        id: impl Into<String>,
        friendly_name: impl Into<String>,
        is_playback_capable: bool,
        is_recording_capable: bool,
    ) -> Self {
        let friendly_name = friendly_name.into();
        let profile = classify_endpoint_name(&friendly_name);
        Self {
            id: id.into(),
            friendly_name,
            is_playback_capable,
            is_recording_capable,
            profile,
        }
    }

    pub fn is_hfp(&self) -> bool {
        self.profile == EndpointProfile::Hfp
    }

    pub fn is_a2dp(&self) -> bool {
        self.profile == EndpointProfile::A2dp
    }
}

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

/// Classify an endpoint by its friendly name. HFP markers are checked first.
pub fn classify_endpoint_name(friendly_name: &str) -> EndpointProfile {
    if contains_any(friendly_name, HFP_MARKERS) {
        EndpointProfile::Hfp
    } else if contains_any(friendly_name, A2DP_MARKERS) {
        EndpointProfile::A2dp
    } else {
        EndpointProfile::Unknown
    }
}

/// Whether a device-node name carries a hands-free marker
pub fn is_hfp_node_name(name: &str) -> bool {
    contains_any(name, HFP_MARKERS)
}

/// Case-insensitive substring match of `device_name` inside `candidate`
pub fn name_matches(candidate: &str, device_name: &str) -> bool {
    let needle = device_name.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    candidate.to_lowercase().contains(&needle)
}

/// Source of audio endpoints for a paired device
pub trait EndpointEnumerator: Send + Sync {
    /// Endpoints whose name contains `device_name`
    fn endpoints_for_device(&self, device_name: &str) -> Vec<AudioEndpoint>;

    /// Force re-enumeration, e.g. after a device node was toggled
    fn refresh(&self);
}

/// Mock implementations for testing
/// Available in tests and with the "test-mocks" feature
#[cfg(any(test, feature = "test-mocks"))]
pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory endpoint list
    pub struct MockEndpoints {
        endpoints: Mutex<Vec<AudioEndpoint>>,
        refresh_count: AtomicUsize,
    }

    impl MockEndpoints {
        pub fn new(endpoints: Vec<AudioEndpoint>) -> Self {
            Self {
                endpoints: Mutex::new(endpoints),
                refresh_count: AtomicUsize::new(0),
            }
        }

        pub fn empty() -> Self {
            Self::new(Vec::new())
        }

        /// Typical headset: a stereo render endpoint and, when `hfp_active`, a hands-free pair
        pub fn headset(device_name: &str, hfp_active: bool) -> Self {
            let mock = Self::empty();
            mock.set_headset(device_name, hfp_active);
            mock
        }

        /// Replace the endpoint list with the headset layout
        pub fn set_headset(&self, device_name: &str, hfp_active: bool) {
            let mut endpoints = vec![AudioEndpoint::new(
                format!("{{render}}.{}-a2dp", device_name),
                format!("Headphones ({} Stereo)", device_name),
                true,
                false,
            )];
            if hfp_active {
                endpoints.push(AudioEndpoint::new(
                    format!("{{render}}.{}-hfp", device_name),
                    format!("Headset ({} Hands-Free)", device_name),
                    true,
                    false,
                ));
                endpoints.push(AudioEndpoint::new(
                    format!("{{capture}}.{}-hfp", device_name),
                    format!("Headset Microphone ({} Hands-Free)", device_name),
                    false,
                    true,
                ));
            }
            self.set_endpoints(endpoints);
        }

        pub fn set_endpoints(&self, endpoints: Vec<AudioEndpoint>) {
            *self.endpoints.lock().unwrap() = endpoints;
        }

        pub fn clear(&self) {
            self.endpoints.lock().unwrap().clear();
        }

        pub fn refresh_count(&self) -> usize {
            self.refresh_count.load(Ordering::SeqCst)
        }
    }

    impl EndpointEnumerator for MockEndpoints {
        fn endpoints_for_device(&self, device_name: &str) -> Vec<AudioEndpoint> {
            self.endpoints
                .lock()
                .unwrap()
                .iter()
                .filter(|e| name_matches(&e.friendly_name, device_name))
                .cloned()
                .collect()
        }

        fn refresh(&self) {
            self.refresh_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_match_is_case_insensitive_substring() {
        assert!(name_matches("Headphones (WH-1000XM4 Stereo)", "WH-1000XM4"));
        assert!(name_matches("Headphones (WH-1000XM4 Stereo)", "wh-1000xm4"));
        assert!(!name_matches("Headphones (WH-1000XM4 Stereo)", "WF-1000XM5"));
    }

    #[test]
    fn test_empty_device_name_never_matches() {
        assert!(!name_matches("Speakers (Realtek)", ""));
        assert!(!name_matches("Speakers (Realtek)", "   "));
    }

    #[test]
    fn test_classification_markers() {
        assert_eq!(
            classify_endpoint_name("Headphones (WH-1000XM4 Stereo)"),
            EndpointProfile::A2dp
        );
        assert_eq!(
            classify_endpoint_name("Headset (WH-1000XM4 Hands-Free AG Audio)"),
            EndpointProfile::Hfp
        );
        assert_eq!(classify_endpoint_name("Speaker (JBL Flip)"), EndpointProfile::A2dp);
        assert_eq!(classify_endpoint_name("Гарнитура (Buds)"), EndpointProfile::Hfp);
        assert_eq!(classify_endpoint_name("WH-1000XM4"), EndpointProfile::Unknown);
    }

    #[test]
    fn test_hfp_marker_beats_a2dp_marker() {
        // "Headset Headphones" style names must be treated as hands-free
        assert_eq!(
            classify_endpoint_name("Headset Headphones (Buds Pro)"),
            EndpointProfile::Hfp
        );
    }

    #[test]
    fn test_hfp_node_name() {
        assert!(is_hfp_node_name("WH-1000XM4 Hands-Free AG Audio"));
        assert!(is_hfp_node_name("Buds Pro Headset"));
        assert!(!is_hfp_node_name("WH-1000XM4 Stereo"));
    }

    #[test]
    fn test_endpoint_new_classifies() {
        let ep = AudioEndpoint::new("id", "Headset (Buds Hands-Free)", true, false);
        assert!(ep.is_hfp());
        assert!(!ep.is_a2dp());
    }

    #[test]
    fn test_mock_headset_layout() {
        use super::mocks::MockEndpoints;
        let mock = MockEndpoints::headset("Buds", true);
        let endpoints = mock.endpoints_for_device("buds");
        assert_eq!(endpoints.len(), 3);
        assert!(endpoints.iter().any(|e| e.is_a2dp()));
        assert!(endpoints.iter().any(|e| e.is_hfp() && e.is_recording_capable));

        mock.set_headset("Buds", false);
        assert_eq!(mock.endpoints_for_device("Buds").len(), 1);
        assert!(mock.endpoints_for_device("Other").is_empty());
    }
}
