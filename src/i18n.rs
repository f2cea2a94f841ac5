//! Internationalization support using rust-i18n
//!
//! Text is looked up through an explicit [`Locale`] handed to the presentation
//! layer; core components only emit [`Notice`] values.

use crate::app::orchestrator::Notice;
use crate::profile::mode::AudioProfile;
use log::info;
use rust_i18n::t;

/// Languages with a translation file
const TRANSLATED: &[&str] = &["en", "ru"];

/// Selected display language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    code: String,
}

impl Locale {
    /// Locale for `code`, reduced to a translated language when possible
    pub fn new(code: &str) -> Self {
        let trimmed = code.trim();
        let language = trimmed
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_lowercase();
        let code = if TRANSLATED.contains(&language.as_str()) {
            language
        } else {
            "en".to_string()
        };
        Self { code }
    }

    /// Configured language, or the system locale when none is set
    pub fn from_config(language: Option<&str>) -> Self {
        let locale = match language.filter(|l| !l.trim().is_empty()) {
            Some(lang) => {
                info!("Using configured language: {}", lang);
                Self::new(lang)
            }
            None => Self::detect(),
        };
        info!("Locale set to: {}", locale.code);
        locale
    }

    /// Locale of the current user
    pub fn detect() -> Self {
        Self::new(&detect_locale())
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Plain lookup of `key`
    pub fn text(&self, key: &str) -> String {
        t!(key, locale = self.code.as_str()).to_string()
    }

    pub fn profile_name(&self, profile: AudioProfile) -> String {
        let key = match profile {
            AudioProfile::Music => "profile_music",
            AudioProfile::Calls => "profile_calls",
            AudioProfile::Unknown => "profile_unknown",
        };
        self.text(key)
    }

    /// Tray status line
    pub fn status_line(&self, device: Option<&str>, profile: Option<AudioProfile>) -> String {
        match (device, profile) {
            (None, _) => self.text("menu_status_no_device"),
            (Some(_), None) => self.text("menu_status_disconnected"),
            (Some(device), Some(profile)) => t!(
                "menu_status_connected",
                locale = self.code.as_str(),
                device = device,
                profile = self.profile_name(profile)
            )
            .to_string(),
        }
    }

    /// Title and message for a notice
    pub fn notice_text(&self, notice: &Notice) -> (String, String) {
        let locale = self.code.as_str();
        match notice {
            Notice::AutoSwitch { rule_name, profile } => (
                self.text("notify_auto_switch_title"),
                t!(
                    "notify_auto_switch",
                    locale = locale,
                    rule = rule_name,
                    profile = self.profile_name(*profile)
                )
                .to_string(),
            ),
            Notice::Restored { profile } => (
                self.text("notify_restored_title"),
                t!("notify_restored", locale = locale, profile = self.profile_name(*profile))
                    .to_string(),
            ),
            Notice::Connected { device } => (
                self.text("notify_connected_title"),
                t!("notify_connected", locale = locale, device = device).to_string(),
            ),
            Notice::Disconnected { device } => (
                self.text("notify_disconnected_title"),
                t!("notify_disconnected", locale = locale, device = device).to_string(),
            ),
            Notice::DefaultDeviceSelected { device } => (
                self.text("notify_default_device_title"),
                t!("notify_default_device", locale = locale, device = device).to_string(),
            ),
            Notice::AdminRequired => (
                self.text("notify_admin_required_title"),
                self.text("notify_admin_required"),
            ),
            Notice::SwitchFailed { profile } => (
                self.text("notify_switch_failed_title"),
                t!("notify_switch_failed", locale = locale, profile = self.profile_name(*profile))
                    .to_string(),
            ),
            Notice::ModeChanged { profile } => (
                self.text("notify_mode_changed_title"),
                t!("notify_mode_changed", locale = locale, profile = self.profile_name(*profile))
                    .to_string(),
            ),
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::new("en")
    }
}

/// Detect the user's OS locale using Windows API
///
/// Returns the locale string (e.g., "en-US", "ru-RU") or falls back to "en" on failure.
#[cfg(windows)]
pub fn detect_locale() -> String {
    use log::warn;
    use windows::Win32::Globalization::GetUserDefaultLocaleName;

    unsafe {
        let mut buffer = [0u16; 85]; // LOCALE_NAME_MAX_LENGTH
        let len = GetUserDefaultLocaleName(&mut buffer);

        if len > 0 && len <= buffer.len() as i32 {
            // Convert UTF-16 to String, removing the null terminator
            match String::from_utf16(&buffer[..len as usize - 1]) {
                Ok(locale) => {
                    info!("Detected system locale: {}", locale);
                    locale
                }
                Err(e) => {
                    warn!("Failed to convert locale to UTF-8: {}, falling back to 'en'", e);
                    "en".to_string()
                }
            }
        } else {
            warn!("GetUserDefaultLocaleName failed or returned invalid length, falling back to 'en'");
            "en".to_string()
        }
    }
}

#[cfg(not(windows))]
pub fn detect_locale() -> String {
    std::env::var("LANG")
        .ok()
        .and_then(|lang| lang.split('.').next().map(str::to_string))
        .filter(|lang| !lang.is_empty())
        .unwrap_or_else(|| "en".to_string())
}

/// Get list of supported languages with their display names
///
/// The first entry is an empty string for "System Default".
pub fn get_language_display_names() -> Vec<(&'static str, &'static str)> {
    vec![("", "System Default"), ("en", "English"), ("ru", "Русский")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_locale_returns_string() {
        let locale = detect_locale();
        assert!(locale.len() >= 2, "Locale should be at least 2 characters (e.g., 'en')");
    }

    #[test]
    fn test_locale_normalization() {
        assert_eq!(Locale::new("ru-RU").code(), "ru");
        assert_eq!(Locale::new("en_GB").code(), "en");
        assert_eq!(Locale::new("ja-JP").code(), "en");
        assert_eq!(Locale::new("").code(), "en");
    }

    #[test]
    fn test_from_config_prefers_override() {
        assert_eq!(Locale::from_config(Some("ru")).code(), "ru");
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(Locale::new("en").profile_name(AudioProfile::Calls), "Calls");
        assert_eq!(Locale::new("ru").profile_name(AudioProfile::Music), "Музыка");
    }

    #[test]
    fn test_notice_text_interpolates() {
        let locale = Locale::new("en");
        let (title, message) = locale.notice_text(&Notice::AutoSwitch {
            rule_name: "Discord".into(),
            profile: AudioProfile::Calls,
        });
        assert_eq!(title, "Auto-switch");
        assert_eq!(message, "Discord: Calls");

        let (_, message) = locale.notice_text(&Notice::Restored {
            profile: AudioProfile::Music,
        });
        assert_eq!(message, "Restored Music");
    }

    #[test]
    fn test_status_line() {
        let locale = Locale::new("en");
        assert_eq!(locale.status_line(None, None), "No headset selected");
        assert_eq!(locale.status_line(Some("Buds"), None), "No headset connected");
        assert_eq!(
            locale.status_line(Some("Buds"), Some(AudioProfile::Music)),
            "Buds: Music"
        );
    }

    #[test]
    fn test_get_language_display_names_returns_expected_list() {
        let languages = get_language_display_names();
        assert_eq!(languages.len(), 3);
        assert_eq!(languages[0].0, "", "First option should be empty string for system default");
        assert_eq!(languages[1].0, "en");
    }
}
