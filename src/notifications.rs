//! Windows toast notification handling

use crate::app::orchestrator::Notice;
use crate::error::{AppError, Result};
use crate::i18n::Locale;
use log::{debug, info, warn};
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use windows::core::{HSTRING, PCWSTR};
use windows::Data::Xml::Dom::XmlDocument;
use windows::UI::Notifications::{ToastNotification, ToastNotificationManager};
use windows::Win32::Foundation::HWND;
use windows::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegSetValueExW, HKEY, HKEY_CURRENT_USER, KEY_WRITE,
    REG_OPTION_NON_VOLATILE, REG_SZ,
};
use windows::Win32::UI::WindowsAndMessaging::{
    MessageBoxW, MB_ICONERROR, MB_ICONINFORMATION, MB_ICONWARNING, MB_OK, MB_SETFOREGROUND,
};

/// Application User Model ID for toast notifications
const APP_USER_MODEL_ID: &str = "BtProfileSwitcher.App";

/// Display name shown in notification center
const APP_DISPLAY_NAME: &str = "BT Profile Switcher";

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

fn set_string_value(hkey: HKEY, name: &str, value: &str) {
    let name_wide = wide(name);
    let value_wide = wide(value);
    let bytes: Vec<u8> = value_wide.iter().flat_map(|&c| c.to_le_bytes()).collect();

    let result = unsafe {
        RegSetValueExW(hkey, PCWSTR::from_raw(name_wide.as_ptr()), 0, REG_SZ, Some(&bytes))
    };
    if result.is_err() {
        warn!("Failed to set {} registry value: {:?}", name, result);
    }
}

/// Register the Application User Model ID (AUMID) under HKEY_CURRENT_USER.
///
/// Unpackaged desktop applications need it for toasts to reach the notification center.
pub fn register_aumid() -> Result<()> {
    let subkey = format!("Software\\Classes\\AppUserModelId\\{}", APP_USER_MODEL_ID);
    let subkey_wide = wide(&subkey);

    let mut hkey = HKEY::default();
    let result = unsafe {
        RegCreateKeyExW(
            HKEY_CURRENT_USER,
            PCWSTR::from_raw(subkey_wide.as_ptr()),
            0,
            None,
            REG_OPTION_NON_VOLATILE,
            KEY_WRITE,
            None,
            &mut hkey,
            None,
        )
    };

    if result.is_err() {
        warn!("Failed to create registry key for AUMID: {:?}", result);
        return Err(AppError::ConfigError(format!(
            "Failed to create AUMID registry key: {:?}",
            result
        )));
    }

    set_string_value(hkey, "DisplayName", APP_DISPLAY_NAME);

    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.to_path_buf())) {
        let icon_path = exe_dir.join("resources").join("app.ico");
        set_string_value(hkey, "IconUri", &icon_path.to_string_lossy());
    }

    unsafe {
        let _ = RegCloseKey(hkey);
    }

    info!("AUMID registered successfully: {}", APP_USER_MODEL_ID);
    Ok(())
}

/// Toast notification icon type (used for MessageBox fallback)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToastIcon {
    Info,
    Warning,
    Error,
}

fn icon_for(notice: &Notice) -> ToastIcon {
    match notice {
        Notice::AdminRequired | Notice::SwitchFailed { .. } => ToastIcon::Warning,
        _ => ToastIcon::Info,
    }
}

/// Presents [`Notice`] values as toasts, falling back to a message box
#[derive(Clone)]
pub struct NotificationManager {
    enabled: bool,
    locale: Locale,
    /// If true, always use MessageBox even when toast is enabled (for unregistered apps)
    force_message_box: bool,
}

impl NotificationManager {
    pub fn new(locale: Locale) -> Self {
        Self {
            enabled: true,
            locale,
            force_message_box: false,
        }
    }

    /// Set whether to force MessageBox instead of toast (for unpackaged apps)
    pub fn set_force_message_box(&mut self, force: bool) {
        self.force_message_box = force;
    }

    /// Enable or disable all notifications
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
    }

    pub fn show(&self, notice: &Notice) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let (title, message) = self.locale.notice_text(notice);
        self.show_notification(&title, &message, icon_for(notice))
    }

    /// Error dialog shown regardless of the notification setting
    pub fn show_error(&self, message: &str) {
        let title = self.locale.text("error_title");
        let _ = self.show_message_box(&title, message, ToastIcon::Error);
    }

    /// Show a notification - tries toast first, falls back to MessageBox
    fn show_notification(&self, title: &str, message: &str, icon: ToastIcon) -> Result<()> {
        if self.force_message_box {
            return self.show_message_box(title, message, icon);
        }

        match self.show_windows_toast(title, message) {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!("Toast notification failed, falling back to MessageBox: {}", e);
            }
        }

        self.show_message_box(title, message, icon)
    }

    /// Show Windows toast notification using WinRT API
    fn show_windows_toast(&self, title: &str, message: &str) -> Result<()> {
        let toast_xml = format!(
            r#"<toast>
                <visual>
                    <binding template="ToastGeneric">
                        <text>{}</text>
                        <text>{}</text>
                    </binding>
                </visual>
                <audio silent="true"/>
            </toast>"#,
            escape_xml(title),
            escape_xml(message)
        );

        let xml_doc = XmlDocument::new()
            .map_err(|e| AppError::ConfigError(format!("Failed to create XmlDocument: {}", e)))?;

        xml_doc
            .LoadXml(&HSTRING::from(&toast_xml))
            .map_err(|e| AppError::ConfigError(format!("Failed to load toast XML: {}", e)))?;

        let toast = ToastNotification::CreateToastNotification(&xml_doc)
            .map_err(|e| AppError::ConfigError(format!("Failed to create toast: {}", e)))?;

        let notifier = ToastNotificationManager::CreateToastNotifierWithId(&HSTRING::from(APP_USER_MODEL_ID))
            .map_err(|e| AppError::ConfigError(format!("Failed to create notifier: {}", e)))?;

        notifier
            .Show(&toast)
            .map_err(|e| AppError::ConfigError(format!("Failed to show toast: {}", e)))?;

        info!("Toast notification shown: {} - {}", title, message);
        Ok(())
    }

    /// Show a message box on its own thread so the event loop keeps running
    fn show_message_box(&self, title: &str, message: &str, icon: ToastIcon) -> Result<()> {
        let title = title.to_string();
        let message = message.to_string();

        std::thread::Builder::new()
            .name("message-box".into())
            .spawn(move || {
                let title_wide = wide(&title);
                let message_wide = wide(&message);

                let icon_flags = match icon {
                    ToastIcon::Info => MB_ICONINFORMATION,
                    ToastIcon::Warning => MB_ICONWARNING,
                    ToastIcon::Error => MB_ICONERROR,
                };

                unsafe {
                    MessageBoxW(
                        HWND::default(),
                        PCWSTR::from_raw(message_wide.as_ptr()),
                        PCWSTR::from_raw(title_wide.as_ptr()),
                        MB_OK | icon_flags | MB_SETFOREGROUND,
                    );
                }
            })
            .map(|_| ())
            .map_err(AppError::from)
    }
}

/// Escape XML special characters
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::mode::AudioProfile;

    #[test]
    fn test_notification_disabled() {
        let mut manager = NotificationManager::new(Locale::default());
        manager.set_enabled(false);
        // Should not error even when disabled
        let result = manager.show(&Notice::ModeChanged {
            profile: AudioProfile::Music,
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_warning_icons() {
        assert_eq!(icon_for(&Notice::AdminRequired), ToastIcon::Warning);
        assert_eq!(
            icon_for(&Notice::Connected { device: "Buds".into() }),
            ToastIcon::Info
        );
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("Hello & World"), "Hello &amp; World");
        assert_eq!(escape_xml("<test>"), "&lt;test&gt;");
        assert_eq!(escape_xml("\"quoted\""), "&quot;quoted&quot;");
    }
}
