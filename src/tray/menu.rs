//! Context menu building and event handling

use crate::error::Result;
use crate::i18n::Locale;
use crate::profile::mode::AudioProfile;
use log::info;
use muda::{CheckMenuItem, Menu, MenuEvent as MudaMenuEvent, MenuItem, PredefinedMenuItem};

/// Menu item identifiers
pub const MENU_ID_STATUS: &str = "status";
pub const MENU_ID_MUSIC: &str = "profile_music";
pub const MENU_ID_CALLS: &str = "profile_calls";
pub const MENU_ID_TOGGLE: &str = "profile_toggle";
pub const MENU_ID_AUTO_SWITCH_BY_APP: &str = "auto_switch_by_app";
pub const MENU_ID_AUTO_START: &str = "auto_start";
pub const MENU_ID_RELOAD_SETTINGS: &str = "reload_settings";
pub const MENU_ID_RESET_RULES: &str = "reset_rules";
pub const MENU_ID_EXIT: &str = "exit";

/// Events from menu interactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuEvent {
    SetProfile(AudioProfile),
    Toggle,
    ToggleAutoSwitchByApp,
    ToggleAutoStart,
    /// Re-read config.toml, e.g. after editing the rules by hand
    ReloadSettings,
    /// Replace the application rules with the built-in list
    ResetRules,
    Exit,
}

/// What the menu shows
#[derive(Debug, Clone, Default)]
pub struct MenuState {
    pub device_name: Option<String>,
    /// `None` when the headset is not connected
    pub profile: Option<AudioProfile>,
    pub auto_switch_by_app: bool,
    pub auto_start: bool,
}

/// Map a menu item id to its event
pub fn event_for_id(id: &str) -> Option<MenuEvent> {
    match id {
        MENU_ID_MUSIC => Some(MenuEvent::SetProfile(AudioProfile::Music)),
        MENU_ID_CALLS => Some(MenuEvent::SetProfile(AudioProfile::Calls)),
        MENU_ID_TOGGLE => Some(MenuEvent::Toggle),
        MENU_ID_AUTO_SWITCH_BY_APP => Some(MenuEvent::ToggleAutoSwitchByApp),
        MENU_ID_AUTO_START => Some(MenuEvent::ToggleAutoStart),
        MENU_ID_RELOAD_SETTINGS => Some(MenuEvent::ReloadSettings),
        MENU_ID_RESET_RULES => Some(MenuEvent::ResetRules),
        MENU_ID_EXIT => Some(MenuEvent::Exit),
        _ => None,
    }
}

/// Builds the context menu
pub struct MenuBuilder {
    locale: Locale,
}

impl MenuBuilder {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn build(&self, state: &MenuState) -> Result<Menu> {
        let menu = Menu::new();
        let connected = state.profile.is_some();

        let status = self
            .locale
            .status_line(state.device_name.as_deref(), state.profile);
        menu.append(&MenuItem::with_id(MENU_ID_STATUS, &status, false, None))?;
        menu.append(&PredefinedMenuItem::separator())?;

        let current = state.profile.unwrap_or_default();
        menu.append(&CheckMenuItem::with_id(
            MENU_ID_MUSIC,
            self.locale.text("menu_music"),
            connected,
            current == AudioProfile::Music,
            None,
        ))?;
        menu.append(&CheckMenuItem::with_id(
            MENU_ID_CALLS,
            self.locale.text("menu_calls"),
            connected,
            current == AudioProfile::Calls,
            None,
        ))?;
        menu.append(&MenuItem::with_id(
            MENU_ID_TOGGLE,
            self.locale.text("menu_toggle"),
            connected,
            None,
        ))?;

        menu.append(&PredefinedMenuItem::separator())?;

        menu.append(&CheckMenuItem::with_id(
            MENU_ID_AUTO_SWITCH_BY_APP,
            self.locale.text("menu_auto_switch_by_app"),
            true,
            state.auto_switch_by_app,
            None,
        ))?;
        menu.append(&CheckMenuItem::with_id(
            MENU_ID_AUTO_START,
            self.locale.text("menu_auto_start"),
            true,
            state.auto_start,
            None,
        ))?;
        menu.append(&MenuItem::with_id(
            MENU_ID_RELOAD_SETTINGS,
            self.locale.text("menu_reload_settings"),
            true,
            None,
        ))?;
        menu.append(&MenuItem::with_id(
            MENU_ID_RESET_RULES,
            self.locale.text("menu_reset_rules"),
            true,
            None,
        ))?;

        menu.append(&PredefinedMenuItem::separator())?;
        menu.append(&MenuItem::with_id(
            MENU_ID_EXIT,
            self.locale.text("menu_exit"),
            true,
            None,
        ))?;

        Ok(menu)
    }

    /// Convert a muda menu event to our MenuEvent enum
    pub fn handle_event(&self, event: &MudaMenuEvent) -> Option<MenuEvent> {
        let id = event.id().0.as_str();
        info!("Menu event received: '{}'", id);
        event_for_id(id)
    }
}
