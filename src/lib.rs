//! Bluetooth Profile Switcher Library
//!
//! Switches a Windows Bluetooth headset between its Music (A2DP) and Calls (HFP)
//! profiles, manually or driven by which applications are running.

// Initialize i18n with locales directory and English fallback
rust_i18n::i18n!("locales", fallback = "en");

pub mod app;
pub mod autoswitch;
pub mod devices;
pub mod error;
pub mod events;
pub mod i18n;
pub mod logging;
pub mod profile;
pub mod retry;
pub mod settings;

#[cfg(windows)]
pub mod notifications;
#[cfg(windows)]
pub mod tray;

pub use error::{AppError, ErrorSeverity, Result};
