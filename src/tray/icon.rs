//! System tray icon management

use crate::error::{AppError, Result};
use crate::profile::mode::AudioProfile;
use image::GenericImageView;
use log::{debug, info, warn};
use muda::Menu;
use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

/// Icon states for the headset profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconState {
    Music,
    Calls,
    /// Unknown profile or no headset connected
    Idle,
}

impl From<Option<AudioProfile>> for IconState {
    fn from(profile: Option<AudioProfile>) -> Self {
        match profile {
            Some(AudioProfile::Music) => IconState::Music,
            Some(AudioProfile::Calls) => IconState::Calls,
            Some(AudioProfile::Unknown) | None => IconState::Idle,
        }
    }
}

impl IconState {
    fn file(&self) -> &'static str {
        match self {
            IconState::Music => "resources/tray_music.ico",
            IconState::Calls => "resources/tray_calls.ico",
            IconState::Idle => "resources/tray_idle.ico",
        }
    }

    fn color(&self) -> (u8, u8, u8) {
        match self {
            IconState::Music => (0, 200, 0),    // Green
            IconState::Calls => (255, 165, 0),  // Orange
            IconState::Idle => (128, 128, 128), // Gray
        }
    }
}

/// Manages the system tray icon
pub struct TrayIconManager {
    tray_icon: TrayIcon,
    current_state: IconState,
}

impl TrayIconManager {
    pub fn new(menu: Menu, tooltip: &str) -> Result<Self> {
        let icon = Self::load_icon(IconState::Idle)?;

        let tray_icon = TrayIconBuilder::new()
            .with_icon(icon)
            .with_tooltip(tooltip)
            .with_menu(Box::new(menu))
            .build()
            .map_err(|e| AppError::TrayIconFailed(e.to_string()))?;

        info!("Tray icon created successfully");

        Ok(Self {
            tray_icon,
            current_state: IconState::Idle,
        })
    }

    /// Load the icon file for `state`, or draw one
    fn load_icon(state: IconState) -> Result<Icon> {
        let icon_path = state.file();
        match Self::load_icon_from_file(icon_path) {
            Ok(icon) => {
                debug!("Loaded tray icon from {}", icon_path);
                Ok(icon)
            }
            Err(e) => {
                warn!("Failed to load icon from {}: {}, using fallback", icon_path, e);
                Self::generate_fallback_icon(state)
            }
        }
    }

    /// Relative to the working directory, then to the executable
    fn load_icon_from_file(path: &str) -> Result<Icon> {
        let img = image::open(path)
            .or_else(|_| {
                if let Some(exe_dir) = std::env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(|d| d.to_path_buf()))
                {
                    return image::open(exe_dir.join(path));
                }
                Err(image::ImageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Icon file not found",
                )))
            })
            .map_err(|e| AppError::TrayIconFailed(format!("Failed to load image: {}", e)))?;

        let (width, height) = img.dimensions();
        let rgba = img.into_rgba8().into_raw();

        Icon::from_rgba(rgba, width, height)
            .map_err(|e| AppError::TrayIconFailed(format!("Failed to create icon: {}", e)))
    }

    fn generate_fallback_icon(state: IconState) -> Result<Icon> {
        let size = 32u32;
        let rgba = circle_rgba(size, state.color());
        Icon::from_rgba(rgba, size, size)
            .map_err(|e| AppError::TrayIconFailed(format!("Failed to create icon: {}", e)))
    }

    /// Update icon and tooltip for the current profile
    pub fn update(&mut self, profile: Option<AudioProfile>, tooltip: &str) -> Result<()> {
        let new_state = IconState::from(profile);

        if new_state != self.current_state {
            let icon = Self::load_icon(new_state)?;
            self.tray_icon
                .set_icon(Some(icon))
                .map_err(|e| AppError::TrayIconFailed(e.to_string()))?;
            self.current_state = new_state;
            debug!("Tray icon updated to {:?}", new_state);
        }

        self.tray_icon
            .set_tooltip(Some(tooltip))
            .map_err(|e| AppError::TrayIconFailed(e.to_string()))?;
        Ok(())
    }

    /// Update the context menu
    pub fn update_menu(&mut self, menu: Menu) {
        self.tray_icon.set_menu(Some(Box::new(menu)));
    }

    pub fn current_state(&self) -> IconState {
        self.current_state
    }
}

/// Filled circle of `color` on a transparent square
fn circle_rgba(size: u32, (r, g, b): (u8, u8, u8)) -> Vec<u8> {
    let size = size as usize;
    let mut rgba = vec![0u8; size * size * 4];
    let center = size as f32 / 2.0;
    let radius = size as f32 / 2.0 - 2.0;

    for y in 0..size {
        for x in 0..size {
            let dx = x as f32 - center;
            let dy = y as f32 - center;
            if (dx * dx + dy * dy).sqrt() <= radius {
                let idx = (y * size + x) * 4;
                rgba[idx] = r;
                rgba[idx + 1] = g;
                rgba[idx + 2] = b;
                rgba[idx + 3] = 255;
            }
        }
    }
    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_state_from_profile() {
        assert_eq!(IconState::from(Some(AudioProfile::Music)), IconState::Music);
        assert_eq!(IconState::from(Some(AudioProfile::Calls)), IconState::Calls);
        assert_eq!(IconState::from(Some(AudioProfile::Unknown)), IconState::Idle);
        assert_eq!(IconState::from(None), IconState::Idle);
    }

    #[test]
    fn test_circle_is_transparent_at_corners() {
        let rgba = circle_rgba(32, (1, 2, 3));
        assert_eq!(rgba.len(), 32 * 32 * 4);
        assert_eq!(rgba[3], 0);
        let center = (16 * 32 + 16) * 4;
        assert_eq!(&rgba[center..center + 4], &[1, 2, 3, 255]);
    }
}
