//! Configuration management with versioning and migration

use crate::autoswitch::rules::{dedup_rules, default_rules, ProfileRule};
use crate::error::{AppError, Result};
use crate::profile::endpoint::AmbiguousEndpointPolicy;
use crate::profile::mode::AudioProfile;
use crate::retry::RetryPolicy;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current configuration version
pub const CONFIG_VERSION: u32 = 2;

/// Portable mode marker filename
const PORTABLE_MARKER: &str = "portable.txt";

/// Configuration filename
const CONFIG_FILENAME: &str = "config.toml";

/// Directory under LOCALAPPDATA in installed mode
const APP_DIR_NAME: &str = "BtProfileSwitcher";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration version for migration
    #[serde(default = "default_version")]
    pub config_version: u32,

    #[serde(default)]
    pub general: GeneralConfig,

    /// Headset and profile settings
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub auto_switch: AutoSwitchConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry timing for switch confirmation and endpoint waits
    #[serde(default)]
    pub timing: TimingConfig,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Language override (None = use system locale, Some = use specified locale)
    #[serde(default)]
    pub language: Option<String>,

    /// Start with Windows
    #[serde(default)]
    pub auto_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Paired device every profile operation targets; empty until one connects
    #[serde(default)]
    pub default_device_name: String,

    /// Profile applied on connect and when no auto-switch episode is active
    #[serde(default = "default_profile")]
    pub default_profile: AudioProfile,

    #[serde(default = "default_true")]
    pub auto_switch_on_connect: bool,

    /// How endpoints without a profile marker in their name are classified
    #[serde(default)]
    pub ambiguous_endpoints: AmbiguousEndpointPolicy,
}

fn default_profile() -> AudioProfile {
    AudioProfile::Music
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            default_device_name: String::new(),
            default_profile: AudioProfile::Music,
            auto_switch_on_connect: true,
            ambiguous_endpoints: AmbiguousEndpointPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSwitchConfig {
    /// Switch profiles when matching applications start and stop
    #[serde(default)]
    pub by_app: bool,

    /// Process list polling interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u32,

    #[serde(default = "default_rules")]
    pub rules: Vec<ProfileRule>,
}

fn default_poll_interval() -> u32 {
    1000
}

impl Default for AutoSwitchConfig {
    fn default() -> Self {
        Self {
            by_app: false,
            poll_interval_ms: 1000,
            rules: default_rules(),
        }
    }
}

impl AutoSwitchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.poll_interval_ms.max(100)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Show toast notifications
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum log file size in bytes
    #[serde(default = "default_max_log_size")]
    pub max_file_size: u64,

    /// Number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_size() -> u64 {
    5 * 1024 * 1024 // 5MB
}

fn default_max_log_files() -> u32 {
    3
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            max_file_size: 5 * 1024 * 1024,
            max_files: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Delay before each confirmatory re-query after a switch
    #[serde(default = "default_confirm_delay")]
    pub confirm_delay_ms: u64,

    #[serde(default = "default_confirm_attempts")]
    pub confirm_attempts: u32,

    /// Attempts to find endpoints after a device connects
    #[serde(default = "default_endpoint_wait_attempts")]
    pub endpoint_wait_attempts: u32,

    #[serde(default = "default_endpoint_wait_delay")]
    pub endpoint_wait_delay_ms: u64,
}

fn default_confirm_delay() -> u64 {
    3000
}

fn default_confirm_attempts() -> u32 {
    3
}

fn default_endpoint_wait_attempts() -> u32 {
    20
}

fn default_endpoint_wait_delay() -> u64 {
    2000
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            confirm_delay_ms: 3000,
            confirm_attempts: 3,
            endpoint_wait_attempts: 20,
            endpoint_wait_delay_ms: 2000,
        }
    }
}

impl TimingConfig {
    /// Waits before the first re-query as well
    pub fn confirm_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.confirm_attempts,
            Duration::from_millis(self.confirm_delay_ms),
        )
        .delayed_start()
    }

    pub fn endpoint_wait_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.endpoint_wait_attempts,
            Duration::from_millis(self.endpoint_wait_delay_ms),
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            general: GeneralConfig::default(),
            device: DeviceConfig::default(),
            auto_switch: AutoSwitchConfig::default(),
            notifications: NotificationConfig::default(),
            logging: LoggingConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Migrate config from older version
    pub fn migrate(&mut self) {
        if self.config_version < CONFIG_VERSION {
            info!(
                "Migrating config from version {} to {}",
                self.config_version, CONFIG_VERSION
            );

            // v1 to v2: added [timing] and device.ambiguous_endpoints, both filled by serde defaults
            if self.config_version < 2 {
                info!("Migrated config from v1 to v2: added timing and ambiguous endpoint policy");
            }

            self.config_version = CONFIG_VERSION;
        }

        let duplicates = dedup_rules(&mut self.auto_switch.rules);
        if duplicates > 0 {
            warn!("Dropped {} auto-switch rules with a repeated process name", duplicates);
        }
    }

    /// Parse a config file body and migrate it in memory
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(content)
            .map_err(|e| AppError::ConfigError(format!("Could not parse config: {}", e)))?;
        config.migrate();
        Ok(config)
    }
}

/// Manages configuration loading, saving, and migration
pub struct ConfigManager {
    config_path: PathBuf,
    is_portable: bool,
}

impl ConfigManager {
    /// Create a new config manager, detecting portable vs installed mode
    pub fn new() -> Result<Self> {
        let (config_path, is_portable) = Self::detect_config_path()?;
        Ok(Self {
            config_path,
            is_portable,
        })
    }

    /// Config manager for an explicit file, treated as portable
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            is_portable: true,
        }
    }

    /// Detect whether we're running in portable mode and get config path
    fn detect_config_path() -> Result<(PathBuf, bool)> {
        let exe_path = std::env::current_exe()
            .map_err(|e| AppError::ConfigError(format!("Could not get exe path: {}", e)))?;
        let exe_dir = exe_path.parent().ok_or_else(|| {
            AppError::ConfigError("Could not get exe directory".to_string())
        })?;

        // Check for portable marker
        let portable_marker = exe_dir.join(PORTABLE_MARKER);
        if portable_marker.exists() {
            debug!("Portable mode detected via marker file");
            return Ok((exe_dir.join(CONFIG_FILENAME), true));
        }

        // Check if running from Program Files (indicates installed mode)
        let is_program_files = exe_dir
            .to_string_lossy()
            .to_lowercase()
            .contains("program files");

        if is_program_files {
            // Installed mode - use AppData
            let app_data = std::env::var("LOCALAPPDATA")
                .map_err(|_| AppError::ConfigError("LOCALAPPDATA not set".to_string()))?;
            let config_dir = PathBuf::from(app_data).join(APP_DIR_NAME);
            fs::create_dir_all(&config_dir)?;
            Ok((config_dir.join(CONFIG_FILENAME), false))
        } else {
            // Not in Program Files, treat as portable
            debug!("Portable mode detected (not in Program Files)");
            Ok((exe_dir.join(CONFIG_FILENAME), true))
        }
    }

    /// Check if running in portable mode
    pub fn is_portable(&self) -> bool {
        self.is_portable
    }

    /// Get the config file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Get the log directory
    pub fn log_dir(&self) -> PathBuf {
        let base = self
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        if self.is_portable {
            base.join("logs")
        } else {
            base
        }
    }

    /// Load configuration from file
    pub fn load(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Config file not found, using defaults");
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| AppError::ConfigError(format!("Could not read config: {}", e)))?;

        let mut config: AppConfig = toml::from_str(&content)
            .map_err(|e| AppError::ConfigError(format!("Could not parse config: {}", e)))?;

        // Migrate if needed
        if config.config_version < CONFIG_VERSION {
            config.migrate();
            // Save migrated config
            self.save(&config)?;
        }

        info!("Loaded config from {:?}", self.config_path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| AppError::ConfigError(format!("Could not serialize config: {}", e)))?;

        fs::write(&self.config_path, content)
            .map_err(|e| AppError::ConfigError(format!("Could not write config: {}", e)))?;

        info!("Saved config to {:?}", self.config_path);
        Ok(())
    }
}

#[cfg(windows)]
mod autostart {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    pub const RUN_KEY: &str = "Software\\Microsoft\\Windows\\CurrentVersion\\Run";
    pub const VALUE_NAME: &str = "BtProfileSwitcher";

    pub fn wide(s: &str) -> Vec<u16> {
        OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
    }
}

#[cfg(windows)]
impl ConfigManager {
    /// Set auto-start in Windows registry
    pub fn set_auto_start(&self, enabled: bool) -> Result<()> {
        use windows::core::PCWSTR;
        use windows::Win32::System::Registry::{
            RegCloseKey, RegDeleteValueW, RegOpenKeyExW, RegSetValueExW, HKEY, HKEY_CURRENT_USER,
            KEY_SET_VALUE, REG_SZ,
        };

        let key_path_wide = autostart::wide(autostart::RUN_KEY);
        let value_name_wide = autostart::wide(autostart::VALUE_NAME);

        unsafe {
            let mut key = HKEY::default();
            let result = RegOpenKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR::from_raw(key_path_wide.as_ptr()),
                0,
                KEY_SET_VALUE,
                &mut key,
            );

            if result.is_err() {
                return Err(AppError::ConfigError(
                    "Could not open registry key".to_string(),
                ));
            }

            let result = if enabled {
                let exe_path = match std::env::current_exe() {
                    Ok(path) => path,
                    Err(e) => {
                        let _ = RegCloseKey(key);
                        return Err(AppError::ConfigError(format!("Could not get exe path: {}", e)));
                    }
                };
                // Quoted so a path with spaces is not split (CWE-428)
                let exe_path_quoted = format!("\"{}\"", exe_path.to_string_lossy());
                let exe_path_wide = autostart::wide(&exe_path_quoted);
                let bytes: Vec<u8> = exe_path_wide.iter().flat_map(|&x| x.to_le_bytes()).collect();

                RegSetValueExW(
                    key,
                    PCWSTR::from_raw(value_name_wide.as_ptr()),
                    0,
                    REG_SZ,
                    Some(&bytes),
                )
            } else {
                RegDeleteValueW(key, PCWSTR::from_raw(value_name_wide.as_ptr()))
            };

            let _ = RegCloseKey(key);

            if result.is_err() {
                return Err(AppError::ConfigError(format!(
                    "Could not {} auto-start",
                    if enabled { "enable" } else { "disable" }
                )));
            }
        }

        info!("Auto-start {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Check if auto-start is enabled
    pub fn is_auto_start_enabled(&self) -> bool {
        use windows::core::PCWSTR;
        use windows::Win32::System::Registry::{
            RegCloseKey, RegOpenKeyExW, RegQueryValueExW, HKEY, HKEY_CURRENT_USER, KEY_READ,
        };

        let key_path_wide = autostart::wide(autostart::RUN_KEY);
        let value_name_wide = autostart::wide(autostart::VALUE_NAME);

        unsafe {
            let mut key = HKEY::default();
            if RegOpenKeyExW(
                HKEY_CURRENT_USER,
                PCWSTR::from_raw(key_path_wide.as_ptr()),
                0,
                KEY_READ,
                &mut key,
            )
            .is_err()
            {
                return false;
            }

            let mut size = 0u32;
            let result = RegQueryValueExW(
                key,
                PCWSTR::from_raw(value_name_wide.as_ptr()),
                None,
                None,
                None,
                Some(&mut size),
            );

            let _ = RegCloseKey(key);
            result.is_ok() && size > 0
        }
    }
}
