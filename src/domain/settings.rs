use crate::infrastructure::bluetooth::protocol;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

/// How the connection recovers from an involuntary link loss.
///
/// The defaults retry every 5 seconds forever, which keeps a dead controller
/// polled indefinitely. `max_attempts` and `jitter_ms` bound that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default = "default_reconnect_delay_ms")]
    pub delay_ms: u64,
    /// `None` retries forever
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub jitter_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay_ms: default_reconnect_delay_ms(),
            max_attempts: None,
            jitter_ms: 0,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the next attempt, jitter included.
    pub fn next_delay(&self) -> Duration {
        let jitter = if self.jitter_ms > 0 {
            use rand::Rng;
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.delay_ms.saturating_add(jitter))
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows(&self, attempts: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempts < max)
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "gear_vr_bridge".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    5000
}
fn default_service_uuid() -> Uuid {
    protocol::SERVICE_UUID
}
fn default_data_uuid() -> Uuid {
    protocol::DATA_CHAR_UUID
}
fn default_descriptor_uuid() -> Uuid {
    protocol::CONFIG_DESCRIPTOR_UUID
}
fn default_device_name_filter() -> String {
    protocol::DEVICE_NAME_FILTER.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // Advanced BLE Settings
    #[serde(default = "default_service_uuid")]
    pub ble_service_uuid: Uuid,
    #[serde(default = "default_data_uuid")]
    pub ble_data_char_uuid: Uuid,
    #[serde(default = "default_descriptor_uuid")]
    pub ble_config_descriptor_uuid: Uuid,
    #[serde(default = "default_device_name_filter")]
    pub device_name_filter: String,
    #[serde(default = "default_false")]
    pub debug_show_all_devices: bool,

    // Debug Settings
    #[serde(default = "default_false")]
    pub debug_raw_data_logging: bool,

    // Reconnection
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    #[serde(default)]
    pub last_connected_address: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            ble_service_uuid: default_service_uuid(),
            ble_data_char_uuid: default_data_uuid(),
            ble_config_descriptor_uuid: default_descriptor_uuid(),
            device_name_filter: default_device_name_filter(),
            debug_show_all_devices: false,
            debug_raw_data_logging: false,
            reconnect: ReconnectPolicy::default(),
            last_connected_address: None,
        }
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::from_path(settings_path))
    }

    /// Load settings from an explicit file, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn from_path(settings_path: impl Into<PathBuf>) -> Self {
        let settings_path = settings_path.into();
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("GearVRBridge");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn set_last_connected_address(&mut self, address: &str) -> anyhow::Result<()> {
        if self.settings.last_connected_address.as_deref() != Some(address) {
            self.settings.last_connected_address = Some(address.to_string());
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_controller_profile() {
        let settings = Settings::default();
        assert_eq!(settings.ble_service_uuid, protocol::SERVICE_UUID);
        assert_eq!(settings.ble_data_char_uuid, protocol::DATA_CHAR_UUID);
        assert_eq!(settings.device_name_filter, "Gear VR Controller");
        assert_eq!(settings.reconnect.delay_ms, 5000);
        assert_eq!(settings.reconnect.max_attempts, None);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let service = SettingsService::from_path(dir.path().join("settings.json"));
        assert_eq!(service.get().reconnect, ReconnectPolicy::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "reconnect": { "max_attempts": 3 } }"#).unwrap();

        let service = SettingsService::from_path(&path);
        let settings = service.get();
        assert_eq!(settings.reconnect.max_attempts, Some(3));
        assert_eq!(settings.reconnect.delay_ms, 5000);
        assert_eq!(settings.ble_config_descriptor_uuid, protocol::CONFIG_DESCRIPTOR_UUID);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut service = SettingsService::from_path(&path);
        assert_eq!(service.path(), path.as_path());
        service.get_mut().debug_raw_data_logging = true;
        service.set_last_connected_address("AA:BB:CC:DD:EE:FF").unwrap();

        let reloaded = SettingsService::from_path(&path);
        assert!(reloaded.get().debug_raw_data_logging);
        assert_eq!(
            reloaded.get().last_connected_address.as_deref(),
            Some("AA:BB:CC:DD:EE:FF")
        );
    }

    #[test]
    fn test_reconnect_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.next_delay(), Duration::from_millis(5000));
        assert!(policy.allows(10_000));

        let capped = ReconnectPolicy {
            delay_ms: 100,
            max_attempts: Some(2),
            jitter_ms: 50,
        };
        assert!(capped.allows(1));
        assert!(!capped.allows(2));
        let delay = capped.next_delay();
        assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(150));
    }
}
