//! Paired Device Scanner
//!
//! Picks Gear VR Controllers out of the platform's bonded device list.

use crate::domain::models::DeviceHandle;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::protocol;
use std::sync::Arc;
use tracing::debug;

/// A device the platform has a bond with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondedDevice {
    pub name: Option<String>,
    pub address: String,
}

impl BondedDevice {
    pub fn new(name: Option<&str>, address: impl Into<String>) -> Self {
        Self {
            name: name.map(str::to_string),
            address: address.into(),
        }
    }
}

/// Source of bonded devices (the platform adapter).
pub trait DeviceDirectory: Send + Sync {
    /// Bonded devices in the platform's enumeration order.
    fn bonded_devices(&self) -> Vec<BondedDevice>;
}

/// A fixed list of bonded devices.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    devices: Vec<BondedDevice>,
}

impl StaticDirectory {
    pub fn new(devices: Vec<BondedDevice>) -> Self {
        Self { devices }
    }
}

impl DeviceDirectory for StaticDirectory {
    fn bonded_devices(&self) -> Vec<BondedDevice> {
        self.devices.clone()
    }
}

/// Scanner for paired Gear VR Controllers
#[derive(Clone)]
pub struct PairedDeviceScanner {
    directory: Arc<dyn DeviceDirectory>,
    name_filter: String,
    show_all_devices: bool,
}

impl PairedDeviceScanner {
    pub fn new(directory: Arc<dyn DeviceDirectory>, settings: &Settings) -> Self {
        Self {
            directory,
            name_filter: settings.device_name_filter.clone(),
            show_all_devices: settings.debug_show_all_devices,
        }
    }

    /// Paired controllers, in the order the platform lists them.
    ///
    /// Devices without a name never pass the name filter. With
    /// `show_all_devices` every bonded device is returned and nameless ones
    /// are labelled "Unknown Device".
    pub fn list_paired_devices(&self) -> Vec<DeviceHandle> {
        let devices: Vec<DeviceHandle> = self
            .directory
            .bonded_devices()
            .into_iter()
            .filter(|device| {
                self.show_all_devices
                    || device
                        .name
                        .as_deref()
                        .is_some_and(|name| name.contains(&self.name_filter))
            })
            .map(|device| DeviceHandle {
                name: device.name.unwrap_or_else(|| "Unknown Device".to_string()),
                address: device.address,
            })
            .collect();

        debug!("Found {} paired controller(s)", devices.len());
        devices
    }
}

impl Default for PairedDeviceScanner {
    fn default() -> Self {
        Self {
            directory: Arc::new(StaticDirectory::default()),
            name_filter: protocol::DEVICE_NAME_FILTER.to_string(),
            show_all_devices: false,
        }
    }
}
