//! Gear VR Controller bridge.
//!
//! Finds a paired Gear VR Controller, keeps a BLE session to it alive and
//! publishes decoded controller state.

pub mod domain;
pub mod infrastructure;

pub use domain::models::{ConnectionStatus, ControllerSnapshot, DeviceHandle};
pub use domain::settings::{Settings, SettingsService};
pub use infrastructure::bluetooth::{BluetoothService, ServiceHandle};
