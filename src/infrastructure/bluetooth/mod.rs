//! Bluetooth Module
//!
//! BLE session handling for the Gear VR Controller.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                     │
//! │  (single task: commands, transport events, timers)      │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌───────────┐
//! │  Scanner  │  │ Connection │  │ Protocol  │
//! │           │  │            │  │           │
//! │ - bonded  │  │ - sessions │  │ - UUIDs   │
//! │   devices │  │ - reconnect│  │ - decoding│
//! └───────────┘  └─────┬──────┘  └───────────┘
//!                      │
//!                      ▼
//!               ┌────────────┐
//!               │ Transport  │
//!               │ (platform  │
//!               │  or replay)│
//!               └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - UUIDs, frame layout and decoding
//! - [`transport`] - The platform BLE seam and its events
//! - [`scanner`] - Paired controller discovery
//! - [`connection`] - Connection state machine
//! - [`service`] - Task that drives the state machine
//! - [`replay`] - Transport that plays captured frames

pub mod connection;
pub mod protocol;
pub mod replay;
pub mod scanner;
pub mod service;
pub mod transport;

#[cfg(test)]
mod testing;

pub use service::{BluetoothService, ServiceHandle};
pub use transport::{Transport, TransportError, TransportEvent};
