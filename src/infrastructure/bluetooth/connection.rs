//! BLE Connection Module
//!
//! Keeps one logical connection to one controller alive: opens and closes
//! transport sessions, enables notifications after discovery, decodes frames
//! and publishes the results.

use crate::domain::models::{ConnectionStatus, ControllerSnapshot, DeviceHandle};
use crate::domain::settings::{ReconnectPolicy, Settings};
use crate::infrastructure::bluetooth::protocol::{self, ENABLE_NOTIFICATION_VALUE};
use crate::infrastructure::bluetooth::transport::{
    GattProfile, LinkState, SessionId, Transport, TransportError, TransportEvent,
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Service UUID to look for
    pub service_uuid: Uuid,
    /// Data characteristic UUID
    pub data_char_uuid: Uuid,
    /// Configuration descriptor written to enable notifications
    pub config_descriptor_uuid: Uuid,
    pub reconnect: ReconnectPolicy,
    /// Log every raw frame at trace level
    pub raw_data_logging: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            service_uuid: protocol::SERVICE_UUID,
            data_char_uuid: protocol::DATA_CHAR_UUID,
            config_descriptor_uuid: protocol::CONFIG_DESCRIPTOR_UUID,
            reconnect: ReconnectPolicy::default(),
            raw_data_logging: false,
        }
    }
}

impl From<&Settings> for ConnectionConfig {
    fn from(s: &Settings) -> Self {
        Self {
            service_uuid: s.ble_service_uuid,
            data_char_uuid: s.ble_data_char_uuid,
            config_descriptor_uuid: s.ble_config_descriptor_uuid,
            reconnect: s.reconnect.clone(),
            raw_data_logging: s.debug_raw_data_logging,
        }
    }
}

/// A reconnect the owner must fire after `delay`.
///
/// Only the most recently issued ticket is honoured; `connect` and
/// `disconnect` invalidate any ticket still in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectTicket {
    pub generation: u64,
    pub address: String,
    pub attempt: u32,
    pub delay: Duration,
}

/// Connection state machine for a single controller.
///
/// Not thread-safe by itself: all calls must come from one coordination
/// context (see [`BluetoothService`](super::service::BluetoothService)).
/// Published values can be read from anywhere through the watch receivers.
pub struct ConnectionStateMachine<T: Transport> {
    transport: T,
    config: ConnectionConfig,

    status: watch::Sender<ConnectionStatus>,
    snapshot: watch::Sender<ControllerSnapshot>,
    device: watch::Sender<Option<DeviceHandle>>,

    session: Option<SessionId>,
    generation: u64,
    pending_reconnect: Option<ReconnectTicket>,
    reconnect_attempts: u32,
}

impl<T: Transport> ConnectionStateMachine<T> {
    pub fn new(transport: T, config: ConnectionConfig) -> Self {
        Self {
            transport,
            config,
            status: watch::Sender::new(ConnectionStatus::Disconnected),
            snapshot: watch::Sender::new(ControllerSnapshot::default()),
            device: watch::Sender::new(None),
            session: None,
            generation: 0,
            pending_reconnect: None,
            reconnect_attempts: 0,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        *self.snapshot.borrow()
    }

    /// The remembered device, if a connection is live, in progress or pending.
    pub fn device(&self) -> Option<DeviceHandle> {
        self.device.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn subscribe_device(&self) -> watch::Receiver<Option<DeviceHandle>> {
        self.device.subscribe()
    }

    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    pub fn pending_reconnect(&self) -> Option<&ReconnectTicket> {
        self.pending_reconnect.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connect to a device, replacing whatever connection existed before.
    pub fn connect(&mut self, device: DeviceHandle) {
        if device.address.is_empty() {
            error!("Refusing to connect: device has no address");
            return;
        }

        info!("Connecting to {} ({})", device.name, device.address);

        self.invalidate_reconnect();
        self.close_session();
        self.set_status(ConnectionStatus::Connecting);

        match self.transport.open_session(&device) {
            Ok(session) => {
                debug!("Opened {}", session);
                self.session = Some(session);
                self.device.send_replace(Some(device));
            }
            Err(e) => {
                error!("Failed to connect to {}: {}", device.address, e);
                self.device.send_replace(None);
                self.set_status(ConnectionStatus::Disconnected);
            }
        }
    }

    /// Drop the connection and forget the device. Safe to call at any time.
    pub fn disconnect(&mut self) {
        self.invalidate_reconnect();
        let had_session = self.close_session();
        let had_device = self.device.send_replace(None).is_some();
        self.set_status(ConnectionStatus::Disconnected);

        if had_session || had_device {
            info!("Disconnected from controller");
        }
    }

    /// Apply one transport callback.
    ///
    /// Returns a ticket when the link was lost and a reconnect must be armed.
    #[must_use]
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<ReconnectTicket> {
        if self.session != Some(event.session()) {
            debug!("Ignoring event from stale {}", event.session());
            return None;
        }

        match event {
            TransportEvent::LinkStateChanged {
                session,
                state: LinkState::Up,
            } => {
                self.on_link_up(session);
                None
            }
            TransportEvent::LinkStateChanged {
                state: LinkState::Down,
                ..
            } => self.on_link_down(),
            TransportEvent::ServicesDiscovered { session, result } => {
                self.on_services_discovered(session, result);
                None
            }
            TransportEvent::Notification {
                characteristic,
                value,
                ..
            } => {
                self.on_notification(characteristic, &value);
                None
            }
        }
    }

    /// Fire a previously issued reconnect.
    ///
    /// Stale tickets are ignored. Returns a new ticket if the attempt could
    /// not even be started.
    #[must_use]
    pub fn reconnect_due(&mut self, ticket: &ReconnectTicket) -> Option<ReconnectTicket> {
        if self.pending_reconnect.as_ref() != Some(ticket) {
            debug!("Ignoring stale reconnect for {}", ticket.address);
            return None;
        }
        self.pending_reconnect = None;

        let device = match self.device() {
            Some(device) if device.address == ticket.address => device,
            _ => return None,
        };

        info!(
            "Attempting to reconnect to {} ({}), attempt {}",
            device.name, device.address, ticket.attempt
        );

        self.close_session();
        self.set_status(ConnectionStatus::Connecting);

        match self.transport.open_session(&device) {
            Ok(session) => {
                debug!("Opened {}", session);
                self.session = Some(session);
                None
            }
            Err(e) => {
                error!("Reconnect to {} failed: {}", device.address, e);
                self.set_status(ConnectionStatus::Disconnected);
                self.schedule_reconnect()
            }
        }
    }

    fn on_link_up(&mut self, session: SessionId) {
        if self.status() != ConnectionStatus::Connecting {
            debug!("Link up on {} while {:?}, ignoring", session, self.status());
            return;
        }

        info!("Connected to GATT server");
        self.reconnect_attempts = 0;
        self.set_status(ConnectionStatus::Connected);

        if let Err(e) = self.transport.discover_services(session) {
            error!("Could not start service discovery: {}", e);
        }
    }

    fn on_link_down(&mut self) -> Option<ReconnectTicket> {
        if self.pending_reconnect.is_some() {
            debug!("Link down while a reconnect is already pending");
            return None;
        }
        if self.status() == ConnectionStatus::Disconnected {
            return None;
        }

        warn!("{}", TransportError::LinkLost);
        self.set_status(ConnectionStatus::Disconnected);
        self.schedule_reconnect()
    }

    fn schedule_reconnect(&mut self) -> Option<ReconnectTicket> {
        let device = self.device()?;

        if !self.config.reconnect.allows(self.reconnect_attempts) {
            warn!(
                "Giving up on {} after {} reconnect attempt(s)",
                device.address, self.reconnect_attempts
            );
            self.close_session();
            self.device.send_replace(None);
            return None;
        }

        self.reconnect_attempts += 1;
        let ticket = ReconnectTicket {
            generation: self.generation,
            address: device.address,
            attempt: self.reconnect_attempts,
            delay: self.config.reconnect.next_delay(),
        };

        info!("Reconnecting in {:?}", ticket.delay);
        self.pending_reconnect = Some(ticket.clone());
        Some(ticket)
    }

    fn on_services_discovered(
        &mut self,
        session: SessionId,
        result: Result<GattProfile, TransportError>,
    ) {
        if self.status() != ConnectionStatus::Connected {
            debug!("Discovery result while {:?}, ignoring", self.status());
            return;
        }

        let profile = match result {
            Ok(profile) => profile,
            Err(e) => {
                error!("{}", e);
                return;
            }
        };
        debug!("Services discovered");

        let data_uuid = self.config.data_char_uuid;
        let descriptor_uuid = self.config.config_descriptor_uuid;

        // The link stays up either way; without the characteristic no frames arrive.
        let has_descriptor = match profile.find_characteristic(self.config.service_uuid, data_uuid)
        {
            Ok(characteristic) => characteristic.descriptors.contains(&descriptor_uuid),
            Err(e) => {
                error!("{}", e);
                return;
            }
        };

        if let Err(e) = self.transport.enable_notifications(session, data_uuid) {
            error!("Failed to enable notifications: {}", e);
            return;
        }

        if !has_descriptor {
            warn!("Configuration descriptor missing; notifications may not arrive");
            return;
        }

        match self.transport.write_descriptor(
            session,
            data_uuid,
            descriptor_uuid,
            &ENABLE_NOTIFICATION_VALUE,
        ) {
            Ok(()) => info!("Notifications enabled"),
            Err(e) => error!("Failed to write configuration descriptor: {}", e),
        }
    }

    fn on_notification(&mut self, characteristic: Uuid, value: &[u8]) {
        if characteristic != self.config.data_char_uuid {
            trace!("Ignoring notification on {}", characteristic);
            return;
        }
        if self.status() != ConnectionStatus::Connected {
            trace!("Ignoring notification while {:?}", self.status());
            return;
        }

        if self.config.raw_data_logging {
            trace!("Raw packet: {}", hex::encode(value));
        }

        match protocol::decode(value) {
            Ok(snapshot) => {
                self.snapshot.send_replace(snapshot);
            }
            Err(e) => warn!("Dropping controller frame: {}", e),
        }
    }

    fn invalidate_reconnect(&mut self) {
        self.generation += 1;
        self.pending_reconnect = None;
        self.reconnect_attempts = 0;
    }

    fn close_session(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                debug!("Closing {}", session);
                self.transport.close_session(session);
                true
            }
            None => false,
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                debug!("Connection status {:?} -> {:?}", *current, status);
                *current = status;
                true
            }
        });
    }
}
