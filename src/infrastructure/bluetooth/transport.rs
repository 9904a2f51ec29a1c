//! BLE Transport Seam
//!
//! The connection state machine drives a transport through [`Transport`] and
//! hears back through [`TransportEvent`]s posted on an [`EventSink`]. No call
//! on the trait waits for the radio; completions always arrive as events.

use crate::domain::models::DeviceHandle;
use crate::infrastructure::bluetooth::service::ServiceEvent;
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifies one open transport session.
///
/// Events always carry the session they belong to so late callbacks from an
/// abandoned attempt can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("controller service {0} not found")]
    ServiceNotFound(Uuid),

    #[error("controller characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("link lost")]
    LinkLost,

    #[error("service discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error("{0} is closed")]
    SessionClosed(SessionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub descriptors: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

/// Services reported by a successful discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GattProfile {
    pub services: Vec<GattService>,
}

impl GattProfile {
    /// Find a characteristic inside a given service.
    pub fn find_characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<&GattCharacteristic, TransportError> {
        let service = self
            .services
            .iter()
            .find(|s| s.uuid == service)
            .ok_or(TransportError::ServiceNotFound(service))?;

        service
            .characteristics
            .iter()
            .find(|c| c.uuid == characteristic)
            .ok_or(TransportError::CharacteristicNotFound(characteristic))
    }
}

/// Callbacks delivered by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    LinkStateChanged {
        session: SessionId,
        state: LinkState,
    },
    ServicesDiscovered {
        session: SessionId,
        result: Result<GattProfile, TransportError>,
    },
    Notification {
        session: SessionId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}

impl TransportEvent {
    pub fn session(&self) -> SessionId {
        match self {
            Self::LinkStateChanged { session, .. }
            | Self::ServicesDiscovered { session, .. }
            | Self::Notification { session, .. } => *session,
        }
    }
}

/// Where a transport posts its events.
///
/// Events land on the same queue as user commands and reconnect timers, so the
/// state machine sees them in delivery order.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<ServiceEvent>,
}

impl EventSink {
    pub(crate) fn new(sender: mpsc::UnboundedSender<ServiceEvent>) -> Self {
        Self { sender }
    }

    /// Post an event. Returns false once the service has shut down.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.sender.send(ServiceEvent::Transport(event)).is_ok()
    }
}

/// A BLE stack the connection state machine can drive.
pub trait Transport: Send + 'static {
    /// Start connecting to `device`. Link-up or link-down follows as an event.
    fn open_session(&mut self, device: &DeviceHandle) -> Result<SessionId, TransportError>;

    /// Release a session. Closing an unknown or already closed session is a no-op.
    fn close_session(&mut self, session: SessionId);

    /// Request service discovery. The result follows as
    /// [`TransportEvent::ServicesDiscovered`].
    fn discover_services(&mut self, session: SessionId) -> Result<(), TransportError>;

    /// Turn on local notification delivery for a characteristic.
    fn enable_notifications(
        &mut self,
        session: SessionId,
        characteristic: Uuid,
    ) -> Result<(), TransportError>;

    fn write_descriptor(
        &mut self,
        session: SessionId,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::protocol::{
        CONFIG_DESCRIPTOR_UUID, DATA_CHAR_UUID, SERVICE_UUID,
    };

    fn profile(service: Uuid, characteristic: Uuid) -> GattProfile {
        GattProfile {
            services: vec![GattService {
                uuid: service,
                characteristics: vec![GattCharacteristic {
                    uuid: characteristic,
                    descriptors: vec![CONFIG_DESCRIPTOR_UUID],
                }],
            }],
        }
    }

    #[test]
    fn test_find_characteristic() {
        let found = profile(SERVICE_UUID, DATA_CHAR_UUID)
            .find_characteristic(SERVICE_UUID, DATA_CHAR_UUID)
            .unwrap()
            .clone();
        assert_eq!(found.uuid, DATA_CHAR_UUID);
        assert_eq!(found.descriptors, vec![CONFIG_DESCRIPTOR_UUID]);
    }

    #[test]
    fn test_missing_service() {
        let other = Uuid::from_u128(1);
        let profile = profile(other, DATA_CHAR_UUID);
        let result = profile.find_characteristic(SERVICE_UUID, DATA_CHAR_UUID);
        assert_eq!(result, Err(TransportError::ServiceNotFound(SERVICE_UUID)));
    }

    #[test]
    fn test_missing_characteristic() {
        let other = Uuid::from_u128(2);
        let profile = profile(SERVICE_UUID, other);
        let result = profile.find_characteristic(SERVICE_UUID, DATA_CHAR_UUID);
        assert_eq!(
            result,
            Err(TransportError::CharacteristicNotFound(DATA_CHAR_UUID))
        );
    }

    #[test]
    fn test_event_session() {
        let event = TransportEvent::Notification {
            session: SessionId(7),
            characteristic: DATA_CHAR_UUID,
            value: vec![],
        };
        assert_eq!(event.session(), SessionId(7));
        assert_eq!(SessionId(7).to_string(), "session#7");
    }
}
