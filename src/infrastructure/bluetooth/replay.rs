//! Replay Transport
//!
//! Plays captured controller frames as if a controller were attached. After
//! the last frame the link drops, which exercises the reconnect path; each
//! reconnect replays the capture from the start.

use crate::domain::models::DeviceHandle;
use crate::infrastructure::bluetooth::protocol::{self, ENABLE_NOTIFICATION_VALUE};
use crate::infrastructure::bluetooth::transport::{
    EventSink, LinkState, SessionId, Transport, TransportError, TransportEvent,
};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Name and address of the simulated controller
pub const REPLAY_DEVICE_NAME: &str = "Gear VR Controller(Replay)";
pub const REPLAY_DEVICE_ADDRESS: &str = "00:00:5E:00:53:01";

/// Delay between replayed frames
pub const FRAME_INTERVAL_MS: u64 = 20;
/// Delay between opening a session and link-up
pub const LINK_DELAY_MS: u64 = 200;

pub struct ReplayTransport {
    frames: Arc<Vec<Vec<u8>>>,
    sink: EventSink,
    frame_interval: Duration,
    link_delay: Duration,
    next_session: u64,
    sessions: HashMap<SessionId, Vec<JoinHandle<()>>>,
}

impl ReplayTransport {
    pub fn new(frames: Vec<Vec<u8>>, sink: EventSink) -> Self {
        Self {
            frames: Arc::new(frames),
            sink,
            frame_interval: Duration::from_millis(FRAME_INTERVAL_MS),
            link_delay: Duration::from_millis(LINK_DELAY_MS),
            next_session: 0,
            sessions: HashMap::new(),
        }
    }

    pub fn with_timing(mut self, frame_interval: Duration, link_delay: Duration) -> Self {
        self.frame_interval = frame_interval;
        self.link_delay = link_delay;
        self
    }

    fn tasks(&mut self, session: SessionId) -> Result<&mut Vec<JoinHandle<()>>, TransportError> {
        self.sessions
            .get_mut(&session)
            .ok_or(TransportError::SessionClosed(session))
    }

    fn start_streaming(&mut self, session: SessionId) -> Result<(), TransportError> {
        let frames = Arc::clone(&self.frames);
        let sink = self.sink.clone();
        let interval = self.frame_interval;

        let task = tokio::spawn(async move {
            for value in frames.iter() {
                tokio::time::sleep(interval).await;
                let event = TransportEvent::Notification {
                    session,
                    characteristic: protocol::DATA_CHAR_UUID,
                    value: value.clone(),
                };
                if !sink.emit(event) {
                    return;
                }
            }
            info!("Replay finished, dropping link");
            sink.emit(TransportEvent::LinkStateChanged {
                session,
                state: LinkState::Down,
            });
        });

        self.tasks(session)?.push(task);
        Ok(())
    }
}

impl Transport for ReplayTransport {
    fn open_session(&mut self, device: &DeviceHandle) -> Result<SessionId, TransportError> {
        if device.address != REPLAY_DEVICE_ADDRESS {
            return Err(TransportError::Unavailable(format!(
                "no replay device at {}",
                device.address
            )));
        }

        self.next_session += 1;
        let session = SessionId(self.next_session);
        debug!("Replay {} opened", session);

        let sink = self.sink.clone();
        let delay = self.link_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sink.emit(TransportEvent::LinkStateChanged {
                session,
                state: LinkState::Up,
            });
        });

        self.sessions.insert(session, vec![task]);
        Ok(session)
    }

    fn close_session(&mut self, session: SessionId) {
        if let Some(tasks) = self.sessions.remove(&session) {
            debug!("Replay {} closed", session);
            for task in tasks {
                task.abort();
            }
        }
    }

    fn discover_services(&mut self, session: SessionId) -> Result<(), TransportError> {
        self.tasks(session)?;
        self.sink.emit(TransportEvent::ServicesDiscovered {
            session,
            result: Ok(protocol::controller_profile()),
        });
        Ok(())
    }

    fn enable_notifications(
        &mut self,
        session: SessionId,
        characteristic: Uuid,
    ) -> Result<(), TransportError> {
        self.tasks(session)?;
        if characteristic != protocol::DATA_CHAR_UUID {
            return Err(TransportError::CharacteristicNotFound(characteristic));
        }
        Ok(())
    }

    fn write_descriptor(
        &mut self,
        session: SessionId,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), TransportError> {
        self.tasks(session)?;
        if characteristic == protocol::DATA_CHAR_UUID
            && descriptor == protocol::CONFIG_DESCRIPTOR_UUID
            && value == ENABLE_NOTIFICATION_VALUE
        {
            self.start_streaming(session)?;
        }
        Ok(())
    }
}

/// Parse a capture: one hex-encoded frame per line. Blank lines and lines
/// starting with `#` are skipped; whitespace inside a line is ignored.
pub fn parse_capture(text: &str) -> Result<Vec<Vec<u8>>> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(number, line)| {
            let compact: String = line.split_whitespace().collect();
            hex::decode(&compact).with_context(|| format!("Invalid frame on line {}", number))
        })
        .collect()
}

pub fn load_capture(path: &Path) -> Result<Vec<Vec<u8>>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read capture {}", path.display()))?;
    let frames = parse_capture(&text)?;
    info!("Loaded {} frame(s) from {}", frames.len(), path.display());
    Ok(frames)
}

/// A short built-in capture: rest, volume up, a swing, a touchpad push up.
pub fn demo_frames() -> Vec<Vec<u8>> {
    let rest = vec![0u8; protocol::FRAME_LEN];

    let mut volume_up = rest.clone();
    volume_up[protocol::BUTTON_OFFSET] = protocol::buttons::VOLUME_UP;

    let mut swing = rest.clone();
    swing[protocol::GYRO_OFFSET..protocol::GYRO_OFFSET + 2]
        .copy_from_slice(&1500i16.to_le_bytes());

    let mut touch_up = rest.clone();
    touch_up[protocol::TOUCHPAD_Y_OFFSET] = (-100i8) as u8;

    vec![rest.clone(), volume_up, rest.clone(), swing, touch_up, rest]
}
