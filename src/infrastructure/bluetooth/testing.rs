//! Recording transport for state machine and service tests.

use crate::domain::models::DeviceHandle;
use crate::infrastructure::bluetooth::transport::{
    EventSink, SessionId, Transport, TransportError, TransportEvent,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(String),
    Close(SessionId),
    Discover(SessionId),
    Enable(SessionId, Uuid),
    WriteDescriptor(SessionId, Uuid, Uuid, Vec<u8>),
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    open: HashSet<SessionId>,
    max_open: usize,
    next_session: u64,
    fail_open: bool,
    sink: Option<EventSink>,
}

/// Transport that records every call and lets the test play the radio.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn attach(&self, sink: EventSink) {
        self.state.lock().unwrap().sink = Some(sink);
    }

    pub fn emit(&self, event: TransportEvent) {
        let sink = self.state.lock().unwrap().sink.clone();
        assert!(sink.expect("no event sink attached").emit(event));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.state.lock().unwrap().open.len()
    }

    /// Highest number of sessions that were ever open at once.
    pub fn max_open_sessions(&self) -> usize {
        self.state.lock().unwrap().max_open
    }

    pub fn last_session(&self) -> Option<SessionId> {
        let state = self.state.lock().unwrap();
        (state.next_session > 0).then(|| SessionId(state.next_session))
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().unwrap().fail_open = fail;
    }
}

impl Transport for MockTransport {
    fn open_session(&mut self, device: &DeviceHandle) -> Result<SessionId, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Open(device.address.clone()));
        if state.fail_open {
            return Err(TransportError::Unavailable("adapter off".to_string()));
        }

        state.next_session += 1;
        let session = SessionId(state.next_session);
        state.open.insert(session);
        state.max_open = state.max_open.max(state.open.len());
        Ok(session)
    }

    fn close_session(&mut self, session: SessionId) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Close(session));
        state.open.remove(&session);
    }

    fn discover_services(&mut self, session: SessionId) -> Result<(), TransportError> {
        self.state.lock().unwrap().calls.push(Call::Discover(session));
        Ok(())
    }

    fn enable_notifications(
        &mut self,
        session: SessionId,
        characteristic: Uuid,
    ) -> Result<(), TransportError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Enable(session, characteristic));
        Ok(())
    }

    fn write_descriptor(
        &mut self,
        session: SessionId,
        characteristic: Uuid,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), TransportError> {
        self.state.lock().unwrap().calls.push(Call::WriteDescriptor(
            session,
            characteristic,
            descriptor,
            value.to_vec(),
        ));
        Ok(())
    }
}
