//! Bluetooth Service Module
//!
//! Runs the connection state machine on a single tokio task. User commands,
//! transport callbacks and reconnect timers all arrive on one queue, so no two
//! transitions ever interleave.

use crate::domain::models::{ConnectionStatus, ControllerSnapshot, DeviceHandle};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::{
    connection::{ConnectionConfig, ConnectionStateMachine, ReconnectTicket},
    scanner::{DeviceDirectory, PairedDeviceScanner},
    transport::{EventSink, Transport, TransportEvent},
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub enum Command {
    Connect(DeviceHandle),
    Disconnect,
    /// Disconnect and stop the service task
    Shutdown,
}

/// Everything the service task reacts to.
#[derive(Debug)]
pub enum ServiceEvent {
    Command(Command),
    Transport(TransportEvent),
    ReconnectDue(ReconnectTicket),
}

/// Owner of the connection state machine.
pub struct BluetoothService<T: Transport> {
    machine: ConnectionStateMachine<T>,
    events: mpsc::UnboundedReceiver<ServiceEvent>,
    sender: mpsc::UnboundedSender<ServiceEvent>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl<T: Transport> BluetoothService<T> {
    /// Start the service on the current tokio runtime.
    ///
    /// `make_transport` receives the sink the transport must post its events
    /// to. The returned join handle completes after [`ServiceHandle::shutdown`].
    pub fn spawn<F>(
        settings: &Settings,
        directory: Arc<dyn DeviceDirectory>,
        make_transport: F,
    ) -> (ServiceHandle, JoinHandle<()>)
    where
        F: FnOnce(EventSink) -> T,
    {
        let (sender, events) = mpsc::unbounded_channel();
        let transport = make_transport(EventSink::new(sender.clone()));
        let machine = ConnectionStateMachine::new(transport, ConnectionConfig::from(settings));

        let handle = ServiceHandle {
            commands: sender.clone(),
            snapshot: machine.subscribe_snapshot(),
            status: machine.subscribe_status(),
            device: machine.subscribe_device(),
            scanner: PairedDeviceScanner::new(directory, settings),
        };

        let service = Self {
            machine,
            events,
            sender,
            reconnect_timer: None,
        };
        let task = tokio::spawn(service.run());

        (handle, task)
    }

    async fn run(mut self) {
        info!("Bluetooth service started");

        while let Some(event) = self.events.recv().await {
            if !self.handle(event) {
                break;
            }
        }

        info!("Bluetooth service stopped");
    }

    /// Apply one event. Returns `false` once the service should stop.
    fn handle(&mut self, event: ServiceEvent) -> bool {
        match event {
            ServiceEvent::Command(Command::Connect(device)) => {
                self.cancel_reconnect_timer();
                self.machine.connect(device);
            }
            ServiceEvent::Command(Command::Disconnect) => {
                self.cancel_reconnect_timer();
                self.machine.disconnect();
            }
            ServiceEvent::Command(Command::Shutdown) => {
                self.cancel_reconnect_timer();
                self.machine.disconnect();
                return false;
            }
            ServiceEvent::Transport(event) => {
                if let Some(ticket) = self.machine.handle_event(event) {
                    self.arm_reconnect_timer(ticket);
                }
            }
            ServiceEvent::ReconnectDue(ticket) => {
                // A stale ticket must not drop the handle of the live timer
                if self.machine.pending_reconnect() == Some(&ticket) {
                    self.reconnect_timer = None;
                }
                if let Some(ticket) = self.machine.reconnect_due(&ticket) {
                    self.arm_reconnect_timer(ticket);
                }
            }
        }
        true
    }

    fn arm_reconnect_timer(&mut self, ticket: ReconnectTicket) {
        self.cancel_reconnect_timer();
        let sender = self.sender.clone();
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(ticket.delay).await;
            let _ = sender.send(ServiceEvent::ReconnectDue(ticket));
        }));
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

/// Cloneable front end to a running [`BluetoothService`].
///
/// Commands are queued and never block; published values are read from
/// watch channels.
#[derive(Clone)]
pub struct ServiceHandle {
    commands: mpsc::UnboundedSender<ServiceEvent>,
    snapshot: watch::Receiver<ControllerSnapshot>,
    status: watch::Receiver<ConnectionStatus>,
    device: watch::Receiver<Option<DeviceHandle>>,
    scanner: PairedDeviceScanner,
}

impl ServiceHandle {
    pub fn list_paired_devices(&self) -> Vec<DeviceHandle> {
        self.scanner.list_paired_devices()
    }

    pub fn connect(&self, device: DeviceHandle) {
        self.send(Command::Connect(device));
    }

    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    pub fn current_snapshot(&self) -> ControllerSnapshot {
        *self.snapshot.borrow()
    }

    pub fn current_status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn current_handle(&self) -> Option<DeviceHandle> {
        self.device.borrow().clone()
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn subscribe_device(&self) -> watch::Receiver<Option<DeviceHandle>> {
        self.device.clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(ServiceEvent::Command(command)).is_err() {
            warn!("Bluetooth service is not running");
        }
    }
}
