//! Device runtime
//!
//! A [`Device`] wraps an [`Engine`] in a poll loop running on its own tokio
//! task. Control and observation go through a cloneable [`DeviceHandle`]:
//!
//! ```text
//!            start()          pause()
//!  Stopped ----------> Running <------> Paused
//!     ^                   |     resume()   |  step(): one round,
//!     |      stop()       |                |  then paused again
//!     +-------------------+----------------+
//! ```
//!
//! `stop()` takes effect at the next await point of the current round, even
//! in the middle of a blink or a handshake wait. The in-flight round is dropped
//! and every port is closed.

use std::sync::Arc;

use mesh_link::{DuplexLink, PortId, PortSet, SecondaryPort};
use mesh_protocol::{validate_name, Destination};
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, info_span, Instrument};

use crate::config::DeviceConfig;
use crate::engine::Engine;
use crate::error::DeviceError;
use crate::events::{DeviceEvent, EVENT_CHANNEL_CAPACITY};
use crate::routing::RoutingTable;

/// Lifecycle state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Application send queued for the next poll round
#[derive(Debug, Clone, PartialEq, Eq)]
enum Outgoing {
    Routed {
        destination: Destination,
        content: String,
    },
    OnPort {
        port: SecondaryPort,
        destination: Destination,
        content: String,
    },
}

struct Control {
    state: watch::Sender<RunState>,
    /// Set while no poll loop is running
    finished: watch::Sender<bool>,
    step: Notify,
}

/// A simulated device that has not been started yet
pub struct Device {
    engine: Engine,
    outbox_rx: mpsc::UnboundedReceiver<Outgoing>,
    handle: DeviceHandle,
}

impl Device {
    /// Create a device with all ports unconnected
    ///
    /// The name is truncated to ten characters and must be usable as a wire
    /// field.
    pub fn new(name: &str, config: DeviceConfig) -> Result<Self, DeviceError> {
        let name = validate_name(name)?;
        let ports = Arc::new(PortSet::new());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let engine = Engine::new(name.clone(), config, ports.clone(), events.clone());

        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let control = Arc::new(Control {
            state: watch::channel(RunState::Stopped).0,
            finished: watch::channel(true).0,
            step: Notify::new(),
        });

        let handle = DeviceHandle {
            name: name.into(),
            ports,
            control,
            events,
            routes: engine.routes(),
            outbox: outbox_tx,
        };

        Ok(Self {
            engine,
            outbox_rx,
            handle,
        })
    }

    /// Handle for controlling the device once it runs
    pub fn handle(&self) -> DeviceHandle {
        self.handle.clone()
    }

    /// Spawn the poll loop on the current tokio runtime
    pub fn start(self) -> JoinHandle<()> {
        self.mark_running();
        let span = info_span!("device", name = %self.engine.name());
        tokio::spawn(self.run_loop().instrument(span))
    }

    fn mark_running(&self) {
        let control = &self.handle.control;
        control.finished.send_replace(false);
        control.state.send_replace(RunState::Running);
    }

    async fn run_loop(self) {
        let Device {
            mut engine,
            mut outbox_rx,
            handle,
        } = self;
        let control = handle.control;

        info!("Device started");
        engine.emit(DeviceEvent::Started);

        let mut stop_rx = control.state.subscribe();
        let mut pause_rx = control.state.subscribe();

        loop {
            if *stop_rx.borrow_and_update() == RunState::Stopped {
                break;
            }

            let round = async {
                if !engine.config().cycle_delay().is_zero() {
                    sleep(engine.config().cycle_delay()).await;
                }
                wait_while_paused(&control, &mut pause_rx, &engine).await;

                while let Ok(outgoing) = outbox_rx.try_recv() {
                    deliver(&mut engine, outgoing).await;
                }
                engine.poll_cycle().await;
            };

            tokio::select! {
                _ = round => {}
                _ = stop_rx.wait_for(|state| *state == RunState::Stopped) => {
                    debug!("Stop requested mid-round");
                    break;
                }
            }
        }

        engine.ports().close_all();
        control.state.send_replace(RunState::Stopped);
        control.finished.send_replace(true);
        info!("Device stopped");
        engine.emit(DeviceEvent::Stopped);
    }
}

/// Block while paused until resumed, stepped or stopped
async fn wait_while_paused(
    control: &Control,
    state_rx: &mut watch::Receiver<RunState>,
    engine: &Engine,
) {
    if *state_rx.borrow_and_update() != RunState::Paused {
        return;
    }

    info!("Paused");
    engine.emit(DeviceEvent::Paused);

    loop {
        tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                let state = *state_rx.borrow_and_update();
                match state {
                    RunState::Paused => continue,
                    RunState::Running => {
                        info!("Resumed");
                        engine.emit(DeviceEvent::Resumed);
                        return;
                    }
                    RunState::Stopped => return,
                }
            }
            _ = control.step.notified() => {
                info!("Stepping");
                engine.emit(DeviceEvent::Stepped);
                return;
            }
        }
    }
}

async fn deliver(engine: &mut Engine, outgoing: Outgoing) {
    match outgoing {
        Outgoing::Routed {
            destination,
            content,
        } => {
            engine.send(destination, &content).await;
        }
        Outgoing::OnPort {
            port,
            destination,
            content,
        } => {
            engine.send_on(port, destination, &content).await;
        }
    }
}

/// Cloneable control surface of a device
#[derive(Clone)]
pub struct DeviceHandle {
    name: Arc<str>,
    ports: Arc<PortSet>,
    control: Arc<Control>,
    events: broadcast::Sender<DeviceEvent>,
    routes: watch::Receiver<RoutingTable>,
    outbox: mpsc::UnboundedSender<Outgoing>,
}

impl DeviceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ports(&self) -> &Arc<PortSet> {
        &self.ports
    }

    /// Link end currently installed on `port`
    pub fn link(&self, port: PortId) -> DuplexLink {
        self.ports.link(port)
    }

    /// Connect a port to an external link end, replacing any connection
    pub fn connect(&self, port: PortId, other: &DuplexLink) -> Result<(), DeviceError> {
        self.ports.connect(port, other)?;
        Ok(())
    }

    /// Wire a secondary port of this device to a secondary port of `other`
    ///
    /// Both ports must be unconnected; on failure neither device changes.
    pub fn connect_to(
        &self,
        port: SecondaryPort,
        other: &DeviceHandle,
        other_port: SecondaryPort,
    ) -> Result<(), DeviceError> {
        self.link(port.into()).connect(&other.link(other_port.into()))?;
        info!("Connected {} port {} to {} port {}", self.name, port, other.name, other_port);
        Ok(())
    }

    /// Close the link on `port`
    pub fn disconnect(&self, port: PortId) {
        self.ports.disconnect(port);
    }

    pub fn state(&self) -> RunState {
        *self.control.state.borrow()
    }

    /// Block the poll loop before its next round
    pub fn pause(&self) {
        self.control.state.send_if_modified(|state| {
            if *state == RunState::Running {
                *state = RunState::Paused;
                true
            } else {
                false
            }
        });
    }

    /// Leave the paused state
    pub fn resume(&self) {
        self.control.state.send_if_modified(|state| {
            if *state == RunState::Paused {
                *state = RunState::Running;
                true
            } else {
                false
            }
        });
    }

    /// Let a paused device run exactly one poll round
    ///
    /// A step requested while running is kept and consumed by the next pause.
    pub fn step(&self) {
        self.control.step.notify_one();
    }

    /// Stop the poll loop and close every port
    pub fn stop(&self) {
        self.control.state.send_replace(RunState::Stopped);
    }

    /// Wait until the poll loop has exited
    pub async fn wait_stopped(&self) {
        let mut finished = self.control.finished.subscribe();
        let _ = finished.wait_for(|done| *done).await;
    }

    /// Subscribe to device events
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the routing table
    pub fn routing_table(&self) -> RoutingTable {
        self.routes.borrow().clone()
    }

    /// Receiver notified on every routing table change
    pub fn routes(&self) -> watch::Receiver<RoutingTable> {
        self.routes.clone()
    }

    /// Queue application content for `destination`
    pub fn send(&self, destination: Destination, content: impl Into<String>) -> Result<(), DeviceError> {
        self.enqueue(Outgoing::Routed {
            destination,
            content: content.into(),
        })
    }

    /// Queue application content on an explicit secondary port
    pub fn send_on(
        &self,
        port: SecondaryPort,
        destination: Destination,
        content: impl Into<String>,
    ) -> Result<(), DeviceError> {
        self.enqueue(Outgoing::OnPort {
            port,
            destination,
            content: content.into(),
        })
    }

    fn enqueue(&self, outgoing: Outgoing) -> Result<(), DeviceError> {
        self.outbox
            .send(outgoing)
            .map_err(|_| DeviceError::Stopped(self.name.to_string()))
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("ports", &self.ports)
            .finish()
    }
}
