//! Protocol engine
//!
//! The engine owns everything a device knows: its ports, routing table,
//! button latches and LEDs. It implements one poll round of the device
//! firmware:
//!
//! 1. consume latched button presses and broadcast `blink leds`
//! 2. read one line from the primary port, if anything is waiting
//! 3. listen on each secondary port in turn and accept an RTS/CTS handshake
//!
//! Sending uses the same handshake from the other side: write `RTS`, wait,
//! and only write the `MSG` frame if the peer answered `CTS`.
//!
//! Every configured delay is an upper bound. A wait for input ends as soon as
//! a complete line is buffered, so two devices whose delays are all multiples
//! of each other never fall into lockstep. All waits are tokio timers, so a
//! runtime can abandon a round at any await point by dropping the future.

use std::sync::Arc;
use std::time::Duration;

use mesh_link::{PortId, PortSet, SecondaryPort};
use mesh_protocol::{
    Button, Command, Destination, Envelope, Led, Message, ParseError, BLINK_LEDS,
};
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep_until, timeout, timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::DeviceConfig;
use crate::events::DeviceEvent;
use crate::peripherals::{ButtonLatches, LedController};
use crate::routing::RoutingTable;

/// Handshake frames returned to the caller instead of being acted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Rts,
    Cts,
}

/// Protocol state and behaviour of one device
#[derive(Debug)]
pub struct Engine {
    name: String,
    config: DeviceConfig,
    ports: Arc<PortSet>,
    routing: RoutingTable,
    routes_tx: watch::Sender<RoutingTable>,
    buttons: ButtonLatches,
    leds: LedController,
    events: broadcast::Sender<DeviceEvent>,
}

impl Engine {
    /// Create an engine for an already validated device name
    pub fn new(
        name: String,
        config: DeviceConfig,
        ports: Arc<PortSet>,
        events: broadcast::Sender<DeviceEvent>,
    ) -> Self {
        let leds = LedController::new(ports.clone(), events.clone(), &config);
        let (routes_tx, _) = watch::channel(RoutingTable::new());
        Self {
            name,
            config,
            ports,
            routing: RoutingTable::new(),
            routes_tx,
            buttons: ButtonLatches::new(),
            leds,
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn ports(&self) -> &Arc<PortSet> {
        &self.ports
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn buttons(&self) -> &ButtonLatches {
        &self.buttons
    }

    pub fn leds(&self) -> &LedController {
        &self.leds
    }

    /// Receiver that always holds the latest routing table
    pub fn routes(&self) -> watch::Receiver<RoutingTable> {
        self.routes_tx.subscribe()
    }

    /// Publish an event; having no subscribers is fine
    pub fn emit(&self, event: DeviceEvent) {
        let _ = self.events.send(event);
    }

    // -------------------------------------------------------------------------
    // Poll round
    // -------------------------------------------------------------------------

    /// Run one full poll round
    pub async fn poll_cycle(&mut self) {
        self.check_buttons().await;
        self.poll_primary().await;
        for port in SecondaryPort::ALL {
            self.poll_secondary(port).await;
        }
    }

    /// Broadcast `blink leds` for each latched button press
    ///
    /// Button one reaches every route, button two only the known ones.
    pub async fn check_buttons(&mut self) {
        for (button, destination) in [(Button::One, Destination::All), (Button::Two, Destination::Known)] {
            if !self.buttons.take(button) {
                continue;
            }
            info!("{} pressed, sending '{}' to {}", button.id(), BLINK_LEDS, destination);
            self.emit(DeviceEvent::ButtonPressed(button));
            self.broadcast(BLINK_LEDS, destination, None).await;
        }
    }

    /// Handle one line from the collaborator if one is waiting
    pub async fn poll_primary(&mut self) {
        if !self.ports.is_connected(PortId::Primary) {
            return;
        }

        if !self.wait_line(PortId::Primary, self.config.port_check_delay()).await {
            trace!("Nothing waiting on primary");
            return;
        }

        let line = self.ports.read_line(PortId::Primary).await;
        debug!("Received on primary: {}", line);
        self.handle_line(PortId::Primary, &line).await;
    }

    /// Listen on a secondary port and accept one handshake
    ///
    /// The window lasts `port_check_delay` at most and closes as soon as a
    /// line is waiting. An `RTS` written while the device was busy elsewhere
    /// is still waiting when the window opens and is answered straight away.
    /// Input is only accepted if its first line is `RTS`; anything else is
    /// discarded without a reply.
    pub async fn poll_secondary(&mut self, port: SecondaryPort) {
        let id = PortId::from(port);
        self.leds.show_port(port, true);
        trace!("Listening on {}", id);

        if self.wait_line(id, self.config.port_check_delay()).await {
            self.leds.show(Led::Rx, true);
            self.accept(port).await;
            self.leds.show(Led::Rx, false);
        }

        self.leds.show_port(port, false);
    }

    async fn accept(&mut self, port: SecondaryPort) {
        let id = PortId::from(port);
        let line = self.ports.read_line(id).await;
        if !matches!(Message::parse(&line), Ok(Message::Rts)) {
            info!("Disregarding '{}' on {}: expected RTS", line, id);
            return;
        }

        // A sender that missed our CTS asks again; answer each RTS
        for _ in 0..self.config.rts_attempts.max(1) {
            debug!("RTS on {}, replying CTS", id);
            self.ports.flush(id);
            self.ports.clear(id);
            self.ports.write_line(id, &Message::Cts.to_string());

            if !self.wait_line(id, self.config.after_cts_delay()).await {
                info!("No message after CTS on {}", id);
                return;
            }

            let line = self.ports.read_line(id).await;
            if self.handle_line(id, &line).await != Some(Signal::Rts) {
                return;
            }
        }
        warn!("Peer on {} kept repeating RTS, giving up", id);
    }

    /// Wait up to `limit` for a complete line on `port`
    async fn wait_line(&self, port: PortId, limit: Duration) -> bool {
        timeout(limit, self.ports.wait_line(port)).await.is_ok()
    }

    // -------------------------------------------------------------------------
    // Receive path
    // -------------------------------------------------------------------------

    /// Dispatch a received line
    ///
    /// `PING` is answered on the same port, `MSG` and button frames are
    /// processed. Handshake frames are returned to the caller.
    pub async fn handle_line(&mut self, port: PortId, line: &str) -> Option<Signal> {
        match Message::parse(line) {
            Ok(Message::Ping) => {
                info!("Responding to PING on {}", port);
                self.ports.write_line(port, &Message::Pong.to_string());
                None
            }
            Ok(Message::Msg(envelope)) => {
                self.process_envelope(port, envelope).await;
                None
            }
            Ok(Message::Rts) => Some(Signal::Rts),
            Ok(Message::Cts) => Some(Signal::Cts),
            Ok(Message::Button(command)) => {
                self.process_command(&command).await;
                None
            }
            Ok(Message::Pong) => {
                debug!("PONG on {}", port);
                None
            }
            Err(ParseError::Empty) => None,
            Err(e) => {
                warn!("Dropping '{}' on {}: {}", line, port, e);
                None
            }
        }
    }

    async fn process_envelope(&mut self, port: PortId, envelope: Envelope) {
        info!(
            "Message '{}' from {} for {} on {}",
            envelope.content, envelope.sender, envelope.destination, port
        );
        self.emit(DeviceEvent::MessageReceived {
            port,
            envelope: envelope.clone(),
        });

        if envelope.sender != self.name {
            if let Some(secondary) = port.secondary() {
                self.learn_route(secondary, &envelope.sender);
            }
        }

        self.process_command(&envelope.content).await;

        let inbound = port.secondary();
        match envelope.destination {
            Destination::Device(ref name) if *name == self.name => {
                debug!("Message is for this device");
            }
            Destination::Device(name) => match self.routing.route(&name) {
                Some(next) if Some(next) != inbound => {
                    let forward = Envelope::new(
                        envelope.content,
                        Destination::Device(name),
                        self.name.clone(),
                    );
                    self.send_message(next, &forward).await;
                }
                _ => warn!("No onward route to {}, dropping message", name),
            },
            scope => {
                self.broadcast(&envelope.content, scope, inbound).await;
            }
        }
    }

    /// Interpret message content as a peripheral command
    pub async fn process_command(&mut self, content: &str) {
        match Command::classify(content, self.config.command_routing) {
            Ok(Command::Reset) => {
                info!("Resetting routing table");
                self.routing.clear();
                self.publish_routes();
                self.emit(DeviceEvent::RoutesCleared);
                self.leds.blink(1, self.config.reset_blink()).await;
            }
            Ok(Command::Button(command)) => self.buttons.apply(command),
            Ok(Command::Led(command)) => self.leds.execute(command).await,
            Ok(Command::Unrecognized) => trace!("Ignoring content '{}'", content),
            Err(e) => warn!("Dropping command '{}': {}", content, e),
        }
    }

    fn learn_route(&mut self, port: SecondaryPort, name: &str) {
        if self.routing.name(port) != name {
            info!("Learned route: {} is on port {}", name, port);
        }
        self.routing.learn(port, name);
        self.publish_routes();
        self.emit(DeviceEvent::RouteLearned {
            port,
            name: name.to_string(),
        });
    }

    fn publish_routes(&self) {
        self.routes_tx.send_replace(self.routing.clone());
    }

    // -------------------------------------------------------------------------
    // Send path
    // -------------------------------------------------------------------------

    /// Send application content from this device
    ///
    /// Device names are resolved through the routing table; the two
    /// broadcast scopes go to every matching port. Returns the number of
    /// ports the message was delivered on.
    pub async fn send(&mut self, destination: Destination, content: &str) -> usize {
        match destination {
            Destination::Device(name) => match self.routing.route(&name) {
                Some(port) => {
                    let envelope = Envelope::new(content, Destination::Device(name), self.name.clone());
                    usize::from(self.send_message(port, &envelope).await)
                }
                None => {
                    warn!("No route to {}", name);
                    0
                }
            },
            scope => self.broadcast(content, scope, None).await,
        }
    }

    /// Send application content on an explicit port, bypassing routing
    pub async fn send_on(&mut self, port: SecondaryPort, destination: Destination, content: &str) -> bool {
        let envelope = Envelope::new(content, destination, self.name.clone());
        self.send_message(port, &envelope).await
    }

    /// Send `content` on every port in scope, skipping `except`
    ///
    /// [`Destination::Known`] limits the ports to those with a learned name.
    /// The scope only picks local ports: every copy is addressed to
    /// [`Destination::All`], so the next hop floods all of its routes.
    pub async fn broadcast(
        &mut self,
        content: &str,
        scope: Destination,
        except: Option<SecondaryPort>,
    ) -> usize {
        let known_only = scope == Destination::Known;
        let targets: Vec<SecondaryPort> = SecondaryPort::ALL
            .into_iter()
            .filter(|&port| Some(port) != except)
            .filter(|&port| !known_only || self.routing.is_known(port))
            .collect();

        let envelope = Envelope::new(content, Destination::All, self.name.clone());
        let mut delivered = 0;
        for port in targets {
            if self.send_message(port, &envelope).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver one `MSG` frame on `port` using the RTS/CTS handshake
    ///
    /// Writes `RTS` up to `rts_attempts` times, waiting at most
    /// `after_rts_delay` for an answer after each. The frame is written only
    /// once the peer answers `CTS`.
    pub async fn send_message(&mut self, port: SecondaryPort, envelope: &Envelope) -> bool {
        let id = PortId::from(port);
        if !self.ports.is_connected(id) {
            debug!("{} is not connected, not sending to {}", id, envelope.destination);
            self.emit(DeviceEvent::SendFailed {
                port,
                envelope: envelope.clone(),
                attempts: 0,
            });
            return false;
        }

        let frame = Message::Msg(envelope.clone()).to_string();
        let max_attempts = self.config.rts_attempts.max(1);
        let mut attempts = 0;
        let mut sent = false;

        self.leds.show_port(port, true);
        self.leds.show(Led::Tx, true);

        while !sent && attempts < max_attempts {
            attempts += 1;
            self.ports.clear(id);
            self.ports.flush(id);
            self.ports.write_line(id, &Message::Rts.to_string());

            let deadline = Instant::now() + self.config.after_rts_delay();
            if timeout_at(deadline, self.ports.wait_line(id)).await.is_err() {
                debug!("No response to RTS on {} ({}/{})", id, attempts, max_attempts);
                continue;
            }

            let response = self.ports.read_line(id).await;
            if matches!(Message::parse(&response), Ok(Message::Cts)) {
                debug!("CTS on {}, writing message", id);
                self.ports.write_line(id, &frame);
                sent = true;
            } else {
                warn!("Unexpected response to RTS on {}: '{}'", id, response);
                sleep_until(deadline).await;
            }
        }

        self.leds.show(Led::Tx, false);
        self.leds.show_port(port, false);

        let envelope = envelope.clone();
        if sent {
            info!("Sent '{}' to {} on {}", envelope.content, envelope.destination, id);
            self.emit(DeviceEvent::MessageSent { port, envelope, attempts });
        } else {
            warn!("Giving up on {} after {} RTS attempts", id, attempts);
            self.emit(DeviceEvent::SendFailed { port, envelope, attempts });
        }
        sent
    }
}
