//! A running network of devices with their consoles

use std::collections::BTreeMap;

use mesh_link::{LinkError, SecondaryPort};
use mesh_sim::{Device, DeviceError, DeviceHandle};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::console::Console;
use crate::settings::{Topology, TopologyError};
use crate::shell::{ShellCommand, HELP};

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("console link: {0}")]
    Link(#[from] LinkError),
}

struct Node {
    handle: DeviceHandle,
    console: Console,
    task: JoinHandle<()>,
    listener: JoinHandle<()>,
}

/// Devices keyed by the name used in the topology
pub struct Mesh {
    nodes: BTreeMap<String, Node>,
}

impl Mesh {
    /// Create, wire and start every device in `topology`
    pub fn build(topology: &Topology) -> Result<Self, MeshError> {
        topology.validate()?;

        let mut devices = Vec::with_capacity(topology.devices.len());
        for spec in &topology.devices {
            devices.push((spec.name.clone(), Device::new(&spec.name, spec.config.clone())?));
        }

        let handles: BTreeMap<&str, DeviceHandle> = devices
            .iter()
            .map(|(name, device)| (name.as_str(), device.handle()))
            .collect();
        for link in &topology.links {
            let (Some(a), Some(b)) = (handles.get(link.a.as_str()), handles.get(link.b.as_str())) else {
                return Err(TopologyError::UnknownDevice(format!("{}/{}", link.a, link.b)).into());
            };
            let (Some(a_port), Some(b_port)) = (SecondaryPort::new(link.a_port), SecondaryPort::new(link.b_port)) else {
                continue;
            };
            a.connect_to(a_port, b, b_port)?;
        }

        let mut nodes = BTreeMap::new();
        for (name, device) in devices {
            let handle = device.handle();
            let (console, listener) = Console::attach(&handle)?;
            let task = device.start();
            nodes.insert(
                name,
                Node {
                    handle,
                    console,
                    task,
                    listener,
                },
            );
        }

        info!("Started {} devices", nodes.len());
        Ok(Self { nodes })
    }

    fn node(&self, name: &str) -> Result<&Node, MeshError> {
        self.nodes
            .get(name)
            .ok_or_else(|| MeshError::UnknownDevice(name.to_string()))
    }

    /// Names of all devices
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// Run a console command, returning text to show the user
    pub fn execute(&self, command: ShellCommand) -> Result<Option<String>, MeshError> {
        match command {
            ShellCommand::Press { device, button } => self.node(&device)?.console.press(button)?,
            ShellCommand::Release { device, button } => {
                self.node(&device)?.console.release(button)?
            }
            ShellCommand::Ping { device } => self.node(&device)?.console.ping()?,
            ShellCommand::Send {
                device,
                destination,
                content,
            } => self.node(&device)?.handle.send(destination, content)?,
            ShellCommand::Pause { device } => self.node(&device)?.handle.pause(),
            ShellCommand::Resume { device } => self.node(&device)?.handle.resume(),
            ShellCommand::Step { device } => self.node(&device)?.handle.step(),
            ShellCommand::Stop { device } => self.node(&device)?.handle.stop(),
            ShellCommand::Routes { device } => {
                return Ok(Some(self.node(&device)?.handle.routing_table().to_string()));
            }
            ShellCommand::Leds { device } => {
                let node = self.node(&device)?;
                return Ok(Some(format!(
                    "{} ({:?}): {}",
                    device,
                    node.handle.state(),
                    node.console.panel()
                )));
            }
            ShellCommand::Connect { a, a_port, b, b_port } => {
                let b = &self.node(&b)?.handle;
                self.node(&a)?.handle.connect_to(a_port, b, b_port)?;
            }
            ShellCommand::Disconnect { device, port } => {
                self.node(&device)?.handle.disconnect(port.into());
            }
            ShellCommand::Help => return Ok(Some(HELP.to_string())),
            ShellCommand::Quit => {}
        }
        Ok(None)
    }

    /// Stop every device and wait for the loops to exit
    pub async fn shutdown(self) {
        for node in self.nodes.values() {
            node.handle.stop();
        }
        for (name, node) in self.nodes {
            node.handle.wait_stopped().await;
            if let Err(e) = node.task.await {
                warn!("Device {} task failed: {}", name, e);
            }
            let _ = node.listener.await;
        }
        info!("All devices stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_protocol::Button;

    #[tokio::test(start_paused = true)]
    async fn test_default_mesh_lifecycle() {
        let mesh = Mesh::build(&Topology::default()).unwrap();
        assert_eq!(mesh.devices().collect::<Vec<_>>(), ["alice", "bob", "carol"]);

        let routes = mesh
            .execute(ShellCommand::Routes {
                device: "bob".into(),
            })
            .unwrap()
            .unwrap();
        assert!(routes.contains("- Port: 1, Device: UNKNOWN"));

        mesh.execute(ShellCommand::Press {
            device: "alice".into(),
            button: Button::Two,
        })
        .unwrap();
        mesh.execute(ShellCommand::Pause {
            device: "carol".into(),
        })
        .unwrap();

        let leds = mesh
            .execute(ShellCommand::Leds {
                device: "carol".into(),
            })
            .unwrap()
            .unwrap();
        assert!(leds.starts_with("carol (Paused)"));

        assert!(matches!(
            mesh.execute(ShellCommand::Ping {
                device: "dave".into()
            }),
            Err(MeshError::UnknownDevice(name)) if name == "dave"
        ));

        mesh.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rewire_ports() {
        let mesh = Mesh::build(&Topology::default()).unwrap();
        let alice = mesh.node("alice").unwrap().handle.clone();
        let carol = mesh.node("carol").unwrap().handle.clone();
        let p3 = SecondaryPort::ALL[3];

        mesh.execute(ShellCommand::Connect {
            a: "alice".into(),
            a_port: p3,
            b: "carol".into(),
            b_port: p3,
        })
        .unwrap();
        assert!(alice.ports().is_connected(p3.into()));
        assert!(carol.ports().is_connected(p3.into()));

        mesh.execute(ShellCommand::Disconnect {
            device: "carol".into(),
            port: p3,
        })
        .unwrap();
        assert!(!alice.ports().is_connected(p3.into()));

        mesh.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_busy_port_needs_disconnect() {
        let mesh = Mesh::build(&Topology::default()).unwrap();
        let alice = mesh.node("alice").unwrap().handle.clone();
        let bob = mesh.node("bob").unwrap().handle.clone();
        let carol = mesh.node("carol").unwrap().handle.clone();
        let p0 = SecondaryPort::ALL[0];
        let p2 = SecondaryPort::ALL[2];
        let connect = || ShellCommand::Connect {
            a: "carol".into(),
            a_port: p2,
            b: "bob".into(),
            b_port: p0,
        };

        // bob:0 is wired to alice:0
        assert!(matches!(
            mesh.execute(connect()),
            Err(MeshError::Device(DeviceError::Link(LinkError::PeerAlreadyConnected)))
        ));
        assert!(alice.ports().is_connected(p0.into()));
        assert!(!carol.ports().is_connected(p2.into()));

        mesh.execute(ShellCommand::Disconnect {
            device: "bob".into(),
            port: p0,
        })
        .unwrap();
        mesh.execute(connect()).unwrap();
        assert!(!alice.ports().is_connected(p0.into()));
        assert!(bob.ports().is_connected(p0.into()));
        assert!(carol.ports().is_connected(p2.into()));

        mesh.shutdown().await;
    }

    #[test]
    fn test_rejects_invalid_topology() {
        let mut topology = Topology::default();
        topology.links[0].a_port = 9;
        assert!(matches!(
            Mesh::build(&topology),
            Err(MeshError::Topology(TopologyError::InvalidPort { .. }))
        ));
    }
}
