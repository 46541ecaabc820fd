//! Serial Mesh Runner
//!
//! Runs a network of simulated serial mesh devices without a GUI. Each
//! device's primary link is attached to a console that models its LED panel
//! and accepts button presses typed on stdin.
//!
//! ```text
//! serial-mesh [--topology <FILE>] [--log <FILTER>]
//! ```
//!
//! Without a topology file three devices are wired in a chain:
//! `alice:0 - bob:0`, `bob:1 - carol:0`.

mod console;
mod mesh;
mod settings;
mod shell;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mesh::Mesh;
use settings::Topology;
use shell::ShellCommand;

const DEFAULT_FILTER: &str = "serial_mesh=info,mesh_sim=info,mesh_link=info,mesh_protocol=info";

/// Simulated serial mesh network.
#[derive(Parser, Debug)]
#[command(name = "serial-mesh", version, about)]
struct Cli {
    /// JSON topology file describing devices and links
    #[arg(long, env = "SERIAL_MESH_TOPOLOGY")]
    topology: Option<PathBuf>,

    /// Log filter, overriding RUST_LOG (e.g. "mesh_sim=debug")
    #[arg(long)]
    log: Option<String>,
}

fn init_tracing(filter: Option<&str>) -> anyhow::Result<()> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("Invalid log filter '{}'", directives))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log.as_deref())?;

    let topology = match &cli.topology {
        Some(path) => Topology::load(path)?,
        None => Topology::default(),
    };
    info!(
        "Starting serial mesh: {} devices, {} links",
        topology.devices.len(),
        topology.links.len()
    );

    let mesh = Mesh::build(&topology).context("Failed to start devices")?;
    info!("Devices: {}", mesh.devices().collect::<Vec<_>>().join(", "));
    println!("{}", shell::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match ShellCommand::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(ShellCommand::Quit)) => break,
                    Ok(Some(command)) => match mesh.execute(command) {
                        Ok(Some(text)) => println!("{}", text),
                        Ok(None) => {}
                        Err(e) => eprintln!("error: {}", e),
                    },
                    Err(e) => eprintln!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    mesh.shutdown().await;
    Ok(())
}
