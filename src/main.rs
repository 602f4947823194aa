/* alpsd: userspace ALPS PS/2 touchpad daemon. Attaches to a serio_raw
 * node, identifies the pad, switches it into absolute reporting mode
 * and streams decoded pointer/scroll/swipe events as JSON lines. */

mod actor;
mod bringup;
mod config;
mod device;
mod device_table;
mod error;
mod events;
mod framer;
mod gesture;
mod identify;
mod protocol;
#[cfg(any(test, feature = "dev-hooks"))]
mod test_port;
mod transport;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::GestureConfig;
use events::ChannelSink;

/// alpsd: decode an ALPS touchpad attached via serio_raw.
#[derive(Parser)]
#[command(name = "alpsd", version, about)]
struct Cli {
    /// serio_raw device node (default: first one found via udev).
    #[arg(long)]
    device: Option<PathBuf>,

    /// Gesture tuning INI file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// List candidate serio nodes and exit.
    #[arg(long)]
    list: bool,

    /// Replay a JSON capture instead of opening hardware (dev-hooks).
    #[cfg(feature = "dev-hooks")]
    #[arg(long)]
    replay: Option<PathBuf>,
}

/* Enumerate serio_raw device nodes. */
fn discover_ports() -> Result<Vec<PathBuf>> {
    let mut enumerator = udev::Enumerator::new().context("udev enumerator failed")?;
    enumerator
        .match_subsystem("misc")
        .context("udev subsystem match failed")?;

    let mut nodes = Vec::new();
    for device in enumerator.scan_devices().context("udev scan failed")? {
        if let Some(node) = device.devnode() {
            let is_serio = node
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("serio_raw"));
            if is_serio {
                nodes.push(node.to_path_buf());
            }
        }
    }
    Ok(nodes)
}

fn load_config(path: Option<&PathBuf>) -> Result<GestureConfig> {
    match path {
        Some(p) => GestureConfig::load(p),
        None => Ok(GestureConfig::default()),
    }
}

async fn run_events(rx: tokio::sync::mpsc::UnboundedReceiver<events::InputEvent>) {
    let mut stream = UnboundedReceiverStream::new(rx);
    while let Some(event) = stream.next().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!("failed to serialize event: {err}"),
        }
    }
}

/* Control surface on stdin, standing in for the host's keyboard and
 * power-management notifications: `enable`/`disable` toggle the pad,
 * `key` and `modifier-down`/`modifier-up` feed the typing-proximity
 * suppression. */
async fn run_control(handle: actor::SessionHandle) {
    use tokio::io::AsyncBufReadExt;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "enable" => handle.set_enabled(true).await,
            "disable" => handle.set_enabled(false).await,
            "key" => handle.key_pressed(false, true).await,
            "modifier-down" => handle.key_pressed(true, true).await,
            "modifier-up" => handle.key_pressed(true, false).await,
            "" => {}
            other => warn!("unknown control command: {other}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list {
        for node in discover_ports()? {
            println!("{}", node.display());
        }
        return Ok(());
    }

    let cfg = load_config(cli.config.as_ref())?;

    #[cfg(feature = "dev-hooks")]
    if let Some(replay) = &cli.replay {
        let spec = test_port::spec::ReplaySpec::load(replay)?;
        let (sink, rx) = ChannelSink::new();
        let handle = actor::spawn_session(spec.into_port(), cfg, sink)
            .await
            .context("replay session failed to start")?;
        run_events(rx).await;
        handle.shutdown().await;
        return Ok(());
    }

    let devnode = match cli.device {
        Some(path) => path,
        None => {
            let mut nodes = discover_ports()?;
            if nodes.is_empty() {
                bail!("no serio_raw device found; pass --device or load the serio_raw module");
            }
            nodes.remove(0)
        }
    };

    info!("attaching to {}", devnode.display());
    let port = transport::SerioPort::open(&devnode)?;

    let (sink, rx) = ChannelSink::new();
    let handle = actor::spawn_session(port, cfg, sink)
        .await
        .with_context(|| format!("failed to claim {}", devnode.display()))?;

    tokio::select! {
        _ = run_events(rx) => {}
        _ = run_control(handle.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, shutting down");
        }
    }
    handle.shutdown().await;

    Ok(())
}
