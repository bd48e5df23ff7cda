pub mod bridge;
pub mod config;
pub mod device;
pub mod feedback;
pub mod portal;
pub mod protocol;

use crate::bridge::BridgeLoop;
use crate::config::BridgeConfig;
use crate::device::{UinputDevice, VirtualDeviceSink};
use crate::portal::{CaptureHandle, DbusPortal, NegotiationHandle, NegotiationSettings};
use clap::Parser;
use color_eyre::Result;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "gamepad-bridge")]
#[command(about = "Exposes a network gamepad as local virtual input devices")]
#[command(version)]
struct Args {
    /// Config file, defaults to $XDG_CONFIG_HOME/gamepad-bridge/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP port for telemetry
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind the telemetry socket on
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Skip the screen-cast portal handshake
    #[arg(long)]
    no_portal: bool,

    /// Log filter, e.g. "debug" or "gamepad_bridge=trace"
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(port) = self.port {
            config.network.port = port;
        }
        if let Some(bind) = self.bind {
            config.network.bind_address = bind;
        }
        if self.no_portal {
            config.portal.enabled = false;
        }
    }
}

/// The screen-cast stream handed to the display pipeline
struct Capture {
    // the portal closes the session when this connection goes away
    _connection: zbus::Connection,
    handle: CaptureHandle,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup(args.log_level.as_deref())?;

    let mut config = BridgeConfig::load(args.config.as_deref()).await?;
    args.apply(&mut config);
    info!("Starting gamepad bridge with {:?}", config);

    let gamepad = UinputDevice::create_gamepad(&config.devices)?;
    let motion = UinputDevice::create_motion(&config.devices)?;
    let sink = VirtualDeviceSink::new(gamepad, motion);

    let addr = SocketAddr::new(config.network.bind_address, config.network.port);
    let bridge = BridgeLoop::bind(addr, sink, &config.bridge).await?;

    let capture = if config.portal.enabled {
        match acquire_capture(NegotiationSettings::from(&config.portal)).await? {
            Some(capture) => Some(capture),
            None => return Ok(()),
        }
    } else {
        info!("Screen-cast portal disabled");
        None
    };

    if let Some(capture) = &capture {
        info!(
            "Capture stream for {} available on fd {}",
            capture.handle.session(),
            capture.handle.raw_fd()
        );
    }

    bridge.run_until(shutdown_signal()).await;
    info!("Gamepad bridge stopped");
    Ok(())
}

/// Runs the portal handshake to completion. `None` means Ctrl-C came first.
async fn acquire_capture(settings: NegotiationSettings) -> Result<Option<Capture>> {
    let portal = DbusPortal::connect().await?;
    let connection = portal.connection();

    let mut negotiation = NegotiationHandle::spawn(Box::new(portal), settings);
    info!("Waiting for the screen-cast portal, current state {:?}", negotiation.state());

    tokio::select! {
        result = negotiation.wait() => {
            let handle = result?;
            Ok(Some(Capture { _connection: connection, handle }))
        }
        _ = shutdown_signal() => {
            warn!("Interrupted while negotiating the screen-cast session");
            negotiation.abort();
            Ok(None)
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(e) => {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

fn setup(log_level: Option<&str>) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging(log_level.unwrap_or("info"));
    Ok(())
}

fn setup_logging(filter: &str) {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
