//! Audio Sender Application
//!
//! Captures audio from an input device and streams it to one connected
//! receiver over TCP.

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_audio_relay::{
    audio::{capture::CaptureStream, device::list_devices, CpalCapture},
    config::AppConfig,
    net::sender::{CaptureFactory, SenderAgent},
};

const CONFIG_PATH: &str = "relay.toml";

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LAN Audio Sender");

    // Load config if present, then let the bind address argument override it
    let mut config = if Path::new(CONFIG_PATH).exists() {
        AppConfig::load(CONFIG_PATH)?
    } else {
        AppConfig::default()
    };

    if let Some(arg) = std::env::args().nth(1) {
        let addr: SocketAddr = arg.parse().expect("Invalid bind address");
        config.network.address = addr.ip();
        config.network.port = addr.port();
    }

    // List available devices
    println!("\n=== Available Audio Devices ===");
    for device in list_devices() {
        let device_type = match (device.is_input, device.is_output) {
            (true, true) => "Input/Output",
            (true, false) => "Input",
            (false, true) => "Output",
            _ => "Unknown",
        };
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {} ({}){}:", device.name, device_type, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();

    let audio = config.audio;
    let capture_name = config.capture_device.clone();
    let factory: CaptureFactory = Arc::new(move || {
        CpalCapture::open(capture_name.as_deref(), audio)
            .map(|capture| Box::new(capture) as Box<dyn CaptureStream>)
    });

    let mut agent = SenderAgent::new(config.network.clone(), factory);
    let events = agent.events();
    agent.start()?;

    if let Some(addr) = agent.local_addr() {
        tracing::info!("Listening on {} ({:?} wire format)", addr, config.network.wire_format);
    }

    // Relay state changes to the console until the agent shuts down
    while let Ok(event) = events.recv() {
        println!("[{}] {}", event.state, event.message);
        if event.state.is_terminal() && !config.network.always_on {
            break;
        }
    }

    agent.stop();
    Ok(())
}
