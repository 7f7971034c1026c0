//! Audio Receiver Application
//!
//! Connects to the sender and plays the received stream on a local output
//! device, optionally a virtual cable selected by name substring.

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_audio_relay::{
    audio::{device::list_devices, playback::PlaybackStream, CpalPlayback},
    config::AppConfig,
    net::receiver::{PlaybackFactory, ReceiverAgent},
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

    tracing::info!("Starting LAN Audio Receiver");

    // Load config if present; arguments override the sender address and
    // the playback device selection
    let mut config = if Path::new(CONFIG_PATH).exists() {
        AppConfig::load(CONFIG_PATH)?
    } else {
        AppConfig::default()
    };

    if let Some(arg) = std::env::args().nth(1) {
        let addr: SocketAddr = arg.parse().expect("Invalid sender address");
        config.network.address = addr.ip();
        config.network.port = addr.port();
    }
    if let Some(device) = std::env::args().nth(2) {
        config.playback_device = Some(device);
    }

    // List available output devices
    println!("\n=== Available Output Devices ===");
    for device in list_devices() {
        if device.is_output {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("  {}{}:", device.name, default_marker);
            println!("    Sample rates: {:?}", device.sample_rates);
            println!("    Channels: {:?}", device.channels);
        }
    }
    println!();

    let audio = config.audio;
    let playback_name = config.playback_device.clone();
    let factory: PlaybackFactory = Arc::new(move || {
        CpalPlayback::open(playback_name.as_deref(), audio)
            .map(|playback| Box::new(playback) as Box<dyn PlaybackStream>)
    });

    let mut agent = ReceiverAgent::new(audio, config.network.clone(), factory);
    let events = agent.events();
    agent.start()?;

    tracing::info!(
        "Connecting to {} ({:?} wire format)",
        config.network.socket_addr(),
        config.network.wire_format
    );

    // Relay state changes to the console; a terminal state ends the run
    while let Ok(event) = events.recv() {
        println!("[{}] {}", event.state, event.message);
        if event.state.is_terminal() {
            break;
        }
    }

    agent.stop();
    Ok(())
}
