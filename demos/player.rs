// ABOUTME: End-to-end player example
// ABOUTME: Connects to a server, plays in sync, reconnects and prints state as it changes

use clap::Parser;
use sendspin_player::audio::{AudioBackend, CpalBackend};
use sendspin_player::{ClientConfig, ClientEvent, DeviceSelector, SendspinAudioClient};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::sleep;

/// Delay before retrying a failed connection attempt.
const RETRY_DELAY: Duration = Duration::from_secs(5);
/// Delay before reconnecting after a session ended.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Sendspin audio player
#[derive(Parser, Debug)]
#[command(name = "player")]
#[command(about = "Connect to a Sendspin server and play audio in sync", long_about = None)]
struct Args {
    /// WebSocket URL of the Sendspin server
    #[arg(short, long, default_value = "ws://localhost:8927/sendspin")]
    server: String,

    /// Client name
    #[arg(short, long, default_value = "Sendspin Player")]
    name: String,

    /// Stable client id (random when omitted)
    #[arg(long)]
    client_id: Option<String>,

    /// Output device: index from --list-devices or a name prefix
    #[arg(short, long)]
    device: Option<String>,

    /// Extra output delay in milliseconds
    #[arg(long, default_value_t = 0.0)]
    static_delay_ms: f64,

    /// Initial player volume (0-100)
    #[arg(long, default_value_t = 100)]
    volume: u8,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn device_selector(arg: &str) -> DeviceSelector {
    match arg.parse::<usize>() {
        Ok(index) => DeviceSelector::Index(index),
        Err(_) => DeviceSelector::NamePrefix(arg.to_string()),
    }
}

fn print_event(event: &ClientEvent) {
    match event {
        ClientEvent::MetadataUpdated(metadata) => {
            println!(
                "Metadata: {} by {} ({})",
                metadata.title.as_deref().unwrap_or("-"),
                metadata.artist.as_deref().unwrap_or("-"),
                metadata.album.as_deref().unwrap_or("-")
            );
            if let Some(duration) = metadata.track_duration_ms {
                let progress = metadata.track_progress_ms.unwrap_or(0);
                println!(
                    "   Progress: {:>5.1} / {:>5.1} s",
                    progress as f64 / 1000.0,
                    duration as f64 / 1000.0
                );
            }
        }
        ClientEvent::GroupUpdated(group) => {
            println!("Group: {}", group.group_id.as_deref().unwrap_or("-"));
            if let Some(state) = group.playback_state {
                println!("   State: {}", state);
            }
        }
        ClientEvent::ControllerStateUpdated { volume, muted } => {
            println!("Controller: Volume={}%, Muted={}", volume, muted);
        }
        ClientEvent::Event(message) => println!("Event: {}", message),
        ClientEvent::ConnectionStateChanged(state) => println!("Connection: {}", state),
    }
}

async fn monitor(client: Arc<SendspinAudioClient>) {
    loop {
        sleep(Duration::from_secs(5)).await;
        if !client.is_connected() {
            continue;
        }

        let metrics = client.get_timing_metrics();
        println!(
            "Metrics: position={}, buffered={:.2}s, underruns={}, corrections={}",
            metrics
                .playback_position_us
                .map(|us| format!("{:.2}s", us as f64 / 1e6))
                .unwrap_or_else(|| "-".to_string()),
            metrics.buffered_audio_us as f64 / 1e6,
            metrics.underruns,
            metrics.drift_corrections
        );

        let metadata = client.get_metadata();
        if let Some(title) = &metadata.title {
            println!("Current: {} - {}", title, metadata.artist.as_deref().unwrap_or("-"));
        }
        if let (progress, Some(duration)) = client.get_track_progress() {
            println!(
                "Progress: {:>5.1} / {:>5.1} s",
                progress.unwrap_or(0) as f64 / 1000.0,
                duration as f64 / 1000.0
            );
        }
        println!("Playback: {}", client.get_playback_state());
        if let Some(group_id) = client.get_group_info().group_id {
            println!("Group ID: {}", group_id);
        }
        if let Some((volume, muted)) = client.get_controller_volume() {
            println!("Controller Volume: {}% {}", volume, if muted { "(muted)" } else { "" });
        }
        let (volume, muted) = client.get_player_volume();
        println!("Player Volume: {}% {}", volume, if muted { "(muted)" } else { "" });

        let commands = client.get_supported_commands();
        if !commands.is_empty() {
            let names: Vec<&str> = commands.iter().map(|c| c.as_str()).collect();
            println!("Supported Commands: {}", names.join(", "));
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let devices = CpalBackend::new().devices()?;
    if args.list_devices {
        println!("Available audio devices:");
        for device in &devices {
            println!(
                "  {}: {}{}",
                device.index,
                device.name,
                if device.is_default { " (default)" } else { "" }
            );
        }
        return Ok(());
    }
    if devices.is_empty() {
        println!("No audio output devices found. Exiting.");
        return Ok(());
    }

    let client_id = args
        .client_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let builder = ClientConfig::builder()
        .url(args.server.clone())
        .client_id(client_id)
        .client_name(args.name.clone())
        .static_delay_ms(args.static_delay_ms)
        .player_volume(args.volume);
    let config = match args.device.as_deref() {
        Some(device) => builder.audio_device(device_selector(device)).build(),
        None => builder.build(),
    };

    let client = Arc::new(SendspinAudioClient::new(config)?);
    match client.audio_device() {
        Some(device) => println!("Using device: {}", device.name),
        None => println!("Using default device"),
    }

    let mut events = client.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => println!("({} events skipped)", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });
    let monitor_task = tokio::spawn(monitor(Arc::clone(&client)));

    println!("Connecting to {}...", args.server);
    println!("Press Ctrl+C to stop");

    let run = async {
        loop {
            match client.connect().await {
                Ok(()) => {
                    println!("Connected! Playing audio...");
                    match client.wait_for_disconnect().await {
                        Ok(()) => println!("Session closed"),
                        Err(e) => println!("Connection lost: {}", e),
                    }
                    println!("Reconnecting in {} seconds...", RECONNECT_DELAY.as_secs());
                    sleep(RECONNECT_DELAY).await;
                }
                Err(e) => {
                    println!("Connection error: {}", e);
                    println!("Retrying in {} seconds...", RETRY_DELAY.as_secs());
                    sleep(RETRY_DELAY).await;
                }
            }
        }
    };

    tokio::select! {
        _ = run => {}
        _ = tokio::signal::ctrl_c() => println!("\nInterrupted by user"),
    }

    monitor_task.abort();
    println!("Disconnecting...");
    client.disconnect().await;
    printer.abort();
    println!("Disconnected");
    Ok(())
}
