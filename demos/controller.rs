// ABOUTME: Controller example
// ABOUTME: Joins a group, sends the media commands it supports and prints the resulting state

use clap::Parser;
use sendspin_player::{ClientConfig, MediaCommand, SendspinAudioClient};
use std::time::Duration;
use tokio::time::sleep;

/// Sendspin group controller
#[derive(Parser, Debug)]
#[command(name = "controller")]
#[command(about = "Send media commands to a Sendspin group", long_about = None)]
struct Args {
    /// WebSocket URL of the Sendspin server
    #[arg(short, long, default_value = "ws://localhost:8927/sendspin")]
    server: String,

    /// Client name
    #[arg(short, long, default_value = "Controller Example")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = ClientConfig::builder()
        .url(args.server)
        .client_id("controller-client")
        .client_name(args.name)
        .build();
    let client = SendspinAudioClient::new(config)?;

    client.connect().await?;
    println!("Connected! Waiting for server state...");
    sleep(Duration::from_secs(2)).await;

    let supported = client.get_supported_commands();
    let names: Vec<&str> = supported.iter().map(|c| c.as_str()).collect();
    println!("Supported commands: [{}]", names.join(", "));

    println!("\n=== Controller Commands ===");

    println!("\n1. Toggling play/pause...");
    if let Err(e) = client.toggle_play_pause().await {
        println!("   {}", e);
    }
    sleep(Duration::from_secs(1)).await;

    let steps = [
        (MediaCommand::Play, "2. Sending PLAY command..."),
        (MediaCommand::Pause, "3. Sending PAUSE command..."),
        (MediaCommand::Next, "4. Sending NEXT track command..."),
        (MediaCommand::Previous, "5. Sending PREVIOUS track command..."),
        (MediaCommand::Switch, "6. Sending SWITCH group command..."),
    ];
    for (command, label) in steps {
        if !supported.contains(&command) {
            continue;
        }
        println!("{}", label);
        if let Err(e) = client.send_media_command(command).await {
            println!("   {}", e);
        }
        sleep(Duration::from_secs(1)).await;
    }

    println!("\n=== Current State ===");
    println!("{}", client.describe_state());

    println!("\nPlaying audio... Press Ctrl+C to stop");
    tokio::select! {
        outcome = client.wait_for_disconnect() => {
            if let Err(e) = outcome {
                println!("Connection lost: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => println!("\nStopping..."),
    }

    client.disconnect().await;
    Ok(())
}
