//! # AgriRover Link
//!
//! Console front end for the AgriRover streaming core.
//!
//! Keeps the sensor feed connected in the background, reads prompts from
//! stdin and streams the assistant's answers to stdout.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (defaults when no file is given)
//!    - Set up logging
//!    - Start the telemetry supervisor
//!
//! 2. **Main Loop**
//!    - Each stdin line is either a command or a prompt
//!    - Prompts supersede any answer still streaming
//!    - Handle Ctrl+C for graceful shutdown
//!
//! 3. **Graceful Shutdown**
//!    - Cancel the live relay session
//!    - Stop the telemetry session and wait for it
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- --config config/rover.toml
//! ```

use anyhow::Result;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agri_rover_link::assistant::{Assistant, RelayEvent, RelayHandle};
use agri_rover_link::config::Config;
use agri_rover_link::logging;
use agri_rover_link::telemetry::reconnect::{supervise, ReconnectPolicy};
use agri_rover_link::telemetry::TelemetryStore;
use agri_rover_link::transport::{Connector, WsConnector};

/// Streaming telemetry and assistant relay for the AgriRover dashboard
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "AGRI_ROVER_LINK_CONFIG")]
    config: Option<PathBuf>,
}

/// One line of console input
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    History,
    Latest,
    Readings,
    Cancel,
    Quit,
    Prompt(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "/history" => Command::History,
            "/latest" => Command::Latest,
            "/readings" => Command::Readings,
            "/cancel" => Command::Cancel,
            "/quit" | "/exit" => Command::Quit,
            _ => Command::Prompt(line),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let _log_guard = logging::init(&config.logging)?;
    info!("AgriRover Link v{} starting...", env!("CARGO_PKG_VERSION"));

    let connector: Arc<dyn Connector> = Arc::new(WsConnector::new());
    let store = Arc::new(TelemetryStore::new(config.telemetry.history_capacity));
    let shutdown = CancellationToken::new();

    let supervisor = tokio::spawn({
        let connector = connector.clone();
        let store = store.clone();
        let endpoint = config.telemetry.endpoint.clone();
        let policy = ReconnectPolicy::from(&config.telemetry.reconnect);
        let shutdown = shutdown.clone();
        async move { supervise(connector, &endpoint, store, policy, shutdown).await }
    });

    let assistant = Assistant::from_config(connector, &config.assistant, store.clone());

    info!("Type a question and press Enter; /quit to exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };

                match Command::parse(&line) {
                    Command::Quit => break,
                    Command::Cancel => assistant.cancel(),
                    Command::History => {
                        for (idx, prompt) in assistant.prompts().snapshot().iter().enumerate() {
                            println!("{:>3}. {}", idx + 1, prompt);
                        }
                    }
                    Command::Latest => match store.latest() {
                        Some(reading) => println!("{:?}", reading),
                        None => println!("No telemetry received yet"),
                    },
                    Command::Readings => {
                        println!("{} of {} readings retained", store.history_len(), store.history_capacity());
                    }
                    Command::Prompt(prompt) => match assistant.send(prompt) {
                        Ok(handle) => {
                            tokio::spawn(print_response(handle));
                        }
                        Err(e) => warn!("Not sent: {}", e),
                    },
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    assistant.cancel();
    shutdown.cancel();
    match supervisor.await {
        Ok(outcome) => info!(
            "Telemetry stopped after {} frames in the last session",
            outcome.frames_received()
        ),
        Err(e) => warn!("Telemetry supervisor ended abnormally: {}", e),
    }

    Ok(())
}

/// Stream one response to stdout as it arrives
async fn print_response(mut handle: RelayHandle) {
    while let Some(event) = handle.next_event().await {
        match event {
            RelayEvent::Chunk(chunk) => {
                print!("{}", chunk);
                let _ = std::io::stdout().flush();
            }
            RelayEvent::EndOfStream => println!(),
            RelayEvent::Error(e) => println!("\n[relay error: {}]", e),
            RelayEvent::Cancelled(reason) => println!("\n[cancelled: {:?}]", reason),
        }
    }
}
