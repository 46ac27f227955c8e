// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bluetooth serial session console.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bt_serial_session::bluetooth::{MemoryTransport, RfcommTransport, SerialTransport};
use bt_serial_session::config::Config;
use bt_serial_session::console::{self, Command, Flow};
use bt_serial_session::notify::ChannelNotifier;
use bt_serial_session::{Session, SessionOptions};

#[derive(Debug, Parser)]
#[command(name = "bt-serial-session", version, about)]
struct Args {
    /// Use a simulated radio instead of BlueZ.
    #[arg(long)]
    simulate: bool,

    /// Configuration file (defaults to the user config directory).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    info!(
        "Starting bt-serial-session v{}...",
        env!("CARGO_PKG_VERSION")
    );

    let transport: Arc<dyn SerialTransport> = if args.simulate {
        info!("Using simulated radio");
        Arc::new(MemoryTransport::demo())
    } else {
        Arc::new(RfcommTransport::new(&config.bluetooth).await?)
    };

    let (notifier, notifications) = ChannelNotifier::new();
    let session = Arc::new(Session::with_options(
        transport,
        Arc::new(notifier),
        SessionOptions::from(&config.serial),
    ));

    // Transport events
    let event_task = {
        let session = session.clone();
        let events = session.subscribe_events();
        tokio::spawn(async move { session.run_events(events).await })
    };

    session.initialize().await;
    println!("{}", console::render(&session.view()));
    println!("{}", console::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("End of input");
                    break;
                };
                let command = match Command::parse(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                if command == Command::Quit {
                    info!("Quit requested");
                    break;
                }
                // Commands run as their own tasks so that e.g. `cancel`
                // can be issued while discovery is suspended.
                let session = session.clone();
                tokio::spawn(async move {
                    match console::dispatch(&session, command).await {
                        Ok(Flow::Print(text)) => println!("{}", text),
                        Ok(Flow::Continue) | Ok(Flow::Quit) => {}
                        Err(e) => println!("{}", e),
                    }
                });
            }
            Ok(message) = notifications.recv() => {
                println!(">> {}", message);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    event_task.abort();
    if session.view().connection.connected {
        if let Err(e) = session.disconnect().await {
            error!("Disconnect on shutdown failed: {}", e);
        }
    }
    info!("bt-serial-session stopped");
    Ok(())
}
