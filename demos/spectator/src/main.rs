//! Watches a CodeGame game and prints the events it sees.
//!
//! ```text
//! spectator <server-url> <game-id> <event>...
//! ```
//!
//! Set `RUST_LOG=codegame=debug` to see the client's own logging.

use clap::Parser;
use codegame::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "spectator")]
#[command(about = "Spectate a CodeGame game and print its events", long_about = None)]
struct Args {
    /// Game server address, e.g. `localhost:8080` or `https://games.example.com`.
    url: String,

    /// The game to spectate.
    game_id: String,

    /// Event names to print.
    #[arg(required = true)]
    events: Vec<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args).await {
        tracing::error!(error = %e, "spectator failed");
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> Result<(), ClientError> {
    let client = ProtocolClient::new(&args.url).await?;
    let info = client.server_info();
    tracing::info!(game = %info.name, version = %info.version, "connected to server");

    for event in &args.events {
        let name = event.clone();
        client.on(event, move |data: &serde_json::Value| {
            println!("{name}: {data}");
        })?;
    }

    client.spectate(&args.game_id).await?;

    tokio::select! {
        () = client.listen() => {
            tracing::info!("game server closed the connection");
        }
        _ = tokio::signal::ctrl_c() => {
            client.close().await?;
        }
    }
    Ok(())
}
