//! Syncroom server binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default watch-party port
//! syncroom-server --bind 0.0.0.0:3001
//!
//! # Verbose logging
//! syncroom-server --bind 127.0.0.1:3001 --log-level debug
//! ```

use clap::Parser;
use syncroom_server::{DriverConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Syncroom watch-party relay server
#[derive(Parser, Debug)]
#[command(name = "syncroom-server")]
#[command(about = "Group-synchronization relay for shared media playback")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:3001")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("syncroom server starting");
    tracing::info!("binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        driver: DriverConfig { max_connections: args.max_connections },
    };

    let server = Server::bind(config).await?;

    tracing::info!("server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
