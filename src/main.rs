//! Chat relay server - Entry Point
//!
//! Initializes logging, reads the bind address from the command line and
//! runs the server until shutdown.

use std::env;

use tracing_subscriber::EnvFilter;

use chat_relay::Server;

/// Default bind host
const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port
const DEFAULT_PORT: u16 = 1500;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Bind address from command line or defaults: [addr] [port]
    let host = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = match env::args().nth(2) {
        Some(raw) => raw.parse::<u16>()?,
        None => DEFAULT_PORT,
    };
    let addr = if host.contains(':') {
        host
    } else {
        format!("{host}:{port}")
    };

    // Exit code 0 on clean shutdown, 1 on fatal bind/accept failure
    Server::new(addr).run().await?;
    Ok(())
}
