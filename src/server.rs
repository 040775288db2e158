//! Chat relay server - accept loop and lifecycle
//!
//! Binds the listener, spawns the Registry actor and one handler task per
//! accepted connection. Shutdown is cooperative: when the Registry actor
//! finishes (a session asked for shutdown, or accepting failed), the
//! accept loop stops and `run` returns instead of aborting the process.

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::AppError;
use crate::handler::handle_connection;
use crate::registry::{Registry, RegistryCommand};

/// Channel buffer size for registry commands
const CHANNEL_BUFFER_SIZE: usize = 256;

/// The chat relay server
pub struct Server {
    addr: String,
}

impl Server {
    /// Create a server that will bind to `addr`
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Bind, accept and relay until shutdown
    ///
    /// Returns `Ok(())` after a clean shutdown; binding or accepting
    /// failures tear the sessions down first and then surface the error.
    pub async fn run(self) -> Result<(), AppError> {
        let listener = TcpListener::bind(&self.addr).await?;
        info!("Chat relay listening on {}", self.addr);

        let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let registry = Registry::new(cmd_rx);
        let mut registry_task = tokio::spawn(registry.run());

        let mut fatal: Option<std::io::Error> = None;

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("New connection from {}", addr);
                        let cmd_tx = cmd_tx.clone();

                        // Spawn handler task for each connection
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, cmd_tx).await {
                                error!("Connection handler error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        // Shut sessions down cleanly before surfacing
                        fatal = Some(e);
                        let _ = cmd_tx.send(RegistryCommand::Shutdown).await;
                    }
                },
                _ = &mut registry_task => {
                    info!("Registry finished; no longer accepting connections");
                    break;
                }
            }
        }

        match fatal {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
