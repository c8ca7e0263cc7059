//! TCP listener
//!
//! Accepts incoming connections and spawns a driver task for each caller.
//! Admission control happens inside the driver, before the caller costs
//! anything beyond the accepted socket.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::session::task::run_session;
use crate::state::ServerState;

/// Telnet server that listens for incoming callers
pub struct TelnetServer {
    listener: TcpListener,
    state: Arc<ServerState>,
    cancel: CancellationToken,
}

impl TelnetServer {
    /// Bind the listener
    pub async fn bind(
        bind_addr: &str,
        state: Arc<ServerState>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;

        Ok(Self {
            listener,
            state,
            cancel,
        })
    }

    /// The address the server actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop until cancelled
    pub async fn run(self) -> Result<()> {
        let local_addr = self.listener.local_addr()?;
        tracing::info!("Listening on {}", local_addr);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("Listener shutting down");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => {
                            self.handle_connection(socket, peer_addr);
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Spawn the driver task for one accepted socket
    fn handle_connection(&self, socket: tokio::net::TcpStream, peer_addr: SocketAddr) {
        tracing::info!("New connection from {}", peer_addr);

        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!("set_nodelay failed for {}: {}", peer_addr, e);
        }

        let state = Arc::clone(&self.state);
        // A child token, so server shutdown cancels every session
        let session_cancel = self.cancel.child_token();

        tokio::spawn(async move {
            run_session(state, socket, peer_addr, session_cancel).await;
        });
    }
}
