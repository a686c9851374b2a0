use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::connection::ConnectionHandler;
use crate::protocol::tfms90::AliasMap;
use crate::registry::DeviceRegistry;
use crate::sink::TelemetrySink;

/// TCP accept loop (§4 H): binds the configured address, spawns one task
/// per accepted connection (§5), and enforces `MAX_CONNECTIONS` at accept
/// time via a semaphore rather than inside the handler.
pub struct Listener {
    config: Arc<Config>,
    registry: Arc<dyn DeviceRegistry>,
    sink: Arc<dyn TelemetrySink>,
    alias_map: Arc<AliasMap>,
}

impl Listener {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<dyn DeviceRegistry>,
        sink: Arc<dyn TelemetrySink>,
        alias_map: Arc<AliasMap>,
    ) -> Self {
        Listener {
            config,
            registry,
            sink,
            alias_map,
        }
    }

    /// Runs the accept loop until `shutdown` is cancelled, then gives
    /// in-flight handlers `SHUTDOWN_GRACE_SECS` to finish before returning
    /// (§5 "Cancellation and timeouts").
    pub async fn run(&self, shutdown: CancellationToken) -> std::io::Result<()> {
        let address = format!("{}:{}", self.config.tcp_host, self.config.tcp_port);
        let tcp_listener = TcpListener::bind(&address).await?;
        info!("listening on {address}");

        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));
        let mut tasks = JoinSet::new();
        let idle_timeout = Duration::from_secs(self.config.idle_timeout_secs);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown signal received, closing accept loop");
                    break;
                }
                accepted = tcp_listener.accept() => {
                    let (socket, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!("failed to accept connection: {err}");
                            continue;
                        }
                    };

                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            warn!("connection cap ({}) reached, dropping connection from {peer_addr}", self.config.max_connections);
                            continue;
                        }
                    };

                    let registry = self.registry.clone();
                    let sink = self.sink.clone();
                    let alias_map = self.alias_map.clone();
                    let buffer_size = self.config.buffer_size;

                    tasks.spawn(async move {
                        let _permit = permit;
                        let handler = ConnectionHandler::new(socket, registry, sink, alias_map, buffer_size, idle_timeout);
                        if let Err(err) = handler.run().await {
                            debug!("connection from {peer_addr} ended: {err}");
                        }
                    });
                }
            }
        }

        let grace = Duration::from_secs(self.config.shutdown_grace_secs);
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(grace, drain).await.is_err() {
            warn!("shutdown grace period elapsed with handlers still running, aborting them");
            tasks.shutdown().await;
        }

        Ok(())
    }
}
