use std::rc::Rc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::http::connection::Connection;
use crate::server::Handler;

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections until shutdown, then waits for them to drain.
pub async fn run(
    listener: TcpListener,
    handler: Rc<dyn Handler>,
    cfg: ServerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                };

                info!("Accepted connection from {}", peer);

                if let Err(e) = socket.set_nodelay(true) {
                    debug!(peer = %peer, error = %e, "could not set TCP_NODELAY");
                }

                let conn = Connection::new(socket, peer.to_string(), handler.clone(), &cfg, shutdown.clone());
                connections.spawn_local(async move {
                    if let Err(e) = conn.run().await {
                        warn!("Connection error from {}: {:#}", peer, e);
                    }
                });
            }

            Some(_) = connections.join_next(), if !connections.is_empty() => {}

            _ = shutdown.changed() => break,
        }
    }

    drop(listener);

    if !connections.is_empty() {
        info!(connections = connections.len(), "Draining connections");
    }
    while connections.join_next().await.is_some() {}
}
