//! Liveness: ping every interval, evict clients that missed a pong.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::signaling::dispatcher::Dispatcher;
use crate::signaling::registry::ClientRegistry;

/// Spawn the process-wide liveness ticker.
pub fn spawn(
    registry: Arc<ClientRegistry>,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // First tick fires immediately; skip it.
        loop {
            ticker.tick().await;
            sweep(&registry, &dispatcher);
        }
    })
}

/// One liveness pass. Clients that did not pong since the previous pass are
/// terminated quietly and their rooms are told via `peer-left`; the rest get
/// a transport ping and must answer before the next pass.
pub fn sweep(registry: &ClientRegistry, dispatcher: &Dispatcher) {
    for client in registry.handles() {
        if client.alive.swap(false, Ordering::SeqCst) {
            client.send_ping();
        } else {
            tracing::debug!(client_id = %client.id, "missed heartbeat, evicting");
            client.kill(None);
            dispatcher.disconnect(&client);
        }
    }
}
