pub mod config;
pub mod routes;
pub mod signaling;

use std::sync::Arc;

use config::Config;
use signaling::dispatcher::Dispatcher;
use signaling::registry::ClientRegistry;
use signaling::rooms::RoomIndex;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ClientRegistry>,
    pub rooms: Arc<RoomIndex>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    /// Build a fresh broker from a configuration. Tests instantiate one per
    /// case; nothing is process-global.
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(ClientRegistry::new(&config));
        let rooms = Arc::new(RoomIndex::new(config.max_room_clients));
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), rooms.clone()));
        Self {
            config: Arc::new(config),
            registry,
            rooms,
            dispatcher,
        }
    }
}
