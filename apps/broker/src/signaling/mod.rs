pub mod dispatcher;
pub mod frames;
pub mod heartbeat;
pub mod limiter;
pub mod registry;
pub mod rooms;
pub mod server;
