use std::time::Duration;

/// Broker configuration, loaded from environment variables.
///
/// Every variable has a default, so a bare `beacon-broker` starts an open
/// broker on `0.0.0.0:3000`. Values that fail to parse fall back to the
/// default.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Per-frame byte cap, enforced at the WebSocket layer.
    pub max_payload: usize,
    /// Global admission cap.
    pub max_clients: usize,
    /// Per-room membership cap.
    pub max_room_clients: usize,
    /// Token-bucket refill rate (frames per second).
    pub message_rate_per_sec: f64,
    /// Token-bucket capacity.
    pub message_burst: f64,
    /// Liveness tick interval.
    pub heartbeat_interval: Duration,
    /// When set, the `token` query parameter on connect must match.
    pub ws_secret: Option<String>,
    /// When set, the request's `Origin` header must match one entry.
    pub allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parsed_var("PORT", 3000),
            max_payload: parsed_var("MAX_PAYLOAD", 65536),
            max_clients: parsed_var("MAX_CLIENTS", 1000),
            max_room_clients: parsed_var("MAX_ROOM_CLIENTS", 50),
            message_rate_per_sec: parsed_var("MESSAGE_RATE_PER_SEC", 10.0),
            message_burst: parsed_var("MESSAGE_BURST", 20.0),
            heartbeat_interval: Duration::from_millis(parsed_var("HEARTBEAT_INTERVAL", 30_000)),
            ws_secret: std::env::var("WS_SECRET").ok().filter(|s| !s.is_empty()),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                })
                .filter(|v: &Vec<String>| !v.is_empty()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_payload: 65536,
            max_clients: 1000,
            max_room_clients: 50,
            message_rate_per_sec: 10.0,
            message_burst: 20.0,
            heartbeat_interval: Duration::from_millis(30_000),
            ws_secret: None,
            allowed_origins: None,
        }
    }
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
