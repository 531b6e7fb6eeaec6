use std::env;

/// Connection settings for the durable store, read from the environment
/// once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path of the local database file
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: "monitor.db".to_string() }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self { path: env::var("MONITOR_DB_PATH").unwrap_or(default.path) }
    }
}

/// Settings for the event bus sitting between checks and the consumer.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Topic carrying check events
    pub topic: String,
    /// Per-topic queue depth before publishers block
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { topic: "check.events".to_string(), capacity: 256 }
    }
}

impl BusConfig {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            topic: env::var("MONITOR_BUS_TOPIC").unwrap_or(default.topic),
            capacity: env::var("MONITOR_BUS_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.capacity),
        }
    }
}
