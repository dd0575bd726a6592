use std::env;
use std::time::Duration;
#[cfg(test)]
use std::sync::Mutex;

pub const DEFAULT_DAEMON_ADDR: &str = "127.0.0.1:7717";

/// Gridview application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Terminal daemon address (defaults to "127.0.0.1:7717")
    pub daemon_addr: String,
    pub tuning: SyncTuning,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let addr =
            env::var("GRIDVIEW_DAEMON_ADDR").unwrap_or_else(|_| DEFAULT_DAEMON_ADDR.to_string());
        // Normalize localhost to IPv4 to avoid IPv6 (::1) preference on macOS
        let daemon_addr = if addr.starts_with("localhost:") {
            addr.replacen("localhost", "127.0.0.1", 1)
        } else {
            addr
        };
        Self {
            daemon_addr,
            tuning: SyncTuning::from_env(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daemon_addr: DEFAULT_DAEMON_ADDR.to_string(),
            tuning: SyncTuning::default(),
        }
    }
}

/// Timing knobs for the sync engine and stream client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTuning {
    pub fetch_debounce: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub autoscroll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            fetch_debounce: Duration::from_millis(16),
            reconnect_base: Duration::from_millis(1_000),
            reconnect_max: Duration::from_millis(10_000),
            autoscroll_interval: Duration::from_millis(50),
            request_timeout: Duration::from_millis(5_000),
        }
    }
}

impl SyncTuning {
    /// Defaults overridden by `GRIDVIEW_*_MS` variables; unparsable or zero
    /// values keep the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let tuning = Self {
            fetch_debounce: env_millis("GRIDVIEW_FETCH_DEBOUNCE_MS", defaults.fetch_debounce),
            reconnect_base: env_millis("GRIDVIEW_RECONNECT_BASE_MS", defaults.reconnect_base),
            reconnect_max: env_millis("GRIDVIEW_RECONNECT_MAX_MS", defaults.reconnect_max),
            autoscroll_interval: env_millis(
                "GRIDVIEW_AUTOSCROLL_INTERVAL_MS",
                defaults.autoscroll_interval,
            ),
            request_timeout: env_millis("GRIDVIEW_REQUEST_TIMEOUT_MS", defaults.request_timeout),
        };
        Self {
            reconnect_max: tuning.reconnect_max.max(tuning.reconnect_base),
            ..tuning
        }
    }
}

fn env_millis(var: &str, default: Duration) -> Duration {
    env::var(var)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(default)
}
