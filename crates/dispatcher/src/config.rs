use std::time::Duration;

use relay_core::env;

/// Dispatcher configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Pool size for the store connection (default: `10`).
    pub database_max_connections: u32,
    /// Steady interval between dispatch cycles (default: 10 s).
    pub interval: Duration,
    /// Pause after a failed cycle before the next attempt (default: 2 s).
    pub recovery_delay: Duration,
    /// Heartbeat age after which an agent is considered gone (default: 60 s).
    pub stale_after: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            database_max_connections: 10,
            interval: Duration::from_secs(10),
            recovery_delay: Duration::from_secs(2),
            stale_after: Duration::from_secs(60),
        }
    }
}

impl DispatcherConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `DATABASE_MAX_CONNECTIONS` | `10`    |
    /// | `DISPATCH_INTERVAL_SECS`   | `10`    |
    /// | `DISPATCH_RECOVERY_SECS`   | `2`     |
    /// | `AGENT_STALE_AFTER_SECS`   | `60`    |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_max_connections: env::var_or(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            interval: secs("DISPATCH_INTERVAL_SECS", defaults.interval),
            recovery_delay: secs("DISPATCH_RECOVERY_SECS", defaults.recovery_delay),
            stale_after: secs("AGENT_STALE_AFTER_SECS", defaults.stale_after),
        }
    }
}

fn secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs(env::var_or(name, default.as_secs()).max(1))
}
