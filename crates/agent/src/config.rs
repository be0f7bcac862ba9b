use std::time::Duration;

use relay_core::dialog::DEFAULT_DIALOG_WINDOW;
use relay_core::env;
use relay_core::heartbeat::HeartbeatTolerance;

/// Agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Key of this agent in `agent_status` and `requests.assigned_agent`.
    pub agent_name: String,
    pub hostname: String,
    pub database_max_connections: u32,
    pub poll_interval: Duration,
    /// Pause after a failed poll before the next attempt.
    pub recovery_delay: Duration,
    pub heartbeat_interval: Duration,
    /// Upper bound on requests executed at the same time.
    pub max_concurrent_jobs: usize,
    /// How long a claim stays exclusive. Must exceed the inference timeout.
    pub lease: Duration,
    pub dialog_window: Duration,
    /// Send the assigned prompt template as a leading system message.
    pub system_prompt: bool,
    pub heartbeat_tolerance: HeartbeatTolerance,
    pub ollama_url: String,
    pub ollama_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let hostname = local_hostname();
        Self {
            agent_name: hostname.clone(),
            hostname,
            database_max_connections: 10,
            poll_interval: Duration::from_secs(3),
            recovery_delay: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(2),
            max_concurrent_jobs: 2,
            lease: Duration::from_secs(600),
            dialog_window: DEFAULT_DIALOG_WINDOW,
            system_prompt: true,
            heartbeat_tolerance: HeartbeatTolerance::default(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_timeout: Duration::from_secs(300),
        }
    }
}

impl AgentConfig {
    /// Defaults with an explicit agent name.
    pub fn named(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                  |
    /// |---------------------------------|--------------------------|
    /// | `AGENT_NAME`                    | hostname                 |
    /// | `DATABASE_MAX_CONNECTIONS`      | `10`                     |
    /// | `AGENT_POLL_INTERVAL_SECS`      | `3`                      |
    /// | `AGENT_RECOVERY_SECS`           | `1`                      |
    /// | `AGENT_HEARTBEAT_INTERVAL_SECS` | `2`                      |
    /// | `AGENT_MAX_CONCURRENT_JOBS`     | `2`                      |
    /// | `AGENT_LEASE_SECS`              | `600`                    |
    /// | `AGENT_DIALOG_WINDOW_MINS`      | `15`                     |
    /// | `AGENT_SYSTEM_PROMPT`           | `true`                   |
    /// | `HEARTBEAT_TOLERANCE_PERCENT`   | `2.0`                    |
    /// | `HEARTBEAT_TOLERANCE_MB`        | `256`                    |
    /// | `OLLAMA_URL`                    | `http://localhost:11434` |
    /// | `OLLAMA_TIMEOUT_SECS`           | `300`                    |
    pub fn from_env() -> Self {
        let d = Self::default();
        let hostname = d.hostname.clone();

        Self {
            agent_name: env::string_or("AGENT_NAME", || hostname),
            hostname: d.hostname,
            database_max_connections: env::var_or("DATABASE_MAX_CONNECTIONS", d.database_max_connections),
            poll_interval: secs("AGENT_POLL_INTERVAL_SECS", d.poll_interval),
            recovery_delay: secs("AGENT_RECOVERY_SECS", d.recovery_delay),
            heartbeat_interval: secs("AGENT_HEARTBEAT_INTERVAL_SECS", d.heartbeat_interval),
            max_concurrent_jobs: env::var_or("AGENT_MAX_CONCURRENT_JOBS", d.max_concurrent_jobs).max(1),
            lease: secs("AGENT_LEASE_SECS", d.lease),
            dialog_window: Duration::from_secs(
                env::var_or("AGENT_DIALOG_WINDOW_MINS", d.dialog_window.as_secs() / 60) * 60,
            ),
            system_prompt: env::flag_or("AGENT_SYSTEM_PROMPT", d.system_prompt),
            heartbeat_tolerance: HeartbeatTolerance {
                percent: env::var_or("HEARTBEAT_TOLERANCE_PERCENT", d.heartbeat_tolerance.percent),
                megabytes: env::var_or("HEARTBEAT_TOLERANCE_MB", d.heartbeat_tolerance.megabytes),
            },
            ollama_url: env::string_or("OLLAMA_URL", || d.ollama_url)
                .trim_end_matches('/')
                .to_string(),
            ollama_timeout: secs("OLLAMA_TIMEOUT_SECS", d.ollama_timeout),
        }
    }
}

fn secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs(env::var_or(name, default.as_secs()).max(1))
}

fn local_hostname() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string())
}
