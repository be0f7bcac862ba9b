//! `relay-agent` -- runs inference requests queued for this host.
//!
//! Claims requests assigned to `AGENT_NAME`, answers them through the local
//! Ollama instance and publishes CPU/RAM/GPU heartbeats. See
//! [`relay_agent::config::AgentConfig::from_env`] for the optional settings.
//!
//! # Environment variables
//!
//! | Variable       | Required | Default    | Description                  |
//! |----------------|----------|------------|------------------------------|
//! | `DATABASE_URL` | yes      | --         | PostgreSQL connection string |
//! | `AGENT_NAME`   | no       | hostname   | Agent key in the store       |
//! | `OLLAMA_URL`   | no       | `http://localhost:11434` | Inference engine |
//! | `LOG_FORMAT`   | no       | `text`     | `json` for JSON log lines    |

use std::sync::Arc;

use relay_agent::config::AgentConfig;
use relay_agent::heartbeat::HeartbeatPublisher;
use relay_agent::inference::OllamaClient;
use relay_agent::probe::SystemProbe;
use relay_agent::runtime::AgentRuntime;
use relay_db::PgStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AgentConfig::from_env();
    if config.lease <= config.ollama_timeout {
        tracing::warn!(
            lease_secs = config.lease.as_secs(),
            ollama_timeout_secs = config.ollama_timeout.as_secs(),
            "AGENT_LEASE_SECS should exceed OLLAMA_TIMEOUT_SECS, slow requests may be reclaimed",
        );
    }

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| {
        tracing::error!("DATABASE_URL environment variable is required");
        std::process::exit(1);
    });

    let pool = relay_db::create_pool(&database_url, config.database_max_connections)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        });
    if let Err(e) = relay_db::health_check(&pool).await {
        tracing::error!(error = %e, "Database health check failed");
        std::process::exit(1);
    }
    tracing::info!("Database ready");

    let ollama = OllamaClient::new(config.ollama_url.clone(), config.ollama_timeout).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build inference client");
        std::process::exit(1);
    });
    let ollama = Arc::new(ollama);
    let store = Arc::new(PgStore::new(pool));
    let probe = Arc::new(SystemProbe::new());

    tracing::info!(
        agent = %config.agent_name,
        hostname = %config.hostname,
        ollama_url = %config.ollama_url,
        gpu_count = probe.gpu_count(),
        "Starting relay-agent",
    );

    let cancel = CancellationToken::new();

    let heartbeat = HeartbeatPublisher::new(Arc::clone(&store), probe, Arc::clone(&ollama), &config);
    let heartbeat_handle = tokio::spawn(heartbeat.run(cancel.clone()));

    let runtime = Arc::new(AgentRuntime::new(store, ollama, config));
    let runtime_handle = tokio::spawn(runtime.run(cancel.clone()));

    relay_core::shutdown::shutdown_signal().await;
    cancel.cancel();

    if let Err(e) = runtime_handle.await {
        tracing::error!(error = %e, "Agent runtime task panicked");
    }
    if let Err(e) = heartbeat_handle.await {
        tracing::error!(error = %e, "Heartbeat task panicked");
    }
    tracing::info!("relay-agent stopped");
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "relay_agent=info,relay_db=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
