//! `relay-dispatcher` -- matches new inference requests to agents.
//!
//! # Environment variables
//!
//! | Variable                   | Required | Default | Description                        |
//! |----------------------------|----------|---------|------------------------------------|
//! | `DATABASE_URL`             | yes      | --      | PostgreSQL connection string       |
//! | `DATABASE_MAX_CONNECTIONS` | no       | `10`    | Pool size                          |
//! | `DISPATCH_INTERVAL_SECS`   | no       | `10`    | Seconds between dispatch cycles    |
//! | `DISPATCH_RECOVERY_SECS`   | no       | `2`     | Pause after a failed cycle         |
//! | `AGENT_STALE_AFTER_SECS`   | no       | `60`    | Heartbeat age that marks an agent gone |
//! | `LOG_FORMAT`               | no       | `text`  | `json` for JSON log lines          |

use std::sync::Arc;

use relay_db::PgStore;
use relay_dispatcher::config::DispatcherConfig;
use relay_dispatcher::dispatcher::Dispatcher;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = DispatcherConfig::from_env();

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
    if let Err(e) = relay_db::run_migrations(&pool).await {
        tracing::error!(error = %e, "Failed to run database migrations");
        std::process::exit(1);
    }
    tracing::info!("Database ready");

    let dispatcher = Dispatcher::new(Arc::new(PgStore::new(pool)), config);
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        relay_core::shutdown::shutdown_signal().await;
        signal_cancel.cancel();
    });

    dispatcher.run(cancel).await;
    tracing::info!("relay-dispatcher stopped");
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "relay_dispatcher=info,relay_db=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
