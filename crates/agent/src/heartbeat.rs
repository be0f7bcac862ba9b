//! Heartbeat loop: publishes this agent's resources and models.
//!
//! A full row is written only when the snapshot moved past the configured
//! tolerance since the last full write; otherwise only `last_heartbeat`
//! is refreshed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use relay_core::heartbeat::{self, HeartbeatSnapshot, HeartbeatTolerance, HeartbeatWrite};
use relay_core::types::Timestamp;
use relay_db::models::agent_status::AgentStatusUpsert;
use relay_db::{SharedStore, StoreError};
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::inference::ModelInventory;
use crate::probe::ResourceProbe;

/// Last snapshot successfully written in full. Owned by the loop.
#[derive(Debug, Default)]
pub struct HeartbeatState {
    last_published: Option<HeartbeatSnapshot>,
}

impl HeartbeatState {
    pub fn last_published(&self) -> Option<&HeartbeatSnapshot> {
        self.last_published.as_ref()
    }
}

pub struct HeartbeatPublisher<S: ?Sized, P: ?Sized, M: ?Sized> {
    store: Arc<S>,
    probe: Arc<P>,
    inventory: Arc<M>,
    agent_name: String,
    hostname: String,
    interval: Duration,
    recovery_delay: Duration,
    tolerance: HeartbeatTolerance,
}

impl<S, P, M> HeartbeatPublisher<S, P, M>
where
    S: SharedStore + ?Sized,
    P: ResourceProbe + ?Sized,
    M: ModelInventory + ?Sized,
{
    pub fn new(store: Arc<S>, probe: Arc<P>, inventory: Arc<M>, config: &AgentConfig) -> Self {
        Self {
            store,
            probe,
            inventory,
            agent_name: config.agent_name.clone(),
            hostname: config.hostname.clone(),
            interval: config.heartbeat_interval,
            recovery_delay: config.recovery_delay,
            tolerance: config.heartbeat_tolerance,
        }
    }

    /// Publish heartbeats until the cancellation token is triggered.
    ///
    /// A failed beat is retried after the recovery delay instead of the
    /// full interval.
    pub async fn run(self, cancel: CancellationToken) {
        let mut state = HeartbeatState::default();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            agent = %self.agent_name,
            interval_secs = self.interval.as_secs(),
            "Heartbeat started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Heartbeat stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.beat(&mut state, Utc::now()).await {
                        tracing::error!(error = %e, "Heartbeat failed");
                        ticker.reset_after(self.recovery_delay);
                    }
                }
            }
        }
    }

    /// Collect a snapshot and publish it.
    ///
    /// A touch that finds no row (deleted, or never written) falls back to
    /// a full write. `state` only advances after a successful full write.
    pub async fn beat(&self, state: &mut HeartbeatState, now: Timestamp) -> Result<HeartbeatWrite, StoreError> {
        let snapshot = self.collect(state).await;

        if heartbeat::decide(state.last_published(), &snapshot, self.tolerance) == HeartbeatWrite::TouchOnly {
            if self.store.touch_heartbeat(&self.agent_name, now).await? {
                tracing::trace!("Heartbeat touched");
                return Ok(HeartbeatWrite::TouchOnly);
            }
            tracing::warn!(agent = %self.agent_name, "Status row missing, writing full heartbeat");
        }

        let upsert = AgentStatusUpsert {
            agent_name: self.agent_name.clone(),
            hostname: self.hostname.clone(),
            snapshot,
        };
        self.store.upsert_agent_status(&upsert, now).await?;
        tracing::debug!(
            cpu_percent = upsert.snapshot.resources.cpu_percent,
            mem_percent = upsert.snapshot.resources.mem_percent,
            gpu = upsert.snapshot.resources.gpu.is_present(),
            active_model = ?upsert.snapshot.active_model,
            "Heartbeat published",
        );
        state.last_published = Some(upsert.snapshot);
        Ok(HeartbeatWrite::Full)
    }

    /// Probe resources and query the engine's model lists.
    ///
    /// When the engine cannot be reached no model is reported active and
    /// the last published installed list is kept.
    async fn collect(&self, state: &HeartbeatState) -> HeartbeatSnapshot {
        let resources = self.probe.snapshot();

        let active_model = match self.inventory.active_model().await {
            Ok(model) => model,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query active model");
                None
            }
        };
        let installed_models = match self.inventory.installed_models().await {
            Ok(models) => models,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query installed models");
                state
                    .last_published()
                    .map(|s| s.installed_models.clone())
                    .unwrap_or_default()
            }
        };

        HeartbeatSnapshot {
            resources,
            active_model,
            installed_models,
        }
    }
}
