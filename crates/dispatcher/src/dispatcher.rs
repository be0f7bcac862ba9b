//! Periodic dispatch loop.
//!
//! Each cycle sweeps stale agents, loads the pending requests together
//! with the fresh agents, active templates and catalog models, and queues
//! every request it can match. A request that cannot be matched stays
//! `new` and is retried on the next cycle.

use std::sync::Arc;

use chrono::Utc;
use relay_core::status::RequestStatus;
use relay_core::types::Timestamp;
use relay_db::models::model_spec::ModelSpec;
use relay_db::models::prompt_template::PromptTemplate;
use relay_db::models::request::{Assignment, Request};
use relay_db::models::transition::NewTransition;
use relay_db::{SharedStore, StoreError};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::DispatcherConfig;
use crate::matching::{self, AgentCandidate, MatchDecision};

/// Counters for one dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub pending: usize,
    pub assigned: usize,
    /// Left `new`: no template, unknown model or no compatible agent.
    pub unmatched: usize,
    /// Another dispatcher assigned the request first.
    pub raced: usize,
    /// Store errors while handling a single request.
    pub failed: usize,
    /// Agents flagged unavailable by the staleness sweep.
    pub stale_agents: u64,
}

enum ItemOutcome {
    Assigned,
    Unmatched,
    Raced,
}

/// Rows loaded once per cycle and shared by every request.
struct CycleInputs {
    agents: Vec<AgentCandidate>,
    templates: Vec<PromptTemplate>,
    models: Vec<ModelSpec>,
}

pub struct Dispatcher<S: ?Sized> {
    store: Arc<S>,
    config: DispatcherConfig,
}

impl<S> Dispatcher<S>
where
    S: SharedStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: DispatcherConfig) -> Self {
        Self { store, config }
    }

    /// Run the dispatch loop until the cancellation token is triggered.
    ///
    /// A failed cycle is logged and retried after the recovery delay
    /// instead of the full interval.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            stale_after_secs = self.config.stale_after.as_secs(),
            "Dispatcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_cycle(Utc::now()).await {
                        Ok(report) => log_report(&report),
                        Err(e) => {
                            tracing::error!(error = %e, "Dispatch cycle failed");
                            ticker.reset_after(self.config.recovery_delay);
                        }
                    }
                }
            }
        }
    }

    /// One dispatch cycle evaluated at `now`.
    ///
    /// Returns an error only when loading the cycle inputs fails; errors on
    /// individual requests are counted in [`CycleReport::failed`].
    pub async fn run_cycle(&self, now: Timestamp) -> Result<CycleReport, StoreError> {
        let mut report = CycleReport::default();
        let fresh_since = now - chrono::Duration::from_std(self.config.stale_after).unwrap_or_default();

        report.stale_agents = self.store.mark_stale_agents_unavailable(fresh_since).await?;
        if report.stale_agents > 0 {
            tracing::warn!(count = report.stale_agents, "Marked silent agents unavailable");
        }

        let pending = self.store.pending_requests().await?;
        report.pending = pending.len();
        if pending.is_empty() {
            return Ok(report);
        }

        let inputs = self.load_inputs(fresh_since).await?;
        tracing::debug!(
            pending = pending.len(),
            agents = inputs.agents.len(),
            templates = inputs.templates.len(),
            models = inputs.models.len(),
            "Dispatch cycle inputs loaded",
        );

        for request in &pending {
            match self.dispatch_one(request, &inputs, now).await {
                Ok(ItemOutcome::Assigned) => report.assigned += 1,
                Ok(ItemOutcome::Unmatched) => report.unmatched += 1,
                Ok(ItemOutcome::Raced) => report.raced += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(request_id = request.id, error = %e, "Failed to dispatch request");
                }
            }
        }

        Ok(report)
    }

    async fn load_inputs(&self, fresh_since: Timestamp) -> Result<CycleInputs, StoreError> {
        let rows = self.store.available_agents(fresh_since).await?;
        let agents = rows
            .iter()
            .filter_map(|row| match AgentCandidate::try_from(row) {
                Ok(candidate) => Some(candidate),
                Err(e) => {
                    tracing::warn!(agent = %row.agent_name, error = %e, "Skipping agent with invalid status row");
                    None
                }
            })
            .collect();

        Ok(CycleInputs {
            agents,
            templates: self.store.active_prompt_templates().await?,
            models: self.store.active_models().await?,
        })
    }

    async fn dispatch_one(
        &self,
        request: &Request,
        inputs: &CycleInputs,
        now: Timestamp,
    ) -> Result<ItemOutcome, StoreError> {
        let decision = matching::decide(&request.text, &inputs.templates, &inputs.models, &inputs.agents);

        let (prompt_id, score, model, agent) = match decision {
            MatchDecision::Assign {
                prompt_id,
                score,
                model,
                agent,
            } => (prompt_id, score, model, agent),
            MatchDecision::NoTemplate => {
                tracing::warn!(request_id = request.id, "No active prompt template, request stays new");
                return Ok(ItemOutcome::Unmatched);
            }
            MatchDecision::NoPreferredModel { prompt_id } => {
                tracing::warn!(request_id = request.id, prompt_id, "Prompt template names no model");
                return Ok(ItemOutcome::Unmatched);
            }
            MatchDecision::UnknownModel { prompt_id, model } => {
                tracing::warn!(request_id = request.id, prompt_id, model = %model, "Model not in active catalog");
                return Ok(ItemOutcome::Unmatched);
            }
            MatchDecision::NoCompatibleAgent { prompt_id, model } => {
                tracing::info!(request_id = request.id, prompt_id, model = %model, "No compatible agent available");
                return Ok(ItemOutcome::Unmatched);
            }
        };

        let assignment = Assignment {
            request_id: request.id,
            agent_name: agent,
            prompt_id,
            model,
        };
        if !self.store.assign_request(&assignment).await? {
            tracing::debug!(request_id = request.id, "Request assigned elsewhere first");
            return Ok(ItemOutcome::Raced);
        }

        tracing::info!(
            request_id = request.id,
            agent = %assignment.agent_name,
            prompt_id,
            score,
            model = %assignment.model,
            "Request queued",
        );

        let transition = NewTransition {
            request_id: request.id,
            from_status: Some(RequestStatus::New),
            to_status: RequestStatus::Queued,
            agent_name: Some(assignment.agent_name.clone()),
            detail: Some(format!("prompt {prompt_id} (score {score}), model {}", assignment.model)),
        };
        if let Err(e) = self.store.record_transition(&transition, now).await {
            tracing::warn!(request_id = request.id, error = %e, "Failed to record transition");
        }

        Ok(ItemOutcome::Assigned)
    }
}

fn log_report(report: &CycleReport) {
    if report.pending == 0 {
        tracing::debug!("Dispatch cycle: nothing pending");
        return;
    }
    tracing::info!(
        pending = report.pending,
        assigned = report.assigned,
        unmatched = report.unmatched,
        raced = report.raced,
        failed = report.failed,
        "Dispatch cycle complete",
    );
}
