//! Claim and execute loop of one agent.
//!
//! The poll loop claims at most one request per tick and hands it to a
//! spawned task, so a slow inference call never blocks claim scanning.
//! Concurrency is bounded by a semaphore; when every permit is taken the
//! tick is skipped without touching the store.

use std::sync::Arc;

use chrono::Utc;
use relay_core::chat::{self, INFERENCE_FAILURE_SENTINEL};
use relay_core::dialog::{self, DialogResolution};
use relay_core::status::RequestStatus;
use relay_core::types::Timestamp;
use relay_db::models::request::{Claim, Completion, Request};
use relay_db::models::transition::NewTransition;
use relay_db::{SharedStore, StoreError};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::AgentConfig;
use crate::inference::InferenceClient;

/// How a claimed request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Solved with the engine's response.
    Solved,
    /// Solved with [`INFERENCE_FAILURE_SENTINEL`] after the engine failed.
    SolvedWithSentinel,
    /// Moved to `error`; execution could not start.
    Failed(String),
    /// The lease was taken over before the result could be written.
    LostLease,
}

pub struct AgentRuntime<S: ?Sized, C: ?Sized> {
    store: Arc<S>,
    inference: Arc<C>,
    config: AgentConfig,
    permits: Arc<Semaphore>,
}

impl<S, C> AgentRuntime<S, C>
where
    S: SharedStore + ?Sized + 'static,
    C: InferenceClient + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, inference: Arc<C>, config: AgentConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            store,
            inference,
            config,
            permits,
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.config.agent_name
    }

    /// Run the poll loop until the cancellation token is triggered, then
    /// wait for in-flight jobs to finish.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let tracker = TaskTracker::new();

        match self.store.expire_own_leases(self.agent_name(), Utc::now()).await {
            Ok(0) => {}
            Ok(count) => tracing::warn!(
                agent = %self.agent_name(),
                count,
                "Resuming requests left in progress by a previous run",
            ),
            Err(e) => tracing::error!(error = %e, "Failed to expire leftover leases"),
        }

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            agent = %self.agent_name(),
            poll_interval_secs = self.config.poll_interval.as_secs(),
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Agent runtime started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Agent runtime shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once(&tracker).await {
                        tracing::error!(error = %e, "Claim poll failed");
                        ticker.reset_after(self.config.recovery_delay);
                    }
                }
            }
        }

        tracker.close();
        if !tracker.is_empty() {
            tracing::info!(jobs = tracker.len(), "Waiting for in-flight jobs");
        }
        tracker.wait().await;
    }

    /// Claim one request if a concurrency slot is free and spawn its
    /// execution on `tracker`.
    async fn poll_once(self: &Arc<Self>, tracker: &TaskTracker) -> Result<(), StoreError> {
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            tracing::trace!("All job slots busy");
            return Ok(());
        };

        let Some(request) = self.claim_next(Utc::now()).await? else {
            return Ok(());
        };

        let runtime = Arc::clone(self);
        tracker.spawn(async move {
            let request_id = request.id;
            if let Err(e) = runtime.execute(request).await {
                tracing::error!(request_id, error = %e, "Failed to store job result");
            }
            drop(permit);
        });
        Ok(())
    }

    /// Claim the oldest request available to this agent at `now`.
    ///
    /// Returns `None` when nothing is claimable or another runtime won the
    /// claim race.
    pub async fn claim_next(&self, now: Timestamp) -> Result<Option<Request>, StoreError> {
        let agent = self.agent_name();
        let Some(candidate) = self.store.next_claimable(agent, now).await? else {
            return Ok(None);
        };
        let reclaim = candidate.status == RequestStatus::Progress;

        let resolution = if reclaim {
            match candidate.dialog_id.clone() {
                Some(id) => DialogResolution::Provided(id),
                None => self.resolve_dialog(&candidate, now).await?,
            }
        } else {
            self.resolve_dialog(&candidate, now).await?
        };

        let claim = Claim {
            request_id: candidate.id,
            agent_name: agent.to_string(),
            dialog_id: resolution.dialog_id().to_string(),
            now,
            lease_until: now + chrono::Duration::from_std(self.config.lease).unwrap_or_default(),
        };
        let Some(request) = self.store.claim_request(&claim).await? else {
            tracing::debug!(request_id = candidate.id, "Lost claim race");
            return Ok(None);
        };

        if reclaim {
            tracing::warn!(
                request_id = request.id,
                previous_holder = ?candidate.locked_by,
                "Reclaimed request with expired lease",
            );
        } else {
            tracing::info!(
                request_id = request.id,
                dialog = ?resolution,
                model = ?request.model,
                "Request claimed",
            );
            self.audit(request.id, RequestStatus::Queued, RequestStatus::Progress, None, now)
                .await;
        }

        Ok(Some(request))
    }

    async fn resolve_dialog(&self, request: &Request, now: Timestamp) -> Result<DialogResolution, StoreError> {
        let provided = request.dialog_id.as_deref().filter(|id| !id.trim().is_empty());
        let latest = match provided {
            Some(_) => None,
            None => self.store.latest_solved_for_user(request.user_id).await?,
        };
        Ok(dialog::resolve(provided, latest.as_ref(), now, self.config.dialog_window))
    }

    /// Execute a request this runtime holds and store the result.
    ///
    /// Inference failures still complete the request, with the failure
    /// sentinel as response. Problems that prevent the inference call from
    /// being made move the request to `error`.
    pub async fn execute(&self, request: Request) -> Result<JobOutcome, StoreError> {
        let Some(model) = request.model.clone().filter(|m| !m.trim().is_empty()) else {
            return self.fail(&request, "no model assigned".to_string()).await;
        };
        let Some(dialog_id) = request.dialog_id.clone() else {
            return self.fail(&request, "claimed request has no dialog id".to_string()).await;
        };

        let system_prompt = match self.system_prompt(&request).await {
            Ok(prompt) => prompt,
            Err(e) => return self.fail(&request, format!("failed to load prompt template: {e}")).await,
        };
        let prior = match self.store.dialog_history(&dialog_id).await {
            Ok(prior) => prior,
            Err(e) => return self.fail(&request, format!("failed to load dialog history: {e}")).await,
        };

        let messages = chat::build_history(system_prompt.as_deref(), &prior, &request.text);
        tracing::debug!(
            request_id = request.id,
            model = %model,
            messages = messages.len(),
            "Querying inference engine",
        );

        let (response, outcome) = match self.inference.chat(&model, &messages).await {
            Ok(text) => (text, JobOutcome::Solved),
            Err(e) => {
                tracing::warn!(request_id = request.id, model = %model, error = %e, "Inference failed");
                (INFERENCE_FAILURE_SENTINEL.to_string(), JobOutcome::SolvedWithSentinel)
            }
        };

        let now = Utc::now();
        let completion = Completion {
            request_id: request.id,
            agent_name: self.agent_name().to_string(),
            response,
            model,
            now,
        };
        if !self.store.complete_request(&completion).await? {
            tracing::warn!(request_id = request.id, "Lease lost before the response was stored");
            return Ok(JobOutcome::LostLease);
        }

        tracing::info!(request_id = request.id, outcome = ?outcome, "Request solved");
        self.audit(request.id, RequestStatus::Progress, RequestStatus::Solved, None, now)
            .await;
        Ok(outcome)
    }

    async fn system_prompt(&self, request: &Request) -> Result<Option<String>, StoreError> {
        if !self.config.system_prompt {
            return Ok(None);
        }
        let Some(prompt_id) = request.assigned_prompt else {
            return Ok(None);
        };
        let template = self.store.prompt_template(prompt_id).await?;
        if template.is_none() {
            tracing::warn!(request_id = request.id, prompt_id, "Assigned prompt template no longer exists");
        }
        Ok(template.map(|t| t.content))
    }

    async fn fail(&self, request: &Request, reason: String) -> Result<JobOutcome, StoreError> {
        let now = Utc::now();
        tracing::error!(request_id = request.id, reason = %reason, "Request cannot be executed");
        if !self
            .store
            .fail_request(request.id, self.agent_name(), &reason, now)
            .await?
        {
            return Ok(JobOutcome::LostLease);
        }
        self.audit(
            request.id,
            RequestStatus::Progress,
            RequestStatus::Error,
            Some(reason.clone()),
            now,
        )
        .await;
        Ok(JobOutcome::Failed(reason))
    }

    async fn audit(
        &self,
        request_id: i64,
        from: RequestStatus,
        to: RequestStatus,
        detail: Option<String>,
        now: Timestamp,
    ) {
        let transition = NewTransition {
            request_id,
            from_status: Some(from),
            to_status: to,
            agent_name: Some(self.agent_name().to_string()),
            detail,
        };
        if let Err(e) = self.store.record_transition(&transition, now).await {
            tracing::warn!(request_id, error = %e, "Failed to record transition");
        }
    }
}
