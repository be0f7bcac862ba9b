#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_core::chat::Exchange;
use relay_core::dialog::LatestSolved;
use relay_core::heartbeat::HeartbeatSnapshot;
use relay_core::resources::{GpuSnapshot, ResourceSnapshot};
use relay_core::types::{DbId, Timestamp};
use relay_db::models::agent_status::{AgentStatus, AgentStatusUpsert};
use relay_db::models::model_spec::{CreateModelSpec, ModelSpec};
use relay_db::models::prompt_template::{CreatePromptTemplate, PromptTemplate};
use relay_db::models::request::{Assignment, Claim, Completion, NewRequest, Request};
use relay_db::models::transition::NewTransition;
use relay_db::{MemoryStore, SharedStore, StoreError};
use relay_dispatcher::config::DispatcherConfig;
use relay_dispatcher::dispatcher::Dispatcher;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn dispatcher(store: &Arc<MemoryStore>) -> Dispatcher<MemoryStore> {
    Dispatcher::new(Arc::clone(store), DispatcherConfig::default())
}

pub fn template(store: &MemoryStore, name: &str, tags: &str, content: &str, model: &str) -> i64 {
    store
        .insert_prompt_template(CreatePromptTemplate {
            name: name.to_string(),
            role: None,
            tags: tags.to_string(),
            content: content.to_string(),
            preferred_model: Some(model.to_string()),
            is_active: None,
        })
        .id
}

pub fn model(store: &MemoryStore, name: &str, requires_gpu: bool, min_ram_mb: Option<i64>) {
    store.upsert_model_spec(CreateModelSpec {
        name: name.to_string(),
        requires_gpu,
        min_ram_mb,
        min_vram_mb: None,
    });
}

pub async fn agent(
    store: &MemoryStore,
    name: &str,
    cpu: f64,
    ram_total_mb: i64,
    mem_percent: f64,
    gpu: GpuSnapshot,
    at: DateTime<Utc>,
) {
    store
        .upsert_agent_status(
            &AgentStatusUpsert {
                agent_name: name.to_string(),
                hostname: format!("{name}.local"),
                snapshot: HeartbeatSnapshot {
                    resources: ResourceSnapshot {
                        cpu_percent: cpu,
                        mem_percent,
                        ram_total_mb: Some(ram_total_mb),
                        gpu,
                    },
                    active_model: None,
                    installed_models: Vec::new(),
                },
            },
            at,
        )
        .await
        .unwrap();
}

pub async fn submit(store: &MemoryStore, text: &str) -> Request {
    store
        .submit_request(
            &NewRequest {
                user_id: 1,
                text: text.to_string(),
                dialog_id: None,
            },
            Utc::now(),
        )
        .await
        .unwrap()
}

pub fn gpu(total_mb: i64) -> GpuSnapshot {
    GpuSnapshot::Present {
        util_percent: 5.0,
        mem_used_mb: 0,
        mem_total_mb: total_mb,
    }
}

// ---------------------------------------------------------------------------
// Faulty store
// ---------------------------------------------------------------------------

/// [`MemoryStore`] that fails chosen calls.
///
/// `assign_request` always fails for `broken_request`; `pending_requests`
/// fails while `pending_failures` is above zero.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub broken_request: Option<DbId>,
    pub pending_failures: AtomicU32,
}

fn outage() -> StoreError {
    StoreError::Invariant("connection reset".to_string())
}

#[async_trait]
impl SharedStore for FaultyStore {
    async fn submit_request(&self, input: &NewRequest, now: Timestamp) -> Result<Request, StoreError> {
        self.inner.submit_request(input, now).await
    }

    async fn undelivered_responses(&self, limit: i64) -> Result<Vec<Request>, StoreError> {
        self.inner.undelivered_responses(limit).await
    }

    async fn mark_delivered(&self, request_id: DbId) -> Result<bool, StoreError> {
        self.inner.mark_delivered(request_id).await
    }

    async fn pending_requests(&self) -> Result<Vec<Request>, StoreError> {
        let remaining = self.pending_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.pending_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(outage());
        }
        self.inner.pending_requests().await
    }

    async fn available_agents(&self, fresh_since: Timestamp) -> Result<Vec<AgentStatus>, StoreError> {
        self.inner.available_agents(fresh_since).await
    }

    async fn active_prompt_templates(&self) -> Result<Vec<PromptTemplate>, StoreError> {
        self.inner.active_prompt_templates().await
    }

    async fn active_models(&self) -> Result<Vec<ModelSpec>, StoreError> {
        self.inner.active_models().await
    }

    async fn assign_request(&self, assignment: &Assignment) -> Result<bool, StoreError> {
        if self.broken_request == Some(assignment.request_id) {
            return Err(outage());
        }
        self.inner.assign_request(assignment).await
    }

    async fn mark_stale_agents_unavailable(&self, stale_before: Timestamp) -> Result<u64, StoreError> {
        self.inner.mark_stale_agents_unavailable(stale_before).await
    }

    async fn next_claimable(&self, agent: &str, now: Timestamp) -> Result<Option<Request>, StoreError> {
        self.inner.next_claimable(agent, now).await
    }

    async fn latest_solved_for_user(&self, user_id: DbId) -> Result<Option<LatestSolved>, StoreError> {
        self.inner.latest_solved_for_user(user_id).await
    }

    async fn claim_request(&self, claim: &Claim) -> Result<Option<Request>, StoreError> {
        self.inner.claim_request(claim).await
    }

    async fn prompt_template(&self, id: DbId) -> Result<Option<PromptTemplate>, StoreError> {
        self.inner.prompt_template(id).await
    }

    async fn dialog_history(&self, dialog_id: &str) -> Result<Vec<Exchange>, StoreError> {
        self.inner.dialog_history(dialog_id).await
    }

    async fn complete_request(&self, completion: &Completion) -> Result<bool, StoreError> {
        self.inner.complete_request(completion).await
    }

    async fn fail_request(
        &self,
        request_id: DbId,
        agent: &str,
        error: &str,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        self.inner.fail_request(request_id, agent, error, now).await
    }

    async fn expire_own_leases(&self, agent: &str, now: Timestamp) -> Result<u64, StoreError> {
        self.inner.expire_own_leases(agent, now).await
    }

    async fn upsert_agent_status(&self, status: &AgentStatusUpsert, now: Timestamp) -> Result<(), StoreError> {
        self.inner.upsert_agent_status(status, now).await
    }

    async fn touch_heartbeat(&self, agent: &str, now: Timestamp) -> Result<bool, StoreError> {
        self.inner.touch_heartbeat(agent, now).await
    }

    async fn record_transition(&self, transition: &NewTransition, now: Timestamp) -> Result<(), StoreError> {
        self.inner.record_transition(transition, now).await
    }
}
