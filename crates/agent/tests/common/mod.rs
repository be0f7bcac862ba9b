#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_agent::config::AgentConfig;
use relay_agent::inference::{InferenceClient, InferenceError, ModelInventory};
use relay_agent::probe::ResourceProbe;
use relay_agent::runtime::AgentRuntime;
use relay_core::chat::{ChatMessage, Exchange};
use relay_core::dialog::LatestSolved;
use relay_core::resources::GpuSnapshot;
use relay_core::types::{DbId, Timestamp};
use relay_db::models::agent_status::{AgentStatus, AgentStatusUpsert};
use relay_db::models::model_spec::ModelSpec;
use relay_db::models::prompt_template::{CreatePromptTemplate, PromptTemplate};
use relay_db::models::request::{Assignment, Claim, Completion, NewRequest, Request};
use relay_db::models::transition::NewTransition;
use relay_db::{MemoryStore, SharedStore, StoreError};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Inference engine answering from a script and recording every call.
#[derive(Default)]
pub struct ScriptedEngine {
    replies: Mutex<VecDeque<Result<String, InferenceError>>>,
    calls: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedEngine {
    pub fn replying(replies: &[&str]) -> Self {
        let engine = Self::default();
        for reply in replies {
            engine.push(Ok(reply.to_string()));
        }
        engine
    }

    pub fn push(&self, reply: Result<String, InferenceError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for ScriptedEngine {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String, InferenceError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), messages.to_vec()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()))
    }
}

/// Probe returning whatever the test last set.
pub struct FixedProbe {
    pub cpu: Mutex<f64>,
    pub mem: Mutex<f64>,
    pub ram_total_mb: Option<i64>,
    pub gpu: Mutex<GpuSnapshot>,
}

impl FixedProbe {
    pub fn new(cpu: f64, mem: f64) -> Self {
        Self {
            cpu: Mutex::new(cpu),
            mem: Mutex::new(mem),
            ram_total_mb: Some(16_000),
            gpu: Mutex::new(GpuSnapshot::Unavailable),
        }
    }

    pub fn set_cpu(&self, cpu: f64) {
        *self.cpu.lock().unwrap() = cpu;
    }
}

impl ResourceProbe for FixedProbe {
    fn cpu_percent(&self) -> f64 {
        *self.cpu.lock().unwrap()
    }

    fn mem_percent(&self) -> f64 {
        *self.mem.lock().unwrap()
    }

    fn ram_total_mb(&self) -> Option<i64> {
        self.ram_total_mb
    }

    fn gpu_snapshot(&self) -> GpuSnapshot {
        *self.gpu.lock().unwrap()
    }
}

/// Model inventory that can be switched offline.
pub struct FixedInventory {
    pub active: Mutex<Option<String>>,
    pub installed: Vec<String>,
    pub offline: Mutex<bool>,
}

impl FixedInventory {
    pub fn new(active: Option<&str>) -> Self {
        Self {
            active: Mutex::new(active.map(str::to_string)),
            installed: vec!["llama3:8b".to_string(), "mistral:7b".to_string()],
            offline: Mutex::new(false),
        }
    }

    pub fn set_active(&self, model: Option<&str>) {
        *self.active.lock().unwrap() = model.map(str::to_string);
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    fn check(&self) -> Result<(), InferenceError> {
        if *self.offline.lock().unwrap() {
            Err(InferenceError::Api {
                status: 503,
                body: "engine down".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ModelInventory for FixedInventory {
    async fn active_model(&self) -> Result<Option<String>, InferenceError> {
        self.check()?;
        Ok(self.active.lock().unwrap().clone())
    }

    async fn installed_models(&self) -> Result<Vec<String>, InferenceError> {
        self.check()?;
        Ok(self.installed.clone())
    }
}

/// [`MemoryStore`] whose next `fail_upserts` status upserts return an error.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_upserts: AtomicU32,
}

impl FlakyStore {
    pub fn failing_upserts(count: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_upserts: AtomicU32::new(count),
        }
    }
}

#[async_trait]
impl SharedStore for FlakyStore {
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
        let remaining = self.fail_upserts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_upserts.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Invariant("connection reset".to_string()));
        }
        self.inner.upsert_agent_status(status, now).await
    }

    async fn touch_heartbeat(&self, agent: &str, now: Timestamp) -> Result<bool, StoreError> {
        self.inner.touch_heartbeat(agent, now).await
    }

    async fn record_transition(&self, transition: &NewTransition, now: Timestamp) -> Result<(), StoreError> {
        self.inner.record_transition(transition, now).await
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const AGENT: &str = "agent-01";

pub fn runtime(store: &Arc<MemoryStore>, engine: &Arc<ScriptedEngine>) -> AgentRuntime<MemoryStore, ScriptedEngine> {
    AgentRuntime::new(Arc::clone(store), Arc::clone(engine), AgentConfig::named(AGENT))
}

pub fn template(store: &MemoryStore, content: &str) -> i64 {
    store
        .insert_prompt_template(CreatePromptTemplate {
            name: format!("template-{}", content.len()),
            role: None,
            tags: String::new(),
            content: content.to_string(),
            preferred_model: Some("llama3:8b".to_string()),
            is_active: None,
        })
        .id
}

/// Submit a request created at `created_at` and queue it for [`AGENT`].
pub async fn queue(
    store: &MemoryStore,
    user_id: i64,
    text: &str,
    dialog_id: Option<&str>,
    prompt_id: i64,
    created_at: DateTime<Utc>,
) -> Request {
    let request = store
        .submit_request(
            &NewRequest {
                user_id,
                text: text.to_string(),
                dialog_id: dialog_id.map(str::to_string),
            },
            created_at,
        )
        .await
        .unwrap();
    assert!(store
        .assign_request(&Assignment {
            request_id: request.id,
            agent_name: AGENT.to_string(),
            prompt_id,
            model: "llama3:8b".to_string(),
        })
        .await
        .unwrap());
    store.request(request.id).unwrap()
}
