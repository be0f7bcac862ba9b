//! In-process [`SharedStore`] for tests and single-host runs.
//!
//! All tables sit behind one mutex; every guarded update evaluates its
//! guard and applies its changes under a single lock acquisition, which
//! gives the same at-most-one-winner behaviour as a guarded SQL `UPDATE`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use relay_core::chat::Exchange;
use relay_core::dialog::LatestSolved;
use relay_core::status::RequestStatus;
use relay_core::types::{DbId, Timestamp};

use crate::models::agent_status::{AgentStatus, AgentStatusUpsert};
use crate::models::model_spec::{CreateModelSpec, ModelSpec};
use crate::models::prompt_template::{CreatePromptTemplate, PromptTemplate, DISPATCH_ROLE};
use crate::models::request::{Assignment, Claim, Completion, NewRequest, Request};
use crate::models::transition::{NewTransition, RequestTransition};
use crate::store::SharedStore;
use crate::StoreError;

/// Number of heartbeat writes of each kind received for one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatWrites {
    pub full: u32,
    pub touch: u32,
}

#[derive(Default)]
struct Tables {
    next_request_id: DbId,
    next_template_id: DbId,
    next_transition_id: DbId,
    requests: BTreeMap<DbId, Request>,
    agents: BTreeMap<String, AgentStatus>,
    templates: Vec<PromptTemplate>,
    models: BTreeMap<String, ModelSpec>,
    transitions: Vec<RequestTransition>,
    heartbeat_writes: HashMap<String, HeartbeatWrites>,
}

impl Tables {
    fn next_id(counter: &mut DbId) -> DbId {
        *counter += 1;
        *counter
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Seeding and inspection ───────────────────────────────────────────

    pub fn insert_prompt_template(&self, input: CreatePromptTemplate) -> PromptTemplate {
        let mut tables = self.lock();
        let now = Utc::now();
        let template = PromptTemplate {
            id: Tables::next_id(&mut tables.next_template_id),
            name: input.name,
            role: input.role.unwrap_or_else(|| DISPATCH_ROLE.to_string()),
            tags: input.tags,
            content: input.content,
            preferred_model: input.preferred_model,
            is_active: input.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        };
        tables.templates.push(template.clone());
        template
    }

    pub fn upsert_model_spec(&self, input: CreateModelSpec) -> ModelSpec {
        let mut tables = self.lock();
        let now = Utc::now();
        let created_at = tables
            .models
            .get(&input.name)
            .map_or(now, |existing| existing.created_at);
        let spec = ModelSpec {
            name: input.name,
            requires_gpu: input.requires_gpu,
            min_ram_mb: input.min_ram_mb,
            min_vram_mb: input.min_vram_mb,
            is_active: true,
            created_at,
            updated_at: now,
        };
        tables.models.insert(spec.name.clone(), spec.clone());
        spec
    }

    pub fn request(&self, id: DbId) -> Option<Request> {
        self.lock().requests.get(&id).cloned()
    }

    pub fn agent(&self, name: &str) -> Option<AgentStatus> {
        self.lock().agents.get(name).cloned()
    }

    pub fn transitions_for(&self, request_id: DbId) -> Vec<RequestTransition> {
        self.lock()
            .transitions
            .iter()
            .filter(|t| t.request_id == request_id)
            .cloned()
            .collect()
    }

    pub fn heartbeat_writes(&self, agent: &str) -> HeartbeatWrites {
        self.lock()
            .heartbeat_writes
            .get(agent)
            .copied()
            .unwrap_or_default()
    }
}

fn push_transition(tables: &mut Tables, transition: &NewTransition, now: Timestamp) -> Result<(), StoreError> {
    transition.check_edge()?;
    if !tables.requests.contains_key(&transition.request_id) {
        return Err(StoreError::Invariant(format!(
            "transition for unknown request {}",
            transition.request_id
        )));
    }
    let id = Tables::next_id(&mut tables.next_transition_id);
    tables.transitions.push(RequestTransition {
        id,
        request_id: transition.request_id,
        from_status: transition.from_status.map(|s| s.as_str().to_string()),
        to_status: transition.to_status.as_str().to_string(),
        agent_name: transition.agent_name.clone(),
        detail: transition.detail.clone(),
        recorded_at: now,
    });
    Ok(())
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn submit_request(&self, input: &NewRequest, now: Timestamp) -> Result<Request, StoreError> {
        let mut tables = self.lock();
        let request = Request {
            id: Tables::next_id(&mut tables.next_request_id),
            user_id: input.user_id,
            dialog_id: input.dialog_id.clone(),
            text: input.text.clone(),
            status: RequestStatus::New,
            assigned_agent: None,
            assigned_prompt: None,
            model: None,
            locked_by: None,
            locked_at: None,
            lease_expires_at: None,
            response: None,
            error_message: None,
            delivered: false,
            created_at: now,
            started_at: None,
            finished_at: None,
        };
        tables.requests.insert(request.id, request.clone());
        let initial = NewTransition {
            request_id: request.id,
            from_status: None,
            to_status: RequestStatus::New,
            agent_name: None,
            detail: None,
        };
        push_transition(&mut tables, &initial, now)?;
        Ok(request)
    }

    async fn undelivered_responses(&self, limit: i64) -> Result<Vec<Request>, StoreError> {
        let tables = self.lock();
        let mut solved: Vec<Request> = tables
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::Solved && !r.delivered)
            .cloned()
            .collect();
        solved.sort_by_key(|r| (r.finished_at, r.id));
        solved.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(solved)
    }

    async fn mark_delivered(&self, request_id: DbId) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        match tables.requests.get_mut(&request_id) {
            Some(r) if r.status == RequestStatus::Solved && !r.delivered => {
                r.delivered = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pending_requests(&self) -> Result<Vec<Request>, StoreError> {
        let tables = self.lock();
        let mut pending: Vec<Request> = tables
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::New && r.assigned_agent.is_none())
            .cloned()
            .collect();
        pending.sort_by_key(|r| (r.created_at, r.id));
        Ok(pending)
    }

    async fn available_agents(&self, fresh_since: Timestamp) -> Result<Vec<AgentStatus>, StoreError> {
        let tables = self.lock();
        let mut agents: Vec<AgentStatus> = tables
            .agents
            .values()
            .filter(|a| a.is_available && a.last_heartbeat >= fresh_since)
            .cloned()
            .collect();
        agents.sort_by(|a, b| {
            a.cpu_percent
                .total_cmp(&b.cpu_percent)
                .then(a.mem_percent.total_cmp(&b.mem_percent))
                .then_with(|| a.agent_name.cmp(&b.agent_name))
        });
        Ok(agents)
    }

    async fn active_prompt_templates(&self) -> Result<Vec<PromptTemplate>, StoreError> {
        Ok(self
            .lock()
            .templates
            .iter()
            .filter(|t| t.is_active && t.role == DISPATCH_ROLE)
            .cloned()
            .collect())
    }

    async fn active_models(&self) -> Result<Vec<ModelSpec>, StoreError> {
        Ok(self
            .lock()
            .models
            .values()
            .filter(|m| m.is_active)
            .cloned()
            .collect())
    }

    async fn assign_request(&self, assignment: &Assignment) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        if !tables.templates.iter().any(|t| t.id == assignment.prompt_id) {
            return Err(StoreError::Invariant(format!(
                "unknown prompt template {}",
                assignment.prompt_id
            )));
        }
        match tables.requests.get_mut(&assignment.request_id) {
            Some(r) if r.status == RequestStatus::New && r.assigned_agent.is_none() => {
                r.assigned_agent = Some(assignment.agent_name.clone());
                r.assigned_prompt = Some(assignment.prompt_id);
                r.model = Some(assignment.model.clone());
                r.status = RequestStatus::Queued;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_stale_agents_unavailable(&self, stale_before: Timestamp) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let mut flipped = 0;
        for agent in tables.agents.values_mut() {
            if agent.is_available && agent.last_heartbeat < stale_before {
                agent.is_available = false;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn next_claimable(&self, agent: &str, now: Timestamp) -> Result<Option<Request>, StoreError> {
        let tables = self.lock();
        Ok(tables
            .requests
            .values()
            .filter(|r| r.claimable_by(agent, now))
            .min_by_key(|r| (r.created_at, r.id))
            .cloned())
    }

    async fn latest_solved_for_user(&self, user_id: DbId) -> Result<Option<LatestSolved>, StoreError> {
        let tables = self.lock();
        Ok(tables
            .requests
            .values()
            .filter(|r| r.user_id == user_id && r.status == RequestStatus::Solved)
            .filter_map(|r| {
                r.dialog_id.as_ref().map(|dialog_id| (r.created_at, r.id, dialog_id))
            })
            .max()
            .map(|(created_at, _, dialog_id)| LatestSolved {
                dialog_id: dialog_id.clone(),
                created_at,
            }))
    }

    async fn claim_request(&self, claim: &Claim) -> Result<Option<Request>, StoreError> {
        let mut tables = self.lock();
        let Some(r) = tables.requests.get_mut(&claim.request_id) else {
            return Ok(None);
        };
        if !r.claimable_by(&claim.agent_name, claim.now) {
            return Ok(None);
        }
        r.status = RequestStatus::Progress;
        r.locked_by = Some(claim.agent_name.clone());
        r.locked_at = Some(claim.now);
        r.lease_expires_at = Some(claim.lease_until);
        r.assigned_agent = Some(claim.agent_name.clone());
        r.dialog_id = Some(claim.dialog_id.clone());
        r.started_at.get_or_insert(claim.now);
        Ok(Some(r.clone()))
    }

    async fn prompt_template(&self, id: DbId) -> Result<Option<PromptTemplate>, StoreError> {
        Ok(self.lock().templates.iter().find(|t| t.id == id).cloned())
    }

    async fn dialog_history(&self, dialog_id: &str) -> Result<Vec<Exchange>, StoreError> {
        let tables = self.lock();
        let mut solved: Vec<&Request> = tables
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::Solved && r.dialog_id.as_deref() == Some(dialog_id))
            .collect();
        solved.sort_by_key(|r| (r.created_at, r.id));
        Ok(solved
            .into_iter()
            .map(|r| Exchange {
                user_text: r.text.clone(),
                response: r.response.clone(),
            })
            .collect())
    }

    async fn complete_request(&self, completion: &Completion) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        match tables.requests.get_mut(&completion.request_id) {
            Some(r)
                if r.status == RequestStatus::Progress
                    && r.locked_by.as_deref() == Some(completion.agent_name.as_str()) =>
            {
                r.status = RequestStatus::Solved;
                r.response = Some(completion.response.clone());
                r.model = Some(completion.model.clone());
                r.finished_at = Some(completion.now);
                r.assigned_agent = Some(completion.agent_name.clone());
                r.lease_expires_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_request(
        &self,
        request_id: DbId,
        agent: &str,
        error: &str,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        match tables.requests.get_mut(&request_id) {
            Some(r) if r.status == RequestStatus::Progress && r.locked_by.as_deref() == Some(agent) => {
                r.status = RequestStatus::Error;
                r.error_message = Some(error.to_string());
                r.finished_at = Some(now);
                r.lease_expires_at = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_own_leases(&self, agent: &str, now: Timestamp) -> Result<u64, StoreError> {
        let mut tables = self.lock();
        let mut expired = 0;
        for r in tables.requests.values_mut() {
            if r.status == RequestStatus::Progress && r.locked_by.as_deref() == Some(agent) {
                r.lease_expires_at = Some(now);
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn upsert_agent_status(&self, status: &AgentStatusUpsert, now: Timestamp) -> Result<(), StoreError> {
        let mut tables = self.lock();
        let resources = &status.snapshot.resources;
        let (gpu_util_percent, gpu_mem_used_mb, gpu_mem_total_mb) = resources.gpu.to_columns();
        let row = AgentStatus {
            agent_name: status.agent_name.clone(),
            hostname: status.hostname.clone(),
            last_heartbeat: now,
            is_available: true,
            cpu_percent: resources.cpu_percent,
            mem_percent: resources.mem_percent,
            ram_total_mb: resources.ram_total_mb,
            gpu_util_percent,
            gpu_mem_used_mb,
            gpu_mem_total_mb,
            active_model: status.snapshot.active_model.clone(),
            installed_models: status.snapshot.installed_models.clone(),
            updated_at: now,
        };
        tables.agents.insert(row.agent_name.clone(), row);
        tables
            .heartbeat_writes
            .entry(status.agent_name.clone())
            .or_default()
            .full += 1;
        Ok(())
    }

    async fn touch_heartbeat(&self, agent: &str, now: Timestamp) -> Result<bool, StoreError> {
        let mut tables = self.lock();
        let Some(row) = tables.agents.get_mut(agent) else {
            return Ok(false);
        };
        row.last_heartbeat = now;
        row.is_available = true;
        tables.heartbeat_writes.entry(agent.to_string()).or_default().touch += 1;
        Ok(true)
    }

    async fn record_transition(&self, transition: &NewTransition, now: Timestamp) -> Result<(), StoreError> {
        push_transition(&mut self.lock(), transition, now)
    }
}
