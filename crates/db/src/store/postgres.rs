//! [`SharedStore`] over PostgreSQL.

use async_trait::async_trait;
use relay_core::chat::Exchange;
use relay_core::dialog::LatestSolved;
use relay_core::status::RequestStatus;
use relay_core::types::{DbId, Timestamp};

use crate::models::agent_status::{AgentStatus, AgentStatusUpsert};
use crate::models::model_spec::ModelSpec;
use crate::models::prompt_template::{PromptTemplate, DISPATCH_ROLE};
use crate::models::request::{Assignment, Claim, Completion, NewRequest, Request};
use crate::models::transition::NewTransition;
use crate::repositories::{
    AgentStatusRepo, ModelSpecRepo, PromptTemplateRepo, RequestRepo, TransitionRepo,
};
use crate::store::SharedStore;
use crate::{DbPool, StoreError};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SharedStore for PgStore {
    async fn submit_request(&self, input: &NewRequest, now: Timestamp) -> Result<Request, StoreError> {
        let request = RequestRepo::submit(&self.pool, input, now).await?;
        let initial = NewTransition {
            request_id: request.id,
            from_status: None,
            to_status: RequestStatus::New,
            agent_name: None,
            detail: None,
        };
        TransitionRepo::record(&self.pool, &initial, now).await?;
        Ok(request)
    }

    async fn undelivered_responses(&self, limit: i64) -> Result<Vec<Request>, StoreError> {
        Ok(RequestRepo::list_undelivered(&self.pool, limit).await?)
    }

    async fn mark_delivered(&self, request_id: DbId) -> Result<bool, StoreError> {
        Ok(RequestRepo::mark_delivered(&self.pool, request_id).await?)
    }

    async fn pending_requests(&self) -> Result<Vec<Request>, StoreError> {
        Ok(RequestRepo::list_pending(&self.pool).await?)
    }

    async fn available_agents(&self, fresh_since: Timestamp) -> Result<Vec<AgentStatus>, StoreError> {
        Ok(AgentStatusRepo::list_available(&self.pool, fresh_since).await?)
    }

    async fn active_prompt_templates(&self) -> Result<Vec<PromptTemplate>, StoreError> {
        Ok(PromptTemplateRepo::list_active(&self.pool, DISPATCH_ROLE).await?)
    }

    async fn active_models(&self) -> Result<Vec<ModelSpec>, StoreError> {
        Ok(ModelSpecRepo::list_active(&self.pool).await?)
    }

    async fn assign_request(&self, assignment: &Assignment) -> Result<bool, StoreError> {
        Ok(RequestRepo::assign(&self.pool, assignment).await?)
    }

    async fn mark_stale_agents_unavailable(&self, stale_before: Timestamp) -> Result<u64, StoreError> {
        Ok(AgentStatusRepo::mark_stale_unavailable(&self.pool, stale_before).await?)
    }

    async fn next_claimable(&self, agent: &str, now: Timestamp) -> Result<Option<Request>, StoreError> {
        Ok(RequestRepo::next_claimable(&self.pool, agent, now).await?)
    }

    async fn latest_solved_for_user(&self, user_id: DbId) -> Result<Option<LatestSolved>, StoreError> {
        let latest = RequestRepo::latest_solved_for_user(&self.pool, user_id).await?;
        Ok(latest.map(|(dialog_id, created_at)| LatestSolved {
            dialog_id,
            created_at,
        }))
    }

    async fn claim_request(&self, claim: &Claim) -> Result<Option<Request>, StoreError> {
        Ok(RequestRepo::claim(&self.pool, claim).await?)
    }

    async fn prompt_template(&self, id: DbId) -> Result<Option<PromptTemplate>, StoreError> {
        Ok(PromptTemplateRepo::find_by_id(&self.pool, id).await?)
    }

    async fn dialog_history(&self, dialog_id: &str) -> Result<Vec<Exchange>, StoreError> {
        let rows = RequestRepo::dialog_exchanges(&self.pool, dialog_id).await?;
        Ok(rows
            .into_iter()
            .map(|(user_text, response)| Exchange { user_text, response })
            .collect())
    }

    async fn complete_request(&self, completion: &Completion) -> Result<bool, StoreError> {
        Ok(RequestRepo::complete(&self.pool, completion).await?)
    }

    async fn fail_request(
        &self,
        request_id: DbId,
        agent: &str,
        error: &str,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        Ok(RequestRepo::fail(&self.pool, request_id, agent, error, now).await?)
    }

    async fn expire_own_leases(&self, agent: &str, now: Timestamp) -> Result<u64, StoreError> {
        Ok(RequestRepo::expire_leases_held_by(&self.pool, agent, now).await?)
    }

    async fn upsert_agent_status(&self, status: &AgentStatusUpsert, now: Timestamp) -> Result<(), StoreError> {
        AgentStatusRepo::upsert(&self.pool, status, now).await?;
        Ok(())
    }

    async fn touch_heartbeat(&self, agent: &str, now: Timestamp) -> Result<bool, StoreError> {
        Ok(AgentStatusRepo::touch(&self.pool, agent, now).await?)
    }

    async fn record_transition(&self, transition: &NewTransition, now: Timestamp) -> Result<(), StoreError> {
        transition.check_edge()?;
        TransitionRepo::record(&self.pool, transition, now).await?;
        Ok(())
    }
}
