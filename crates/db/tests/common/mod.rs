#![allow(dead_code)]

use chrono::Utc;
use relay_core::heartbeat::HeartbeatSnapshot;
use relay_core::resources::{GpuSnapshot, ResourceSnapshot};
use relay_core::types::Timestamp;
use relay_db::models::agent_status::AgentStatusUpsert;
use relay_db::models::prompt_template::CreatePromptTemplate;
use relay_db::models::request::{Assignment, NewRequest, Request};
use relay_db::{MemoryStore, SharedStore};

pub fn new_request(user_id: i64, text: &str) -> NewRequest {
    NewRequest {
        user_id,
        text: text.to_string(),
        dialog_id: None,
    }
}

pub fn agent_upsert(name: &str, cpu: f64, mem: f64) -> AgentStatusUpsert {
    AgentStatusUpsert {
        agent_name: name.to_string(),
        hostname: format!("{name}.local"),
        snapshot: HeartbeatSnapshot {
            resources: ResourceSnapshot {
                cpu_percent: cpu,
                mem_percent: mem,
                ram_total_mb: Some(16_000),
                gpu: GpuSnapshot::Unavailable,
            },
            active_model: None,
            installed_models: Vec::new(),
        },
    }
}

pub fn template(name: &str) -> CreatePromptTemplate {
    CreatePromptTemplate {
        name: name.to_string(),
        role: None,
        tags: String::new(),
        content: format!("You are the {name} assistant."),
        preferred_model: Some("llama3:8b".to_string()),
        is_active: None,
    }
}

/// Submit a request and queue it for `agent`.
pub async fn queued_request(store: &MemoryStore, agent: &str, created_at: Timestamp) -> Request {
    let prompt = store.insert_prompt_template(template("general"));
    let request = store
        .submit_request(&new_request(1, "Hallo"), created_at)
        .await
        .unwrap();
    let assigned = store
        .assign_request(&Assignment {
            request_id: request.id,
            agent_name: agent.to_string(),
            prompt_id: prompt.id,
            model: "llama3:8b".to_string(),
        })
        .await
        .unwrap();
    assert!(assigned);
    store.request(request.id).unwrap()
}

pub fn now() -> Timestamp {
    Utc::now()
}
