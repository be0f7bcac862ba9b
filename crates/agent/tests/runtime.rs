mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Utc;
use relay_agent::config::AgentConfig;
use relay_agent::inference::InferenceError;
use relay_agent::runtime::{AgentRuntime, JobOutcome};
use relay_core::chat::{ChatMessage, ChatRole, INFERENCE_FAILURE_SENTINEL};
use relay_core::status::{is_forward_path, RequestStatus};
use relay_db::models::request::Claim;
use relay_db::{MemoryStore, SharedStore};
use tokio_util::sync::CancellationToken;

use common::{queue, runtime, template, ScriptedEngine, AGENT};

fn minutes_ago(minutes: i64) -> chrono::DateTime<Utc> {
    Utc::now() - chrono::Duration::minutes(minutes)
}

#[tokio::test]
async fn claimed_request_is_solved_with_its_model() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::replying(&["Die Antwort ist 42."]));
    let prompt = template(&store, "Du bist ein hilfreicher Assistent.");
    let request = queue(&store, 1, "Was ist die Antwort?", None, prompt, Utc::now()).await;

    let runtime = runtime(&store, &engine);
    let claimed = runtime.claim_next(Utc::now()).await.unwrap().unwrap();
    assert_eq!(claimed.id, request.id);
    assert_eq!(claimed.status, RequestStatus::Progress);
    assert_eq!(claimed.locked_by.as_deref(), Some(AGENT));
    assert!(claimed.lease_expires_at.is_some());

    assert_eq!(runtime.execute(claimed).await.unwrap(), JobOutcome::Solved);

    let stored = store.request(request.id).unwrap();
    assert_eq!(stored.status, RequestStatus::Solved);
    assert_eq!(stored.response.as_deref(), Some("Die Antwort ist 42."));
    assert_eq!(stored.model.as_deref(), Some("llama3:8b"));
    assert!(stored.finished_at.is_some());

    let calls = engine.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "llama3:8b");
    assert_eq!(
        calls[0].1,
        vec![
            ChatMessage::new(ChatRole::System, "Du bist ein hilfreicher Assistent."),
            ChatMessage::new(ChatRole::User, "Was ist die Antwort?"),
        ]
    );
}

#[tokio::test]
async fn nothing_to_claim_for_other_agents_work() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let prompt = template(&store, "x");
    queue(&store, 1, "Hallo", None, prompt, Utc::now()).await;

    let other = AgentRuntime::new(Arc::clone(&store), Arc::clone(&engine), AgentConfig::named("agent-02"));
    assert!(other.claim_next(Utc::now()).await.unwrap().is_none());
}

#[tokio::test]
async fn inference_failure_still_solves_with_sentinel() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    engine.push(Err(InferenceError::Timeout(Duration::from_secs(300))));
    let prompt = template(&store, "x");
    let request = queue(&store, 1, "Hallo", None, prompt, Utc::now()).await;

    let runtime = runtime(&store, &engine);
    let claimed = runtime.claim_next(Utc::now()).await.unwrap().unwrap();
    assert_eq!(runtime.execute(claimed).await.unwrap(), JobOutcome::SolvedWithSentinel);

    let stored = store.request(request.id).unwrap();
    assert_eq!(stored.status, RequestStatus::Solved);
    assert_eq!(stored.response.as_deref(), Some(INFERENCE_FAILURE_SENTINEL));
}

#[tokio::test]
async fn requests_ten_minutes_apart_share_a_dialog() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::replying(&["Erste Antwort", "Zweite Antwort"]));
    let prompt = template(&store, "");
    let runtime = runtime(&store, &engine);

    let first = queue(&store, 7, "Erste Frage", None, prompt, minutes_ago(10)).await;
    let claimed = runtime.claim_next(Utc::now()).await.unwrap().unwrap();
    runtime.execute(claimed).await.unwrap();

    let second = queue(&store, 7, "Zweite Frage", None, prompt, Utc::now()).await;
    let claimed = runtime.claim_next(Utc::now()).await.unwrap().unwrap();
    assert_eq!(claimed.id, second.id);
    runtime.execute(claimed).await.unwrap();

    let first = store.request(first.id).unwrap();
    let second = store.request(second.id).unwrap();
    assert!(first.dialog_id.is_some());
    assert_eq!(first.dialog_id, second.dialog_id);

    // The second call carries the first exchange as history.
    let calls = engine.calls();
    let roles: Vec<ChatRole> = calls[1].1.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant, ChatRole::User]);
    assert_eq!(calls[1].1[1].content, "Erste Antwort");
}

#[tokio::test]
async fn requests_twenty_minutes_apart_start_a_new_dialog() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let prompt = template(&store, "");
    let runtime = runtime(&store, &engine);

    let first = queue(&store, 7, "Alt", None, prompt, minutes_ago(20)).await;
    let claimed = runtime.claim_next(Utc::now()).await.unwrap().unwrap();
    runtime.execute(claimed).await.unwrap();

    let second = queue(&store, 7, "Neu", None, prompt, Utc::now()).await;
    let claimed = runtime.claim_next(Utc::now()).await.unwrap().unwrap();
    runtime.execute(claimed).await.unwrap();

    let first = store.request(first.id).unwrap();
    let second = store.request(second.id).unwrap();
    assert_ne!(first.dialog_id, second.dialog_id);
    assert_eq!(engine.calls()[1].1.len(), 1);
}

#[tokio::test]
async fn other_users_dialogs_are_never_joined() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let prompt = template(&store, "");
    let runtime = runtime(&store, &engine);

    let mine = queue(&store, 1, "A", None, prompt, minutes_ago(1)).await;
    let claimed = runtime.claim_next(Utc::now()).await.unwrap().unwrap();
    runtime.execute(claimed).await.unwrap();

    let theirs = queue(&store, 2, "B", None, prompt, Utc::now()).await;
    let claimed = runtime.claim_next(Utc::now()).await.unwrap().unwrap();
    runtime.execute(claimed).await.unwrap();

    assert_ne!(store.request(mine.id).unwrap().dialog_id, store.request(theirs.id).unwrap().dialog_id);
}

#[tokio::test]
async fn dialog_id_from_the_front_end_is_kept() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let prompt = template(&store, "");
    let request = queue(&store, 1, "Hallo", Some("chat-123"), prompt, Utc::now()).await;

    let claimed = runtime(&store, &engine).claim_next(Utc::now()).await.unwrap().unwrap();
    assert_eq!(claimed.id, request.id);
    assert_eq!(claimed.dialog_id.as_deref(), Some("chat-123"));
}

#[tokio::test]
async fn system_prompt_can_be_disabled() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let prompt = template(&store, "Sei knapp.");
    queue(&store, 1, "Hallo", None, prompt, Utc::now()).await;

    let config = AgentConfig {
        system_prompt: false,
        ..AgentConfig::named(AGENT)
    };
    let runtime = AgentRuntime::new(Arc::clone(&store), Arc::clone(&engine), config);
    let claimed = runtime.claim_next(Utc::now()).await.unwrap().unwrap();
    runtime.execute(claimed).await.unwrap();

    assert_eq!(engine.calls()[0].1, vec![ChatMessage::new(ChatRole::User, "Hallo")]);
}

#[tokio::test]
async fn transitions_only_move_forward() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let prompt = template(&store, "");
    let request = queue(&store, 1, "Hallo", None, prompt, Utc::now()).await;

    let runtime = runtime(&store, &engine);
    let claimed = runtime.claim_next(Utc::now()).await.unwrap().unwrap();
    runtime.execute(claimed).await.unwrap();

    let observed: Vec<RequestStatus> = store
        .transitions_for(request.id)
        .iter()
        .map(|t| t.to().unwrap())
        .collect();
    // The queued transition is recorded by the dispatcher, not by `queue`.
    assert_eq!(observed, vec![RequestStatus::New, RequestStatus::Progress, RequestStatus::Solved]);
    assert!(is_forward_path(&observed));
}

#[tokio::test]
async fn missing_model_moves_request_to_error() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let prompt = template(&store, "");
    let request = queue(&store, 1, "Hallo", None, prompt, Utc::now()).await;

    let runtime = runtime(&store, &engine);
    let mut claimed = runtime.claim_next(Utc::now()).await.unwrap().unwrap();
    claimed.model = None;

    assert_matches!(runtime.execute(claimed).await.unwrap(), JobOutcome::Failed(_));
    let stored = store.request(request.id).unwrap();
    assert_eq!(stored.status, RequestStatus::Error);
    assert!(stored.error_message.is_some());
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn expired_lease_is_picked_up_and_stale_result_dropped() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::replying(&["from agent-02"]));
    let prompt = template(&store, "");
    let request = queue(&store, 1, "Hallo", None, prompt, Utc::now()).await;

    // agent-01 claims with a lease that has already run out.
    let past = minutes_ago(30);
    let stale = store
        .claim_request(&Claim {
            request_id: request.id,
            agent_name: AGENT.to_string(),
            dialog_id: "d".to_string(),
            now: past,
            lease_until: past + chrono::Duration::minutes(10),
        })
        .await
        .unwrap()
        .unwrap();

    let rescuer = AgentRuntime::new(Arc::clone(&store), Arc::clone(&engine), AgentConfig::named("agent-02"));
    let reclaimed = rescuer.claim_next(Utc::now()).await.unwrap().unwrap();
    assert_eq!(reclaimed.locked_by.as_deref(), Some("agent-02"));
    assert_eq!(reclaimed.dialog_id.as_deref(), Some("d"));
    assert_eq!(rescuer.execute(reclaimed).await.unwrap(), JobOutcome::Solved);

    let first_holder = runtime(&store, &engine);
    assert_eq!(first_holder.execute(stale).await.unwrap(), JobOutcome::LostLease);
    assert_eq!(store.request(request.id).unwrap().response.as_deref(), Some("from agent-02"));
}

#[tokio::test]
async fn run_loop_resumes_own_work_and_drains_on_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(ScriptedEngine::default());
    let prompt = template(&store, "");
    let request = queue(&store, 1, "Hallo", None, prompt, Utc::now()).await;

    // A previous run of this agent crashed while holding a fresh lease.
    let now = Utc::now();
    store
        .claim_request(&Claim {
            request_id: request.id,
            agent_name: AGENT.to_string(),
            dialog_id: "d".to_string(),
            now,
            lease_until: now + chrono::Duration::minutes(10),
        })
        .await
        .unwrap()
        .unwrap();

    let config = AgentConfig {
        poll_interval: Duration::from_millis(20),
        ..AgentConfig::named(AGENT)
    };
    let runtime = Arc::new(AgentRuntime::new(Arc::clone(&store), Arc::clone(&engine), config));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Arc::clone(&runtime).run(cancel.clone()));

    let solved = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.request(request.id).unwrap().status == RequestStatus::Solved {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    cancel.cancel();
    handle.await.unwrap();

    assert!(solved.is_ok(), "request was not resumed");
}
