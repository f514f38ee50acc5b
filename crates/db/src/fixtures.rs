//! Test support: in-memory pools with the schema applied and ready-made
//! rows. Compiled into the crate so downstream crates can reuse it from
//! their own tests.

use chrono::Utc;
use uuid::Uuid;

use calldeck_core::domain::agent::{Agent, AgentStatus, AssistantId};
use calldeck_core::domain::call::{CallId, CallLog, CallLogStatus, Segments, Transcript};

use crate::{connect_with_settings, migrations, DbPool};

/// Single-connection in-memory database with migrations applied.
pub async fn memory_pool() -> DbPool {
    let pool =
        connect_with_settings("sqlite::memory:", 1, 5).await.expect("in-memory pool connects");
    migrations::run_pending(&pool).await.expect("migrations apply");
    pool
}

pub async fn seed_agent(pool: &DbPool, id: &str, name: &str) -> Agent {
    let now = Utc::now();
    let agent = Agent {
        id: AssistantId(id.to_string()),
        name: name.to_string(),
        description: None,
        phone_number_id: format!("PN-{id}"),
        status: AgentStatus::Idle,
        minutes_today: 0,
        total_minutes_used: 0,
        created_at: now,
        updated_at: now,
    };
    crate::repositories::agent::insert(pool, &agent).await.expect("seed agent");
    agent
}

pub fn new_transcript(agent_id: &str, call_id: &str) -> Transcript {
    let now = Utc::now();
    Transcript {
        id: format!("TS-{}", Uuid::new_v4().simple()),
        call_id: CallId(call_id.to_string()),
        agent_id: AssistantId(agent_id.to_string()),
        started_at: now,
        ended_at: None,
        total_duration: None,
        segments: Segments::new(),
        created_at: now,
    }
}

pub fn new_call_log(agent_id: &str, call_id: &str) -> CallLog {
    let now = Utc::now();
    CallLog {
        id: format!("CL-{}", Uuid::new_v4().simple()),
        call_id: CallId(call_id.to_string()),
        agent_id: AssistantId(agent_id.to_string()),
        phone_number: Some("15550001111".to_string()),
        status: CallLogStatus::Started,
        started_at: Some(now),
        ended_at: None,
        duration: None,
        created_at: now,
    }
}
