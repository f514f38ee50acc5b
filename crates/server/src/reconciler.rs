//! Applies provider events to durable agent/call state.
//!
//! Each event is processed inside a single transaction: the agent status
//! write, the transcript write and the call-log write for one event either
//! all land or all roll back. Events referencing agents or transcripts this
//! backend does not know are skipped silently; the provider routinely sends
//! events for assistants that were never registered here.
//!
//! Minute counters are credited with a single SQL increment rather than a
//! read-then-write, so two concurrent `call.ended` deliveries for the same
//! agent cannot lose an update. Redelivery of the same event is NOT
//! deduplicated: a replayed `call.ended` double-counts, and a replayed
//! `call.started` fails on the transcript's unique call id.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use calldeck_core::domain::agent::{AgentStatus, AssistantId};
use calldeck_core::domain::call::{
    CallId, CallLog, CallLogStatus, Segments, Speaker, Transcript, TranscriptSegment,
};
use calldeck_core::domain::event::ProviderEvent;
use calldeck_db::repositories::{agent, call_log, transcript, RepositoryError};
use calldeck_db::DbPool;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("storage failure while applying event: {0}")]
    Storage(#[from] RepositoryError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The event's transitions were written.
    Applied,
    /// The referenced agent or transcript is unknown; nothing was written.
    Skipped,
    /// The event type is not one this backend tracks.
    Ignored,
}

#[derive(Clone)]
pub struct EventReconciler {
    pool: DbPool,
}

impl EventReconciler {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn apply(&self, event: ProviderEvent) -> Result<Outcome, ReconcileError> {
        let kind = event.kind();
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let outcome = match event {
            ProviderEvent::CallStarted { call_id, agent_id, phone_number_id, started_at } => {
                call_started(&mut tx, call_id, agent_id, phone_number_id, started_at).await?
            }
            ProviderEvent::CallEnded { call_id, agent_id, ended_at, duration_seconds } => {
                call_ended(&mut tx, call_id, agent_id, ended_at, duration_seconds).await?
            }
            ProviderEvent::TranscriptUpdate { call_id, timestamp, speaker, content } => {
                transcript_update(&mut tx, call_id, timestamp, speaker, content).await?
            }
            ProviderEvent::AgentStatusUpdate { agent_id, provider_status } => {
                agent_status_update(&mut tx, agent_id, &provider_status).await?
            }
            ProviderEvent::Unknown { .. } => Outcome::Ignored,
        };

        tx.commit().await.map_err(RepositoryError::from)?;

        match outcome {
            Outcome::Applied => {
                info!(event_name = "webhook.event_applied", event_kind = kind, "event applied")
            }
            Outcome::Skipped => debug!(
                event_name = "webhook.event_skipped",
                event_kind = kind,
                "event referenced unknown state"
            ),
            Outcome::Ignored => {
                debug!(event_name = "webhook.event_ignored", event_kind = kind, "event ignored")
            }
        }
        Ok(outcome)
    }
}

async fn call_started(
    conn: &mut SqliteConnection,
    call_id: CallId,
    agent_id: AssistantId,
    phone_number_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
) -> Result<Outcome, ReconcileError> {
    if agent::find(&mut *conn, &agent_id).await?.is_none() {
        return Ok(Outcome::Skipped);
    }

    let now = Utc::now();
    let started_at = started_at.unwrap_or(now);

    agent::set_status(&mut *conn, &agent_id, AgentStatus::Calling, now).await?;
    transcript::create(
        &mut *conn,
        &Transcript {
            id: format!("TS-{}", Uuid::new_v4().simple()),
            call_id: call_id.clone(),
            agent_id: agent_id.clone(),
            started_at,
            ended_at: None,
            total_duration: None,
            segments: Segments::new(),
            created_at: now,
        },
    )
    .await?;
    call_log::create(
        &mut *conn,
        &CallLog {
            id: format!("CL-{}", Uuid::new_v4().simple()),
            call_id,
            agent_id,
            phone_number: phone_number_id,
            status: CallLogStatus::Started,
            started_at: Some(started_at),
            ended_at: None,
            duration: None,
            created_at: now,
        },
    )
    .await?;

    Ok(Outcome::Applied)
}

async fn call_ended(
    conn: &mut SqliteConnection,
    call_id: CallId,
    agent_id: AssistantId,
    ended_at: Option<DateTime<Utc>>,
    duration_seconds: Option<i64>,
) -> Result<Outcome, ReconcileError> {
    if agent::find(&mut *conn, &agent_id).await?.is_none() {
        return Ok(Outcome::Skipped);
    }

    let now = Utc::now();
    let minutes = duration_seconds.unwrap_or(0).max(0) / 60;

    agent::set_status(&mut *conn, &agent_id, AgentStatus::Idle, now).await?;
    agent::add_minutes(&mut *conn, &agent_id, minutes, now).await?;

    // The transcript and call log may be missing when the start event was
    // never delivered; their absence does not fail the event.
    let ended_at = ended_at.unwrap_or(now);
    transcript::finalize(&mut *conn, &call_id, ended_at, duration_seconds).await?;
    call_log::finalize(&mut *conn, &call_id, ended_at, duration_seconds).await?;

    Ok(Outcome::Applied)
}

async fn transcript_update(
    conn: &mut SqliteConnection,
    call_id: CallId,
    timestamp: DateTime<Utc>,
    speaker: Speaker,
    content: String,
) -> Result<Outcome, ReconcileError> {
    let segment = TranscriptSegment { timestamp, speaker, content };
    let appended = transcript::append_segment(conn, &call_id, segment).await?;
    Ok(if appended { Outcome::Applied } else { Outcome::Skipped })
}

async fn agent_status_update(
    conn: &mut SqliteConnection,
    agent_id: AssistantId,
    provider_status: &str,
) -> Result<Outcome, ReconcileError> {
    if agent::find(&mut *conn, &agent_id).await?.is_none() {
        return Ok(Outcome::Skipped);
    }
    let status = AgentStatus::from_provider_label(provider_status);
    agent::set_status(&mut *conn, &agent_id, status, Utc::now()).await?;
    Ok(Outcome::Applied)
}

#[cfg(test)]
mod tests {
    use calldeck_core::domain::agent::{AgentStatus, AssistantId};
    use calldeck_core::domain::call::{CallId, CallLogStatus, Speaker};
    use calldeck_core::domain::event::{ProviderEvent, WebhookEnvelope};
    use calldeck_db::fixtures::{memory_pool, seed_agent};
    use calldeck_db::repositories::{agent, call_log, transcript};
    use calldeck_db::DbPool;
    use chrono::Utc;

    use super::{EventReconciler, Outcome};

    fn call_started(call_id: &str, agent_id: &str) -> ProviderEvent {
        ProviderEvent::CallStarted {
            call_id: CallId(call_id.to_string()),
            agent_id: AssistantId(agent_id.to_string()),
            phone_number_id: Some("PN-1".to_string()),
            started_at: None,
        }
    }

    fn call_ended(call_id: &str, agent_id: &str, duration: Option<i64>) -> ProviderEvent {
        ProviderEvent::CallEnded {
            call_id: CallId(call_id.to_string()),
            agent_id: AssistantId(agent_id.to_string()),
            ended_at: None,
            duration_seconds: duration,
        }
    }

    fn transcript_update(call_id: &str, speaker: Speaker, content: &str) -> ProviderEvent {
        ProviderEvent::TranscriptUpdate {
            call_id: CallId(call_id.to_string()),
            timestamp: Utc::now(),
            speaker,
            content: content.to_string(),
        }
    }

    async fn agent_snapshot(pool: &DbPool, id: &str) -> calldeck_core::domain::agent::Agent {
        agent::find(pool, &AssistantId(id.to_string())).await.expect("find").expect("agent")
    }

    #[tokio::test]
    async fn call_started_sets_calling_and_creates_an_empty_transcript() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        let reconciler = EventReconciler::new(pool.clone());

        let outcome = reconciler.apply(call_started("C1", "A1")).await.expect("apply");
        assert_eq!(outcome, Outcome::Applied);

        assert_eq!(agent_snapshot(&pool, "A1").await.status, AgentStatus::Calling);

        let created = transcript::find_by_call_id(&pool, &CallId("C1".to_string()))
            .await
            .expect("find")
            .expect("transcript exists");
        assert!(created.segments.is_empty());
        assert!(created.ended_at.is_none());

        let log = call_log::find_by_call_id(&pool, &CallId("C1".to_string()))
            .await
            .expect("find")
            .expect("call log exists");
        assert_eq!(log.status, CallLogStatus::Started);
        assert_eq!(log.phone_number.as_deref(), Some("PN-1"));
    }

    #[tokio::test]
    async fn call_started_for_an_unregistered_agent_is_skipped() {
        let pool = memory_pool().await;
        let reconciler = EventReconciler::new(pool.clone());

        let outcome = reconciler.apply(call_started("C1", "A-unknown")).await.expect("apply");
        assert_eq!(outcome, Outcome::Skipped);

        let missing =
            transcript::find_by_call_id(&pool, &CallId("C1".to_string())).await.expect("find");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn call_ended_credits_floored_minutes_and_returns_the_agent_to_idle() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        let reconciler = EventReconciler::new(pool.clone());

        reconciler.apply(call_started("C1", "A1")).await.expect("start");
        let outcome =
            reconciler.apply(call_ended("C1", "A1", Some(125))).await.expect("apply");
        assert_eq!(outcome, Outcome::Applied);

        let snapshot = agent_snapshot(&pool, "A1").await;
        assert_eq!(snapshot.status, AgentStatus::Idle);
        assert_eq!(snapshot.minutes_today, 2, "125s floors to 2 minutes");
        assert_eq!(snapshot.total_minutes_used, 2);

        let finished = transcript::find_by_call_id(&pool, &CallId("C1".to_string()))
            .await
            .expect("find")
            .expect("transcript");
        assert_eq!(finished.total_duration, Some(125));
        assert!(finished.ended_at.is_some());

        let log = call_log::find_by_call_id(&pool, &CallId("C1".to_string()))
            .await
            .expect("find")
            .expect("call log");
        assert_eq!(log.status, CallLogStatus::Ended);
        assert_eq!(log.duration, Some(125));
    }

    #[tokio::test]
    async fn call_ended_without_duration_credits_nothing() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        let reconciler = EventReconciler::new(pool.clone());

        reconciler.apply(call_started("C1", "A1")).await.expect("start");
        reconciler.apply(call_ended("C1", "A1", None)).await.expect("end");

        let snapshot = agent_snapshot(&pool, "A1").await;
        assert_eq!(snapshot.minutes_today, 0);
        assert_eq!(snapshot.status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn call_ended_without_a_transcript_still_updates_the_agent() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        let reconciler = EventReconciler::new(pool.clone());

        let outcome =
            reconciler.apply(call_ended("C-never-started", "A1", Some(300))).await.expect("apply");
        assert_eq!(outcome, Outcome::Applied);

        let snapshot = agent_snapshot(&pool, "A1").await;
        assert_eq!(snapshot.minutes_today, 5);
        assert_eq!(snapshot.status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn transcript_updates_append_in_arrival_order() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        let reconciler = EventReconciler::new(pool.clone());

        reconciler.apply(call_started("C1", "A1")).await.expect("start");
        reconciler
            .apply(transcript_update("C1", Speaker::User, "hi"))
            .await
            .expect("first update");
        reconciler
            .apply(transcript_update("C1", Speaker::User, "there"))
            .await
            .expect("second update");

        let updated = transcript::find_by_call_id(&pool, &CallId("C1".to_string()))
            .await
            .expect("find")
            .expect("transcript");
        let contents: Vec<&str> = updated.segments.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "there"]);
        assert!(updated.segments.iter().all(|s| s.speaker == Speaker::User));
    }

    #[tokio::test]
    async fn transcript_update_for_an_unknown_call_changes_nothing() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        let reconciler = EventReconciler::new(pool.clone());

        let outcome = reconciler
            .apply(transcript_update("C-unknown", Speaker::Assistant, "hello"))
            .await
            .expect("apply");
        assert_eq!(outcome, Outcome::Skipped);

        assert_eq!(transcript::count_all(&pool).await.expect("count"), 0);
        assert_eq!(agent_snapshot(&pool, "A1").await.status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn unrecognized_provider_status_maps_to_idle() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        agent::set_status(&pool, &AssistantId("A1".to_string()), AgentStatus::Offline, Utc::now())
            .await
            .expect("prime status");
        let reconciler = EventReconciler::new(pool.clone());

        let outcome = reconciler
            .apply(ProviderEvent::AgentStatusUpdate {
                agent_id: AssistantId("A1".to_string()),
                provider_status: "bogus".to_string(),
            })
            .await
            .expect("apply");
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(agent_snapshot(&pool, "A1").await.status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn ping_events_report_success_and_mutate_nothing() {
        let pool = memory_pool().await;
        let seeded = seed_agent(&pool, "A1", "agent").await;
        let reconciler = EventReconciler::new(pool.clone());

        let envelope: WebhookEnvelope =
            serde_json::from_str(r#"{"event_type": "ping"}"#).expect("envelope");
        let outcome = reconciler.apply(envelope.into()).await.expect("apply");
        assert_eq!(outcome, Outcome::Ignored);

        assert_eq!(agent_snapshot(&pool, "A1").await, seeded);
    }

    #[tokio::test]
    async fn redelivered_call_started_surfaces_a_storage_failure() {
        // No dedup by call id: the transcript's unique constraint trips and
        // the second delivery rolls back without touching the first.
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        let reconciler = EventReconciler::new(pool.clone());

        reconciler.apply(call_started("C1", "A1")).await.expect("first delivery");
        let redelivery = reconciler.apply(call_started("C1", "A1")).await;
        assert!(redelivery.is_err());

        let kept = transcript::find_by_call_id(&pool, &CallId("C1".to_string()))
            .await
            .expect("find")
            .expect("original transcript survives");
        assert!(kept.segments.is_empty());
    }

    #[tokio::test]
    async fn full_call_lifecycle_scenario() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        let id = AssistantId("A1".to_string());
        agent::add_minutes(&pool, &id, 10, Utc::now()).await.expect("prime counters");
        let reconciler = EventReconciler::new(pool.clone());

        reconciler.apply(call_started("C1", "A1")).await.expect("start");
        assert_eq!(agent_snapshot(&pool, "A1").await.status, AgentStatus::Calling);

        reconciler
            .apply(transcript_update("C1", Speaker::Assistant, "hello"))
            .await
            .expect("segment");
        let transcript_row = transcript::find_by_call_id(&pool, &CallId("C1".to_string()))
            .await
            .expect("find")
            .expect("transcript");
        assert_eq!(transcript_row.segments.len(), 1);

        reconciler.apply(call_ended("C1", "A1", Some(90))).await.expect("end");

        let snapshot = agent_snapshot(&pool, "A1").await;
        assert_eq!(snapshot.status, AgentStatus::Idle);
        assert_eq!(snapshot.minutes_today, 11);
        assert_eq!(snapshot.total_minutes_used, 11);

        let finished = transcript::find_by_call_id(&pool, &CallId("C1".to_string()))
            .await
            .expect("find")
            .expect("transcript");
        assert_eq!(finished.total_duration, Some(90));
    }
}
