//! Admin CRUD surface over registered agents.

use axum::extract::{FromRef, Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use calldeck_core::domain::agent::{Agent, AgentDraft, AgentPatch, AgentStatus, AssistantId};
use calldeck_core::domain::call::{CallId, Segments};
use calldeck_db::repositories::{agent, transcript, upload, RepositoryError};
use calldeck_db::DbPool;

use crate::auth::{AuthVerifier, CurrentUser};

#[derive(Clone)]
pub struct AgentsState {
    db_pool: DbPool,
    verifier: AuthVerifier,
}

impl FromRef<AgentsState> for AuthVerifier {
    fn from_ref(state: &AgentsState) -> Self {
        state.verifier.clone()
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptView {
    pub call_id: CallId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub segments: Segments,
    pub total_duration: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct UploadView {
    pub id: String,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub row_count: i64,
    pub processed: bool,
}

#[derive(Debug, Serialize)]
pub struct AgentView {
    pub id: AssistantId,
    pub name: String,
    pub description: Option<String>,
    pub phone_number_id: String,
    pub status: AgentStatus,
    pub minutes_today: i64,
    pub total_minutes_used: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub transcripts: Vec<TranscriptView>,
    pub csv_uploads: Vec<UploadView>,
}

#[derive(Debug, Serialize)]
pub struct AgentStatusView {
    pub agent_id: AssistantId,
    pub name: String,
    pub status: AgentStatus,
    pub minutes_today: i64,
    pub current_call_id: Option<CallId>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatusView {
    pub total_agents: usize,
    pub active_calls: usize,
    pub total_minutes_today: i64,
    pub last_updated: DateTime<Utc>,
}

type ApiFailure = (StatusCode, Json<ApiError>);

fn storage_error(error: RepositoryError) -> ApiFailure {
    error!(event_name = "agents.storage_error", error = %error, "agent storage error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError { error: "an internal storage error occurred".to_string() }),
    )
}

fn not_found() -> ApiFailure {
    (StatusCode::NOT_FOUND, Json(ApiError { error: "agent not found".to_string() }))
}

pub fn router(db_pool: DbPool, verifier: AuthVerifier) -> Router {
    Router::new()
        .route("/api/v1/agents", get(list_agents).post(create_agent))
        .route("/api/v1/agents/status/all", get(agents_status))
        .route("/api/v1/agents/{agent_id}", get(get_agent).put(update_agent))
        .route("/api/v1/system/status", get(system_status))
        .with_state(AgentsState { db_pool, verifier })
}

async fn agent_view(pool: &DbPool, agent: Agent) -> Result<AgentView, RepositoryError> {
    let transcripts = transcript::list_for_agent(pool, &agent.id)
        .await?
        .into_iter()
        .map(|row| TranscriptView {
            call_id: row.call_id,
            started_at: row.started_at,
            ended_at: row.ended_at,
            segments: row.segments,
            total_duration: row.total_duration,
        })
        .collect();

    let csv_uploads = upload::list_for_agent(pool, &agent.id)
        .await?
        .into_iter()
        .map(|row| UploadView {
            id: row.id,
            filename: row.filename,
            uploaded_at: row.uploaded_at,
            row_count: row.row_count,
            processed: row.processed,
        })
        .collect();

    Ok(AgentView {
        id: agent.id,
        name: agent.name,
        description: agent.description,
        phone_number_id: agent.phone_number_id,
        status: agent.status,
        minutes_today: agent.minutes_today,
        total_minutes_used: agent.total_minutes_used,
        created_at: agent.created_at,
        updated_at: agent.updated_at,
        transcripts,
        csv_uploads,
    })
}

async fn list_agents(
    State(state): State<AgentsState>,
    _user: CurrentUser,
) -> Result<Json<Vec<AgentView>>, ApiFailure> {
    let agents = agent::list(&state.db_pool).await.map_err(storage_error)?;
    let mut views = Vec::with_capacity(agents.len());
    for row in agents {
        views.push(agent_view(&state.db_pool, row).await.map_err(storage_error)?);
    }
    Ok(Json(views))
}

async fn get_agent(
    Path(agent_id): Path<String>,
    State(state): State<AgentsState>,
    _user: CurrentUser,
) -> Result<Json<AgentView>, ApiFailure> {
    let row = agent::find(&state.db_pool, &AssistantId(agent_id))
        .await
        .map_err(storage_error)?
        .ok_or_else(not_found)?;
    Ok(Json(agent_view(&state.db_pool, row).await.map_err(storage_error)?))
}

/// Insert a fresh agent record for the draft. Returns `None` when the
/// assistant id is already registered. Shared with the admin namespace.
pub(crate) async fn register_agent(
    pool: &DbPool,
    draft: AgentDraft,
) -> Result<Option<Agent>, RepositoryError> {
    let id = AssistantId(draft.assistant_id);
    if agent::find(pool, &id).await?.is_some() {
        return Ok(None);
    }

    let now = Utc::now();
    let row = Agent {
        id,
        name: draft.name,
        description: draft.description,
        phone_number_id: draft.phone_number_id,
        status: AgentStatus::Idle,
        minutes_today: 0,
        total_minutes_used: 0,
        created_at: now,
        updated_at: now,
    };
    agent::insert(pool, &row).await?;
    info!(event_name = "agents.registered", agent_id = %row.id, "agent registered");
    Ok(Some(row))
}

async fn create_agent(
    State(state): State<AgentsState>,
    _user: CurrentUser,
    Json(draft): Json<AgentDraft>,
) -> Result<Json<AgentView>, ApiFailure> {
    let created = register_agent(&state.db_pool, draft).await.map_err(storage_error)?;
    let Some(created) = created else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError { error: "agent with this assistant id already exists".to_string() }),
        ));
    };
    Ok(Json(agent_view(&state.db_pool, created).await.map_err(storage_error)?))
}

async fn update_agent(
    Path(agent_id): Path<String>,
    State(state): State<AgentsState>,
    _user: CurrentUser,
    Json(patch): Json<AgentPatch>,
) -> Result<Json<AgentView>, ApiFailure> {
    let mut conn = state.db_pool.acquire().await.map_err(|error| {
        storage_error(RepositoryError::Database(error))
    })?;
    let updated = agent::update(&mut conn, &AssistantId(agent_id), &patch, Utc::now())
        .await
        .map_err(storage_error)?
        .ok_or_else(not_found)?;
    drop(conn);
    Ok(Json(agent_view(&state.db_pool, updated).await.map_err(storage_error)?))
}

async fn agents_status(
    State(state): State<AgentsState>,
    _user: CurrentUser,
) -> Result<Json<Vec<AgentStatusView>>, ApiFailure> {
    let agents = agent::list(&state.db_pool).await.map_err(storage_error)?;
    let mut views = Vec::with_capacity(agents.len());

    for row in agents {
        let mut current_call_id = None;
        let mut last_activity = row.updated_at;
        if row.status == AgentStatus::Calling {
            if let Some((call_id, started_at)) =
                transcript::latest_open_call(&state.db_pool, &row.id)
                    .await
                    .map_err(storage_error)?
            {
                current_call_id = Some(call_id);
                last_activity = started_at;
            }
        }
        views.push(AgentStatusView {
            agent_id: row.id,
            name: row.name,
            status: row.status,
            minutes_today: row.minutes_today,
            current_call_id,
            last_activity,
        });
    }

    Ok(Json(views))
}

async fn system_status(
    State(state): State<AgentsState>,
    _user: CurrentUser,
) -> Result<Json<SystemStatusView>, ApiFailure> {
    let agents = agent::list(&state.db_pool).await.map_err(storage_error)?;
    let active_calls =
        agents.iter().filter(|agent| agent.status == AgentStatus::Calling).count();
    let total_minutes_today = agents.iter().map(|agent| agent.minutes_today).sum();

    Ok(Json(SystemStatusView {
        total_agents: agents.len(),
        active_calls,
        total_minutes_today,
        last_updated: Utc::now(),
    }))
}
