//! Owner tooling: daily minute resets, bulk status changes, fleet stats and
//! an admin-namespaced alias for agent registration.

use axum::extract::{FromRef, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use calldeck_core::domain::agent::{AgentDraft, AgentStatus, AssistantId};
use calldeck_db::repositories::{agent, transcript, upload, RepositoryError};
use calldeck_db::DbPool;

use crate::auth::{AuthVerifier, CurrentUser};

#[derive(Clone)]
pub struct AdminState {
    db_pool: DbPool,
    verifier: AuthVerifier,
}

impl FromRef<AdminState> for AuthVerifier {
    fn from_ref(state: &AdminState) -> Self {
        state.verifier.clone()
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct MinuteResetRequest {
    /// Reset every agent when omitted.
    #[serde(default)]
    pub agent_ids: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct MinuteResetResponse {
    pub reset_agents: Vec<String>,
    pub reset_count: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct BulkStatusRequest {
    pub agent_ids: Vec<String>,
    pub status: AgentStatus,
}

#[derive(Debug, Serialize)]
pub struct BulkStatusResponse {
    pub updated_agents: Vec<String>,
    pub updated_count: usize,
    pub errors: Vec<String>,
    pub new_status: AgentStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusBreakdown {
    pub total_agents: usize,
    pub active_agents: usize,
    pub idle_agents: usize,
    pub offline_agents: usize,
    pub error_agents: usize,
}

#[derive(Debug, Serialize)]
pub struct UsageStats {
    pub total_minutes_today: i64,
    pub total_minutes_all_time: i64,
    pub total_transcripts: i64,
    pub total_csv_uploads: i64,
}

#[derive(Debug, Serialize)]
pub struct MostActiveAgent {
    pub id: AssistantId,
    pub name: String,
    pub total_minutes: i64,
}

#[derive(Debug, Serialize)]
pub struct SystemInfoResponse {
    pub system_stats: StatusBreakdown,
    pub usage_stats: UsageStats,
    pub most_active_agent: Option<MostActiveAgent>,
    pub last_updated: DateTime<Utc>,
}

type ApiFailure = (StatusCode, Json<ApiError>);

fn storage_error(error: RepositoryError) -> ApiFailure {
    error!(event_name = "admin.storage_error", error = %error, "admin storage error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError { error: "an internal storage error occurred".to_string() }),
    )
}

pub fn router(db_pool: DbPool, verifier: AuthVerifier) -> Router {
    Router::new()
        .route("/api/v1/admin/reset_minutes", post(reset_minutes))
        .route("/api/v1/admin/bulk_status_update", post(bulk_status_update))
        .route("/api/v1/admin/system_info", get(system_info))
        .route("/api/v1/admin/register_agent", post(register_agent))
        .with_state(AdminState { db_pool, verifier })
}

async fn reset_minutes(
    State(state): State<AdminState>,
    _user: CurrentUser,
    Json(request): Json<MinuteResetRequest>,
) -> Result<Json<MinuteResetResponse>, ApiFailure> {
    let reset_agents =
        agent::reset_minutes(&state.db_pool, request.agent_ids.as_deref(), Utc::now())
            .await
            .map_err(storage_error)?;

    info!(
        event_name = "admin.minutes_reset",
        reset_count = reset_agents.len(),
        "daily minute counters reset"
    );
    Ok(Json(MinuteResetResponse {
        reset_count: reset_agents.len(),
        reset_agents,
        timestamp: Utc::now(),
    }))
}

async fn bulk_status_update(
    State(state): State<AdminState>,
    _user: CurrentUser,
    Json(request): Json<BulkStatusRequest>,
) -> Result<Json<BulkStatusResponse>, ApiFailure> {
    let now = Utc::now();
    let mut updated_agents = Vec::new();
    let mut errors = Vec::new();

    for raw_id in request.agent_ids {
        let id = AssistantId(raw_id);
        let updated = agent::set_status(&state.db_pool, &id, request.status, now)
            .await
            .map_err(storage_error)?;
        if updated {
            updated_agents.push(id.0);
        } else {
            errors.push(format!("agent {id} not found"));
        }
    }

    Ok(Json(BulkStatusResponse {
        updated_count: updated_agents.len(),
        updated_agents,
        errors,
        new_status: request.status,
        timestamp: now,
    }))
}

async fn system_info(
    State(state): State<AdminState>,
    _user: CurrentUser,
) -> Result<Json<SystemInfoResponse>, ApiFailure> {
    let agents = agent::list(&state.db_pool).await.map_err(storage_error)?;

    let count_with = |status: AgentStatus| {
        agents.iter().filter(|agent| agent.status == status).count()
    };
    let system_stats = StatusBreakdown {
        total_agents: agents.len(),
        active_agents: count_with(AgentStatus::Calling),
        idle_agents: count_with(AgentStatus::Idle),
        offline_agents: count_with(AgentStatus::Offline),
        error_agents: count_with(AgentStatus::Error),
    };

    let usage_stats = UsageStats {
        total_minutes_today: agents.iter().map(|agent| agent.minutes_today).sum(),
        total_minutes_all_time: agents.iter().map(|agent| agent.total_minutes_used).sum(),
        total_transcripts: transcript::count_all(&state.db_pool).await.map_err(storage_error)?,
        total_csv_uploads: upload::count_all(&state.db_pool).await.map_err(storage_error)?,
    };

    let most_active_agent = agents
        .iter()
        .max_by_key(|agent| agent.total_minutes_used)
        .filter(|agent| agent.total_minutes_used > 0)
        .map(|agent| MostActiveAgent {
            id: agent.id.clone(),
            name: agent.name.clone(),
            total_minutes: agent.total_minutes_used,
        });

    Ok(Json(SystemInfoResponse {
        system_stats,
        usage_stats,
        most_active_agent,
        last_updated: Utc::now(),
    }))
}

async fn register_agent(
    State(state): State<AdminState>,
    _user: CurrentUser,
    Json(draft): Json<AgentDraft>,
) -> Result<(StatusCode, Json<calldeck_core::domain::agent::Agent>), ApiFailure> {
    let created = crate::agents::register_agent(&state.db_pool, draft)
        .await
        .map_err(storage_error)?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ApiError {
                    error: "agent with this assistant id already exists".to_string(),
                }),
            )
        })?;
    Ok((StatusCode::CREATED, Json(created)))
}
