use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteExecutor};

use calldeck_core::domain::agent::{Agent, AgentPatch, AgentStatus, AssistantId};

use super::{decode_ts, encode_ts, RepositoryError};

fn agent_from_row(row: &SqliteRow) -> Result<Agent, RepositoryError> {
    let status: String = row.try_get("status")?;
    Ok(Agent {
        id: AssistantId(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        phone_number_id: row.try_get("phone_number_id")?,
        status: status
            .parse::<AgentStatus>()
            .map_err(|error| RepositoryError::Decode(error.to_string()))?,
        minutes_today: row.try_get("minutes_today")?,
        total_minutes_used: row.try_get("total_minutes_used")?,
        created_at: decode_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: decode_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

const SELECT_AGENT: &str = "SELECT id, name, description, phone_number_id, status, \
                            minutes_today, total_minutes_used, created_at, updated_at \
                            FROM agents";

pub async fn insert(
    executor: impl SqliteExecutor<'_>,
    agent: &Agent,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO agents (id, name, description, phone_number_id, status, \
                             minutes_today, total_minutes_used, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(agent.id.as_str())
    .bind(&agent.name)
    .bind(agent.description.as_deref())
    .bind(&agent.phone_number_id)
    .bind(agent.status.as_str())
    .bind(agent.minutes_today)
    .bind(agent.total_minutes_used)
    .bind(encode_ts(agent.created_at))
    .bind(encode_ts(agent.updated_at))
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find(
    executor: impl SqliteExecutor<'_>,
    id: &AssistantId,
) -> Result<Option<Agent>, RepositoryError> {
    let sql = format!("{SELECT_AGENT} WHERE id = ?");
    let row = sqlx::query(&sql).bind(id.as_str()).fetch_optional(executor).await?;
    row.as_ref().map(agent_from_row).transpose()
}

pub async fn list(executor: impl SqliteExecutor<'_>) -> Result<Vec<Agent>, RepositoryError> {
    let sql = format!("{SELECT_AGENT} ORDER BY created_at");
    let rows = sqlx::query(&sql).fetch_all(executor).await?;
    rows.iter().map(agent_from_row).collect()
}

/// Apply a partial metadata update. Fields the patch leaves unset keep their
/// stored value. Returns the updated agent, or `None` when the id is unknown.
pub async fn update(
    conn: &mut sqlx::SqliteConnection,
    id: &AssistantId,
    patch: &AgentPatch,
    now: DateTime<Utc>,
) -> Result<Option<Agent>, RepositoryError> {
    let updated = sqlx::query(
        "UPDATE agents SET \
            name = COALESCE(?, name), \
            description = COALESCE(?, description), \
            phone_number_id = COALESCE(?, phone_number_id), \
            status = COALESCE(?, status), \
            updated_at = ? \
         WHERE id = ?",
    )
    .bind(patch.name.as_deref())
    .bind(patch.description.as_deref())
    .bind(patch.phone_number_id.as_deref())
    .bind(patch.status.map(|status| status.as_str()))
    .bind(encode_ts(now))
    .bind(id.as_str())
    .execute(&mut *conn)
    .await?;

    if updated.rows_affected() == 0 {
        return Ok(None);
    }
    find(&mut *conn, id).await
}

pub async fn set_status(
    executor: impl SqliteExecutor<'_>,
    id: &AssistantId,
    status: AgentStatus,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let updated = sqlx::query("UPDATE agents SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(encode_ts(now))
        .bind(id.as_str())
        .execute(executor)
        .await?;
    Ok(updated.rows_affected() > 0)
}

/// Credit call minutes to both counters in a single statement, so concurrent
/// deliveries cannot lose an increment.
pub async fn add_minutes(
    executor: impl SqliteExecutor<'_>,
    id: &AssistantId,
    minutes: i64,
    now: DateTime<Utc>,
) -> Result<bool, RepositoryError> {
    let updated = sqlx::query(
        "UPDATE agents SET \
            minutes_today = minutes_today + ?, \
            total_minutes_used = total_minutes_used + ?, \
            updated_at = ? \
         WHERE id = ?",
    )
    .bind(minutes)
    .bind(minutes)
    .bind(encode_ts(now))
    .bind(id.as_str())
    .execute(executor)
    .await?;
    Ok(updated.rows_affected() > 0)
}

/// Zero `minutes_today` for the given agents, or for every agent when `ids`
/// is `None`. Returns the ids that were reset.
pub async fn reset_minutes(
    executor: impl SqliteExecutor<'_>,
    ids: Option<&[String]>,
    now: DateTime<Utc>,
) -> Result<Vec<String>, RepositoryError> {
    let mut builder: QueryBuilder<'_, Sqlite> =
        QueryBuilder::new("UPDATE agents SET minutes_today = 0, updated_at = ");
    builder.push_bind(encode_ts(now));
    if let Some(ids) = ids {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        builder.push(" WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        builder.push(")");
    }
    builder.push(" RETURNING id");

    let rows = builder.build().fetch_all(executor).await?;
    rows.iter().map(|row| row.try_get::<String, _>("id").map_err(Into::into)).collect()
}
