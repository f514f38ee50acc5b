use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use calldeck_core::domain::agent::AssistantId;
use calldeck_core::domain::call::{CallId, CallLog, CallLogStatus};

use super::{decode_opt_ts, decode_ts, encode_ts, RepositoryError};

fn call_log_from_row(row: &SqliteRow) -> Result<CallLog, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = match status.as_str() {
        "started" => CallLogStatus::Started,
        "ended" => CallLogStatus::Ended,
        other => {
            return Err(RepositoryError::Decode(format!("unknown call log status `{other}`")))
        }
    };
    Ok(CallLog {
        id: row.try_get("id")?,
        call_id: CallId(row.try_get("call_id")?),
        agent_id: AssistantId(row.try_get("agent_id")?),
        phone_number: row.try_get("phone_number")?,
        status,
        started_at: decode_opt_ts(row.try_get("started_at")?)?,
        ended_at: decode_opt_ts(row.try_get("ended_at")?)?,
        duration: row.try_get("duration")?,
        created_at: decode_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

pub async fn create(
    executor: impl SqliteExecutor<'_>,
    log: &CallLog,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO call_logs (id, call_id, agent_id, phone_number, status, \
                                started_at, ended_at, duration, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&log.id)
    .bind(log.call_id.as_str())
    .bind(log.agent_id.as_str())
    .bind(log.phone_number.as_deref())
    .bind(log.status.as_str())
    .bind(log.started_at.map(encode_ts))
    .bind(log.ended_at.map(encode_ts))
    .bind(log.duration)
    .bind(encode_ts(log.created_at))
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_by_call_id(
    executor: impl SqliteExecutor<'_>,
    call_id: &CallId,
) -> Result<Option<CallLog>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, call_id, agent_id, phone_number, status, started_at, ended_at, \
                duration, created_at \
         FROM call_logs WHERE call_id = ? ORDER BY created_at LIMIT 1",
    )
    .bind(call_id.as_str())
    .fetch_optional(executor)
    .await?;
    row.as_ref().map(call_log_from_row).transpose()
}

/// Close out the audit row for a call. Returns `false` when no row exists.
pub async fn finalize(
    executor: impl SqliteExecutor<'_>,
    call_id: &CallId,
    ended_at: DateTime<Utc>,
    duration: Option<i64>,
) -> Result<bool, RepositoryError> {
    let updated = sqlx::query(
        "UPDATE call_logs SET status = ?, ended_at = ?, duration = ? WHERE call_id = ?",
    )
    .bind(CallLogStatus::Ended.as_str())
    .bind(encode_ts(ended_at))
    .bind(duration)
    .bind(call_id.as_str())
    .execute(executor)
    .await?;
    Ok(updated.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use calldeck_core::domain::call::{CallId, CallLogStatus};
    use chrono::Utc;

    use crate::fixtures::{memory_pool, new_call_log, seed_agent};

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;

        let log = new_call_log("A1", "C1");
        super::create(&pool, &log).await.expect("create");

        let found = super::find_by_call_id(&pool, &CallId("C1".to_string()))
            .await
            .expect("find")
            .expect("log exists");
        assert_eq!(found, log);

        let missing =
            super::find_by_call_id(&pool, &CallId("C-missing".to_string())).await.expect("find");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn finalize_marks_the_call_ended() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        super::create(&pool, &new_call_log("A1", "C1")).await.expect("create");
        let call_id = CallId("C1".to_string());

        assert!(super::finalize(&pool, &call_id, Utc::now(), Some(125)).await.expect("finalize"));

        let log = super::find_by_call_id(&pool, &call_id).await.expect("find").expect("log");
        assert_eq!(log.status, CallLogStatus::Ended);
        assert_eq!(log.duration, Some(125));
        assert!(log.ended_at.is_some());

        assert!(!super::finalize(&pool, &CallId("C-missing".to_string()), Utc::now(), None)
            .await
            .expect("finalize"));
    }
}
