use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use calldeck_core::domain::agent::AssistantId;
use calldeck_core::domain::call::{CallId, Segments, Transcript, TranscriptSegment};

use super::{decode_opt_ts, decode_ts, encode_ts, RepositoryError};

fn decode_segments(raw: &str) -> Result<Segments, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("bad segments payload: {error}")))
}

fn encode_segments(segments: &Segments) -> Result<String, RepositoryError> {
    serde_json::to_string(segments)
        .map_err(|error| RepositoryError::Decode(format!("unencodable segments: {error}")))
}

fn transcript_from_row(row: &SqliteRow) -> Result<Transcript, RepositoryError> {
    Ok(Transcript {
        id: row.try_get("id")?,
        call_id: CallId(row.try_get("call_id")?),
        agent_id: AssistantId(row.try_get("agent_id")?),
        started_at: decode_ts(&row.try_get::<String, _>("started_at")?)?,
        ended_at: decode_opt_ts(row.try_get("ended_at")?)?,
        total_duration: row.try_get("total_duration")?,
        segments: decode_segments(&row.try_get::<String, _>("segments")?)?,
        created_at: decode_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

const SELECT_TRANSCRIPT: &str = "SELECT id, call_id, agent_id, started_at, ended_at, \
                                 total_duration, segments, created_at FROM transcripts";

pub async fn create(
    executor: impl SqliteExecutor<'_>,
    transcript: &Transcript,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO transcripts (id, call_id, agent_id, started_at, ended_at, \
                                  total_duration, segments, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&transcript.id)
    .bind(transcript.call_id.as_str())
    .bind(transcript.agent_id.as_str())
    .bind(encode_ts(transcript.started_at))
    .bind(transcript.ended_at.map(encode_ts))
    .bind(transcript.total_duration)
    .bind(encode_segments(&transcript.segments)?)
    .bind(encode_ts(transcript.created_at))
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn find_by_call_id(
    executor: impl SqliteExecutor<'_>,
    call_id: &CallId,
) -> Result<Option<Transcript>, RepositoryError> {
    let sql = format!("{SELECT_TRANSCRIPT} WHERE call_id = ?");
    let row = sqlx::query(&sql).bind(call_id.as_str()).fetch_optional(executor).await?;
    row.as_ref().map(transcript_from_row).transpose()
}

pub async fn list_for_agent(
    executor: impl SqliteExecutor<'_>,
    agent_id: &AssistantId,
) -> Result<Vec<Transcript>, RepositoryError> {
    let sql = format!("{SELECT_TRANSCRIPT} WHERE agent_id = ? ORDER BY started_at");
    let rows = sqlx::query(&sql).bind(agent_id.as_str()).fetch_all(executor).await?;
    rows.iter().map(transcript_from_row).collect()
}

/// Append one segment to the stored sequence, preserving arrival order. The
/// read and the write run on the same connection so callers can scope them
/// inside a transaction. Returns `false` when no transcript exists for the
/// call.
pub async fn append_segment(
    conn: &mut sqlx::SqliteConnection,
    call_id: &CallId,
    segment: TranscriptSegment,
) -> Result<bool, RepositoryError> {
    let row = sqlx::query("SELECT segments FROM transcripts WHERE call_id = ?")
        .bind(call_id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(false);
    };

    let mut segments = decode_segments(&row.try_get::<String, _>("segments")?)?;
    segments.push(segment);

    sqlx::query("UPDATE transcripts SET segments = ? WHERE call_id = ?")
        .bind(encode_segments(&segments)?)
        .bind(call_id.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

/// Stamp the call end onto the transcript. Returns `false` when no
/// transcript exists for the call.
pub async fn finalize(
    executor: impl SqliteExecutor<'_>,
    call_id: &CallId,
    ended_at: DateTime<Utc>,
    total_duration: Option<i64>,
) -> Result<bool, RepositoryError> {
    let updated =
        sqlx::query("UPDATE transcripts SET ended_at = ?, total_duration = ? WHERE call_id = ?")
            .bind(encode_ts(ended_at))
            .bind(total_duration)
            .bind(call_id.as_str())
            .execute(executor)
            .await?;
    Ok(updated.rows_affected() > 0)
}

/// Most recent still-open call for an agent, if any.
pub async fn latest_open_call(
    executor: impl SqliteExecutor<'_>,
    agent_id: &AssistantId,
) -> Result<Option<(CallId, DateTime<Utc>)>, RepositoryError> {
    let row = sqlx::query(
        "SELECT call_id, started_at FROM transcripts \
         WHERE agent_id = ? AND ended_at IS NULL \
         ORDER BY started_at DESC LIMIT 1",
    )
    .bind(agent_id.as_str())
    .fetch_optional(executor)
    .await?;

    row.map(|row| {
        let call_id = CallId(row.try_get::<String, _>("call_id")?);
        let started_at = decode_ts(&row.try_get::<String, _>("started_at")?)?;
        Ok((call_id, started_at))
    })
    .transpose()
}

pub async fn count_all(executor: impl SqliteExecutor<'_>) -> Result<i64, RepositoryError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transcripts")
        .fetch_one(executor)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use calldeck_core::domain::agent::AssistantId;
    use calldeck_core::domain::call::{CallId, Speaker, TranscriptSegment};
    use chrono::Utc;

    use crate::fixtures::{memory_pool, new_transcript, seed_agent};

    fn segment(speaker: Speaker, content: &str) -> TranscriptSegment {
        TranscriptSegment { timestamp: Utc::now(), speaker, content: content.to_string() }
    }

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;

        let transcript = new_transcript("A1", "C1");
        super::create(&pool, &transcript).await.expect("create");

        let found = super::find_by_call_id(&pool, &CallId("C1".to_string()))
            .await
            .expect("find")
            .expect("transcript exists");
        assert_eq!(found, transcript);
        assert!(found.segments.is_empty());

        let missing =
            super::find_by_call_id(&pool, &CallId("C-missing".to_string())).await.expect("find");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn appended_segments_keep_arrival_order() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        super::create(&pool, &new_transcript("A1", "C1")).await.expect("create");
        let call_id = CallId("C1".to_string());

        let mut conn = pool.acquire().await.expect("acquire");
        assert!(super::append_segment(&mut conn, &call_id, segment(Speaker::User, "hi"))
            .await
            .expect("append"));
        assert!(super::append_segment(&mut conn, &call_id, segment(Speaker::User, "there"))
            .await
            .expect("append"));
        drop(conn);

        let transcript =
            super::find_by_call_id(&pool, &call_id).await.expect("find").expect("transcript");
        let contents: Vec<&str> =
            transcript.segments.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "there"]);
    }

    #[tokio::test]
    async fn append_to_unknown_call_is_a_noop() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.expect("acquire");
        let appended = super::append_segment(
            &mut conn,
            &CallId("C-missing".to_string()),
            segment(Speaker::Assistant, "hello"),
        )
        .await
        .expect("append");
        assert!(!appended);
    }

    #[tokio::test]
    async fn finalize_stamps_end_and_duration() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        super::create(&pool, &new_transcript("A1", "C1")).await.expect("create");
        let call_id = CallId("C1".to_string());

        let ended_at = Utc::now();
        assert!(super::finalize(&pool, &call_id, ended_at, Some(90)).await.expect("finalize"));

        let transcript =
            super::find_by_call_id(&pool, &call_id).await.expect("find").expect("transcript");
        assert_eq!(transcript.total_duration, Some(90));
        assert!(transcript.ended_at.is_some());

        assert!(!super::finalize(&pool, &CallId("C-missing".to_string()), ended_at, None)
            .await
            .expect("finalize"));
    }

    #[tokio::test]
    async fn latest_open_call_ignores_finished_calls() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        let agent_id = AssistantId("A1".to_string());

        super::create(&pool, &new_transcript("A1", "C1")).await.expect("create");
        super::create(&pool, &new_transcript("A1", "C2")).await.expect("create");
        super::finalize(&pool, &CallId("C1".to_string()), Utc::now(), Some(60))
            .await
            .expect("finalize");

        let open = super::latest_open_call(&pool, &agent_id).await.expect("query");
        assert_eq!(open.map(|(call_id, _)| call_id), Some(CallId("C2".to_string())));

        assert_eq!(super::count_all(&pool).await.expect("count"), 2);
    }
}
