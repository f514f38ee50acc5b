use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor};

use calldeck_core::domain::agent::AssistantId;
use calldeck_core::domain::upload::CsvUpload;

use super::{decode_ts, encode_ts, RepositoryError};

fn upload_from_row(row: &SqliteRow) -> Result<CsvUpload, RepositoryError> {
    Ok(CsvUpload {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        agent_id: AssistantId(row.try_get("agent_id")?),
        uploaded_at: decode_ts(&row.try_get::<String, _>("uploaded_at")?)?,
        row_count: row.try_get("row_count")?,
        processed: row.try_get::<i64, _>("processed")? != 0,
        file_path: row.try_get("file_path")?,
    })
}

pub async fn create(
    executor: impl SqliteExecutor<'_>,
    upload: &CsvUpload,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO csv_uploads (id, filename, agent_id, uploaded_at, row_count, \
                                  processed, file_path) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&upload.id)
    .bind(&upload.filename)
    .bind(upload.agent_id.as_str())
    .bind(encode_ts(upload.uploaded_at))
    .bind(upload.row_count)
    .bind(upload.processed as i64)
    .bind(upload.file_path.as_deref())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list_for_agent(
    executor: impl SqliteExecutor<'_>,
    agent_id: &AssistantId,
) -> Result<Vec<CsvUpload>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, filename, agent_id, uploaded_at, row_count, processed, file_path \
         FROM csv_uploads WHERE agent_id = ? ORDER BY uploaded_at",
    )
    .bind(agent_id.as_str())
    .fetch_all(executor)
    .await?;
    rows.iter().map(upload_from_row).collect()
}

pub async fn mark_processed(
    executor: impl SqliteExecutor<'_>,
    id: &str,
) -> Result<bool, RepositoryError> {
    let updated = sqlx::query("UPDATE csv_uploads SET processed = 1 WHERE id = ?")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(updated.rows_affected() > 0)
}

pub async fn count_all(executor: impl SqliteExecutor<'_>) -> Result<i64, RepositoryError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM csv_uploads")
        .fetch_one(executor)
        .await?;
    Ok(count)
}
