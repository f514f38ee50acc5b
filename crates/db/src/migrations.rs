use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{run_pending, MIGRATOR};
    use crate::connect_with_settings;

    const MANAGED_TABLES: &[&str] = &["agents", "transcripts", "call_logs", "csv_uploads", "users"];

    async fn table_count(pool: &sqlx::SqlitePool, name: &str) -> i64 {
        sqlx::query("SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_one(pool)
            .await
            .expect("query sqlite_master")
            .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in MANAGED_TABLES {
            assert_eq!(table_count(&pool, table).await, 1, "table `{table}` should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        for table in MANAGED_TABLES {
            assert_eq!(table_count(&pool, table).await, 0, "table `{table}` should be dropped");
        }
    }

    #[tokio::test]
    async fn transcripts_enforce_one_row_per_call() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        sqlx::query("INSERT INTO agents (id, name, phone_number_id, created_at, updated_at) VALUES ('A1', 'a', 'PN1', '2025-06-10T12:00:00+00:00', '2025-06-10T12:00:00+00:00')")
            .execute(&pool)
            .await
            .expect("seed agent");

        let insert = "INSERT INTO transcripts (id, call_id, agent_id, started_at, created_at) \
                      VALUES (?, 'C1', 'A1', '2025-06-10T12:00:00+00:00', '2025-06-10T12:00:00+00:00')";
        sqlx::query(insert).bind("TS-1").execute(&pool).await.expect("first transcript");
        let duplicate = sqlx::query(insert).bind("TS-2").execute(&pool).await;
        assert!(duplicate.is_err(), "duplicate call_id should violate the unique constraint");
    }
}
