use calldeck_core::config::{AppConfig, ConfigError, LoadOptions};
use calldeck_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("admin user setup failed: {0}")]
    AdminSeed(#[source] crate::auth::AuthError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    crate::auth::ensure_admin_user(&db_pool, &config.auth)
        .await
        .map_err(BootstrapError::AdminSeed)?;

    Ok(Application { config, db_pool })
}

#[cfg(test)]
mod tests {
    use calldeck_core::config::{ConfigOverrides, LoadOptions};
    use calldeck_db::repositories;

    use super::bootstrap;

    fn memory_options(db_name: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(format!("sqlite:file:{db_name}?mode=memory&cache=shared")),
                admin_username: Some("admin".to_string()),
                admin_password: Some("bootstrap-pw".to_string()),
                jwt_secret: Some("bootstrap-secret".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_schema_and_seeds_the_admin_user() {
        let app = bootstrap(memory_options("bootstrap_seed")).await.expect("bootstrap succeeds");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('agents', 'transcripts', 'call_logs', 'csv_uploads', 'users')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 5, "bootstrap should create the baseline tables");

        let admin = repositories::user::find_by_username(&app.db_pool, "admin")
            .await
            .expect("query user")
            .expect("admin row exists");
        assert_ne!(admin.password_hash, "bootstrap-pw", "password is stored hashed");

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent_for_the_admin_row() {
        let app = bootstrap(memory_options("bootstrap_rerun")).await.expect("first bootstrap");
        crate::auth::ensure_admin_user(&app.db_pool, &app.config.auth)
            .await
            .expect("second seed is a no-op");
        app.db_pool.close().await;
    }
}
