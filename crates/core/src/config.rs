use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub provider: ProviderConfig,
    pub uploads: UploadsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub admin_username: String,
    pub admin_password: SecretString,
    pub jwt_secret: SecretString,
    pub token_ttl_minutes: i64,
}

/// Outbound calling-provider API plus the inbound webhook shared secret.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub webhook_secret: Option<String>,
}

#[derive(Clone, Debug)]
pub struct UploadsConfig {
    pub dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

/// Programmatic overrides, applied last. Used heavily by tests.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub jwt_secret: Option<String>,
    pub provider_api_key: Option<String>,
    pub provider_webhook_secret: Option<String>,
    pub uploads_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://calldeck.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            auth: AuthConfig {
                admin_username: "admin".to_string(),
                admin_password: SecretString::from("admin123".to_string()),
                jwt_secret: SecretString::from("calldeck-dev-secret".to_string()),
                token_ttl_minutes: 1440,
            },
            provider: ProviderConfig {
                base_url: "https://api.vapi.ai/v1".to_string(),
                api_key: None,
                webhook_secret: None,
            },
            uploads: UploadsConfig { dir: PathBuf::from("uploads") },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("calldeck.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(admin_username) = auth.admin_username {
                self.auth.admin_username = admin_username;
            }
            if let Some(admin_password_value) = auth.admin_password {
                self.auth.admin_password = SecretString::from(admin_password_value);
            }
            if let Some(jwt_secret_value) = auth.jwt_secret {
                self.auth.jwt_secret = SecretString::from(jwt_secret_value);
            }
            if let Some(token_ttl_minutes) = auth.token_ttl_minutes {
                self.auth.token_ttl_minutes = token_ttl_minutes;
            }
        }

        if let Some(provider) = patch.provider {
            if let Some(base_url) = provider.base_url {
                self.provider.base_url = base_url;
            }
            if let Some(api_key_value) = provider.api_key {
                self.provider.api_key = Some(SecretString::from(api_key_value));
            }
            if let Some(webhook_secret) = provider.webhook_secret {
                self.provider.webhook_secret = Some(webhook_secret);
            }
        }

        if let Some(uploads) = patch.uploads {
            if let Some(dir) = uploads.dir {
                self.uploads.dir = PathBuf::from(dir);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CALLDECK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CALLDECK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CALLDECK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CALLDECK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CALLDECK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CALLDECK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CALLDECK_SERVER_PORT") {
            self.server.port = parse_u16("CALLDECK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CALLDECK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CALLDECK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("CALLDECK_ADMIN_USERNAME") {
            self.auth.admin_username = value;
        }
        if let Some(value) = read_env("CALLDECK_ADMIN_PASSWORD") {
            self.auth.admin_password = SecretString::from(value);
        }
        if let Some(value) = read_env("CALLDECK_JWT_SECRET") {
            self.auth.jwt_secret = SecretString::from(value);
        }
        if let Some(value) = read_env("CALLDECK_TOKEN_TTL_MINUTES") {
            self.auth.token_ttl_minutes = parse_i64("CALLDECK_TOKEN_TTL_MINUTES", &value)?;
        }

        if let Some(value) = read_env("CALLDECK_PROVIDER_BASE_URL") {
            self.provider.base_url = value;
        }
        if let Some(value) = read_env("CALLDECK_PROVIDER_API_KEY") {
            self.provider.api_key = Some(SecretString::from(value));
        }
        if let Some(value) = read_env("CALLDECK_PROVIDER_WEBHOOK_SECRET") {
            self.provider.webhook_secret = Some(value);
        }

        if let Some(value) = read_env("CALLDECK_UPLOADS_DIR") {
            self.uploads.dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("CALLDECK_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("CALLDECK_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(admin_username) = overrides.admin_username {
            self.auth.admin_username = admin_username;
        }
        if let Some(admin_password_value) = overrides.admin_password {
            self.auth.admin_password = SecretString::from(admin_password_value);
        }
        if let Some(jwt_secret_value) = overrides.jwt_secret {
            self.auth.jwt_secret = SecretString::from(jwt_secret_value);
        }
        if let Some(api_key_value) = overrides.provider_api_key {
            self.provider.api_key = Some(SecretString::from(api_key_value));
        }
        if let Some(webhook_secret) = overrides.provider_webhook_secret {
            self.provider.webhook_secret = Some(webhook_secret);
        }
        if let Some(uploads_dir) = overrides.uploads_dir {
            self.uploads.dir = uploads_dir;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        use secrecy::ExposeSecret;

        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.bind_address must not be empty".to_string(),
            ));
        }
        if self.auth.admin_username.trim().is_empty() {
            return Err(ConfigError::Validation(
                "auth.admin_username must not be empty".to_string(),
            ));
        }
        if self.auth.jwt_secret.expose_secret().is_empty() {
            return Err(ConfigError::Validation("auth.jwt_secret must not be empty".to_string()));
        }
        if self.auth.token_ttl_minutes < 1 {
            return Err(ConfigError::Validation(
                "auth.token_ttl_minutes must be at least 1".to_string(),
            ));
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "provider.base_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    let candidate = explicit.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("calldeck.toml"));
    candidate.exists().then_some(candidate)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    provider: Option<ProviderPatch>,
    uploads: Option<UploadsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct AuthPatch {
    admin_username: Option<String>,
    admin_password: Option<String>,
    jwt_secret: Option<String>,
    token_ttl_minutes: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ProviderPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadsPatch {
    dir: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
