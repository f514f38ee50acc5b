use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod agent;
pub mod call_log;
pub mod transcript;
pub mod upload;
pub mod user;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Timestamps are stored as RFC 3339 text columns.
pub(crate) fn encode_ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn decode_ts(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    raw.parse::<DateTime<Utc>>()
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{raw}`: {error}")))
}

pub(crate) fn decode_opt_ts(
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.as_deref().map(decode_ts).transpose()
}
