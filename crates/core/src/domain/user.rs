use chrono::{DateTime, Utc};

/// Backoffice login row. Passwords are stored as argon2 hashes only.
#[derive(Clone, Debug, PartialEq)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}
