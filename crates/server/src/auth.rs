//! Bearer-token authentication for the admin surface.
//!
//! Passwords are hashed with argon2; sessions are stateless HS256 JWTs
//! carrying the username in `sub`. Every admin route takes a [`CurrentUser`]
//! extractor, which validates the Authorization header and requires the
//! configured admin account. Webhook intake does NOT go through this module;
//! it is guarded by a shared secret instead.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use calldeck_core::config::AuthConfig;
use calldeck_db::repositories::{user, RepositoryError};
use calldeck_db::DbPool;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("token handling failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and validates access tokens. Cloned into every router state that
/// hosts admin routes.
#[derive(Clone)]
pub struct AuthVerifier {
    jwt_secret: SecretString,
    admin_username: String,
    token_ttl_minutes: i64,
}

impl AuthVerifier {
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            admin_username: config.admin_username.clone(),
            token_ttl_minutes: config.token_ttl_minutes,
        }
    }

    pub fn admin_username(&self) -> &str {
        &self.admin_username
    }

    pub fn issue_token(&self, username: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.token_ttl_minutes)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.expose_secret().as_bytes()),
        )?;
        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.expose_secret().as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| AuthError::Hash(error.to_string()))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

/// Create the admin login row when it does not exist yet.
pub async fn ensure_admin_user(pool: &DbPool, config: &AuthConfig) -> Result<(), AuthError> {
    if user::find_by_username(pool, &config.admin_username).await?.is_some() {
        return Ok(());
    }
    let password_hash = hash_password(config.admin_password.expose_secret())?;
    user::create(pool, &config.admin_username, &password_hash, Utc::now()).await?;
    info!(
        event_name = "system.bootstrap.admin_user_created",
        username = %config.admin_username,
        "admin user initialized"
    );
    Ok(())
}

/// Extracted from the Authorization header by admin routes. Presence of a
/// value means the caller holds a valid token for the admin account.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

fn unauthorized(message: &str) -> (StatusCode, Json<ApiError>) {
    (StatusCode::UNAUTHORIZED, Json(ApiError { error: message.to_string() }))
}

impl<S> FromRequestParts<S> for CurrentUser
where
    AuthVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = AuthVerifier::from_ref(state);

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| unauthorized("missing bearer token"))?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| unauthorized("missing bearer token"))?;

        let claims = verifier
            .verify_token(token)
            .map_err(|_| unauthorized("could not validate credentials"))?;

        if claims.sub != verifier.admin_username {
            return Err((
                StatusCode::FORBIDDEN,
                Json(ApiError { error: "admin access required".to_string() }),
            ));
        }

        Ok(CurrentUser { username: claims.sub })
    }
}

#[derive(Clone)]
pub struct AuthState {
    db_pool: DbPool,
    verifier: AuthVerifier,
}

impl FromRef<AuthState> for AuthVerifier {
    fn from_ref(state: &AuthState) -> Self {
        state.verifier.clone()
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

pub fn router(db_pool: DbPool, verifier: AuthVerifier) -> Router {
    Router::new()
        .route("/api/v1/auth/login", post(login))
        .with_state(AuthState { db_pool, verifier })
}

async fn login(
    State(state): State<AuthState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, (StatusCode, Json<ApiError>)> {
    let account = user::find_by_username(&state.db_pool, &request.username).await.map_err(
        |error| {
            tracing::error!(event_name = "auth.login.storage_error", error = %error, "login lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError { error: "login temporarily unavailable".to_string() }),
            )
        },
    )?;

    let verified = account
        .map(|account| verify_password(&request.password, &account.password_hash))
        .unwrap_or(false);
    if !verified {
        warn!(event_name = "auth.login.rejected", username = %request.username, "login rejected");
        return Err(unauthorized("incorrect username or password"));
    }

    let access_token = state.verifier.issue_token(&request.username).map_err(|error| {
        tracing::error!(event_name = "auth.login.token_error", error = %error, "token issuance failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError { error: "login temporarily unavailable".to_string() }),
        )
    })?;

    info!(event_name = "auth.login.accepted", username = %request.username, "login accepted");
    Ok(Json(TokenResponse { access_token, token_type: "bearer" }))
}
