//! Provider webhook intake.
//!
//! The route is guarded by a shared secret header rather than bearer auth;
//! the calling provider cannot hold a session. A valid delivery is handed to
//! the reconciler, and only a storage failure surfaces as an error response:
//! the provider treats 5xx as "redeliver later".

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{error, warn};

use calldeck_core::domain::event::{ProviderEvent, WebhookEnvelope};

use crate::reconciler::{EventReconciler, Outcome};

pub const SECRET_HEADER: &str = "x-provider-secret";

#[derive(Clone)]
pub struct WebhookState {
    reconciler: EventReconciler,
    secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub message: &'static str,
}

pub fn router(reconciler: EventReconciler, secret: Option<String>) -> Router {
    Router::new()
        .route("/webhook/provider", post(ingest))
        .with_state(WebhookState { reconciler, secret })
}

fn verify_secret(
    headers: &HeaderMap,
    expected: Option<&str>,
) -> Result<(), (StatusCode, Json<ApiError>)> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = headers.get(SECRET_HEADER).and_then(|value| value.to_str().ok());
    match provided {
        Some(value) if value == expected => Ok(()),
        Some(_) => {
            warn!(event_name = "webhook.bad_secret", "webhook delivery with invalid secret");
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ApiError { error: "invalid webhook secret".to_string() }),
            ))
        }
        None => Err((
            StatusCode::UNAUTHORIZED,
            Json(ApiError { error: "missing webhook secret".to_string() }),
        )),
    }
}

async fn ingest(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    Json(envelope): Json<WebhookEnvelope>,
) -> Result<Json<WebhookAck>, (StatusCode, Json<ApiError>)> {
    verify_secret(&headers, state.secret.as_deref())?;

    let event = ProviderEvent::from(envelope);
    match state.reconciler.apply(event).await {
        Ok(outcome) => Ok(Json(WebhookAck {
            status: "success",
            message: match outcome {
                Outcome::Applied => "event applied",
                Outcome::Skipped => "event skipped",
                Outcome::Ignored => "event ignored",
            },
        })),
        Err(failure) => {
            error!(event_name = "webhook.apply_failed", error = %failure, "event processing failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError { error: "error processing webhook".to_string() }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use calldeck_core::domain::agent::{AgentStatus, AssistantId};
    use calldeck_db::fixtures::{memory_pool, seed_agent};
    use calldeck_db::repositories::agent;
    use tower::util::ServiceExt;

    use crate::reconciler::EventReconciler;

    use super::{router, SECRET_HEADER};

    fn delivery(secret: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhook/provider")
            .header("content-type", "application/json");
        if let Some(secret) = secret {
            builder = builder.header(SECRET_HEADER, secret);
        }
        builder.body(Body::from(body.to_string())).expect("request")
    }

    const CALL_STARTED: &str = r#"{
        "event_type": "call.started",
        "call": {"id": "C1", "assistant_id": "A1", "phone_number_id": "PN1"}
    }"#;

    #[tokio::test]
    async fn rejects_missing_and_wrong_secrets() {
        let pool = memory_pool().await;
        let app = router(EventReconciler::new(pool), Some("hook-secret".to_string()));

        let response =
            app.clone().oneshot(delivery(None, CALL_STARTED)).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response =
            app.oneshot(delivery(Some("wrong"), CALL_STARTED)).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn applies_events_with_the_right_secret() {
        let pool = memory_pool().await;
        seed_agent(&pool, "A1", "agent").await;
        let app = router(EventReconciler::new(pool.clone()), Some("hook-secret".to_string()));

        let response = app
            .oneshot(delivery(Some("hook-secret"), CALL_STARTED))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let snapshot = agent::find(&pool, &AssistantId("A1".to_string()))
            .await
            .expect("find")
            .expect("agent");
        assert_eq!(snapshot.status, AgentStatus::Calling);
    }

    #[tokio::test]
    async fn unknown_event_types_are_acknowledged() {
        let pool = memory_pool().await;
        let app = router(EventReconciler::new(pool), None);

        let response = app
            .oneshot(delivery(None, r#"{"event_type": "ping"}"#))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_payloads_are_rejected_before_the_reconciler() {
        let pool = memory_pool().await;
        let app = router(EventReconciler::new(pool), None);

        let response =
            app.oneshot(delivery(None, r#"{"call": {}}"#)).await.expect("response");
        assert!(response.status().is_client_error());
    }
}
