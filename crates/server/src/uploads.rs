//! Contact-list CSV intake: store the raw file for audit, validate rows,
//! record a manifest, and forward valid contacts to the provider when an
//! API key is configured.

use std::path::{Path as FsPath, PathBuf};

use axum::extract::{FromRef, Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use calldeck_core::domain::agent::AssistantId;
use calldeck_core::domain::upload::{parse_contacts, CsvUpload, UploadReport};
use calldeck_db::repositories::{agent, upload, RepositoryError};
use calldeck_db::DbPool;

use crate::auth::{AuthVerifier, CurrentUser};
use crate::provider::ProviderClient;

#[derive(Clone)]
pub struct UploadsState {
    db_pool: DbPool,
    verifier: AuthVerifier,
    provider: Option<ProviderClient>,
    uploads_dir: PathBuf,
}

impl FromRef<UploadsState> for AuthVerifier {
    fn from_ref(state: &UploadsState) -> Self {
        state.verifier.clone()
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct CsvUploadResponse {
    pub upload_id: String,
    pub filename: String,
    pub row_count: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub errors: Vec<String>,
    pub processed: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadManifestView {
    pub id: String,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub row_count: i64,
    pub processed: bool,
}

type ApiFailure = (StatusCode, Json<ApiError>);

fn storage_error(error: RepositoryError) -> ApiFailure {
    error!(event_name = "uploads.storage_error", error = %error, "upload storage error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError { error: "an internal storage error occurred".to_string() }),
    )
}

fn bad_request(message: &str) -> ApiFailure {
    (StatusCode::BAD_REQUEST, Json(ApiError { error: message.to_string() }))
}

fn is_csv_filename(filename: &str) -> bool {
    FsPath::new(filename)
        .extension()
        .map(|extension| extension.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

pub fn router(
    db_pool: DbPool,
    verifier: AuthVerifier,
    provider: Option<ProviderClient>,
    uploads_dir: PathBuf,
) -> Router {
    Router::new()
        .route("/api/v1/agents/{agent_id}/uploads", post(upload_csv).get(list_uploads))
        .with_state(UploadsState { db_pool, verifier, provider, uploads_dir })
}

async fn read_csv_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiFailure> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| bad_request(&format!("unreadable multipart body: {error}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(ToString::to_string)
            .ok_or_else(|| bad_request("file field is missing a filename"))?;
        if !is_csv_filename(&filename) {
            return Err(bad_request("file must be a CSV"));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|error| bad_request(&format!("unreadable file field: {error}")))?;
        return Ok((filename, bytes.to_vec()));
    }
    Err(bad_request("multipart body must contain a `file` field"))
}

async fn upload_csv(
    Path(agent_id): Path<String>,
    State(state): State<UploadsState>,
    _user: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<CsvUploadResponse>, ApiFailure> {
    let agent_id = AssistantId(agent_id);
    if agent::find(&state.db_pool, &agent_id).await.map_err(storage_error)?.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError { error: "agent not found".to_string() }),
        ));
    }

    let (filename, bytes) = read_csv_field(&mut multipart).await?;

    let upload_id = format!("UP-{}", Uuid::new_v4().simple());
    let file_path = state.uploads_dir.join(format!("{upload_id}_{filename}"));

    tokio::fs::create_dir_all(&state.uploads_dir).await.map_err(|error| {
        error!(event_name = "uploads.fs_error", error = %error, "could not create uploads dir");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError { error: "could not persist upload".to_string() }),
        )
    })?;
    tokio::fs::write(&file_path, &bytes).await.map_err(|error| {
        error!(event_name = "uploads.fs_error", error = %error, "could not write upload file");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError { error: "could not persist upload".to_string() }),
        )
    })?;

    let report = parse_contacts(bytes.as_slice());

    let manifest = CsvUpload {
        id: upload_id.clone(),
        filename: filename.clone(),
        agent_id: agent_id.clone(),
        uploaded_at: Utc::now(),
        row_count: report.total_rows as i64,
        processed: false,
        file_path: Some(file_path.display().to_string()),
    };
    upload::create(&state.db_pool, &manifest).await.map_err(storage_error)?;

    let processed = forward_contacts(&state, &agent_id, &upload_id, &report).await?;

    info!(
        event_name = "uploads.recorded",
        upload_id = %upload_id,
        agent_id = %agent_id,
        row_count = report.total_rows,
        valid_rows = report.valid.len(),
        "contact list upload recorded"
    );

    Ok(Json(CsvUploadResponse {
        upload_id,
        filename,
        row_count: report.total_rows,
        valid_rows: report.valid.len(),
        invalid_rows: report.invalid_rows(),
        errors: report.errors,
        processed,
    }))
}

/// Push valid rows to the provider. A provider failure leaves the manifest
/// unprocessed but does not fail the upload.
async fn forward_contacts(
    state: &UploadsState,
    agent_id: &AssistantId,
    upload_id: &str,
    report: &UploadReport,
) -> Result<bool, ApiFailure> {
    let Some(provider) = &state.provider else {
        return Ok(false);
    };
    if report.valid.is_empty() {
        return Ok(false);
    }

    match provider.push_contacts(agent_id.as_str(), &report.valid).await {
        Ok(()) => {
            upload::mark_processed(&state.db_pool, upload_id).await.map_err(storage_error)?;
            Ok(true)
        }
        Err(failure) => {
            warn!(
                event_name = "uploads.provider_push_failed",
                upload_id = %upload_id,
                error = %failure,
                "provider rejected the contact list; manifest left unprocessed"
            );
            Ok(false)
        }
    }
}

async fn list_uploads(
    Path(agent_id): Path<String>,
    State(state): State<UploadsState>,
    _user: CurrentUser,
) -> Result<Json<Vec<UploadManifestView>>, ApiFailure> {
    let agent_id = AssistantId(agent_id);
    if agent::find(&state.db_pool, &agent_id).await.map_err(storage_error)?.is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ApiError { error: "agent not found".to_string() }),
        ));
    }

    let manifests = upload::list_for_agent(&state.db_pool, &agent_id)
        .await
        .map_err(storage_error)?
        .into_iter()
        .map(|manifest| UploadManifestView {
            id: manifest.id,
            filename: manifest.filename,
            uploaded_at: manifest.uploaded_at,
            row_count: manifest.row_count,
            processed: manifest.processed,
        })
        .collect();
    Ok(Json(manifests))
}
