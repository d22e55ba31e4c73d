//! REST endpoints for applications and email ingestion.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};
use uuid::Uuid;

use super::auth::{CurrentUser, IdentityResolver};
use super::error::ApiError;
use crate::tracker::{AppStatus, Application, ApplicationDetail, EmailIngested, StatusBoard, Tracker};

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<Tracker>,
    pub identity: Arc<dyn IdentityResolver>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/applications", get(list_applications))
        .route("/applications/board", get(status_board))
        .route("/applications/{id}", get(get_application))
        .route("/applications/{id}/status", patch(set_status))
        .route("/events/email-ingested", post(email_ingested))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

// ── Applications ────────────────────────────────────────────────────────

async fn list_applications(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Application>>, ApiError> {
    let apps = state.tracker.list_applications(&user).await?;
    debug!(user = %user.email, count = apps.len(), "Listed applications");
    Ok(Json(apps))
}

async fn status_board(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<StatusBoard>, ApiError> {
    Ok(Json(state.tracker.status_board(&user).await?))
}

async fn get_application(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApplicationDetail>, ApiError> {
    let id = parse_id(&id)?;
    state
        .tracker
        .application_detail(&user, id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

#[derive(Deserialize)]
struct StatusUpdate {
    status: String,
}

/// PATCH /applications/{id}/status
///
/// The body is checked before the id, so a bad status on an unknown
/// application is a 400.
async fn set_status(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Application>, ApiError> {
    let invalid = || ApiError::BadRequest("Invalid status".into());
    let Json(update) = body.map_err(|_| invalid())?;
    let status: AppStatus = update.status.parse().map_err(|_| invalid())?;

    let id = parse_id(&id)?;
    state
        .tracker
        .set_status(&user, id, status)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

// ── Ingestion ───────────────────────────────────────────────────────────

async fn email_ingested(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    body: Result<Json<EmailIngested>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = body.map_err(|e| {
        debug!(error = %e, "Rejected ingestion body");
        ApiError::BadRequest("Invalid JSON body".into())
    })?;

    let outcome = state.tracker.ingest_email(&user, payload).await?;
    info!(
        user = %user.email,
        application_id = %outcome.application.id,
        email_id = %outcome.email_id,
        status_changed = outcome.status_changed,
        "Email ingested"
    );

    Ok(Json(serde_json::json!({
        "ok": true,
        "applicationId": outcome.application.id,
        "emailId": outcome.email_id,
        "statusChanged": outcome.status_changed,
        "newStatus": outcome.application.status,
    })))
}

/// Ids that are not UUIDs cannot name an application.
fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound)
}
