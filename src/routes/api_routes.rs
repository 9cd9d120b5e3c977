use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{ChatMessage, DialogueSummary, UserIdentity};
use crate::service::session::{ChatView, FileView, FilesView, HealthReport, Session};

// ── Request / response bodies ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DraftBody {
    #[serde(default)]
    pub text: String,
}

#[derive(Deserialize)]
pub struct SendBody {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Deserialize)]
pub struct DialogueParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct SelectionChange {
    pub changed: bool,
    pub selection: Vec<FileView>,
}

// ── Session ───────────────────────────────────────────────────────────────────

/// GET `/api/health`
pub async fn health_handler(State(session): State<Session>) -> Json<HealthReport> {
    Json(session.health().await)
}

/// POST `/api/session`. A listing failure does not fail sign-in; it shows up
/// as the file list error instead.
pub async fn sign_in_handler(
    State(session): State<Session>,
    Json(user): Json<UserIdentity>,
) -> Result<Json<FilesView>, AppError> {
    match session.sign_in(user).await {
        Err(e) if e.is_validation() => Err(e),
        _ => Ok(Json(session.files().await)),
    }
}

/// DELETE `/api/session`
pub async fn sign_out_handler(State(session): State<Session>) -> StatusCode {
    session.sign_out().await;
    StatusCode::NO_CONTENT
}

// ── Files ─────────────────────────────────────────────────────────────────────

pub async fn list_files_handler(State(session): State<Session>) -> Json<FilesView> {
    Json(session.files().await)
}

pub async fn refresh_files_handler(
    State(session): State<Session>,
) -> Result<Json<FilesView>, AppError> {
    session.refresh_files().await?;
    Ok(Json(session.files().await))
}

/// DELETE `/api/files/{key}`
pub async fn delete_file_handler(
    State(session): State<Session>,
    Path(key): Path<String>,
) -> Result<Json<FilesView>, AppError> {
    session.delete_file(&key).await?;
    Ok(Json(session.files().await))
}

// ── Selection ─────────────────────────────────────────────────────────────────

pub async fn list_selection_handler(State(session): State<Session>) -> Json<Vec<FileView>> {
    Json(session.selection().await)
}

pub async fn select_handler(
    State(session): State<Session>,
    Path(key): Path<String>,
) -> Result<Json<SelectionChange>, AppError> {
    let changed = session.select(&key).await?;
    Ok(Json(SelectionChange { changed, selection: session.selection().await }))
}

pub async fn deselect_handler(
    State(session): State<Session>,
    Path(key): Path<String>,
) -> Json<SelectionChange> {
    let changed = session.deselect(&key).await;
    Json(SelectionChange { changed, selection: session.selection().await })
}

// ── Chat ──────────────────────────────────────────────────────────────────────

pub async fn chat_view_handler(State(session): State<Session>) -> Json<ChatView> {
    Json(session.chat().await)
}

pub async fn set_draft_handler(
    State(session): State<Session>,
    Json(body): Json<DraftBody>,
) -> StatusCode {
    session.set_draft(body.text).await;
    StatusCode::NO_CONTENT
}

/// POST `/api/chat`. Only a blank query is an error here; remote failures
/// come back as an error-flagged assistant message.
pub async fn send_handler(
    State(session): State<Session>,
    Json(body): Json<SendBody>,
) -> Result<Json<ChatMessage>, AppError> {
    Ok(Json(session.send(body.query).await?))
}

pub async fn reset_thread_handler(State(session): State<Session>) -> Json<ChatView> {
    session.reset_thread().await;
    Json(session.chat().await)
}

pub async fn reset_chat_handler(State(session): State<Session>) -> Json<ChatView> {
    session.reset_chat().await;
    Json(session.chat().await)
}

/// GET `/api/dialogues?limit=N`
pub async fn dialogues_handler(
    State(session): State<Session>,
    Query(params): Query<DialogueParams>,
) -> Result<Json<Vec<DialogueSummary>>, AppError> {
    Ok(Json(session.dialogues(params.limit).await?))
}
