pub mod api_routes;
pub mod upload_routes;
pub mod ws_routes;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ClientConfig;
use crate::errors::AppError;
use crate::service::session::Session;

use api_routes::*;

pub fn router(session: Session, config: &ClientConfig) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/session", post(sign_in_handler).delete(sign_out_handler))
        // Files
        .route("/api/files", get(list_files_handler))
        .route("/api/files/refresh", post(refresh_files_handler))
        .route(
            "/api/files/upload",
            post(upload_routes::upload_handler)
                .layer(DefaultBodyLimit::max(config.max_upload_request_bytes)),
        )
        .route("/api/files/{key}", delete(delete_file_handler))
        .route("/api/uploads/progress", get(upload_routes::progress_handler))
        .route("/ws/uploads", get(ws_routes::ws_uploads_handler))
        // Selection & chat
        .route("/api/selection", get(list_selection_handler))
        .route("/api/selection/{key}", post(select_handler).delete(deselect_handler))
        .route("/api/chat", get(chat_view_handler).post(send_handler))
        .route("/api/chat/draft", put(set_draft_handler))
        .route("/api/chat/thread/reset", post(reset_thread_handler))
        .route("/api/chat/reset", post(reset_chat_handler))
        .route("/api/dialogues", get(dialogues_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(session)
}

// ── Helper ────────────────────────────────────────────────────────────────────

fn status_for(err: &AppError) -> StatusCode {
    if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else if err.is_unauthenticated() {
        StatusCode::UNAUTHORIZED
    } else if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_timeout() {
        StatusCode::GATEWAY_TIMEOUT
    } else if err.is_remote() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (status_for(&self), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
