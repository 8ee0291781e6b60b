//! Session handlers.
//!
//! - `POST /sessions` - Create an empty session
//! - `POST /sessions/{session_id}/join` - Join (and lazily create) a session
//!
//! The realtime mode is read once here and passed down, so a mode flip in
//! the middle of a request cannot split its behavior.

use crate::errors::VcError;
use crate::models::{JoinSessionRequest, JoinSessionResponse, Session};
use crate::routes::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Handler for POST /sessions
///
/// # Response
///
/// - 200 OK: The new session with no members
/// - 500 Internal Server Error: Store failure
#[instrument(skip_all, name = "vc.sessions.create_handler")]
pub async fn create_session(State(state): State<Arc<AppState>>) -> Result<Json<Session>, VcError> {
    let mode = state.mode.current();
    let session = state.sessions.create_session(mode).await?;
    Ok(Json(session))
}

/// Handler for POST /sessions/{session_id}/join
///
/// # Response
///
/// - 200 OK: `{session, realtime}`
/// - 400 Bad Request: Missing or invalid `userId`, or unreadable body
/// - 403 Forbidden: Session is full
/// - 409 Conflict: Too many concurrent updates
/// - 500 Internal Server Error: Store failure
#[instrument(skip_all, name = "vc.sessions.join_handler", fields(session_id = %session_id))]
pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    payload: Result<Json<JoinSessionRequest>, JsonRejection>,
) -> Result<Json<JoinSessionResponse>, VcError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(target: "vc.handlers.sessions", error = %rejection, "Rejected join body");
        VcError::BadRequest("Invalid request body".to_string())
    })?;

    let mode = state.mode.current();
    let response = state
        .sessions
        .join_session(mode, &session_id, &request)
        .await?;

    Ok(Json(response))
}
