//! API handlers
//!
//! SQLite work runs on the blocking pool through [`blocking`]. Session
//! handlers copy the session out of the store, run the flow on the copy,
//! then write it back, so the session lock is only held for map access.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use super::{AppState, SharedState};
use crate::db::{allocations, pool, ParticipantTotal, PoolStatus};
use crate::error::FlowError;
use crate::flow::{Page, QuizResponse};
use crate::quiz::QuizAnswers;
use crate::results::ResultsView;
use crate::session::RecipientSession;

/// Header carrying the admin token
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

/// Map a flow error onto an HTTP status
fn reject(e: FlowError) -> (StatusCode, String) {
    let status = match &e {
        FlowError::UnknownSession(_) => StatusCode::NOT_FOUND,
        FlowError::InvalidParticipant(_) | FlowError::InvalidAnswer { .. } => StatusCode::BAD_REQUEST,
        FlowError::WrongPage { .. }
        | FlowError::PoolExhausted { .. }
        | FlowError::ConflictRetriesExhausted(_) => StatusCode::CONFLICT,
        FlowError::Unauthorized => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %e, "Request failed");
    }
    (status, e.to_string())
}

/// Run store work off the async runtime
async fn blocking<T, F>(state: &SharedState, work: F) -> Result<T, (StatusCode, String)>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> crate::error::Result<T> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| reject(FlowError::Internal(format!("Blocking task failed: {}", e))))?
        .map_err(reject)
}

/// Copy of an open session; a lapsed one is evicted on the way
async fn snapshot(state: &SharedState, id: &Uuid) -> Result<RecipientSession, (StatusCode, String)> {
    let mut sessions = state.sessions.write().await;
    sessions.get_mut(id).map(|session| session.clone()).map_err(reject)
}

/// Write back an updated session, closing it at a terminal page
async fn store(state: &SharedState, id: &Uuid, session: RecipientSession) -> Result<(), (StatusCode, String)> {
    let mut sessions = state.sessions.write().await;
    if session.page.is_terminal() {
        sessions.close(id);
        Ok(())
    } else {
        sessions.replace(id, session).map_err(reject)
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

#[derive(Deserialize)]
pub struct ConsentRequest {
    pub participant_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub session: RecipientSession,
}

/// POST /api/consent
pub async fn api_consent(
    State(state): State<SharedState>,
    Json(req): Json<ConsentRequest>,
) -> ApiResult<SessionResponse> {
    let session = blocking(&state, move |s| s.flow.consent(&req.participant_id)).await?;

    let mut sessions = state.sessions.write().await;
    let session_id = sessions.insert(session.clone());
    if session.page.is_terminal() {
        sessions.close(&session_id);
    }

    Ok(Json(SessionResponse { session_id, session }))
}

/// GET /api/session/:id
pub async fn api_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<SessionResponse> {
    let session = snapshot(&state, &id).await?;
    Ok(Json(SessionResponse { session_id: id, session }))
}

#[derive(Debug, Serialize)]
pub struct NextResponse {
    pub page: Page,
}

/// POST /api/session/:id/next - leave a display-only page
pub async fn api_next(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<NextResponse> {
    let mut session = snapshot(&state, &id).await?;
    let page = state.flow.advance(&mut session).map_err(reject)?;
    store(&state, &id, session).await?;

    Ok(Json(NextResponse { page }))
}

/// Question as sent to the participant, without its answer
#[derive(Debug, Serialize)]
pub struct QuizQuestionView {
    pub id: String,
    pub choices: Vec<String>,
}

/// GET /api/quiz
pub async fn api_quiz_questions(State(state): State<SharedState>) -> Json<Vec<QuizQuestionView>> {
    let questions = state
        .flow
        .grader()
        .questions()
        .iter()
        .map(|q| QuizQuestionView {
            id: q.id.clone(),
            choices: q.choices.clone(),
        })
        .collect();
    Json(questions)
}

#[derive(Deserialize)]
pub struct QuizSubmission {
    pub answers: QuizAnswers,
}

/// POST /api/session/:id/quiz
pub async fn api_quiz(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<QuizSubmission>,
) -> ApiResult<QuizResponse> {
    let session = snapshot(&state, &id).await?;
    let (session, response) = blocking(&state, move |s| {
        let mut session = session;
        let response = s.flow.submit_quiz(&mut session, &req.answers)?;
        Ok((session, response))
    })
    .await?;
    store(&state, &id, session).await?;

    Ok(Json(response))
}

/// GET /api/session/:id/results
pub async fn api_results(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ResultsView> {
    let session = snapshot(&state, &id).await?;
    let (session, view) = blocking(&state, move |s| {
        let mut session = session;
        let view = s.flow.results(&mut session)?;
        Ok((session, view))
    })
    .await?;
    store(&state, &id, session).await?;

    Ok(Json(view))
}

/// GET /api/export
pub async fn api_export(State(state): State<SharedState>) -> ApiResult<Vec<ParticipantTotal>> {
    let totals = blocking(&state, |s| s.flow.db().with_conn(allocations::export_totals)).await?;
    Ok(Json(totals))
}

/// GET /api/pool/status
pub async fn api_pool_status(State(state): State<SharedState>) -> ApiResult<PoolStatus> {
    let status = blocking(&state, |s| s.flow.db().with_conn(pool::pool_status)).await?;
    Ok(Json(status))
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub recipient_id: String,
    pub deleted: usize,
}

/// DELETE /api/admin/allocations/:recipient_id
pub async fn api_delete_allocations(
    State(state): State<SharedState>,
    Path(recipient_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<DeleteResponse> {
    if let Some(expected) = &state.config.server.admin_token {
        let supplied = headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if supplied != Some(expected.as_str()) {
            return Err(reject(FlowError::Unauthorized));
        }
    }

    let target = recipient_id.clone();
    let deleted = blocking(&state, move |s| {
        s.flow
            .db()
            .with_conn(|conn| allocations::delete_for_recipient(conn, &target))
    })
    .await?;
    info!(recipient_id = %recipient_id, deleted, "Admin deleted allocations");

    Ok(Json(DeleteResponse { recipient_id, deleted }))
}
