//! HTTP API for the recipient flow
//!
//! Provides:
//! - Session endpoints walking a participant through the pages
//! - Payment export and pool status
//! - Administrative deletion of a recipient's rows

pub mod routes;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::db::AllocationDb;
use crate::flow::RecipientFlow;
use crate::session::SessionStore;

/// State shared across handlers
///
/// The flow and its store are shared as-is; only the session map sits
/// behind a lock, and handlers never hold it across database work.
pub struct AppState {
    pub config: Config,
    pub flow: RecipientFlow,
    pub sessions: RwLock<SessionStore>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config, db: Arc<AllocationDb>) -> Self {
        Self {
            flow: RecipientFlow::new(&config, db),
            sessions: RwLock::new(SessionStore::new(Duration::from_secs(config.session.ttl_seconds))),
            config,
        }
    }
}

/// Create the API router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        // Participant flow
        .route("/api/consent", post(routes::api_consent))
        .route("/api/session/:id", get(routes::api_session))
        .route("/api/session/:id/next", post(routes::api_next))
        .route("/api/quiz", get(routes::api_quiz_questions))
        .route("/api/session/:id/quiz", post(routes::api_quiz))
        .route("/api/session/:id/results", get(routes::api_results))
        // Experimenter
        .route("/api/export", get(routes::api_export))
        .route("/api/pool/status", get(routes::api_pool_status))
        .route(
            "/api/admin/allocations/:recipient_id",
            delete(routes::api_delete_allocations),
        )
        // Health check
        .route("/health", get(routes::health))
        .with_state(state)
}
