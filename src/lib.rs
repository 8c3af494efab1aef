//! recipient-flow: recipient side of an online dictator-game study
//!
//! Participants give their id, pass a comprehension quiz, receive rows that
//! earlier "dictator" participants produced, and see what they will be paid.
//!
//! ## Modules
//!
//! - `db` - SQLite store: dictator pool and recipient allocations
//! - `assign` - Idempotent, conflict-retrying assignment from the shared pool
//! - `quiz` - Comprehension quiz grading with an attempt limit
//! - `flow` - Page sequence and the session-driven transitions
//! - `results` - Payment summary and payout rounding
//! - `api` - axum router exposing the flow
//! - `cli` - Experimenter commands (import, assign, export, delete)

pub mod api;
pub mod assign;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod flow;
pub mod quiz;
pub mod results;
pub mod session;

// Re-exports
pub use assign::{AssignOutcome, Assigner};
pub use config::Config;
pub use db::AllocationDb;
pub use error::FlowError;
pub use flow::{Page, RecipientFlow};
pub use quiz::QuizGrader;
pub use results::ResultsView;
pub use session::RecipientSession;
