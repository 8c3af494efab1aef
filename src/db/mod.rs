//! SQLite store for recipient allocations and the dictator pool
//!
//! ## Tables
//!
//! - `dictator_rounds` - Pool of dictator decisions (read-only input to assignment)
//! - `recipient_allocations` - Rows assigned to recipients
//! - `excluded_participants` - Participants screened out by the quiz
//! - `schema_version` - Migration bookkeeping
//!
//! A (dictator, round) pair may appear in `recipient_allocations` at most
//! once. Claims are checked inside the assignment transaction and backed by
//! a partial unique index.

pub mod allocations;
pub mod exclusions;
pub mod pool;
pub mod schema;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{FlowError, Result};

pub use allocations::{AllocationRow, ParticipantTotal};
pub use pool::{PoolRow, PoolStatus};

/// SQLite database holding the allocation store
pub struct AllocationDb {
    conn: Mutex<Connection>,
}

impl AllocationDb {
    /// Open or create the database file
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        info!(path = %path.display(), "Opening allocation database");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;

        // WAL lets readers proceed while one recipient is claiming rows
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory SQLite database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a read with the shared connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FlowError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run a write (transactions need `&mut Connection`)
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| FlowError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }
}
