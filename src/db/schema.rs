//! Database schema definitions

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::Result;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        conn.execute_batch(POOL_SCHEMA)?;
        conn.execute_batch(ALLOCATIONS_SCHEMA)?;
        conn.execute_batch(EXCLUSIONS_SCHEMA)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        if current_version < 2 {
            conn.execute_batch(EXCLUSIONS_SCHEMA)?;
        }
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

/// Dictator decisions, filled by the dictator-side study
const POOL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS dictator_rounds (
    dictator_id TEXT NOT NULL,
    round_number INTEGER NOT NULL,
    -- Points the dictator kept out of 100; NULL when the round was skipped
    kept INTEGER,
    PRIMARY KEY (dictator_id, round_number)
);
"#;

/// Rows handed to recipients
const ALLOCATIONS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS recipient_allocations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient_id TEXT NOT NULL,
    -- NULL marks a zero-value filler row
    dictator_id TEXT,
    round_number INTEGER NOT NULL,
    part INTEGER,
    allocated_value INTEGER NOT NULL CHECK (allocated_value BETWEEN 0 AND 100),
    assigned_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_allocations_recipient
    ON recipient_allocations(recipient_id);

CREATE UNIQUE INDEX IF NOT EXISTS ux_allocations_claim
    ON recipient_allocations(dictator_id, round_number)
    WHERE dictator_id IS NOT NULL;

CREATE UNIQUE INDEX IF NOT EXISTS ux_allocations_filler
    ON recipient_allocations(recipient_id, round_number)
    WHERE dictator_id IS NULL;
"#;

/// Participants screened out of the study; survives across sessions
const EXCLUSIONS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS excluded_participants (
    participant_id TEXT PRIMARY KEY,
    reason TEXT NOT NULL,
    excluded_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_v1_database_gains_exclusions_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(POOL_SCHEMA).unwrap();
        conn.execute_batch(ALLOCATIONS_SCHEMA).unwrap();
        get_schema_version(&conn).unwrap();
        set_schema_version(&conn, 1).unwrap();

        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 2);
        conn.execute(
            "INSERT INTO excluded_participants (participant_id, reason) VALUES ('p1', 'quiz')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_version_read_errors_are_not_masked() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE schema_version (version TEXT NOT NULL); INSERT INTO schema_version VALUES ('not a number');")
            .unwrap();
        assert!(get_schema_version(&conn).is_err());
    }

    #[test]
    fn test_claim_index_rejects_second_claim() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO recipient_allocations (recipient_id, dictator_id, round_number, allocated_value)
             VALUES ('r1', 'd1', 4, 30)",
            [],
        )
        .unwrap();
        let second = conn.execute(
            "INSERT INTO recipient_allocations (recipient_id, dictator_id, round_number, allocated_value)
             VALUES ('r2', 'd1', 4, 30)",
            [],
        );
        assert!(second.is_err());

        // Fillers share the NULL dictator across recipients
        for recipient in ["r1", "r2"] {
            conn.execute(
                "INSERT INTO recipient_allocations (recipient_id, dictator_id, round_number, allocated_value)
                 VALUES (?, NULL, -1, 0)",
                [recipient],
            )
            .unwrap();
        }
    }
}
