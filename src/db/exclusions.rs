//! Durable record of screened-out participants

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::Result;

/// Mark a participant as excluded; repeated calls keep the first reason
pub fn record_exclusion(conn: &Connection, participant_id: &str, reason: &str) -> Result<()> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO excluded_participants (participant_id, reason) VALUES (?, ?)",
        [participant_id, reason],
    )?;
    if inserted > 0 {
        info!(participant = participant_id, reason, "Participant exclusion recorded");
    }
    Ok(())
}

pub fn is_excluded(conn: &Connection, participant_id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM excluded_participants WHERE participant_id = ?",
            [participant_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    #[test]
    fn test_exclusion_is_remembered_once() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        assert!(!is_excluded(&conn, "p1").unwrap());
        record_exclusion(&conn, "p1", "comprehension_quiz").unwrap();
        record_exclusion(&conn, "p1", "other").unwrap();
        assert!(is_excluded(&conn, "p1").unwrap());
        assert!(!is_excluded(&conn, "p2").unwrap());

        let reason: String = conn
            .query_row(
                "SELECT reason FROM excluded_participants WHERE participant_id = 'p1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(reason, "comprehension_quiz");
    }
}
