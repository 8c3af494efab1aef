//! Recipient allocation rows

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// Allocation row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRow {
    pub id: i64,
    pub recipient_id: String,
    pub dictator_id: Option<String>,
    pub round_number: i64,
    pub part: Option<i64>,
    pub allocated_value: i64,
    pub assigned_at: String,
}

impl AllocationRow {
    fn from_row(row: &Row) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            recipient_id: row.get("recipient_id")?,
            dictator_id: row.get("dictator_id")?,
            round_number: row.get("round_number")?,
            part: row.get("part")?,
            allocated_value: row.get("allocated_value")?,
            assigned_at: row.get("assigned_at")?,
        })
    }

    pub fn is_filler(&self) -> bool {
        self.dictator_id.is_none()
    }
}

/// Row to be written by the assigner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAllocation {
    pub recipient_id: String,
    pub dictator_id: Option<String>,
    pub round_number: i64,
    pub part: Option<i64>,
    pub allocated_value: i64,
}

/// One line of the payment export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantTotal {
    pub participant_id: String,
    pub total_allocated: i64,
}

pub fn count_for_recipient(conn: &Connection, recipient_id: &str) -> Result<u32> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM recipient_allocations WHERE recipient_id = ?",
        [recipient_id],
        |row| row.get(0),
    )?;
    Ok(count as u32)
}

pub fn list_for_recipient(conn: &Connection, recipient_id: &str) -> Result<Vec<AllocationRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, recipient_id, dictator_id, round_number, part, allocated_value, assigned_at
         FROM recipient_allocations
         WHERE recipient_id = ?
         ORDER BY round_number, id",
    )?;
    let rows = stmt
        .query_map([recipient_id], AllocationRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn insert_allocation(conn: &Connection, row: &NewAllocation) -> Result<()> {
    conn.execute(
        "INSERT INTO recipient_allocations
             (recipient_id, dictator_id, round_number, part, allocated_value)
         VALUES (?, ?, ?, ?, ?)",
        params![
            row.recipient_id,
            row.dictator_id,
            row.round_number,
            row.part,
            row.allocated_value,
        ],
    )?;
    Ok(())
}

/// Lowest synthetic round already used by this recipient's fillers (0 if none)
pub fn lowest_filler_round(conn: &Connection, recipient_id: &str) -> Result<i64> {
    let lowest: Option<i64> = conn.query_row(
        "SELECT MIN(round_number) FROM recipient_allocations
         WHERE recipient_id = ? AND dictator_id IS NULL",
        [recipient_id],
        |row| row.get(0),
    )?;
    Ok(lowest.unwrap_or(0).min(0))
}

/// Administrative removal of every row held by a recipient
pub fn delete_for_recipient(conn: &Connection, recipient_id: &str) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM recipient_allocations WHERE recipient_id = ?",
        [recipient_id],
    )?;
    info!(recipient_id, deleted, "Deleted recipient allocations");
    Ok(deleted)
}

/// Total allocated value per distinct recipient
pub fn export_totals(conn: &Connection) -> Result<Vec<ParticipantTotal>> {
    let mut stmt = conn.prepare_cached(
        "SELECT recipient_id, SUM(allocated_value) AS total
         FROM recipient_allocations
         GROUP BY recipient_id
         ORDER BY recipient_id",
    )?;
    let totals = stmt
        .query_map([], |row| {
            Ok(ParticipantTotal {
                participant_id: row.get(0)?,
                total_allocated: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn new_row(recipient: &str, dictator: Option<&str>, round: i64, value: i64) -> NewAllocation {
        NewAllocation {
            recipient_id: recipient.to_string(),
            dictator_id: dictator.map(str::to_string),
            round_number: round,
            part: None,
            allocated_value: value,
        }
    }

    #[test]
    fn test_list_orders_by_round() {
        let conn = conn();
        insert_allocation(&conn, &new_row("r1", Some("d1"), 5, 20)).unwrap();
        insert_allocation(&conn, &new_row("r1", None, -1, 0)).unwrap();
        insert_allocation(&conn, &new_row("r1", Some("d1"), 2, 40)).unwrap();

        let rows = list_for_recipient(&conn, "r1").unwrap();
        let rounds: Vec<i64> = rows.iter().map(|r| r.round_number).collect();
        assert_eq!(rounds, vec![-1, 2, 5]);
        assert!(rows[0].is_filler());
        assert_eq!(count_for_recipient(&conn, "r1").unwrap(), 3);
        assert_eq!(count_for_recipient(&conn, "r2").unwrap(), 0);
    }

    #[test]
    fn test_lowest_filler_round() {
        let conn = conn();
        assert_eq!(lowest_filler_round(&conn, "r1").unwrap(), 0);
        insert_allocation(&conn, &new_row("r1", None, -1, 0)).unwrap();
        insert_allocation(&conn, &new_row("r1", None, -2, 0)).unwrap();
        assert_eq!(lowest_filler_round(&conn, "r1").unwrap(), -2);
    }

    #[test]
    fn test_export_one_line_per_recipient() {
        let conn = conn();
        insert_allocation(&conn, &new_row("bob", Some("d1"), 1, 30)).unwrap();
        insert_allocation(&conn, &new_row("bob", Some("d1"), 2, 70)).unwrap();
        insert_allocation(&conn, &new_row("alice", Some("d2"), 1, 15)).unwrap();

        let totals = export_totals(&conn).unwrap();
        assert_eq!(
            totals,
            vec![
                ParticipantTotal { participant_id: "alice".into(), total_allocated: 15 },
                ParticipantTotal { participant_id: "bob".into(), total_allocated: 100 },
            ]
        );
    }

    #[test]
    fn test_delete_only_touches_recipient() {
        let conn = conn();
        insert_allocation(&conn, &new_row("r1", Some("d1"), 1, 30)).unwrap();
        insert_allocation(&conn, &new_row("r2", Some("d1"), 2, 30)).unwrap();

        assert_eq!(delete_for_recipient(&conn, "r1").unwrap(), 1);
        assert_eq!(delete_for_recipient(&conn, "r1").unwrap(), 0);
        assert_eq!(count_for_recipient(&conn, "r2").unwrap(), 1);
    }
}
