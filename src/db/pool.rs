//! Dictator pool: rows available for assignment

use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Points split between dictator and recipient in every round
pub const ROUND_ENDOWMENT: i64 = 100;

/// One dictator decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRow {
    pub dictator_id: String,
    pub round_number: i64,
    /// Points the dictator kept; `None` when the round has no decision
    pub kept: Option<i64>,
}

impl PoolRow {
    fn from_row(row: &Row) -> std::result::Result<Self, rusqlite::Error> {
        Ok(Self {
            dictator_id: row.get("dictator_id")?,
            round_number: row.get("round_number")?,
            kept: row.get("kept")?,
        })
    }

    /// Points the recipient receives from this decision
    pub fn received(&self) -> Option<i64> {
        self.kept.map(|kept| ROUND_ENDOWMENT - kept)
    }
}

/// Pool occupancy snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub eligible: u64,
    pub claimed: u64,
    pub available: u64,
    pub recipients: u64,
}

/// Part (block of rounds) a round belongs to; synthetic rounds have none
pub fn part_of(round_number: i64, rounds_per_part: u32) -> Option<i64> {
    if round_number < 1 {
        return None;
    }
    Some((round_number - 1) / i64::from(rounds_per_part) + 1)
}

const ELIGIBLE: &str = "d.kept IS NOT NULL AND d.kept BETWEEN 0 AND 100";

/// Load dictator decisions, skipping (dictator, round) pairs already present
pub fn import_pool(conn: &mut Connection, rows: &[PoolRow]) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO dictator_rounds (dictator_id, round_number, kept) VALUES (?, ?, ?)",
        )?;
        for row in rows {
            inserted += stmt.execute(params![row.dictator_id, row.round_number, row.kept])?;
        }
    }
    tx.commit()?;

    debug!(offered = rows.len(), inserted, "Imported pool rows");
    Ok(inserted)
}

/// Eligible pool rows no recipient has claimed yet, in (dictator, round) order
pub fn unclaimed_rows(conn: &Connection) -> Result<Vec<PoolRow>> {
    let sql = format!(
        "SELECT d.dictator_id, d.round_number, d.kept
         FROM dictator_rounds d
         WHERE {ELIGIBLE}
           AND NOT EXISTS (
               SELECT 1 FROM recipient_allocations r
               WHERE r.dictator_id = d.dictator_id
                 AND r.round_number = d.round_number
           )
         ORDER BY d.dictator_id, d.round_number"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map([], PoolRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn pool_status(conn: &Connection) -> Result<PoolStatus> {
    let eligible: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM dictator_rounds d WHERE {ELIGIBLE}"),
        [],
        |row| row.get(0),
    )?;
    let claimed: i64 = conn.query_row(
        "SELECT COUNT(*) FROM recipient_allocations WHERE dictator_id IS NOT NULL",
        [],
        |row| row.get(0),
    )?;
    let recipients: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT recipient_id) FROM recipient_allocations",
        [],
        |row| row.get(0),
    )?;

    Ok(PoolStatus {
        eligible: eligible as u64,
        claimed: claimed as u64,
        available: eligible.saturating_sub(claimed).max(0) as u64,
        recipients: recipients as u64,
    })
}
