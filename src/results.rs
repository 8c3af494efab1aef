//! Payment summary shown on the results and debriefing pages

use rusqlite::Connection;
use serde::Serialize;

use crate::config::{PayoutConfig, Rounding};
use crate::db::allocations;
use crate::db::pool::ROUND_ENDOWMENT;
use crate::error::{FlowError, Result};

/// One round as shown to the recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub round: i64,
    pub received: i64,
    /// What the dictator kept; fillers have no dictator
    pub kept: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultsView {
    pub participant_id: String,
    pub dictator_id: Option<String>,
    pub chosen_part: Option<i64>,
    pub rows: Vec<ResultRow>,
    pub total_received: i64,
    pub payout_cents: i64,
    pub filler_rows: u32,
}

impl ResultsView {
    /// Build the view from the recipient's stored rows
    pub fn load(conn: &Connection, participant_id: &str, payout: &PayoutConfig) -> Result<Self> {
        let stored = allocations::list_for_recipient(conn, participant_id)?;
        if stored.is_empty() {
            return Err(FlowError::MissingAllocations(participant_id.to_string()));
        }

        let first_real = stored.iter().find(|r| !r.is_filler());
        let rows: Vec<ResultRow> = stored
            .iter()
            .map(|r| ResultRow {
                round: r.round_number,
                received: r.allocated_value,
                kept: r.dictator_id.as_ref().map(|_| ROUND_ENDOWMENT - r.allocated_value),
            })
            .collect();
        let total_received: i64 = rows.iter().map(|r| r.received).sum();

        Ok(Self {
            participant_id: participant_id.to_string(),
            dictator_id: first_real.and_then(|r| r.dictator_id.clone()),
            chosen_part: first_real.and_then(|r| r.part),
            total_received,
            payout_cents: payout_cents(total_received, payout),
            filler_rows: stored.iter().filter(|r| r.is_filler()).count() as u32,
            rows,
        })
    }
}

/// Convert received points to cents
pub fn payout_cents(total_points: i64, payout: &PayoutConfig) -> i64 {
    let per_cent = i64::from(payout.points_per_cent.max(1));
    match payout.rounding {
        Rounding::Truncate => total_points / per_cent,
        Rounding::Ceiling => {
            let whole = total_points / per_cent;
            if total_points % per_cent > 0 {
                whole + 1
            } else {
                whole
            }
        }
    }
}
