//! Allocation assignment
//!
//! Hands unclaimed dictator rounds to a recipient. Each attempt runs in an
//! IMMEDIATE transaction so the claim check and the inserts see the same
//! pool; a uniqueness violation or a busy database means another recipient
//! got there first and the attempt is retried from scratch.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use rusqlite::{Connection, ErrorCode, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{AssignmentConfig, ExhaustionPolicy, SelectionMode};
use crate::db::allocations::{self, NewAllocation};
use crate::db::pool::{self, part_of, PoolRow};
use crate::db::AllocationDb;
use crate::error::{FlowError, Result};

/// Result of a successful assignment call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssignOutcome {
    /// The recipient already held the target count; nothing was written
    AlreadyAssigned { existing: u32 },
    /// New rows were written
    Assigned { claimed: u32, filler: u32, total: u32 },
}

impl AssignOutcome {
    /// Rows the recipient holds after the call
    pub fn total(&self) -> u32 {
        match self {
            Self::AlreadyAssigned { existing } => *existing,
            Self::Assigned { total, .. } => *total,
        }
    }

    /// True when the pool ran short and zero-value fillers were written
    pub fn used_filler(&self) -> bool {
        matches!(self, Self::Assigned { filler, .. } if *filler > 0)
    }

    /// The call met its target without padding
    pub fn is_complete(&self) -> bool {
        !self.used_filler()
    }
}

/// Assigns pool rows to recipients under one configured policy
#[derive(Debug, Clone)]
pub struct Assigner {
    settings: AssignmentConfig,
}

impl Assigner {
    pub fn new(settings: AssignmentConfig) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AssignmentConfig {
        &self.settings
    }

    /// Make sure `recipient_id` holds `target_count` rows
    pub fn assign(&self, db: &AllocationDb, recipient_id: &str, target_count: u32) -> Result<AssignOutcome> {
        self.assign_with_rng(db, recipient_id, target_count, &mut rand::thread_rng())
    }

    /// Same as [`Assigner::assign`] with a caller-supplied random source
    pub fn assign_with_rng<R: Rng + ?Sized>(
        &self,
        db: &AllocationDb,
        recipient_id: &str,
        target_count: u32,
        rng: &mut R,
    ) -> Result<AssignOutcome> {
        let recipient_id = recipient_id.trim();
        if recipient_id.is_empty() {
            return Err(FlowError::InvalidParticipant("empty recipient id".into()));
        }

        // Repeat visits stay read-only
        let existing = db.with_conn(|conn| allocations::count_for_recipient(conn, recipient_id))?;
        if existing >= target_count {
            debug!(recipient_id, existing, "Recipient already assigned");
            return Ok(AssignOutcome::AlreadyAssigned { existing });
        }

        let attempts = self.settings.max_retries.max(1);
        for attempt in 1..=attempts {
            let result = db.with_conn_mut(|conn| self.claim(conn, recipient_id, target_count, &mut *rng));
            match result {
                Err(FlowError::Database(e)) if is_conflict(&e) => {
                    warn!(recipient_id, attempt, error = %e, "Allocation claim conflicted, retrying");
                }
                other => return other,
            }
        }

        Err(FlowError::ConflictRetriesExhausted(attempts))
    }

    fn claim<R: Rng + ?Sized>(
        &self,
        conn: &mut Connection,
        recipient_id: &str,
        target_count: u32,
        rng: &mut R,
    ) -> Result<AssignOutcome> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = allocations::count_for_recipient(&tx, recipient_id)?;
        if existing >= target_count {
            debug!(recipient_id, existing, "Recipient already assigned");
            return Ok(AssignOutcome::AlreadyAssigned { existing });
        }

        let remaining = target_count - existing;
        let picks = self.select(&tx, remaining, rng)?;
        let claimed = picks.len() as u32;

        if claimed < remaining && self.settings.exhaustion_policy == ExhaustionPolicy::Fail {
            warn!(recipient_id, requested = remaining, available = claimed, "Allocation pool exhausted");
            return Err(FlowError::PoolExhausted {
                requested: remaining,
                available: claimed,
            });
        }

        for row in &picks {
            let received = row
                .received()
                .ok_or_else(|| FlowError::Internal(format!("pool row {:?} has no decision", row)))?;
            allocations::insert_allocation(
                &tx,
                &NewAllocation {
                    recipient_id: recipient_id.to_string(),
                    dictator_id: Some(row.dictator_id.clone()),
                    round_number: row.round_number,
                    part: part_of(row.round_number, self.settings.rounds_per_part),
                    allocated_value: received,
                },
            )?;
        }

        let filler = remaining - claimed;
        if filler > 0 {
            let lowest = allocations::lowest_filler_round(&tx, recipient_id)?;
            for offset in 1..=i64::from(filler) {
                allocations::insert_allocation(
                    &tx,
                    &NewAllocation {
                        recipient_id: recipient_id.to_string(),
                        dictator_id: None,
                        round_number: lowest - offset,
                        part: None,
                        allocated_value: 0,
                    },
                )?;
            }
        }

        tx.commit()?;

        info!(recipient_id, claimed, filler, total = target_count, "Assigned allocations");
        Ok(AssignOutcome::Assigned {
            claimed,
            filler,
            total: target_count,
        })
    }

    /// Draw up to `wanted` unclaimed rows according to the selection mode
    fn select<R: Rng + ?Sized>(&self, conn: &Connection, wanted: u32, rng: &mut R) -> Result<Vec<PoolRow>> {
        let mut rows = pool::unclaimed_rows(conn)?;

        match self.settings.selection {
            SelectionMode::Rounds => {
                rows.shuffle(rng);
            }
            SelectionMode::DictatorPart => {
                let mut blocks: BTreeMap<(String, i64), Vec<PoolRow>> = BTreeMap::new();
                for row in rows {
                    if let Some(part) = part_of(row.round_number, self.settings.rounds_per_part) {
                        blocks.entry((row.dictator_id.clone(), part)).or_default().push(row);
                    }
                }
                // Full blocks when any exist, otherwise the largest ones left
                let largest = blocks.values().map(Vec::len).max().unwrap_or(0);
                let needed = (wanted as usize).min(largest);
                let keys: Vec<&(String, i64)> = blocks
                    .iter()
                    .filter(|(_, block)| block.len() >= needed)
                    .map(|(key, _)| key)
                    .collect();
                rows = match keys.choose(rng) {
                    Some(&key) => {
                        debug!(dictator_id = %key.0, part = key.1, "Selected dictator block");
                        blocks[key].clone()
                    }
                    None => Vec::new(),
                };
            }
        }

        rows.truncate(wanted as usize);
        Ok(rows)
    }
}

/// Errors that mean "someone else claimed first", worth another attempt
pub fn is_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::ConstraintViolation | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::pool::import_pool;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pool_db(rows: &[(&str, i64, i64)]) -> AllocationDb {
        let db = AllocationDb::open_in_memory().unwrap();
        let rows: Vec<PoolRow> = rows
            .iter()
            .map(|(d, r, kept)| PoolRow {
                dictator_id: d.to_string(),
                round_number: *r,
                kept: Some(*kept),
            })
            .collect();
        db.with_conn_mut(|conn| import_pool(conn, &rows)).unwrap();
        db
    }

    fn assigner(policy: ExhaustionPolicy, selection: SelectionMode) -> Assigner {
        Assigner::new(AssignmentConfig {
            exhaustion_policy: policy,
            selection,
            ..AssignmentConfig::default()
        })
    }

    fn rows_of(db: &AllocationDb, recipient: &str) -> Vec<allocations::AllocationRow> {
        db.with_conn(|conn| allocations::list_for_recipient(conn, recipient)).unwrap()
    }

    #[test]
    fn test_second_call_is_noop() {
        let db = pool_db(&[("d1", 1, 50), ("d1", 2, 60), ("d2", 1, 10), ("d2", 2, 0)]);
        let assigner = assigner(ExhaustionPolicy::Fail, SelectionMode::Rounds);

        let first = assigner.assign(&db, "r1", 3).unwrap();
        assert_eq!(first, AssignOutcome::Assigned { claimed: 3, filler: 0, total: 3 });
        let before = rows_of(&db, "r1");

        let second = assigner.assign(&db, "r1", 3).unwrap();
        assert_eq!(second, AssignOutcome::AlreadyAssigned { existing: 3 });
        assert!(second.is_complete());
        assert_eq!(rows_of(&db, "r1"), before);
    }

    #[test]
    fn test_recipient_value_is_endowment_minus_kept() {
        let db = pool_db(&[("d1", 12, 70)]);
        let assigner = assigner(ExhaustionPolicy::Fail, SelectionMode::Rounds);
        assigner.assign(&db, "r1", 1).unwrap();

        let rows = rows_of(&db, "r1");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].allocated_value, 30);
        assert_eq!(rows[0].part, Some(2));
        assert_eq!(rows[0].dictator_id.as_deref(), Some("d1"));
    }

    #[test]
    fn test_zero_fill_pads_shortfall() {
        let db = pool_db(&[("d1", 1, 50), ("d1", 2, 60)]);
        let assigner = assigner(ExhaustionPolicy::ZeroFill, SelectionMode::Rounds);

        let outcome = assigner.assign(&db, "r1", 3).unwrap();
        assert_eq!(outcome, AssignOutcome::Assigned { claimed: 2, filler: 1, total: 3 });
        assert!(outcome.used_filler());
        assert!(!outcome.is_complete());

        let rows = rows_of(&db, "r1");
        assert_eq!(rows.len(), 3);
        let fillers: Vec<_> = rows.iter().filter(|r| r.is_filler()).collect();
        assert_eq!(fillers.len(), 1);
        assert_eq!(fillers[0].allocated_value, 0);
        assert_eq!(fillers[0].round_number, -1);
    }

    #[test]
    fn test_filler_rounds_continue_downward_on_top_up() {
        let db = pool_db(&[]);
        let assigner = assigner(ExhaustionPolicy::ZeroFill, SelectionMode::Rounds);

        assigner.assign(&db, "r1", 2).unwrap();
        assigner.assign(&db, "r1", 4).unwrap();

        let rounds: Vec<i64> = rows_of(&db, "r1").iter().map(|r| r.round_number).collect();
        assert_eq!(rounds, vec![-4, -3, -2, -1]);
    }

    #[test]
    fn test_fail_policy_writes_nothing() {
        let db = pool_db(&[("d1", 1, 50), ("d1", 2, 60)]);
        let assigner = assigner(ExhaustionPolicy::Fail, SelectionMode::Rounds);

        let err = assigner.assign(&db, "r1", 3).unwrap_err();
        assert!(matches!(err, FlowError::PoolExhausted { requested: 3, available: 2 }));
        assert!(rows_of(&db, "r1").is_empty());
    }

    #[test]
    fn test_top_up_only_requests_remaining() {
        let db = pool_db(&[("d1", 1, 50), ("d1", 2, 60), ("d1", 3, 70)]);
        let assigner = assigner(ExhaustionPolicy::Fail, SelectionMode::Rounds);

        assigner.assign(&db, "r1", 1).unwrap();
        let outcome = assigner.assign(&db, "r1", 3).unwrap();
        assert_eq!(outcome, AssignOutcome::Assigned { claimed: 2, filler: 0, total: 3 });
    }

    #[test]
    fn test_rows_never_shared_between_recipients() {
        let db = pool_db(&[("d1", 1, 50), ("d1", 2, 60), ("d2", 1, 10), ("d2", 2, 20)]);
        let assigner = assigner(ExhaustionPolicy::ZeroFill, SelectionMode::Rounds);

        assigner.assign(&db, "r1", 3).unwrap();
        let second = assigner.assign(&db, "r2", 3).unwrap();
        assert_eq!(second, AssignOutcome::Assigned { claimed: 1, filler: 2, total: 3 });

        let status = db.with_conn(pool::pool_status).unwrap();
        assert_eq!(status.claimed, 4);
        assert_eq!(status.available, 0);
    }

    #[test]
    fn test_dictator_part_stays_in_one_block() {
        let mut pool = Vec::new();
        for round in 1..=20 {
            pool.push(("d1", round, 40));
            pool.push(("d2", round, 60));
        }
        let db = pool_db(&pool);
        let assigner = assigner(ExhaustionPolicy::Fail, SelectionMode::DictatorPart);

        let mut rng = StdRng::seed_from_u64(7);
        assigner.assign_with_rng(&db, "r1", 10, &mut rng).unwrap();

        let rows = rows_of(&db, "r1");
        assert_eq!(rows.len(), 10);
        let dictator = rows[0].dictator_id.clone();
        let part = rows[0].part;
        assert!(rows.iter().all(|r| r.dictator_id == dictator && r.part == part));
    }

    fn split_pool() -> AllocationDb {
        // d1 has a full first part; d2 skipped round 5
        let mut rows = Vec::new();
        for round in 1..=10 {
            rows.push(PoolRow { dictator_id: "d1".into(), round_number: round, kept: Some(40) });
            let kept = if round == 5 { None } else { Some(60) };
            rows.push(PoolRow { dictator_id: "d2".into(), round_number: round, kept });
        }
        let db = AllocationDb::open_in_memory().unwrap();
        db.with_conn_mut(|conn| import_pool(conn, &rows)).unwrap();
        db
    }

    #[test]
    fn test_dictator_part_fail_uses_a_full_block() {
        let assigner = assigner(ExhaustionPolicy::Fail, SelectionMode::DictatorPart);
        for seed in 0..16 {
            let db = split_pool();
            let mut rng = StdRng::seed_from_u64(seed);
            let outcome = assigner.assign_with_rng(&db, "r1", 10, &mut rng).unwrap();
            assert_eq!(outcome, AssignOutcome::Assigned { claimed: 10, filler: 0, total: 10 });

            let rows = rows_of(&db, "r1");
            assert!(rows.iter().all(|r| r.dictator_id.as_deref() == Some("d1")));
        }
    }

    #[test]
    fn test_dictator_part_fail_when_no_block_is_full() {
        let db = split_pool();
        let assigner = assigner(ExhaustionPolicy::Fail, SelectionMode::DictatorPart);
        assigner.assign(&db, "r1", 10).unwrap();

        // Only d2's nine-row block is left
        let err = assigner.assign(&db, "r2", 10).unwrap_err();
        assert!(matches!(err, FlowError::PoolExhausted { requested: 10, available: 9 }));
        assert!(rows_of(&db, "r2").is_empty());
    }

    #[test]
    fn test_dictator_part_zero_fill_takes_largest_block() {
        let mut pool = Vec::new();
        for round in 1..=6 {
            pool.push(("d1", round, 50));
        }
        for round in 1..=3 {
            pool.push(("d2", round, 50));
        }
        let assigner = assigner(ExhaustionPolicy::ZeroFill, SelectionMode::DictatorPart);
        for seed in 0..8 {
            let db = pool_db(&pool);
            let mut rng = StdRng::seed_from_u64(seed);
            let outcome = assigner.assign_with_rng(&db, "r1", 10, &mut rng).unwrap();
            assert_eq!(outcome, AssignOutcome::Assigned { claimed: 6, filler: 4, total: 10 });
        }
    }

    #[test]
    fn test_blank_recipient_rejected() {
        let db = pool_db(&[("d1", 1, 50)]);
        let assigner = assigner(ExhaustionPolicy::Fail, SelectionMode::Rounds);
        assert!(matches!(
            assigner.assign(&db, "   ", 1),
            Err(FlowError::InvalidParticipant(_))
        ));
    }

    #[test]
    fn test_conflict_classification() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k INTEGER PRIMARY KEY); INSERT INTO t VALUES (1);")
            .unwrap();
        let dup = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();
        assert!(is_conflict(&dup));

        let missing = conn.execute("INSERT INTO nope VALUES (1)", []).unwrap_err();
        assert!(!is_conflict(&missing));
        assert!(!is_conflict(&rusqlite::Error::QueryReturnedNoRows));
    }
}
