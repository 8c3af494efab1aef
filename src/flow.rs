//! Recipient page flow
//!
//! ```text
//! Consent -> Instructions -> Quiz -> Excluded                      (terminal)
//!                                 \-> Results -> Debriefing -> ThankYou (terminal)
//! ```
//!
//! Pages are skipped by display predicates over the session flags; the flow
//! never goes backwards.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assign::Assigner;
use crate::config::{Config, PayoutConfig};
use crate::db::{allocations, exclusions, AllocationDb};
use crate::error::{FlowError, Result};
use crate::quiz::{QuizAnswers, QuizGrader};
use crate::results::ResultsView;
use crate::session::RecipientSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Consent,
    Instructions,
    Quiz,
    Excluded,
    Results,
    Debriefing,
    ThankYou,
}

impl Page {
    pub const SEQUENCE: [Page; 7] = [
        Page::Consent,
        Page::Instructions,
        Page::Quiz,
        Page::Excluded,
        Page::Results,
        Page::Debriefing,
        Page::ThankYou,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Page::Excluded | Page::ThankYou)
    }

    pub fn is_displayed(self, session: &RecipientSession) -> bool {
        let screened_out = session.excluded || session.automated;
        match self {
            Page::Consent => true,
            Page::Instructions => !screened_out && !session.returning,
            Page::Quiz => !screened_out && !session.returning,
            Page::Excluded => screened_out,
            Page::Results | Page::Debriefing | Page::ThankYou => !screened_out,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Page::Consent => "consent",
            Page::Instructions => "instructions",
            Page::Quiz => "quiz",
            Page::Excluded => "excluded",
            Page::Results => "results",
            Page::Debriefing => "debriefing",
            Page::ThankYou => "thank_you",
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Next page the session should see after `current`, `None` at the end
pub fn next_page(current: Page, session: &RecipientSession) -> Option<Page> {
    if current.is_terminal() {
        return None;
    }
    let pos = Page::SEQUENCE.iter().position(|p| *p == current)?;
    Page::SEQUENCE[pos + 1..]
        .iter()
        .copied()
        .find(|p| p.is_displayed(session))
}

/// Reason stored when the comprehension quiz attempts run out
pub const EXCLUSION_QUIZ: &str = "comprehension_quiz";

/// Answer to a quiz submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizResponse {
    pub error_message: Option<String>,
    pub page: Page,
}

/// Drives sessions through the pages, touching the store where needed
pub struct RecipientFlow {
    db: Arc<AllocationDb>,
    assigner: Assigner,
    grader: QuizGrader,
    payout: PayoutConfig,
    automated_ids: Vec<String>,
}

impl RecipientFlow {
    pub fn new(config: &Config, db: Arc<AllocationDb>) -> Self {
        Self {
            db,
            assigner: Assigner::new(config.assignment.clone()),
            grader: QuizGrader::new(&config.quiz),
            payout: config.payout.clone(),
            automated_ids: config.session.automated_participant_ids.clone(),
        }
    }

    pub fn db(&self) -> &Arc<AllocationDb> {
        &self.db
    }

    pub fn grader(&self) -> &QuizGrader {
        &self.grader
    }

    /// Consent page: register the participant id and assign allocations
    pub fn consent(&self, participant_id: &str) -> Result<RecipientSession> {
        let participant_id = participant_id.trim();
        if participant_id.is_empty() {
            return Err(FlowError::InvalidParticipant("participant id is required".into()));
        }

        let mut session = RecipientSession::new(participant_id);

        if self.automated_ids.iter().any(|id| id == participant_id) {
            warn!(participant = participant_id, "Automated respondent sentinel entered");
            session.automated = true;
        } else if self
            .db
            .with_conn(|conn| exclusions::is_excluded(conn, participant_id))?
        {
            info!(participant = participant_id, "Previously excluded participant returned");
            session.excluded = true;
        } else {
            let existing = self
                .db
                .with_conn(|conn| allocations::count_for_recipient(conn, participant_id))?;
            session.returning = existing > 0;
            self.ensure_assigned(&mut session)?;
        }

        session.page = self.next_or_stay(Page::Consent, &session);
        info!(
            participant = participant_id,
            page = %session.page,
            returning = session.returning,
            "Consent recorded"
        );
        Ok(session)
    }

    /// Leave a display-only page
    pub fn advance(&self, session: &mut RecipientSession) -> Result<Page> {
        match session.page {
            Page::Instructions | Page::Results | Page::Debriefing => {
                session.page = self.next_or_stay(session.page, session);
                Ok(session.page)
            }
            page => Err(FlowError::WrongPage {
                page: page.to_string(),
                action: "advance".into(),
            }),
        }
    }

    /// Grade a quiz submission and move on when it is settled
    pub fn submit_quiz(&self, session: &mut RecipientSession, answers: &QuizAnswers) -> Result<QuizResponse> {
        if session.page != Page::Quiz {
            return Err(FlowError::WrongPage {
                page: session.page.to_string(),
                action: "quiz submission".into(),
            });
        }
        self.grader.validate(answers)?;

        let was_excluded = session.excluded;
        let error_message = self.grader.grade(session, answers);
        if session.excluded && !was_excluded {
            self.db.with_conn(|conn| {
                exclusions::record_exclusion(conn, &session.participant_id, EXCLUSION_QUIZ)
            })?;
        }
        if error_message.is_none() {
            session.page = self.next_or_stay(Page::Quiz, session);
        }

        Ok(QuizResponse {
            error_message,
            page: session.page,
        })
    }

    /// Payment summary for the results and debriefing pages
    pub fn results(&self, session: &mut RecipientSession) -> Result<ResultsView> {
        if !matches!(session.page, Page::Results | Page::Debriefing) {
            return Err(FlowError::WrongPage {
                page: session.page.to_string(),
                action: "results".into(),
            });
        }

        self.ensure_assigned(session)?;
        self.db
            .with_conn(|conn| ResultsView::load(conn, &session.participant_id, &self.payout))
    }

    /// Idempotent assignment; a short pool is recorded on the session
    fn ensure_assigned(&self, session: &mut RecipientSession) -> Result<()> {
        let target = self.assigner.settings().target_count;
        match self.assigner.assign(&self.db, &session.participant_id, target) {
            Ok(outcome) => {
                if outcome.used_filler() {
                    session.assignment_exhausted = true;
                }
                Ok(())
            }
            Err(FlowError::PoolExhausted { requested, available }) => {
                warn!(
                    participant = %session.participant_id,
                    requested,
                    available,
                    "Could not assign allocations"
                );
                session.assignment_exhausted = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn next_or_stay(&self, current: Page, session: &RecipientSession) -> Page {
        next_page(current, session).unwrap_or(current)
    }
}
