//! Comprehension quiz grading

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::{QuizConfig, QuizQuestion};
use crate::error::{FlowError, Result};
use crate::session::RecipientSession;

/// Submitted answers keyed by question id (`q1`..`q8`)
pub type QuizAnswers = HashMap<String, String>;

/// Grades submissions against a fixed answer key
#[derive(Debug, Clone)]
pub struct QuizGrader {
    questions: Vec<QuizQuestion>,
    max_attempts: u32,
}

impl QuizGrader {
    pub fn new(config: &QuizConfig) -> Self {
        Self {
            questions: config.questions.clone(),
            max_attempts: config.max_attempts,
        }
    }

    pub fn questions(&self) -> &[QuizQuestion] {
        &self.questions
    }

    /// Reject values that are not one of a question's choices
    pub fn validate(&self, answers: &QuizAnswers) -> Result<()> {
        for question in &self.questions {
            if let Some(value) = answers.get(&question.id) {
                if !question.choices.contains(value) {
                    return Err(FlowError::InvalidAnswer {
                        question: question.id.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Question ids answered wrongly (missing counts as wrong), in key order
    pub fn wrong_questions(&self, answers: &QuizAnswers) -> Vec<&str> {
        self.questions
            .iter()
            .filter(|q| answers.get(&q.id) != Some(&q.answer))
            .map(|q| q.id.as_str())
            .collect()
    }

    /// Grade a submission, updating the session's attempt count
    ///
    /// Returns the message to show when the participant must try again.
    /// The failure that uses up the last attempt excludes the participant
    /// and returns `None`: the flow moves on to the exclusion page instead.
    pub fn grade(&self, session: &mut RecipientSession, answers: &QuizAnswers) -> Option<String> {
        let wrong = self.wrong_questions(answers);
        if wrong.is_empty() {
            debug!(participant = %session.participant_id, "Quiz passed");
            return None;
        }

        session.quiz_attempts += 1;

        if session.quiz_attempts >= self.max_attempts {
            session.excluded = true;
            info!(
                participant = %session.participant_id,
                attempts = session.quiz_attempts,
                "Participant excluded after failed comprehension attempts"
            );
            return None;
        }

        Some(format!(
            "You answered these questions incorrectly: {}",
            wrong.join(", ")
        ))
    }
}
