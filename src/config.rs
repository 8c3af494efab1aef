//! Service configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FlowError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub assignment: AssignmentConfig,
    #[serde(default)]
    pub quiz: QuizConfig,
    #[serde(default)]
    pub payout: PayoutConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Token required by admin endpoints (disabled when unset)
    #[serde(default)]
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// How long a writer waits on a locked database
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

/// What to do when the pool cannot cover a recipient's target count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Roll back and report the shortfall
    Fail,
    /// Insert what exists and pad with zero-value filler rows
    ZeroFill,
}

/// How candidate rows are drawn from the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Independent random rows across all dictators
    Rounds,
    /// All rows from one random (dictator, part) block
    DictatorPart,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentConfig {
    /// Rows each recipient should end up with
    #[serde(default = "default_target_count")]
    pub target_count: u32,

    #[serde(default = "default_exhaustion_policy")]
    pub exhaustion_policy: ExhaustionPolicy,

    #[serde(default = "default_selection")]
    pub selection: SelectionMode,

    /// Attempts before a conflicting claim is given up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Rounds per part block (1-10, 11-20, ...)
    #[serde(default = "default_rounds_per_part")]
    pub rounds_per_part: u32,
}

/// One comprehension question and its accepted answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: String,
    pub answer: String,
    pub choices: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizConfig {
    /// Failed submissions before the participant is excluded
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_questions")]
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    Ceiling,
    Truncate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutConfig {
    /// Points that make up one cent
    #[serde(default = "default_points_per_cent")]
    pub points_per_cent: u32,

    #[serde(default = "default_rounding")]
    pub rounding: Rounding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Participant ids planted to catch automated respondents
    #[serde(default)]
    pub automated_participant_ids: Vec<String>,

    /// Seconds an unfinished session stays open
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: u64,
}

fn default_http_port() -> u16 { 8080 }
fn default_db_path() -> PathBuf { PathBuf::from("recipient.db") }
fn default_busy_timeout() -> u64 { 5000 }
fn default_target_count() -> u32 { 10 }
fn default_exhaustion_policy() -> ExhaustionPolicy { ExhaustionPolicy::Fail }
fn default_selection() -> SelectionMode { SelectionMode::Rounds }
fn default_max_retries() -> u32 { 5 }
fn default_rounds_per_part() -> u32 { 10 }
fn default_max_attempts() -> u32 { 3 }
fn default_points_per_cent() -> u32 { 10 }
fn default_rounding() -> Rounding { Rounding::Ceiling }
fn default_session_ttl() -> u64 { 7200 }

fn default_questions() -> Vec<QuizQuestion> {
    let abcd = || vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
    let ab = || vec!["a".to_string(), "b".to_string()];

    [
        ("q1", "b", abcd()),
        ("q2", "c", abcd()),
        ("q3", "b", abcd()),
        ("q4", "d", abcd()),
        ("q5", "a", abcd()),
        ("q6", "a", abcd()),
        ("q7", "b", ab()),
        ("q8", "a", ab()),
    ]
    .into_iter()
    .map(|(id, answer, choices)| QuizQuestion {
        id: id.to_string(),
        answer: answer.to_string(),
        choices,
    })
    .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            admin_token: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            exhaustion_policy: default_exhaustion_policy(),
            selection: default_selection(),
            max_retries: default_max_retries(),
            rounds_per_part: default_rounds_per_part(),
        }
    }
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            questions: default_questions(),
        }
    }
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            points_per_cent: default_points_per_cent(),
            rounding: default_rounding(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            automated_participant_ids: Vec::new(),
            ttl_seconds: default_session_ttl(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| FlowError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the flow cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.assignment.max_retries == 0 {
            return Err(FlowError::Config("assignment.max_retries must be at least 1".into()));
        }
        if self.assignment.rounds_per_part == 0 {
            return Err(FlowError::Config("assignment.rounds_per_part must be at least 1".into()));
        }
        if self.payout.points_per_cent == 0 {
            return Err(FlowError::Config("payout.points_per_cent must be at least 1".into()));
        }
        if self.session.ttl_seconds == 0 {
            return Err(FlowError::Config("session.ttl_seconds must be at least 1".into()));
        }
        if self.quiz.max_attempts == 0 {
            return Err(FlowError::Config("quiz.max_attempts must be at least 1".into()));
        }
        for q in &self.quiz.questions {
            if !q.choices.contains(&q.answer) {
                return Err(FlowError::Config(format!(
                    "quiz question {} answer '{}' is not among its choices",
                    q.id, q.answer
                )));
            }
        }
        Ok(())
    }
}
