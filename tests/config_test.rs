//! Config loading and defaults integration tests

use recipient_flow::config::{Config, ExhaustionPolicy, Rounding, SelectionMode};
use recipient_flow::FlowError;
use tempfile::TempDir;

#[test]
fn test_load_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("recipient-flow.toml");
    std::fs::write(
        &path,
        r#"
[server]
http_port = 9090
admin_token = "let-me-in"

[database]
path = "/var/lib/recipient/recipient.db"
busy_timeout_ms = 2000

[assignment]
target_count = 10
exhaustion_policy = "zero_fill"
selection = "dictator_part"
max_retries = 5
rounds_per_part = 10

[quiz]
max_attempts = 2

[[quiz.questions]]
id = "q1"
answer = "b"
choices = ["a", "b"]

[payout]
points_per_cent = 10
rounding = "truncate"

[session]
automated_participant_ids = ["AI-SENTINEL"]
ttl_seconds = 900
"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.server.http_port, 9090);
    assert_eq!(config.server.admin_token.as_deref(), Some("let-me-in"));
    assert_eq!(config.database.busy_timeout_ms, 2000);
    assert_eq!(config.assignment.exhaustion_policy, ExhaustionPolicy::ZeroFill);
    assert_eq!(config.assignment.selection, SelectionMode::DictatorPart);
    assert_eq!(config.quiz.max_attempts, 2);
    assert_eq!(config.quiz.questions.len(), 1);
    assert_eq!(config.payout.rounding, Rounding::Truncate);
    assert_eq!(config.session.automated_participant_ids, vec!["AI-SENTINEL".to_string()]);
    assert_eq!(config.session.ttl_seconds, 900);
}

#[test]
fn test_partial_config_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.toml");
    std::fs::write(&path, "[assignment]\ntarget_count = 4\n").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.assignment.target_count, 4);
    assert_eq!(config.assignment.max_retries, 5);
    assert_eq!(config.server.http_port, 8080);
    assert_eq!(config.quiz.questions.len(), 8);
}

#[test]
fn test_invalid_toml_returns_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "this is not valid { toml }}}").unwrap();
    assert!(matches!(Config::load(&path), Err(FlowError::Config(_))));
}

#[test]
fn test_unknown_policy_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("policy.toml");
    std::fs::write(&path, "[assignment]\nexhaustion_policy = \"top_up_later\"\n").unwrap();
    assert!(Config::load(&path).is_err());
}

#[test]
fn test_missing_file_is_io_error() {
    let result = Config::load(std::path::Path::new("/nonexistent/recipient-flow.toml"));
    assert!(matches!(result, Err(FlowError::Io(_))));
}
