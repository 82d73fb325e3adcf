//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be loaded from disk,
//! validated, and turned into the paths and settings a run uses.

use annotator_engine::config::Config;
use annotator_engine::prompts::{PromptBook, ShotMode};
use sdk::types::StrategyKind;
use std::time::Duration;

#[test]
fn test_full_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");
    let config_path = dir.path().join("config.toml");

    let toml_content = format!(
        r#"
[core]
log_level = "debug"
data_dir = "{}"

[llm]
base_url = "http://localhost:8080/v1"
model = "local-model"
api_key = "sk-inline"
max_tokens = 256
temperature = 0.0

[gateway]
max_attempts = 5
initial_backoff_ms = 500
max_backoff_ms = 8000
timeout_secs = 30
requests_per_minute = 120

[scheduler]
strategies = ["single", "cot", "stepwise_long"]
concurrency_cap = 2
shot_mode = "few"

[memory]
max_context_tokens = 32000
warning_threshold = 0.8

[sessions]
overwrite = true
index_enabled = true
"#,
        data_dir.display()
    );
    std::fs::write(&config_path, toml_content).unwrap();

    let config = Config::load_from_path(&config_path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert!(data_dir.exists(), "data directory is created on load");
    assert_eq!(config.api_key().as_deref(), Some("sk-inline"));
    assert_eq!(config.gateway.max_attempts, 5);
    assert_eq!(config.gateway.initial_backoff(), Duration::from_millis(500));
    assert_eq!(config.gateway.timeout(), Duration::from_secs(30));
    assert_eq!(config.gateway.requests_per_minute, Some(120));
    assert_eq!(
        config.scheduler.strategies,
        vec![
            StrategyKind::Single,
            StrategyKind::Cot,
            StrategyKind::StepwiseLong
        ]
    );
    assert_eq!(config.scheduler.concurrency_cap, Some(2));
    assert_eq!(config.scheduler.shot_mode, ShotMode::Few);
    assert_eq!(config.memory.max_context_tokens, 32000);
    assert!(config.sessions.overwrite);
    assert!(config.sessions.index_enabled);

    assert_eq!(config.sessions_dir(), data_dir.join("sessions"));
    assert_eq!(
        config.output_dir("papers"),
        data_dir.join("tasks").join("papers").join("output")
    );
}

#[test]
fn test_minimal_config_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let toml_content = format!(
        "[core]\ndata_dir = \"{}\"\n",
        dir.path().join("data").display()
    );

    let config = Config::from_toml_str(&toml_content).unwrap();

    assert_eq!(config.core.log_level, "info");
    assert_eq!(config.llm.model, "deepseek-chat");
    assert_eq!(config.llm.api_key_env, "DEEPSEEK_API_KEY");
    assert_eq!(config.gateway.max_attempts, 3);
    assert_eq!(config.gateway.max_backoff(), Duration::from_secs(30));
    assert_eq!(config.scheduler.strategies, vec![StrategyKind::Single]);
    assert_eq!(config.scheduler.concurrency_cap, None);
    assert_eq!(config.scheduler.shot_mode, ShotMode::Zero);
    assert!(!config.sessions.overwrite);
    assert!(!config.sessions.index_enabled);
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let data_dir = dir.path().join("data");

    let bad_strategy = format!(
        "[core]\ndata_dir = \"{}\"\n[scheduler]\nstrategies = [\"majority_vote\"]\n",
        data_dir.display()
    );
    assert!(Config::from_toml_str(&bad_strategy).is_err());

    let bad_level = format!(
        "[core]\ndata_dir = \"{}\"\nlog_level = \"verbose\"\n",
        data_dir.display()
    );
    assert!(Config::from_toml_str(&bad_level).is_err());

    let zero_rate = format!(
        "[core]\ndata_dir = \"{}\"\n[gateway]\nrequests_per_minute = 0\n",
        data_dir.display()
    );
    assert!(Config::from_toml_str(&zero_rate).is_err());
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Config::load_from_path(&dir.path().join("absent.toml")).is_err());
}

#[test]
fn test_template_file_overrides_one_family() {
    let dir = tempfile::tempdir().unwrap();
    let templates = dir.path().join("prompts.toml");
    std::fs::write(
        &templates,
        r#"
[single]
system = "Custom rules."
output_format = "\nOne line, four fields."
one_shot = "\nEXAMPLE: custom"
"#,
    )
    .unwrap();

    let toml_content = format!(
        "[core]\ndata_dir = \"{}\"\n[prompts]\ntemplate_file = \"{}\"\n",
        dir.path().join("data").display(),
        templates.display()
    );
    let config = Config::from_toml_str(&toml_content).unwrap();
    let path = config.prompts.template_file.clone().unwrap();

    let book = PromptBook::from_file(&path, ShotMode::One).unwrap();
    assert_eq!(
        book.single_system(),
        "Custom rules.\nOne line, four fields.\nEXAMPLE: custom"
    );
    // Families the file leaves out keep the built-in text
    assert!(book.step_system().contains("Urban renewal study"));
}
