// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Parley configuration system.

use std::io::Write;

use parley_config::diagnostic::{ConfigError, suggest_key};
use parley_config::model::ParleyConfig;
use parley_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};
use serial_test::serial;

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_parley_config() {
    let toml = r#"
[agent]
name = "relay-test"
log_level = "debug"
system_prompt = "Be brief."

[telegram]
bot_token = "123:ABC"
allowed_chat_ids = [42, -1001]
placeholder_text = "On it..."

[openai]
api_key = "sk-123"
model = "gpt-4o"
base_url = "http://localhost:8080/v1"
max_tokens = 256
request_timeout_secs = 15

[storage]
database_path = "/tmp/test.db"
wal_mode = false

[workflow]
max_ai_retries = 5
context_window = 20
ticket_ttl_secs = 600
idle_poll_ms = 25
step_backoff_ms = 5
drain_timeout_secs = 3

[prometheus]
enabled = true
listen_address = "0.0.0.0:9000"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "relay-test");
    assert_eq!(config.agent.log_level, "debug");
    assert_eq!(config.agent.system_prompt.as_deref(), Some("Be brief."));
    assert_eq!(config.telegram.bot_token.as_deref(), Some("123:ABC"));
    assert_eq!(config.telegram.allowed_chat_ids, vec![42, -1001]);
    assert_eq!(config.telegram.placeholder_text, "On it...");
    assert_eq!(config.openai.api_key.as_deref(), Some("sk-123"));
    assert_eq!(config.openai.model, "gpt-4o");
    assert_eq!(config.openai.base_url, "http://localhost:8080/v1");
    assert_eq!(config.openai.max_tokens, 256);
    assert_eq!(config.openai.request_timeout_secs, 15);
    assert_eq!(config.storage.database_path, "/tmp/test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.workflow.max_ai_retries, 5);
    assert_eq!(config.workflow.context_window, 20);
    assert_eq!(config.workflow.ticket_ttl_secs, 600);
    assert_eq!(config.workflow.idle_poll_ms, 25);
    assert_eq!(config.workflow.step_backoff_ms, 5);
    assert_eq!(config.workflow.drain_timeout_secs, 3);
    assert!(config.prometheus.enabled);
    assert_eq!(config.prometheus.listen_address, "0.0.0.0:9000");
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.agent.name, "parley");
    assert_eq!(config.agent.log_level, "info");
    assert!(config.agent.system_prompt.is_none());
    assert!(config.telegram.bot_token.is_none());
    assert!(config.telegram.allowed_chat_ids.is_empty());
    assert_eq!(config.telegram.placeholder_text, "Your request queued...");
    assert!(config.openai.api_key.is_none());
    assert_eq!(config.openai.model, "gpt-4o-mini");
    assert_eq!(config.openai.base_url, "https://api.openai.com/v1");
    assert!(config.storage.database_path.ends_with("parley.db"));
    assert!(config.storage.wal_mode);
    assert_eq!(config.workflow.max_ai_retries, 3);
    assert_eq!(config.workflow.context_window, 10);
    assert_eq!(config.workflow.ticket_ttl_secs, 3600);
    assert!(!config.prometheus.enabled);
}

/// Unknown field in [telegram] is rejected.
#[test]
fn unknown_field_in_telegram_produces_error() {
    let toml = r#"
[telegram]
bot_tken = "abc"
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("bot_tken"),
        "error should mention unknown field, got: {err_str}"
    );
}

/// Unexpected top-level section is rejected by deny_unknown_fields.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[anthropic]
api_key = "x"
"#;

    let err = load_config_from_str(toml).expect_err("unknown top-level section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("anthropic"),
        "error should mention unknown field, got: {err_str}"
    );
}

/// Dot-notation overrides reach nested keys with underscores intact.
#[test]
fn dotted_override_sets_bot_token() {
    use figment::{Figment, providers::Serialized};

    let config: ParleyConfig = Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(("telegram.bot_token", "xyz-from-env"))
        .extract()
        .expect("should set bot_token via dot notation");

    assert_eq!(config.telegram.bot_token.as_deref(), Some("xyz-from-env"));
}

/// PARLEY_* variables override values from the file.
#[test]
#[serial]
fn env_vars_override_file_values() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[openai]\nmodel = \"from-file\"\n\n[workflow]\ncontext_window = 4").unwrap();

    unsafe {
        std::env::set_var("PARLEY_OPENAI_MODEL", "from-env");
        std::env::set_var("PARLEY_WORKFLOW_MAX_AI_RETRIES", "7");
    }
    let result = load_and_validate_path(file.path());
    unsafe {
        std::env::remove_var("PARLEY_OPENAI_MODEL");
        std::env::remove_var("PARLEY_WORKFLOW_MAX_AI_RETRIES");
    }

    let config = result.expect("file plus env should validate");
    assert_eq!(config.openai.model, "from-env");
    assert_eq!(config.workflow.max_ai_retries, 7);
    assert_eq!(config.workflow.context_window, 4);
}

/// A file that fails validation reports every problem at once.
#[test]
#[serial]
fn validation_errors_from_file_are_collected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[workflow]\ncontext_window = 0\nmax_ai_retries = 0\n\n[telegram]\nallowed_chat_ids = [1, 1]"
    )
    .unwrap();

    let errors = load_and_validate_path(file.path()).expect_err("should fail validation");
    assert_eq!(errors.len(), 3, "got: {errors:?}");
}

// ============================================================================
// Diagnostic tests
// ============================================================================

/// Unknown key "modle" in [openai] produces suggestion "did you mean `model`?"
#[test]
fn diagnostic_modle_suggests_model() {
    let valid_keys = &["api_key", "model", "base_url", "max_tokens"];
    assert_eq!(suggest_key("modle", valid_keys), Some("model".to_string()));
}

/// Error output from load_and_validate_str names the key, suggestion and valid keys.
#[test]
fn diagnostic_error_includes_unknown_key() {
    let toml = r#"
[workflow]
context_windw = 5
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let has_unknown_key = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, valid_keys, .. } if {
            key == "context_windw"
                && suggestion.as_deref() == Some("context_window")
                && valid_keys.contains("max_ai_retries")
        })
    });
    assert!(
        has_unknown_key,
        "should have UnknownKey error for 'context_windw', got: {errors:?}"
    );
}

/// Invalid type (string where number expected) produces clear message.
#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[workflow]
max_ai_retries = "three"
"#;

    let err = load_config_from_str(toml).expect_err("should reject invalid type");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("invalid type") || err_str.contains("max_ai_retries"),
        "error should mention type mismatch, got: {err_str}"
    );
}

/// ConfigError carries a code and a help line with the suggestion.
#[test]
fn config_error_implements_diagnostic() {
    use miette::Diagnostic;

    let error = ConfigError::UnknownKey {
        key: "placholder_text".to_string(),
        suggestion: Some("placeholder_text".to_string()),
        valid_keys: "bot_token, allowed_chat_ids, placeholder_text".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some(), "should have diagnostic code");
    let help_str = error.help().expect("should have help text").to_string();
    assert!(
        help_str.contains("did you mean `placeholder_text`"),
        "help should contain suggestion, got: {help_str}"
    );
}

/// ConfigError can be rendered using miette's graphical handler.
#[test]
fn config_error_renders_with_miette() {
    use miette::GraphicalReportHandler;

    let error = ConfigError::Validation {
        message: "workflow.context_window must be at least 1".to_string(),
    };

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("context_window"));
}

/// load_and_validate_str with valid TOML returns Ok config.
#[test]
fn load_and_validate_valid_toml() {
    let toml = r#"
[telegram]
allowed_chat_ids = [5]
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should validate");
    assert_eq!(config.telegram.allowed_chat_ids, vec![5]);
}
