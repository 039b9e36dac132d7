// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: non-empty paths,
//! non-zero workflow bounds, unique allow-list entries, parseable addresses.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::diagnostic::ConfigError;
use crate::model::ParleyConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    let wf = &config.workflow;
    if wf.max_ai_retries == 0 {
        errors.push(ConfigError::validation(
            "workflow.max_ai_retries must be at least 1",
        ));
    }
    if wf.context_window == 0 {
        errors.push(ConfigError::validation(
            "workflow.context_window must be at least 1",
        ));
    }
    if wf.ticket_ttl_secs == 0 {
        errors.push(ConfigError::validation(
            "workflow.ticket_ttl_secs must be at least 1",
        ));
    }

    let mut seen = HashSet::new();
    for id in &config.telegram.allowed_chat_ids {
        if !seen.insert(id) {
            errors.push(ConfigError::validation(format!(
                "duplicate chat id `{id}` in telegram.allowed_chat_ids"
            )));
        }
    }

    if config.openai.base_url.trim().is_empty() {
        errors.push(ConfigError::validation("openai.base_url must not be empty"));
    }

    if config.prometheus.enabled
        && config.prometheus.listen_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ConfigError::validation(format!(
            "prometheus.listen_address `{}` is not a valid socket address",
            config.prometheus.listen_address
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&ParleyConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = ParleyConfig::default();
        config.storage.database_path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn zero_workflow_bounds_are_all_reported() {
        let mut config = ParleyConfig::default();
        config.workflow.max_ai_retries = 0;
        config.workflow.context_window = 0;
        config.workflow.ticket_ttl_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(has_error(&errors, "max_ai_retries"));
        assert!(has_error(&errors, "context_window"));
        assert!(has_error(&errors, "ticket_ttl_secs"));
    }

    #[test]
    fn duplicate_chat_ids_fail_validation() {
        let mut config = ParleyConfig::default();
        config.telegram.allowed_chat_ids = vec![42, 7, 42];
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "duplicate chat id `42`"));
    }

    #[test]
    fn bad_listen_address_only_matters_when_enabled() {
        let mut config = ParleyConfig::default();
        config.prometheus.listen_address = "not-an-address".to_string();
        assert!(validate_config(&config).is_ok());

        config.prometheus.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "listen_address"));
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = ParleyConfig::default();
        config.storage.database_path = "/tmp/parley.db".to_string();
        config.telegram.allowed_chat_ids = vec![1, 2, 3];
        config.prometheus.enabled = true;
        config.prometheus.listen_address = "0.0.0.0:9464".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
