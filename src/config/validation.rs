//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, worker counts ≥ 1)
//! - Detect duplicate rule and API ids
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AnalyticsConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::AnalyticsConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &AnalyticsConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "must be a socket address"));
    }

    if config.engine.num_workers == 0 {
        errors.push(ValidationError::new("engine.num_workers", "must be at least 1"));
    }
    if config.engine.queue_capacity == 0 {
        errors.push(ValidationError::new("engine.queue_capacity", "must be at least 1"));
    }

    if config.differ.send_notification_interval_secs == 0 {
        errors.push(ValidationError::new("differ.send_notification_interval_secs", "must be greater than 0"));
    }
    if config.differ.diff_send_threshold == 0 {
        errors.push(ValidationError::new("differ.diff_send_threshold", "must be greater than 0"));
    }

    if config.notifier.url.is_some() {
        if config.notifier.workers == 0 {
            errors.push(ValidationError::new("notifier.workers", "must be at least 1 when a url is set"));
        }
        if config.notifier.max_queue_size == 0 {
            errors.push(ValidationError::new("notifier.max_queue_size", "must be at least 1 when a url is set"));
        }
    }

    if config.observability.metrics_enabled && config.observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("observability.metrics_address", "must be a socket address"));
    }

    check_unique(
        config.settings.api_naming_rules.iter().map(|r| r.api_name.as_str()),
        "settings.api_naming_rules",
        &mut errors,
    );
    check_unique(config.settings.nav_args.iter().map(|r| r.id.as_str()), "settings.nav_args", &mut errors);
    check_unique(config.settings.auth_rules.iter().map(|r| r.id.as_str()), "settings.auth_rules", &mut errors);

    let mut api_ids = HashSet::new();
    for api in &config.apis {
        if !api_ids.insert(api.id) {
            errors.push(ValidationError::new("apis", format!("duplicate API id {}", api.id)));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_unique<'a>(ids: impl Iterator<Item = &'a str>, field: &str, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            errors.push(ValidationError::new(field, format!("duplicate id '{id}'")));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::ApiInfo;
    use crate::config::schema::NavArgConfig;
    use crate::settings::{ArgIdentifier, ArgType};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AnalyticsConfig::default()).is_ok());
    }

    #[test]
    fn test_all_errors_reported() {
        let mut config = AnalyticsConfig::default();
        config.engine.num_workers = 0;
        config.differ.send_notification_interval_secs = 0;
        config.notifier.url = Some("http://backend".into());
        config.notifier.workers = 0;
        config.apis = vec![ApiInfo { id: 1, ..Default::default() }, ApiInfo { id: 1, ..Default::default() }];
        let nav = NavArgConfig {
            id: "n".into(),
            arg: ArgIdentifier::new("a", ArgType::ReqBody, "x"),
        };
        config.settings.nav_args = vec![nav.clone(), nav];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "engine.num_workers",
                "differ.send_notification_interval_secs",
                "notifier.workers",
                "settings.nav_args",
                "apis",
            ]
        );
    }
}
