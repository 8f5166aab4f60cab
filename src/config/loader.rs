//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::AnalyticsConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_SEND_INTERVAL: &str = "DIFFER_SEND_NOTIFICATION_INTERVAL_SEC";
pub const ENV_SEND_THRESHOLD: &str = "DIFF_SEND_THRESHOLD";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value '{value}' for {var}: expected a non-negative integer")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Load, override from the environment, and validate a TOML file.
pub fn load_config(path: &Path) -> Result<AnalyticsConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content, |var| std::env::var(var).ok())
}

/// Parse `content`, apply overrides found through `env`, and validate.
pub fn parse_config(content: &str, env: impl Fn(&str) -> Option<String>) -> Result<AnalyticsConfig, ConfigError> {
    let mut config: AnalyticsConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, env)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Defaults plus environment overrides, validated. Used when no file is given.
pub fn default_config() -> Result<AnalyticsConfig, ConfigError> {
    parse_config("", |var| std::env::var(var).ok())
}

fn apply_env_overrides(config: &mut AnalyticsConfig, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
    if let Some(value) = env(ENV_SEND_INTERVAL) {
        config.differ.send_notification_interval_secs = parse_env(ENV_SEND_INTERVAL, &value)?;
    }
    if let Some(value) = env(ENV_SEND_THRESHOLD) {
        config.differ.diff_send_threshold = parse_env(ENV_SEND_THRESHOLD, &value)?;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{ArgType, AuthInfoType};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_full_file() {
        let content = r#"
            [engine]
            num_workers = 2

            [differ]
            send_notification_interval_secs = 60

            [[settings.api_naming_rules]]
            api_name = "pets"
            host = "petstore"

            [[settings.nav_args]]
            id = "n1"
            api_name = "pets"
            arg_type = "req_url_query"
            name = "q"

            [[settings.auth_rules]]
            id = "a1"
            api_name = "pets"
            arg_type = "req_body"
            name = "user"
            auth_type = "user_id"

            [[apis]]
            id = 1
            name = "pets"
            port = 8080
            api_type = "EXTERNAL"
        "#;

        let config = parse_config(content, no_env).unwrap();
        assert_eq!(config.engine.num_workers, 2);
        assert_eq!(config.engine.queue_capacity, 1000);
        assert_eq!(config.differ.send_notification_interval_secs, 60);
        assert_eq!(config.differ.diff_send_threshold, 500);
        assert_eq!(config.settings.api_naming_rules[0].url_prefix, "/");
        assert_eq!(config.settings.nav_args[0].arg.arg_type, ArgType::ReqUrlQuery);
        assert_eq!(config.settings.auth_rules[0].auth_type, AuthInfoType::UserId);
        assert_eq!(config.apis[0].port, 8080);
    }

    #[test]
    fn test_env_overrides() {
        let env = |var: &str| match var {
            ENV_SEND_INTERVAL => Some("15".to_string()),
            ENV_SEND_THRESHOLD => Some(" 7 ".to_string()),
            _ => None,
        };
        let config = parse_config("", env).unwrap();
        assert_eq!(config.differ.send_notification_interval_secs, 15);
        assert_eq!(config.differ.diff_send_threshold, 7);
    }

    #[test]
    fn test_bad_env_and_validation_errors() {
        let err = parse_config("", |var: &str| (var == ENV_SEND_THRESHOLD).then(|| "lots".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_SEND_THRESHOLD, .. }));

        let err = parse_config("", |var: &str| (var == ENV_SEND_INTERVAL).then(|| "0".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));

        let err = parse_config("[engine\n", no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
