//! Environment variable overrides

use super::model::WardenConfig;
use crate::error::{WardenError, WardenResult};
use std::str::FromStr;

/// Per-request deadline override
pub const ENV_REQUEST_TIMEOUT_MS: &str = "WARDEN_MCP_REQUEST_TIMEOUT_MS";
/// Health probe interval override
pub const ENV_HEALTH_INTERVAL_MS: &str = "WARDEN_MCP_HEALTH_INTERVAL_MS";
/// Restart attempt limit override
pub const ENV_MAX_RESTARTS: &str = "WARDEN_MCP_MAX_RESTARTS";
/// Log level override
pub const ENV_LOG_LEVEL: &str = "WARDEN_LOG_LEVEL";

/// Apply `WARDEN_*` variables from the process environment
pub fn apply_env_overrides(config: &mut WardenConfig) -> WardenResult<()> {
    apply_env_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides using `lookup` as the variable source
pub fn apply_env_overrides_from<F>(config: &mut WardenConfig, lookup: F) -> WardenResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(ENV_REQUEST_TIMEOUT_MS) {
        config.mcp.request_timeout_ms = parse_var(ENV_REQUEST_TIMEOUT_MS, &value)?;
    }

    if let Some(value) = lookup(ENV_HEALTH_INTERVAL_MS) {
        config.mcp.health.interval_ms = parse_var(ENV_HEALTH_INTERVAL_MS, &value)?;
    }

    if let Some(value) = lookup(ENV_MAX_RESTARTS) {
        config.mcp.health.max_restart_attempts = parse_var(ENV_MAX_RESTARTS, &value)?;
    }

    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        if !level.trim().is_empty() {
            config.logging.level = level;
        }
    }

    Ok(())
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> WardenResult<T> {
    value.trim().parse().map_err(|_| {
        WardenError::config_with_context(
            format!("Invalid {} value", key),
            format!("Parsing '{}' from the environment", value),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = WardenConfig::default();
        apply_env_overrides_from(
            &mut config,
            lookup(&[
                (ENV_REQUEST_TIMEOUT_MS, "1500"),
                (ENV_HEALTH_INTERVAL_MS, " 250 "),
                (ENV_MAX_RESTARTS, "0"),
                (ENV_LOG_LEVEL, "trace"),
            ]),
        )
        .unwrap();

        assert_eq!(config.mcp.request_timeout_ms, 1_500);
        assert_eq!(config.mcp.health.interval_ms, 250);
        assert_eq!(config.mcp.health.max_restart_attempts, 0);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    fn test_absent_variables_leave_config_alone() {
        let mut config = WardenConfig::default();
        config.mcp.request_timeout_ms = 42;
        apply_env_overrides_from(&mut config, lookup(&[])).unwrap();
        assert_eq!(config.mcp.request_timeout_ms, 42);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let mut config = WardenConfig::default();
        let err = apply_env_overrides_from(&mut config, lookup(&[(ENV_MAX_RESTARTS, "many")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_RESTARTS));
    }
}
