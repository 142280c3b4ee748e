//! Process configuration for the knowledge mesh.
//!
//! The broker is configured entirely through `MESH_*` environment
//! variables; nothing outside the list below is consulted.

#![warn(missing_docs, clippy::pedantic)]

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unusable value.
    #[error("invalid value for {variable}: {reason}")]
    Invalid {
        /// Variable name.
        variable: &'static str,
        /// Human-readable reason for rejection.
        reason: String,
    },
}

/// Everything the broker process reads at boot.
#[derive(Clone, Debug)]
pub struct MeshConfig {
    /// Transport broker URL (`MESH_TRANSPORT_URL`).
    pub transport_url: String,
    /// Policy evaluator base URL (`MESH_POLICY_URL`).
    pub policy_url: String,
    /// `<package>/<rule>` path queried for decisions
    /// (`MESH_POLICY_DECISION_PATH`).
    pub policy_decision_path: String,
    /// Persistence DSN (`MESH_DATABASE_URL`); unset means the in-memory
    /// store.
    pub database_url: Option<String>,
    /// Directory holding the `.rego` policy mirror (`MESH_POLICY_DIR`).
    pub policy_dir: PathBuf,
    /// Interval between health-probe sweeps
    /// (`MESH_HEALTH_INTERVAL_SECS`).
    pub health_interval: Duration,
    /// Consecutive probe failures before a status downgrade
    /// (`MESH_HEALTH_FAILURE_THRESHOLD`).
    pub health_failure_threshold: u32,
    /// Default adapter dispatch timeout (`MESH_DISPATCH_TIMEOUT_SECS`).
    pub dispatch_timeout: Duration,
    /// Default registry/directory request timeout
    /// (`MESH_REQUEST_TIMEOUT_SECS`).
    pub request_timeout: Duration,
    /// Whether audit events carry full request/response payloads
    /// (`MESH_HEAVY_AUDIT`).
    pub heavy_audit: bool,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            transport_url: "nats://127.0.0.1:4222".to_owned(),
            policy_url: "http://127.0.0.1:8181".to_owned(),
            policy_decision_path: "mesh/decision".to_owned(),
            database_url: None,
            policy_dir: PathBuf::from("./policies"),
            health_interval: Duration::from_secs(30),
            health_failure_threshold: 3,
            dispatch_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            heavy_audit: false,
        }
    }
}

impl MeshConfig {
    /// Loads configuration from the environment, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for unparseable numeric or boolean
    /// values, or when validation fails.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("MESH_TRANSPORT_URL") {
            config.transport_url = url;
        }
        if let Ok(url) = env::var("MESH_POLICY_URL") {
            config.policy_url = url;
        }
        if let Ok(path) = env::var("MESH_POLICY_DECISION_PATH") {
            config.policy_decision_path = path;
        }
        if let Ok(dsn) = env::var("MESH_DATABASE_URL") {
            config.database_url = Some(dsn);
        }
        if let Ok(dir) = env::var("MESH_POLICY_DIR") {
            config.policy_dir = PathBuf::from(dir);
        }
        if let Some(secs) = read_u64("MESH_HEALTH_INTERVAL_SECS")? {
            config.health_interval = Duration::from_secs(secs);
        }
        if let Some(threshold) = read_u64("MESH_HEALTH_FAILURE_THRESHOLD")? {
            config.health_failure_threshold =
                u32::try_from(threshold).map_err(|_| ConfigError::Invalid {
                    variable: "MESH_HEALTH_FAILURE_THRESHOLD",
                    reason: "value out of range".to_owned(),
                })?;
        }
        if let Some(secs) = read_u64("MESH_DISPATCH_TIMEOUT_SECS")? {
            config.dispatch_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read_u64("MESH_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Ok(raw) = env::var("MESH_HEAVY_AUDIT") {
            config.heavy_audit = match raw.as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(ConfigError::Invalid {
                        variable: "MESH_HEAVY_AUDIT",
                        reason: format!("expected a boolean, got `{other}`"),
                    });
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when any duration is zero or the
    /// failure threshold is zero.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.health_interval.is_zero() {
            return Err(ConfigError::Invalid {
                variable: "MESH_HEALTH_INTERVAL_SECS",
                reason: "health interval must be greater than zero".to_owned(),
            });
        }
        if self.health_failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                variable: "MESH_HEALTH_FAILURE_THRESHOLD",
                reason: "failure threshold must be greater than zero".to_owned(),
            });
        }
        if self.dispatch_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                variable: "MESH_DISPATCH_TIMEOUT_SECS",
                reason: "dispatch timeout must be greater than zero".to_owned(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                variable: "MESH_REQUEST_TIMEOUT_SECS",
                reason: "request timeout must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }
}

fn read_u64(variable: &'static str) -> ConfigResult<Option<u64>> {
    match env::var(variable) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|err| ConfigError::Invalid {
                variable,
                reason: err.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MeshConfig::default();
        config.validate().unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.dispatch_timeout, Duration::from_secs(30));
        assert!(!config.heavy_audit);
    }

    #[test]
    fn zero_durations_are_rejected() {
        let config = MeshConfig {
            dispatch_timeout: Duration::ZERO,
            ..MeshConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MeshConfig {
            health_failure_threshold: 0,
            ..MeshConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
