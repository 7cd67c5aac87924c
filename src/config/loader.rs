//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::LoadBalancerConfig;
use super::validation::Validator;
use std::path::Path;
use tracing::warn;

/// Configuration loader with validation support.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Validators to run on loaded configuration.
    validators: Vec<Box<dyn Validator>>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validator to the loader.
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<LoadBalancerConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.load_str(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn load_str(&self, content: &str) -> ConfigResult<LoadBalancerConfig> {
        let config: LoadBalancerConfig = toml::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration against all registered validators.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] listing every error-level
    /// issue. Warnings are logged and do not fail validation.
    pub fn validate(&self, config: &LoadBalancerConfig) -> ConfigResult<()> {
        for validator in &self.validators {
            let result = validator.validate(config);
            for warning in result.warnings() {
                warn!(field = %warning.field, "{}", warning.message);
            }
            if !result.is_valid() {
                let errors: Vec<String> = result
                    .errors_only()
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                return Err(ConfigError::ValidationError(errors.join("; ")));
            }
        }
        Ok(())
    }

    /// Load configuration or return default if file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<LoadBalancerConfig> {
        let path = path.as_ref();
        if path.exists() {
            self.load(path)
        } else {
            Ok(LoadBalancerConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BasicValidator, SchedulerType};
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_string() {
        let loader = ConfigLoader::new();
        let config = loader
            .load_str(
                r#"
            capacity = 4
            scheduler = "random"
        "#,
            )
            .unwrap();
        assert_eq!(config.capacity, 4);
        assert_eq!(config.scheduler, SchedulerType::Random);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("balancer.toml");

        std::fs::write(
            &config_path,
            r#"
            capacity = 7

            [heartbeat]
            interval = "250ms"
        "#,
        )
        .unwrap();

        let loader = ConfigLoader::new();
        let config = loader.load(&config_path).unwrap();
        assert_eq!(config.capacity, 7);
        assert_eq!(config.heartbeat.interval, Duration::from_millis(250));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let loader = ConfigLoader::new();
        let result = loader.load("/nonexistent/path/balancer.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default() {
        let loader = ConfigLoader::new();
        let config = loader.load_or_default("/nonexistent/path").unwrap();
        assert_eq!(config, LoadBalancerConfig::default());
    }

    #[test]
    fn test_validator_rejects_zero_capacity() {
        let loader = ConfigLoader::new().with_validator(BasicValidator::new());
        let result = loader.load_str("capacity = 0");
        match result {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("capacity")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_warning_does_not_fail() {
        let loader = ConfigLoader::new().with_validator(BasicValidator::new());
        let config = loader
            .load_str(
                r#"
            [heartbeat]
            initial_delay = "0s"
        "#,
            )
            .unwrap();
        assert_eq!(config.heartbeat.initial_delay, Duration::ZERO);
    }
}
