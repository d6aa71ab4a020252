//! Deployment configuration
//!
//! Loaded from YAML, then overridden from the environment:
//!
//! ```yaml
//! environment_url: https://contoso.crm.dynamics.com
//! publisher:
//!   display_name: Contoso
//!   prefix: cr1
//! solution:
//!   display_name: Order Management
//! retry:
//!   max_attempts: 4
//!   base_delay_ms: 500
//! ```
//!
//! | Variable | Field |
//! |---|---|
//! | `DATAVERSE_URL` | `environment_url` |
//! | `DATAVERSE_API_VERSION` | `api_version` |
//! | `ERD_PUBLISHER_NAME` | `publisher.display_name` |
//! | `ERD_PUBLISHER_PREFIX` | `publisher.prefix` |
//! | `ERD_SOLUTION_NAME` | `solution.display_name` |
//! | `ERD_MAX_ATTEMPTS` | `retry.max_attempts` |
//! | `ERD_BASE_DELAY_MS` | `retry.base_delay_ms` |

use std::path::Path;
use std::time::Duration;

use erd_core::generator::{GeneratorOptions, JunctionHeuristic};
use erd_core::naming::validate_prefix;
use erd_core::{NamingConfig, ValidationPolicy};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::dataverse::caller::RetryPolicy;
use crate::error::ConfigError;

pub const DEFAULT_API_VERSION: &str = "v9.2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    #[serde(default)]
    pub environment_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub solution: SolutionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_token_refresh_margin_secs")]
    pub token_refresh_margin_secs: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub prefix: String,
    #[serde(default = "default_option_value_prefix")]
    pub option_value_prefix: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            description: None,
            prefix: String::new(),
            option_value_prefix: default_option_value_prefix(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionConfig {
    pub display_name: String,
    #[serde(default = "default_solution_version")]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Default for SolutionConfig {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            version: default_solution_version(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub synthesize_primary_keys: bool,
    pub junction_max_descriptive_fields: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            synthesize_primary_keys: true,
            junction_max_descriptive_fields: JunctionHeuristic::default().max_descriptive_fields,
        }
    }
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_token_refresh_margin_secs() -> u64 {
    300
}

fn default_max_concurrency() -> usize {
    4
}

fn default_option_value_prefix() -> u32 {
    10000
}

fn default_solution_version() -> String {
    "1.0.0.0".to_string()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            environment_url: String::new(),
            api_version: default_api_version(),
            publisher: PublisherConfig::default(),
            solution: SolutionConfig::default(),
            retry: RetryConfig::default(),
            request_timeout_secs: default_request_timeout_secs(),
            token_refresh_margin_secs: default_token_refresh_margin_secs(),
            max_concurrency: default_max_concurrency(),
            validation: ValidationConfig::default(),
        }
    }
}

impl DeployConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded deployment config");
        Self::from_yaml_str(&text)
    }

    /// Apply overrides from process environment variables
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("DATAVERSE_URL") {
            self.environment_url = v;
        }
        if let Some(v) = lookup("DATAVERSE_API_VERSION") {
            self.api_version = v;
        }
        if let Some(v) = lookup("ERD_PUBLISHER_NAME") {
            self.publisher.display_name = v;
        }
        if let Some(v) = lookup("ERD_PUBLISHER_PREFIX") {
            self.publisher.prefix = v;
        }
        if let Some(v) = lookup("ERD_SOLUTION_NAME") {
            self.solution.display_name = v;
        }
        if let Some(v) = lookup("ERD_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env("ERD_MAX_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("ERD_BASE_DELAY_MS") {
            self.retry.base_delay_ms = parse_env("ERD_BASE_DELAY_MS", v)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "environment_url is required (or set DATAVERSE_URL)".into(),
            ));
        }
        self.api_base_url()?;
        if self.publisher.display_name.trim().is_empty() {
            return Err(ConfigError::Invalid("publisher.display_name is required".into()));
        }
        if self.solution.display_name.trim().is_empty() {
            return Err(ConfigError::Invalid("solution.display_name is required".into()));
        }
        validate_prefix(&self.publisher.prefix).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if !(10000..=99999).contains(&self.publisher.option_value_prefix) {
            return Err(ConfigError::Invalid(format!(
                "publisher.option_value_prefix {} must be between 10000 and 99999",
                self.publisher.option_value_prefix
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".into()));
        }
        Ok(())
    }

    /// `{environment_url}/api/data/{api_version}/`
    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        let root = self.environment_url.trim_end_matches('/');
        Url::parse(&format!("{}/api/data/{}/", root, self.api_version))
            .map_err(|e| ConfigError::Invalid(format!("environment_url '{}': {}", root, e)))
    }

    pub fn naming(&self) -> NamingConfig {
        NamingConfig {
            publisher_prefix: self.publisher.prefix.clone(),
            publisher_display_name: self.publisher.display_name.clone(),
            publisher_description: self.publisher.description.clone(),
            option_value_prefix: self.publisher.option_value_prefix,
            solution_display_name: self.solution.display_name.clone(),
            solution_version: self.solution.version.clone(),
            solution_description: self.solution.description.clone(),
        }
    }

    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            synthesize_primary_keys: self.validation.synthesize_primary_keys,
        }
    }

    pub fn generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            junction: JunctionHeuristic {
                max_descriptive_fields: self.validation.junction_max_descriptive_fields,
            },
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.token_refresh_margin_secs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: String) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        name: name.to_string(),
        reason: e.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const YAML: &str = r#"
environment_url: https://contoso.crm.dynamics.com/
publisher:
  display_name: Contoso
  prefix: cr1
solution:
  display_name: Order Management
retry:
  max_attempts: 5
  base_delay_ms: 200
  max_delay_ms: 5000
"#;

    #[test]
    fn test_yaml_with_defaults() {
        let config = DeployConfig::from_yaml_str(YAML).unwrap();
        assert_eq!(config.api_version, "v9.2");
        assert_eq!(config.publisher.option_value_prefix, 10000);
        assert_eq!(config.solution.version, "1.0.0.0");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.max_concurrency, 4);
        assert!(config.validation.synthesize_primary_keys);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.api_base_url().unwrap().as_str(),
            "https://contoso.crm.dynamics.com/api/data/v9.2/"
        );
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DATAVERSE_URL", "https://fabrikam.crm4.dynamics.com"),
            ("ERD_PUBLISHER_PREFIX", "fab"),
            ("ERD_MAX_ATTEMPTS", "2"),
        ]
        .into_iter()
        .collect();
        let config = DeployConfig::from_yaml_str(YAML)
            .unwrap()
            .apply_env_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.environment_url, "https://fabrikam.crm4.dynamics.com");
        assert_eq!(config.publisher.prefix, "fab");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.naming().publisher_prefix, "fab");
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let err = DeployConfig::default()
            .apply_env_from(|k| (k == "ERD_BASE_DELAY_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let base = DeployConfig::from_yaml_str(YAML).unwrap();

        let mut c = base.clone();
        c.environment_url = String::new();
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.publisher.prefix = "mscrm".into();
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.publisher.option_value_prefix = 9999;
        assert!(c.validate().is_err());

        let mut c = base;
        c.retry.max_attempts = 0;
        assert!(c.validate().is_err());
    }
}
