//! Pipeline configuration.
//!
//! Execution limits, capture backend selection, LLM settings and storage
//! paths for the QA pipeline.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::analysis::{DEFAULT_COLLABORATOR_TIMEOUT, DEFAULT_REPORT_NOTES};
use crate::execution::DEFAULT_TARGET_URL;
use crate::llm::DEFAULT_MODEL;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Which artifact capture backend executes tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptureBackend {
    /// Headless browser through a Node.js Playwright script.
    #[default]
    Playwright,
    /// Plain HTTP fetch.
    Http,
}

impl CaptureBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureBackend::Playwright => "playwright",
            CaptureBackend::Http => "http",
        }
    }
}

impl FromStr for CaptureBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "playwright" | "browser" => Ok(CaptureBackend::Playwright),
            "http" => Ok(CaptureBackend::Http),
            other => Err(format!(
                "unknown capture backend '{}' (expected playwright or http)",
                other
            )),
        }
    }
}

impl std::fmt::Display for CaptureBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the QA pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Storage settings
    /// Directory for `<run_id>_report.json` and `<run_id>_raw.json`.
    pub reports_dir: PathBuf,
    /// Root directory for captured artifacts.
    pub artifacts_dir: PathBuf,

    // Execution settings
    /// Target used by tests that do not name one.
    pub default_target_url: String,
    /// Maximum number of tests executing at once.
    pub parallelism: usize,
    /// Optional per-test deadline.
    pub test_timeout: Option<Duration>,
    /// Page navigation timeout for capture backends.
    pub navigation_timeout: Duration,
    pub capture_backend: CaptureBackend,

    // Analysis settings
    /// Whether to ask the LLM collaborator to refine verdicts.
    pub enable_deep_analysis: bool,
    /// Bound on a single deep analysis call.
    pub collaborator_timeout: Duration,
    /// Notes stored in every report.
    pub report_notes: String,

    // LLM settings
    /// Model used by all agents.
    pub model: String,
    pub planner_temperature: f64,
    pub ranker_temperature: f64,
    pub analyzer_temperature: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from("reports"),
            artifacts_dir: PathBuf::from("reports/artifacts"),

            default_target_url: DEFAULT_TARGET_URL.to_string(),
            parallelism: 3,
            test_timeout: None,
            navigation_timeout: Duration::from_secs(15),
            capture_backend: CaptureBackend::Playwright,

            enable_deep_analysis: true,
            collaborator_timeout: DEFAULT_COLLABORATOR_TIMEOUT,
            report_notes: DEFAULT_REPORT_NOTES.to_string(),

            model: DEFAULT_MODEL.to_string(),
            planner_temperature: 0.5,
            ranker_temperature: 0.3,
            analyzer_temperature: 0.2,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QA_REPORTS_DIR`: Report directory (default: reports)
    /// - `QA_ARTIFACTS_DIR`: Artifact directory (default: reports/artifacts)
    /// - `QA_TARGET_URL`: Fallback target url (default: http://localhost:8000)
    /// - `QA_PARALLELISM`: Concurrent tests (default: 3)
    /// - `QA_TEST_TIMEOUT_SECS`: Per-test deadline, 0 disables (default: none)
    /// - `QA_NAVIGATION_TIMEOUT_SECS`: Navigation timeout (default: 15)
    /// - `QA_CAPTURE_BACKEND`: `playwright` or `http` (default: playwright)
    /// - `QA_DEEP_ANALYSIS`: Enable LLM verdict refinement (default: true)
    /// - `QA_COLLABORATOR_TIMEOUT_SECS`: Deep analysis bound (default: 60)
    /// - `QA_REPORT_NOTES`: Notes stored in reports
    /// - `QA_MODEL`: LLM model (default: gpt-4o-mini)
    /// - `QA_PLANNER_TEMPERATURE`, `QA_RANKER_TEMPERATURE`, `QA_ANALYZER_TEMPERATURE`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Storage settings
        if let Some(val) = lookup("QA_REPORTS_DIR") {
            config.reports_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("QA_ARTIFACTS_DIR") {
            config.artifacts_dir = PathBuf::from(val);
        }

        // Execution settings
        if let Some(val) = lookup("QA_TARGET_URL") {
            config.default_target_url = val;
        }

        if let Some(val) = lookup("QA_PARALLELISM") {
            config.parallelism = parse_env_value(&val, "QA_PARALLELISM")?;
        }

        if let Some(val) = lookup("QA_TEST_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "QA_TEST_TIMEOUT_SECS")?;
            config.test_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(val) = lookup("QA_NAVIGATION_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "QA_NAVIGATION_TIMEOUT_SECS")?;
            config.navigation_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("QA_CAPTURE_BACKEND") {
            config.capture_backend = val.parse().map_err(|message| ConfigError::InvalidValue {
                key: "QA_CAPTURE_BACKEND".to_string(),
                message,
            })?;
        }

        // Analysis settings
        if let Some(val) = lookup("QA_DEEP_ANALYSIS") {
            config.enable_deep_analysis = parse_env_bool(&val, "QA_DEEP_ANALYSIS")?;
        }

        if let Some(val) = lookup("QA_COLLABORATOR_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "QA_COLLABORATOR_TIMEOUT_SECS")?;
            config.collaborator_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("QA_REPORT_NOTES") {
            config.report_notes = val;
        }

        // LLM settings
        if let Some(val) = lookup("QA_MODEL") {
            config.model = val;
        }

        if let Some(val) = lookup("QA_PLANNER_TEMPERATURE") {
            config.planner_temperature = parse_env_value(&val, "QA_PLANNER_TEMPERATURE")?;
        }

        if let Some(val) = lookup("QA_RANKER_TEMPERATURE") {
            config.ranker_temperature = parse_env_value(&val, "QA_RANKER_TEMPERATURE")?;
        }

        if let Some(val) = lookup("QA_ANALYZER_TEMPERATURE") {
            config.analyzer_temperature = parse_env_value(&val, "QA_ANALYZER_TEMPERATURE")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallelism == 0 {
            return Err(ConfigError::ValidationFailed(
                "parallelism must be greater than 0".to_string(),
            ));
        }

        if self.default_target_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "default_target_url cannot be empty".to_string(),
            ));
        }

        if self.test_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ValidationFailed(
                "test_timeout must be greater than 0 when set".to_string(),
            ));
        }

        if self.navigation_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "navigation_timeout must be greater than 0".to_string(),
            ));
        }

        if self.collaborator_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "collaborator_timeout must be greater than 0".to_string(),
            ));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model cannot be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("planner_temperature", self.planner_temperature),
            ("ranker_temperature", self.ranker_temperature),
            ("analyzer_temperature", self.analyzer_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be between 0.0 and 2.0",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Builder method to set the reports directory.
    pub fn with_reports_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.reports_dir = path.into();
        self
    }

    /// Builder method to set the artifacts directory.
    pub fn with_artifacts_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = path.into();
        self
    }

    /// Builder method to set the fallback target url.
    pub fn with_default_target_url(mut self, url: impl Into<String>) -> Self {
        self.default_target_url = url.into();
        self
    }

    /// Builder method to set parallelism.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Builder method to set the per-test deadline.
    pub fn with_test_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.test_timeout = timeout;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_capture_backend(mut self, backend: CaptureBackend) -> Self {
        self.capture_backend = backend;
        self
    }

    /// Builder method to enable or disable deep analysis.
    pub fn with_deep_analysis(mut self, enabled: bool) -> Self {
        self.enable_deep_analysis = enabled;
        self
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    pub fn with_report_notes(mut self, notes: impl Into<String>) -> Self {
        self.report_notes = notes.into();
        self
    }

    /// Builder method to set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> Result<PipelineConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.parallelism, 3);
        assert_eq!(config.default_target_url, "http://localhost:8000");
        assert_eq!(config.test_timeout, None);
        assert_eq!(config.navigation_timeout, Duration::from_secs(15));
        assert_eq!(config.collaborator_timeout, Duration::from_secs(60));
        assert_eq!(config.capture_backend, CaptureBackend::Playwright);
        assert_eq!(config.model, "gpt-4o-mini");
        assert!((config.planner_temperature - 0.5).abs() < f64::EPSILON);
        assert!((config.ranker_temperature - 0.3).abs() < f64::EPSILON);
        assert!((config.analyzer_temperature - 0.2).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_reports_dir("/tmp/reports")
            .with_parallelism(8)
            .with_test_timeout(Some(Duration::from_secs(30)))
            .with_capture_backend(CaptureBackend::Http)
            .with_deep_analysis(false)
            .with_model("openai/gpt-4o");

        assert_eq!(config.reports_dir, PathBuf::from("/tmp/reports"));
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.test_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.capture_backend, CaptureBackend::Http);
        assert!(!config.enable_deep_analysis);
        assert_eq!(config.model, "openai/gpt-4o");
    }

    #[test]
    fn test_from_vars() {
        let config = from_map(&[
            ("QA_PARALLELISM", "5"),
            ("QA_TEST_TIMEOUT_SECS", "45"),
            ("QA_CAPTURE_BACKEND", "HTTP"),
            ("QA_DEEP_ANALYSIS", "off"),
            ("QA_TARGET_URL", "https://staging.app"),
        ])
        .expect("valid configuration");

        assert_eq!(config.parallelism, 5);
        assert_eq!(config.test_timeout, Some(Duration::from_secs(45)));
        assert_eq!(config.capture_backend, CaptureBackend::Http);
        assert!(!config.enable_deep_analysis);
        assert_eq!(config.default_target_url, "https://staging.app");

        let config = from_map(&[("QA_TEST_TIMEOUT_SECS", "0")]).expect("0 disables");
        assert_eq!(config.test_timeout, None);
    }

    #[test]
    fn test_from_vars_invalid_values() {
        let err = from_map(&[("QA_PARALLELISM", "many")]).unwrap_err();
        assert!(err.to_string().contains("QA_PARALLELISM"));

        let err = from_map(&[("QA_CAPTURE_BACKEND", "selenium")]).unwrap_err();
        assert!(err.to_string().contains("selenium"));

        let err = from_map(&[("QA_DEEP_ANALYSIS", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("QA_DEEP_ANALYSIS"));

        let err = from_map(&[("QA_PARALLELISM", "0")]).unwrap_err();
        assert!(err.to_string().contains("parallelism"));
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            (PipelineConfig::default().with_parallelism(0), "parallelism"),
            (
                PipelineConfig::default().with_default_target_url(" "),
                "default_target_url",
            ),
            (
                PipelineConfig::default().with_test_timeout(Some(Duration::ZERO)),
                "test_timeout",
            ),
            (
                PipelineConfig::default().with_collaborator_timeout(Duration::ZERO),
                "collaborator_timeout",
            ),
            (PipelineConfig::default().with_model(""), "model"),
        ];

        for (config, field) in cases {
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains(field), "{} not in {}", field, err);
        }

        let mut config = PipelineConfig::default();
        config.ranker_temperature = 3.0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("ranker_temperature"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("YES", "test").unwrap());
        assert!(!parse_env_bool("false", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());
        assert!(parse_env_bool("invalid", "test").is_err());
    }

    #[test]
    fn test_capture_backend_parse() {
        assert_eq!("playwright".parse::<CaptureBackend>(), Ok(CaptureBackend::Playwright));
        assert_eq!(" Http ".parse::<CaptureBackend>(), Ok(CaptureBackend::Http));
        assert!("curl".parse::<CaptureBackend>().is_err());
        assert_eq!(CaptureBackend::Http.to_string(), "http");
    }
}
