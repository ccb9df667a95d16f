//! Engine configuration
//!
//! Every field has a default, so a TOML file only needs the values it
//! changes. Classifier endpoint, model, and API key can also come from
//! `SAFETY_CLASSIFIER_URL`, `SAFETY_CLASSIFIER_MODEL`, and
//! `SAFETY_CLASSIFIER_API_KEY`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::prompts::RECURRENCE_ALERT_THRESHOLD;
use crate::state::{DEFAULT_HISTORY_LIMIT, DEFAULT_HISTORY_WINDOW_DAYS};

/// Connection settings for the chat-completions classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Full `/chat/completions` URL.
    pub endpoint_url: String,
    pub model: String,
    /// Bearer token; omitted for local endpoints.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Hard client-side timeout for one classification round-trip.
    pub timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint_url: std::env::var("SAFETY_CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://localhost:8000/v1/chat/completions".to_string()),
            model: std::env::var("SAFETY_CLASSIFIER_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            api_key: std::env::var("SAFETY_CLASSIFIER_API_KEY").ok(),
            temperature: 0.1,
            max_tokens: 400,
            timeout_ms: 15_000,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Configuration for the escalation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    /// Rolling window for recurrence detection.
    pub history_window_days: u32,
    /// Maximum incidents loaded per user.
    pub history_limit: usize,
    /// Incident count that adds the pattern alert to the prompt (and applies
    /// the floor, if enabled). Must not exceed `history_limit`.
    pub recurrence_threshold: usize,
    /// Deterministically raise tier 1 to tier 2 for recurring users.
    pub enforce_recurrence_floor: bool,
    /// Tier 1 results above this confidence escalate.
    pub monitor_escalation_confidence: f64,
    /// Timeout for each repository read.
    pub repository_timeout_ms: u64,
    /// Background queue capacity.
    pub queue_capacity: usize,
    /// Per-message character cap in the prompt.
    pub max_message_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            history_window_days: DEFAULT_HISTORY_WINDOW_DAYS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            recurrence_threshold: RECURRENCE_ALERT_THRESHOLD,
            enforce_recurrence_floor: false,
            monitor_escalation_confidence: 0.8,
            repository_timeout_ms: 3_000,
            queue_capacity: 256,
            max_message_chars: 4_000,
        }
    }
}

impl EngineConfig {
    /// Parse from TOML text and validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn repository_timeout(&self) -> Duration {
        Duration::from_millis(self.repository_timeout_ms)
    }

    /// Reject values that would break the pipeline's invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.monitor_escalation_confidence) {
            return Err(ConfigError::Invalid(format!(
                "monitor_escalation_confidence must be within [0, 1], got {}",
                self.monitor_escalation_confidence
            )));
        }
        if !(0.0..=2.0).contains(&self.classifier.temperature) {
            return Err(ConfigError::Invalid(format!(
                "classifier.temperature must be within [0, 2], got {}",
                self.classifier.temperature
            )));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be > 0".to_string()));
        }
        if self.history_window_days == 0 {
            return Err(ConfigError::Invalid(
                "history_window_days must be > 0".to_string(),
            ));
        }
        if self.recurrence_threshold == 0 {
            return Err(ConfigError::Invalid(
                "recurrence_threshold must be > 0".to_string(),
            ));
        }
        // The incident count is capped at history_limit.
        if self.history_limit < self.recurrence_threshold {
            return Err(ConfigError::Invalid(format!(
                "history_limit ({}) must be >= recurrence_threshold ({})",
                self.history_limit, self.recurrence_threshold
            )));
        }
        if self.classifier.timeout_ms == 0 || self.repository_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be > 0".to_string()));
        }
        if self.classifier.endpoint_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "classifier.endpoint_url must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.history_window_days, 30);
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.recurrence_threshold, 3);
        assert!(!config.enforce_recurrence_floor);
        assert_eq!(config.monitor_escalation_confidence, 0.8);
        assert!((config.classifier.temperature - 0.1).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            enforce_recurrence_floor = true
            queue_capacity = 8

            [classifier]
            model = "local-safety-8b"
            timeout_ms = 2500
            "#,
        )
        .unwrap();
        assert!(config.enforce_recurrence_floor);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.classifier.model, "local-safety-8b");
        assert_eq!(config.classifier.timeout(), Duration::from_millis(2500));
        assert_eq!(config.history_limit, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("monitor_escalation_confidence = 1.5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("queue_capacity = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("history_limit = 2"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("recurrence_threshold = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(EngineConfig::from_toml_str("history_limit = 2\nrecurrence_threshold = 2").is_ok());
        assert!(matches!(
            EngineConfig::from_toml_str("queue_capacity = \"many\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("safety.toml");
        std::fs::write(&path, "history_window_days = 14\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.history_window_days, 14);

        assert!(matches!(
            EngineConfig::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
