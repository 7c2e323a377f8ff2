//! Session configuration: backend location, debounce timings and topic names.
//!
//! Loaded from YAML; every field has a default so an empty document is a
//! valid configuration. Environment variables override the backend URL and
//! access token.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::backend::SessionTarget;

const BACKEND_URL_ENV: &str = "VOICEFORGE_BACKEND_URL";
const ACCESS_TOKEN_ENV: &str = "VOICEFORGE_ACCESS_TOKEN";

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing access token: {0}")]
    MissingToken(String),
}

/// Quiet periods for the two debounced writers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub sync_quiet_ms: u64,
    pub persist_quiet_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            sync_quiet_ms: 1500,
            persist_quiet_ms: 2000,
        }
    }
}

impl Timing {
    pub fn sync_quiet(&self) -> Duration {
        Duration::from_millis(self.sync_quiet_ms)
    }

    pub fn persist_quiet(&self) -> Duration {
        Duration::from_millis(self.persist_quiet_ms)
    }
}

/// Sub-channel names on the realtime transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Topics {
    /// Outbound editor snapshot, `{code, language}`.
    pub editor_context: String,
    /// Outbound learn-mode snapshot, `{code, language, book_id}`.
    pub learn_context: String,
    /// Inbound structured results in project sessions (current name first).
    pub results: Vec<String>,
    /// Inbound structured results in learn sessions.
    pub learn_results: Vec<String>,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            editor_context: "editor_context".into(),
            learn_context: "learn_book_context".into(),
            results: vec!["assistant_result".into(), "code_result".into()],
            learn_results: vec!["learn_code_result".into()],
        }
    }
}

impl Topics {
    /// Result topics routed to the interpreter for this target.
    pub fn result_topics(&self, target: &SessionTarget) -> &[String] {
        if target.is_learn() {
            &self.learn_results
        } else {
            &self.results
        }
    }

    /// Topics an editor snapshot is published on for this target.
    pub fn context_topics(&self, target: &SessionTarget) -> Vec<&str> {
        if target.is_learn() {
            vec![self.learn_context.as_str(), self.editor_context.as_str()]
        } else {
            vec![self.editor_context.as_str()]
        }
    }

    /// The one topic the agent reads when a user turn starts.
    pub fn turn_topic(&self, target: &SessionTarget) -> &str {
        if target.is_learn() {
            &self.learn_context
        } else {
            &self.editor_context
        }
    }
}

/// Top-level session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub backend_url: String,
    pub access_token: Option<String>,
    pub timing: Timing,
    pub topics: Topics,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".into(),
            access_token: None,
            timing: Timing::default(),
            topics: Topics::default(),
        }
    }
}

impl SessionConfig {
    /// Parse a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Defaults plus environment overrides; the access token is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default().with_env_overrides();
        if config.access_token.is_none() {
            return Err(ConfigError::MissingToken(format!(
                "{ACCESS_TOKEN_ENV} environment variable not set"
            )));
        }
        Ok(config)
    }

    /// Apply `VOICEFORGE_BACKEND_URL` / `VOICEFORGE_ACCESS_TOKEN` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.trim().is_empty() {
                self.backend_url = url;
            }
        }
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.access_token = Some(token);
            }
        }
        self
    }
}
