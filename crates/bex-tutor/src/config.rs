//! Configuration types for the BEX tutor.
//!
//! Configuration is loaded once at startup from `bex.json` (every field is
//! optional) and handed to the pipeline and client explicitly. The access
//! credential is never stored in the file; it is pulled from the environment
//! variable named by `apiKeyEnv` when the process starts.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::conversation::DEFAULT_GREETING;
use crate::error::{BexError, Result};
use crate::filter::{ContentFilter, FilterPolicy};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "bex.json";

/// Placeholder credential that counts as "no credential".
const PLACEHOLDER_API_KEY: &str = "fake-key";

/// Default chat-completion endpoint.
fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

/// Default model identifier.
fn default_model() -> String {
    "gpt-4o".to_string()
}

/// Default environment variable holding the API key.
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Default greeting at the top of the transcript.
fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

/// Default port for the HTTP API.
const fn default_port() -> u16 {
    3000
}

// ============================================================================
// Credential
// ============================================================================

/// A usable bearer credential.
///
/// Construction filters out blank values and the `fake-key` placeholder, so
/// holding a `Credential` means the tutor can go online.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps `raw` if it is a usable credential.
    ///
    /// # Examples
    ///
    /// ```
    /// use bex_tutor::Credential;
    ///
    /// assert!(Credential::new("sk-live-123").is_some());
    /// assert!(Credential::new("fake-key").is_none());
    /// assert!(Credential::new("  ").is_none());
    /// ```
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == PLACEHOLDER_API_KEY {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// Reads the credential from the environment variable `var`.
    #[must_use]
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var).ok().and_then(Self::new)
    }

    /// The raw secret, for the `Authorization` header only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

// ============================================================================
// Config
// ============================================================================

/// Main configuration for the tutor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Chat-completion endpoint URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable that holds the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// First message of every transcript.
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Verbose diagnostics.
    #[serde(default)]
    pub debug: bool,

    /// Port for `bex serve`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Banned-content policy.
    #[serde(default)]
    pub content_filter: FilterPolicy,

    /// Resolved credential; never read from or written to the file.
    #[serde(skip)]
    credential: Option<Credential>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            greeting: default_greeting(),
            debug: false,
            port: default_port(),
            content_filter: FilterPolicy::default(),
            credential: None,
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `bex.json` in the current directory. If not found, returns
    /// the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            BexError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `bex.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `BexError::ConfigParseError` if the file cannot be read or is
    /// not valid JSON, and `BexError::ConfigValidationError` or
    /// `BexError::InvalidFilterPattern` if the values are invalid.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(BexError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| BexError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `BexError::ConfigValidationError` for empty or malformed
    /// values and `BexError::InvalidFilterPattern` for a filter pattern that
    /// does not compile.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(BexError::config_validation(
                "model must not be empty",
                "Set model to a chat model identifier (e.g. \"gpt-4o\") in your bex.json",
            ));
        }

        if !(self.endpoint.starts_with("https://") || self.endpoint.starts_with("http://")) {
            return Err(BexError::config_validation(
                format!("endpoint must be an http(s) URL, got '{}'", self.endpoint),
                "Set endpoint to the full chat-completions URL in your bex.json",
            ));
        }

        if self.api_key_env.trim().is_empty() {
            return Err(BexError::config_validation(
                "apiKeyEnv must not be empty",
                "Set apiKeyEnv to the name of the environment variable holding your API key",
            ));
        }

        if self.greeting.trim().is_empty() {
            return Err(BexError::config_validation(
                "greeting must not be empty",
                "Provide a greeting message in your bex.json or remove the field to use the default",
            ));
        }

        if self.port == 0 {
            return Err(BexError::config_validation(
                "port must be greater than 0",
                "Set port to a free TCP port (default 3000) in your bex.json",
            ));
        }

        for rule in &self.content_filter.rules {
            if rule.category.trim().is_empty() || rule.reason.trim().is_empty() {
                return Err(BexError::config_validation(
                    "contentFilter rules need a category and a reason",
                    "Give every rule in contentFilter.rules a non-empty category and reason",
                ));
            }
        }
        ContentFilter::from_policy(&self.content_filter)?;

        Ok(())
    }

    /// Reads the credential from the environment variable named by `api_key_env`.
    #[must_use]
    pub fn with_credential_from_env(self) -> Self {
        let credential = Credential::from_env(&self.api_key_env);
        self.with_credential(credential)
    }

    /// Sets (or clears) the credential.
    #[must_use]
    pub fn with_credential(mut self, credential: Option<Credential>) -> Self {
        self.credential = credential;
        self
    }

    /// The resolved credential, if any.
    #[must_use]
    pub const fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Returns `true` when no usable credential is configured.
    #[must_use]
    pub const fn is_offline(&self) -> bool {
        self.credential.is_none()
    }
}
