//! Error types for the BEX tutor.
//!
//! Configuration problems and rejected submissions surface as [`BexError`].
//! Failures talking to the completion endpoint are modelled separately by
//! [`CompletionError`] because the pipeline turns them into chat messages
//! instead of propagating them.

use std::path::PathBuf;

/// A specialized `Result` type for BEX tutor operations.
pub type Result<T> = std::result::Result<T, BexError>;

/// Errors that can occur while configuring or driving the tutor.
///
/// Variants carry an actionable suggestion where one exists.
#[derive(Debug, thiserror::Error)]
pub enum BexError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your bex.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// A content filter rule contains a pattern that does not compile.
    #[error("Invalid filter pattern '{pattern}' in category '{category}': {message}\n\nSuggestion: Fix the regular expression in the contentFilter section of bex.json")]
    InvalidFilterPattern {
        /// Category of the offending rule.
        category: String,
        /// The pattern as written in the configuration.
        pattern: String,
        /// Compiler error from the regex engine.
        message: String,
    },

    // ========================================================================
    // Submission Errors
    // ========================================================================
    /// The submitted message was empty or whitespace-only.
    #[error("Message is empty\n\nSuggestion: Type something before sending")]
    EmptyMessage,

    /// A reply to an earlier message is still pending.
    #[error("BEX is still answering the previous message\n\nSuggestion: Wait for the reply before sending another message")]
    ReplyPending,

    /// The background task running a submission stopped before it finished.
    #[error("The reply task stopped unexpectedly: {0}")]
    SubmitInterrupted(String),
}

impl BexError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `InvalidFilterPattern` error.
    #[must_use]
    pub fn invalid_filter_pattern(
        category: impl Into<String>,
        pattern: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidFilterPattern {
            category: category.into(),
            pattern: pattern.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the error rejects a submission without touching the session.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::EmptyMessage | Self::ReplyPending)
    }
}

/// Failures of a single completion request.
///
/// The `Display` text is embedded verbatim in the apology message shown to
/// the student, so it carries the status and body detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// The endpoint answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body as text.
        body: String,
    },

    /// The request never produced a usable HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint answered 2xx but `choices[0].message.content` was absent.
    #[error("Missing message content in completion response.")]
    ContentMissing,
}

impl CompletionError {
    /// Creates a new `Http` error.
    #[must_use]
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    /// Creates a new `Network` error.
    #[must_use]
    pub fn network(detail: impl std::fmt::Display) -> Self {
        Self::Network(detail.to_string())
    }

    /// Short machine-readable name used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } | Self::Network(_) => "transport",
            Self::ContentMissing => "content_missing",
        }
    }
}
