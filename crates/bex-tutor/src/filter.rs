//! Keyword and pattern based moderation of student messages.
//!
//! The banned-content policy is data, not code: a [`FilterPolicy`] is a list
//! of [`FilterRule`]s loaded from configuration (with a kid-safe default
//! table) and compiled once into a [`ContentFilter`]. Evaluation is pure and
//! never fails; a rule that does not compile is rejected when the filter is
//! built.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{BexError, Result};

/// Reason shown when a student shares personal details.
const PERSONAL_INFO_REASON: &str = "Let's keep personal information private! \
Please don't share things like your address, phone number, email or passwords here.";

/// Reason shown for rude language.
const PROFANITY_REASON: &str =
    "Let's keep our chat kind and respectful. Could you say that another way?";

/// Reason shown for unsafe topics.
const UNSAFE_TOPIC_REASON: &str = "That's not something I can help with. \
If you're feeling upset or unsafe, please talk to a parent, teacher or another trusted adult right away.";

// ============================================================================
// Policy Table
// ============================================================================

/// One category of banned content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterRule {
    /// Short machine-readable category name (e.g. `personal_info`).
    pub category: String,

    /// Case-insensitive regular expressions; any match denies the message.
    pub patterns: Vec<String>,

    /// Student-facing explanation shown in place of a reply.
    pub reason: String,
}

impl FilterRule {
    /// Creates a rule from a category, its patterns and the denial reason.
    #[must_use]
    pub fn new<I, S>(category: impl Into<String>, patterns: I, reason: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            category: category.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
            reason: reason.into(),
        }
    }
}

/// Ordered table of filter rules. The first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPolicy {
    /// Rules evaluated in order.
    #[serde(default)]
    pub rules: Vec<FilterRule>,
}

impl FilterPolicy {
    /// A policy that allows everything.
    #[must_use]
    pub const fn allow_all() -> Self {
        Self { rules: Vec::new() }
    }
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            rules: vec![
                FilterRule::new(
                    "personal_info",
                    [
                        r"[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}",
                        r"(\+\d{1,3}[-.\s]?)?(\(\d{3}\)\s?|\b\d{3}[-.\s])\d{3}[-.\s]\d{4}\b",
                        r"\b\d{1,5}\s+\w+(\s+\w+)?\s+(street|st|avenue|ave|road|rd|lane|ln|drive|dr|court|ct|boulevard|blvd)\b",
                        r"\bmy\s+(password|passcode|pin)\s+is\b",
                        r"\bi\s+live\s+at\b",
                    ],
                    PERSONAL_INFO_REASON,
                ),
                FilterRule::new(
                    "profanity",
                    [r"\b(damn|crap|shit\w*|fuck\w*|bitch\w*|bastard|dumbass|asshole)\b"],
                    PROFANITY_REASON,
                ),
                FilterRule::new(
                    "unsafe_topics",
                    [
                        r"\b(kill|hurt|harm)\s+(myself|yourself|himself|herself|themselves|someone|somebody)\b",
                        r"\bsuicid\w*",
                        r"\b(make|build)\s+(a\s+)?(bomb|gun|weapon)s?\b",
                    ],
                    UNSAFE_TOPIC_REASON,
                ),
            ],
        }
    }
}

// ============================================================================
// Decision
// ============================================================================

/// Outcome of filtering one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum FilterDecision {
    /// The message may be forwarded.
    Allowed,
    /// The message must not be forwarded.
    Denied {
        /// Category of the rule that matched.
        category: String,
        /// Student-facing reason.
        reason: String,
    },
}

impl FilterDecision {
    /// Returns `true` if the message may be forwarded.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Returns the denial reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Denied { reason, .. } => Some(reason),
        }
    }
}

// ============================================================================
// Compiled Filter
// ============================================================================

#[derive(Debug, Clone)]
struct CompiledRule {
    category: String,
    reason: String,
    patterns: Vec<Regex>,
}

/// A compiled [`FilterPolicy`].
#[derive(Debug, Clone)]
pub struct ContentFilter {
    rules: Vec<CompiledRule>,
}

impl ContentFilter {
    /// Compiles every pattern of `policy`.
    ///
    /// # Errors
    ///
    /// Returns `BexError::InvalidFilterPattern` for the first pattern that is
    /// not a valid regular expression.
    pub fn from_policy(policy: &FilterPolicy) -> Result<Self> {
        let rules = policy
            .rules
            .iter()
            .map(|rule| -> Result<CompiledRule> {
                let patterns = rule
                    .patterns
                    .iter()
                    .map(|pattern| {
                        RegexBuilder::new(pattern)
                            .case_insensitive(true)
                            .build()
                            .map_err(|e| {
                                BexError::invalid_filter_pattern(
                                    &rule.category,
                                    pattern,
                                    e.to_string(),
                                )
                            })
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(CompiledRule {
                    category: rule.category.clone(),
                    reason: rule.reason.clone(),
                    patterns,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Decides whether `text` may be forwarded to the tutor.
    pub fn evaluate(&self, text: &str) -> FilterDecision {
        self.rules
            .iter()
            .find(|rule| rule.patterns.iter().any(|re| re.is_match(text)))
            .map_or(FilterDecision::Allowed, |rule| FilterDecision::Denied {
                category: rule.category.clone(),
                reason: rule.reason.clone(),
            })
    }

    /// Number of rules in the compiled policy.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}
