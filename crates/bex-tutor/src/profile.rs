//! Student onboarding profile.
//!
//! The profile is filled in once from the onboarding form and re-read on
//! every turn. Inputs are only trimmed and coerced; there is no range
//! validation.

use serde::{Deserialize, Serialize};

/// Raw onboarding form values as typed by the student.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingForm {
    /// Name field.
    #[serde(default)]
    pub name: String,
    /// Age field (numeric text).
    #[serde(default)]
    pub age: String,
    /// Lesson field (optional).
    #[serde(default)]
    pub lesson: String,
}

impl OnboardingForm {
    /// Creates a form from its three fields.
    #[must_use]
    pub fn new(name: impl Into<String>, age: impl Into<String>, lesson: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age: age.into(),
            lesson: lesson.into(),
        }
    }
}

/// Who the tutor is talking to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentProfile {
    /// Student name, leading whitespace trimmed. May be empty.
    pub name: String,

    /// Student age, absent when the input was blank or not a number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,

    /// Lesson topic, absent when blank.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson: Option<String>,
}

impl StudentProfile {
    /// Builds a profile from the onboarding form.
    ///
    /// # Examples
    ///
    /// ```
    /// use bex_tutor::{OnboardingForm, StudentProfile};
    ///
    /// let profile = StudentProfile::from_form(&OnboardingForm::new("  Sam", "9", ""));
    /// assert_eq!(profile.name, "Sam");
    /// assert_eq!(profile.age, Some(9));
    /// assert_eq!(profile.lesson, None);
    /// ```
    #[must_use]
    pub fn from_form(form: &OnboardingForm) -> Self {
        let lesson = form.lesson.trim_start();
        Self {
            name: form.name.trim_start().to_string(),
            age: parse_age(&form.age),
            lesson: (!lesson.trim().is_empty()).then(|| lesson.to_string()),
        }
    }

    /// Returns `true` if no field has been filled in.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.trim().is_empty() && self.age.is_none() && self.lesson.is_none()
    }

    /// Clears all fields.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Coerces the age field to a whole number of years.
///
/// Blank, non-numeric and negative inputs yield `None`. Fractional input is
/// truncated, matching a numeric form control.
#[must_use]
pub fn parse_age(input: &str) -> Option<u32> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(age) = trimmed.parse::<u32>() {
        return Some(age);
    }

    let value = trimmed.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 || value > f64::from(u32::MAX) {
        return None;
    }

    // Range checked above.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(value.trunc() as u32)
}
