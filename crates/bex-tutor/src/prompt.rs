//! System prompt for the tutor persona.
//!
//! The prompt is rebuilt from the current [`StudentProfile`] on every turn.
//! Missing fields drop their clause instead of leaving placeholders behind.

use std::fmt::Write as _;

use crate::conversation::ChatMessage;
use crate::profile::StudentProfile;

const PERSONA: &str = "You are BEX, the Bugbox Tutor: a friendly, patient and encouraging \
programming tutor for kids.";

const RULES: &[&str] = &[
    "Guide the student toward answers with hints and questions instead of handing over complete solutions.",
    "Keep answers short: a few sentences and at most one small code example.",
    "Format code with markdown code blocks and name the language.",
    "Stay on programming and computer science topics.",
    "Never ask for personal information such as addresses, phone numbers, schools or passwords.",
    "Celebrate progress and mistakes alike; every bug is a chance to learn.",
];

/// Builds the `system` message for a student.
///
/// Blank names fall back to a generic greeting, a missing age falls back to
/// general young-learner guidance, and a missing lesson omits the lesson
/// clause entirely.
///
/// # Examples
///
/// ```
/// use bex_tutor::{generate_system_message, Role};
///
/// let message = generate_system_message("Sam", Some(9), Some("Loops in Python"));
/// assert_eq!(message.role, Role::System);
/// assert!(message.content.contains("Sam"));
/// assert!(message.content.contains("9 years old"));
/// assert!(message.content.contains("Loops in Python"));
/// ```
#[must_use]
pub fn generate_system_message(name: &str, age: Option<u32>, lesson: Option<&str>) -> ChatMessage {
    let name = name.trim();
    let lesson = lesson.map(str::trim).filter(|l| !l.is_empty());

    let mut content = String::from(PERSONA);
    content.push_str("\n\n");

    match (name.is_empty(), age) {
        (false, Some(age)) => {
            let _ = write!(content, "You are talking with {name}, who is {age} years old.");
        }
        (false, None) => {
            let _ = write!(content, "You are talking with {name}.");
        }
        (true, Some(age)) => {
            let _ = write!(content, "You are talking with a student who is {age} years old.");
        }
        (true, None) => content.push_str("You are talking with a student."),
    }
    content.push(' ');
    content.push_str(age_guidance(age));
    if !name.is_empty() {
        content.push_str(" Use their name now and then to keep things personal.");
    }

    if let Some(lesson) = lesson {
        let _ = write!(
            content,
            "\n\nToday's lesson is \"{lesson}\". Keep the conversation focused on this lesson \
and gently steer back to it if the student wanders off."
        );
    }

    content.push_str("\n\nRules:");
    for rule in RULES {
        content.push_str("\n- ");
        content.push_str(rule);
    }

    ChatMessage::system(content)
}

/// Builds the `system` message from a stored profile.
#[must_use]
pub fn system_message_for(profile: &StudentProfile) -> ChatMessage {
    generate_system_message(&profile.name, profile.age, profile.lesson.as_deref())
}

/// Language guidance for an age bracket.
const fn age_guidance(age: Option<u32>) -> &'static str {
    match age {
        Some(0..=8) => {
            "Use very simple words and short sentences, and explain ideas with everyday \
examples like toys, games or animals."
        }
        Some(9..=12) => {
            "Use clear, simple language and connect new ideas to games and things the \
student already knows."
        }
        Some(_) => {
            "Use clear language suitable for a teenager and introduce the correct technical \
terms as you go."
        }
        None => "Use simple, friendly language suitable for a young learner.",
    }
}
