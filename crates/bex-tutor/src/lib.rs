//! BEX, the Bugbox Tutor
//!
//! Conversation pipeline, content filter, completion client and HTTP API for
//! a chat tutor that helps kids learn to code.

pub mod api;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod events;
pub mod filter;
pub mod pipeline;
pub mod profile;
pub mod prompt;

pub use api::{
    create_router, AppState, ErrorResponse, ResetRequest, ResetResponse, SubmitRequest,
    SubmitResponse,
};
pub use client::{CompletionBackend, CompletionRequest, OpenAiClient};
pub use config::{Config, Credential};
pub use conversation::{
    ChatMessage, Direction, Message, Role, Sender, Transcript, DEFAULT_GREETING,
};
pub use error::{BexError, CompletionError, Result};
pub use events::{EventBroadcaster, SessionEvent};
pub use filter::{ContentFilter, FilterDecision, FilterPolicy, FilterRule};
pub use pipeline::{
    Confirmation, PipelineStatus, ResetOutcome, SessionSnapshot, SubmitOutcome, TutorPipeline,
    ERROR_REPLY_PREFIX, OFFLINE_REPLY, RESET_PROMPT,
};
pub use profile::{parse_age, OnboardingForm, StudentProfile};
pub use prompt::{generate_system_message, system_message_for};
