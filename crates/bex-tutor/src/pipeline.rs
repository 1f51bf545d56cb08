//! Orchestration pipeline for one tutoring session.
//!
//! [`TutorPipeline`] owns the transcript and the student profile and runs
//! every submitted message through the same steps: validation, the content
//! filter, the completion backend and finally the transcript. At most one
//! reply is in flight at a time.
//!
//! # State machine
//!
//! ```text
//! idle --submit(accepted)--> pending --(resolved)--> idle
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::client::{CompletionBackend, CompletionRequest, OpenAiClient};
use crate::config::Config;
use crate::conversation::{Message, Transcript};
use crate::error::{BexError, CompletionError, Result};
use crate::events::{EventBroadcaster, SessionEvent};
use crate::filter::{ContentFilter, FilterDecision};
use crate::profile::{OnboardingForm, StudentProfile};
use crate::prompt::system_message_for;

/// Reply appended when no credential is configured.
pub const OFFLINE_REPLY: &str = "(No connection available) Running in offline mode.";

/// Prefix of the reply appended when a completion fails.
pub const ERROR_REPLY_PREFIX: &str = "Sorry, I encountered an error.";

/// Question asked before a reset.
pub const RESET_PROMPT: &str = "Are you sure you want to reset your name, age, and lesson?\n\
This will restart the conversation setup.";

// ============================================================================
// Public types
// ============================================================================

/// Whether a reply is being awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Ready for the next message.
    Idle,
    /// Waiting for a reply.
    Pending,
}

/// Serializable view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Pipeline status.
    pub status: PipelineStatus,
    /// Whether the onboarding form should be shown.
    pub onboarding_open: bool,
    /// Current student profile.
    pub profile: StudentProfile,
    /// The transcript, greeting first.
    pub messages: Vec<Message>,
}

/// What happened to an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The filter blocked the message; its reason was appended.
    Denied {
        /// Category of the matching rule.
        category: String,
        /// Reason shown to the student.
        reason: String,
    },
    /// No credential is configured; the offline notice was appended.
    Offline,
    /// The model replied; the reply was appended verbatim.
    Replied,
    /// The completion failed; an apology with the detail was appended.
    Failed(CompletionError),
}

impl SubmitOutcome {
    /// Short name used in API responses and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Denied { .. } => "denied",
            Self::Offline => "offline",
            Self::Replied => "replied",
            Self::Failed(_) => "failed",
        }
    }
}

/// Result of a reset request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The session was reset.
    Reset,
    /// The student declined; nothing changed.
    Declined,
}

/// Asks the student a yes/no question.
pub trait Confirmation {
    /// Returns `true` if the student agreed to `prompt`.
    fn confirm(&self, prompt: &str) -> bool;
}

impl Confirmation for bool {
    fn confirm(&self, _prompt: &str) -> bool {
        *self
    }
}

impl<F> Confirmation for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

// ============================================================================
// Pending guard
// ============================================================================

/// Holds the single-flight claim and releases it on drop.
struct PendingGuard<'a> {
    flag: &'a AtomicBool,
    events: &'a EventBroadcaster,
    announced: bool,
}

impl<'a> PendingGuard<'a> {
    fn claim(flag: &'a AtomicBool, events: &'a EventBroadcaster) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| BexError::ReplyPending)?;
        Ok(Self {
            flag,
            events,
            announced: false,
        })
    }

    /// Makes the pending state visible to subscribers.
    fn announce(&mut self) {
        self.announced = true;
        self.events.send(SessionEvent::pending_changed(true));
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        if self.announced {
            self.events.send(SessionEvent::pending_changed(false));
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug)]
struct Session {
    transcript: Transcript,
    profile: StudentProfile,
    onboarding_open: bool,
}

/// Runs one tutoring session.
///
/// A `None` backend means no credential is configured and every accepted
/// message gets the offline notice.
#[derive(Debug)]
pub struct TutorPipeline<B = OpenAiClient> {
    config: Arc<Config>,
    backend: Option<B>,
    filter: ContentFilter,
    session: Mutex<Session>,
    pending: AtomicBool,
    events: EventBroadcaster,
}

impl TutorPipeline<OpenAiClient> {
    /// Creates a pipeline that talks to the configured endpoint.
    ///
    /// Falls back to offline mode when the configuration has no credential.
    ///
    /// # Errors
    ///
    /// Returns `BexError::InvalidFilterPattern` if the content filter policy
    /// does not compile.
    pub fn from_config(config: Config) -> Result<Self> {
        let backend = OpenAiClient::from_config(&config);
        Self::new(config, backend)
    }
}

impl<B: CompletionBackend> TutorPipeline<B> {
    /// Creates a pipeline with an explicit backend.
    ///
    /// # Errors
    ///
    /// Returns `BexError::InvalidFilterPattern` if the content filter policy
    /// does not compile.
    pub fn new(config: impl Into<Arc<Config>>, backend: Option<B>) -> Result<Self> {
        let config = config.into();
        let filter = ContentFilter::from_policy(&config.content_filter)?;
        let session = Session {
            transcript: Transcript::new(config.greeting.clone()),
            profile: StudentProfile::default(),
            onboarding_open: true,
        };

        info!(
            model = %config.model,
            offline = backend.is_none(),
            filter_rules = filter.rule_count(),
            "Tutor pipeline ready"
        );

        Ok(Self {
            config,
            backend,
            filter,
            session: Mutex::new(session),
            pending: AtomicBool::new(false),
            events: EventBroadcaster::default(),
        })
    }

    /// Submits a student message and waits for the tutor's reply.
    ///
    /// # Errors
    ///
    /// Returns `BexError::EmptyMessage` for blank input and
    /// `BexError::ReplyPending` while another reply is in flight. Neither
    /// changes the session. Completion failures are not errors; they come
    /// back as [`SubmitOutcome::Failed`].
    pub async fn submit(&self, raw_text: &str) -> Result<SubmitOutcome> {
        if raw_text.trim().is_empty() {
            warn!("Rejected empty message");
            return Err(BexError::EmptyMessage);
        }

        let mut guard = PendingGuard::claim(&self.pending, &self.events).map_err(|e| {
            warn!("Rejected message while a reply is pending");
            e
        })?;

        if let FilterDecision::Denied { category, reason } = self.filter.evaluate(raw_text) {
            info!(category = %category, "Message blocked by content filter");
            self.append_assistant(reason.clone()).await;
            return Ok(SubmitOutcome::Denied { category, reason });
        }

        let request = {
            let mut session = self.session.lock().await;
            let message = session.transcript.push_user(raw_text).clone();
            self.events.send(SessionEvent::message_appended(message));

            let mut messages = vec![system_message_for(&session.profile)];
            messages.extend(session.transcript.to_chat_messages());
            CompletionRequest {
                model: self.config.model.clone(),
                messages,
            }
        };
        guard.announce();

        let Some(backend) = &self.backend else {
            info!("No credential configured, replying in offline mode");
            self.append_assistant(OFFLINE_REPLY).await;
            return Ok(SubmitOutcome::Offline);
        };

        debug!(messages = request.messages.len(), "Awaiting completion");
        let outcome = match backend.complete(&request).await {
            Ok(reply) => {
                debug!(chars = reply.len(), "Completion received");
                self.append_assistant(reply).await;
                SubmitOutcome::Replied
            }
            Err(err) => {
                error!(kind = err.kind(), error = %err, "Completion request failed");
                self.append_assistant(format!("{ERROR_REPLY_PREFIX} {err}"))
                    .await;
                SubmitOutcome::Failed(err)
            }
        };

        drop(guard);
        Ok(outcome)
    }

    /// Submits a student message on a background task.
    ///
    /// Once the message is accepted the reply always lands in the transcript,
    /// even if the caller stops waiting. HTTP handlers use this so an aborted
    /// request never leaves a student message without an answer.
    ///
    /// # Errors
    ///
    /// Same as [`TutorPipeline::submit`], plus `BexError::SubmitInterrupted`
    /// if the background task panics or is cancelled.
    pub async fn submit_detached(self: Arc<Self>, raw_text: String) -> Result<SubmitOutcome>
    where
        B: 'static,
    {
        let task = tokio::spawn(async move { self.submit(&raw_text).await });
        task.await.map_err(|e| {
            error!(error = %e, "Submit task did not finish");
            BexError::SubmitInterrupted(e.to_string())
        })?
    }

    /// Resets the session after asking for confirmation.
    ///
    /// A confirmed reset clears the profile, drops everything but the
    /// greeting and re-opens onboarding. Resetting twice equals resetting
    /// once.
    ///
    /// # Errors
    ///
    /// Returns `BexError::ReplyPending` while a reply is in flight.
    pub async fn reset(&self, confirmation: &impl Confirmation) -> Result<ResetOutcome> {
        if self.is_pending() {
            warn!("Rejected reset while a reply is pending");
            return Err(BexError::ReplyPending);
        }

        if !confirmation.confirm(RESET_PROMPT) {
            debug!("Reset declined");
            return Ok(ResetOutcome::Declined);
        }

        // Hold the claim so no submit slips in while the session is cleared.
        let guard = PendingGuard::claim(&self.pending, &self.events)?;
        let snapshot = {
            let mut session = self.session.lock().await;
            session.transcript.reset();
            session.profile.clear();
            session.onboarding_open = true;
            Self::snapshot_of(&session, PipelineStatus::Idle)
        };
        drop(guard);

        info!("Session reset");
        self.events.send(SessionEvent::session_reset(snapshot));
        Ok(ResetOutcome::Reset)
    }

    /// Stores the onboarding answers and closes onboarding.
    pub async fn complete_onboarding(&self, form: &OnboardingForm) -> StudentProfile {
        let profile = StudentProfile::from_form(form);
        {
            let mut session = self.session.lock().await;
            session.profile = profile.clone();
            session.onboarding_open = false;
        }

        info!(
            has_name = !profile.name.trim().is_empty(),
            age = ?profile.age,
            has_lesson = profile.lesson.is_some(),
            "Onboarding completed"
        );
        self.events
            .send(SessionEvent::onboarding_updated(profile.clone()));
        profile
    }

    /// Returns a snapshot of the whole session.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let session = self.session.lock().await;
        Self::snapshot_of(&session, self.status())
    }

    /// Returns a copy of the transcript.
    pub async fn messages(&self) -> Vec<Message> {
        self.session.lock().await.transcript.messages().to_vec()
    }

    /// Returns a copy of the student profile.
    pub async fn profile(&self) -> StudentProfile {
        self.session.lock().await.profile.clone()
    }

    /// Returns whether onboarding is open.
    pub async fn onboarding_open(&self) -> bool {
        self.session.lock().await.onboarding_open
    }

    /// Current pipeline status.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        if self.is_pending() {
            PipelineStatus::Pending
        } else {
            PipelineStatus::Idle
        }
    }

    /// Returns `true` while a reply is being awaited.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Returns `true` when no credential is configured.
    #[must_use]
    pub const fn is_offline(&self) -> bool {
        self.backend.is_none()
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The completion backend, `None` when offline.
    #[must_use]
    pub const fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    /// The configuration this pipeline was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn append_assistant(&self, text: impl Into<String>) {
        let message = self.session.lock().await.transcript.push_assistant(text).clone();
        self.events.send(SessionEvent::message_appended(message));
    }

    fn snapshot_of(session: &Session, status: PipelineStatus) -> SessionSnapshot {
        SessionSnapshot {
            status,
            onboarding_open: session.onboarding_open,
            profile: session.profile.clone(),
            messages: session.transcript.messages().to_vec(),
        }
    }
}
