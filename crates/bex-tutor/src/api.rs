//! HTTP API and WebSocket endpoint for the BEX tutor.
//!
//! This module exposes a [`TutorPipeline`] to browser chat widgets.
//!
//! # Endpoints
//!
//! - `GET /api/session` - Full session snapshot
//! - `GET /api/messages` - The transcript
//! - `POST /api/onboarding` - Store name, age and lesson
//! - `POST /api/messages` - Submit a student message and wait for the reply
//! - `POST /api/reset` - Reset the session (requires `confirmed: true`)
//! - `GET /ws` - Live session events
//!
//! # Example
//!
//! ```no_run
//! use bex_tutor::{create_router, AppState, Config, TutorPipeline};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = TutorPipeline::from_config(Config::default())?;
//! let router = create_router(AppState::new(pipeline));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};

use crate::client::{CompletionBackend, OpenAiClient};
use crate::conversation::Message;
use crate::error::BexError;
use crate::events::SessionEvent;
use crate::pipeline::{ResetOutcome, SessionSnapshot, SubmitOutcome, TutorPipeline};
use crate::profile::{OnboardingForm, StudentProfile};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /api/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// The student's message.
    pub text: String,
}

/// Response body for `POST /api/messages`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// `replied`, `offline`, `denied` or `failed`.
    pub outcome: String,
    /// Category of the rule that blocked the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// The transcript after the submission resolved.
    pub messages: Vec<Message>,
}

/// Request body for `POST /api/reset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetRequest {
    /// Whether the student confirmed the reset.
    #[serde(default)]
    pub confirmed: bool,
}

/// Response body for `POST /api/reset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    /// Whether the session was reset.
    pub reset: bool,
    /// The session after the request.
    pub session: SessionSnapshot,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug)]
pub struct AppState<B = OpenAiClient> {
    /// The session pipeline shared by all handlers.
    pub pipeline: Arc<TutorPipeline<B>>,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}

impl<B> AppState<B> {
    /// Creates a new `AppState` around a pipeline.
    #[must_use]
    pub fn new(pipeline: TutorPipeline<B>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }

    /// Creates a new `AppState` around an already shared pipeline.
    #[must_use]
    pub const fn from_shared(pipeline: Arc<TutorPipeline<B>>) -> Self {
        Self { pipeline }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
struct ApiError(BexError);

impl From<BexError> for ApiError {
    fn from(err: BexError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            BexError::EmptyMessage => StatusCode::BAD_REQUEST,
            BexError::ReplyPending => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router carries:
/// - All API routes under `/api`
/// - The WebSocket endpoint at `/ws`
/// - Permissive CORS so the chat widget can be served from anywhere
/// - Tracing middleware for request logging
pub fn create_router<B: CompletionBackend + 'static>(state: AppState<B>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/session", get(handle_session::<B>))
        .route(
            "/messages",
            get(handle_messages::<B>).post(handle_submit::<B>),
        )
        .route("/onboarding", post(handle_onboarding::<B>))
        .route("/reset", post(handle_reset::<B>));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler::<B>))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/session`.
async fn handle_session<B: CompletionBackend>(
    State(state): State<AppState<B>>,
) -> Json<SessionSnapshot> {
    Json(state.pipeline.snapshot().await)
}

/// Handler for `GET /api/messages`.
async fn handle_messages<B: CompletionBackend>(
    State(state): State<AppState<B>>,
) -> Json<Vec<Message>> {
    Json(state.pipeline.messages().await)
}

/// Handler for `POST /api/onboarding`.
async fn handle_onboarding<B: CompletionBackend>(
    State(state): State<AppState<B>>,
    Json(form): Json<OnboardingForm>,
) -> Json<StudentProfile> {
    Json(state.pipeline.complete_onboarding(&form).await)
}

/// Handler for `POST /api/messages`.
///
/// Resolves once the reply (or the offline notice, filter reason or
/// apology) has been appended. The submission runs detached, so a client
/// that disconnects early still gets its reply in the transcript.
async fn handle_submit<B: CompletionBackend + 'static>(
    State(state): State<AppState<B>>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError> {
    debug!(chars = request.text.len(), "Received message");

    let outcome = Arc::clone(&state.pipeline)
        .submit_detached(request.text)
        .await?;
    let category = match &outcome {
        SubmitOutcome::Denied { category, .. } => Some(category.clone()),
        _ => None,
    };

    Ok(Json(SubmitResponse {
        outcome: outcome.as_str().to_string(),
        category,
        messages: state.pipeline.messages().await,
    }))
}

/// Handler for `POST /api/reset`.
async fn handle_reset<B: CompletionBackend>(
    State(state): State<AppState<B>>,
    Json(request): Json<ResetRequest>,
) -> Result<Json<ResetResponse>, ApiError> {
    let outcome = state.pipeline.reset(&request.confirmed).await?;

    Ok(Json(ResetResponse {
        reset: outcome == ResetOutcome::Reset,
        session: state.pipeline.snapshot().await,
    }))
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `GET /ws`.
async fn ws_handler<B: CompletionBackend + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<B>>,
) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles a single WebSocket connection.
///
/// - Sends a `connected` event with the current session immediately
/// - Forwards every session event to the client; an event raised while the
///   snapshot was taken may also be reflected in that snapshot
/// - Sends heartbeat pings every 30 seconds
/// - Closes the connection after 3 missed pongs
async fn handle_socket<B: CompletionBackend>(socket: WebSocket, state: AppState<B>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before taking the snapshot: no event is lost, but one from
    // this window can repeat what the snapshot already holds
    let mut event_receiver = state.pipeline.subscribe();

    let connected = SessionEvent::connected(state.pipeline.snapshot().await);
    let connected_json = match serde_json::to_string(&connected) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(WsMessage::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("WebSocket client connected, sent session snapshot");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    // The first tick completes immediately
    heartbeat.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(WsMessage::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(WsMessage::Text(_) | WsMessage::Binary(_))) => {
                        debug!("Ignoring data message from client");
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if sender.send(WsMessage::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Event channel closed");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
