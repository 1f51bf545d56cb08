//! End-to-end tests for the tutor pipeline.
//!
//! These tests drive a real `OpenAiClient` against a mock completion
//! endpoint, both directly and through the HTTP API.

use std::time::Duration;

use bex_tutor::{
    create_router, AppState, CompletionError, Config, Credential, OnboardingForm, PipelineStatus,
    Sender, SessionSnapshot, SubmitOutcome, SubmitResponse, TutorPipeline, DEFAULT_GREETING,
    OFFLINE_REPLY,
};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Builds an online configuration pointing at the mock server.
fn online_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.endpoint = format!("{}{COMPLETIONS_PATH}", server.uri());
    config.model = "gpt-4o-mini".to_string();
    config.with_credential(Credential::new("sk-test"))
}

/// Mounts a successful completion returning `reply`.
async fn mount_reply(server: &MockServer, reply: &str) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": reply}}]
        })))
        .mount(server)
        .await;
}

/// Parses the JSON bodies of every request the mock server received.
async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .expect("request recording enabled")
        .iter()
        .map(|request| serde_json::from_slice(&request.body).expect("JSON request body"))
        .collect()
}

/// Spawns the HTTP API and returns its base URL.
async fn spawn_api(pipeline: TutorPipeline) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let router = create_router(AppState::new(pipeline));

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    (format!("http://{addr}"), handle)
}

// ============================================================================
// Pipeline scenarios
// ============================================================================

/// No credential: the offline notice is appended and nothing is sent.
#[tokio::test]
async fn test_offline_scenario() {
    let server = MockServer::start().await;
    let mut config = Config::default();
    config.endpoint = format!("{}{COMPLETIONS_PATH}", server.uri());
    let config = config.with_credential(Credential::new("fake-key"));
    let pipeline = TutorPipeline::from_config(config).expect("pipeline");

    let outcome = pipeline.submit("hello").await.expect("submit");

    assert_eq!(outcome, SubmitOutcome::Offline);
    let messages = pipeline.messages().await;
    let texts: Vec<&str> = messages.iter().map(|m| m.text()).collect();
    assert_eq!(texts, vec![DEFAULT_GREETING, "hello", OFFLINE_REPLY]);
    assert_eq!(messages[2].sender(), Sender::Assistant);
    assert!(received_bodies(&server).await.is_empty());
}

/// HTTP 500: the apology carries the response body and the pipeline is idle again.
#[tokio::test]
async fn test_server_error_scenario() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("server error"))
        .expect(1)
        .mount(&server)
        .await;
    let pipeline = TutorPipeline::from_config(online_config(&server)).expect("pipeline");

    let outcome = pipeline.submit("hello").await.expect("submit");

    assert!(matches!(
        outcome,
        SubmitOutcome::Failed(CompletionError::Http { status: 500, .. })
    ));
    let last = pipeline.messages().await.pop().expect("reply");
    assert_eq!(last.sender(), Sender::Assistant);
    assert!(last.text().contains("server error"), "got: {}", last.text());
    assert_eq!(pipeline.status(), PipelineStatus::Idle);
}

/// 200 without content: reported as missing content, no crash.
#[tokio::test]
async fn test_missing_content_scenario() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": [{}]})))
        .mount(&server)
        .await;
    let pipeline = TutorPipeline::from_config(online_config(&server)).expect("pipeline");

    let outcome = pipeline.submit("hello").await.expect("submit");

    assert_eq!(outcome, SubmitOutcome::Failed(CompletionError::ContentMissing));
    let last = pipeline.messages().await.pop().expect("reply");
    assert!(last.text().starts_with("Sorry, I encountered an error."));
    assert!(!pipeline.is_pending());
}

/// The request carries the bearer credential, the model, the system prompt and the transcript.
#[tokio::test]
async fn test_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "print('hi')"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    let pipeline = TutorPipeline::from_config(online_config(&server)).expect("pipeline");
    pipeline
        .complete_onboarding(&OnboardingForm::new("Ada", "10", "Printing"))
        .await;

    let outcome = pipeline.submit("How do I print?").await.expect("submit");
    assert_eq!(outcome, SubmitOutcome::Replied);

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["model"], "gpt-4o-mini");

    let messages = body["messages"].as_array().expect("messages array");
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["role"], "system");
    let system = messages[0]["content"].as_str().expect("system content");
    assert!(system.contains("Ada"));
    assert!(system.contains("Printing"));
    assert_eq!(messages[1], json!({"role": "assistant", "content": DEFAULT_GREETING}));
    assert_eq!(messages[2], json!({"role": "user", "content": "How do I print?"}));

    let last = pipeline.messages().await.pop().expect("reply");
    assert_eq!(last.text(), "print('hi')");
}

/// Denied input never reaches the endpoint.
#[tokio::test]
async fn test_denied_input_makes_no_request() {
    let server = MockServer::start().await;
    mount_reply(&server, "unused").await;
    let pipeline = TutorPipeline::from_config(online_config(&server)).expect("pipeline");

    let outcome = pipeline
        .submit("my email is kid@example.com")
        .await
        .expect("submit");

    assert!(matches!(outcome, SubmitOutcome::Denied { .. }));
    assert_eq!(pipeline.messages().await.len(), 2);
    assert!(received_bodies(&server).await.is_empty());
}

// ============================================================================
// HTTP API
// ============================================================================

/// Onboarding, a message and a reset through the HTTP API.
#[tokio::test]
async fn test_http_session_flow() {
    let server = MockServer::start().await;
    mount_reply(&server, "Great question!").await;
    let pipeline = TutorPipeline::from_config(online_config(&server)).expect("pipeline");
    let (base, _handle) = spawn_api(pipeline).await;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("client");

    let profile: Value = client
        .post(format!("{base}/api/onboarding"))
        .json(&json!({"name": "Sam", "age": "9", "lesson": "Loops"}))
        .send()
        .await
        .expect("onboarding request")
        .json()
        .await
        .expect("onboarding body");
    assert_eq!(profile, json!({"name": "Sam", "age": 9, "lesson": "Loops"}));

    let response: SubmitResponse = client
        .post(format!("{base}/api/messages"))
        .json(&json!({"text": "What is a loop?"}))
        .send()
        .await
        .expect("submit request")
        .json()
        .await
        .expect("submit body");
    assert_eq!(response.outcome, "replied");
    assert_eq!(response.messages.len(), 3);
    assert_eq!(response.messages[2].text(), "Great question!");

    let status = client
        .post(format!("{base}/api/messages"))
        .json(&json!({"text": ""}))
        .send()
        .await
        .expect("empty submit request")
        .status();
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

    let reset: Value = client
        .post(format!("{base}/api/reset"))
        .json(&json!({"confirmed": true}))
        .send()
        .await
        .expect("reset request")
        .json()
        .await
        .expect("reset body");
    assert_eq!(reset["reset"], true);

    let session: SessionSnapshot = client
        .get(format!("{base}/api/session"))
        .send()
        .await
        .expect("session request")
        .json()
        .await
        .expect("session body");
    assert_eq!(session.status, PipelineStatus::Idle);
    assert!(session.onboarding_open);
    assert!(session.profile.is_empty());
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].text(), DEFAULT_GREETING);
}
