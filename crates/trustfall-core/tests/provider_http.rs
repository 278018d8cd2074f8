//! Wire-level tests against a mock upstream.

use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trustfall_core::error::{FailureClass, ProviderError};
use trustfall_core::opponent::{ModelOpponent, Opponent};
use trustfall_core::provider::anthropic::AnthropicProvider;
use trustfall_core::provider::openai::OpenAiProvider;
use trustfall_core::provider::types::{ChatMessage, ChatRequest};
use trustfall_core::provider::LlmProvider;
use trustfall_core::secrets::ConfigSecrets;
use trustfall_core::types::{ConversationMessage, GameStats, ScoreTally};

const PROFILE_REPLY: &str = "1. Share first.\n2. Somewhat.\n3. The AI team.\n4. Keep once.\n5. Both sharing.";

fn request() -> ChatRequest {
    ChatRequest {
        system: "You are playing a game.".into(),
        messages: vec![ChatMessage::user("Shall we share?")],
        max_tokens: 64,
    }
}

fn anthropic(server: &MockServer) -> AnthropicProvider {
    AnthropicProvider::new(Some(&server.uri()), None, reqwest::Client::new())
}

fn blocks(text: &str) -> Value {
    json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}]
    })
}

async fn body_of(server: &MockServer, index: usize) -> Value {
    let requests = server.received_requests().await.expect("recording enabled");
    serde_json::from_slice(&requests[index].body).expect("json body")
}

#[tokio::test]
async fn test_anthropic_headers_and_content_blocks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(blocks("I will SHARE")))
        .expect(1)
        .mount(&server)
        .await;

    let text = anthropic(&server).chat("sk-ant-test", &request()).await.unwrap();
    assert_eq!(text, "I will SHARE");

    let body = body_of(&server, 0).await;
    assert_eq!(body["system"], "You are playing a game.");
    assert_eq!(body["max_tokens"], 64);
    assert_eq!(body["messages"], json!([{"role": "user", "content": "Shall we share?"}]));
}

#[tokio::test]
async fn test_openai_bearer_and_choices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "KEEP"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(Some(&server.uri()), Some("gpt-4o"), reqwest::Client::new());
    let text = provider.chat("sk-test", &request()).await.unwrap();
    assert_eq!(text, "KEEP");

    let body = body_of(&server, 0).await;
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["messages"][0], json!({"role": "system", "content": "You are playing a game."}));
}

#[tokio::test]
async fn test_status_classes() {
    let cases = [
        (401, json!({"error": {"type": "authentication_error", "message": "invalid x-api-key"}}), FailureClass::Unauthorized),
        (429, json!({"error": "Error from Claude API", "details": {"error": {"message": "slow down"}}}), FailureClass::RateLimited),
        (500, json!({"error": "Internal server error", "message": "boom"}), FailureClass::Generic),
    ];

    for (status, body, class) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;

        let err = anthropic(&server).chat("sk-ant-test", &request()).await.unwrap_err();
        assert_eq!(err.failure_class(), class, "status {}", status);
        assert_eq!(err.status(), Some(status));
    }
}

#[tokio::test]
async fn test_proxy_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "Internal server error",
            "message": "upstream exploded"
        })))
        .mount(&server)
        .await;

    match anthropic(&server).chat("sk-ant-test", &request()).await {
        Err(ProviderError::Http { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "Internal server error: upstream exploded");
        }
        other => panic!("expected an HTTP error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_envelope_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "SHARE"})))
        .mount(&server)
        .await;

    let err = anthropic(&server).chat("sk-ant-test", &request()).await.unwrap_err();
    assert!(matches!(err, ProviderError::MalformedResponse(_)));
    assert_eq!(err.failure_class(), FailureClass::Generic);
}

#[tokio::test]
async fn test_unreachable_upstream_is_network_failure() {
    let provider = AnthropicProvider::new(Some("http://127.0.0.1:9"), None, reqwest::Client::new());
    let err = provider.chat("sk-ant-test", &request()).await.unwrap_err();
    assert_eq!(err.failure_class(), FailureClass::Network);
}

// ── Through the opponent ────────────────────────────────────────────

fn opponent(server: &MockServer) -> ModelOpponent {
    let secrets = ConfigSecrets::from_values([("claude", "\"sk-ant-test-key-1234\"")], None);
    ModelOpponent::new(Arc::new(anthropic(server)), Arc::new(secrets))
}

#[tokio::test]
async fn test_opponent_drops_system_messages_on_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-api-key", "sk-ant-test-key-1234"))
        .respond_with(ResponseTemplate::new(200).set_body_json(blocks(PROFILE_REPLY)))
        .mount(&server)
        .await;

    let history = vec![
        ConversationMessage::system("Welcome to TRUSTFALL. You have one round to play today."),
        ConversationMessage::opponent("CLAUDE", "Hello! I'm Claude."),
        ConversationMessage::human("Let's cooperate."),
    ];
    let opp = opponent(&server);
    opp.send_message(&history, &ScoreTally::new(5, 6), &GameStats::default())
        .await;

    // Profile elicitation, then the conversational turn.
    let chat = body_of(&server, 1).await;
    assert_eq!(
        chat["messages"],
        json!([
            {"role": "assistant", "content": "Hello! I'm Claude."},
            {"role": "user", "content": "Let's cooperate."}
        ])
    );
    let system = chat["system"].as_str().unwrap();
    assert!(system.contains("Your answer: \"Share first.\""));
    assert!(system.contains("- Human Team Total: 5 points"));
    assert!(!system.contains("Welcome to TRUSTFALL"));
}

#[tokio::test]
async fn test_opponent_absorbs_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"error": {"message": "rate limited"}})))
        .mount(&server)
        .await;

    let opp = opponent(&server);
    let history = vec![ConversationMessage::human("hi")];
    let tally = ScoreTally::default();
    let stats = GameStats::default();

    let reply = opp.send_message(&history, &tally, &stats).await;
    assert_eq!(
        reply,
        "I'm having trouble connecting. The API is rate limited. Please try again in a moment."
    );
    // Still yields a decision.
    opp.ai_decision(&history, &tally, &stats).await;
    assert!(opp.last_error().unwrap().message.contains("429"));
}
