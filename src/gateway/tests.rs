use super::*;
use crate::llm::{PromptGenerator, Provider, ProviderFuture};
use crate::prompt::TemplateLibrary;
use crate::usage::{CallType, ClientId, SqliteUsageLedger, UsageLedger};
use axum::{
    Router,
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const PEER: ([u8; 4], u16) = ([127, 0, 0, 1], 4242);

#[derive(Default)]
struct ScriptedProvider {
    messages: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl ScriptedProvider {
    fn sent(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn chat_with_system<'a>(
        &'a self,
        _system_prompt: Option<&'a str>,
        message: &'a str,
        _model: &'a str,
        _temperature: f64,
    ) -> ProviderFuture<'a, String> {
        Box::pin(async move {
            let count = {
                let mut messages = self.messages.lock().unwrap();
                messages.push(message.to_string());
                messages.len()
            };
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("Gemini API error (503 Service Unavailable): overloaded");
            }
            Ok(format!("enhanced prompt #{count}"))
        })
    }
}

struct Harness {
    app: Router,
    ledger: Arc<SqliteUsageLedger>,
    provider: Arc<ScriptedProvider>,
    _tmp: TempDir,
}

async fn harness_with(trust_forwarded_for: bool, cors_origins: &[String]) -> Harness {
    let tmp = TempDir::new().unwrap();
    let ledger = Arc::new(
        SqliteUsageLedger::open(&tmp.path().join("usage.db"))
            .await
            .unwrap(),
    );
    let provider = Arc::new(ScriptedProvider::default());
    let generator = PromptGenerator::new(provider.clone(), "gemini-2.0-flash", 0.7);
    let machine =
        RefinementStateMachine::new(generator, Arc::new(TemplateLibrary::new().unwrap()));

    let state = AppState {
        limiter: Arc::new(RateLimiter::new(ledger.clone())),
        machine: Arc::new(machine),
        trust_forwarded_for,
    };
    let app = build_app(state, cors_origins, Duration::from_secs(30))
        .layer(MockConnectInfo(SocketAddr::from(PEER)));

    Harness {
        app,
        ledger,
        provider,
        _tmp: tmp,
    }
}

async fn harness() -> Harness {
    harness_with(false, &[]).await
}

fn peer_client() -> ClientId {
    ClientId::from(SocketAddr::from(PEER).ip())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn used(harness: &Harness, client: &ClientId) -> u64 {
    harness
        .ledger
        .count_since(client, chrono::Utc::now() - chrono::Duration::hours(24))
        .await
        .unwrap()
}

async fn seed_calls(harness: &Harness, client: &ClientId, n: usize) {
    let at = chrono::Utc::now() - chrono::Duration::minutes(30);
    for _ in 0..n {
        harness
            .ledger
            .record(client, CallType::Generate, at)
            .await
            .unwrap();
    }
}

#[test]
fn body_limit_is_64kb() {
    assert_eq!(MAX_BODY_SIZE, 65_536);
}

#[test]
fn app_state_is_clone() {
    fn assert_clone<T: Clone>() {}
    assert_clone::<AppState>();
}

#[test]
fn refine_body_defaults_choice() {
    let body: RefineBody = serde_json::from_value(json!({
        "prompt": "p", "additional_input": "a", "refinement_count": 1
    }))
    .unwrap();
    assert_eq!(body.choice, RefinementChoice::Default);

    let missing_count = serde_json::from_value::<RefineBody>(json!({
        "prompt": "p", "additional_input": "a"
    }));
    assert!(missing_count.is_err());
}

#[tokio::test]
async fn root_health_and_templates() {
    let h = harness().await;

    let (status, body) = send(&h.app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Prompt Enhancer API is running");

    let (status, body) = send(&h.app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (_, body) = send(&h.app, get("/templates")).await;
    assert_eq!(body["default"], "general");
    assert_eq!(body["templates"].as_array().unwrap().len(), 8);
}

#[tokio::test]
async fn generate_returns_fresh_prompt_and_charges_once() {
    let h = harness().await;

    let (status, body) = send(
        &h.app,
        post("/generate", &json!({"prompt": "tidal energy", "template": "research"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompt"], "enhanced prompt #1");
    assert_eq!(body["refinement_count"], 0);
    assert_eq!(used(&h, &peer_client()).await, 1);
    assert!(h.provider.sent()[0].contains("research report on the topic: 'tidal energy'"));
}

#[tokio::test]
async fn twenty_fifth_call_succeeds_and_twenty_sixth_is_rejected() {
    let h = harness().await;
    let client = peer_client();
    seed_calls(&h, &client, 24).await;

    let (status, _) = send(&h.app, post("/generate", &json!({"prompt": "tides"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(used(&h, &client).await, 25);

    let (status, body) = send(&h.app, post("/generate", &json!({"prompt": "tides"}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body["detail"],
        "Daily limit of 25 calls reached. Try again tomorrow."
    );
    assert_eq!(used(&h, &client).await, 25);
    assert_eq!(h.provider.sent().len(), 1);
}

#[tokio::test]
async fn quota_is_shared_across_call_types() {
    let h = harness().await;
    seed_calls(&h, &peer_client(), 25).await;

    let (status, _) = send(&h.app, post("/test", &json!({"prompt": "hi"}))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = send(
        &h.app,
        post(
            "/refine",
            &json!({"prompt": "p", "additional_input": "a", "refinement_count": 0, "choice": "add_context"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(h.provider.sent().is_empty());
}

#[tokio::test]
async fn refine_choices_send_different_instructions() {
    let h = harness().await;

    let mut shapes = Vec::new();
    for choice in ["add_context", "other"] {
        let (status, body) = send(
            &h.app,
            post(
                "/refine",
                &json!({
                    "prompt": "Write about tides.",
                    "additional_input": "for children",
                    "refinement_count": 1,
                    "choice": choice
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["refinement_count"], 2);
        shapes.push(
            body.as_object()
                .unwrap()
                .keys()
                .cloned()
                .collect::<Vec<_>>(),
        );
    }

    let sent = h.provider.sent();
    assert_ne!(sent[0], sent[1]);
    assert_eq!(shapes[0], shapes[1]);
    assert_eq!(used(&h, &peer_client()).await, 2);
}

#[tokio::test]
async fn refine_at_bound_is_rejected_without_charge() {
    let h = harness().await;

    let (status, body) = send(
        &h.app,
        post(
            "/api/refine",
            &json!({"prompt": "p", "additional_input": "more", "refinement_count": 3, "choice": "add_context"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Maximum refinements (3) reached");
    assert!(h.provider.sent().is_empty());
    assert_eq!(used(&h, &peer_client()).await, 0);
}

#[tokio::test]
async fn refine_bound_takes_precedence_over_empty_fields() {
    let h = harness().await;

    let (status, body) = send(
        &h.app,
        post(
            "/refine",
            &json!({"prompt": "", "additional_input": " ", "refinement_count": 4}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Maximum refinements (3) reached");
    assert!(h.provider.sent().is_empty());
    assert_eq!(used(&h, &peer_client()).await, 0);
}

#[tokio::test]
async fn empty_fields_are_rejected_without_charge() {
    let h = harness().await;

    let (status, body) = send(&h.app, post("/generate", &json!({"prompt": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("prompt"));

    let (status, body) = send(
        &h.app,
        post(
            "/refine",
            &json!({"prompt": "p", "additional_input": "", "refinement_count": 0}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("additional_input"));

    assert!(h.provider.sent().is_empty());
    assert_eq!(used(&h, &peer_client()).await, 0);
}

#[tokio::test]
async fn malformed_json_gets_detail() {
    let h = harness().await;
    let request = Request::builder()
        .method("POST")
        .uri("/generate")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&h.app, request).await;
    assert!(status.is_client_error());
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid request body"));
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let h = harness().await;
    let big = "x".repeat(MAX_BODY_SIZE + 1);
    let body = json!({ "prompt": big }).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/test")
        .header("content-type", "application/json")
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap();

    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(h.provider.sent().is_empty());
}

#[tokio::test]
async fn generator_failure_is_bad_gateway_and_not_charged() {
    let h = harness().await;
    h.provider.fail.store(true, Ordering::SeqCst);

    let (status, body) = send(&h.app, post("/test", &json!({"prompt": "hi"}))).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["detail"].as_str().unwrap().contains("503"));
    assert_eq!(used(&h, &peer_client()).await, 0);
}

#[tokio::test]
async fn ledger_outage_is_internal_error_and_skips_the_model() {
    let h = harness().await;
    h.ledger.close().await;

    let (status, body) = send(&h.app, post("/generate", &json!({"prompt": "tides"}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"detail": "Usage ledger unavailable"}));
    assert!(h.provider.sent().is_empty());
}

#[tokio::test]
async fn test_route_echoes_model_reply() {
    let h = harness().await;

    let (status, body) = send(&h.app, post("/api/test", &json!({"prompt": "What is 2+2?"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "enhanced prompt #1");
    assert_eq!(h.provider.sent(), vec!["What is 2+2?".to_string()]);
}

#[tokio::test]
async fn usage_reports_without_charging() {
    let h = harness().await;
    seed_calls(&h, &peer_client(), 3).await;

    let (status, body) = send(&h.app, get("/usage")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["used"], 3);
    assert_eq!(body["limit"], 25);
    assert_eq!(body["remaining"], 22);

    let (_, body) = send(&h.app, get("/usage")).await;
    assert_eq!(body["used"], 3);
}

#[tokio::test]
async fn forwarded_for_is_ignored_unless_trusted() {
    let proxied = ClientId::new("203.0.113.9");

    let untrusted = harness().await;
    seed_calls(&untrusted, &proxied, 25).await;
    let mut request = post("/test", &json!({"prompt": "hi"}));
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
    let (status, _) = send(&untrusted.app, request).await;
    assert_eq!(status, StatusCode::OK);

    let trusted = harness_with(true, &[]).await;
    seed_calls(&trusted, &proxied, 25).await;
    let mut request = post("/test", &json!({"prompt": "hi"}));
    request
        .headers_mut()
        .insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
    let (status, _) = send(&trusted.app, request).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn wildcard_cors_origin_is_dropped_instead_of_panicking() {
    let origins = ["*".to_string(), "http://127.0.0.1:5500".to_string()];
    let h = harness_with(false, &origins).await;

    let request = Request::builder()
        .uri("/health")
        .header("origin", "http://127.0.0.1:5500")
        .body(Body::empty())
        .unwrap();
    let response = h.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "http://127.0.0.1:5500"
    );
}
