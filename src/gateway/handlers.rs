use crate::error::EnhancerError;
use crate::prompt::{MAX_REFINEMENTS, PromptState, TemplateCategory};
use crate::usage::{CallType, ClientId, QuotaUsage};
use axum::{
    extract::{ConnectInfo, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::net::SocketAddr;

use super::{
    AppState, GenerateBody, GenerateResponse, RefineBody, RefineResponse, TestBody, TestResponse,
};

/// Failure response rendered as `{"detail": "..."}`.
#[derive(Debug)]
pub(super) struct ApiError {
    status: StatusCode,
    detail: String,
}

impl From<EnhancerError> for ApiError {
    fn from(err: EnhancerError) -> Self {
        let (status, detail) = match &err {
            EnhancerError::QuotaExceeded { .. } => (StatusCode::TOO_MANY_REQUESTS, err.to_string()),
            EnhancerError::RefinementBoundExceeded { .. } | EnhancerError::InvalidRequest(_) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            EnhancerError::Generator(inner) => (StatusCode::BAD_GATEWAY, inner.to_string()),
            EnhancerError::Storage(inner) => {
                tracing::error!("usage ledger failure: {inner}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Usage ledger unavailable".to_string(),
                )
            }
            EnhancerError::Prompt(_) | EnhancerError::Config(_) | EnhancerError::Other(_) => {
                tracing::error!("request failed: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        Self { status, detail }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            detail: format!("Invalid request body: {}", rejection.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.detail });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Quota key for the caller: the peer IP, or the first `X-Forwarded-For` hop
/// when the gateway sits behind a trusted proxy.
fn client_id(state: &AppState, peer: SocketAddr, headers: &HeaderMap) -> ClientId {
    if state.trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return ClientId::new(hop);
        }
    }
    ClientId::from(peer.ip())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), EnhancerError> {
    if value.trim().is_empty() {
        return Err(EnhancerError::InvalidRequest(format!(
            "Field '{field}' must not be empty"
        )));
    }
    Ok(())
}

/// GET /: liveness message
pub(super) async fn handle_root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Prompt Enhancer API is running" }))
}

/// GET /health
pub(super) async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /templates: category names accepted by /generate
pub(super) async fn handle_templates() -> impl IntoResponse {
    let default: &'static str = TemplateCategory::default().into();
    Json(serde_json::json!({
        "templates": TemplateCategory::names(),
        "default": default,
    }))
}

/// GET /usage: trailing-window usage for the caller. Not charged.
pub(super) async fn handle_usage(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> ApiResult<QuotaUsage> {
    let client = client_id(&state, peer, &headers);
    let usage = state
        .limiter
        .usage(&client, Utc::now())
        .await
        .map_err(EnhancerError::from)?;
    Ok(Json(usage))
}

/// POST /generate: fresh prompt from a topic and template category
pub(super) async fn handle_generate(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> ApiResult<GenerateResponse> {
    let Json(body) = body?;
    let client = client_id(&state, peer, &headers);
    let category = TemplateCategory::resolve(&body.template);

    let generated = state
        .limiter
        .run_metered(&client, CallType::Generate, || async {
            require_non_empty("prompt", &body.prompt)?;
            state.machine.start(&body.prompt, category).await
        })
        .await?;

    tracing::info!(client = %client, template = %category, "prompt generated");
    Ok(Json(GenerateResponse {
        prompt: generated.text,
        refinement_count: generated.refinement_count,
    }))
}

/// POST /refine: one bounded refinement step over client-held state
pub(super) async fn handle_refine(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<RefineBody>, JsonRejection>,
) -> ApiResult<RefineResponse> {
    let Json(body) = body?;
    let client = client_id(&state, peer, &headers);
    let current = PromptState::new(body.prompt, body.refinement_count);

    let refined = state
        .limiter
        .run_metered(&client, CallType::Refine, || async {
            // Bound first, then fields.
            if !current.can_refine() {
                return Err(EnhancerError::RefinementBoundExceeded {
                    max: MAX_REFINEMENTS,
                });
            }
            require_non_empty("prompt", &current.text)?;
            require_non_empty("additional_input", &body.additional_input)?;
            state
                .machine
                .refine(&current, &body.additional_input, body.choice)
                .await
        })
        .await?;

    tracing::info!(
        client = %client,
        choice = ?body.choice,
        refinement_count = refined.refinement_count,
        "prompt refined"
    );
    Ok(Json(RefineResponse {
        refined_prompt: refined.text,
        refinement_count: refined.refinement_count,
    }))
}

/// POST /test: send the prompt to the model verbatim
pub(super) async fn handle_test(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<TestBody>, JsonRejection>,
) -> ApiResult<TestResponse> {
    let Json(body) = body?;
    let client = client_id(&state, peer, &headers);

    let response = state
        .limiter
        .run_metered(&client, CallType::Test, || async {
            require_non_empty("prompt", &body.prompt)?;
            state.machine.test(&body.prompt).await
        })
        .await?;

    tracing::info!(client = %client, "prompt tested");
    Ok(Json(TestResponse { response }))
}
