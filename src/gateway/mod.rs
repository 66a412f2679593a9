//! Axum HTTP gateway for the prompt enhancer.
//!
//! Every model-backed route is metered through the shared [`RateLimiter`] and
//! returns `{detail}` bodies on failure. Body size and whole-request time are
//! capped by tower-http layers.

mod handlers;
mod server;

pub use server::{build_app, run_gateway, run_gateway_with_listener};

use crate::prompt::{RefinementChoice, RefinementStateMachine};
use crate::usage::RateLimiter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<RateLimiter>,
    pub machine: Arc<RefinementStateMachine>,
    pub trust_forwarded_for: bool,
}

fn default_template() -> String {
    "general".into()
}

/// POST /generate request body
#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub prompt: String,
    #[serde(default = "default_template")]
    pub template: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub prompt: String,
    pub refinement_count: u32,
}

/// POST /refine request body
#[derive(Debug, Deserialize)]
pub struct RefineBody {
    pub prompt: String,
    pub additional_input: String,
    pub refinement_count: u32,
    #[serde(default)]
    pub choice: RefinementChoice,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefineResponse {
    pub refined_prompt: String,
    pub refinement_count: u32,
}

/// POST /test request body
#[derive(Debug, Deserialize)]
pub struct TestBody {
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TestResponse {
    pub response: String,
}

#[cfg(test)]
mod tests;
