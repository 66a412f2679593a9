use super::handlers::{
    handle_generate, handle_health, handle_refine, handle_root, handle_templates, handle_test,
    handle_usage,
};
use super::{AppState, MAX_BODY_SIZE};

use crate::config::Config;
use crate::llm::{GeminiProvider, PromptGenerator, Provider};
use crate::prompt::{RefinementStateMachine, TemplateLibrary};
use crate::usage::{RateLimiter, SqliteUsageLedger};
use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Returns true when the bind address is not a loopback address.
fn is_public_bind(host: &str) -> bool {
    !matches!(
        host,
        "127.0.0.1" | "localhost" | "::1" | "[::1]" | "0:0:0:0:0:0:0:1"
    )
}

/// Run the HTTP gateway on `host:port`.
pub async fn run_gateway(host: &str, port: u16, config: Arc<Config>) -> Result<()> {
    if is_public_bind(host) && !config.gateway.allow_public_bind {
        anyhow::bail!(
            "Refusing to bind to {host}: the quota is keyed on client IP and the service would \
             be reachable from other machines.\n\
             Fix: use --host 127.0.0.1 (default), or set\n\
             [gateway] allow_public_bind = true in config.toml."
        );
    }

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("parse gateway bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind gateway socket")?;

    run_gateway_with_listener(host, listener, config).await
}

/// Build the model client, ledger and state machine shared by every request.
async fn build_gateway_state(config: &Config) -> Result<(AppState, Arc<SqliteUsageLedger>)> {
    let mut gemini =
        GeminiProvider::new(config.api_key.as_deref(), config.generator.timeout_secs);
    if let Some(base_url) = config.generator.base_url.as_deref() {
        gemini = gemini.with_base_url(base_url);
    }
    let provider: Arc<dyn Provider> = Arc::new(gemini);

    let ledger_path = config.ledger_path();
    let ledger = Arc::new(
        SqliteUsageLedger::open(&ledger_path)
            .await
            .with_context(|| format!("open usage ledger at {}", ledger_path.display()))?,
    );

    let templates = Arc::new(TemplateLibrary::new().context("compile prompt templates")?);
    let generator = PromptGenerator::new(
        provider,
        config.generator.model.clone(),
        config.generator.temperature,
    );
    let machine = RefinementStateMachine::new(generator, templates)
        .with_output_cleaning(config.generator.clean_output);

    let state = AppState {
        limiter: Arc::new(RateLimiter::new(ledger.clone())),
        machine: Arc::new(machine),
        trust_forwarded_for: config.gateway.trust_forwarded_for,
    };
    Ok((state, ledger))
}

/// Run the HTTP gateway from a pre-bound listener until Ctrl-C or SIGTERM.
pub async fn run_gateway_with_listener(
    host: &str,
    listener: tokio::net::TcpListener,
    config: Arc<Config>,
) -> Result<()> {
    let actual_port = listener
        .local_addr()
        .context("get gateway listener local address")?
        .port();
    let display_addr = format!("{host}:{actual_port}");

    let (state, ledger) = build_gateway_state(&config).await?;
    print_gateway_banner(&display_addr, &config);

    let app = build_app(
        state,
        &config.gateway.cors_origins,
        Duration::from_secs(config.gateway.request_timeout_secs),
    );
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serve HTTP gateway");

    ledger.close().await;
    tracing::info!("gateway stopped, usage ledger closed");
    served
}

fn print_gateway_banner(display_addr: &str, config: &Config) {
    println!("Prompt Enhancer listening on {display_addr}");
    println!("  POST /generate");
    println!("  POST /refine");
    println!("  POST /test");
    println!("  GET  /templates");
    println!("  GET  /usage");
    println!("  GET  /health");
    println!("  (all routes also under /api)");
    println!("  Model: {}", config.generator.model);
    if config.gateway.trust_forwarded_for {
        println!("  Quota keyed on X-Forwarded-For");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to listen for SIGTERM: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/templates", get(handle_templates))
        .route("/usage", get(handle_usage))
        .route("/generate", post(handle_generate))
        .route("/refine", post(handle_refine))
        .route("/test", post(handle_test))
}

/// Assemble the router: routes at the root and under `/api`, then the body
/// limit, timeout and CORS layers.
pub fn build_app(state: AppState, cors_origins: &[String], request_timeout: Duration) -> Router {
    let mut app = routes()
        .nest("/api", routes())
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ));

    if !cors_origins.is_empty() {
        let origins: Vec<HeaderValue> = cors_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                // Credentialed CORS cannot use a wildcard; tower-http panics on one.
                Ok(_) if origin.trim() == "*" => {
                    tracing::warn!("ignoring wildcard CORS origin");
                    None
                }
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                .allow_credentials(true),
        );
    }

    app
}
