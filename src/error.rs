use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for the prompt enhancer.
///
/// The first two variants are policy outcomes the caller is expected to act
/// on (wait for the window to roll, or start a new prompt). The remaining
/// variants are dependency or input failures. The gateway maps each variant
/// to its own status code; nothing in the core retries.
#[derive(Debug, Error)]
pub enum EnhancerError {
    // ── Quota ───────────────────────────────────────────────────────────
    #[error("Daily limit of {limit} calls reached. Try again tomorrow.")]
    QuotaExceeded { limit: u32 },

    // ── Refinement lifecycle ────────────────────────────────────────────
    #[error("Maximum refinements ({max}) reached")]
    RefinementBoundExceeded { max: u32 },

    // ── Generative model ────────────────────────────────────────────────
    #[error("generator: {0}")]
    Generator(#[from] GeneratorError),

    // ── Usage ledger ────────────────────────────────────────────────────
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    // ── Prompt / Template ───────────────────────────────────────────────
    #[error("prompt: {0}")]
    Prompt(#[from] PromptError),

    // ── Config ──────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Request validation ──────────────────────────────────────────────
    #[error("{0}")]
    InvalidRequest(String),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Generator errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("provider {provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("provider {provider} returned an empty response")]
    EmptyResponse { provider: String },
}

// ─── Storage errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlx: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt call record: {0}")]
    Corrupt(String),
}

// ─── Prompt / Template errors ───────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("template render failed: {0}")]
    Render(String),

    #[error("template not registered: {0}")]
    NotFound(String),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, EnhancerError>;
