use crate::config::Config;
use crate::usage::{DAILY_CALL_LIMIT, QUOTA_WINDOW_HOURS};

pub fn render_status(config: &Config) -> String {
    let api_key = if config.api_key.is_some() {
        "set (config)"
    } else if std::env::var("GEMINI_API_KEY").is_ok() || std::env::var("GOOGLE_API_KEY").is_ok() {
        "set (env)"
    } else {
        "missing"
    };

    let cors = if config.gateway.cors_origins.is_empty() {
        "(disabled)".to_string()
    } else {
        config.gateway.cors_origins.join(", ")
    };

    let lines = [
        "Prompt Enhancer status".to_string(),
        String::new(),
        format!("Version       {}", env!("CARGO_PKG_VERSION")),
        format!("Config        {}", config.config_path.display()),
        format!("Ledger        {}", config.ledger_path().display()),
        String::new(),
        format!(
            "Gateway       {}:{}",
            config.gateway.host, config.gateway.port
        ),
        format!("CORS          {cors}"),
        format!(
            "Client key    {}",
            if config.gateway.trust_forwarded_for {
                "X-Forwarded-For"
            } else {
                "peer IP"
            }
        ),
        format!("Timeout       {}s", config.gateway.request_timeout_secs),
        String::new(),
        format!("Model         {}", config.generator.model),
        format!("Temperature   {}", config.generator.temperature),
        format!("API key       {api_key}"),
        format!(
            "Quota         {DAILY_CALL_LIMIT} calls / {QUOTA_WINDOW_HOURS}h per client"
        ),
    ];
    lines.join("\n")
}
