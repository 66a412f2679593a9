use crate::error::ConfigError;
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_DIR_NAME: &str = ".prompt-enhancer";
const CONFIG_FILE_NAME: &str = "config.toml";
const LEDGER_FILE_NAME: &str = "usage.db";

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding config.toml and the default ledger - not serialized
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Gemini API key. `GEMINI_API_KEY` fills it when absent.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,
}

// ── Gateway ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Gateway port (default: 8000)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Allow binding to a non-loopback address (default: false)
    #[serde(default)]
    pub allow_public_bind: bool,
    /// Browser origins allowed to call the API with credentials
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    /// Key quota on the first `X-Forwarded-For` hop instead of the peer IP
    #[serde(default)]
    pub trust_forwarded_for: bool,
    /// Whole-request deadline, model call included
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://127.0.0.1:5500".into()]
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            allow_public_bind: false,
            cors_origins: default_cors_origins(),
            trust_forwarded_for: false,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ── Generator ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Override for the Gemini API root (proxies, tests)
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,
    /// Strip "Here's the refined prompt" style preambles from model output
    #[serde(default = "default_true")]
    pub clean_output: bool,
}

fn default_model() -> String {
    "gemini-2.0-flash".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_generator_timeout_secs() -> u64 {
    60
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            base_url: None,
            timeout_secs: default_generator_timeout_secs(),
            clean_output: true,
        }
    }
}

// ── Usage ledger ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// SQLite file. Defaults to `usage.db` next to config.toml.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ── Config impl ──────────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    UserDirs::new()
        .map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf())
        .join(CONFIG_DIR_NAME)
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            config_path: data_dir.join(CONFIG_FILE_NAME),
            data_dir,
            api_key: None,
            gateway: GatewayConfig::default(),
            generator: GeneratorConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        Self::load_or_init_in(&home.join(CONFIG_DIR_NAME))
    }

    /// Load `config.toml` from `data_dir`, writing defaults on first run.
    pub fn load_or_init_in(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE_NAME);

        if !data_dir.exists() {
            fs::create_dir_all(data_dir).context("Failed to create .prompt-enhancer directory")?;
        }

        let config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path.clone_from(&config_path);
            config.data_dir = data_dir.to_path_buf();
            config
        } else {
            let config = Self {
                config_path,
                data_dir: data_dir.to_path_buf(),
                ..Self::default()
            };
            config.save()?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|name| std::env::var(name).ok());
    }

    pub fn apply_env_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        // API key: config value wins, GEMINI_API_KEY fills the gap
        if self.api_key.is_none() {
            if let Some(key) = non_empty("GEMINI_API_KEY") {
                self.api_key = Some(key);
            }
        }

        if let Some(host) = non_empty("PROMPT_ENHANCER_HOST") {
            self.gateway.host = host;
        }

        if let Some(port) = non_empty("PROMPT_ENHANCER_PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!(value = %port, "ignoring invalid PROMPT_ENHANCER_PORT"),
            }
        }

        if let Some(model) = non_empty("PROMPT_ENHANCER_MODEL") {
            self.generator.model = model;
        }

        if let Some(db) = non_empty("PROMPT_ENHANCER_DB") {
            self.ledger.path = Some(PathBuf::from(db));
        }
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.generator.temperature) {
            return Err(ConfigError::Validation(format!(
                "generator.temperature must be within 0.0..=2.0, got {}",
                self.generator.temperature
            )));
        }
        if self.generator.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "generator.model must not be empty".into(),
            ));
        }
        if self.generator.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "generator.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.gateway.cors_origins.iter().any(|origin| origin.trim() == "*") {
            return Err(ConfigError::Validation(
                "gateway.cors_origins must list explicit origins, not \"*\"".into(),
            ));
        }
        if self.gateway.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "gateway.request_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Resolved SQLite path for the usage ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(LEDGER_FILE_NAME))
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }
}
