//! Configuration for the bot process.
//!
//! Credentials and paths come from the command line or the environment
//! (a `.env` file is loaded first). An optional TOML file can override field
//! bindings and polling settings.

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tally_domain::FieldBindings;
use thiserror::Error;

/// Default ledger location
pub const DEFAULT_DATABASE: &str = "spends.db";

/// Default prompt template directory, used when it exists
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";

/// Default long-poll timeout in seconds
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 10;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Missing required field
    #[error("Missing required configuration field: {0}")]
    MissingField(String),
}

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "tally-bot", version, about = "Turns receipt messages into ledger entries")]
pub struct Cli {
    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Ledger database (path or `file:` URL)
    #[arg(long = "database", env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Prompt template directory
    #[arg(long, env = "TALLY_TEMPLATES")]
    pub templates: Option<PathBuf>,

    /// TOML file with binding and polling overrides
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Optional settings file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    /// Database path or URL
    pub database_url: Option<String>,

    /// Prompt template directory
    pub templates: Option<PathBuf>,

    /// Long-poll timeout in seconds
    pub poll_timeout_secs: Option<u64>,

    /// Per-field binding overrides, merged over the defaults
    pub bindings: Option<FieldBindings>,
}

impl FileConfig {
    /// Load settings from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// Resolved bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot token
    pub bot_token: String,

    /// Gemini API key
    pub gemini_api_key: String,

    /// SQLite database path
    pub database_path: String,

    /// Prompt template directory, if any
    pub templates_dir: Option<PathBuf>,

    /// Long-poll timeout in seconds
    pub poll_timeout_secs: u64,

    /// Field bindings for extraction
    pub bindings: FieldBindings,
}

impl BotConfig {
    /// Resolve configuration: command line and environment first, then the
    /// settings file, then defaults
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(cli, file)
    }

    fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let bot_token = required(&cli.bot_token, "TELEGRAM_BOT_TOKEN")?;
        let gemini_api_key = required(&cli.gemini_api_key, "GEMINI_API_KEY")?;

        let database_url = cli
            .database_url
            .clone()
            .or(file.database_url)
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let templates_dir = cli.templates.clone().or(file.templates).or_else(|| {
            let default = PathBuf::from(DEFAULT_TEMPLATES_DIR);
            default.is_dir().then_some(default)
        });

        let bindings = match file.bindings {
            Some(overrides) => FieldBindings::default().merge(overrides),
            None => FieldBindings::default(),
        };

        Ok(Self {
            bot_token,
            gemini_api_key,
            database_path: database_path(&database_url),
            templates_dir,
            poll_timeout_secs: file.poll_timeout_secs.unwrap_or(DEFAULT_POLL_TIMEOUT_SECS),
            bindings,
        })
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::MissingField(name.to_string())),
    }
}

/// Accepts plain paths and `file:<path>?<options>` URLs
pub fn database_path(url: &str) -> String {
    let path = url.strip_prefix("file:").unwrap_or(url);
    let path = path.split_once('?').map(|(p, _)| p).unwrap_or(path);
    if path.is_empty() {
        DEFAULT_DATABASE.to_string()
    } else {
        path.to_string()
    }
}
