use anyhow::Context;
use clap::Parser;
use tally_bot::{Bot, BotConfig, Cli, TelegramClient};
use tally_llm::{GeminiProvider, PromptLibrary};
use tally_pipeline::Pipeline;
use tally_store::SqliteStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load .env before clap reads env-backed arguments
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = BotConfig::load(&cli).context("Failed to load configuration")?;

    let store = SqliteStore::new(&config.database_path)
        .with_context(|| format!("Failed to open ledger at {}", config.database_path))?;
    info!("Ledger opened at {}", config.database_path);

    let prompts = match &config.templates_dir {
        Some(dir) => {
            info!("Loading prompt templates from {}", dir.display());
            PromptLibrary::with_dir(dir).context("Failed to load prompt templates")?
        }
        None => PromptLibrary::builtin(),
    };

    let provider = GeminiProvider::new(config.gemini_api_key.clone(), prompts);
    let pipeline = Pipeline::new(provider, store, config.bindings.clone());
    let telegram = TelegramClient::new(config.bot_token.clone());

    info!("Bot started with {} field bindings", config.bindings.len());
    Bot::new(telegram, pipeline, config.poll_timeout_secs).run().await?;
    Ok(())
}
