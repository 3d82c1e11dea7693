use anthranks::config::Config;
use anthranks::discord::DiscordHttp;
use anthranks::{sheets, Bot};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "anthranks")]
#[command(about = "Discord bot collecting dinosaur ratings into Google Sheets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "anthranks.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot
    Run,
    /// Validate configuration and connectivity, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config))?;

    init_logging(&config.logging.level)?;

    config.validate()
        .with_context(|| "Configuration validation failed")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bot(config).await,
        Commands::Check => check_config(config).await,
    }
}

async fn run_bot(config: Config) -> Result<()> {
    tracing::info!("Starting anthranks v{}", env!("CARGO_PKG_VERSION"));

    let mut bot = Bot::new(config).await
        .with_context(|| "Failed to create bot")?;

    bot.start().await
        .with_context(|| "Failed to start bot")?;

    wait_for_shutdown().await?;

    tracing::info!("Received shutdown signal, stopping bot...");
    bot.shutdown().await
        .with_context(|| "Failed to shutdown bot")?;

    Ok(())
}

async fn check_config(config: Config) -> Result<()> {
    println!("Checking configuration...");
    println!("✓ Configuration is valid");

    let sheets = sheets::connect(&config.sheets).await
        .with_context(|| "Failed to connect to Google Sheets")?;
    println!("✓ Authenticated with Google, spreadsheet {}", sheets.spreadsheet_id());

    let bot = Bot::from_parts(config.clone(), Arc::new(sheets))?;
    bot.state().prepare_store().await?;
    println!("✓ Votes and Metadata tables are in place");

    let token = config.discord.token.clone().unwrap_or_default();
    let http = DiscordHttp::new(&config.discord.api_base, token)?;
    match http.current_user().await {
        Ok(user) => println!("✓ Discord token belongs to {} ({})", user.username, user.id),
        Err(e) => {
            println!("⚠ Discord token check failed: {}", e);
            println!("  (The bot will not be able to log in)");
        }
    }

    println!("\nConfiguration check completed successfully!");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .context("Failed to install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        },
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        },
    }

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        _ => tracing::Level::INFO,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter.to_string()))
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .compact()
        )
        .init();

    Ok(())
}
