//! Watchbot CLI
//!
//! Local execution entry point. For AWS Lambda, use `watchbot-lambda`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use watchbot::{
    delivery::DeliveryEngine,
    error::{AppError, Result},
    ledger::Ledger,
    models::Config,
    notify::TelegramChannel,
    pipeline::{self, Shutdown, Watcher},
    services::ClassifiedsScraper,
    storage::LocalStore,
};

const DEFAULT_CONFIG: &str = "watchbot.toml";

/// Watchbot - classifieds keyword watcher
#[derive(Parser, Debug)]
#[command(
    name = "watchbot",
    version,
    about = "Forwards new classifieds listings matching keywords to Telegram"
)]
struct Cli {
    /// Path to the TOML config file (default: ./watchbot.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log messages instead of sending them, and record nothing
    #[arg(long, global = true)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check periodically until interrupted
    Run,

    /// Run a single check and exit
    Once,

    /// Verify the bot token and chat, exit 0 on success
    TestConnection,

    /// Show ledger statistics
    Stats,

    /// Forget every recorded item
    Reset,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Load the config file, then apply environment overrides.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let config = Config::load(path)?;
            log::info!("Loaded configuration from {}", path.display());
            config
        }
        None if Path::new(DEFAULT_CONFIG).exists() => Config::load_or_default(DEFAULT_CONFIG),
        None => Config::default(),
    };
    config.apply_env();
    Ok(config)
}

async fn build_watcher(config: &Config, dry_run: bool) -> Result<Watcher> {
    let source = ClassifiedsScraper::new(&config.source)?;
    let channel = TelegramChannel::new(&config.telegram)?;
    let engine = DeliveryEngine::new(Box::new(channel), &config.delivery);
    let ledger = Ledger::load(Box::new(LocalStore::new(&config.ledger.path))).await;
    Ok(Watcher::new(
        Box::new(source),
        engine,
        ledger,
        config,
        dry_run,
    ))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Stats => {
            let ledger = Ledger::load(Box::new(LocalStore::new(&config.ledger.path))).await;
            let stats = ledger.stats().await;
            println!("Total sent:      {}", stats.total_marked);
            println!("Sent last 24h:   {}", stats.marked_last_24h);
            println!("State file:      {}", stats.location);
            println!("File exists:     {}", stats.backing_store_exists);
            return Ok(ExitCode::SUCCESS);
        }
        Command::Reset => {
            let mut ledger = Ledger::load(Box::new(LocalStore::new(&config.ledger.path))).await;
            ledger.reset().await?;
            log::info!("State reset");
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    config.validate()?;
    let mut watcher = build_watcher(&config, cli.dry_run).await?;

    if !watcher.test_connection().await {
        log::error!("Cannot reach Telegram with the configured token and chat");
        return Ok(ExitCode::FAILURE);
    }

    match cli.command {
        Command::TestConnection => {
            log::info!("Connection OK");
        }
        Command::Once => {
            let report = watcher.run_cycle().await;
            if let Some(error) = report.error {
                log::warn!("Check finished with error: {}", error);
            }
        }
        Command::Run => {
            let shutdown = Shutdown::new();
            shutdown.listen_for_signals();
            let period = config
                .schedule
                .period()
                .ok_or_else(|| AppError::config("schedule.interval_minutes is out of range"))?;
            pipeline::run_scheduled(&mut watcher, period, &shutdown).await;
        }
        Command::Stats | Command::Reset => {}
    }

    Ok(ExitCode::SUCCESS)
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env: {e}");
        }
    }

    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Watchbot starting...");

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
