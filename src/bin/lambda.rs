//! AWS Lambda entry point for Watchbot
//!
//! Deploy with `cargo lambda build --release --features lambda` and trigger
//! on a schedule (e.g. an EventBridge rule). Each invocation runs one cycle.

use lambda_runtime::{Error as LambdaError, LambdaEvent, service_fn};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use watchbot::{
    delivery::DeliveryEngine,
    error::Result,
    ledger::Ledger,
    models::Config,
    notify::TelegramChannel,
    pipeline::{CycleReport, Watcher},
    services::ClassifiedsScraper,
    storage::{LedgerStore, LocalStore, S3Store},
};

/// Optional invocation payload.
#[derive(Debug, Default, Deserialize)]
struct CheckRequest {
    #[serde(default)]
    dry_run: bool,
}

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> std::result::Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Watchbot Lambda starting...");
    lambda_runtime::run(service_fn(handler)).await
}

/// Handler for AWS Lambda events.
#[instrument(skip(event))]
async fn handler(event: LambdaEvent<Value>) -> std::result::Result<Value, LambdaError> {
    let request: CheckRequest = serde_json::from_value(event.payload).unwrap_or_default();

    match run_check(request.dry_run).await {
        Ok((report, stats)) => {
            info!("Check complete: {} new, {} recorded", report.new_items, report.committed);
            Ok(serde_json::json!({
                "status": "success",
                "message": format!("Processed {} new items", report.new_items),
                "stats": stats,
                "cycle": report,
            }))
        }
        Err(e) => {
            error!("Check failed: {}", e);
            Ok(serde_json::json!({ "status": "error", "message": e.to_string() }))
        }
    }
}

async fn open_store(config: &Config) -> Result<Box<dyn LedgerStore>> {
    if std::env::var("S3_BUCKET").is_ok() {
        Ok(Box::new(S3Store::from_env().await?))
    } else {
        Ok(Box::new(LocalStore::new(&config.ledger.path)))
    }
}

async fn run_check(dry_run: bool) -> Result<(CycleReport, Value)> {
    let mut config = Config::default();
    config.apply_env();
    config.validate()?;

    let source = ClassifiedsScraper::new(&config.source)?;
    let channel = TelegramChannel::new(&config.telegram)?;
    let engine = DeliveryEngine::new(Box::new(channel), &config.delivery);
    let ledger = Ledger::load(open_store(&config).await?).await;

    let mut watcher = Watcher::new(Box::new(source), engine, ledger, &config, dry_run);
    if !watcher.test_connection().await {
        return Err(watchbot::error::AppError::config(
            "Telegram connection check failed",
        ));
    }

    let report = watcher.run_cycle().await;
    let stats = serde_json::to_value(watcher.stats().await)?;
    Ok((report, stats))
}
