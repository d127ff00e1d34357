//! Sweep runner: drives a bulk keyword or alt-text sweep to completion.
//!
//! Usage:
//!   langsweep keywords            # Run (or resume) the keyword sweep
//!   langsweep alt                 # Run (or resume) the alt-text sweep
//!   langsweep <kind> --status     # Print the job status as JSON
//!   langsweep <kind> --stop       # Ask a running sweep to stop
//!   langsweep <kind> --reset      # Clear the job state and lock
//!
//! Ctrl-C requests a stop; the sweep ends after the current document.

use anyhow::{Context, Result};
use langsweep::bulk::{BulkJobController, JobKind, StepStatus};
use langsweep::config::Config;
use langsweep::db::Database;
use langsweep::documents::{DirectoryDocuments, DocumentStore};
use langsweep::generate::{AltTextGenerator, GenerationSettings, GeneratorContext, KeywordGenerator};
use langsweep::openai::ChatClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Consecutive failed steps after which the runner gives up.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

enum Command {
    Run,
    Status,
    Stop,
    Reset,
}

fn print_usage() {
    println!("Usage: langsweep <keywords|alt> [--status | --stop | --reset]");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when the variables come from the environment)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("langsweep=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_usage();
        return Ok(());
    }

    let kind: JobKind = args[1].parse()?;
    let command = match args.get(2).map(String::as_str) {
        None => Command::Run,
        Some("--status") => Command::Status,
        Some("--stop") => Command::Stop,
        Some("--reset") => Command::Reset,
        Some(other) => {
            print_usage();
            anyhow::bail!("Unknown option: {}", other);
        }
    };

    // Status, stop and reset only touch the job store
    let config = Config::from_env()?;
    let db = Database::new(&config.database_path)?;
    let documents: Arc<dyn DocumentStore> = Arc::new(DirectoryDocuments::new(&config.documents_dir));
    let controller = BulkJobController::new(db.clone(), documents.clone(), config.controller_config());

    match command {
        Command::Status => {
            let status = controller.status(kind)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("Failed to serialize status")?
            );
        }
        Command::Stop => {
            let ack = controller.request_stop(kind);
            info!("Stop requested for {} sweep (success: {})", kind, ack.success);
        }
        Command::Reset => {
            controller.reset(kind)?;
            info!("{} sweep state cleared", kind);
        }
        Command::Run => {
            let ctx = GeneratorContext::new(
                documents,
                db,
                ChatClient::from_config(&config)?,
                GenerationSettings::from_config(&config),
            );
            let controller = Arc::new(
                controller
                    .with_callback(JobKind::Keywords, KeywordGenerator::new(ctx.clone()))
                    .with_callback(JobKind::AltText, AltTextGenerator::new(ctx)),
            );
            run_sweep(controller, kind, config.poll_interval).await?;
        }
    }

    Ok(())
}

async fn run_sweep(
    controller: Arc<BulkJobController<Database, Arc<dyn DocumentStore>>>,
    kind: JobKind,
    poll_interval: Duration,
) -> Result<()> {
    let stopper = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current document");
            stopper.request_stop(kind);
        }
    });

    info!("Starting {} sweep", kind);
    let mut consecutive_failures = 0;
    loop {
        let report = controller.step(kind).await;
        info!("[{}%] {}", report.percentage, report.message);

        if report.status == StepStatus::Failed {
            consecutive_failures += 1;
            if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                anyhow::bail!(
                    "{} sweep aborted after {} consecutive failures: {}",
                    kind,
                    consecutive_failures,
                    report.message
                );
            }
        } else {
            consecutive_failures = 0;
        }

        if report.is_terminal() {
            info!("{} sweep finished: {}", kind, report.message);
            return Ok(());
        }
        tokio::time::sleep(poll_interval).await;
    }
}
