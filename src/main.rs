//! Link Prober Binary

use clap::{Parser, Subcommand};
use link_prober::{Config, ProberError, Result, ScanSession, ScanSummary, load_url_list, serve};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{self, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "link-prober", version)]
#[command(about = "Checks whether URLs are reachable without downloading them.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe URLs and print one JSON verdict per line
    Check {
        #[arg(value_name = "URL")]
        urls: Vec<String>,
        /// File with one URL per line
        #[arg(long, value_name = "PATH")]
        file: Option<PathBuf>,
        /// Probe invocations per URL
        #[arg(long, value_name = "N", env = "PROBE_MAX_RETRIES")]
        retries: Option<u32>,
        /// Probes in flight at once
        #[arg(long, value_name = "N", env = "SCAN_CONCURRENCY")]
        concurrency: Option<usize>,
    },
    /// Answer JSON-line messages on stdin/stdout
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    initialize_tracing();

    let cli = Cli::parse();
    let mut config = Config::from_env();

    if let Commands::Check {
        retries, concurrency, ..
    } = &cli.command
    {
        if let Some(retries) = retries {
            config.max_retries = *retries;
        }
        if let Some(concurrency) = concurrency {
            config.scan_concurrency = *concurrency;
        }
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    info!(
        "Link prober v{} - timeout {}ms ({}..{}ms), retries {}, concurrency {}",
        env!("CARGO_PKG_VERSION"),
        config.base_timeout.as_millis(),
        config.min_timeout.as_millis(),
        config.max_timeout.as_millis(),
        config.max_retries,
        config.scan_concurrency
    );

    let session = Arc::new(ScanSession::new(&config)?);

    match cli.command {
        Commands::Check { urls, file, .. } => run_check(session, urls, file).await,
        Commands::Serve => run_serve(session).await,
    }
}

async fn run_check(session: Arc<ScanSession>, mut urls: Vec<String>, file: Option<PathBuf>) -> Result<()> {
    if let Some(path) = file {
        urls.extend(load_url_list(&path).await?);
    }
    if urls.is_empty() {
        return Err(ProberError::Config("no URLs given".to_string()));
    }

    spawn_interrupt_handler(Arc::clone(&session));

    let results = session.scan_all(&urls).await;
    let mut stdout = io::stdout();
    for (url, verdict) in &results {
        let mut line = serde_json::to_string(&serde_json::json!({ "url": url, "verdict": verdict }))?;
        line.push('\n');
        stdout.write_all(line.as_bytes()).await?;
    }
    stdout.flush().await?;

    let summary = ScanSummary::from_verdicts(results.iter().map(|(_, verdict)| verdict));
    info!(
        total = summary.total,
        valid = summary.valid,
        invalid = summary.invalid,
        advisory = summary.advisory,
        "Scan complete"
    );
    eprintln!("{}", serde_json::to_string(&summary)?);

    Ok(())
}

async fn run_serve(session: Arc<ScanSession>) -> Result<()> {
    spawn_interrupt_handler(Arc::clone(&session));

    info!("Serving probe requests on stdin");
    serve(BufReader::new(io::stdin()), io::stdout(), session).await
}

/// Ctrl-C cancels everything in flight; the pending verdicts still get reported.
fn spawn_interrupt_handler(session: Arc<ScanSession>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let cancelled = session.cancel_all();
                warn!("Interrupted, cancelled {} in-flight probes", cancelled);
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
}

/// Initialize structured logging
fn initialize_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
