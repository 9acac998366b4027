use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod batch;
mod config;
mod download;
mod folder;
mod input;
mod lease;
mod ledger;
mod process;
mod report;
mod shutdown;

use batch::BatchRunner;
use config::{PollArgs, RunArgs};
use lease::{Lease, LeaseClient};
use ledger::Ledger;
use report::ItemOutcome;

#[derive(Parser)]
#[command(name = "batch-worker")]
#[command(about = "Download and process a list of videos one at a time, with leased cookies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Cookie coordinator base URL; without it a static cookie file is used
    #[arg(long, env = "COOKIE_SERVER_URL", global = true)]
    coordinator_url: Option<String>,

    /// Timeout for each coordinator request, in seconds
    #[arg(long, default_value_t = 30, global = true)]
    request_timeout_secs: u64,

    /// Log filter (env-filter syntax)
    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    log: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every row of the input that is not in the ledger yet
    Run(RunArgs),
    /// Lease one cookie and print its name
    Acquire {
        #[command(flatten)]
        poll: PollArgs,
    },
    /// Return a cookie to the coordinator
    Release {
        /// Cookie name as printed by `acquire` or the batch log
        cookie_file: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log))
        .init();

    let cancel = CancellationToken::new();
    tokio::spawn(watch_interrupts(tokio::signal::ctrl_c, cancel.clone()));

    let client = match &cli.coordinator_url {
        Some(url) => Some(LeaseClient::new(
            url,
            Duration::from_secs(cli.request_timeout_secs),
        )?),
        None => None,
    };

    match cli.command {
        Commands::Run(args) => {
            run_batch(args, client, cancel).await?;
        }
        Commands::Acquire { poll } => {
            let client = client.context("--coordinator-url or COOKIE_SERVER_URL is required")?;
            let lease = client.acquire(&poll.policy(), &cancel).await?;
            println!("{}", lease.resource_id());
        }
        Commands::Release { cookie_file } => {
            let client = client.context("--coordinator-url or COOKIE_SERVER_URL is required")?;
            client.release(Lease::from_resource_id(cookie_file)).await;
        }
    }

    Ok(())
}

/// The first interrupt cancels `cancel`; a second one exits immediately,
/// since the current step (e.g. a hung script) may never finish.
async fn watch_interrupts<S, F>(mut next_interrupt: S, cancel: CancellationToken)
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if next_interrupt().await.is_err() {
        return;
    }
    warn!("Interrupt received, stopping after the current step (Ctrl-C again to exit now)");
    cancel.cancel();

    if next_interrupt().await.is_ok() {
        error!("Second interrupt, exiting");
        std::process::exit(130);
    }
}

async fn run_batch(
    args: RunArgs,
    client: Option<LeaseClient>,
    cancel: CancellationToken,
) -> Result<()> {
    let items = input::read_work_items(&args.input, &args.input_format())?;
    info!("Loaded {} rows from {}", items.len(), args.input.display());

    let ledger = Ledger::load(&args.ledger).await?;
    tokio::fs::create_dir_all(&args.work_dir)
        .await
        .with_context(|| format!("Failed to create {}", args.work_dir.display()))?;

    match &client {
        Some(client) => info!("Leasing cookies from {}", client.base_url()),
        None => info!("Using static cookie file {}", args.cookies.display()),
    }

    let mut runner = BatchRunner::new(
        args.pipeline(),
        ledger,
        args.cookie_source(client),
        args.work_dir.clone(),
        cancel,
    );
    let report = runner.run(items).await;

    for item in report.failures() {
        if let ItemOutcome::Failed { reason } = &item.outcome {
            warn!("Row {} ({}) not finished: {}", item.row, item.key, reason);
        }
    }

    if let Some(path) = &args.report {
        match report.write_json(path).await {
            Ok(()) => info!("Report written to {}", path.display()),
            Err(e) => error!("{:#}", e),
        }
    }

    if args.shutdown {
        if report.interrupted {
            warn!("Batch was interrupted, not shutting down");
        } else {
            shutdown::shutdown_host(&args.shutdown_command).await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    #[tokio::test]
    async fn test_first_interrupt_cancels_and_keeps_listening() {
        let (tx, rx) = mpsc::unbounded_channel::<()>();
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let watcher = tokio::spawn(watch_interrupts(
            move || {
                let rx = rx.clone();
                async move {
                    rx.lock()
                        .await
                        .recv()
                        .await
                        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "closed"))
                }
            },
            cancel.clone(),
        ));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), cancel.cancelled())
            .await
            .expect("first interrupt should cancel");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!watcher.is_finished(), "watcher stopped listening after one interrupt");

        // A closed signal stream ends the watcher without exiting.
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), watcher)
            .await
            .unwrap()
            .unwrap();
    }
}
