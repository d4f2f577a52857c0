//! Drive a connection pool with concurrent borrowers and report what it did.
//!
//! ```text
//! cistern-probe --config pool.ini --workers 16 --iterations 200 --hold-ms 5
//! cistern-probe --mock --json
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use cistern_pool::testing::MockConnector;
use cistern_pool::{ConfigSource, Connector, Error, LazyPool, Pool, TcpConnector};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Pool configuration file (`key=value` lines)
    #[arg(short, long, default_value = "pool.ini", env = "CISTERN_CONFIG")]
    config: PathBuf,

    /// Number of concurrent borrowers
    #[arg(short, long, default_value_t = 8)]
    workers: usize,

    /// Checkouts performed by each borrower
    #[arg(short, long, default_value_t = 100)]
    iterations: usize,

    /// Milliseconds each borrower holds its connection
    #[arg(long, default_value_t = 5)]
    hold_ms: u64,

    /// Dial timeout for TCP connections, in milliseconds
    #[arg(long, default_value_t = 1000)]
    dial_timeout_ms: u64,

    /// Use in-memory connections instead of dialing the configured endpoint
    #[arg(long)]
    mock: bool,

    /// Print the final statistics as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Default)]
struct Tally {
    checkouts: u64,
    timeouts: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let source = ConfigSource::File(args.config.clone());

    if args.mock {
        run(LazyPool::new(source, MockConnector::new()), &args).await
    } else {
        let connector =
            TcpConnector::new().with_connect_timeout(Duration::from_millis(args.dial_timeout_ms));
        run(LazyPool::new(source, connector), &args).await
    }
}

async fn run<C: Connector>(lazy: LazyPool<C>, args: &Args) -> Result<()> {
    let pool = lazy
        .get()
        .await
        .with_context(|| format!("building pool from {}", args.config.display()))?
        .clone();
    info!(
        endpoint = %pool.config().endpoint,
        initial_size = pool.config().initial_size,
        max_size = pool.config().max_size,
        workers = args.workers,
        iterations = args.iterations,
        "probe started"
    );

    let started = Instant::now();
    let tally = tokio::select! {
        tally = drive(&pool, args) => tally?,
        _ = signal::ctrl_c() => {
            warn!("interrupted, shutting down");
            Tally::default()
        }
    };
    let elapsed = started.elapsed();

    let stats = pool.stats();
    lazy.shutdown().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        info!(
            checkouts = tally.checkouts,
            timeouts = tally.timeouts,
            elapsed_ms = elapsed.as_millis() as u64,
            live = stats.live,
            created = stats.created,
            destroyed = stats.destroyed,
            connect_failures = stats.connect_failures,
            "probe finished"
        );
    }
    stats
        .check()
        .context("pool bookkeeping is inconsistent")?;
    Ok(())
}

async fn drive<C: Connector>(pool: &Pool<C>, args: &Args) -> Result<Tally> {
    let hold = Duration::from_millis(args.hold_ms);
    let iterations = args.iterations;

    let workers: Vec<_> = (0..args.workers)
        .map(|worker| {
            let pool = pool.clone();
            tokio::spawn(async move { borrow_loop(pool, worker, iterations, hold).await })
        })
        .collect();

    let mut total = Tally::default();
    for worker in workers {
        let tally = worker.await.context("borrower task panicked")??;
        total.checkouts += tally.checkouts;
        total.timeouts += tally.timeouts;
    }
    Ok(total)
}

async fn borrow_loop<C: Connector>(
    pool: Pool<C>,
    worker: usize,
    iterations: usize,
    hold: Duration,
) -> Result<Tally> {
    let mut tally = Tally::default();
    for _ in 0..iterations {
        match pool.acquire().await {
            Ok(conn) => {
                tokio::time::sleep(hold).await;
                drop(conn);
                tally.checkouts += 1;
            }
            Err(error @ Error::AcquireTimeout { .. }) => {
                tracing::debug!(worker, %error, "checkout timed out");
                tally.timeouts += 1;
            }
            Err(error) => return Err(error).with_context(|| format!("worker {worker}")),
        }
    }
    Ok(tally)
}
