//! kvguard Demo Binary
//!
//! Drives an in-memory store through the driver.

use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, EnvFilter};

use kvguard::{AtomicOptions, Directive, Driver, DriverConfig, MemoryStore, WriteOptions};

/// kvguard Demo
#[derive(Parser, Debug)]
#[command(name = "kvguard-demo")]
#[command(about = "Exercise the kvguard driver against an in-memory store")]
#[command(version)]
struct Args {
    /// Driver config file (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Retry temporary errors on wrapped writes
    #[arg(long)]
    retry_temporary_errors: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run concurrent atomic counter increments
    Atomic {
        /// Number of distinct counter keys
        #[arg(short, long, default_value = "4")]
        keys: usize,

        /// Concurrent workers
        #[arg(short, long, default_value = "16")]
        workers: usize,

        /// Increments per worker
        #[arg(short, long, default_value = "50")]
        increments: usize,

        /// Optimistic CAS only (no locking reads)
        #[arg(long)]
        no_lock: bool,

        /// Attempts per atomic call
        #[arg(long)]
        retry_times: Option<u32>,

        /// Delay between atomic attempts in milliseconds
        #[arg(long)]
        retry_interval_ms: Option<u64>,
    },

    /// Run one named write operation
    ///
    /// The store starts with one seeded document, `demo::doc`, so `remove`
    /// and `getAndLock` have something to act on. Any other key is absent.
    Op {
        /// insert, upsert, remove or getAndLock
        operation: String,

        /// Document key
        key: String,

        /// Document body (JSON)
        value: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kvguard=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("kvguard demo v{}", kvguard::VERSION);

    let mut config = match &args.config {
        Some(path) => match DriverConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load config {}: {}", path, e);
                process::exit(1);
            }
        },
        None => DriverConfig::default(),
    };
    if args.retry_temporary_errors {
        config.retry_temporary_errors = true;
    }

    let driver = match Driver::new(MemoryStore::new(), config) {
        Ok(driver) => Arc::new(driver),
        Err(e) => {
            tracing::error!("Failed to create driver: {}", e);
            process::exit(1);
        }
    };

    let outcome = match args.command {
        Commands::Atomic {
            keys,
            workers,
            increments,
            no_lock,
            retry_times,
            retry_interval_ms,
        } => {
            let mut options = AtomicOptions::new();
            if no_lock {
                options = options.atomic_lock(false);
            }
            if let Some(times) = retry_times {
                options = options.atomic_retry_times(times);
            }
            if let Some(ms) = retry_interval_ms {
                options = options.atomic_retry_interval(Duration::from_millis(ms));
            }
            run_counters(driver, keys.max(1), workers, increments, options).await
        }
        Commands::Op {
            operation,
            key,
            value,
        } => run_op(&driver, &operation, &key, value.as_deref()).await,
    };

    if let Err(e) = outcome {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

/// Spawn `workers` tasks that each increment counters `increments` times
async fn run_counters(
    driver: Arc<Driver<MemoryStore>>,
    keys: usize,
    workers: usize,
    increments: usize,
    options: AtomicOptions,
) -> kvguard::Result<()> {
    let succeeded = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let started = Instant::now();

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let driver = Arc::clone(&driver);
        let options = options.clone();
        let succeeded = Arc::clone(&succeeded);
        let failed = Arc::clone(&failed);

        handles.push(tokio::spawn(async move {
            for i in 0..increments {
                let key = format!("counter::{}", (worker + i) % keys);
                let result = driver.atomic_with(&key, increment, &options).await;
                match result {
                    Ok(_) => succeeded.fetch_add(1, Ordering::Relaxed),
                    Err(e) => {
                        tracing::warn!(worker, key = %key, "increment failed: {}", e);
                        failed.fetch_add(1, Ordering::Relaxed)
                    }
                };
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("worker panicked: {}", e);
        }
    }

    let counter_keys: Vec<String> = (0..keys).map(|k| format!("counter::{}", k)).collect();
    let batch = driver.get_multi(&counter_keys).await?;
    let total: u64 = batch
        .documents()
        .filter_map(|doc| doc.value.get("count").and_then(Value::as_u64))
        .sum();

    tracing::info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        succeeded = succeeded.load(Ordering::Relaxed),
        failed = failed.load(Ordering::Relaxed),
        stored_total = total,
        "atomic counters finished"
    );

    if total != succeeded.load(Ordering::Relaxed) as u64 {
        tracing::error!(
            stored_total = total,
            "lost update: stored total does not match successful increments"
        );
        process::exit(2);
    }

    Ok(())
}

/// Document present in the store before an `op` run
const SEEDED_KEY: &str = "demo::doc";

fn increment(current: Option<&Value>) -> Directive {
    let count = current
        .and_then(|doc| doc.get("count"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Directive::upsert(json!({ "count": count + 1 }))
}

async fn run_op(
    driver: &Driver<MemoryStore>,
    operation: &str,
    key: &str,
    value: Option<&str>,
) -> kvguard::Result<()> {
    driver
        .upsert(SEEDED_KEY, &json!({ "seeded": true }), &WriteOptions::new())
        .await?;

    let value: Option<Value> = value.map(serde_json::from_str).transpose()?;
    let output = driver
        .execute(operation, key, value.as_ref(), &WriteOptions::new())
        .await?;

    tracing::info!(operation, key, "result: {:?}", output);
    Ok(())
}
