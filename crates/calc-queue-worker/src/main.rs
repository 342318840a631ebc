use calc_queue_worker::{TaskHandlerRegistry, Worker, WorkerConfig};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cq-worker")]
#[command(about = "Calculation queue worker", long_about = None)]
struct Args {
    /// Broker address
    #[arg(short, long, env = "CALC_QUEUE_BROKER")]
    broker: Option<String>,

    /// Worker ID (auto-generated if not provided)
    #[arg(long)]
    worker_id: Option<String>,

    /// Number of concurrent tasks
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Threads used by a parallel task's operations
    #[arg(long)]
    fanout_pool_size: Option<usize>,

    /// Per-task time limit in seconds
    #[arg(long)]
    task_timeout: Option<u64>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        WorkerConfig::from_file(config_path)?
    } else {
        WorkerConfig::default()
    };

    // Override with CLI args
    if let Some(broker) = args.broker {
        config.broker_address = broker;
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(worker_id) = args.worker_id {
        config.worker_id = Some(worker_id);
    }
    if let Some(pool_size) = args.fanout_pool_size {
        config.fanout_pool_size = Some(pool_size);
    }
    if let Some(timeout) = args.task_timeout {
        config.task_timeout_secs = Some(timeout);
    }

    let fanout = config.fanout();
    let registry = TaskHandlerRegistry::with_defaults(fanout);
    tracing::info!(
        "Registered task kinds: {:?} (fan-out pool size {})",
        registry.task_kinds(),
        fanout.pool_size
    );

    let worker = Worker::new(config, registry);

    // Handle shutdown signals
    let signal_worker = worker.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            signal_worker.shutdown();
        }
    });

    worker.run().await?;

    Ok(())
}
