use axum::{extract::State, http::StatusCode, routing::get, Router};
use calc_queue_backend::BackendKind;
use calc_queue_broker::{Broker, BrokerConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cq-broker")]
#[command(about = "Calculation queue broker and result store", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "broker.yaml")]
    config: String,

    /// Broker host
    #[arg(long)]
    host: Option<String>,

    /// Broker port
    #[arg(long)]
    port: Option<u16>,

    /// Prometheus metrics port
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Result backend (memory or rocksdb)
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Data directory for the rocksdb backend
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config_missing = !std::path::Path::new(&args.config).exists();
    let mut config = if config_missing {
        BrokerConfig::default()
    } else {
        BrokerConfig::from_file(&args.config)?
    };

    // Initialize tracing
    let fallback_level = config.monitoring.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback_level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if config_missing {
        tracing::warn!("Config file {} not found, using defaults", args.config);
    }

    // Override with CLI args
    if let Some(host) = args.host {
        config.broker.host = host;
    }
    if let Some(port) = args.port {
        config.broker.port = port;
    }
    if let Some(metrics_port) = args.metrics_port {
        config.monitoring.prometheus_port = metrics_port;
    }
    if let Some(backend) = args.backend {
        config.backend.kind = backend;
    }
    if let Some(data_dir) = args.data_dir {
        config.backend.data_dir = data_dir;
    }

    tracing::info!("Starting broker with config: {:?}", config);

    let broker = Arc::new(Broker::new(config.clone())?);

    // Start metrics server
    let metrics_broker = broker.clone();
    let metrics_port = config.monitoring.prometheus_port;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_broker, metrics_port).await {
            tracing::error!("Metrics server error: {}", e);
        }
    });

    let shutdown_broker = broker.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            shutdown_broker.shutdown();
        }
    });

    broker.run().await?;

    Ok(())
}

async fn start_metrics_server(broker: Arc<Broker>, port: u16) -> anyhow::Result<()> {
    async fn metrics_handler(State(broker): State<Arc<Broker>>) -> Result<String, StatusCode> {
        broker.metrics().render().map_err(|e| {
            tracing::error!("Failed to render metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
    }

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(broker);

    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Metrics server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
