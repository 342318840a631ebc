use calc_queue_api::{create_router, ApiConfig};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cq-api")]
#[command(about = "HTTP front end for the calculation queue", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(short, long)]
    port: Option<u16>,

    /// Broker address
    #[arg(short, long, env = "CALC_QUEUE_BROKER")]
    broker: Option<String>,

    /// Base for status urls when requests carry no Host header
    #[arg(long)]
    public_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        ApiConfig::from_file(config_path)?
    } else {
        ApiConfig::default()
    };

    // Override with CLI args
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(broker) = args.broker {
        config.broker_address = broker;
    }
    if let Some(public_url) = args.public_url {
        config.public_url = public_url;
    }

    tracing::info!("Starting API with config: {:?}", config);

    let app = create_router(&config);
    let addr = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received shutdown signal");
        })
        .await?;

    Ok(())
}
