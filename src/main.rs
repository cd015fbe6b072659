use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use imgwatch::config::AppConfig;
use imgwatch::{DockerConnector, Publisher, Watcher};

/// Watches docker for image push events and registers the pushed digests
/// with the image catalog service
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Base url of the image catalog service
    #[clap(long, alias = "imagelist-url")]
    catalog_url: Option<String>,

    /// Path to a configuration file
    #[clap(short = 'c', long = "config")]
    config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let config = AppConfig::load(args.config_file.as_deref(), args.catalog_url)?;
    let images_url = config.images_url()?;
    info!("Registering pushed images with {}", images_url);

    let publisher = Publisher::new(images_url, config.publish_policy());
    let watcher = Watcher::new(
        Arc::new(DockerConnector),
        publisher,
        config.reconnect_policy(),
    );

    tokio::select! {
        _ = watcher.run() => {},
        _ = shutdown_signal() => {},
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, exiting");
}
