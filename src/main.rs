use anyhow::{Context, Result};
use kube::CustomResourceExt;
use reflector::cache::ScanCache;
use reflector::config::ReflectorConfig;
use reflector::models::{ImagePolicy, ImageRepository};
use reflector::{controller, metrics};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn print_crds() -> Result<()> {
    let repository = serde_yaml::to_string(&ImageRepository::crd())
        .context("Failed to serialize ImageRepository CRD")?;
    let policy =
        serde_yaml::to_string(&ImagePolicy::crd()).context("Failed to serialize ImagePolicy CRD")?;
    print!("{}---\n{}", repository, policy);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().nth(1).as_deref() == Some("crd") {
        return print_crds();
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reflector=info,kube=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Headwind Reflector - image repository scanner");

    let config = ReflectorConfig::from_env();

    // Shared between the repository and policy controllers
    let cache = ScanCache::new();

    let metrics_handle = metrics::start_metrics_server(config.metrics_addr).await?;
    let controller_handle = controller::start_controllers(config, cache).await?;

    info!("Headwind Reflector is running");

    tokio::select! {
        _ = metrics_handle => info!("Metrics server stopped"),
        _ = controller_handle => info!("Controllers stopped"),
    }

    Ok(())
}
