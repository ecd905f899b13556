use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use landcover_seg_rs::{server, Config, ImageProcessor};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::new();
    config.validate()?;

    let processor = ImageProcessor::from_config(&config).map_err(|e| {
        error!("Error loading model: {}", e);
        e
    })?;
    info!(
        "Serving {}x{} predictions with {} classes",
        config.image_size,
        config.image_size,
        processor.class_table().len()
    );

    server::serve(&config, processor)
        .await
        .with_context(|| format!("server on {} failed", config.bind_addr()))
}
