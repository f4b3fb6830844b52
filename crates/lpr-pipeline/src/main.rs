use anyhow::{Context, Result};
use image::RgbImage;
use lpr_pipeline::{
    inference::{InferenceEngine, OrtEngine},
    Renderer, ServiceConfig, VehicleLicensePlateDetector,
};
use model_provisioner::{DownloadProgress, HttpProvisioner, LocalProvisioner, ProgressCallback, Provisioner};
use std::sync::Arc;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = telemetry::init_with_service("lpr-pipeline");

    info!("Starting lpr-pipeline {}", common::VERSION);

    let config = ServiceConfig::from_env()?;
    info!(
        "LPR configuration: input={}, output={}, models={}, provider={}",
        config.input.display(),
        config.output.display(),
        config.pipeline.model_dir.display(),
        config.pipeline.execution_provider
    );

    let provisioner: Arc<dyn Provisioner> = if config.pipeline.offline {
        info!("Offline mode: using models already on disk");
        Arc::new(LocalProvisioner)
    } else {
        Arc::new(HttpProvisioner::new(config.pipeline.download_retries)?)
    };
    let engine: Arc<dyn InferenceEngine> = Arc::new(OrtEngine::from_config(&config.pipeline));

    let renderer = match &config.font_path {
        Some(path) => Renderer::with_font_path(path)?,
        None => Renderer::with_system_font(),
    };

    let detector = VehicleLicensePlateDetector::new(config.pipeline.clone(), provisioner, engine)
        .with_renderer(renderer);

    let progress: ProgressCallback = Arc::new(|p: DownloadProgress| match p.total_bytes {
        Some(total) => debug!("Downloading {}: {}/{} bytes", p.url, p.bytes_received, total),
        None => debug!("Downloading {}: {} bytes", p.url, p.bytes_received),
    });
    detector.init(Some(progress)).await?;

    let input = image::open(&config.input)
        .with_context(|| format!("Failed to open image {}", config.input.display()))?
        .to_rgb8();
    let mut output = RgbImage::new(input.width(), input.height());

    let (status, vehicles) = detector.process_and_render_detailed(&input, &mut output)?;
    info!("{}", status);
    info!("Vehicles: {}", serde_json::to_string(&vehicles)?);

    output
        .save(&config.output)
        .with_context(|| format!("Failed to write {}", config.output.display()))?;
    info!("Annotated image written to {}", config.output.display());

    detector.shutdown();
    Ok(())
}
