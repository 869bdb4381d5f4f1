mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use image::DynamicImage;
use imgclass_backend_ort::OrtBackend;
use imgclass_core::ClassifyError;
use imgclass_runtime::{BackendRegistry, Classifier, Prediction};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&cli.log)?)
        .with_writer(std::io::stderr)
        .init();

    let prediction = run(&cli)?;
    println!("{prediction}");
    Ok(())
}

fn log_filter(raw: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(raw).with_context(|| format!("invalid --log filter '{raw}'"))
}

fn run(cli: &Cli) -> Result<Prediction> {
    if !cli.image.is_file() {
        return Err(ClassifyError::ImageFileNotFound {
            path: cli.image.clone(),
        }
        .into());
    }

    let decoded = image::open(&cli.image).map_err(ClassifyError::from)?;
    let image = DynamicImage::ImageRgb8(decoded.to_rgb8());

    let mut registry = BackendRegistry::new();
    registry.register("onnx", OrtBackend::new());

    let mut classifier = Classifier::from_model_dir(&cli.model_dir, &registry)?;
    let prediction = classifier.predict(&image)?;

    if prediction.is_empty() {
        warn!("signature declares no outputs");
    }
    if let Some(top) = prediction
        .classifications(classifier.signature().labels())
        .first()
    {
        info!(label = %top.label, confidence = top.confidence, "top classification");
    }

    Ok(prediction)
}
