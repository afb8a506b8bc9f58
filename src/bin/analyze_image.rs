use anyhow::{bail, Result};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use asana_coach::analysis::Analyzer;
use asana_coach::config::Config;
use asana_coach::pose::{load_image, PoseDetector};

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let Some(image_path) = std::env::args().nth(1) else {
        bail!("usage: analyze_image <image> [config.toml]");
    };
    let config_path = std::env::args().nth(2).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);

    let mut detector = PoseDetector::from_config(&config.detector.model_path, &config.detector)?;
    let analyzer = Analyzer::from_config(&config.analysis);
    let image = load_image(&image_path)?;

    let start = Instant::now();
    let result = analyzer.analyze_source(&mut detector, &image);
    info!(elapsed_ms = start.elapsed().as_millis() as u64, "analyzed {}", image_path);

    match result {
        Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        Err(e) => {
            println!("{}", serde_json::json!({ "error": e.kind(), "message": e.to_string() }));
            std::process::exit(1);
        }
    }
    Ok(())
}
