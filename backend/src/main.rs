mod analysis;
mod config;
mod error;
mod inference;
mod report;
mod routes;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use std::env;

use analysis::AnalysisSystem;
use analysis::tables::AnalysisTables;
use config::{ConfigError, ServerConfig};
use inference::annotate::Annotator;
use inference::{ClassTable, DetectionAdapter, Detector};
use report::{ReportAssets, ReportRenderer};
use routes::{UploadLimit, configure_routes};

#[cfg(feature = "torch")]
fn load_detector(config: &ServerConfig) -> Result<Box<dyn Detector>, ConfigError> {
    let detector =
        inference::torch::TorchDetector::load(&config.model_path, config.detection.decoder())?;
    Ok(Box::new(detector))
}

#[cfg(not(feature = "torch"))]
fn load_detector(config: &ServerConfig) -> Result<Box<dyn Detector>, ConfigError> {
    Err(inference::InferenceError::Unavailable(format!(
        "built without the `torch` feature, cannot run {}",
        config.model_path.display()
    ))
    .into())
}

fn build_system(config: &ServerConfig) -> Result<AnalysisSystem, ConfigError> {
    let tables = match &config.tables_path {
        Some(path) => {
            log::info!("Loading analysis tables from {}", path.display());
            AnalysisTables::load(path)?
        }
        None => AnalysisTables::default(),
    };
    let classes = ClassTable::load(&config.classes_path)?;
    log::info!(
        "Loaded {} model classes from {}",
        classes.len(),
        config.classes_path.display()
    );

    let detector = load_detector(config)?;
    let assets = ReportAssets::load(config.font_path.as_deref(), config.watermark_path.as_deref());
    if assets.has_watermark() {
        log::info!("Report watermark enabled");
    }
    if !assets.has_font() {
        log::warn!(
            "No report font configured; report text falls back to Helvetica and boxes are drawn without labels"
        );
    }
    let annotator = Annotator::new(assets.label_font());

    Ok(AnalysisSystem::new(
        DetectionAdapter::new(detector, classes),
        tables,
        ReportRenderer::new(assets),
        annotator,
    ))
}

fn startup_error(e: ConfigError) -> std::io::Error {
    log::error!("Startup failed: {}", e);
    std::io::Error::other(e.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = ServerConfig::from_env().map_err(startup_error)?;
    log::info!(
        "Detector {} (input {}, confidence {}, iou {}), upload limit {} bytes",
        config.model_path.display(),
        config.detection.input_size,
        config.detection.confidence,
        config.detection.iou,
        config.max_upload_bytes
    );

    let system = web::Data::new(build_system(&config).map_err(startup_error)?);
    let upload_limit = web::Data::new(UploadLimit(config.max_upload_bytes));
    let bind_address = config.bind_address();

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(system.clone())
            .app_data(upload_limit.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
