use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::analysis::tables::TableError;
use crate::inference::InferenceError;
#[cfg(feature = "torch")]
use crate::inference::yolo::YoloDecoder;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid analysis tables: {0}")]
    Tables(#[from] TableError),
    #[error("Failed to load detector: {0}")]
    Model(#[from] InferenceError),
}

pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

/// Detector thresholds and input geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionSettings {
    pub confidence: f32,
    pub iou: f32,
    pub input_size: u32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            iou: 0.7,
            input_size: 640,
        }
    }
}

#[cfg(feature = "torch")]
impl DetectionSettings {
    pub fn decoder(&self) -> YoloDecoder {
        YoloDecoder {
            input_size: self.input_size,
            confidence_threshold: self.confidence,
            iou_threshold: self.iou,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub classes_path: PathBuf,
    pub tables_path: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
    pub watermark_path: Option<PathBuf>,
    pub detection: DetectionSettings,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; empty values count as
    /// unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let path = |key: &str| get(key).map(PathBuf::from);

        let defaults = DetectionSettings::default();
        let detection = DetectionSettings {
            confidence: parse(&get, "DETECTION_CONFIDENCE", defaults.confidence)?,
            iou: parse(&get, "DETECTION_IOU", defaults.iou)?,
            input_size: parse(&get, "DETECTION_INPUT_SIZE", defaults.input_size)?,
        };
        if !(0.0..=1.0).contains(&detection.confidence) {
            return Err(invalid("DETECTION_CONFIDENCE", detection.confidence));
        }
        if !(0.0..=1.0).contains(&detection.iou) {
            return Err(invalid("DETECTION_IOU", detection.iou));
        }
        if detection.input_size == 0 || detection.input_size % 32 != 0 {
            return Err(invalid("DETECTION_INPUT_SIZE", detection.input_size));
        }

        let max_upload_mb: usize = parse(&get, "MAX_UPLOAD_MB", 50)?;
        if max_upload_mb == 0 {
            return Err(invalid("MAX_UPLOAD_MB", max_upload_mb));
        }

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&get, "PORT", 8000)?,
            model_path: path("MODEL_PATH")
                .unwrap_or_else(|| PathBuf::from("models/bestv1.torchscript")),
            classes_path: path("MODEL_CLASSES")
                .unwrap_or_else(|| PathBuf::from("config/classes.yaml")),
            tables_path: path("ANALYSIS_TABLES"),
            font_path: path("REPORT_FONT"),
            watermark_path: path("REPORT_WATERMARK"),
            detection,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn invalid(key: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(raw) => raw.parse().map_err(|_| invalid(key, raw)),
        None => Ok(default),
    }
}
