use image::RgbImage;
use serde::Deserialize;
use shared::DetectionPayload;
use std::collections::BTreeMap;
use std::path::Path;

use super::{BoundingBox, Detector, InferenceError, RawDetection};
use crate::analysis::classes::AcneClass;
use crate::config::{ConfigError, read_yaml};

#[derive(Deserialize)]
#[serde(untagged)]
enum ClassNames {
    List(Vec<String>),
    Indexed(BTreeMap<usize, String>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ClassTableFile {
    Wrapped { names: ClassNames },
    Bare(ClassNames),
}

/// Class index to model class name, shipped next to the model artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassTable {
    names: Vec<String>,
}

impl ClassTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Accepts a bare list, an index map, or either under a `names:` key.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file: ClassTableFile = read_yaml(path)?;
        let names = match file {
            ClassTableFile::Wrapped { names } | ClassTableFile::Bare(names) => names,
        };
        Ok(Self::from_names(names))
    }

    fn from_names(names: ClassNames) -> Self {
        match names {
            ClassNames::List(names) => Self::new(names),
            ClassNames::Indexed(indexed) => {
                let len = indexed.keys().next_back().map_or(0, |last| last + 1);
                let names = (0..len)
                    .map(|index| {
                        indexed
                            .get(&index)
                            .cloned()
                            .unwrap_or_else(|| format!("class_{}", index))
                    })
                    .collect();
                Self::new(names)
            }
        }
    }

    pub fn name(&self, index: usize) -> String {
        self.names
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", index))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

/// A detection after normalization: center in original pixel space and the
/// taxonomy label used downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub center: (f32, f32),
    pub confidence: f32,
    pub class_id: usize,
    pub model_class: String,
    pub class: AcneClass,
}

impl Detection {
    pub fn to_payload(&self) -> DetectionPayload {
        DetectionPayload {
            center: [self.center.0, self.center.1],
            confidence: self.confidence,
            class_id: self.class_id,
            class_name: self.class.label().to_string(),
        }
    }
}

pub struct DetectionAdapter {
    detector: Box<dyn Detector>,
    classes: ClassTable,
}

impl DetectionAdapter {
    pub fn new(detector: Box<dyn Detector>, classes: ClassTable) -> Self {
        Self { detector, classes }
    }

    /// Runs the detector and normalizes its output. Detector errors are
    /// passed through untouched.
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, InferenceError> {
        let raw = self.detector.predict(image)?;
        Ok(raw.into_iter().map(|raw| self.normalize(raw)).collect())
    }

    fn normalize(&self, raw: RawDetection) -> Detection {
        let model_class = self.classes.name(raw.class_index);
        Detection {
            center: raw.bbox.center(),
            bbox: raw.bbox,
            confidence: raw.confidence,
            class_id: raw.class_index,
            class: AcneClass::from_model_class(&model_class),
            model_class,
        }
    }
}
