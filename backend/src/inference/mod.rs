pub mod adapter;
pub mod annotate;
#[cfg(feature = "torch")]
pub mod torch;
#[cfg_attr(not(feature = "torch"), allow(dead_code))]
pub mod yolo;

use image::RgbImage;

pub use adapter::{ClassTable, Detection, DetectionAdapter};

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Preprocessing error: {0}")]
    Preprocessing(String),
    #[error("Unexpected model output: {0}")]
    OutputShape(String),
    #[error("Detector unavailable: {0}")]
    Unavailable(String),
    #[cfg(feature = "torch")]
    #[error("Model lock poisoned")]
    Poisoned,
    #[cfg(feature = "torch")]
    #[error("Model error: {0}")]
    Model(#[from] tch::TchError),
}

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);
        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }
        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 { 0.0 } else { intersection / union }
    }
}

/// One box as reported by the detection capability.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_index: usize,
}

/// The opaque detection capability: image in, boxes out.
pub trait Detector: Send + Sync {
    fn predict(&self, image: &RgbImage) -> Result<Vec<RawDetection>, InferenceError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::analysis::classes::AcneClass;

    /// Detector returning a fixed list, or failing when `fail` is set.
    pub struct StubDetector {
        pub detections: Vec<RawDetection>,
        pub fail: bool,
    }

    impl Detector for StubDetector {
        fn predict(&self, _image: &RgbImage) -> Result<Vec<RawDetection>, InferenceError> {
            if self.fail {
                return Err(InferenceError::Preprocessing("stub failure".to_string()));
            }
            Ok(self.detections.clone())
        }
    }

    pub fn raw(
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        confidence: f32,
        class_index: usize,
    ) -> RawDetection {
        RawDetection {
            bbox: BoundingBox { x1, y1, x2, y2 },
            confidence,
            class_index,
        }
    }

    pub fn detection(model_class: &str, confidence: f32) -> Detection {
        let bbox = BoundingBox {
            x1: 10.0,
            y1: 10.0,
            x2: 20.0,
            y2: 30.0,
        };
        Detection {
            bbox,
            center: bbox.center(),
            confidence,
            class_id: 0,
            model_class: model_class.to_string(),
            class: AcneClass::from_model_class(model_class),
        }
    }
}
