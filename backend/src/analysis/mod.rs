//! Request-scoped analysis pipeline: decode, detect, score, recommend,
//! annotate and report.

pub mod classes;
pub mod factors;
pub mod recommend;
pub mod scorer;
pub mod tables;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::RgbImage;
use shared::{AnalyzeResponse, FactorsPayload, PatientInfo, PredictResponse};
use uuid::Uuid;

use crate::error::AnalysisError;
use crate::inference::annotate::{Annotator, JPEG_QUALITY, encode_jpeg};
use crate::inference::{Detection, DetectionAdapter};
use crate::report::{Report, ReportRenderer};
use classes::AcneType;
use factors::FactorSet;
use tables::AnalysisTables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Decoded,
    Detected,
    Scored,
    Recommended,
    Rendered,
    Responded,
    Failed,
}

/// Follows one request through the pipeline and logs every transition
/// under the request id. `Failed` is terminal.
pub struct StageTracker {
    request_id: Uuid,
    operation: &'static str,
    stage: Stage,
}

impl StageTracker {
    pub fn start(operation: &'static str) -> Self {
        let request_id = Uuid::new_v4();
        log::debug!("[{}] {} {:?}", request_id, operation, Stage::Received);
        Self {
            request_id,
            operation,
            stage: Stage::Received,
        }
    }

    #[cfg(test)]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    fn advance(&mut self, next: Stage) {
        if self.stage == Stage::Failed {
            return;
        }
        log::debug!(
            "[{}] {} {:?} -> {:?}",
            self.request_id,
            self.operation,
            self.stage,
            next
        );
        self.stage = next;
    }

    /// Moves to `next` on success; on error records the failure and passes
    /// the error through.
    pub fn step<T>(
        &mut self,
        next: Stage,
        result: Result<T, AnalysisError>,
    ) -> Result<T, AnalysisError> {
        match result {
            Ok(value) => {
                self.advance(next);
                Ok(value)
            }
            Err(e) => {
                log::error!(
                    "[{}] {} failed after {:?}: {}",
                    self.request_id,
                    self.operation,
                    self.stage,
                    e
                );
                self.stage = Stage::Failed;
                Err(e)
            }
        }
    }
}

/// Decodes a base64 image payload, with or without a `data:` URL prefix.
pub fn decode_base64_image(payload: &str) -> Result<Vec<u8>, AnalysisError> {
    let trimmed = payload.trim();
    let encoded = match trimmed.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => trimmed,
    };
    Ok(STANDARD.decode(encoded)?)
}

fn decode_image(bytes: &[u8]) -> Result<RgbImage, AnalysisError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

fn encode_base64_jpeg(image: &RgbImage) -> Result<String, AnalysisError> {
    let jpeg = encode_jpeg(image, JPEG_QUALITY).map_err(AnalysisError::Encode)?;
    Ok(STANDARD.encode(jpeg))
}

/// Validated inputs of one `/analyze` call.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image: Vec<u8>,
    pub patient: PatientInfo,
    pub factors: FactorSet,
}

impl AnalysisRequest {
    /// Parses the JSON form fields; factor names are checked against the
    /// known factor set.
    pub fn from_parts(
        image: Vec<u8>,
        patient_json: &str,
        factors_json: &str,
    ) -> Result<Self, AnalysisError> {
        let patient: PatientInfo =
            serde_json::from_str(patient_json).map_err(|e| AnalysisError::json("patient_info", e))?;
        let payload: FactorsPayload =
            serde_json::from_str(factors_json).map_err(|e| AnalysisError::json("factors", e))?;
        let factors = FactorSet::from_entries(payload.into_entries())?;
        Ok(Self {
            image,
            patient,
            factors,
        })
    }
}

/// Startup-built collaborators shared read-only by every request.
pub struct AnalysisSystem {
    adapter: DetectionAdapter,
    tables: AnalysisTables,
    renderer: ReportRenderer,
    annotator: Annotator,
}

impl AnalysisSystem {
    pub fn new(
        adapter: DetectionAdapter,
        tables: AnalysisTables,
        renderer: ReportRenderer,
        annotator: Annotator,
    ) -> Self {
        Self {
            adapter,
            tables,
            renderer,
            annotator,
        }
    }

    fn detect(
        &self,
        tracker: &mut StageTracker,
        bytes: &[u8],
    ) -> Result<(RgbImage, Vec<Detection>), AnalysisError> {
        let image = tracker.step(Stage::Decoded, decode_image(bytes))?;
        let detections = tracker.step(
            Stage::Detected,
            self.adapter.detect(&image).map_err(AnalysisError::from),
        )?;
        log::debug!(
            "[{}] {} detections on {}x{} image",
            tracker.request_id(),
            detections.len(),
            image.width(),
            image.height()
        );
        Ok((image, detections))
    }

    /// Detections plus the input with their boxes drawn.
    pub fn predict(&self, bytes: &[u8]) -> Result<PredictResponse, AnalysisError> {
        let mut tracker = StageTracker::start("predict");
        let (image, detections) = self.detect(&mut tracker, bytes)?;
        let annotated = self.annotator.draw_boxes(&image, &detections);
        let encoded = tracker.step(Stage::Responded, encode_base64_jpeg(&annotated))?;
        Ok(PredictResponse {
            detections: detections.iter().map(Detection::to_payload).collect(),
            image: encoded,
        })
    }

    /// Full analysis with scores, classification, advice and PDF report.
    pub fn analyze(&self, request: AnalysisRequest) -> Result<AnalyzeResponse, AnalysisError> {
        let mut tracker = StageTracker::start("analyze");
        let (image, detections) = self.detect(&mut tracker, &request.image)?;

        let scores = scorer::score(&self.tables.weights, &detections, &request.factors);
        let acne_type = AcneType::from_age(request.patient.age);
        let severity = scores.severity();
        tracker.step(Stage::Scored, Ok(()))?;
        log::debug!(
            "[{}] total score {:.3}: {} / {}",
            tracker.request_id(),
            scores.total(),
            acne_type,
            severity
        );

        let recommendations =
            self.tables
                .recommendations
                .recommend(&scores, &request.factors, Some(acne_type));
        tracker.step(Stage::Recommended, Ok(()))?;

        let annotated = self.annotator.mark_centers(&image, &detections);
        let report = Report {
            patient: &request.patient,
            annotated: &annotated,
            scores: &scores,
            acne_type,
            severity,
            recommendations: &recommendations,
            detections: &detections,
            factors: &request.factors,
            date: chrono::Local::now().date_naive(),
        };
        let pdf = tracker.step(
            Stage::Rendered,
            self.renderer.render(&report).map_err(AnalysisError::from),
        )?;

        let encoded = tracker.step(Stage::Responded, encode_base64_jpeg(&annotated))?;
        Ok(AnalyzeResponse {
            detections: detections.iter().map(Detection::to_payload).collect(),
            factor_analysis: scores.to_labelled(),
            acne_type: acne_type.label().to_string(),
            severity: severity.label().to_string(),
            recommendations,
            image: encoded,
            pdf_report: STANDARD.encode(pdf),
        })
    }
}
