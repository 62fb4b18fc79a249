use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

pub use strum::IntoEnumIterator;

/// Lifestyle and physiological inputs accepted by `/analyze`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Factor {
    StressLevel,
    DietQuality,
    SkinType,
    SunExposure,
    MakeupUse,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ExternalFactor {
    pub name: String,
    pub value: i64,
}

/// The `factors` form field. The list of `{name, value}` objects is the
/// canonical shape; the flat `{"stress_level": 7, ...}` object is accepted
/// for older clients and converted to the list on arrival.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum FactorsPayload {
    List(Vec<ExternalFactor>),
    Flat(BTreeMap<String, i64>),
}

impl FactorsPayload {
    pub fn into_entries(self) -> Vec<ExternalFactor> {
        match self {
            FactorsPayload::List(entries) => entries,
            FactorsPayload::Flat(map) => map
                .into_iter()
                .map(|(name, value)| ExternalFactor { name, value })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub enum Sex {
    Male,
    Female,
    Other,
}

impl TryFrom<u8> for Sex {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Sex::Male),
            1 => Ok(Sex::Female),
            2 => Ok(Sex::Other),
            other => Err(format!("sex must be 0, 1 or 2, got {}", other)),
        }
    }
}

impl From<Sex> for u8 {
    fn from(sex: Sex) -> Self {
        match sex {
            Sex::Male => 0,
            Sex::Female => 1,
            Sex::Other => 2,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PatientInfo {
    pub name: String,
    pub age: u32,
    pub sex: Sex,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct PredictRequest {
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DetectionPayload {
    pub center: [f32; 2],
    pub confidence: f32,
    pub class_id: usize,
    pub class_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PredictResponse {
    pub detections: Vec<DetectionPayload>,
    pub image: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalyzeResponse {
    pub detections: Vec<DetectionPayload>,
    pub factor_analysis: BTreeMap<String, f64>,
    pub acne_type: String,
    pub severity: String,
    pub recommendations: Vec<String>,
    pub image: String,
    pub pdf_report: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub detail: String,
}
