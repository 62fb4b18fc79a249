use serde::{Deserialize, Serialize};
use std::fmt;

/// Lesion taxonomy used for detection labels and weight lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AcneClass {
    #[serde(rename = "Acné General")]
    General,
    #[serde(rename = "Acné Comedonal")]
    Comedonal,
    #[serde(rename = "Acné Inflamatorio")]
    Inflammatory,
    #[serde(rename = "Acné Noduloquístico")]
    Nodulocystic,
}

impl AcneClass {
    pub fn label(self) -> &'static str {
        match self {
            AcneClass::General => "Acné General",
            AcneClass::Comedonal => "Acné Comedonal",
            AcneClass::Inflammatory => "Acné Inflamatorio",
            AcneClass::Nodulocystic => "Acné Noduloquístico",
        }
    }

    /// Maps a model class name onto the taxonomy. Matching is on the
    /// lowercased, trimmed name; anything unrecognised is `General`.
    pub fn from_model_class(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "acné comedonal" | "acne comedonal" | "comedonal" | "comedo" | "comedone"
            | "comedones" | "blackhead" | "blackheads" | "whitehead" | "whiteheads"
            | "punto negro" | "punto blanco" => AcneClass::Comedonal,
            "acné inflamatorio" | "acne inflamatorio" | "inflamatorio" | "inflammatory"
            | "papule" | "papules" | "pustule" | "pustules" | "pápula" | "pústula" => {
                AcneClass::Inflammatory
            }
            "acné noduloquístico" | "acne noduloquistico" | "noduloquístico" | "nodulocystic"
            | "nodule" | "nodules" | "nodular" | "cyst" | "cysts" | "cystic" | "quiste" => {
                AcneClass::Nodulocystic
            }
            _ => AcneClass::General,
        }
    }
}

impl fmt::Display for AcneClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Age-bracket classification. Independent of [`Severity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcneType {
    #[serde(rename = "Acné Neonatal")]
    Neonatal,
    #[serde(rename = "Acné Infantil")]
    Infantile,
    #[serde(rename = "Acné Vulgar")]
    Vulgar,
    #[serde(rename = "Acné Adulto")]
    Adult,
}

impl AcneType {
    pub fn from_age(age: u32) -> Self {
        match age {
            0 => AcneType::Neonatal,
            1..=6 => AcneType::Infantile,
            7..=24 => AcneType::Vulgar,
            _ => AcneType::Adult,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AcneType::Neonatal => "Acné Neonatal",
            AcneType::Infantile => "Acné Infantil",
            AcneType::Vulgar => "Acné Vulgar",
            AcneType::Adult => "Acné Adulto",
        }
    }
}

impl fmt::Display for AcneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    pub const MODERATE_FROM: f64 = 3.0;
    pub const SEVERE_FROM: f64 = 7.0;

    /// Classifies an aggregate score: below 3 mild, below 7 moderate.
    pub fn from_total(total: f64) -> Self {
        if total < Self::MODERATE_FROM {
            Severity::Mild
        } else if total < Self::SEVERE_FROM {
            Severity::Moderate
        } else {
            Severity::Severe
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Severity::Mild => "Leve",
            Severity::Moderate => "Moderado",
            Severity::Severe => "Severo",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
