use shared::{ExternalFactor, Factor};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::str::FromStr;

/// Score used for values outside a factor's scale and for unknown factors.
pub const DEFAULT_SCORE: f64 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum FactorError {
    #[error("Unknown factor: {0}")]
    Unknown(String),
    #[error("Factor {0} supplied more than once")]
    Duplicate(Factor),
}

/// Maps a raw factor value onto [0, 1].
pub fn normalize(factor: Factor, value: i64) -> f64 {
    match factor {
        Factor::StressLevel | Factor::DietQuality => {
            if (0..=10).contains(&value) {
                value as f64 / 10.0
            } else {
                DEFAULT_SCORE
            }
        }
        Factor::SkinType => match value {
            1 => 0.3,
            2 => 0.5,
            3 => 0.7,
            4 => 0.9,
            _ => DEFAULT_SCORE,
        },
        Factor::SunExposure | Factor::MakeupUse => match value {
            1 => 0.3,
            2 => 0.6,
            3 => 0.9,
            _ => DEFAULT_SCORE,
        },
    }
}

/// Human-readable rendering of a raw value, used in the report.
pub fn describe_value(factor: Factor, value: i64) -> String {
    let label = match (factor, value) {
        (Factor::StressLevel | Factor::DietQuality, 0..=10) => return format!("{}/10", value),
        (Factor::SkinType, 1) => "Seca",
        (Factor::SkinType, 2) => "Normal",
        (Factor::SkinType, 3) => "Grasa",
        (Factor::SkinType, 4) => "Mixta",
        (Factor::SunExposure, 1) => "Baja",
        (Factor::SunExposure, 2) => "Moderada",
        (Factor::SunExposure, 3) => "Alta",
        (Factor::MakeupUse, 1) => "Poco frecuente",
        (Factor::MakeupUse, 2) => "Moderado",
        (Factor::MakeupUse, 3) => "Frecuente",
        _ => return format!("{} (fuera de escala)", value),
    };
    label.to_string()
}

/// Validated per-request factor values, keyed by factor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactorSet(BTreeMap<Factor, i64>);

impl FactorSet {
    pub fn from_entries(entries: Vec<ExternalFactor>) -> Result<Self, FactorError> {
        let mut values = BTreeMap::new();
        for entry in entries {
            let factor = Factor::from_str(&entry.name)
                .map_err(|_| FactorError::Unknown(entry.name.clone()))?;
            match values.entry(factor) {
                Entry::Vacant(slot) => {
                    slot.insert(entry.value);
                }
                Entry::Occupied(_) => return Err(FactorError::Duplicate(factor)),
            }
        }
        Ok(Self(values))
    }

    pub fn get(&self, factor: Factor) -> Option<i64> {
        self.0.get(&factor).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Factor, i64)> + '_ {
        self.0.iter().map(|(factor, value)| (*factor, *value))
    }

    pub fn normalized(&self) -> impl Iterator<Item = (Factor, f64)> + '_ {
        self.iter().map(|(factor, value)| (factor, normalize(factor, value)))
    }
}
