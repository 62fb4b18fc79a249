use serde::Deserialize;
use shared::Factor;
use std::collections::BTreeMap;
use std::path::Path;

use super::classes::AcneClass;
use super::recommend::RecommendationRules;
use crate::config::{ConfigError, read_yaml};

pub type WeightRow = BTreeMap<Factor, f64>;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("weight table has no \"Acné General\" row")]
    MissingGeneralRow,
    #[error("weight for {class} / {factor} must be a finite non-negative number, got {value}")]
    InvalidWeight {
        class: AcneClass,
        factor: Factor,
        value: f64,
    },
}

/// Per-class factor weights. The general row always exists and backs every
/// class without a row of its own.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<AcneClass, WeightRow>")]
pub struct FactorWeights {
    general: WeightRow,
    classes: BTreeMap<AcneClass, WeightRow>,
}

impl FactorWeights {
    pub fn row(&self, class: AcneClass) -> &WeightRow {
        self.classes.get(&class).unwrap_or(&self.general)
    }

    pub fn weight(&self, class: AcneClass, factor: Factor) -> f64 {
        self.row(class).get(&factor).copied().unwrap_or(0.0)
    }
}

impl TryFrom<BTreeMap<AcneClass, WeightRow>> for FactorWeights {
    type Error = TableError;

    fn try_from(mut rows: BTreeMap<AcneClass, WeightRow>) -> Result<Self, Self::Error> {
        for (class, row) in &rows {
            for (factor, value) in row {
                if !value.is_finite() || *value < 0.0 {
                    return Err(TableError::InvalidWeight {
                        class: *class,
                        factor: *factor,
                        value: *value,
                    });
                }
            }
        }
        let general = rows
            .remove(&AcneClass::General)
            .ok_or(TableError::MissingGeneralRow)?;
        Ok(Self {
            general,
            classes: rows,
        })
    }
}

impl Default for FactorWeights {
    fn default() -> Self {
        fn row(weights: [f64; 5]) -> WeightRow {
            [
                Factor::StressLevel,
                Factor::DietQuality,
                Factor::SkinType,
                Factor::SunExposure,
                Factor::MakeupUse,
            ]
            .into_iter()
            .zip(weights)
            .collect()
        }

        Self {
            general: row([0.25, 0.2, 0.25, 0.15, 0.15]),
            classes: BTreeMap::from([
                (AcneClass::Comedonal, row([0.1, 0.2, 0.35, 0.05, 0.3])),
                (AcneClass::Inflammatory, row([0.3, 0.25, 0.2, 0.15, 0.1])),
                (AcneClass::Nodulocystic, row([0.3, 0.3, 0.25, 0.1, 0.05])),
            ]),
        }
    }
}

/// Read-only scoring and advice tables, built once at startup.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct AnalysisTables {
    #[serde(default)]
    pub weights: FactorWeights,
    #[serde(default)]
    pub recommendations: RecommendationRules,
}

impl AnalysisTables {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        read_yaml(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unweighted_classes_use_general_row() {
        let mut rows = BTreeMap::new();
        rows.insert(AcneClass::General, WeightRow::from([(Factor::StressLevel, 0.4)]));
        let weights = FactorWeights::try_from(rows).unwrap();
        assert_eq!(weights.weight(AcneClass::Comedonal, Factor::StressLevel), 0.4);
        assert_eq!(weights.weight(AcneClass::Comedonal, Factor::SkinType), 0.0);
    }

    #[test]
    fn general_row_is_required() {
        let mut rows = BTreeMap::new();
        rows.insert(AcneClass::Inflammatory, WeightRow::new());
        assert!(matches!(
            FactorWeights::try_from(rows),
            Err(TableError::MissingGeneralRow)
        ));
    }

    #[test]
    fn negative_weights_are_rejected() {
        let mut rows = BTreeMap::new();
        rows.insert(AcneClass::General, WeightRow::from([(Factor::DietQuality, -0.1)]));
        assert!(matches!(
            FactorWeights::try_from(rows),
            Err(TableError::InvalidWeight { factor: Factor::DietQuality, .. })
        ));
    }

    #[test]
    fn default_rows_sum_to_at_most_one() {
        let weights = FactorWeights::default();
        for class in [
            AcneClass::General,
            AcneClass::Comedonal,
            AcneClass::Inflammatory,
            AcneClass::Nodulocystic,
        ] {
            let total: f64 = weights.row(class).values().sum();
            assert!(total <= 1.0 + 1e-9, "{class} sums to {total}");
        }
    }

    #[test]
    fn shipped_yaml_matches_builtin_tables() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/analysis.yaml");
        let loaded = AnalysisTables::load(&path).unwrap();
        assert_eq!(loaded, AnalysisTables::default());
    }

    #[test]
    fn yaml_without_general_row_fails_to_load() {
        let yaml = "weights:\n  \"Acné Comedonal\":\n    stress_level: 0.5\n";
        assert!(serde_yaml::from_str::<AnalysisTables>(yaml).is_err());
    }
}
