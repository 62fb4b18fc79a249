use std::collections::BTreeMap;

use super::classes::{AcneClass, Severity};
use super::factors::FactorSet;
use super::tables::FactorWeights;
use crate::inference::Detection;

/// Score per detected class.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassScores(BTreeMap<AcneClass, f64>);

impl ClassScores {
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn severity(&self) -> Severity {
        Severity::from_total(self.total())
    }

    #[cfg(test)]
    pub fn get(&self, class: AcneClass) -> Option<f64> {
        self.0.get(&class).copied()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AcneClass, f64)> + '_ {
        self.0.iter().map(|(class, score)| (*class, *score))
    }

    /// Keyed by display label, as sent over the wire.
    pub fn to_labelled(&self) -> BTreeMap<String, f64> {
        self.iter()
            .map(|(class, score)| (class.label().to_string(), score))
            .collect()
    }
}

impl FromIterator<(AcneClass, f64)> for ClassScores {
    fn from_iter<I: IntoIterator<Item = (AcneClass, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Confidence mass per class. With no detections the result is a single
/// synthetic general class of mass 1.
pub fn confidence_mass(detections: &[Detection]) -> BTreeMap<AcneClass, f64> {
    if detections.is_empty() {
        return BTreeMap::from([(AcneClass::General, 1.0)]);
    }

    let mut grouped: BTreeMap<AcneClass, Vec<f64>> = BTreeMap::new();
    for detection in detections {
        grouped
            .entry(detection.class)
            .or_default()
            .push(detection.confidence as f64);
    }

    // Summing in sorted order keeps the result independent of input order.
    grouped
        .into_iter()
        .map(|(class, mut confidences)| {
            confidences.sort_by(f64::total_cmp);
            (class, confidences.into_iter().sum())
        })
        .collect()
}

/// `score = Σ normalize(factor) * weight(class, factor) * mass(class)` for
/// every class present.
pub fn score(
    weights: &FactorWeights,
    detections: &[Detection],
    factors: &FactorSet,
) -> ClassScores {
    confidence_mass(detections)
        .into_iter()
        .map(|(class, mass)| {
            let weighted: f64 = factors
                .normalized()
                .map(|(factor, normalized)| normalized * weights.weight(class, factor))
                .sum();
            (class, weighted * mass)
        })
        .collect()
}
