use serde::Deserialize;
use shared::Factor;

use super::classes::{AcneType, Severity};
use super::factors::FactorSet;
use super::scorer::ClassScores;

/// Predicate of a single advice rule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    TotalScoreAtLeast(f64),
    FactorAbove { factor: Factor, value: i64 },
    FactorBelow { factor: Factor, value: i64 },
    FactorEquals { factor: Factor, value: i64 },
    AcneType(AcneType),
}

impl Condition {
    fn matches(&self, total: f64, factors: &FactorSet, acne_type: Option<AcneType>) -> bool {
        match self {
            Condition::TotalScoreAtLeast(threshold) => total >= *threshold,
            Condition::FactorAbove { factor, value } => {
                factors.get(*factor).is_some_and(|raw| raw > *value)
            }
            Condition::FactorBelow { factor, value } => {
                factors.get(*factor).is_some_and(|raw| raw < *value)
            }
            Condition::FactorEquals { factor, value } => factors.get(*factor) == Some(*value),
            Condition::AcneType(expected) => acne_type == Some(*expected),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Rule {
    /// Written as a single-key map, e.g. `when: { factor_above: {...} }`.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub when: Condition,
    pub advice: String,
}

/// Ordered advice table. Every matching rule contributes, in table order,
/// and `closing` is always last.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecommendationRules {
    pub rules: Vec<Rule>,
    pub closing: String,
}

impl RecommendationRules {
    pub fn recommend(
        &self,
        scores: &ClassScores,
        factors: &FactorSet,
        acne_type: Option<AcneType>,
    ) -> Vec<String> {
        let total = scores.total();
        self.rules
            .iter()
            .filter(|rule| rule.when.matches(total, factors, acne_type))
            .map(|rule| rule.advice.clone())
            .chain(std::iter::once(self.closing.clone()))
            .collect()
    }
}

impl Default for RecommendationRules {
    fn default() -> Self {
        let rule = |when, advice: &str| Rule {
            when,
            advice: advice.to_string(),
        };
        Self {
            rules: vec![
                rule(
                    Condition::TotalScoreAtLeast(Severity::SEVERE_FROM),
                    "Considere consultar a un dermatólogo para un tratamiento personalizado.",
                ),
                rule(
                    Condition::FactorAbove {
                        factor: Factor::StressLevel,
                        value: 7,
                    },
                    "Intente reducir el estrés mediante técnicas de relajación o meditación.",
                ),
                rule(
                    Condition::FactorBelow {
                        factor: Factor::DietQuality,
                        value: 5,
                    },
                    "Mejore su dieta incluyendo más frutas, verduras y alimentos ricos en omega-3.",
                ),
                rule(
                    Condition::FactorEquals {
                        factor: Factor::SkinType,
                        value: 3,
                    },
                    "Use productos no comedogénicos y limpie su rostro dos veces al día.",
                ),
                rule(
                    Condition::FactorEquals {
                        factor: Factor::SunExposure,
                        value: 3,
                    },
                    "Utilice protector solar diariamente para prevenir la inflamación y el daño cutáneo.",
                ),
                rule(
                    Condition::FactorEquals {
                        factor: Factor::MakeupUse,
                        value: 3,
                    },
                    "Opte por maquillaje no comedogénico y asegúrese de removerlo completamente antes de dormir.",
                ),
                rule(
                    Condition::AcneType(AcneType::Neonatal),
                    "El acné neonatal suele resolverse por sí solo. Mantenga la piel del bebé limpia y seca.",
                ),
                rule(
                    Condition::AcneType(AcneType::Infantile),
                    "Consulte con un pediatra para determinar si se necesita tratamiento.",
                ),
                rule(
                    Condition::AcneType(AcneType::Vulgar),
                    "Utilice productos de limpieza suaves y no irritantes. Evite tocar o apretar las lesiones.",
                ),
                rule(
                    Condition::AcneType(AcneType::Adult),
                    "Considere factores hormonales y de estrés. Un enfoque holístico puede ser beneficioso.",
                ),
            ],
            closing: "Mantenga una rutina de cuidado facial constante, usando productos adecuados para su tipo de piel.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::classes::AcneClass;
    use shared::ExternalFactor;

    fn factors(values: &[(&str, i64)]) -> FactorSet {
        FactorSet::from_entries(
            values
                .iter()
                .map(|(name, value)| ExternalFactor {
                    name: name.to_string(),
                    value: *value,
                })
                .collect(),
        )
        .unwrap()
    }

    fn scores(total: f64) -> ClassScores {
        ClassScores::from_iter([(AcneClass::General, total)])
    }

    #[test]
    fn closing_advice_is_always_last() {
        let rules = RecommendationRules::default();
        let cases = [
            (scores(0.1), factors(&[]), None),
            (
                scores(9.0),
                factors(&[("stress_level", 9), ("diet_quality", 2)]),
                Some(AcneType::Adult),
            ),
            (scores(4.0), factors(&[("skin_type", 3)]), Some(AcneType::Neonatal)),
        ];
        for (scores, factors, acne_type) in cases {
            let advice = rules.recommend(&scores, &factors, acne_type);
            assert_eq!(advice.last(), Some(&rules.closing));
        }
    }

    #[test]
    fn matching_rules_accumulate_in_table_order() {
        let rules = RecommendationRules::default();
        let advice = rules.recommend(
            &scores(7.0),
            &factors(&[("makeup_use", 3), ("stress_level", 8), ("diet_quality", 4)]),
            Some(AcneType::Vulgar),
        );
        assert_eq!(advice.len(), 6);
        assert!(advice[0].contains("dermatólogo"));
        assert!(advice[1].contains("estrés"));
        assert!(advice[2].contains("dieta"));
        assert!(advice[3].contains("maquillaje"));
        assert!(advice[4].contains("limpieza suaves"));
    }

    #[test]
    fn rules_read_conditions_as_single_key_maps() {
        let yaml = r#"
rules:
  - when: { total_score_at_least: 7.0 }
    advice: "a"
  - when: { factor_above: { factor: stress_level, value: 7 } }
    advice: "b"
  - when: { acne_type: "Acné Infantil" }
    advice: "c"
closing: "d"
"#;
        let rules: RecommendationRules = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules.rules[0].when, Condition::TotalScoreAtLeast(7.0));
        assert_eq!(
            rules.rules[1].when,
            Condition::FactorAbove {
                factor: Factor::StressLevel,
                value: 7,
            }
        );
        assert_eq!(rules.rules[2].when, Condition::AcneType(AcneType::Infantile));
        assert_eq!(rules.closing, "d");
    }

    #[test]
    fn thresholds_are_strict_on_raw_values() {
        let rules = RecommendationRules::default();
        let advice = rules.recommend(
            &scores(6.999),
            &factors(&[("stress_level", 7), ("diet_quality", 5), ("skin_type", 2)]),
            None,
        );
        assert_eq!(advice, vec![rules.closing.clone()]);
    }
}
