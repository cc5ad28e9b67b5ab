//! Checklist aggregation.
//!
//! One judge call rates every item; this module turns the per-item levels
//! into a weighted mean on the scheme's normalized scale.

use std::collections::BTreeMap;

use crate::result::{resolve_label, Criteria, EvaluationResult, ItemDetail, ScaleInfo};
use crate::scheme::{ChecklistAdditive, MissingStrategy, OutputRange, Scheme, ScoreValue};

/// Rating for one item as parsed from the judge response.
#[derive(Debug, Clone)]
pub struct ItemRating {
    pub level: LevelAnswer,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelAnswer {
    Level(i64),
    Na,
}

/// Aggregate item ratings into the scheme result. Items the judge omitted
/// are treated as missing and routed through the aggregator's `missing`
/// strategy, the same as an explicit `"na"`.
pub fn aggregate(
    scheme: &Scheme,
    checklist: &ChecklistAdditive,
    ratings: &BTreeMap<String, ItemRating>,
) -> EvaluationResult {
    let aggregator = &checklist.aggregator;
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    let mut confidences = Vec::new();
    let mut criteria = BTreeMap::new();
    let mut rated = 0usize;

    for item in &checklist.items {
        let rating = ratings.get(&item.id);
        let (score, response, reasoning) = match rating {
            Some(ItemRating {
                level: LevelAnswer::Level(level),
                reasoning,
                confidence,
            }) => {
                if let Some(c) = confidence {
                    confidences.push(c.clamp(0.0, 1.0));
                }
                let (level, spec) = snap_level(item, *level);
                (Some(spec), level.to_string(), reasoning.clone())
            }
            Some(ItemRating {
                level: LevelAnswer::Na,
                reasoning,
                ..
            }) => (None, "na".to_string(), reasoning.clone()),
            None => (None, "missing".to_string(), None),
        };

        match score {
            Some(score) => {
                weighted += score * item.weight;
                total_weight += item.weight;
                rated += 1;
                criteria.insert(
                    item.id.clone(),
                    ItemDetail {
                        name: item.prompt.clone(),
                        response,
                        normalized_score: Some(round2(score * aggregator.scale_factor)),
                        weight: item.weight,
                        reasoning,
                    },
                );
            }
            None => {
                if aggregator.missing == MissingStrategy::Zero {
                    total_weight += item.weight;
                }
                criteria.insert(
                    item.id.clone(),
                    ItemDetail {
                        name: item.prompt.clone(),
                        response,
                        normalized_score: None,
                        weight: item.weight,
                        reasoning,
                    },
                );
            }
        }
    }

    let base = if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    };
    let value = scheme
        .output_range
        .clamp(ScoreValue::Float(round2(base * aggregator.scale_factor)));

    let confidence = if confidences.is_empty() {
        0.8
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    let reasoning = format!(
        "{rated} von {} Kriterien bewertet, gewichtetes Ergebnis {value} auf der Skala {}.",
        checklist.items.len(),
        normalized_range(&scheme.output_range),
    );

    EvaluationResult {
        scheme_id: scheme.id.clone(),
        dimension: scheme.dimension.clone(),
        value,
        label: resolve_label(&scheme.labels, value, None),
        reasoning: Some(reasoning),
        confidence,
        scale_info: ScaleInfo::Checklist {
            raw_range: "0.0-1.0".to_string(),
            normalized_range: normalized_range(&scheme.output_range),
        },
        criteria: Some(Criteria::Checklist(criteria)),
        errored: false,
    }
}

/// Map a judged level onto the item's scale, snapping an out-of-range level
/// to the closest defined one.
fn snap_level(item: &crate::scheme::ChecklistItem, level: i64) -> (i64, f64) {
    if let Some(spec) = item.values.get(&level) {
        return (level, spec.score);
    }
    item.values
        .iter()
        .min_by_key(|(defined, _)| (*defined - level).unsigned_abs())
        .map(|(defined, spec)| (*defined, spec.score))
        .unwrap_or((level, 0.0))
}

fn normalized_range(range: &OutputRange) -> String {
    match range {
        OutputRange::Numeric { min, max, .. } => format!("{min:.1}-{max:.1}"),
        OutputRange::Enumerated { .. } => "0.0-1.0".to_string(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::SchemeKind;

    fn scheme(missing: &str) -> (Scheme, ChecklistAdditive) {
        let yaml = format!(
            r#"
id: neutralitaet_new
name: "Neutralität (Checkliste)"
dimension: neutrality
type: checklist_additive
output_range: {{min: 0.0, max: 5.0, type: float}}
aggregator: {{strategy: weighted_mean, missing: {missing}, scale_factor: 5.0}}
items:
  - id: perspektivenvielfalt
    prompt: "Werden mehrere Perspektiven dargestellt?"
    weight: 2.0
    allow_na: true
    values:
      1: {{score: 0.0, description: "Nur eine Perspektive"}}
      2: {{score: 0.33}}
      3: {{score: 0.66}}
      4: {{score: 1.0, description: "Ausgewogen"}}
  - id: neutrale_beschreibung
    prompt: "Ist die Beschreibung wertungsfrei?"
    weight: 1.0
    allow_na: true
    values:
      1: {{score: 0.0}}
      4: {{score: 1.0}}
"#
        );
        let scheme: Scheme = serde_yaml::from_str(&yaml).unwrap();
        let checklist = match &scheme.kind {
            SchemeKind::ChecklistAdditive(c) => c.clone(),
            other => panic!("unexpected kind: {other:?}"),
        };
        (scheme, checklist)
    }

    fn rating(level: LevelAnswer) -> ItemRating {
        ItemRating {
            level,
            reasoning: Some("Begründung".into()),
            confidence: None,
        }
    }

    #[test]
    fn na_items_are_dropped_under_ignore() {
        let (scheme, checklist) = scheme("ignore");
        let ratings = BTreeMap::from([
            ("perspektivenvielfalt".to_string(), rating(LevelAnswer::Level(4))),
            ("neutrale_beschreibung".to_string(), rating(LevelAnswer::Na)),
        ]);
        let result = aggregate(&scheme, &checklist, &ratings);
        // Only the weight-2 item counts: 1.0 * 5.0.
        assert_eq!(result.value, ScoreValue::Float(5.0));
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn na_items_keep_weight_under_zero() {
        let (scheme, checklist) = scheme("zero");
        let ratings = BTreeMap::from([
            ("perspektivenvielfalt".to_string(), rating(LevelAnswer::Level(4))),
            ("neutrale_beschreibung".to_string(), rating(LevelAnswer::Na)),
        ]);
        let result = aggregate(&scheme, &checklist, &ratings);
        // (2*1.0 + 1*0.0) / 3 * 5 = 3.33
        assert_eq!(result.value, ScoreValue::Float(3.33));
    }

    #[test]
    fn omitted_item_behaves_like_missing() {
        let (scheme, checklist) = scheme("ignore");
        let ratings = BTreeMap::from([(
            "perspektivenvielfalt".to_string(),
            rating(LevelAnswer::Level(4)),
        )]);
        let result = aggregate(&scheme, &checklist, &ratings);
        assert_eq!(result.value, ScoreValue::Float(5.0));
        let Some(Criteria::Checklist(criteria)) = &result.criteria else {
            panic!("expected checklist criteria");
        };
        assert_eq!(criteria["neutrale_beschreibung"].response, "missing");
        assert_eq!(criteria["neutrale_beschreibung"].normalized_score, None);
    }

    #[test]
    fn out_of_scale_level_snaps_to_closest() {
        let (scheme, checklist) = scheme("ignore");
        let ratings = BTreeMap::from([
            ("perspektivenvielfalt".to_string(), rating(LevelAnswer::Level(9))),
            ("neutrale_beschreibung".to_string(), rating(LevelAnswer::Level(4))),
        ]);
        let result = aggregate(&scheme, &checklist, &ratings);
        // Level 9 snaps to 4 (score 1.0).
        assert_eq!(result.value, ScoreValue::Float(5.0));
    }

    #[test]
    fn per_item_confidences_are_averaged() {
        let (scheme, checklist) = scheme("ignore");
        let ratings = BTreeMap::from([
            (
                "perspektivenvielfalt".to_string(),
                ItemRating {
                    level: LevelAnswer::Level(4),
                    reasoning: None,
                    confidence: Some(1.0),
                },
            ),
            (
                "neutrale_beschreibung".to_string(),
                ItemRating {
                    level: LevelAnswer::Level(1),
                    reasoning: None,
                    confidence: Some(0.5),
                },
            ),
        ]);
        let result = aggregate(&scheme, &checklist, &ratings);
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }
}
