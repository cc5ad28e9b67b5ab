//! The uniform result shape shared by all scheme kinds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::scheme::{OutputRange, Scheme, SchemeKind, ScoreValue};

/// Label used when an evaluation could not produce a verdict.
pub const UNRATED_LABEL: &str = "Unbewertet";

/// Result of evaluating one scheme against one text. Immutable once settled;
/// the per-request cache hands out shared references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub scheme_id: String,
    pub dimension: String,
    pub value: ScoreValue,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub confidence: f64,
    pub scale_info: ScaleInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Criteria>,
    /// True when this result is a fallback produced by a failed evaluation.
    #[serde(default, skip_serializing_if = "is_false")]
    pub errored: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl EvaluationResult {
    /// Copy with reasoning and criteria omitted, for
    /// `include_reasoning=false` responses. Criteria are dropped wholesale,
    /// which also removes any nested dependency reasoning.
    pub fn redacted(&self) -> Self {
        Self {
            reasoning: None,
            criteria: None,
            ..self.clone()
        }
    }

    /// Fallback result for a failed evaluation. Uses the scheme's declared
    /// default when present, a neutral zero outcome otherwise; either way
    /// the result is flagged as errored.
    pub fn errored(scheme: &Scheme, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let (value, label, reasoning, confidence) = match &scheme.default {
            Some(default) => (
                default.value,
                default.label.clone(),
                Some(default.reasoning.clone().unwrap_or_else(|| reason.clone())),
                default.confidence,
            ),
            None => (
                scheme.output_range.zero(),
                UNRATED_LABEL.to_string(),
                Some(reason),
                0.0,
            ),
        };

        Self {
            scheme_id: scheme.id.clone(),
            dimension: scheme.dimension.clone(),
            value,
            label,
            reasoning,
            confidence: confidence.clamp(0.0, 1.0),
            scale_info: scale_info_for(scheme),
            criteria: None,
            errored: true,
        }
    }

    /// Entry-level error for a scheme id the registry does not know.
    pub fn unknown_scheme(id: &str) -> Self {
        Self {
            scheme_id: id.to_string(),
            dimension: String::new(),
            value: ScoreValue::Float(0.0),
            label: UNRATED_LABEL.to_string(),
            reasoning: Some(format!("Unbekanntes Schema: {id}")),
            confidence: 0.0,
            scale_info: ScaleInfo::Unknown,
            criteria: None,
            errored: true,
        }
    }
}

/// Metadata describing the scale a result was produced on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ScaleInfo {
    #[serde(rename = "ordinal_rubric")]
    Ordinal { range: OutputRange, anchors: usize },

    #[serde(rename = "checklist_additive")]
    Checklist {
        raw_range: String,
        normalized_range: String,
    },

    #[serde(rename = "binary_gate")]
    Gate { rules: usize },

    #[serde(rename = "derived")]
    Derived {
        method: String,
        dependencies: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        weights: Option<BTreeMap<String, f64>>,
    },

    /// Placeholder for entry-level errors on unknown scheme ids.
    #[serde(rename = "unknown")]
    Unknown,
}

/// Kind-specific per-criterion breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Criteria {
    /// Checklist: item id → rating detail.
    Checklist(BTreeMap<String, ItemDetail>),
    /// Gate: rule id → trigger detail.
    Gate(BTreeMap<String, RuleDetail>),
    /// Derived: dependency scheme id → nested result with its rule weight.
    Dependencies(BTreeMap<String, DependencyDetail>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDetail {
    pub name: String,
    /// The rated level as text, `"na"`, or `"missing"`.
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_score: Option<f64>,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDetail {
    pub triggered: bool,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(flatten)]
    pub result: EvaluationResult,
}

/// Build the scale metadata for a scheme. Derived resolution overrides the
/// method and weights with those of the matched rule.
pub fn scale_info_for(scheme: &Scheme) -> ScaleInfo {
    match &scheme.kind {
        SchemeKind::OrdinalRubric(rubric) => ScaleInfo::Ordinal {
            range: scheme.output_range.clone(),
            anchors: rubric.anchors.len(),
        },
        SchemeKind::ChecklistAdditive(_) => ScaleInfo::Checklist {
            raw_range: "0.0-1.0".to_string(),
            normalized_range: match &scheme.output_range {
                OutputRange::Numeric { min, max, .. } => format!("{min:.1}-{max:.1}"),
                OutputRange::Enumerated { .. } => "0.0-1.0".to_string(),
            },
        },
        SchemeKind::BinaryGate(gate) => ScaleInfo::Gate {
            rules: gate.gate_rules.len(),
        },
        SchemeKind::Derived(_) => ScaleInfo::Derived {
            method: "rule_based".to_string(),
            dependencies: scheme.dependencies.len(),
            weights: None,
        },
    }
}

/// Resolve a display label for a value: exact key first, then a containing
/// `"lo-hi"` range key, then the caller's fallback, then empty.
pub fn resolve_label(
    labels: &BTreeMap<String, String>,
    value: ScoreValue,
    fallback: Option<&str>,
) -> String {
    let exact = value.to_string();
    if let Some(label) = labels.get(&exact) {
        return label.clone();
    }

    if let Some(v) = value.as_f64() {
        for (key, label) in labels {
            if let Some((lo, hi)) = parse_range_key(key) {
                if v >= lo && v <= hi {
                    return label.clone();
                }
            }
        }
    }

    fallback.unwrap_or_default().to_string()
}

fn parse_range_key(key: &str) -> Option<(f64, f64)> {
    let (lo, hi) = key.split_once('-')?;
    Some((lo.trim().parse().ok()?, hi.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn exact_key_wins_over_range() {
        let labels = labels(&[("4", "Exakt"), ("3.5-4.4", "Bereich")]);
        assert_eq!(
            resolve_label(&labels, ScoreValue::Int(4), None),
            "Exakt"
        );
    }

    #[test]
    fn range_key_matches_containing_value() {
        let labels = labels(&[("3.5-4.4", "Gut"), ("4.5-5.0", "Sehr gut")]);
        assert_eq!(
            resolve_label(&labels, ScoreValue::Float(4.56), None),
            "Sehr gut"
        );
    }

    #[test]
    fn range_bounds_are_not_rounded() {
        let labels = labels(&[("3.5-4.4", "Gut")]);
        // 3.499 stays below the lower bound.
        assert_eq!(resolve_label(&labels, ScoreValue::Float(3.499), None), "");
        assert_eq!(
            resolve_label(&labels, ScoreValue::Float(3.5), None),
            "Gut"
        );
    }

    #[test]
    fn fallback_label_applies_when_nothing_matches() {
        let labels = labels(&[("1", "Schlecht")]);
        assert_eq!(
            resolve_label(&labels, ScoreValue::Float(4.0), Some("Anker")),
            "Anker"
        );
    }

    #[test]
    fn boolean_labels_match_by_exact_key() {
        let labels = labels(&[("true", "BESTANDEN"), ("false", "NICHT BESTANDEN")]);
        assert_eq!(
            resolve_label(&labels, ScoreValue::Bool(false), None),
            "NICHT BESTANDEN"
        );
    }

    #[test]
    fn redaction_drops_reasoning_and_criteria() {
        let result = EvaluationResult {
            scheme_id: "x".into(),
            dimension: "d".into(),
            value: ScoreValue::Float(4.0),
            label: "Gut".into(),
            reasoning: Some("Begründung".into()),
            confidence: 0.8,
            scale_info: ScaleInfo::Unknown,
            criteria: Some(Criteria::Gate(BTreeMap::new())),
            errored: false,
        };
        let redacted = result.redacted();
        assert!(redacted.reasoning.is_none());
        assert!(redacted.criteria.is_none());
        assert_eq!(redacted.label, "Gut");
    }
}
