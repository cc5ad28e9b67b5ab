//! Ordinal rubric resolution.

use crate::result::{resolve_label, EvaluationResult, ScaleInfo};
use crate::scheme::{Anchor, OrdinalRubric, Scheme, ScoreValue, SelectionStrategy};

/// The judge's anchor selection for an ordinal rubric.
#[derive(Debug, Clone)]
pub struct AnchorSelection {
    pub value: i64,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,
}

/// Shape the judged anchor selection into a result.
///
/// `first_match` snaps onto the closest declared anchor (the prompt walks
/// anchors top-down, so the judge answer names one of them); `best_fit`
/// accepts the judged value as-is, clamped into the output range.
pub fn resolve(
    scheme: &Scheme,
    rubric: &OrdinalRubric,
    selection: &AnchorSelection,
) -> EvaluationResult {
    let anchor = closest_anchor(&rubric.anchors, selection.value);

    let value = match rubric.selection_strategy {
        SelectionStrategy::FirstMatch => anchor
            .map(|a| ScoreValue::Int(a.value))
            .unwrap_or(ScoreValue::Int(selection.value)),
        SelectionStrategy::BestFit => ScoreValue::Int(selection.value),
    };
    let value = scheme.output_range.clamp(value);

    let anchor_label = anchor.map(|a| a.label.as_str());

    EvaluationResult {
        scheme_id: scheme.id.clone(),
        dimension: scheme.dimension.clone(),
        value,
        label: resolve_label(&scheme.labels, value, anchor_label),
        reasoning: selection.reasoning.clone(),
        confidence: selection.confidence.unwrap_or(0.8).clamp(0.0, 1.0),
        scale_info: ScaleInfo::Ordinal {
            range: scheme.output_range.clone(),
            anchors: rubric.anchors.len(),
        },
        criteria: None,
        errored: false,
    }
}

fn closest_anchor(anchors: &[Anchor], value: i64) -> Option<&Anchor> {
    anchors
        .iter()
        .find(|a| a.value == value)
        .or_else(|| anchors.iter().min_by_key(|a| (a.value - value).unsigned_abs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::SchemeKind;

    fn scheme(strategy: &str) -> (Scheme, OrdinalRubric) {
        let yaml = format!(
            r#"
id: neutralitaet_old
name: "Neutralität"
dimension: neutrality
type: ordinal_rubric
output_range: {{min: 0, max: 5, type: int}}
selection_strategy: {strategy}
anchors:
  - {{value: 5, label: "Vollständig neutral", criteria: "Keine Wertung erkennbar"}}
  - {{value: 4, label: "Weitgehend neutral", criteria: "Vereinzelte Färbung"}}
  - {{value: 1, label: "Stark gefärbt", criteria: "Durchgehend wertend"}}
"#
        );
        let scheme: Scheme = serde_yaml::from_str(&yaml).unwrap();
        let rubric = match &scheme.kind {
            SchemeKind::OrdinalRubric(r) => r.clone(),
            other => panic!("unexpected kind: {other:?}"),
        };
        (scheme, rubric)
    }

    #[test]
    fn exact_anchor_match_keeps_label_and_confidence() {
        let (scheme, rubric) = scheme("best_fit");
        let result = resolve(
            &scheme,
            &rubric,
            &AnchorSelection {
                value: 4,
                reasoning: Some("x".into()),
                confidence: Some(0.88),
            },
        );
        assert_eq!(result.value, ScoreValue::Int(4));
        assert_eq!(result.label, "Weitgehend neutral");
        assert_eq!(result.confidence, 0.88);
    }

    #[test]
    fn first_match_snaps_to_declared_anchor() {
        let (scheme, rubric) = scheme("first_match");
        let result = resolve(
            &scheme,
            &rubric,
            &AnchorSelection {
                value: 3,
                reasoning: None,
                confidence: None,
            },
        );
        // 3 is undeclared; the closest anchor is 4.
        assert_eq!(result.value, ScoreValue::Int(4));
        assert_eq!(result.label, "Weitgehend neutral");
        assert_eq!(result.confidence, 0.8);
    }

    #[test]
    fn best_fit_keeps_judged_value_within_range() {
        let (scheme, rubric) = scheme("best_fit");
        let result = resolve(
            &scheme,
            &rubric,
            &AnchorSelection {
                value: 3,
                reasoning: None,
                confidence: Some(0.6),
            },
        );
        assert_eq!(result.value, ScoreValue::Int(3));
        // No exact anchor and no labels map: closest anchor's label applies.
        assert_eq!(result.label, "Weitgehend neutral");
    }

    #[test]
    fn out_of_range_value_is_clamped() {
        let (scheme, rubric) = scheme("best_fit");
        let result = resolve(
            &scheme,
            &rubric,
            &AnchorSelection {
                value: 11,
                reasoning: None,
                confidence: Some(2.5),
            },
        );
        assert_eq!(result.value, ScoreValue::Int(5));
        assert_eq!(result.confidence, 1.0);
    }
}
