//! Binary gate resolution.
//!
//! The judge reports, per rule, whether it triggered. Everything after that
//! is deterministic: rules are walked in declaration order and the first
//! triggered reject rule decides the outcome.

use std::collections::BTreeMap;

use crate::result::{resolve_label, Criteria, EvaluationResult, RuleDetail, ScaleInfo};
use crate::scheme::{BinaryGate, ContextType, GateAction, GateLogic, GateRule, Scheme, ScoreValue};

/// Per-rule verdict parsed from the judge response.
#[derive(Debug, Clone, Default)]
pub struct RuleTrigger {
    pub triggered: bool,
    pub reasoning: Option<String>,
}

/// Rules that remain under the request context. Scope filtering is a pure
/// function of rule and context; the scheme itself is context-free.
pub fn applicable_rules(gate: &BinaryGate, context: ContextType) -> Vec<&GateRule> {
    gate.gate_rules
        .iter()
        .filter(|rule| rule.scope.applies(context))
        .collect()
}

/// Resolve the gate outcome from the judge's per-rule triggers.
///
/// A rule absent from `triggers` counts as not triggered.
pub fn resolve(
    scheme: &Scheme,
    gate: &BinaryGate,
    context: ContextType,
    triggers: &BTreeMap<String, RuleTrigger>,
) -> EvaluationResult {
    let rules = applicable_rules(gate, context);

    let triggered = |rule: &GateRule| {
        triggers
            .get(&rule.id)
            .map(|t| t.triggered)
            .unwrap_or(false)
    };

    let mut criteria = BTreeMap::new();
    for rule in &rules {
        criteria.insert(
            rule.id.clone(),
            RuleDetail {
                triggered: triggered(rule),
                description: rule.description.clone(),
                severity: rule.severity.clone(),
                legal_reference: rule.legal_reference.clone(),
                reasoning: triggers.get(&rule.id).and_then(|t| t.reasoning.clone()),
            },
        );
    }

    let reject_rules: Vec<&&GateRule> = rules
        .iter()
        .filter(|rule| rule.action == GateAction::Reject)
        .collect();
    let first_triggered_reject = reject_rules.iter().find(|rule| triggered(rule)).copied();

    let failed = match gate.gate_logic {
        GateLogic::Or => first_triggered_reject.is_some(),
        GateLogic::And => {
            !reject_rules.is_empty() && reject_rules.iter().all(|rule| triggered(rule))
        }
    };

    let scale_info = ScaleInfo::Gate {
        rules: gate.gate_rules.len(),
    };

    if failed {
        if let Some(rule) = first_triggered_reject {
            let reason = if rule.reason.is_empty() {
                rule.description.clone()
            } else {
                rule.reason.clone()
            };
            return EvaluationResult {
                scheme_id: scheme.id.clone(),
                dimension: scheme.dimension.clone(),
                value: ScoreValue::Bool(false),
                label: resolve_label(
                    &scheme.labels,
                    ScoreValue::Bool(false),
                    Some("NICHT BESTANDEN"),
                ),
                reasoning: Some(reason),
                confidence: rule.confidence.clamp(0.0, 1.0),
                scale_info,
                criteria: Some(Criteria::Gate(criteria)),
                errored: false,
            };
        }
    }

    let passed = gate.default_action == GateAction::Pass;
    let value = ScoreValue::Bool(passed);
    let fallback = if passed { "BESTANDEN" } else { "NICHT BESTANDEN" };
    EvaluationResult {
        scheme_id: scheme.id.clone(),
        dimension: scheme.dimension.clone(),
        value,
        label: resolve_label(&scheme.labels, value, Some(fallback)),
        reasoning: Some(if passed {
            "Keine Ausschlussregel ausgelöst".to_string()
        } else {
            "Standardaktion des Gates".to_string()
        }),
        confidence: 0.9,
        scale_info,
        criteria: Some(Criteria::Gate(criteria)),
        errored: false,
    }
}
