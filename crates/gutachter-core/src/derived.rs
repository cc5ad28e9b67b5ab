//! Derived scheme resolution.
//!
//! Derived schemes make no judge call; their rules combine already-settled
//! dependency results. Rules are tried in declaration order and the first
//! rule whose conditions hold produces the result.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::result::{
    resolve_label, Criteria, DependencyDetail, EvaluationResult, ScaleInfo, UNRATED_LABEL,
};
use crate::scheme::{
    AggregateMethod, Condition, ConditionLogic, ConditionOperator, ConditionValue, Derived,
    DerivedRule, DerivedValue, Scheme, ScoreValue,
};

/// Resolve a derived scheme from its dependency results, given in the
/// declaration order of `scheme.dependencies`.
pub fn resolve(
    scheme: &Scheme,
    derived: &Derived,
    deps: &[Arc<EvaluationResult>],
) -> EvaluationResult {
    // Dimension lookup; the first dependency producing a dimension wins.
    let mut by_dimension: BTreeMap<&str, &EvaluationResult> = BTreeMap::new();
    for dep in deps {
        by_dimension.entry(dep.dimension.as_str()).or_insert(dep);
    }

    for rule in &derived.rules {
        if !conditions_hold(rule, &by_dimension) {
            continue;
        }

        let (value, method) = match &rule.value {
            DerivedValue::Literal(v) => (Some(*v), None),
            DerivedValue::Aggregate(method) => {
                (aggregate(*method, rule, deps, &by_dimension), Some(*method))
            }
        };

        // An aggregate without usable inputs (e.g. total weight 0) falls
        // through to the scheme default.
        let Some(value) = value else { break };
        let value = scheme.output_range.clamp(value);

        let reasoning = rule
            .reasoning
            .clone()
            .or_else(|| method.map(|m| describe_aggregate(m, value)));

        return EvaluationResult {
            scheme_id: scheme.id.clone(),
            dimension: scheme.dimension.clone(),
            value,
            label: resolve_label(&scheme.labels, value, rule.label.as_deref()),
            reasoning,
            confidence: rule.confidence.clamp(0.0, 1.0),
            scale_info: ScaleInfo::Derived {
                method: method
                    .map(|m| m.name().to_string())
                    .unwrap_or_else(|| "rule_based".to_string()),
                dependencies: scheme.dependencies.len(),
                weights: (!rule.weights.is_empty()).then(|| rule.weights.clone()),
            },
            criteria: Some(dependency_criteria(rule, deps)),
            errored: false,
        };
    }

    default_result(scheme, deps)
}

fn conditions_hold(rule: &DerivedRule, by_dimension: &BTreeMap<&str, &EvaluationResult>) -> bool {
    if rule.conditions.is_empty() {
        return true;
    }
    let mut met = rule
        .conditions
        .iter()
        .map(|condition| condition_met(condition, by_dimension));
    match rule.condition_logic {
        ConditionLogic::And => met.all(|m| m),
        ConditionLogic::Or => met.any(|m| m),
    }
}

fn condition_met(condition: &Condition, by_dimension: &BTreeMap<&str, &EvaluationResult>) -> bool {
    let Some(result) = by_dimension.get(condition.dimension.as_str()) else {
        return false;
    };
    let actual = result.value;

    let numeric = |expected: &ConditionValue| -> Option<(f64, f64)> {
        let ConditionValue::One(v) = expected else {
            return None;
        };
        Some((actual.as_f64()?, v.as_f64()?))
    };

    match condition.operator {
        ConditionOperator::Eq => match &condition.value {
            ConditionValue::One(v) => actual.loosely_eq(*v),
            ConditionValue::Many(_) => false,
        },
        ConditionOperator::Ne => match &condition.value {
            ConditionValue::One(v) => !actual.loosely_eq(*v),
            ConditionValue::Many(_) => false,
        },
        ConditionOperator::Gt => numeric(&condition.value).map(|(a, b)| a > b).unwrap_or(false),
        ConditionOperator::Ge => numeric(&condition.value)
            .map(|(a, b)| a >= b)
            .unwrap_or(false),
        ConditionOperator::Lt => numeric(&condition.value).map(|(a, b)| a < b).unwrap_or(false),
        ConditionOperator::Le => numeric(&condition.value)
            .map(|(a, b)| a <= b)
            .unwrap_or(false),
        ConditionOperator::In => members(&condition.value)
            .iter()
            .any(|v| actual.loosely_eq(*v)),
        ConditionOperator::NotIn => !members(&condition.value)
            .iter()
            .any(|v| actual.loosely_eq(*v)),
    }
}

fn members(value: &ConditionValue) -> Vec<ScoreValue> {
    match value {
        ConditionValue::Many(values) => values.clone(),
        ConditionValue::One(v) => vec![*v],
    }
}

fn aggregate(
    method: AggregateMethod,
    rule: &DerivedRule,
    deps: &[Arc<EvaluationResult>],
    by_dimension: &BTreeMap<&str, &EvaluationResult>,
) -> Option<ScoreValue> {
    match method {
        AggregateMethod::WeightedAverage => {
            let mut weighted = 0.0;
            let mut total = 0.0;
            for (dimension, result) in by_dimension {
                let Some(weight) = rule.weights.get(*dimension) else {
                    continue;
                };
                let Some(value) = result.value.as_f64() else {
                    continue;
                };
                weighted += value * weight;
                total += weight;
            }
            (total > 0.0).then(|| ScoreValue::Float(weighted / total))
        }
        AggregateMethod::Sum => {
            let values = numeric_values(deps);
            (!values.is_empty()).then(|| ScoreValue::Float(values.iter().sum()))
        }
        AggregateMethod::Min => numeric_values(deps)
            .into_iter()
            .fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.min(v)))
            })
            .map(ScoreValue::Float),
        AggregateMethod::Max => numeric_values(deps)
            .into_iter()
            .fold(None, |acc: Option<f64>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            })
            .map(ScoreValue::Float),
        AggregateMethod::AndGate => Some(ScoreValue::Bool(
            deps.iter()
                .filter_map(|dep| dep.value.as_bool())
                .all(|b| b),
        )),
        AggregateMethod::OrGate => Some(ScoreValue::Bool(
            deps.iter()
                .filter_map(|dep| dep.value.as_bool())
                .any(|b| b),
        )),
    }
}

fn numeric_values(deps: &[Arc<EvaluationResult>]) -> Vec<f64> {
    deps.iter().filter_map(|dep| dep.value.as_f64()).collect()
}

fn describe_aggregate(method: AggregateMethod, value: ScoreValue) -> String {
    match method {
        AggregateMethod::WeightedAverage => format!("Gewichteter Durchschnitt: {value}"),
        AggregateMethod::Sum => format!("Summe der Einzelwerte: {value}"),
        AggregateMethod::Min => format!("Niedrigster Einzelwert: {value}"),
        AggregateMethod::Max => format!("Höchster Einzelwert: {value}"),
        AggregateMethod::AndGate => format!("Alle Prüfungen bestanden: {value}"),
        AggregateMethod::OrGate => format!("Mindestens eine Prüfung bestanden: {value}"),
    }
}

fn dependency_criteria(rule: &DerivedRule, deps: &[Arc<EvaluationResult>]) -> Criteria {
    let mut criteria = BTreeMap::new();
    for dep in deps {
        criteria.insert(
            dep.scheme_id.clone(),
            DependencyDetail {
                weight: rule.weights.get(&dep.dimension).copied(),
                result: (**dep).clone(),
            },
        );
    }
    Criteria::Dependencies(criteria)
}

/// Outcome when no rule matched (or an aggregate had no usable inputs).
fn default_result(scheme: &Scheme, deps: &[Arc<EvaluationResult>]) -> EvaluationResult {
    let mut criteria = BTreeMap::new();
    for dep in deps {
        criteria.insert(
            dep.scheme_id.clone(),
            DependencyDetail {
                weight: None,
                result: (**dep).clone(),
            },
        );
    }

    let (value, label, reasoning, confidence) = match &scheme.default {
        Some(default) => (
            default.value,
            default.label.clone(),
            default.reasoning.clone(),
            default.confidence,
        ),
        None => (
            scheme.output_range.zero(),
            UNRATED_LABEL.to_string(),
            Some("Keine Ableitungsregel zutreffend".to_string()),
            0.0,
        ),
    };

    EvaluationResult {
        scheme_id: scheme.id.clone(),
        dimension: scheme.dimension.clone(),
        value,
        label,
        reasoning,
        confidence: confidence.clamp(0.0, 1.0),
        scale_info: ScaleInfo::Derived {
            method: "rule_based".to_string(),
            dependencies: scheme.dependencies.len(),
            weights: None,
        },
        criteria: Some(Criteria::Dependencies(criteria)),
        errored: scheme.default.is_none(),
    }
}
