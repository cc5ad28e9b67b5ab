//! Evaluation scheme model.
//!
//! Schemes are authored as YAML, one file per scheme. Every scheme carries a
//! shared envelope (id, dimension, output range, labels) plus a kind-specific
//! payload selected by the `type` field. The four kinds share one result
//! shape; kind dispatch happens in the evaluator, never via downcasting.

mod loader;

pub use loader::{load_dir, SchemeError};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request-side classification selecting which gate rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextType {
    #[default]
    Content,
    Platform,
    Both,
}

/// Classification of a single gate rule. Rules without an explicit scope
/// apply in every context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    Content,
    Platform,
    #[default]
    Both,
}

impl RuleScope {
    /// Whether a rule with this scope is evaluated under the given context.
    pub fn applies(self, context: ContextType) -> bool {
        match context {
            ContextType::Both => true,
            ContextType::Content => matches!(self, RuleScope::Content | RuleScope::Both),
            ContextType::Platform => matches!(self, RuleScope::Platform | RuleScope::Both),
        }
    }
}

/// A scalar produced by an evaluation: boolean for gates, integer for
/// rubric anchors, float for aggregated scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl ScoreValue {
    pub fn as_f64(self) -> Option<f64> {
        match self {
            ScoreValue::Bool(_) => None,
            ScoreValue::Int(i) => Some(i as f64),
            ScoreValue::Float(f) => Some(f),
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            ScoreValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Numeric comparison treats `4` and `4.0` as equal; booleans only
    /// compare against booleans.
    pub fn loosely_eq(self, other: ScoreValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => self.as_bool() == other.as_bool() && self.as_bool().is_some(),
        }
    }
}

impl std::fmt::Display for ScoreValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreValue::Bool(b) => write!(f, "{b}"),
            ScoreValue::Int(i) => write!(f, "{i}"),
            ScoreValue::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Value type of a numeric output range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Int,
    #[default]
    Float,
    Boolean,
}

/// The set of values a scheme may produce, either a numeric interval or an
/// explicit enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputRange {
    Enumerated {
        values: Vec<ScoreValue>,
    },
    Numeric {
        min: f64,
        max: f64,
        #[serde(rename = "type", default)]
        value_type: ValueType,
    },
}

impl Default for OutputRange {
    fn default() -> Self {
        OutputRange::Numeric {
            min: 0.0,
            max: 5.0,
            value_type: ValueType::Float,
        }
    }
}

impl OutputRange {
    pub fn contains(&self, value: ScoreValue) -> bool {
        match self {
            OutputRange::Enumerated { values } => values.iter().any(|v| v.loosely_eq(value)),
            OutputRange::Numeric { value_type, .. } if *value_type == ValueType::Boolean => {
                value.as_bool().is_some()
            }
            OutputRange::Numeric { min, max, .. } => value
                .as_f64()
                .map(|v| v >= *min && v <= *max)
                .unwrap_or(false),
        }
    }

    /// Force a numeric value into the range, preserving the declared value
    /// type. Booleans and enumerated ranges pass through unchanged.
    pub fn clamp(&self, value: ScoreValue) -> ScoreValue {
        match (self, value.as_f64()) {
            (
                OutputRange::Numeric {
                    min,
                    max,
                    value_type,
                },
                Some(v),
            ) if *value_type != ValueType::Boolean => {
                let clamped = v.clamp(*min, *max);
                match value_type {
                    ValueType::Int => ScoreValue::Int(clamped.round() as i64),
                    _ => ScoreValue::Float(clamped),
                }
            }
            _ => value,
        }
    }

    /// Neutral fallback value used when an evaluation fails and the scheme
    /// declares no default.
    pub fn zero(&self) -> ScoreValue {
        match self {
            OutputRange::Numeric { value_type, .. } if *value_type == ValueType::Boolean => {
                ScoreValue::Bool(false)
            }
            OutputRange::Numeric { value_type, .. } if *value_type == ValueType::Int => {
                ScoreValue::Int(0)
            }
            OutputRange::Numeric { .. } => ScoreValue::Float(0.0),
            OutputRange::Enumerated { values } => {
                values.first().copied().unwrap_or(ScoreValue::Float(0.0))
            }
        }
    }
}

/// Outcome emitted when an evaluation fails or no derived rule matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackOutcome {
    pub value: ScoreValue,
    #[serde(default = "default_fallback_label")]
    pub label: String,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub confidence: f64,
}

fn default_fallback_label() -> String {
    "Unbewertet".to_string()
}

/// An evaluation scheme: common envelope plus kind-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scheme {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub dimension: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub output_range: OutputRange,
    /// Labels keyed by exact value (`"4"`, `"true"`) or inclusive numeric
    /// range (`"3.5-4.4"`).
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub default: Option<FallbackOutcome>,
    /// Required for derived schemes, empty otherwise.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(flatten)]
    pub kind: SchemeKind,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Scheme {
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            SchemeKind::OrdinalRubric(_) => "ordinal_rubric",
            SchemeKind::ChecklistAdditive(_) => "checklist_additive",
            SchemeKind::BinaryGate(_) => "binary_gate",
            SchemeKind::Derived(_) => "derived",
        }
    }

    pub fn is_gate(&self) -> bool {
        matches!(self.kind, SchemeKind::BinaryGate(_))
    }
}

/// Kind-specific payload, selected by the `type` field in YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemeKind {
    OrdinalRubric(OrdinalRubric),
    ChecklistAdditive(ChecklistAdditive),
    BinaryGate(BinaryGate),
    Derived(Derived),
}

/// Ordered anchor rubric; anchors are listed from best to worst.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdinalRubric {
    pub anchors: Vec<Anchor>,
    #[serde(default)]
    pub selection_strategy: SelectionStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    pub value: i64,
    pub label: String,
    #[serde(default, alias = "description")]
    pub criteria: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    #[default]
    FirstMatch,
    BestFit,
}

/// Weighted checklist; one judge call rates every item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistAdditive {
    pub items: Vec<ChecklistItem>,
    #[serde(default)]
    pub aggregator: Aggregator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub prompt: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Rating levels mapped to a normalized score in `[0, 1]`.
    pub values: BTreeMap<i64, LevelSpec>,
    #[serde(default)]
    pub allow_na: bool,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelSpec {
    pub score: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aggregator {
    #[serde(default)]
    pub strategy: AggregationStrategy,
    #[serde(default)]
    pub missing: MissingStrategy,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            strategy: AggregationStrategy::default(),
            missing: MissingStrategy::default(),
            scale_factor: default_scale_factor(),
        }
    }
}

fn default_scale_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    #[default]
    WeightedMean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingStrategy {
    #[default]
    Ignore,
    Zero,
}

/// Ordered reject/pass rules with short-circuit semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryGate {
    #[serde(alias = "rules")]
    pub gate_rules: Vec<GateRule>,
    #[serde(default)]
    pub default_action: GateAction,
    #[serde(default)]
    pub gate_logic: GateLogic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateAction {
    #[default]
    Pass,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateLogic {
    And,
    #[default]
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateRule {
    pub id: String,
    pub description: String,
    #[serde(default = "default_rule_action")]
    pub action: GateAction,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub legal_reference: Option<String>,
    #[serde(default)]
    pub scope: RuleScope,
    #[serde(default)]
    pub trigger_keywords: Vec<String>,
    #[serde(default)]
    pub not_trigger_keywords: Vec<String>,
    #[serde(default)]
    pub evaluation_hint: Option<String>,
    #[serde(default = "default_rule_confidence")]
    pub confidence: f64,
}

fn default_rule_action() -> GateAction {
    GateAction::Reject
}

fn default_rule_confidence() -> f64 {
    0.9
}

/// Purely computed scheme; its rules combine already-settled dependency
/// results, no judge call is made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Derived {
    pub rules: Vec<DerivedRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedRule {
    #[serde(default)]
    pub condition_logic: ConditionLogic,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub value: DerivedValue,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default = "default_rule_confidence")]
    pub confidence: f64,
    /// Per-dimension weights, only consulted for `weighted_average`.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConditionLogic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub dimension: String,
    pub operator: ConditionOperator,
    pub value: ConditionValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Many(Vec<ScoreValue>),
    One(ScoreValue),
}

/// What a matched derived rule produces: a literal or an aggregate over the
/// dependency results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DerivedValue {
    Aggregate(AggregateMethod),
    Literal(ScoreValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMethod {
    WeightedAverage,
    Sum,
    Min,
    Max,
    AndGate,
    OrGate,
}

impl AggregateMethod {
    pub fn name(self) -> &'static str {
        match self {
            AggregateMethod::WeightedAverage => "weighted_average",
            AggregateMethod::Sum => "sum",
            AggregateMethod::Min => "min",
            AggregateMethod::Max => "max",
            AggregateMethod::AndGate => "and_gate",
            AggregateMethod::OrGate => "or_gate",
        }
    }
}
