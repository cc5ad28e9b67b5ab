//! # gutachter-core
//!
//! Deterministic half of the gutachter content evaluator: the scheme model,
//! the validated registry, and the scoring logic that turns judged partial
//! results into the uniform [`EvaluationResult`] shape.
//!
//! ## Key guarantees
//!
//! 1. **Validated at startup**: a registry only constructs from a scheme set
//!    with unique ids, resolvable dependencies and an acyclic graph.
//! 2. **No LLM calls**: everything here is pure; judge traffic lives in
//!    `gutachter-runtime`.
//! 3. **Uniform results**: all four scheme kinds settle into the same
//!    result shape, so derived schemes can nest anything.

pub mod checklist;
pub mod derived;
pub mod gate;
pub mod registry;
pub mod result;
pub mod rubric;
pub mod scheme;

pub use registry::{ListFilter, RegistryError, SchemeRegistry};
pub use result::{
    resolve_label, scale_info_for, Criteria, DependencyDetail, EvaluationResult, ItemDetail,
    RuleDetail, ScaleInfo, UNRATED_LABEL,
};
pub use scheme::{
    AggregateMethod, Aggregator, Anchor, BinaryGate, ChecklistAdditive, ChecklistItem, Condition,
    ConditionLogic, ConditionOperator, ConditionValue, ContextType, Derived, DerivedRule,
    DerivedValue, FallbackOutcome, GateAction, GateLogic, GateRule, LevelSpec, MissingStrategy,
    OrdinalRubric, OutputRange, RuleScope, Scheme, SchemeError, SchemeKind, ScoreValue,
    SelectionStrategy, ValueType,
};
