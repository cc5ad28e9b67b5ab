//! In-memory scheme registry.
//!
//! The registry owns every loaded scheme, validated once at startup and
//! immutable afterwards. A registry that fails validation refuses to
//! construct; request handling never sees a structurally invalid scheme.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::scheme::{self, ContextType, Scheme, SchemeError, SchemeKind};

/// Startup-fatal validation errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Scheme(#[from] SchemeError),

    #[error("Duplicate scheme id: {0}")]
    DuplicateId(String),

    #[error("Scheme {scheme} depends on unknown scheme {dependency}")]
    UnknownDependency { scheme: String, dependency: String },

    #[error("Dependency cycle through scheme {0}")]
    DependencyCycle(String),

    #[error("Derived scheme {0} declares no dependencies")]
    MissingDependencies(String),

    #[error("Scheme {scheme} references dimension {dimension} not produced by any dependency")]
    UnproducedDimension { scheme: String, dimension: String },

    #[error("Scheme {scheme} is invalid: {detail}")]
    InvalidScheme { scheme: String, detail: String },
}

/// Filter for [`SchemeRegistry::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Restrict to one kind (`"ordinal_rubric"`, `"binary_gate"`, ...).
    pub kind: Option<String>,
    /// Whether split-part schemes (`*_partN`) are included. Hidden by default.
    pub include_parts: bool,
    /// Restrict to gates with at least one rule applicable under this
    /// context, plus derived schemes transitively depending on such a gate.
    pub context_type: Option<ContextType>,
}

#[derive(Debug)]
pub struct SchemeRegistry {
    schemes: BTreeMap<String, Arc<Scheme>>,
}

impl SchemeRegistry {
    /// Validate and index a set of schemes.
    pub fn new(schemes: Vec<Scheme>) -> Result<Self, RegistryError> {
        let mut indexed: BTreeMap<String, Arc<Scheme>> = BTreeMap::new();
        for scheme in schemes {
            let id = scheme.id.clone();
            if indexed.insert(id.clone(), Arc::new(scheme)).is_some() {
                return Err(RegistryError::DuplicateId(id));
            }
        }

        let registry = Self { schemes: indexed };
        registry.validate()?;
        Ok(registry)
    }

    /// Load every scheme file under `dir` and build a validated registry.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        Self::new(scheme::load_dir(dir)?)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Scheme>> {
        self.schemes.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }

    /// List schemes matching the filter, ordered by id.
    pub fn list(&self, filter: &ListFilter) -> Vec<Arc<Scheme>> {
        self.schemes
            .values()
            .filter(|scheme| filter.include_parts || !is_part_id(&scheme.id))
            .filter(|scheme| {
                filter
                    .kind
                    .as_deref()
                    .map(|kind| scheme.kind_name() == kind)
                    .unwrap_or(true)
            })
            .filter(|scheme| {
                filter
                    .context_type
                    .map(|context| self.matches_context(scheme, context))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    fn matches_context(&self, scheme: &Scheme, context: ContextType) -> bool {
        match &scheme.kind {
            SchemeKind::BinaryGate(gate) => gate
                .gate_rules
                .iter()
                .any(|rule| rule.scope.applies(context)),
            SchemeKind::Derived(_) => scheme.dependencies.iter().any(|dep| {
                self.get(dep)
                    .map(|dep| self.matches_context(&dep, context))
                    .unwrap_or(false)
            }),
            _ => false,
        }
    }

    fn validate(&self) -> Result<(), RegistryError> {
        for scheme in self.schemes.values() {
            self.validate_scheme(scheme)?;
        }
        self.check_acyclic()?;
        for scheme in self.schemes.values() {
            if let SchemeKind::Derived(derived) = &scheme.kind {
                self.check_dimension_closure(scheme, derived)?;
            }
        }
        Ok(())
    }

    fn validate_scheme(&self, scheme: &Scheme) -> Result<(), RegistryError> {
        for dependency in &scheme.dependencies {
            if !self.schemes.contains_key(dependency) {
                return Err(RegistryError::UnknownDependency {
                    scheme: scheme.id.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        match &scheme.kind {
            SchemeKind::Derived(derived) => {
                if scheme.dependencies.is_empty() {
                    return Err(RegistryError::MissingDependencies(scheme.id.clone()));
                }
                if derived.rules.is_empty() && scheme.default.is_none() {
                    return Err(RegistryError::InvalidScheme {
                        scheme: scheme.id.clone(),
                        detail: "derived scheme needs rules or a default".to_string(),
                    });
                }
            }
            SchemeKind::ChecklistAdditive(checklist) => {
                if checklist.items.is_empty() {
                    return Err(RegistryError::InvalidScheme {
                        scheme: scheme.id.clone(),
                        detail: "checklist has no items".to_string(),
                    });
                }
                if checklist.aggregator.scale_factor <= 0.0 {
                    return Err(RegistryError::InvalidScheme {
                        scheme: scheme.id.clone(),
                        detail: "scale_factor must be > 0".to_string(),
                    });
                }
                for item in &checklist.items {
                    if item.weight <= 0.0 {
                        return Err(RegistryError::InvalidScheme {
                            scheme: scheme.id.clone(),
                            detail: format!("item {} has non-positive weight", item.id),
                        });
                    }
                    for (level, spec) in &item.values {
                        if !(0.0..=1.0).contains(&spec.score) {
                            return Err(RegistryError::InvalidScheme {
                                scheme: scheme.id.clone(),
                                detail: format!(
                                    "item {} level {} score {} outside [0, 1]",
                                    item.id, level, spec.score
                                ),
                            });
                        }
                    }
                }
            }
            SchemeKind::BinaryGate(gate) => {
                if gate.gate_rules.is_empty() {
                    return Err(RegistryError::InvalidScheme {
                        scheme: scheme.id.clone(),
                        detail: "gate has no rules".to_string(),
                    });
                }
            }
            SchemeKind::OrdinalRubric(rubric) => {
                if rubric.anchors.is_empty() {
                    return Err(RegistryError::InvalidScheme {
                        scheme: scheme.id.clone(),
                        detail: "rubric has no anchors".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Depth-first search over dependency edges; a back edge is a cycle.
    fn check_acyclic(&self) -> Result<(), RegistryError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            registry: &SchemeRegistry,
            id: &str,
            marks: &mut HashMap<String, Mark>,
        ) -> Result<(), RegistryError> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    return Err(RegistryError::DependencyCycle(id.to_string()))
                }
                None => {}
            }
            marks.insert(id.to_string(), Mark::Visiting);
            if let Some(scheme) = registry.get(id) {
                for dependency in &scheme.dependencies {
                    visit(registry, dependency, marks)?;
                }
            }
            marks.insert(id.to_string(), Mark::Done);
            Ok(())
        }

        let mut marks = HashMap::new();
        for id in self.schemes.keys() {
            visit(self, id, &mut marks)?;
        }
        Ok(())
    }

    /// Every dimension a derived rule references must be produced by some
    /// transitive dependency.
    fn check_dimension_closure(
        &self,
        scheme: &Scheme,
        derived: &crate::scheme::Derived,
    ) -> Result<(), RegistryError> {
        let mut produced = HashSet::new();
        let mut stack: Vec<String> = scheme.dependencies.clone();
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(dep) = self.get(&id) {
                produced.insert(dep.dimension.clone());
                stack.extend(dep.dependencies.iter().cloned());
            }
        }

        let referenced = derived.rules.iter().flat_map(|rule| {
            rule.conditions
                .iter()
                .map(|c| c.dimension.as_str())
                .chain(rule.weights.keys().map(|k| k.as_str()))
        });
        for dimension in referenced {
            if !produced.contains(dimension) {
                return Err(RegistryError::UnproducedDimension {
                    scheme: scheme.id.clone(),
                    dimension: dimension.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Split-part schemes follow the `<base>_part<N>` naming convention.
fn is_part_id(id: &str) -> bool {
    id.rfind("_part")
        .map(|pos| {
            let tail = &id[pos + "_part".len()..];
            !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit())
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ordinal(id: &str, dimension: &str) -> Scheme {
        serde_yaml::from_str(&format!(
            r#"
id: {id}
name: "{id}"
dimension: {dimension}
type: ordinal_rubric
output_range: {{min: 0, max: 5, type: int}}
anchors:
  - {{value: 5, label: "Sehr gut"}}
  - {{value: 0, label: "Ungenügend"}}
"#
        ))
        .unwrap()
    }

    fn derived(id: &str, dependencies: &[&str], dimension_ref: &str) -> Scheme {
        serde_yaml::from_str(&format!(
            r#"
id: {id}
name: "{id}"
dimension: {id}
type: derived
dependencies: [{deps}]
rules:
  - conditions:
      - {{dimension: {dimension_ref}, operator: ">=", value: 0}}
    value: weighted_average
    weights: {{{dimension_ref}: 1.0}}
"#,
            deps = dependencies.join(", ")
        ))
        .unwrap()
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let err = SchemeRegistry::new(vec![ordinal("a", "x"), ordinal("a", "y")]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = SchemeRegistry::new(vec![derived("d", &["missing"], "x")]).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownDependency { .. }));
    }

    #[test]
    fn cycle_is_rejected_deterministically() {
        let mut a = derived("a", &["b"], "b");
        let mut b = derived("b", &["a"], "a");
        // Point the dimensions at each other so closure checking would pass.
        a.dimension = "b".into();
        b.dimension = "a".into();
        for _ in 0..3 {
            let err = SchemeRegistry::new(vec![a.clone(), b.clone()]).unwrap_err();
            assert!(matches!(err, RegistryError::DependencyCycle(_)));
        }
    }

    #[test]
    fn unproduced_dimension_is_rejected() {
        let schemes = vec![ordinal("leaf", "neutrality"), derived("d", &["leaf"], "factuality")];
        let err = SchemeRegistry::new(schemes).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnproducedDimension { dimension, .. } if dimension == "factuality"
        ));
    }

    #[test]
    fn transitive_dimension_is_accepted() {
        let schemes = vec![
            ordinal("leaf", "neutrality"),
            derived("mid", &["leaf"], "neutrality"),
            derived("top", &["mid"], "neutrality"),
        ];
        assert!(SchemeRegistry::new(schemes).is_ok());
    }

    #[test]
    fn part_schemes_are_hidden_by_default() {
        let registry = SchemeRegistry::new(vec![
            ordinal("neutralitaet", "neutrality"),
            ordinal("neutralitaet_part1", "neutrality"),
        ])
        .unwrap();

        let visible = registry.list(&ListFilter::default());
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "neutralitaet");

        let all = registry.list(&ListFilter {
            include_parts: true,
            ..ListFilter::default()
        });
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn part_id_detection() {
        assert!(is_part_id("gate_part1"));
        assert!(is_part_id("gate_part12"));
        assert!(!is_part_id("gate_part"));
        assert!(!is_part_id("gate_partx"));
        assert!(!is_part_id("gate"));
    }

    #[test]
    fn shipped_scheme_catalogue_validates() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/../../schemes");
        let registry = SchemeRegistry::load_dir(dir).expect("shipped schemes are valid");
        assert_eq!(registry.len(), 8);
        assert!(registry.get("overall_quality").is_some());
        assert!(registry.get("rechtliche_compliance").is_some());

        // The compliance roll-up is reachable from every context because its
        // gates carry content, platform and both-scoped rules.
        for context in [ContextType::Content, ContextType::Platform, ContextType::Both] {
            let listed = registry.list(&ListFilter {
                context_type: Some(context),
                ..ListFilter::default()
            });
            assert!(listed.iter().any(|s| s.id == "rechtliche_compliance"));
        }
    }

    #[test]
    fn context_filter_selects_gates_and_dependents() {
        let gate: Scheme = serde_yaml::from_str(
            r#"
id: platform_gate
name: "Plattform"
dimension: platform_gate
type: binary_gate
output_range: {min: 0, max: 1, type: boolean}
gate_rules:
  - {id: r1, description: "Metadaten fehlen", scope: platform}
"#,
        )
        .unwrap();
        let registry = SchemeRegistry::new(vec![
            gate,
            ordinal("leaf", "neutrality"),
        ])
        .unwrap();

        let content = registry.list(&ListFilter {
            context_type: Some(ContextType::Content),
            ..ListFilter::default()
        });
        assert!(content.is_empty());

        let platform = registry.list(&ListFilter {
            context_type: Some(ContextType::Platform),
            ..ListFilter::default()
        });
        assert_eq!(platform.len(), 1);
        assert_eq!(platform[0].id, "platform_gate");
    }
}
