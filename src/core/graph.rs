//! Pipeline graph - validated, immutable-once-built DAG of steps

use crate::core::step::{InputRef, PipelineStep};
use crate::oracle::SchemaCatalog;
use indexmap::IndexMap;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while building a [`PipelineGraph`]
///
/// All of these are fatal: a graph that fails validation is never
/// returned and nothing runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Two steps share an id
    #[error("duplicate step id \"{id}\"")]
    DuplicateStepId { id: String },

    /// A dependency references a step that is not in the graph
    #[error("step \"{step}\" depends on unknown step \"{missing}\"")]
    DanglingDependency { step: String, missing: String },

    /// The dependency relation contains a cycle
    #[error("dependency cycle: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A step input references an unknown output or external resource
    #[error("step \"{step}\" references unknown {name}{}", .suggestion
        .as_ref()
        .map(|s| format!(" (did you mean \"{}\"?)", s))
        .unwrap_or_default())]
    UnknownReference {
        step: String,
        name: String,
        suggestion: Option<String>,
    },
}

/// A validated DAG of pipeline steps
///
/// Built once via [`PipelineGraph::build`]; there is no mutation API.
/// Graphs are handed to the executor for one run and discarded.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    steps: IndexMap<String, PipelineStep>,
    dependents: IndexMap<String, Vec<String>>,
}

impl PipelineGraph {
    /// Validate a step list into a graph
    ///
    /// Checks, in order: id uniqueness, dependency referential
    /// integrity, acyclicity (DFS colour-marking), and - when a
    /// catalog is supplied - that external table/column references
    /// resolve. Output-name references are always checked against the
    /// outputs declared by steps in the same list. None of these
    /// checks run again during execution.
    pub fn build(
        steps: Vec<PipelineStep>,
        catalog: Option<&dyn SchemaCatalog>,
    ) -> Result<Self, ValidationError> {
        let mut map: IndexMap<String, PipelineStep> = IndexMap::with_capacity(steps.len());
        for step in steps {
            if map.contains_key(&step.id) {
                return Err(ValidationError::DuplicateStepId { id: step.id });
            }
            map.insert(step.id.clone(), step);
        }

        for step in map.values() {
            for dep in &step.dependencies {
                if !map.contains_key(dep) {
                    return Err(ValidationError::DanglingDependency {
                        step: step.id.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = find_cycle(&map) {
            return Err(ValidationError::CyclicDependency { cycle });
        }

        check_references(&map, catalog)?;

        let mut dependents: IndexMap<String, Vec<String>> =
            map.keys().map(|id| (id.clone(), Vec::new())).collect();
        for step in map.values() {
            for dep in &step.dependencies {
                if let Some(list) = dependents.get_mut(dep) {
                    list.push(step.id.clone());
                }
            }
        }

        Ok(Self {
            steps: map,
            dependents,
        })
    }

    /// Get a step by id
    pub fn step(&self, id: &str) -> Option<&PipelineStep> {
        self.steps.get(id)
    }

    /// All steps, in insertion order
    pub fn steps(&self) -> impl Iterator<Item = &PipelineStep> {
        self.steps.values()
    }

    /// All step ids, in insertion order
    pub fn step_ids(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(|id| id.as_str())
    }

    /// Steps that directly depend on the given step
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.dependents.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if the graph holds no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Gray,
    Black,
}

/// DFS colour-marking over the dependency relation; returns the first
/// cycle found as a step sequence closed on the repeated id.
fn find_cycle(steps: &IndexMap<String, PipelineStep>) -> Option<Vec<String>> {
    let mut colour: HashMap<&str, Colour> =
        steps.keys().map(|id| (id.as_str(), Colour::White)).collect();
    let mut stack: Vec<String> = Vec::new();

    for id in steps.keys() {
        if colour[id.as_str()] == Colour::White {
            if let Some(cycle) = visit(id, steps, &mut colour, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit<'a>(
    id: &'a str,
    steps: &'a IndexMap<String, PipelineStep>,
    colour: &mut HashMap<&'a str, Colour>,
    stack: &mut Vec<String>,
) -> Option<Vec<String>> {
    colour.insert(id, Colour::Gray);
    stack.push(id.to_string());

    if let Some(step) = steps.get(id) {
        for dep in &step.dependencies {
            match colour.get(dep.as_str()).copied().unwrap_or(Colour::White) {
                // back-edge to a node on the current path
                Colour::Gray => {
                    let start = stack.iter().position(|s| s == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..].to_vec();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
                Colour::White => {
                    let dep_id = steps
                        .get_full(dep.as_str())
                        .map(|(_, k, _)| k.as_str())
                        .unwrap_or(dep.as_str());
                    if let Some(cycle) = visit(dep_id, steps, colour, stack) {
                        return Some(cycle);
                    }
                }
                Colour::Black => {}
            }
        }
    }

    stack.pop();
    colour.insert(id, Colour::Black);
    None
}

/// Validate input references: output names against the outputs declared
/// in the same list, external tables/columns against the catalog when
/// one is supplied.
fn check_references(
    steps: &IndexMap<String, PipelineStep>,
    catalog: Option<&dyn SchemaCatalog>,
) -> Result<(), ValidationError> {
    let declared_outputs: Vec<&str> = steps
        .values()
        .filter_map(|s| s.output.as_deref())
        .collect();

    for step in steps.values() {
        for input in &step.inputs {
            match input {
                InputRef::Output(name) => {
                    if !declared_outputs.contains(&name.as_str()) {
                        return Err(ValidationError::UnknownReference {
                            step: step.id.clone(),
                            name: format!("output \"{}\"", name),
                            suggestion: nearest(name, declared_outputs.iter().copied()),
                        });
                    }
                }
                InputRef::Table(table) => {
                    if let Some(catalog) = catalog {
                        if !catalog.table_exists(table) {
                            return Err(ValidationError::UnknownReference {
                                step: step.id.clone(),
                                name: format!("table \"{}\"", table),
                                suggestion: nearest(
                                    table,
                                    catalog.table_names().iter().map(|t| t.as_str()),
                                ),
                            });
                        }
                    }
                }
                InputRef::Column { table, column } => {
                    if let Some(catalog) = catalog {
                        match catalog.columns_of(table) {
                            None => {
                                return Err(ValidationError::UnknownReference {
                                    step: step.id.clone(),
                                    name: format!("table \"{}\"", table),
                                    suggestion: nearest(
                                        table,
                                        catalog.table_names().iter().map(|t| t.as_str()),
                                    ),
                                });
                            }
                            Some(columns) => {
                                if !columns.iter().any(|c| c.name == *column) {
                                    return Err(ValidationError::UnknownReference {
                                        step: step.id.clone(),
                                        name: format!("column \"{}.{}\"", table, column),
                                        suggestion: nearest(
                                            column,
                                            columns.iter().map(|c| c.name.as_str()),
                                        ),
                                    });
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Nearest known name by edit distance, offered only when the distance
/// is at most half the unknown name's length (anything further is
/// noise rather than a likely typo).
fn nearest<'a>(target: &str, candidates: impl Iterator<Item = &'a str>) -> Option<String> {
    let threshold = (target.len() / 2).max(1);
    candidates
        .map(|c| (edit_distance(target, c), c))
        .filter(|(d, _)| *d <= threshold)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.to_string())
}

/// Levenshtein distance
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::InMemorySchemaCatalog;

    fn step(id: &str, deps: &[&str]) -> PipelineStep {
        PipelineStep::new(id, "query")
            .with_dependencies(deps.iter().map(|d| d.to_string()).collect())
    }

    #[test]
    fn test_build_valid_dag() {
        let graph = PipelineGraph::build(
            vec![step("a", &[]), step("b", &["a"]), step("c", &["a", "b"])],
            None,
        )
        .unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.dependents_of("a"), &["b".to_string(), "c".to_string()]);
        let ids: Vec<&str> = graph.step_ids().collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = PipelineGraph::build(vec![step("a", &[]), step("a", &[])], None).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateStepId { id } if id == "a"));
    }

    #[test]
    fn test_dangling_dependency_names_step_and_missing_id() {
        let err = PipelineGraph::build(vec![step("a", &["ghost"])], None).unwrap_err();
        match err {
            ValidationError::DanglingDependency { step, missing } => {
                assert_eq!(step, "a");
                assert_eq!(missing, "ghost");
            }
            other => panic!("expected DanglingDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_names_step_sequence() {
        let err = PipelineGraph::build(
            vec![step("a", &["c"]), step("b", &["a"]), step("c", &["b"])],
            None,
        )
        .unwrap_err();

        match err {
            ValidationError::CyclicDependency { cycle } => {
                assert_eq!(cycle.first(), cycle.last());
                assert!(cycle.len() == 4, "three-step cycle closed on itself: {:?}", cycle);
                for id in ["a", "b", "c"] {
                    assert!(cycle.iter().any(|s| s == id));
                }
            }
            other => panic!("expected CyclicDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_self_cycle() {
        let err = PipelineGraph::build(vec![step("a", &["a"])], None).unwrap_err();
        assert!(matches!(err, ValidationError::CyclicDependency { cycle }
            if cycle == vec!["a".to_string(), "a".to_string()]));
    }

    #[test]
    fn test_unknown_table_suggests_nearest_match() {
        let catalog = InMemorySchemaCatalog::new()
            .with_table("orders", vec![("total", "numeric")])
            .with_table("customers", vec![("id", "integer")]);

        let bad = PipelineStep::new("fetch", "query")
            .with_inputs(vec![InputRef::Table("orderz".to_string())]);

        let err = PipelineGraph::build(vec![bad], Some(&catalog)).unwrap_err();
        match err {
            ValidationError::UnknownReference { step, suggestion, .. } => {
                assert_eq!(step, "fetch");
                assert_eq!(suggestion.as_deref(), Some("orders"));
            }
            other => panic!("expected UnknownReference, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_column_checked_within_table() {
        let catalog =
            InMemorySchemaCatalog::new().with_table("orders", vec![("total", "numeric")]);

        let bad = PipelineStep::new("fetch", "query").with_inputs(vec![InputRef::Column {
            table: "orders".to_string(),
            column: "totel".to_string(),
        }]);

        let err = PipelineGraph::build(vec![bad], Some(&catalog)).unwrap_err();
        match err {
            ValidationError::UnknownReference { name, suggestion, .. } => {
                assert!(name.contains("orders.totel"));
                assert_eq!(suggestion.as_deref(), Some("total"));
            }
            other => panic!("expected UnknownReference, got {:?}", other),
        }
    }

    #[test]
    fn test_external_refs_unchecked_without_catalog() {
        let step = PipelineStep::new("fetch", "query")
            .with_inputs(vec![InputRef::Table("anything".to_string())]);
        assert!(PipelineGraph::build(vec![step], None).is_ok());
    }

    #[test]
    fn test_unknown_output_reference() {
        let producer = PipelineStep::new("profile", "profile").with_output("profile_summary");
        let consumer = PipelineStep::new("agg", "transform")
            .with_dependencies(vec!["profile".to_string()])
            .with_inputs(vec![InputRef::Output("profile_sumary".to_string())]);

        let err = PipelineGraph::build(vec![producer, consumer], None).unwrap_err();
        match err {
            ValidationError::UnknownReference { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("profile_summary"));
            }
            other => panic!("expected UnknownReference, got {:?}", other),
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let steps = vec![step("a", &[]), step("b", &["a"]), step("c", &["a"])];
        let first = PipelineGraph::build(steps.clone(), None).unwrap();
        let second = PipelineGraph::build(steps, None).unwrap();

        let first_ids: Vec<&str> = first.step_ids().collect();
        let second_ids: Vec<&str> = second.step_ids().collect();
        assert_eq!(first_ids, second_ids);
        assert_eq!(first.dependents_of("a"), second.dependents_of("a"));
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("orders", "orders"), 0);
        assert_eq!(edit_distance("orderz", "orders"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
    }
}
