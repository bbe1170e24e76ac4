//! Plan configuration from YAML
//!
//! The planning layer (outside this crate) proposes a step list; this
//! is its hand-off format. A plan file is only a proposal - it becomes
//! executable once [`PipelineGraph::build`] accepts it.

use crate::core::graph::{PipelineGraph, ValidationError};
use crate::core::step::{InputRef, PipelineStep};
use crate::oracle::SchemaCatalog;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level plan loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Plan name
    pub name: String,

    /// Optional plan description
    #[serde(default)]
    pub description: Option<String>,

    /// Maximum number of steps running concurrently
    #[serde(default)]
    pub max_parallelism: Option<usize>,

    /// Proposed steps
    pub steps: Vec<PlanStep>,
}

/// Step as proposed in a plan file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique step identifier
    pub id: String,

    /// Opaque action tag
    pub action: String,

    /// Human-readable step description
    #[serde(default)]
    pub description: String,

    /// Named input references
    #[serde(default)]
    pub inputs: Vec<InputRef>,

    /// Output name published into the execution context
    #[serde(default)]
    pub output: Option<String>,

    /// Estimated duration in seconds
    #[serde(default)]
    pub estimated_secs: Option<u64>,

    /// Step ids this step depends on
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl PlanConfig {
    /// Parse a plan from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let de = serde_yaml::Deserializer::from_str(yaml);
        serde_yaml::with::singleton_map_recursive::deserialize(de)
            .context("Failed to parse plan YAML")
    }

    /// Load a plan from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read plan file {}", path.as_ref().display())
        })?;
        Self::from_yaml(&content)
    }

    /// Convert the proposal into pipeline steps
    pub fn to_steps(&self) -> Vec<PipelineStep> {
        self.steps
            .iter()
            .map(|s| PipelineStep {
                id: s.id.clone(),
                action: s.action.clone(),
                description: s.description.clone(),
                inputs: s.inputs.clone(),
                output: s.output.clone(),
                estimated_secs: s.estimated_secs,
                dependencies: s.depends_on.clone(),
            })
            .collect()
    }

    /// Validate the proposal into an executable graph
    pub fn build_graph(
        &self,
        catalog: Option<&dyn SchemaCatalog>,
    ) -> Result<PipelineGraph, ValidationError> {
        PipelineGraph::build(self.to_steps(), catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"
name: "Revenue overview"
description: "Profile orders then aggregate revenue"
max_parallelism: 2

steps:
  - id: "profile"
    action: "profile"
    description: "Profile the orders table"
    inputs:
      - table: "orders"
    output: "orders_profile"

  - id: "revenue"
    action: "query"
    description: "Monthly revenue"
    inputs:
      - column: { table: "orders", column: "total" }
    output: "monthly_revenue"
    estimated_secs: 20
    depends_on: ["profile"]

  - id: "summary"
    action: "summarize"
    inputs:
      - output: "orders_profile"
      - output: "monthly_revenue"
    depends_on: ["profile", "revenue"]
"#;

    #[test]
    fn test_parse_plan() {
        let plan = PlanConfig::from_yaml(PLAN).unwrap();
        assert_eq!(plan.name, "Revenue overview");
        assert_eq!(plan.max_parallelism, Some(2));
        assert_eq!(plan.steps.len(), 3);
        assert_eq!(plan.steps[1].estimated_secs, Some(20));
        assert_eq!(
            plan.steps[1].inputs,
            vec![InputRef::Column {
                table: "orders".to_string(),
                column: "total".to_string()
            }]
        );
    }

    #[test]
    fn test_plan_builds_graph() {
        let plan = PlanConfig::from_yaml(PLAN).unwrap();
        let graph = plan.build_graph(None).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(
            graph.step("summary").unwrap().dependencies,
            vec!["profile", "revenue"]
        );
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(PlanConfig::from_yaml("steps: [").is_err());
    }
}
