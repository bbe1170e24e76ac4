//! External collaborator seams: text oracle and schema catalog
//!
//! The oracle is an opaque prompt-in/text-out capability (plan
//! proposal and query diagnosis live behind it). The catalog is a
//! read-only lookup of table/column existence. Both are consumed
//! through narrow traits; this crate assumes nothing about how either
//! works internally and treats any oracle failure as "no correction
//! available".

use crate::healing::{Diagnosis, QueryDiagnoser, QueryError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error types for oracle calls
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("oracle timed out after {0} seconds")]
    Timeout(u64),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Prompt-in/text-out capability with a timeout
///
/// Must return within `timeout` or raise; never retried by this crate.
#[async_trait]
pub trait TextOracle: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, OracleError>;
}

/// A column of an external table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Source-native type name
    pub data_type: String,
}

/// Read-only lookup of table/column existence and types
///
/// Used for optional graph pre-validation and to enrich diagnosis
/// prompts; execution proceeds without one.
pub trait SchemaCatalog: Send + Sync {
    /// Whether the table exists in the connected source
    fn table_exists(&self, name: &str) -> bool;

    /// Columns of a table, or None if the table is unknown
    fn columns_of(&self, table: &str) -> Option<Vec<Column>>;

    /// All known table names (for nearest-match suggestions)
    fn table_names(&self) -> Vec<String>;
}

/// In-memory catalog, loadable from a YAML schema file
///
/// The file maps table name to a column-name/type map:
///
/// ```yaml
/// orders:
///   id: integer
///   total: numeric
/// customers:
///   id: integer
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemorySchemaCatalog {
    tables: IndexMap<String, Vec<Column>>,
}

impl InMemorySchemaCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style table registration
    pub fn with_table(mut self, name: impl Into<String>, columns: Vec<(&str, &str)>) -> Self {
        self.tables.insert(
            name.into(),
            columns
                .into_iter()
                .map(|(name, data_type)| Column {
                    name: name.to_string(),
                    data_type: data_type.to_string(),
                })
                .collect(),
        );
        self
    }

    /// Parse a catalog from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: IndexMap<String, IndexMap<String, String>> =
            serde_yaml::from_str(yaml).context("Failed to parse schema YAML")?;

        let tables = raw
            .into_iter()
            .map(|(table, columns)| {
                let columns = columns
                    .into_iter()
                    .map(|(name, data_type)| Column { name, data_type })
                    .collect();
                (table, columns)
            })
            .collect();
        Ok(Self { tables })
    }

    /// Load a catalog from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read schema file {}", path.as_ref().display())
        })?;
        Self::from_yaml(&content)
    }
}

impl SchemaCatalog for InMemorySchemaCatalog {
    fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    fn columns_of(&self, table: &str) -> Option<Vec<Column>> {
        self.tables.get(table).cloned()
    }

    fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }
}

/// Render a catalog as compact prompt context, one table per line
pub fn schema_context(catalog: &dyn SchemaCatalog) -> String {
    let mut lines = Vec::new();
    for table in catalog.table_names() {
        let columns = catalog
            .columns_of(&table)
            .unwrap_or_default()
            .iter()
            .map(|c| format!("{} {}", c.name, c.data_type))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("{}({})", table, columns));
    }
    lines.join("\n")
}

/// Diagnosis adapter over a [`TextOracle`]
///
/// The only place this crate calls the oracle: builds a diagnosis
/// prompt from the failed query, its error, and optional schema
/// context, and parses the reply into a [`Diagnosis`].
pub struct OracleDiagnoser<O> {
    oracle: O,
    timeout: Duration,
}

impl<O> OracleDiagnoser<O> {
    /// Wrap an oracle with the default 30s diagnosis timeout
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            timeout: Duration::from_secs(30),
        }
    }

    /// Builder-style timeout override
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<O: TextOracle> QueryDiagnoser for OracleDiagnoser<O> {
    async fn diagnose(
        &self,
        query: &str,
        error: &QueryError,
        schema_context: Option<&str>,
    ) -> Result<Diagnosis, OracleError> {
        let prompt = diagnosis_prompt(query, error, schema_context);
        debug!("diagnosing failed query ({} chars of prompt)", prompt.len());

        let reply = self.oracle.generate(&prompt, self.timeout).await?;
        Ok(parse_diagnosis(&reply))
    }
}

fn diagnosis_prompt(query: &str, error: &QueryError, schema_context: Option<&str>) -> String {
    let mut prompt = format!(
        "The following SQL query failed.\n\nQuery:\n{}\n\nError:\n{}\n",
        query, error.message
    );
    if let Some(schema) = schema_context {
        prompt.push_str(&format!("\nAvailable schema:\n{}\n", schema));
    }
    prompt.push_str(
        "\nRespond with JSON: {\"diagnosis\": \"...\", \"corrected_query\": \"...\", \
         \"confidence\": 0.0}. Omit corrected_query if the query cannot be fixed.",
    );
    prompt
}

/// Parse an oracle reply into a diagnosis
///
/// Accepts the requested JSON shape, with or without a markdown code
/// fence. An unparseable reply degrades to a diagnosis with no
/// correction (equivalent to "no correction available").
fn parse_diagnosis(reply: &str) -> Diagnosis {
    let stripped = strip_fence(reply.trim());
    match serde_json::from_str::<Diagnosis>(stripped) {
        Ok(diagnosis) => diagnosis,
        Err(_) => Diagnosis {
            diagnosis: reply.trim().to_string(),
            corrected_query: None,
            confidence: 0.0,
        },
    }
}

fn strip_fence(text: &str) -> &str {
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}
