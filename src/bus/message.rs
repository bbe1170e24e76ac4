//! Bus message records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a bus message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Reasoning narration from a component
    Thinking,
    /// Lifecycle/progress notification
    Progress,
    /// A data query is being issued
    DataRequest,
    /// A data query produced a result
    DataResponse,
    /// An analytical finding worth surfacing
    Insight,
    /// Something went wrong
    Error,
    /// A unit of work (step, pipeline, healing session) finished
    Complete,
}

/// What a message concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Not tied to a particular pipeline or step
    Broadcast,
    /// Concerns one pipeline run
    Pipeline(Uuid),
    /// Concerns one step
    Step(String),
}

/// Closed, versioned structured metadata
///
/// Consumers can rely on this exact field set per version; new fields
/// are added additively with `#[serde(default)]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Metadata schema version
    #[serde(default = "Metadata::current_version")]
    pub version: u32,

    /// Pipeline run this message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,

    /// Step this message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,

    /// Attempt number (healing sessions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,

    /// Completed step count at publish time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<usize>,

    /// Total step count of the pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,

    /// Free-form structured detail (error text, skip reason, query)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Metadata {
    const VERSION: u32 = 1;

    fn current_version() -> u32 {
        Self::VERSION
    }

    /// Metadata tied to a pipeline run
    pub fn for_run(run_id: Uuid) -> Self {
        Self {
            run_id: Some(run_id),
            ..Self::default()
        }
    }

    /// Builder-style step id
    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    /// Builder-style progress counts
    pub fn with_progress(mut self, completed: usize, total: usize) -> Self {
        self.completed = Some(completed);
        self.total = Some(total);
        self
    }

    /// Builder-style attempt number
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Builder-style detail text
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            run_id: None,
            step_id: None,
            attempt: None,
            completed: None,
            total: None,
            detail: None,
        }
    }
}

/// An immutable event record
///
/// Created by producers, appended to the durable journal, delivered to
/// zero or more subscribers, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// When the message was created
    pub timestamp: DateTime<Utc>,

    /// Logical component name that produced the message
    pub source: String,

    /// What the message concerns
    pub scope: Scope,

    /// Message classification
    pub kind: MessageKind,

    /// Human-readable text
    pub content: String,

    /// Structured metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl Message {
    /// Create a message timestamped now, with empty metadata
    pub fn new(
        source: impl Into<String>,
        scope: Scope,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            source: source.into(),
            scope,
            kind,
            content: content.into(),
            metadata: Metadata::default(),
        }
    }

    /// Builder-style metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json_round_trip() {
        let message = Message::new(
            "pipeline-executor",
            Scope::Step("profile".to_string()),
            MessageKind::Progress,
            "step profile running",
        )
        .with_metadata(Metadata::for_run(Uuid::new_v4()).with_progress(0, 3));

        let line = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&line).unwrap();

        assert_eq!(back.kind, MessageKind::Progress);
        assert_eq!(back.scope, message.scope);
        assert_eq!(back.metadata, message.metadata);
    }

    #[test]
    fn test_metadata_version_defaults_when_absent() {
        // A consumer reading a record written before the field existed
        let back: Metadata = serde_json::from_str("{}").unwrap();
        assert_eq!(back.version, 1);
        assert!(back.step_id.is_none());
    }

    #[test]
    fn test_kind_wire_names_are_stable() {
        assert_eq!(
            serde_json::to_string(&MessageKind::DataRequest).unwrap(),
            "\"data_request\""
        );
        assert_eq!(
            serde_json::to_string(&Scope::Broadcast).unwrap(),
            "\"broadcast\""
        );
    }
}
