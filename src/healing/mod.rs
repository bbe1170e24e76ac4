//! Bounded self-healing retry loop around data queries
//!
//! One [`HealingSession`] wraps one query execution: run, capture the
//! failure, diagnose, apply the correction, retry - up to a hard
//! attempt ceiling. The session's attempt log is the audit trail; bus
//! messages about it are a side notification for observers. The loop
//! is an explicit state machine, so attempt history is inspectable and
//! tests need no timing.

use crate::bus::{EventBus, Message, MessageKind, Metadata, Scope};
use crate::oracle::OracleError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// A failed query execution
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("query failed: {message}")]
pub struct QueryError {
    /// Source-reported failure text
    pub message: String,
}

impl QueryError {
    /// Wrap a failure message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Executes one query against the connected data source
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// Run the query, returning its result rows as a JSON value
    async fn run_query(&self, query: &str) -> Result<Value, QueryError>;
}

/// Diagnoses a failed query and proposes a correction
///
/// The only seam through which the text oracle is reached (see
/// [`OracleDiagnoser`](crate::oracle::OracleDiagnoser)).
#[async_trait]
pub trait QueryDiagnoser: Send + Sync {
    /// Diagnose the failure; any error here aborts the session
    async fn diagnose(
        &self,
        query: &str,
        error: &QueryError,
        schema_context: Option<&str>,
    ) -> Result<Diagnosis, OracleError>;
}

/// Outcome of one diagnosis call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    /// What the diagnoser thinks went wrong
    pub diagnosis: String,

    /// Proposed replacement query, if any
    #[serde(default)]
    pub corrected_query: Option<String>,

    /// Diagnoser-reported confidence in the correction (0.0 - 1.0)
    #[serde(default)]
    pub confidence: f32,
}

/// One entry of a session's attempt log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAttempt {
    /// 1-based attempt number
    pub attempt: u32,

    /// The query text this attempt executed
    pub query_text: String,

    /// Failure text, if the attempt failed
    #[serde(default)]
    pub error: Option<String>,

    /// Diagnosis produced for the failure, if one was obtained
    #[serde(default)]
    pub diagnosis: Option<String>,

    /// Correction the next attempt will execute, if one was proposed
    #[serde(default)]
    pub corrected_query: Option<String>,

    /// When the attempt was recorded
    pub timestamp: DateTime<Utc>,
}

/// Terminal status of a healing session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingStatus {
    /// An attempt succeeded
    Healed,
    /// The session gave up
    Exhausted { reason: ExhaustionReason },
}

/// Why a session gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// The attempt ceiling was reached
    AttemptsSpent,
    /// The diagnoser proposed no correction, or the same query again
    NoCorrection,
    /// The diagnoser itself failed; retrying without a working
    /// diagnosis capability cannot improve outcomes
    DiagnosisFailed,
}

/// Audit record of one query execution attempt chain
///
/// Created at the start of one query execution, discarded after it
/// resolves; never shared across queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingSession {
    /// The query as originally submitted
    pub original_query: String,

    /// Every attempt made, in order, with its own timestamp
    pub attempts: Vec<QueryAttempt>,

    /// The attempt ceiling this session ran under
    pub max_attempts: u32,

    /// How the session ended
    pub final_status: HealingStatus,

    /// The healed query's result, when `final_status` is `Healed`
    #[serde(default)]
    pub result: Option<Value>,
}

impl HealingSession {
    fn new(original_query: &str, max_attempts: u32) -> Self {
        Self {
            original_query: original_query.to_string(),
            attempts: Vec::new(),
            max_attempts,
            final_status: HealingStatus::Exhausted {
                reason: ExhaustionReason::AttemptsSpent,
            },
            result: None,
        }
    }

    /// Whether the session ended in a successful attempt
    pub fn is_healed(&self) -> bool {
        self.final_status == HealingStatus::Healed
    }

    /// The last recorded attempt, if any
    pub fn last_attempt(&self) -> Option<&QueryAttempt> {
        self.attempts.last()
    }
}

/// Bounded retry state machine for a single query
pub struct HealingExecutor {
    max_attempts: u32,
    bus: Option<Arc<EventBus>>,
    source: String,
}

impl HealingExecutor {
    /// Default attempt ceiling
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Create an executor with the default attempt ceiling
    pub fn new() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            bus: None,
            source: "healing-executor".to_string(),
        }
    }

    /// Builder-style attempt ceiling (clamped to at least 1)
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Builder-style bus for side notifications
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Run one query through the heal-retry loop
    ///
    /// `max_attempts` is the only termination guarantee; callers wrap
    /// the whole session in an external timeout if they need one.
    pub async fn execute(
        &self,
        query: &str,
        runner: &dyn QueryRunner,
        diagnoser: &dyn QueryDiagnoser,
        schema_context: Option<&str>,
    ) -> HealingSession {
        let mut session = HealingSession::new(query, self.max_attempts);
        let mut current = query.to_string();

        loop {
            let attempt = session.attempts.len() as u32 + 1;
            debug!("query attempt {}/{}", attempt, self.max_attempts);
            self.notify(
                MessageKind::DataRequest,
                format!("executing query (attempt {}/{})", attempt, self.max_attempts),
                Metadata::default().with_attempt(attempt).with_detail(current.clone()),
            );

            let error = match runner.run_query(&current).await {
                Ok(value) => {
                    session.attempts.push(QueryAttempt {
                        attempt,
                        query_text: current.clone(),
                        error: None,
                        diagnosis: None,
                        corrected_query: None,
                        timestamp: Utc::now(),
                    });
                    session.final_status = HealingStatus::Healed;
                    session.result = Some(value);
                    info!("query healed after {} attempt(s)", attempt);
                    self.notify(
                        MessageKind::Complete,
                        format!("query succeeded on attempt {}", attempt),
                        Metadata::default().with_attempt(attempt),
                    );
                    return session;
                }
                Err(error) => error,
            };

            warn!("query attempt {} failed: {}", attempt, error.message);

            if attempt >= self.max_attempts {
                session.attempts.push(QueryAttempt {
                    attempt,
                    query_text: current,
                    error: Some(error.message.clone()),
                    diagnosis: None,
                    corrected_query: None,
                    timestamp: Utc::now(),
                });
                session.final_status = HealingStatus::Exhausted {
                    reason: ExhaustionReason::AttemptsSpent,
                };
                self.notify_exhausted(attempt, "attempt ceiling reached", &error.message);
                return session;
            }

            let diagnosis = match diagnoser.diagnose(&current, &error, schema_context).await {
                Ok(diagnosis) => diagnosis,
                Err(oracle_error) => {
                    session.attempts.push(QueryAttempt {
                        attempt,
                        query_text: current,
                        error: Some(error.message.clone()),
                        diagnosis: None,
                        corrected_query: None,
                        timestamp: Utc::now(),
                    });
                    session.final_status = HealingStatus::Exhausted {
                        reason: ExhaustionReason::DiagnosisFailed,
                    };
                    self.notify_exhausted(
                        attempt,
                        "diagnosis failed",
                        &oracle_error.to_string(),
                    );
                    return session;
                }
            };

            self.notify(
                MessageKind::Insight,
                diagnosis.diagnosis.clone(),
                Metadata::default().with_attempt(attempt),
            );

            // no correction, or the same query again: retrying an
            // unchanged query cannot succeed, escalate immediately
            let corrected = match &diagnosis.corrected_query {
                Some(corrected) if corrected != &current => corrected.clone(),
                _ => {
                    session.attempts.push(QueryAttempt {
                        attempt,
                        query_text: current,
                        error: Some(error.message.clone()),
                        diagnosis: Some(diagnosis.diagnosis.clone()),
                        corrected_query: None,
                        timestamp: Utc::now(),
                    });
                    session.final_status = HealingStatus::Exhausted {
                        reason: ExhaustionReason::NoCorrection,
                    };
                    self.notify_exhausted(attempt, "no usable correction", &error.message);
                    return session;
                }
            };

            session.attempts.push(QueryAttempt {
                attempt,
                query_text: current,
                error: Some(error.message.clone()),
                diagnosis: Some(diagnosis.diagnosis.clone()),
                corrected_query: Some(corrected.clone()),
                timestamp: Utc::now(),
            });
            current = corrected;
        }
    }

    fn notify(&self, kind: MessageKind, content: String, metadata: Metadata) {
        if let Some(bus) = &self.bus {
            let message =
                Message::new(&self.source, Scope::Broadcast, kind, content).with_metadata(metadata);
            if bus.publish(message).is_err() {
                debug!("bus closed; dropping healing notification");
            }
        }
    }

    fn notify_exhausted(&self, attempt: u32, reason: &str, detail: &str) {
        self.notify(
            MessageKind::Error,
            format!("healing exhausted after {} attempt(s): {}", attempt, reason),
            Metadata::default().with_attempt(attempt).with_detail(detail.to_string()),
        );
    }
}

impl Default for HealingExecutor {
    fn default() -> Self {
        Self::new()
    }
}
