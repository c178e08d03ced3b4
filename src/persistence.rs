//! Flat serialized shape for runs, for durable keyed backends.
//!
//! [`PersistedRun`] keeps every field either a plain string, a number, or a
//! JSON value, so any document or relational store can hold it without
//! schema gymnastics. Decoding is strict: an unknown status or a malformed
//! timestamp rejects the record instead of guessing.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::run::PipelineRun;
use crate::status::UnknownStatus;
use crate::types::{NodeId, RunId};

/// Errors decoding a persisted record back into a [`PipelineRun`].
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Status(#[from] UnknownStatus),

    #[error("invalid {field} timestamp: {value}")]
    #[diagnostic(code(stageloop::persistence::timestamp))]
    Timestamp { field: &'static str, value: String },

    #[error("invalid {field} payload")]
    #[diagnostic(code(stageloop::persistence::payload))]
    Payload {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// The flat wire form of one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedRun {
    pub run_id: String,
    pub status: String,
    pub current_node: String,
    pub completed_nodes: Vec<String>,
    pub failed_nodes: Vec<String>,
    pub iteration_count: u32,
    pub pending_input: Option<Value>,
    pub context: Value,
    /// RFC 3339.
    pub created_at: String,
    /// RFC 3339.
    pub updated_at: String,
    pub revision: u64,
}

impl From<&PipelineRun> for PersistedRun {
    fn from(run: &PipelineRun) -> Self {
        Self {
            run_id: run.run_id.to_string(),
            status: run.status.as_str().to_string(),
            current_node: run.current_node.encode(),
            completed_nodes: run.completed_nodes.iter().map(NodeId::encode).collect(),
            failed_nodes: run.failed_nodes.iter().map(NodeId::encode).collect(),
            iteration_count: run.iteration_count,
            pending_input: run
                .pending_input
                .as_ref()
                .and_then(|p| serde_json::to_value(p).ok()),
            context: serde_json::to_value(&run.context).unwrap_or(Value::Null),
            created_at: run.created_at.to_rfc3339(),
            updated_at: run.updated_at.to_rfc3339(),
            revision: run.revision,
        }
    }
}

fn parse_timestamp(
    field: &'static str,
    value: &str,
) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| PersistenceError::Timestamp {
            field,
            value: value.to_string(),
        })
}

impl TryFrom<PersistedRun> for PipelineRun {
    type Error = PersistenceError;

    fn try_from(record: PersistedRun) -> Result<Self, Self::Error> {
        let status = record.status.parse()?;
        let pending_input = record
            .pending_input
            .map(serde_json::from_value)
            .transpose()
            .map_err(|source| PersistenceError::Payload {
                field: "pending_input",
                source,
            })?;
        let context =
            serde_json::from_value(record.context).map_err(|source| PersistenceError::Payload {
                field: "context",
                source,
            })?;

        Ok(PipelineRun {
            run_id: RunId::from(record.run_id),
            status,
            current_node: NodeId::from(record.current_node),
            completed_nodes: record.completed_nodes.into_iter().map(NodeId::from).collect(),
            failed_nodes: record.failed_nodes.into_iter().map(NodeId::from).collect(),
            iteration_count: record.iteration_count,
            pending_input,
            context,
            created_at: parse_timestamp("created_at", &record.created_at)?,
            updated_at: parse_timestamp("updated_at", &record.updated_at)?,
            revision: record.revision,
        })
    }
}
