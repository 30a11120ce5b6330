//! Remote query execution.
//!
//! A query is submitted once, its execution is polled until it reaches a
//! terminal state, and the tabular result is fetched. [`QueryEngine`] is
//! the request/response seam; [`ExecutionPoller`] drives an execution to
//! completion on top of it.

mod client;
mod poller;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

pub use self::client::DuneClient;
pub use self::poller::{ExecutionPoller, PollSettings};

/// Numeric identifier of a saved query on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub u64);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named string parameters bound into a query at submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryParameters(BTreeMap<String, String>);

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// Opaque identifier of one execution, returned at submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionHandle(String);

impl ExecutionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionState {
    /// Parse the engine's `QUERY_STATE_*` string.
    ///
    /// States outside the known set are treated as still running; the
    /// caller keeps polling until the budget runs out.
    pub fn from_api(raw: &str) -> Self {
        match raw.trim() {
            "QUERY_STATE_PENDING" => Self::Pending,
            "QUERY_STATE_RUNNING" | "QUERY_STATE_EXECUTING" => Self::Running,
            "QUERY_STATE_COMPLETED" => Self::Completed,
            "QUERY_STATE_FAILED" => Self::Failed,
            "QUERY_STATE_CANCELLED" => Self::Cancelled,
            other => {
                tracing::warn!(state = other, "Unrecognized execution state, treating as running");
                Self::Running
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(label)
    }
}

/// One status check: the state plus whatever detail the engine attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    pub state: ExecutionState,
    pub detail: Option<String>,
}

impl ExecutionStatus {
    pub fn new(state: ExecutionState) -> Self {
        Self {
            state,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// One result record: column name to value, in engine column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRow(serde_json::Map<String, serde_json::Value>);

impl ResultRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.0.get(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Cell value as plain text: strings unquoted, null/missing as empty.
    pub fn cell_text(&self, column: &str) -> String {
        match self.0.get(column) {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Cell value as a number, accepting numeric strings.
    pub fn number(&self, column: &str) -> Option<f64> {
        match self.0.get(column)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for ResultRow {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// Request/response access to the remote query engine.
///
/// Implementations never retry; every failure is returned to the caller.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Start an execution of `query` with `params`.
    async fn submit(
        &self,
        query: QueryId,
        params: &QueryParameters,
    ) -> Result<ExecutionHandle, QueryError>;

    /// Fetch the current state of an execution.
    async fn check_status(&self, handle: &ExecutionHandle) -> Result<ExecutionStatus, QueryError>;

    /// Fetch the rows of a COMPLETED execution.
    async fn fetch_results(&self, handle: &ExecutionHandle) -> Result<Vec<ResultRow>, QueryError>;
}
