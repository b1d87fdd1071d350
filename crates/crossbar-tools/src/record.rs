//! The immutable invocation record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationOutcome {
    Ok,
    Failed,
    Denied,
}

/// One logged tool invocation. The arguments stored here are the
/// canonical form, not the raw bytes received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub replay_id: String,
    pub tool_name: String,
    pub request_hash: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: InvocationOutcome,
    pub arguments: Value,
    pub result_or_error: Value,
}
