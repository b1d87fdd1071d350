//! The tool registry and invocation path.

use crate::canonical::{canonicalize, new_replay_id, request_hash};
use crate::error::ToolBusError;
use crate::log::InvocationLog;
use crate::record::{InvocationOutcome, InvocationRecord};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

/// Client-facing description of one tool.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// Result of running a tool.
///
/// `Failed` is an application-level outcome, not a transport error: the
/// HTTP layer still answers 200, with `outcome: "failed"` in the body.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Ok(Value),
    Failed(Value),
}

/// A tool implementation.
///
/// `invoke` returns `Err` only for arguments that fail the tool's schema —
/// that becomes HTTP 400 and is never logged as an invocation. Everything
/// the tool does after accepting its arguments ends in an outcome.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;
    async fn invoke(&self, args: &Value) -> Result<ToolOutcome, String>;
}

/// Which tools may run, derived from settings at startup.
#[derive(Debug, Clone, Default)]
pub struct ToolPolicy {
    /// When set, only these names run — the per-tool gates are ignored.
    pub allowlist: Option<BTreeSet<String>>,
    /// Names enabled by their individual gates.
    pub enabled: BTreeSet<String>,
}

impl ToolPolicy {
    #[must_use]
    pub fn allows(&self, name: &str) -> bool {
        match &self.allowlist {
            Some(list) => list.contains(name),
            None => self.enabled.contains(name),
        }
    }
}

/// The tool bus: registry + policy + log.
pub struct ToolBus {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
    policy: ToolPolicy,
    log: InvocationLog,
}

impl ToolBus {
    #[must_use]
    pub fn new(policy: ToolPolicy, log: InvocationLog) -> Self {
        Self {
            tools: BTreeMap::new(),
            policy,
            log,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.descriptor().name, tool);
    }

    /// Descriptors of the tools the current policy allows, sorted by name.
    #[must_use]
    pub fn list_allowed(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|t| t.descriptor())
            .filter(|d| self.policy.allows(d.name))
            .collect()
    }

    /// Retrieve a past invocation's record by replay ID.
    pub fn lookup_replay(&self, replay_id: &str) -> Result<Option<InvocationRecord>, ToolBusError> {
        Ok(self.log.lookup(replay_id)?)
    }

    /// Invoke a tool and log the invocation.
    ///
    /// Denied calls are logged (outcome `denied`) and then surfaced as
    /// `ToolBusError::Denied`; unknown tools and bad argument shapes are
    /// transport-level errors and are not logged.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: &Value,
    ) -> Result<InvocationRecord, ToolBusError> {
        let tool = self
            .tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolBusError::NotFound(name.to_string()))?;

        if !arguments.is_object() {
            return Err(ToolBusError::InvalidArguments(
                "arguments must be a JSON object".into(),
            ));
        }

        let canonical = canonicalize(arguments);
        let hash = request_hash(name, arguments);
        let replay_id = new_replay_id();
        let started_at = Utc::now();

        if !self.policy.allows(name) {
            let record = InvocationRecord {
                replay_id,
                tool_name: name.to_string(),
                request_hash: hash,
                started_at,
                ended_at: Utc::now(),
                outcome: InvocationOutcome::Denied,
                arguments: canonical,
                result_or_error: json!({ "error": format!("tool not allowed: {name}") }),
            };
            self.log.append(&record)?;
            return Err(ToolBusError::Denied(name.to_string()));
        }

        let outcome = tool
            .invoke(&canonical)
            .await
            .map_err(ToolBusError::InvalidArguments)?;

        let (outcome_kind, result_or_error) = match outcome {
            ToolOutcome::Ok(value) => (InvocationOutcome::Ok, value),
            ToolOutcome::Failed(value) => (InvocationOutcome::Failed, value),
        };

        let record = InvocationRecord {
            replay_id,
            tool_name: name.to_string(),
            request_hash: hash,
            started_at,
            ended_at: Utc::now(),
            outcome: outcome_kind,
            arguments: canonical,
            result_or_error,
        };
        self.log.append(&record)?;

        info!(
            tool = name,
            replay_id = %record.replay_id,
            outcome = ?record.outcome,
            "tool invoked"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::EchoTool;

    fn bus_with_echo() -> ToolBus {
        let policy = ToolPolicy {
            allowlist: None,
            enabled: BTreeSet::from(["echo".to_string()]),
        };
        let mut bus = ToolBus::new(policy, InvocationLog::disabled());
        bus.register(Arc::new(EchoTool));
        bus
    }

    #[tokio::test]
    async fn equivalent_arguments_share_a_hash_but_not_a_replay_id() {
        let bus = bus_with_echo();
        let a = bus
            .invoke("echo", &json!({"msg": "hi", "n": 1}))
            .await
            .unwrap();
        let b = bus
            .invoke("echo", &json!({"n": 1, "msg": "hi"}))
            .await
            .unwrap();
        assert_eq!(a.request_hash, b.request_hash);
        assert_ne!(a.replay_id, b.replay_id);
        assert_eq!(a.outcome, InvocationOutcome::Ok);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let bus = bus_with_echo();
        match bus.invoke("launch_missiles", &json!({})).await {
            Err(ToolBusError::NotFound(name)) => assert_eq!(name, "launch_missiles"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn disallowed_tool_is_denied() {
        let policy = ToolPolicy::default();
        let mut bus = ToolBus::new(policy, InvocationLog::disabled());
        bus.register(Arc::new(EchoTool));
        match bus.invoke("echo", &json!({})).await {
            Err(ToolBusError::Denied(name)) => assert_eq!(name, "echo"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn allowlist_overrides_gates() {
        let policy = ToolPolicy {
            allowlist: Some(BTreeSet::from(["echo".to_string()])),
            enabled: BTreeSet::new(),
        };
        let mut bus = ToolBus::new(policy, InvocationLog::disabled());
        bus.register(Arc::new(EchoTool));
        assert!(bus.invoke("echo", &json!({})).await.is_ok());
        assert_eq!(bus.list_allowed().len(), 1);
    }

    #[tokio::test]
    async fn non_object_arguments_are_invalid() {
        let bus = bus_with_echo();
        match bus.invoke("echo", &json!([1, 2])).await {
            Err(ToolBusError::InvalidArguments(_)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }
}
