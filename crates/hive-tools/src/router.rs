use crate::capability::{normalize_name, tokenize, CapabilityDescriptor, CapabilityRegistry, OperationClass};
use crate::invoker::ToolInvoker;
use chrono::Utc;
use hive_core::{AgentAction, AgentRunId, ErrorKind, HiveError, HiveResult, ToolCall, ToolCallId, ToolOutcome};
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_MIN_FUZZY_SCORE: f64 = 0.6;

/// Resolves agent actions to capabilities and invokes them.
pub struct CapabilityRouter {
    registry: CapabilityRegistry,
    invoker: ToolInvoker,
    min_fuzzy_score: f64,
}

impl CapabilityRouter {
    pub fn new(registry: CapabilityRegistry, invoker: ToolInvoker) -> Self {
        Self {
            registry,
            invoker,
            min_fuzzy_score: DEFAULT_MIN_FUZZY_SCORE,
        }
    }

    /// Share of action tokens that must appear in a capability's index for a
    /// fuzzy match to count.
    pub fn with_min_fuzzy_score(mut self, score: f64) -> Self {
        self.min_fuzzy_score = score.clamp(0.0, 1.0);
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn invoker(&self) -> &ToolInvoker {
        &self.invoker
    }

    /// Find the capability for `action`: exact name on the target, then
    /// `verb_target`, then synonyms of either, then fuzzy description match.
    pub fn resolve(&self, action: &AgentAction) -> HiveResult<&CapabilityDescriptor> {
        let combined = format!(
            "{}_{}",
            normalize_name(&action.verb),
            normalize_name(&action.target)
        );

        if let Some(d) = self.registry.get(&action.target) {
            return Ok(d);
        }
        if let Some(d) = self.registry.get(&combined) {
            return Ok(d);
        }
        if let Some(d) = self
            .registry
            .get_by_synonym(&action.target)
            .or_else(|| self.registry.get_by_synonym(&combined))
        {
            debug!(action_target = %action.target, capability = %d.name, "Resolved by synonym");
            return Ok(d);
        }

        let mut tokens = tokenize(&action.verb);
        tokens.extend(tokenize(&action.target));
        if let Some((d, score)) = self.registry.best_fuzzy_match(&tokens, self.min_fuzzy_score) {
            info!(
                verb = %action.verb,
                action_target = %action.target,
                capability = %d.name,
                score,
                "Resolved by fuzzy match"
            );
            return Ok(d);
        }

        Err(HiveError::Capability(format!(
            "no capability matches '{} {}'",
            action.verb, action.target
        )))
    }

    /// Resolve and execute `action` on behalf of `run_id`.
    ///
    /// Resolution failure yields a terminal call with 0 attempts and a
    /// `capability_not_found` outcome; the transport is never touched.
    pub async fn invoke(
        &self,
        run_id: AgentRunId,
        action: &AgentAction,
        deadline_override: Option<Duration>,
    ) -> ToolCall {
        let started_at = Utc::now();
        let request = if action.parameters.is_null() {
            serde_json::json!({})
        } else {
            action.parameters.clone()
        };

        let descriptor = match self.resolve(action) {
            Ok(d) => d,
            Err(e) => {
                warn!(agent_run_id = %run_id, verb = %action.verb, action_target = %action.target, "Capability not found");
                return ToolCall {
                    id: ToolCallId::new(),
                    agent_run_id: run_id,
                    capability: action.target.clone(),
                    request,
                    attempts: 0,
                    outcome: ToolOutcome::error(ErrorKind::CapabilityNotFound, e.to_string()),
                    latency_ms: 0,
                    started_at,
                };
            }
        };

        let class = descriptor
            .class
            .unwrap_or_else(|| OperationClass::infer(&action.verb));
        let exec = self
            .invoker
            .execute(descriptor.endpoint(), class, request.clone(), deadline_override)
            .await;

        let call = ToolCall {
            id: ToolCallId::new(),
            agent_run_id: run_id,
            capability: descriptor.name.clone(),
            request,
            attempts: exec.attempts,
            outcome: exec.outcome,
            latency_ms: exec.latency.as_millis() as u64,
            started_at,
        };
        match call.failure_detail() {
            None => debug!(
                agent_run_id = %run_id,
                capability = %call.capability,
                attempts = call.attempts,
                latency_ms = call.latency_ms,
                "Tool call succeeded"
            ),
            Some(detail) => warn!(
                agent_run_id = %run_id,
                attempts = call.attempts,
                error = %detail,
                "Tool call failed"
            ),
        }
        call
    }
}
