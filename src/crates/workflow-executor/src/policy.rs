//! Per-node failure policy (§4.3) and the exponential-backoff-with-jitter
//! curve backing `retry(n, backoff)` — same shape as a checkpoint/graph
//! runtime's retry primitive (max attempts, initial interval, backoff
//! factor, max interval, jitter), generalized into a per-node dispatch
//! policy.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use graph_model::{Node, NodeType};

/// What happens when a node's dispatch fails (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Cancel sibling tasks and fail the run immediately.
    FailFast,
    /// Mark this node failed; dependents are skipped with `upstream_failed`.
    Continue,
    /// Retry up to `backoff.max_attempts` times before falling back to
    /// `on_exhaustion`.
    Retry { backoff: RetryPolicy, on_exhaustion: Box<FailurePolicy> },
}

impl FailurePolicy {
    /// Default policy per node type (§4.3): `fail_fast` for canonical
    /// non-LLM nodes, `retry(2, 1s)` for `llm`/`http` nodes.
    pub fn default_for(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Llm | NodeType::Http => FailurePolicy::Retry {
                backoff: RetryPolicy::new(2).with_initial_interval(1.0),
                on_exhaustion: Box::new(FailurePolicy::FailFast),
            },
            _ => FailurePolicy::FailFast,
        }
    }

    /// The policy in force for `node`: an explicit `on_failure` declared in
    /// its config (§4.3 "Per-node policy declared in node config") takes
    /// precedence over [`Self::default_for`].
    pub fn for_node(node: &Node) -> Self {
        node.config
            .get("on_failure")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_else(|| Self::default_for(node.node_type))
    }
}

/// Exponential backoff with jitter, the curve `retry(n, backoff)` in §4.3
/// names but does not define.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_interval: f64,
    pub backoff_factor: f64,
    pub max_interval: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 128.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self { max_attempts, ..Default::default() }
    }

    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether `attempts_made` (the count of failures observed so far)
    /// still permits another attempt.
    pub fn should_retry(&self, attempts_made: usize) -> bool {
        attempts_made < self.max_attempts
    }

    /// The delay to sleep before attempt number `attempt` (0-indexed).
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let raw = self.initial_interval * self.backoff_factor.powi(attempt as i32);
        let capped = raw.min(self.max_interval);
        let jittered = if self.jitter {
            let factor = rand::thread_rng().gen_range(0.5..1.5);
            capped * factor
        } else {
            capped
        };
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_for_llm_is_retry_then_fail_fast() {
        let policy = FailurePolicy::default_for(NodeType::Llm);
        match policy {
            FailurePolicy::Retry { backoff, on_exhaustion } => {
                assert_eq!(backoff.max_attempts, 2);
                assert!(matches!(*on_exhaustion, FailurePolicy::FailFast));
            }
            _ => panic!("expected retry policy"),
        }
    }

    #[test]
    fn default_policy_for_transform_is_fail_fast() {
        assert!(matches!(FailurePolicy::default_for(NodeType::Transform), FailurePolicy::FailFast));
    }

    #[test]
    fn node_config_can_override_the_default_policy() {
        let node = Node::new("n1", "transform", serde_json::json!({ "on_failure": { "kind": "continue" } })).unwrap();
        assert!(matches!(FailurePolicy::for_node(&node), FailurePolicy::Continue));
    }

    #[test]
    fn node_without_an_override_falls_back_to_the_type_default() {
        let node = Node::new("n1", "llm", serde_json::json!({ "model": "x", "prompt": "hi" })).unwrap();
        assert!(matches!(FailurePolicy::for_node(&node), FailurePolicy::Retry { .. }));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy::new(3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn delay_grows_with_attempt_and_is_capped() {
        let policy = RetryPolicy::new(5).with_initial_interval(1.0).with_backoff_factor(2.0).with_max_interval(4.0).with_jitter(false);
        assert_eq!(policy.calculate_delay(0), Duration::from_secs_f64(1.0));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs_f64(2.0));
        assert_eq!(policy.calculate_delay(5), Duration::from_secs_f64(4.0));
    }
}
