//! Planner configuration (§4.2 bounds, §6 environment variables), loaded the
//! way `orchestrator::config::loader` layers env-var overrides under
//! defaults: construct [`PlannerConfig::default`], then apply
//! [`PlannerConfig::with_env_overrides`].

use std::time::Duration;

/// `MAX_PLANNING_STEPS` env override name (§6).
pub const ENV_MAX_PLANNING_STEPS: &str = "MAX_PLANNING_STEPS";
/// `LLM provider key` env var name (§6); read by concrete LLM port adapters,
/// not this crate, but named here so the config module is the single place
/// documenting every planner-relevant environment variable.
pub const ENV_LLM_PROVIDER_KEY: &str = "LLM_PROVIDER_KEY";

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Maximum outer ReAct iterations per planning session (§4.2). Exceeding
    /// this yields `PlanningFailed(reason=step_limit)`.
    pub max_steps: usize,
    /// Parse/validation failures tolerated per turn before `PlanningFailed`
    /// (§4.2: "up to 3 ... a 4th failure produces a terminal event").
    pub max_retries_per_turn: usize,
    /// LLM call timeout (§5 default 60s).
    pub llm_timeout: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_steps: 50,
            max_retries_per_turn: 3,
            llm_timeout: Duration::from_secs(60),
        }
    }
}

impl PlannerConfig {
    /// Apply `MAX_PLANNING_STEPS` if set and parseable; invalid or absent
    /// values leave the default untouched rather than failing construction.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(ENV_MAX_PLANNING_STEPS) {
            match raw.parse::<usize>() {
                Ok(steps) => self.max_steps = steps,
                Err(_) => tracing::warn!(value = %raw, "ignoring unparsable {ENV_MAX_PLANNING_STEPS}"),
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bounds_match_spec() {
        let config = PlannerConfig::default();
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.max_retries_per_turn, 3);
    }
}
