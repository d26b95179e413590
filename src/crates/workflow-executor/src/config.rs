//! Executor configuration (§5 timeouts, §6 environment variables), loaded
//! the way `orchestrator::config` layers env overrides under numeric
//! defaults.

use std::time::Duration;

pub const ENV_CONFIRMATION_TIMEOUT_SECONDS: &str = "CONFIRMATION_TIMEOUT_SECONDS";

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// LLM node call timeout (§5 default 60s).
    pub llm_timeout: Duration,
    /// HTTP node call timeout (§5 default 30s).
    pub http_timeout: Duration,
    /// Side-effect confirmation wait timeout (§4.3, §5 default 300s).
    pub confirmation_timeout: Duration,
    /// Per-run wall clock budget (§5 default 1h).
    pub run_timeout: Duration,
    /// Grace period given to in-flight dispatch tasks after cancellation
    /// before they are dropped (§4.3, §5: "10-second grace timeout").
    pub cancellation_grace: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            llm_timeout: Duration::from_secs(60),
            http_timeout: Duration::from_secs(30),
            confirmation_timeout: Duration::from_secs(300),
            run_timeout: Duration::from_secs(3600),
            cancellation_grace: Duration::from_secs(10),
        }
    }
}

impl ExecutorConfig {
    /// Apply `CONFIRMATION_TIMEOUT_SECONDS` if set and parseable (§6).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(raw) = std::env::var(ENV_CONFIRMATION_TIMEOUT_SECONDS) {
            match raw.parse::<u64>() {
                Ok(seconds) => self.confirmation_timeout = Duration::from_secs(seconds),
                Err(_) => tracing::warn!(value = %raw, "ignoring unparsable {ENV_CONFIRMATION_TIMEOUT_SECONDS}"),
            }
        }
        self
    }
}
