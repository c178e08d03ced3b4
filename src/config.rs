//! Engine configuration, resolved from builder arguments and the
//! environment.

use std::time::Duration;

/// Tunables of the [`GraphExecutor`](crate::engine::GraphExecutor).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Wall-clock budget for one execution node; exceeding it counts as a
    /// node failure subject to the node's failure policy.
    pub step_timeout: Duration,
    /// How many times a compare-and-swap conflict is retried with a fresh
    /// load before surfacing the conflict to the caller.
    pub conflict_retry_limit: u32,
    /// Rejections beyond this count fail the run as an escalation.
    /// `None` disables the cap.
    pub max_rework_iterations: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(300),
            conflict_retry_limit: 3,
            max_rework_iterations: Self::resolve_max_rework(None),
        }
    }
}

impl EngineConfig {
    pub const DEFAULT_MAX_REWORK: u32 = 5;

    fn resolve_max_rework(provided: Option<Option<u32>>) -> Option<u32> {
        if let Some(cap) = provided {
            return cap;
        }
        dotenvy::dotenv().ok();
        match std::env::var("STAGELOOP_MAX_REWORK") {
            Ok(raw) => match raw.parse::<u32>() {
                // 0 disables the cap.
                Ok(0) => None,
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!(value = %raw, "unparseable STAGELOOP_MAX_REWORK; using default");
                    Some(Self::DEFAULT_MAX_REWORK)
                }
            },
            Err(_) => Some(Self::DEFAULT_MAX_REWORK),
        }
    }

    #[must_use]
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_conflict_retry_limit(mut self, limit: u32) -> Self {
        self.conflict_retry_limit = limit;
        self
    }

    #[must_use]
    pub fn with_max_rework_iterations(mut self, cap: Option<u32>) -> Self {
        self.max_rework_iterations = Self::resolve_max_rework(Some(cap));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_cap_overrides_environment() {
        let config = EngineConfig::default().with_max_rework_iterations(Some(2));
        assert_eq!(config.max_rework_iterations, Some(2));

        let uncapped = EngineConfig::default().with_max_rework_iterations(None);
        assert_eq!(uncapped.max_rework_iterations, None);
    }
}
