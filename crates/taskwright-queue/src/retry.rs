//! Retry schedule for background jobs: a fixed list of delays, one per retry.

use std::time::Duration;

use taskwright_config::QueueConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    /// Three retries after 5s, 15s and 30s.
    fn default() -> Self {
        Self::from_secs(&[5, 15, 30])
    }
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    pub fn from_config(cfg: &QueueConfig) -> Self {
        Self::from_secs(&cfg.retry_delays_secs)
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    pub fn max_retries(&self) -> usize {
        self.delays.len()
    }

    /// Delay before retry number `retry` (0-indexed), or `None` once the
    /// schedule is exhausted.
    pub fn delay_for(&self, retry: usize) -> Option<Duration> {
        self.delays.get(retry).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_5_15_30() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_retries(), 3);
        assert_eq!(p.delay_for(0), Some(Duration::from_secs(5)));
        assert_eq!(p.delay_for(1), Some(Duration::from_secs(15)));
        assert_eq!(p.delay_for(2), Some(Duration::from_secs(30)));
        assert_eq!(p.delay_for(3), None);
    }

    #[test]
    fn from_config_uses_configured_delays() {
        let cfg = QueueConfig { retry_delays_secs: vec![1, 2], ..QueueConfig::default() };
        let p = RetryPolicy::from_config(&cfg);
        assert_eq!(p.max_retries(), 2);
        assert_eq!(p.delay_for(1), Some(Duration::from_secs(2)));
    }

    #[test]
    fn none_never_retries() {
        assert_eq!(RetryPolicy::none().delay_for(0), None);
    }
}
