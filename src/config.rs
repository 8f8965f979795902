//! The config surface named in spec.md §6. Loading config from files, env,
//! or a CLI is explicitly out of scope (spec.md §1) — `Config` is a plain
//! struct with sane defaults and builder-style setters, matching the
//! teacher's preference for explicit struct fields over ambient env lookups
//! everywhere except the narrowest `rabbitmq-subscriber` crate.

use std::time::Duration;

/// Tunables for a single queue's worker pool and supervisor.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of worker tasks per queue. Default 5.
    pub workers_per_queue: usize,
    /// Broker QoS prefetch applied per worker. Default 10.
    pub prefetch_per_worker: u16,
    /// Bound on the publisher-confirm wait in the DLQ publisher.
    pub publish_confirm_timeout: Duration,
    /// Delay before the single outer DLQ-publish retry.
    pub dlq_publish_retry_delay: Duration,
    /// Initial reconnect backoff for the consumer supervisor.
    pub reconnect_initial_backoff: Duration,
    /// Upper bound the reconnect backoff is capped at.
    pub reconnect_max_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers_per_queue: 5,
            prefetch_per_worker: 10,
            publish_confirm_timeout: Duration::from_secs(5),
            dlq_publish_retry_delay: Duration::from_secs(1),
            reconnect_initial_backoff: Duration::from_millis(500),
            reconnect_max_backoff: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn with_workers_per_queue(mut self, workers: usize) -> Self {
        self.workers_per_queue = workers;
        self
    }

    pub fn with_prefetch_per_worker(mut self, prefetch: u16) -> Self {
        self.prefetch_per_worker = prefetch;
        self
    }

    pub fn with_publish_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.publish_confirm_timeout = timeout;
        self
    }

    pub fn with_dlq_publish_retry_delay(mut self, delay: Duration) -> Self {
        self.dlq_publish_retry_delay = delay;
        self
    }

    /// Total in-flight deliveries this queue's broker QoS will allow
    /// (spec.md §5): `workers × prefetchPerWorker`.
    pub fn total_prefetch(&self) -> u16 {
        let total = self.workers_per_queue as u64 * self.prefetch_per_worker as u64;
        total.min(u16::MAX as u64) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.workers_per_queue, 5);
        assert_eq!(c.prefetch_per_worker, 10);
        assert_eq!(c.dlq_publish_retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn total_prefetch_multiplies_and_caps() {
        let c = Config::default();
        assert_eq!(c.total_prefetch(), 50);

        let huge = Config::default()
            .with_workers_per_queue(10_000)
            .with_prefetch_per_worker(u16::MAX);
        assert_eq!(huge.total_prefetch(), u16::MAX);
    }
}
