//! Process-wide metrics registry (spec.md §2 component 3, §6).
//!
//! Grounded in the `prometheus` + `lazy_static!` idiom used by the sibling
//! `message-bus` crate: metric vectors are registered once, lazily, behind
//! a process-wide static, and the counters themselves are lock-free once the
//! vector exists (`prometheus::CounterVec` uses sharded atomics internally).
//! `reset_for_tests` exists purely for test isolation, per spec.md §5.

use lazy_static::lazy_static;
use prometheus::{register_counter_vec, CounterVec};

use crate::headers::truncate_label;

lazy_static! {
    /// `dlq_publish_success_total{queue}`
    pub static ref DLQ_PUBLISH_SUCCESS_TOTAL: CounterVec = register_counter_vec!(
        "dlq_publish_success_total",
        "Number of messages successfully published to a dead-letter queue",
        &["queue"]
    )
    .unwrap();

    /// `dlq_publish_failure_total{queue,reason}`
    pub static ref DLQ_PUBLISH_FAILURE_TOTAL: CounterVec = register_counter_vec!(
        "dlq_publish_failure_total",
        "Number of failed dead-letter queue publish attempts, by reason",
        &["queue", "reason"]
    )
    .unwrap();

    /// `message_retry_total{queue}`
    pub static ref MESSAGE_RETRY_TOTAL: CounterVec = register_counter_vec!(
        "message_retry_total",
        "Number of messages republished for a retry attempt",
        &["queue"]
    )
    .unwrap();

    /// `message_loss_total{queue,reason}`
    pub static ref MESSAGE_LOSS_TOTAL: CounterVec = register_counter_vec!(
        "message_loss_total",
        "Number of messages permanently dropped, by reason",
        &["queue", "reason"]
    )
    .unwrap();
}

pub fn record_dlq_publish_success(queue: &str) {
    DLQ_PUBLISH_SUCCESS_TOTAL
        .with_label_values(&[&truncate_label(queue)])
        .inc();
}

pub fn record_dlq_publish_failure(queue: &str, reason: &str) {
    DLQ_PUBLISH_FAILURE_TOTAL
        .with_label_values(&[&truncate_label(queue), &truncate_label(reason)])
        .inc();
}

pub fn record_message_retry(queue: &str) {
    MESSAGE_RETRY_TOTAL
        .with_label_values(&[&truncate_label(queue)])
        .inc();
}

pub fn record_message_loss(queue: &str, reason: &str) {
    MESSAGE_LOSS_TOTAL
        .with_label_values(&[&truncate_label(queue), &truncate_label(reason)])
        .inc();
}

/// Resets every counter. Test isolation only — never call this in production
/// code (spec.md §5).
pub fn reset_for_tests() {
    DLQ_PUBLISH_SUCCESS_TOTAL.reset();
    DLQ_PUBLISH_FAILURE_TOTAL.reset();
    MESSAGE_RETRY_TOTAL.reset();
    MESSAGE_LOSS_TOTAL.reset();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_and_reset() {
        reset_for_tests();
        record_dlq_publish_success("orders");
        record_message_retry("orders");
        assert_eq!(
            DLQ_PUBLISH_SUCCESS_TOTAL.with_label_values(&["orders"]).get(),
            1.0
        );
        assert_eq!(MESSAGE_RETRY_TOTAL.with_label_values(&["orders"]).get(), 1.0);
        reset_for_tests();
        assert_eq!(
            DLQ_PUBLISH_SUCCESS_TOTAL.with_label_values(&["orders"]).get(),
            0.0
        );
    }

    #[test]
    fn failure_reason_label_is_truncated() {
        reset_for_tests();
        let long_reason = "x".repeat(200);
        record_dlq_publish_failure("orders", &long_reason);
        let labels = DLQ_PUBLISH_FAILURE_TOTAL.collect();
        let has_truncated = labels
            .iter()
            .flat_map(|mf| mf.get_metric())
            .any(|m| m.get_label().iter().any(|l| l.value().len() <= 64));
        assert!(has_truncated);
    }
}
