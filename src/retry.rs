//! Retry engine (spec.md §2 component 5, §4.3).
//!
//! Shared decision for both the business-error and panic paths: republish
//! with backoff while retry budget remains, otherwise route to the DLQ.
//! The engine owns finalization of the original delivery — ack, nack, or
//! reject — so callers never have to reason about which branch already
//! finalized it.

use std::sync::Arc;

use lapin::message::Delivery;
use lapin::options::{BasicNackOptions, BasicPublishOptions, BasicRejectOptions};
use lapin::{BasicProperties, Connection};
use tracing::{error, warn};

use crate::config::Config;
use crate::dlq::{self, OutboundMessage};
use crate::headers::{self, MAX_RETRIES};
use crate::metrics;
use crate::shutdown::ShutdownSignal;

/// The two failure modes the message-processing pipeline can hand off.
#[derive(Debug, Clone)]
pub enum FailureReason {
    BusinessError(crate::classify::ErrorCategory),
    Panic(crate::classify::PanicCategory),
}

impl FailureReason {
    /// The sanitized `x-dlq-reason` value (spec.md §3 `DLQHeaders`).
    fn dlq_reason(&self) -> String {
        match self {
            FailureReason::BusinessError(cat) => format!("business_error:{cat}"),
            FailureReason::Panic(cat) => format!("panic:{cat}"),
        }
    }

    fn metric_reason(&self) -> String {
        match self {
            FailureReason::BusinessError(cat) => cat.to_string(),
            FailureReason::Panic(cat) => cat.to_string(),
        }
    }

    fn is_business_error(&self) -> bool {
        matches!(self, FailureReason::BusinessError(_))
    }
}

/// Owns the connection and config the retry engine needs to republish or
/// DLQ-route a delivery. One instance is shared across every worker on a
/// queue.
pub struct RetryEngine {
    conn: Arc<Connection>,
    config: Config,
}

impl RetryEngine {
    pub fn new(conn: Arc<Connection>, config: Config) -> Self {
        Self { conn, config }
    }

    /// Routes a failed delivery to either republish or the DLQ, finalizing
    /// it (ack/nack/reject) along the way. `queue` is the original queue
    /// name the delivery was consumed from.
    pub async fn route_failed_delivery(
        &self,
        queue: &str,
        delivery: &Delivery,
        reason: FailureReason,
        shutdown: &mut ShutdownSignal,
    ) {
        let retry_count = headers::read_retry_count(delivery.properties.headers());

        if retry_count < MAX_RETRIES - 1 {
            self.republish(queue, delivery, retry_count, shutdown).await;
        } else {
            self.route_to_dlq(queue, delivery, retry_count, &reason, shutdown).await;
        }
    }

    async fn republish(
        &self,
        queue: &str,
        delivery: &Delivery,
        retry_count: i32,
        shutdown: &mut ShutdownSignal,
    ) {
        let delay = headers::backoff(retry_count + 1);
        if !shutdown.sleep_or_cancel(delay).await {
            // Cancelled: leave the delivery unacked, broker will redeliver
            // after the channel closes (spec.md §5).
            return;
        }

        let next_count = headers::increment_retry_count(retry_count);
        let sanitized = headers::sanitize_headers(delivery.properties.headers());
        let headers = headers::with_retry_count(sanitized, next_count);

        let content_type = delivery
            .properties
            .content_type()
            .as_ref()
            .map(|s| s.as_str());
        let mut properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_headers(headers);
        if let Some(ct) = content_type {
            properties = properties.with_content_type(ct.into());
        }

        let publish_result = async {
            let channel = self.conn.create_channel().await?;
            channel
                .basic_publish(
                    "",
                    queue,
                    BasicPublishOptions::default(),
                    &delivery.data,
                    properties,
                )
                .await
        }
        .await;

        match publish_result {
            Ok(_) => {
                if let Err(e) = delivery.acker.ack(Default::default()).await {
                    warn!(queue, error = %e, "failed to ack original delivery after republish");
                }
                metrics::record_message_retry(queue);
            }
            Err(e) => {
                error!(queue, error = %e, "failed to republish message, falling back to nack policy");
                self.apply_nack_policy(queue, delivery, retry_count).await;
            }
        }
    }

    async fn route_to_dlq(
        &self,
        queue: &str,
        delivery: &Delivery,
        retry_count: i32,
        reason: &FailureReason,
        shutdown: &mut ShutdownSignal,
    ) {
        let dlq_name = match headers::build_dlq_name(queue) {
            Ok(name) => name,
            Err(_) => {
                error!(queue, "cannot build DLQ name for empty queue, rejecting delivery");
                self.reject_permanently(delivery).await;
                metrics::record_message_loss(queue, "empty_queue_name");
                return;
            }
        };

        let dlq_headers = dlq_headers_for(delivery.properties.headers(), queue, retry_count, reason);
        let content_type = delivery.properties.content_type().as_ref().map(|s| s.as_str());
        let message = OutboundMessage {
            body: &delivery.data,
            content_type,
        };

        let first_attempt = dlq::publish_to_dlq(
            &self.conn,
            &dlq_name,
            &message,
            dlq_headers.clone(),
            self.config.publish_confirm_timeout,
        )
        .await;

        if first_attempt.is_ok() {
            self.finalize_dlq_success(queue, delivery).await;
            return;
        }
        let first_err = first_attempt.unwrap_err();

        if !shutdown.sleep_or_cancel(self.config.dlq_publish_retry_delay).await {
            // Cancelled mid retry-delay: leave unacked (spec.md §5).
            return;
        }

        let second_attempt = dlq::publish_to_dlq(
            &self.conn,
            &dlq_name,
            &message,
            dlq_headers,
            self.config.publish_confirm_timeout,
        )
        .await;

        match second_attempt {
            Ok(()) => self.finalize_dlq_success(queue, delivery).await,
            Err(second_err) => {
                let reason_label = dlq_error_label(&second_err);
                error!(
                    queue,
                    first_error = %first_err,
                    second_error = %second_err,
                    "DLQ publish failed twice, permanent data loss"
                );
                metrics::record_dlq_publish_failure(queue, reason_label);
                metrics::record_message_loss(queue, reason_label);
                self.reject_permanently(delivery).await;
            }
        }
    }

    async fn finalize_dlq_success(&self, queue: &str, delivery: &Delivery) {
        if let Err(e) = delivery.acker.ack(Default::default()).await {
            warn!(queue, error = %e, "failed to ack original delivery after DLQ publish");
        }
        metrics::record_dlq_publish_success(queue);
    }

    /// Nack fallback policy (spec.md §4.3.3) used when republish cannot
    /// proceed (channel/publish failure). Never emits `nack(requeue=true)`.
    async fn apply_nack_policy(&self, queue: &str, delivery: &Delivery, retry_count: i32) {
        if retry_count >= MAX_RETRIES - 1 {
            metrics::record_message_loss(queue, "retry_budget_exhausted");
            self.reject_permanently(delivery).await;
        } else if let Err(e) = delivery
            .acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue: false,
            })
            .await
        {
            warn!(queue, error = %e, "failed to nack delivery after republish failure");
        }
    }

    async fn reject_permanently(&self, delivery: &Delivery) {
        if let Err(e) = delivery
            .acker
            .reject(BasicRejectOptions { requeue: false })
            .await
        {
            warn!(error = %e, "failed to reject delivery");
        }
    }
}

/// Builds the DLQ header set for a delivery being routed to the DLQ
/// (spec.md §8 seed case 3): `x-dlq-retry-count` carries the *post-final-
/// attempt* counter, i.e. `retry_count + 1`, not the raw counter read off
/// the incoming delivery.
fn dlq_headers_for(
    incoming_headers: &Option<lapin::types::FieldTable>,
    queue: &str,
    retry_count: i32,
    reason: &FailureReason,
) -> lapin::types::FieldTable {
    let sanitized = headers::sanitize_headers(incoming_headers);
    headers::build_dlq_headers(
        sanitized,
        &reason.dlq_reason(),
        queue,
        headers::increment_retry_count(retry_count),
        reason.is_business_error(),
    )
}

fn dlq_error_label(err: &crate::error::DlqError) -> &'static str {
    match err {
        crate::error::DlqError::BrokerNack => "broker_nack",
        crate::error::DlqError::ConfirmTimeout => "confirm_timeout",
        crate::error::DlqError::ConfirmChannelClosed => "confirm_channel_closed",
        crate::error::DlqError::Internal(_) => "internal_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorCategory;

    #[test]
    fn dlq_reason_formats_business_error() {
        let reason = FailureReason::BusinessError(ErrorCategory::ProcessingError);
        assert_eq!(reason.dlq_reason(), "business_error:processing_error");
        assert!(reason.is_business_error());
    }

    #[test]
    fn dlq_reason_formats_panic() {
        let reason = FailureReason::Panic(crate::classify::PanicCategory::NilPointerDereference);
        assert_eq!(reason.dlq_reason(), "panic:nil_pointer_dereference");
        assert!(!reason.is_business_error());
    }

    #[test]
    fn dlq_headers_carry_post_final_attempt_counter() {
        // Seed case 3 (spec.md §8): retryCount=4 (5th attempt) routed to DLQ
        // must emit x-dlq-retry-count=5, not the raw incoming counter.
        let reason = FailureReason::BusinessError(ErrorCategory::ProcessingError);
        let dlq_headers = dlq_headers_for(&None, "orders", 4, &reason);
        assert_eq!(
            dlq_headers.inner().get(headers::DLQ_RETRY_COUNT_HEADER),
            Some(&lapin::types::AMQPValue::LongInt(5))
        );
    }
}
