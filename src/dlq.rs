//! DLQ publisher (spec.md §2 component 4, §4.2).
//!
//! Opens a fresh, transient channel per publish so publisher-confirm mode —
//! a channel-scoped setting — never contaminates the long-lived consume
//! channel, and so a DLQ publish failure can never tear down consumption.
//! This mirrors the teacher's habit of giving every RabbitMQ operation
//! (subscribe, publish) its own channel rather than sharing one.

use std::time::Duration;

use lapin::options::{ConfirmSelectOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{options::BasicPublishOptions, BasicProperties, Connection};

use crate::error::DlqError;

/// Everything needed to republish or DLQ-route a message's body, independent
/// of the lapin `Delivery` it was extracted from.
pub struct OutboundMessage<'a> {
    pub body: &'a [u8],
    pub content_type: Option<&'a str>,
}

/// Publishes `message` to `dlq_name` with `headers`, waiting on a bounded
/// publisher-confirm (spec.md §4.2). Single attempt — the retry engine is
/// responsible for the one outer retry.
pub async fn publish_to_dlq(
    conn: &Connection,
    dlq_name: &str,
    message: &OutboundMessage<'_>,
    headers: FieldTable,
    confirm_timeout: Duration,
) -> Result<(), DlqError> {
    let channel = conn
        .create_channel()
        .await
        .map_err(|e| DlqError::Internal(format!("failed to open DLQ channel: {e}")))?;

    channel
        .queue_declare(
            dlq_name,
            QueueDeclareOptions {
                durable: true,
                exclusive: false,
                auto_delete: false,
                nowait: false,
                passive: false,
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| DlqError::Internal(format!("failed to declare DLQ {dlq_name}: {e}")))?;

    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .map_err(|e| DlqError::Internal(format!("failed to enable publisher confirms: {e}")))?;

    let mut properties = BasicProperties::default()
        .with_delivery_mode(2) // persistent
        .with_headers(headers);
    if let Some(ct) = message.content_type {
        properties = properties.with_content_type(ct.into());
    }

    let publish_result = channel
        .basic_publish(
            "", // default exchange
            dlq_name,
            BasicPublishOptions::default(),
            message.body,
            properties,
        )
        .await
        .map_err(DlqError::from);

    let result = match publish_result {
        Ok(confirm) => match tokio::time::timeout(confirm_timeout, confirm).await {
            Ok(Ok(lapin::publisher_confirm::Confirmation::Ack(_))) => Ok(()),
            Ok(Ok(lapin::publisher_confirm::Confirmation::Nack(_))) => Err(DlqError::BrokerNack),
            Ok(Ok(lapin::publisher_confirm::Confirmation::NotRequested)) => {
                Err(DlqError::ConfirmChannelClosed)
            }
            Ok(Err(e)) => Err(DlqError::from(e)),
            Err(_) => Err(DlqError::ConfirmTimeout),
        },
        Err(e) => Err(e),
    };

    // Best-effort close on every exit path; a close failure doesn't change
    // the publish outcome we already determined.
    let _ = channel.close(200, "dlq publish complete").await;

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_message_carries_content_type() {
        let body = b"hello".to_vec();
        let msg = OutboundMessage {
            body: &body,
            content_type: Some("application/json"),
        };
        assert_eq!(msg.content_type, Some("application/json"));
    }
}
