use thiserror::Error;

/// Errors surfaced by the DLQ publish path (spec.md §4.2, §7).
#[derive(Error, Debug)]
pub enum DlqError {
    #[error("broker nacked the DLQ publish")]
    BrokerNack,
    #[error("timed out waiting for publisher confirm")]
    ConfirmTimeout,
    #[error("confirm channel closed while publish was outstanding")]
    ConfirmChannelClosed,
    #[error("internal broker error: {0}")]
    Internal(String),
}

impl From<lapin::Error> for DlqError {
    fn from(err: lapin::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("closed") || msg.contains("InvalidChannelState") {
            DlqError::ConfirmChannelClosed
        } else {
            DlqError::Internal(msg)
        }
    }
}

/// Errors from header utilities (spec.md §4.1).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("cannot build a DLQ name from an empty queue name")]
    EmptyQueueName,
}

/// Errors surfaced by the multi-tenant producer (spec.md §4.6, §7).
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("no tenant identifier present in the outgoing context")]
    MissingTenant,
    #[error("failed to resolve a channel for tenant {tenant}: {source}")]
    ChannelUnavailable { tenant: String, source: String },
    #[error("publish failed for tenant {tenant}: {source}")]
    Publish { tenant: String, source: String },
}

/// Errors surfaced while the consumer supervisor is setting up (spec.md §4.5, §7).
/// These are logged and retried indefinitely; `ConsumerError` only exists so that
/// internal setup steps can short-circuit with `?` before the retry loop decides
/// whether to back off and try again.
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("failed to acquire broker channel: {0}")]
    ChannelUnavailable(String),
    #[error("failed to set QoS: {0}")]
    QosFailed(String),
    #[error("failed to start consuming: {0}")]
    ConsumeFailed(String),
}
