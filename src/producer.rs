//! Multi-tenant producer (spec.md §2 component 9, §4.6): publishes outbound
//! events to a broker channel resolved per tenant, reusing the same
//! persistent-delivery and trace-header conventions as the consumer side.
//!
//! Connection lifecycle is delegated entirely to the injected
//! [`ChannelProvider`] — this type never owns a [`Connection`] itself, just
//! like the teacher's publisher leaves reconnect/eviction to its own pool.

use async_trait::async_trait;
use lapin::types::{AMQPValue, FieldTable, LongString};
use lapin::{BasicProperties, Channel};
use tracing::Span;
use uuid::Uuid;

use crate::error::ProducerError;

/// Resolves a broker channel for a tenant. Implementations own connection
/// pooling/eviction; the producer only ever asks for a channel and closes it
/// when done.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    async fn channel_for_tenant(&self, tenant: &str) -> Result<Channel, String>;

    /// Releases any connections this provider manages. Default is a no-op,
    /// tolerant of providers with nothing to release (spec.md §4.6).
    async fn close(&self) {}
}

/// Context carried into [`Producer::publish`]: the tenant the message
/// belongs to and a request identifier propagated as a header.
#[derive(Debug, Clone)]
pub struct PublishContext {
    pub tenant: String,
    pub request_id: String,
}

impl PublishContext {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            request_id: Uuid::now_v7().to_string(),
        }
    }
}

const REQUEST_ID_HEADER: &str = "x-request-id";
const TRACE_ID_HEADER: &str = "x-trace-id";

/// Publishes outbound events on behalf of tenants (spec.md §4.6).
pub struct Producer {
    provider: Box<dyn ChannelProvider>,
}

impl Producer {
    pub fn new(provider: Box<dyn ChannelProvider>) -> Self {
        Self { provider }
    }

    /// `publish(ctx, exchange, routingKey, body)`: resolves a channel for
    /// `ctx.tenant`, publishes persistently with `content-type:
    /// application/json` and trace headers, and always closes the channel
    /// before returning.
    pub async fn publish(
        &self,
        ctx: &PublishContext,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), ProducerError> {
        if ctx.tenant.is_empty() {
            return Err(ProducerError::MissingTenant);
        }

        let channel = self
            .provider
            .channel_for_tenant(&ctx.tenant)
            .await
            .map_err(|source| ProducerError::ChannelUnavailable {
                tenant: ctx.tenant.clone(),
                source,
            })?;

        let result = self.publish_on(&channel, ctx, exchange, routing_key, body).await;

        // Best-effort: a failure closing an already-failed channel isn't
        // worth surfacing over the publish result itself.
        let _ = channel.close(200, "publish complete").await;

        result
    }

    async fn publish_on(
        &self,
        channel: &Channel,
        ctx: &PublishContext,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), ProducerError> {
        let mut headers = FieldTable::default();
        headers.insert(
            REQUEST_ID_HEADER.into(),
            AMQPValue::LongString(LongString::from(ctx.request_id.as_str())),
        );
        let trace_id = Span::current().id().map(|id| id.into_u64().to_string());
        if let Some(trace_id) = trace_id {
            headers.insert(TRACE_ID_HEADER.into(), AMQPValue::LongString(LongString::from(trace_id.as_str())));
        }

        let properties = BasicProperties::default()
            .with_delivery_mode(2)
            .with_content_type("application/json".into())
            .with_headers(headers);

        channel
            .basic_publish(
                exchange,
                routing_key,
                lapin::options::BasicPublishOptions::default(),
                body,
                properties,
            )
            .await
            .map_err(|e| ProducerError::Publish {
                tenant: ctx.tenant.clone(),
                source: e.to_string(),
            })?;

        Ok(())
    }

    /// Always healthy: connection health is the provider's concern (spec.md §4.6).
    pub fn is_healthy(&self) -> bool {
        true
    }

    /// Releases provider-managed connections. Never panics even if the
    /// provider has nothing to release.
    pub async fn close(self) {
        self.provider.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingProvider;

    #[async_trait]
    impl ChannelProvider for FailingProvider {
        async fn channel_for_tenant(&self, _tenant: &str) -> Result<Channel, String> {
            Err("no connection for tenant".to_string())
        }
    }

    #[tokio::test]
    async fn empty_tenant_is_rejected_before_provider_is_consulted() {
        let producer = Producer::new(Box::new(FailingProvider));
        let ctx = PublishContext {
            tenant: String::new(),
            request_id: "req-1".to_string(),
        };
        let err = producer.publish(&ctx, "ex", "rk", b"{}").await.unwrap_err();
        assert!(matches!(err, ProducerError::MissingTenant));
    }

    #[tokio::test]
    async fn channel_resolution_failure_is_wrapped_with_tenant() {
        let producer = Producer::new(Box::new(FailingProvider));
        let ctx = PublishContext::new("tenant-42");
        let err = producer.publish(&ctx, "ex", "rk", b"{}").await.unwrap_err();
        match err {
            ProducerError::ChannelUnavailable { tenant, .. } => assert_eq!(tenant, "tenant-42"),
            other => panic!("expected ChannelUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn producer_reports_healthy_unconditionally() {
        let producer = Producer::new(Box::new(FailingProvider));
        assert!(producer.is_healthy());
    }

    #[tokio::test]
    async fn mocked_provider_error_is_wrapped_with_tenant() {
        let mut mock = MockChannelProvider::new();
        mock.expect_channel_for_tenant()
            .withf(|tenant: &str| tenant == "tenant-9")
            .returning(|_| Err("connection pool exhausted".to_string()));

        let producer = Producer::new(Box::new(mock));
        let ctx = PublishContext::new("tenant-9");
        let err = producer.publish(&ctx, "ex", "rk", b"{}").await.unwrap_err();
        match err {
            ProducerError::ChannelUnavailable { tenant, source } => {
                assert_eq!(tenant, "tenant-9");
                assert_eq!(source, "connection pool exhausted");
            }
            other => panic!("expected ChannelUnavailable, got {other:?}"),
        }
    }
}
