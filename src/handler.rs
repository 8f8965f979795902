//! The handler contract (spec.md §6): the one seam business logic plugs
//! into. Handlers are pure from the core's perspective and must tolerate
//! repeated delivery of the same body.

use async_trait::async_trait;

/// Per-delivery context built by the pipeline (spec.md §4.4 step 2): the
/// message identifier and whatever correlation/trace identifiers the
/// producer attached.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    pub midaz_id: String,
    pub correlation_id: Option<String>,
    pub header_id: Option<String>,
}

/// A business-logic error, opaque to the core. Only ever classified by
/// substring (spec.md §4.1) — never propagated to callers as a typed value.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: DeliveryContext, body: Vec<u8>) -> Result<(), HandlerError>;
}

/// Adapts a plain async closure into a [`Handler`], for tests and simple
/// bindings that don't need a dedicated struct.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(DeliveryContext, Vec<u8>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, ctx: DeliveryContext, body: Vec<u8>) -> Result<(), HandlerError> {
        (self.0)(ctx, body).await
    }
}
