//! Message-processing pipeline (spec.md §2 component 6, §4.4): per-delivery
//! context construction, handler invocation under a panic guard, and the
//! hand-off to the retry engine on failure.
//!
//! The teacher's `Subscriber::process_messages` catches panics with
//! `std::panic::catch_unwind` around a *synchronous* callback. Handlers here
//! are async, so the guard is built on `futures_util::FutureExt::catch_unwind`
//! instead — the same technique, carried across the await boundary.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use lapin::message::Delivery;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::classify;
use crate::handler::{DeliveryContext, Handler};
use crate::headers::{self, CORRELATION_ID_HEADER, MIDAZ_HEADER_ID_HEADER};
use crate::panic_util::stringify_panic;
use crate::retry::{FailureReason, RetryEngine};
use crate::shutdown::ShutdownSignal;

/// Processes a single delivery end to end: builds the per-delivery context,
/// invokes the handler under a panic guard, and finalizes the delivery
/// (ack directly on success, or via the retry engine on failure).
pub async fn process_delivery(
    handler: Arc<dyn Handler>,
    retry_engine: Arc<RetryEngine>,
    queue: &str,
    delivery: Delivery,
    mut shutdown: ShutdownSignal,
) {
    let midaz_id =
        headers::read_midaz_id(delivery.properties.headers()).unwrap_or_else(|| Uuid::now_v7().to_string());
    let correlation_id = headers::read_string_header(delivery.properties.headers(), CORRELATION_ID_HEADER);
    let header_id = headers::read_string_header(delivery.properties.headers(), MIDAZ_HEADER_ID_HEADER);

    let span = info_span!(
        "process_delivery",
        queue = %queue,
        midaz_id = %midaz_id,
        correlation_id = correlation_id.as_deref().unwrap_or("")
    );

    async {
        let ctx = DeliveryContext {
            midaz_id: midaz_id.clone(),
            correlation_id,
            header_id,
        };
        let body = delivery.data.clone();

        let outcome = AssertUnwindSafe(handler.handle(ctx, body)).catch_unwind().await;

        match outcome {
            Ok(Ok(())) => {
                if let Err(e) = delivery.acker.ack(Default::default()).await {
                    warn!(queue, error = %e, "failed to ack successfully processed delivery, broker will redeliver");
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "business_error");
                let category = classify::classify_error(&err.to_string());
                retry_engine
                    .route_failed_delivery(
                        queue,
                        &delivery,
                        FailureReason::BusinessError(category),
                        &mut shutdown,
                    )
                    .await;
            }
            Err(panic_payload) => {
                let panic_str = stringify_panic(&panic_payload);
                tracing::error!(panic = %panic_str, "panic.recovered");
                let category = classify::classify_panic(&panic_str);
                retry_engine
                    .route_failed_delivery(queue, &delivery, FailureReason::Panic(category), &mut shutdown)
                    .await;
            }
        }
    }
    .instrument(span)
    .await;
}

