//! Resilient AMQP message-consumer core for a transaction-processing
//! service: bounded retry, dead-letter routing, and panic-safe worker
//! pools on the consume side, plus a multi-tenant producer sharing the
//! same channel-lifecycle conventions.
//!
//! Callers plug in a [`handler::Handler`] per queue, register bindings on a
//! [`registry::Registry`], and call [`registry::Registry::run_consumers`].

pub mod classify;
pub mod config;
pub mod dlq;
pub mod error;
pub mod handler;
pub mod headers;
pub mod metrics;
pub mod panic_util;
pub mod pipeline;
pub mod producer;
pub mod registry;
pub mod retry;
pub mod shutdown;
pub mod supervisor;
pub mod telemetry;
pub mod worker;

pub use config::Config;
pub use error::{ConsumerError, DlqError, HeaderError, ProducerError};
pub use handler::{DeliveryContext, FnHandler, Handler, HandlerError};
pub use producer::{ChannelProvider, Producer, PublishContext};
pub use registry::Registry;
pub use shutdown::{shutdown_pair, ShutdownHandle, ShutdownSignal};
