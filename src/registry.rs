//! Registry API (spec.md §6): binds handlers to queues and launches a
//! supervisor per binding. The routing table is mutated only before
//! `run_consumers` and is treated as immutable after, matching spec.md §5.

use std::collections::HashMap;
use std::sync::Arc;

use lapin::Connection;

use crate::config::Config;
use crate::handler::Handler;
use crate::shutdown::{shutdown_pair, ShutdownHandle, ShutdownSignal};
use crate::supervisor::Supervisor;

/// Binds queue names to handlers and starts a supervisor per binding.
pub struct Registry {
    bindings: HashMap<String, Arc<dyn Handler>>,
    config: Config,
}

impl Registry {
    pub fn new(config: Config) -> Self {
        Self {
            bindings: HashMap::new(),
            config,
        }
    }

    /// `Register(queueName, handler)` (spec.md §6): binds one handler to one
    /// queue. Last write wins on duplicate registration.
    pub fn register(&mut self, queue_name: impl Into<String>, handler: Arc<dyn Handler>) {
        self.bindings.insert(queue_name.into(), handler);
    }

    /// `RunConsumers()` (spec.md §6): starts a supervisor per registered
    /// binding and returns once all are launched — it does not block for
    /// their lifetime and never surfaces per-queue errors (those are only
    /// observable via logs/metrics, per spec.md §7).
    ///
    /// Returns a [`ShutdownHandle`] the caller uses to drive graceful
    /// shutdown: cancel first, then close the broker connection to drain
    /// workers (spec.md §5).
    pub fn run_consumers(self, conn: Arc<Connection>) -> ShutdownHandle {
        let (handle, signal) = shutdown_pair();
        self.run_consumers_with_shutdown(conn, signal);
        handle
    }

    /// Variant of [`Self::run_consumers`] for callers that already manage
    /// their own shutdown signal (e.g. to share it across multiple
    /// registries or components).
    pub fn run_consumers_with_shutdown(self, conn: Arc<Connection>, shutdown: ShutdownSignal) {
        for (queue, handler) in self.bindings {
            let supervisor = Supervisor::new(queue, handler, conn.clone(), self.config.clone(), shutdown.clone());
            tokio::spawn(supervisor.run());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{DeliveryContext, HandlerError};
    use async_trait::async_trait;

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn handle(&self, _ctx: DeliveryContext, _body: Vec<u8>) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn register_last_write_wins() {
        let mut registry = Registry::new(Config::default());
        registry.register("orders", Arc::new(NoopHandler));
        registry.register("orders", Arc::new(NoopHandler));
        assert_eq!(registry.bindings.len(), 1);
    }

    #[test]
    fn register_tracks_distinct_queues() {
        let mut registry = Registry::new(Config::default());
        registry.register("orders", Arc::new(NoopHandler));
        registry.register("payments", Arc::new(NoopHandler));
        assert_eq!(registry.bindings.len(), 2);
    }
}
