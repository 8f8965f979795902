//! Consumer supervisor (spec.md §2 component 8, §4.5).
//!
//! One supervisor task per registered queue. Its outer loop runs until
//! shutdown: acquire a channel, set QoS, start consuming, spawn workers,
//! wait for the stream to close, then restart with jittered exponential
//! backoff. A panic guard wraps each outer-loop iteration so a bug in setup
//! can't kill the supervisor — matching the teacher's habit of keeping
//! connection-management tasks alive independent of what they're managing.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use lapin::options::{BasicConsumeOptions, BasicQosOptions};
use lapin::types::FieldTable;
use lapin::Connection;
use rand::Rng;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::handler::Handler;
use crate::panic_util::stringify_panic;
use crate::retry::RetryEngine;
use crate::shutdown::ShutdownSignal;
use crate::worker;

pub struct Supervisor {
    queue: String,
    handler: Arc<dyn Handler>,
    conn: Arc<Connection>,
    config: Config,
    retry_engine: Arc<RetryEngine>,
    shutdown: ShutdownSignal,
}

impl Supervisor {
    pub fn new(
        queue: String,
        handler: Arc<dyn Handler>,
        conn: Arc<Connection>,
        config: Config,
        shutdown: ShutdownSignal,
    ) -> Self {
        let retry_engine = Arc::new(RetryEngine::new(conn.clone(), config.clone()));
        Self {
            queue,
            handler,
            conn,
            config,
            retry_engine,
            shutdown,
        }
    }

    /// Runs the outer supervisor loop until shutdown fires. Never returns an
    /// error — setup failures are logged and retried indefinitely.
    pub async fn run(mut self) {
        let mut backoff = self.config.reconnect_initial_backoff;

        loop {
            if self.shutdown.is_shutdown() {
                info!(queue = %self.queue, "shutdown requested, supervisor exiting");
                return;
            }

            let iteration = AssertUnwindSafe(self.run_once()).catch_unwind().await;
            match iteration {
                Ok(Ok(())) => {
                    backoff = self.config.reconnect_initial_backoff;
                }
                Ok(Err(e)) => {
                    warn!(queue = %self.queue, error = %e, backoff_ms = backoff.as_millis(), "supervisor setup failed, retrying");
                    if !self.shutdown.sleep_or_cancel(full_jitter(backoff)).await {
                        return;
                    }
                    backoff = next_backoff(backoff, self.config.reconnect_max_backoff);
                }
                Err(panic_payload) => {
                    let msg = stringify_panic(&panic_payload);
                    error!(queue = %self.queue, panic = %msg, "supervisor iteration panicked, restarting");
                    if !self.shutdown.sleep_or_cancel(full_jitter(backoff)).await {
                        return;
                    }
                    backoff = next_backoff(backoff, self.config.reconnect_max_backoff);
                }
            }
        }
    }

    /// One pass of the outer loop: acquire channel, QoS, consume, spawn
    /// workers, wait for the stream to close. Returns once the stream has
    /// closed, ready to be called again by `run`.
    async fn run_once(&self) -> Result<(), crate::error::ConsumerError> {
        let channel = self
            .conn
            .create_channel()
            .await
            .map_err(|e| crate::error::ConsumerError::ChannelUnavailable(e.to_string()))?;

        channel
            .basic_qos(self.config.total_prefetch(), BasicQosOptions::default())
            .await
            .map_err(|e| crate::error::ConsumerError::QosFailed(e.to_string()))?;

        let consumer = channel
            .basic_consume(
                &self.queue,
                "",
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| crate::error::ConsumerError::ConsumeFailed(e.to_string()))?;

        // Registers a channel-close notification sink (spec.md §4.5 step 5):
        // the broker can close the channel out from under the consumer
        // stream without every worker observing a clean stream end, so the
        // supervisor needs its own independent signal to restart on.
        let (close_tx, mut close_rx) = watch::channel(false);
        let queue_for_close = self.queue.clone();
        channel.on_error(move |err| {
            warn!(queue = %queue_for_close, error = %err, "broker channel closed");
            let _ = close_tx.send(true);
        });

        info!(queue = %self.queue, workers = self.config.workers_per_queue, "consuming");

        let handles = worker::spawn_workers(
            self.config.workers_per_queue,
            consumer,
            self.queue.clone(),
            self.handler.clone(),
            self.retry_engine.clone(),
            self.shutdown.clone(),
        );

        let join_workers = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(queue = %self.queue, error = %e, "worker task ended abnormally");
                }
            }
        };

        // Block on whichever happens first (spec.md §4.5 step 7): all
        // workers finished draining the stream, or the broker told us the
        // channel is gone. Either way, restart from step 1.
        tokio::select! {
            _ = join_workers => {
                info!(queue = %self.queue, "workers drained, will restart consumption");
            }
            _ = close_rx.changed() => {
                info!(queue = %self.queue, "channel close notification received, will restart consumption");
            }
        }

        Ok(())
    }
}

/// AWS-style full-jitter backoff: uniform random in `[0, backoff]`.
fn full_jitter(backoff: Duration) -> Duration {
    let millis = backoff.as_millis().max(1) as u64;
    let jittered = rand::thread_rng().gen_range(0..=millis);
    Duration::from_millis(jittered)
}

fn next_backoff(current: Duration, cap: Duration) -> Duration {
    (current * 2).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_jitter_stays_within_bound() {
        let backoff = Duration::from_secs(10);
        for _ in 0..100 {
            let j = full_jitter(backoff);
            assert!(j <= backoff);
        }
    }

    #[test]
    fn next_backoff_doubles_and_caps() {
        let cap = Duration::from_secs(30);
        assert_eq!(next_backoff(Duration::from_millis(500), cap), Duration::from_secs(1));
        assert_eq!(next_backoff(Duration::from_secs(20), cap), cap);
    }
}
