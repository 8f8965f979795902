//! Worker pool (spec.md §2 component 7, §4.5 step 6, §5).
//!
//! `workers` tasks share one delivery stream behind a mutex — the broker's
//! QoS prefetch already bounds total in-flight deliveries, so the mutex only
//! ever gates "who gets the next delivery," never throughput. Each worker
//! runs deliveries through it one at a time and exits only when the stream
//! closes, which is this crate's signal that the channel went away.

use std::sync::Arc;

use futures_util::StreamExt;
use lapin::Consumer;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::handler::Handler;
use crate::pipeline;
use crate::retry::RetryEngine;
use crate::shutdown::ShutdownSignal;

/// Spawns `worker_count` tasks draining `consumer` concurrently. Returns
/// their join handles; the caller awaits all of them to learn the stream
/// has closed.
pub fn spawn_workers(
    worker_count: usize,
    consumer: Consumer,
    queue: String,
    handler: Arc<dyn Handler>,
    retry_engine: Arc<RetryEngine>,
    shutdown: ShutdownSignal,
) -> Vec<JoinHandle<()>> {
    let shared = Arc::new(Mutex::new(consumer));

    (0..worker_count)
        .map(|worker_id| {
            let shared = shared.clone();
            let queue = queue.clone();
            let handler = handler.clone();
            let retry_engine = retry_engine.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(worker_loop(worker_id, shared, queue, handler, retry_engine, shutdown))
        })
        .collect()
}

async fn worker_loop(
    worker_id: usize,
    consumer: Arc<Mutex<Consumer>>,
    queue: String,
    handler: Arc<dyn Handler>,
    retry_engine: Arc<RetryEngine>,
    shutdown: ShutdownSignal,
) {
    loop {
        let next = {
            let mut guard = consumer.lock().await;
            guard.next().await
        };

        match next {
            Some(Ok(delivery)) => {
                pipeline::process_delivery(
                    handler.clone(),
                    retry_engine.clone(),
                    &queue,
                    delivery,
                    shutdown.clone(),
                )
                .await;
            }
            Some(Err(e)) => {
                // A channel-level error on the stream means this channel is
                // done for; looping back into `next()` would just spin
                // against a dead channel. Exit so the supervisor observes
                // the close and restarts (spec.md §4.5 step 7).
                error!(queue, worker_id, error = %e, "channel error, worker exiting");
                return;
            }
            None => {
                info!(queue, worker_id, "delivery stream closed, worker exiting");
                return;
            }
        }
    }
}
