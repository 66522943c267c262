//! Publish and concat background loops of the contracter.

use std::sync::Arc;

use fftb_models::{DealerResult, ErrorKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::contracter::Contracter;
use crate::metrics;

/// Outcome of one worker tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// An order was processed
    Worked,
    /// Nothing to do this tick
    Idle,
    /// The dealer already holds enough queued segments
    Throttled,
}

/// Publish at most one queued order, respecting the queued-segments ceiling.
pub async fn publish_tick(contracter: &Contracter, cancel: &CancellationToken) -> DealerResult<Tick> {
    let order = match contracter.pick_order_from_queue().await {
        Ok(order) => order,
        Err(e) if skippable(e.kind()) => return Ok(Tick::Idle),
        Err(e) => return Err(e),
    };

    // Compared without holding anything, so the ceiling is best effort.
    let queued = match contracter.dealer().get_queued_segments_count(&order.publisher).await {
        Ok(count) => count,
        Err(e) if skippable(e.kind()) => return Ok(Tick::Idle),
        Err(e) => return Err(e),
    };
    metrics::set_queued_segments(queued);

    if queued >= contracter.config().max_queued_segments {
        debug!(queued, order_id = %order.id, "Queued segments at ceiling, postponing publish");
        return Ok(Tick::Throttled);
    }

    if let Err(e) = contracter.publish_order(&order.id, cancel).await {
        if skippable(e.kind()) || cancel.is_cancelled() {
            debug!(order_id = %order.id, error = %e, "Publish skipped");
            return Ok(Tick::Idle);
        }

        warn!(order_id = %order.id, error = %e, "Failed to publish order");
        contracter.fail_order_by_id(&order.id, &e.to_string()).await?;
    }

    Ok(Tick::Worked)
}

/// Concatenate at most one order whose segments are all finished.
pub async fn concat_tick(contracter: &Contracter, cancel: &CancellationToken) -> DealerResult<Tick> {
    let order = match contracter.pick_order_for_concat().await {
        Ok(order) => order,
        Err(e) if skippable(e.kind()) => return Ok(Tick::Idle),
        Err(e) => return Err(e),
    };

    if let Err(e) = contracter.concat_order(&order.id, cancel).await {
        // Shutdown is not the order's fault
        if cancel.is_cancelled() {
            debug!(order_id = %order.id, error = %e, "Concat interrupted");
            return Ok(Tick::Idle);
        }

        warn!(order_id = %order.id, error = %e, "Failed to concat order");
        contracter.fail_order_by_id(&order.id, &e.to_string()).await?;
    }

    Ok(Tick::Worked)
}

fn skippable(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::NotFound | ErrorKind::LockTimeout)
}

/// Run the publish loop until `cancel` fires.
pub fn spawn_publish_worker(contracter: Arc<Contracter>, cancel: CancellationToken) -> JoinHandle<()> {
    spawn_loop("publish", contracter, cancel, |contracter, cancel| async move {
        publish_tick(&contracter, &cancel).await
    })
}

/// Run the concat loop until `cancel` fires.
pub fn spawn_concat_worker(contracter: Arc<Contracter>, cancel: CancellationToken) -> JoinHandle<()> {
    spawn_loop("concat", contracter, cancel, |contracter, cancel| async move {
        concat_tick(&contracter, &cancel).await
    })
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    contracter: Arc<Contracter>,
    cancel: CancellationToken,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<Contracter>, CancellationToken) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = DealerResult<Tick>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(contracter.config().poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(worker = name, "Contracter worker started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = tick(Arc::clone(&contracter), cancel.clone()).await {
                        error!(worker = name, error = %e, "Contracter worker tick failed");
                    }
                }
            }
        }

        info!(worker = name, "Contracter worker stopped");
    })
}
