pub mod processor;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::meals::repo::MealStore;
use crate::queue::{QueueMessage, WorkQueue};

pub use processor::{process_message, Outcome, ProcessorContext};

/// One queue consumer. Several of these run concurrently with no shared
/// in-memory state; the conditional update on the meal row is the only
/// coordination between them.
pub struct Worker {
    pub ctx: Arc<ProcessorContext>,
    pub queue: Arc<dyn WorkQueue>,
    pub max_receive_count: u32,
    pub retry_backoff: Duration,
}

impl Worker {
    pub async fn run(self) {
        loop {
            let batch = match self.queue.receive().await {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "queue receive failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };
            for msg in batch {
                self.handle(msg).await;
            }
        }
    }

    /// Handle one delivery end to end, including the ack/requeue decision.
    pub async fn handle(&self, msg: QueueMessage) {
        let outcome = process_message(&self.ctx, &msg).await;
        match outcome {
            Outcome::Completed | Outcome::Duplicate => self.ack(&msg).await,
            Outcome::Poison(reason) => {
                warn!(%reason, "dropping poison message");
                self.ack(&msg).await;
            }
            Outcome::Retry => {
                if msg.receive_count >= self.max_receive_count {
                    self.give_up(&msg).await;
                } else {
                    // Linear backoff: n-th redelivery waits n * base.
                    let delay = self.retry_backoff * msg.receive_count;
                    if let Err(e) = self.queue.requeue(&msg.receipt, delay).await {
                        error!(error = %e, "requeue failed, message will redeliver on timeout");
                    }
                }
            }
        }
    }

    /// Retries exhausted: pin the meal in `failed` so it cannot sit in
    /// `processing` forever, then drop the message.
    async fn give_up(&self, msg: &QueueMessage) {
        if let Ok(event) = serde_json::from_str::<crate::queue::MealUploadedEvent>(&msg.body) {
            warn!(meal_id = %event.meal_id, "retries exhausted, marking meal failed");
            match processor::mark_failed(&self.ctx, event.meal_id).await {
                Outcome::Retry => {
                    // Even the failed write is not landing; leave the message
                    // for the dead-letter policy rather than losing it.
                    if let Err(e) = self.queue.requeue(&msg.receipt, self.retry_backoff).await {
                        error!(error = %e, "requeue after failed give-up also failed");
                    }
                    return;
                }
                _ => {}
            }
        }
        self.ack(msg).await;
    }

    async fn ack(&self, msg: &QueueMessage) {
        if let Err(e) = self.queue.ack(&msg.receipt).await {
            error!(error = %e, "ack failed, message may redeliver");
        }
    }
}

pub fn spawn_workers(
    ctx: Arc<ProcessorContext>,
    queue: Arc<dyn WorkQueue>,
    concurrency: usize,
    max_receive_count: u32,
    retry_backoff: Duration,
) -> Vec<JoinHandle<()>> {
    (0..concurrency)
        .map(|i| {
            let worker = Worker {
                ctx: Arc::clone(&ctx),
                queue: Arc::clone(&queue),
                max_receive_count,
                retry_backoff,
            };
            info!(worker = i, "starting meal processor worker");
            tokio::spawn(worker.run())
        })
        .collect()
}

/// Periodic scan for meals stuck in `processing`. Surfaces them for the
/// operational sweep; never retries them itself.
pub fn spawn_watchdog(
    store: Arc<dyn MealStore>,
    older_than: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match store.find_stuck_processing(older_than).await {
                Ok(stuck) => {
                    for meal in stuck {
                        warn!(
                            meal_id = %meal.id,
                            since = %meal.status_changed_at,
                            "meal stuck in processing"
                        );
                    }
                }
                Err(e) => error!(error = %e, "stuck-processing scan failed"),
            }
        }
    })
}
