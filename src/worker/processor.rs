use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::classifier::{Classifier, ClassifierError};
use crate::meals::repo::MealStore;
use crate::meals::repo_types::{MealStatus, TerminalFields, UpdateOutcome};
use crate::queue::{MealUploadedEvent, QueueMessage};
use crate::storage::ObjectStore;

pub struct ProcessorContext {
    pub store: Arc<dyn MealStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub classifier: Arc<dyn Classifier>,
    /// Wall-clock budget for one classification attempt.
    pub classify_timeout: Duration,
}

/// How one delivery was handled. The consume loop maps this onto queue
/// controls: everything but `Retry` acknowledges the message.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The meal reached a terminal state in this attempt.
    Completed,
    /// Another delivery already owns or finished this meal; no-op.
    Duplicate,
    /// The message can never succeed; dropped without retry.
    Poison(String),
    /// Transient trouble; the record was left as-is for redelivery.
    Retry,
}

/// Advance one meal through its lifecycle: claim, fetch media, classify,
/// write the terminal transition. At most one terminal write can ever land,
/// because every store mutation is conditional on the expected prior status.
#[instrument(skip(ctx, msg), fields(receive_count = msg.receive_count))]
pub async fn process_message(ctx: &ProcessorContext, msg: &QueueMessage) -> Outcome {
    let event: MealUploadedEvent = match serde_json::from_str(&msg.body) {
        Ok(e) => e,
        Err(e) => return Outcome::Poison(format!("malformed payload: {e}")),
    };
    let meal_id = event.meal_id;

    // The claim: uploading → processing. This is the idempotency boundary for
    // at-least-once delivery.
    match ctx
        .store
        .transition(meal_id, MealStatus::Uploading, MealStatus::Processing, None)
        .await
    {
        Ok(UpdateOutcome::Applied) => {}
        Ok(UpdateOutcome::ConditionFailed(MealStatus::Processing)) if msg.receive_count > 1 => {
            // Redelivery of the message that claimed the row earlier and hit
            // a transient error; carry on where it left off.
            info!(%meal_id, "resuming claimed meal on redelivery");
        }
        Ok(UpdateOutcome::ConditionFailed(current)) => {
            info!(%meal_id, ?current, "duplicate delivery, meal already advanced");
            return Outcome::Duplicate;
        }
        Ok(UpdateOutcome::NotFound) => {
            return Outcome::Poison(format!("meal {meal_id} not found"));
        }
        Err(e) => {
            warn!(%meal_id, error = %e, "claim failed on store error");
            return Outcome::Retry;
        }
    }

    let meal = match ctx.store.get_by_id(meal_id).await {
        Ok(Some(m)) => m,
        Ok(None) => return Outcome::Poison(format!("meal {meal_id} vanished after claim")),
        Err(e) => {
            warn!(%meal_id, error = %e, "read-back failed");
            return Outcome::Retry;
        }
    };
    if meal.status.is_terminal() {
        return Outcome::Duplicate;
    }

    let media = match ctx.storage.fetch(&meal.input_file_key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            // The claim already consumed this event's one shot; a missing
            // object cannot appear by retrying.
            warn!(%meal_id, key = %meal.input_file_key, "media not found, failing meal");
            return mark_failed(ctx, meal_id).await;
        }
        Err(e) => {
            warn!(%meal_id, error = %e, "object fetch failed");
            return Outcome::Retry;
        }
    };

    let result = match tokio::time::timeout(
        ctx.classify_timeout,
        ctx.classifier.classify(media, meal.input_type),
    )
    .await
    {
        Ok(r) => r,
        Err(_) => Err(ClassifierError::Transient(anyhow::anyhow!(
            "classification timed out after {:?}",
            ctx.classify_timeout
        ))),
    };

    match result {
        Ok(classification) => {
            let fields = TerminalFields {
                name: classification.name,
                icon: classification.icon,
                foods: classification.foods,
            };
            match ctx
                .store
                .transition(meal_id, MealStatus::Processing, MealStatus::Done, Some(fields))
                .await
            {
                Ok(UpdateOutcome::Applied) => {
                    info!(%meal_id, "meal classified");
                    Outcome::Completed
                }
                Ok(_) => Outcome::Duplicate,
                Err(e) => {
                    warn!(%meal_id, error = %e, "terminal write failed");
                    Outcome::Retry
                }
            }
        }
        Err(ClassifierError::Transient(e)) => {
            warn!(%meal_id, error = %e, "transient classification error, leaving for redelivery");
            Outcome::Retry
        }
        Err(ClassifierError::Fatal(e)) => {
            warn!(%meal_id, error = %e, "unrecoverable classification error");
            mark_failed(ctx, meal_id).await
        }
    }
}

/// Terminal `failed` write. Used for unrecoverable outcomes and for retry
/// exhaustion; `foods` stays empty.
pub async fn mark_failed(ctx: &ProcessorContext, meal_id: Uuid) -> Outcome {
    for expected in [MealStatus::Processing, MealStatus::Uploading] {
        match ctx
            .store
            .transition(meal_id, expected, MealStatus::Failed, None)
            .await
        {
            Ok(UpdateOutcome::Applied) => return Outcome::Completed,
            Ok(UpdateOutcome::ConditionFailed(current)) if current.is_terminal() => {
                return Outcome::Duplicate;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(%meal_id, error = %e, "failed transition did not land");
                return Outcome::Retry;
            }
        }
    }
    Outcome::Duplicate
}
