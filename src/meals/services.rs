use std::time::Duration;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::queue::{MealUploadedEvent, WorkQueue};
use crate::storage::ObjectStore;

use super::repo::MealStore;
use super::repo_types::{Meal, MediaType};

#[derive(Debug, Error)]
pub enum IntakeError {
    /// The Object Stager would not issue a write credential. Nothing was
    /// persisted.
    #[error("could not stage upload: {0}")]
    StagingUnavailable(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug)]
pub struct StagedMeal {
    pub meal_id: Uuid,
    pub upload_url: String,
}

/// The upload handshake: allocate a key, presign a PUT credential, persist the
/// meal in `uploading`. Credential issuance comes first so a staging failure
/// leaves no partial record behind.
pub async fn request_meal_upload(
    store: &dyn MealStore,
    storage: &dyn ObjectStore,
    user_id: Uuid,
    media: MediaType,
    url_ttl: Duration,
) -> Result<StagedMeal, IntakeError> {
    let meal = Meal::new_uploading(Uuid::new_v4(), user_id, media);

    let upload_url = storage
        .presign_put(&meal.input_file_key, url_ttl)
        .await
        .map_err(IntakeError::StagingUnavailable)?;

    store.insert(&meal).await?;

    info!(meal_id = %meal.id, key = %meal.input_file_key, "meal staged for upload");
    Ok(StagedMeal {
        meal_id: meal.id,
        upload_url,
    })
}

/// The client's explicit "upload finished" signal. Publishing is at-least-once
/// by design; duplicate signals become duplicate queue events, which the
/// processor's claim absorbs.
pub async fn signal_upload_complete(
    store: &dyn MealStore,
    queue: &dyn WorkQueue,
    user_id: Uuid,
    meal_id: Uuid,
) -> anyhow::Result<Option<()>> {
    let Some(meal) = store.get_by_id(meal_id).await? else {
        return Ok(None);
    };
    if meal.user_id != user_id {
        return Ok(None);
    }

    queue.publish(&MealUploadedEvent { meal_id }).await?;
    info!(%meal_id, "upload-complete event published");
    Ok(Some(()))
}
