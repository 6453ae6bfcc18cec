use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use time::macros::format_description;
use time::Date;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::owner::OwnerId;
use crate::state::AppState;

use super::dto::{
    CreateMealRequest, CreateMealResponse, DayQuery, MealEnvelope, MealListEnvelope, MealResponse,
};
use super::services::{request_meal_upload, signal_upload_complete, IntakeError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/meals", post(create_meal).get(list_meals))
        .route("/meals/:id", get(get_meal))
        .route("/meals/:id/uploaded", post(meal_uploaded))
}

/// POST /meals — the upload handshake. Returns the record id and a presigned
/// PUT URL; the client uploads directly to object storage afterwards.
#[instrument(skip(state, body))]
async fn create_meal(
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
    Json(body): Json<CreateMealRequest>,
) -> Result<(StatusCode, Json<CreateMealResponse>), (StatusCode, String)> {
    let ttl = Duration::from_secs(state.config.storage.upload_url_ttl_secs);
    let staged = request_meal_upload(
        state.store.as_ref(),
        state.storage.as_ref(),
        user_id,
        body.file_type,
        ttl,
    )
    .await
    .map_err(|e| match e {
        IntakeError::StagingUnavailable(err) => {
            error!(error = %err, "presign failed");
            (StatusCode::BAD_GATEWAY, "upload staging unavailable".into())
        }
        IntakeError::Store(err) => internal(err),
    })?;

    Ok((
        StatusCode::CREATED,
        Json(CreateMealResponse {
            meal_id: staged.meal_id,
            upload_url: staged.upload_url,
        }),
    ))
}

/// POST /meals/:id/uploaded — client signal that the object is in place;
/// kicks the meal into the processing queue.
#[instrument(skip(state))]
async fn meal_uploaded(
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    match signal_upload_complete(state.store.as_ref(), state.queue.as_ref(), user_id, id).await {
        Ok(Some(())) => Ok(StatusCode::ACCEPTED),
        Ok(None) => Err((StatusCode::NOT_FOUND, "Meal not found".into())),
        Err(e) => Err(internal(e)),
    }
}

#[instrument(skip(state))]
async fn get_meal(
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
    Path(id): Path<Uuid>,
) -> Result<Json<MealEnvelope>, (StatusCode, String)> {
    let meal = state
        .store
        .get_by_id(id)
        .await
        .map_err(internal)?
        .filter(|m| m.user_id == user_id)
        .ok_or((StatusCode::NOT_FOUND, "Meal not found".into()))?;

    Ok(Json(MealEnvelope { meal: meal.into() }))
}

#[instrument(skip(state))]
async fn list_meals(
    State(state): State<AppState>,
    OwnerId(user_id): OwnerId,
    Query(q): Query<DayQuery>,
) -> Result<Json<MealListEnvelope>, (StatusCode, String)> {
    let day = Date::parse(&q.date, format_description!("[year]-[month]-[day]"))
        .map_err(|_| (StatusCode::BAD_REQUEST, "date must be YYYY-MM-DD".into()))?;
    let from = day.midnight().assume_utc();
    let to = from + time::Duration::days(1);

    let meals = state
        .store
        .list_for_day(user_id, from, to)
        .await
        .map_err(internal)?;

    Ok(Json(MealListEnvelope {
        meals: meals.into_iter().map(MealResponse::from).collect(),
    }))
}

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into())
}
