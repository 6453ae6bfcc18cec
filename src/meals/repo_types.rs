use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle of a meal. Transitions are monotonic: `uploading → processing →
/// {done | failed}`. `done` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "meal_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MealStatus {
    Uploading,
    Processing,
    Done,
    Failed,
}

impl MealStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, MealStatus::Done | MealStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "meal_input_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Audio,
    Picture,
}

/// Declared MIME type of the upload. The two variants here are the only media
/// the pipeline accepts; anything else is rejected at deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "audio/m4a")]
    AudioM4a,
    #[serde(rename = "image/jpeg")]
    ImageJpeg,
}

impl MediaType {
    pub fn input_type(self) -> InputType {
        match self {
            MediaType::AudioM4a => InputType::Audio,
            MediaType::ImageJpeg => InputType::Picture,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaType::AudioM4a => ".m4a",
            MediaType::ImageJpeg => ".jpg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub name: String,
    pub quantity: String,
    pub calories: f64,
    pub proteins: f64,
    pub carbohydrates: f64,
    pub fats: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: MealStatus,
    pub input_type: InputType,
    pub input_file_key: String,
    pub name: String,
    pub icon: String,
    pub foods: Vec<Food>,
    pub created_at: OffsetDateTime,
    pub status_changed_at: OffsetDateTime,
}

impl Meal {
    /// A fresh row as Ingestion Intake creates it: `uploading`, nothing
    /// classified yet.
    pub fn new_uploading(id: Uuid, user_id: Uuid, media: MediaType) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            user_id,
            status: MealStatus::Uploading,
            input_type: media.input_type(),
            input_file_key: format!("{}{}", id, media.extension()),
            name: String::new(),
            icon: String::new(),
            foods: Vec::new(),
            created_at: now,
            status_changed_at: now,
        }
    }
}

/// Fields written together with the `processing → done` transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalFields {
    pub name: String,
    pub icon: String,
    pub foods: Vec<Food>,
}

/// Result of a conditional state-transition update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// The row exists but its status was not the expected one; carries the
    /// status observed after the failed attempt.
    ConditionFailed(MealStatus),
    NotFound,
}

/// Raw Postgres row; `foods` lives in a JSONB column.
#[derive(Debug, FromRow)]
pub struct MealRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: MealStatus,
    pub input_type: InputType,
    pub input_file_key: String,
    pub name: String,
    pub icon: String,
    pub foods: Json<Vec<Food>>,
    pub created_at: OffsetDateTime,
    pub status_changed_at: OffsetDateTime,
}

impl From<MealRow> for Meal {
    fn from(r: MealRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            status: r.status,
            input_type: r.input_type,
            input_file_key: r.input_file_key,
            name: r.name,
            icon: r.icon,
            foods: r.foods.0,
            created_at: r.created_at,
            status_changed_at: r.status_changed_at,
        }
    }
}
