use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Food, InputType, Meal, MealStatus, MediaType};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMealRequest {
    pub file_type: MediaType,
}

#[derive(Debug, Serialize)]
pub struct CreateMealResponse {
    #[serde(rename = "mealId")]
    pub meal_id: Uuid,
    #[serde(rename = "uploadURL")]
    pub upload_url: String,
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    /// Calendar day, `YYYY-MM-DD`, interpreted as UTC.
    pub date: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MealResponse {
    pub id: Uuid,
    pub status: MealStatus,
    pub input_type: InputType,
    pub name: String,
    pub icon: String,
    pub foods: Vec<Food>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Meal> for MealResponse {
    fn from(m: Meal) -> Self {
        Self {
            id: m.id,
            status: m.status,
            input_type: m.input_type,
            name: m.name,
            icon: m.icon,
            foods: m.foods,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MealEnvelope {
    pub meal: MealResponse,
}

#[derive(Debug, Serialize)]
pub struct MealListEnvelope {
    pub meals: Vec<MealResponse>,
}
