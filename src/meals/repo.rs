use std::time::Duration;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Meal, MealRow, MealStatus, TerminalFields, UpdateOutcome};

/// Persistence boundary for meal records. The conditional `transition` is the
/// only synchronization primitive in the pipeline: every state change is a
/// single-row compare-and-set keyed on the expected prior status.
#[async_trait]
pub trait MealStore: Send + Sync {
    async fn insert(&self, meal: &Meal) -> anyhow::Result<()>;

    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<Meal>>;

    async fn list_for_day(
        &self,
        user_id: Uuid,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> anyhow::Result<Vec<Meal>>;

    /// Set `status = to` (and terminal fields, when given) iff the row is
    /// currently in `expected`.
    async fn transition(
        &self,
        id: Uuid,
        expected: MealStatus,
        to: MealStatus,
        fields: Option<TerminalFields>,
    ) -> anyhow::Result<UpdateOutcome>;

    /// Rows stuck in `processing` for longer than `older_than`, for the
    /// external operational sweep.
    async fn find_stuck_processing(&self, older_than: Duration) -> anyhow::Result<Vec<Meal>>;
}

#[derive(Clone)]
pub struct PgMealStore {
    db: PgPool,
}

impl PgMealStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const MEAL_COLUMNS: &str = "id, user_id, status, input_type, input_file_key, \
                            name, icon, foods, created_at, status_changed_at";

#[async_trait]
impl MealStore for PgMealStore {
    async fn insert(&self, meal: &Meal) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO meals
                (id, user_id, status, input_type, input_file_key,
                 name, icon, foods, created_at, status_changed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(meal.id)
        .bind(meal.user_id)
        .bind(meal.status)
        .bind(meal.input_type)
        .bind(&meal.input_file_key)
        .bind(&meal.name)
        .bind(&meal.icon)
        .bind(Json(&meal.foods))
        .bind(meal.created_at)
        .bind(meal.status_changed_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<Meal>> {
        let row = sqlx::query_as::<_, MealRow>(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(Meal::from))
    }

    async fn list_for_day(
        &self,
        user_id: Uuid,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> anyhow::Result<Vec<Meal>> {
        let rows = sqlx::query_as::<_, MealRow>(&format!(
            r#"
            SELECT {MEAL_COLUMNS} FROM meals
            WHERE user_id = $1 AND created_at >= $2 AND created_at < $3
            ORDER BY created_at ASC
            "#
        ))
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Meal::from).collect())
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: MealStatus,
        to: MealStatus,
        fields: Option<TerminalFields>,
    ) -> anyhow::Result<UpdateOutcome> {
        let (name, icon, foods) = match fields {
            Some(f) => (Some(f.name), Some(f.icon), Some(Json(f.foods))),
            None => (None, None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE meals
            SET status = $3,
                name = COALESCE($4, name),
                icon = COALESCE($5, icon),
                foods = COALESCE($6, foods),
                status_changed_at = now()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(to)
        .bind(name)
        .bind(icon)
        .bind(foods)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(UpdateOutcome::Applied);
        }

        // Condition lost; report what the row looks like now. Status only
        // moves forward, so a racing read here can never un-terminate.
        let current = sqlx::query_scalar::<_, MealStatus>("SELECT status FROM meals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(match current {
            Some(status) => UpdateOutcome::ConditionFailed(status),
            None => UpdateOutcome::NotFound,
        })
    }

    async fn find_stuck_processing(&self, older_than: Duration) -> anyhow::Result<Vec<Meal>> {
        let cutoff = OffsetDateTime::now_utc() - older_than;
        let rows = sqlx::query_as::<_, MealRow>(&format!(
            r#"
            SELECT {MEAL_COLUMNS} FROM meals
            WHERE status = $1 AND status_changed_at < $2
            ORDER BY status_changed_at ASC
            "#
        ))
        .bind(MealStatus::Processing)
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(Meal::from).collect())
    }
}
