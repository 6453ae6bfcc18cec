use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::AppConfig;
use crate::meals::repo::{MealStore, PgMealStore};
use crate::queue::{SqsQueue, WorkQueue};
use crate::storage::{ObjectStore, Storage};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn MealStore>,
    pub storage: Arc<dyn ObjectStore>,
    pub queue: Arc<dyn WorkQueue>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage = Arc::new(
            Storage::new(
                &config.storage.endpoint,
                &config.storage.bucket,
                &config.storage.access_key,
                &config.storage.secret_key,
                &config.storage.region,
            )
            .await?,
        ) as Arc<dyn ObjectStore>;

        let queue = Arc::new(
            SqsQueue::new(&config.queue.queue_url, config.queue.wait_time_secs).await?,
        ) as Arc<dyn WorkQueue>;

        let store = Arc::new(PgMealStore::new(db.clone())) as Arc<dyn MealStore>;

        Ok(Self {
            db,
            config,
            store,
            storage,
            queue,
        })
    }

    pub fn from_parts(
        db: PgPool,
        config: Arc<AppConfig>,
        store: Arc<dyn MealStore>,
        storage: Arc<dyn ObjectStore>,
        queue: Arc<dyn WorkQueue>,
    ) -> Self {
        Self {
            db,
            config,
            store,
            storage,
            queue,
        }
    }
}
