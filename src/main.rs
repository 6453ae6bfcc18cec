use std::sync::Arc;
use std::time::Duration;

use foodiary::app::{build_app, serve};
use foodiary::classifier::{Classifier, OpenAiClassifier};
use foodiary::state::AppState;
use foodiary::worker::{spawn_watchdog, spawn_workers, ProcessorContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "foodiary=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let state = AppState::init().await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&state.db).await {
        tracing::warn!(error = %e, "migrations folder not found or migration failed; continuing");
    }

    let classifier =
        Arc::new(OpenAiClassifier::new(&state.config.classifier)?) as Arc<dyn Classifier>;
    let ctx = Arc::new(ProcessorContext {
        store: Arc::clone(&state.store),
        storage: Arc::clone(&state.storage),
        classifier,
        classify_timeout: Duration::from_secs(state.config.classifier.timeout_secs),
    });

    spawn_workers(
        Arc::clone(&ctx),
        Arc::clone(&state.queue),
        state.config.worker.concurrency,
        state.config.queue.max_receive_count,
        Duration::from_secs(state.config.queue.retry_backoff_secs),
    );
    spawn_watchdog(
        Arc::clone(&state.store),
        Duration::from_secs(state.config.worker.stuck_after_secs),
        Duration::from_secs(state.config.worker.watchdog_interval_secs),
    );

    let app = build_app(state);
    serve(app).await
}
