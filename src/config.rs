use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Presigned upload URLs expire after this many seconds (at most 10 minutes).
    pub upload_url_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub queue_url: String,
    pub wait_time_secs: i32,
    /// Deliveries per message before the meal is marked failed.
    pub max_receive_count: u32,
    pub retry_backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub stuck_after_secs: u64,
    pub watchdog_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub classifier: ClassifierConfig,
    pub worker: WorkerConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT").unwrap_or_else(|_| "http://localhost:9000".into()),
            bucket: std::env::var("BUCKET_NAME")?,
            access_key: std::env::var("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            upload_url_ttl_secs: env_parse("UPLOAD_URL_TTL_SECS", 600),
        };
        let queue = QueueConfig {
            queue_url: std::env::var("SQS_QUEUE_URL")?,
            wait_time_secs: env_parse("SQS_WAIT_TIME_SECS", 20),
            max_receive_count: env_parse("MAX_RECEIVE_COUNT", 3),
            retry_backoff_secs: env_parse("RETRY_BACKOFF_SECS", 30),
        };
        let classifier = ClassifierConfig {
            api_key: std::env::var("OPENAI_API_KEY")?,
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".into()),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
            timeout_secs: env_parse("CLASSIFY_TIMEOUT_SECS", 60),
        };
        let worker = WorkerConfig {
            concurrency: env_parse("WORKER_CONCURRENCY", 4),
            stuck_after_secs: env_parse("STUCK_AFTER_SECS", 900),
            watchdog_interval_secs: env_parse("WATCHDOG_INTERVAL_SECS", 300),
        };
        Ok(Self {
            database_url,
            storage,
            queue,
            classifier,
            worker,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
