//! In-memory doubles for the external collaborators: meal store, object
//! storage, work queue, and classifier. All state is behind mutexes so tests
//! can assert on what the pipeline did.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use uuid::Uuid;

use foodiary::classifier::{Classification, Classifier, ClassifierError};
use foodiary::meals::repo::MealStore;
use foodiary::meals::repo_types::{Meal, MealStatus, TerminalFields, UpdateOutcome};
use foodiary::queue::{MealUploadedEvent, QueueMessage, WorkQueue};
use foodiary::storage::ObjectStore;
use foodiary::worker::ProcessorContext;

// ---------- meal store ----------

#[derive(Default)]
pub struct InMemoryMealStore {
    rows: Mutex<HashMap<Uuid, Meal>>,
}

impl InMemoryMealStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<Meal> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Pretend a row has been sitting in its current status for `age`.
    pub fn backdate(&self, id: Uuid, age: Duration) {
        let mut rows = self.rows.lock().unwrap();
        if let Some(meal) = rows.get_mut(&id) {
            meal.status_changed_at = OffsetDateTime::now_utc() - age;
        }
    }
}

#[async_trait]
impl MealStore for InMemoryMealStore {
    async fn insert(&self, meal: &Meal) -> anyhow::Result<()> {
        self.rows.lock().unwrap().insert(meal.id, meal.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<Meal>> {
        Ok(self.get(id))
    }

    async fn list_for_day(
        &self,
        user_id: Uuid,
        from: OffsetDateTime,
        to: OffsetDateTime,
    ) -> anyhow::Result<Vec<Meal>> {
        let rows = self.rows.lock().unwrap();
        let mut meals: Vec<Meal> = rows
            .values()
            .filter(|m| m.user_id == user_id && m.created_at >= from && m.created_at < to)
            .cloned()
            .collect();
        meals.sort_by_key(|m| m.created_at);
        Ok(meals)
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: MealStatus,
        to: MealStatus,
        fields: Option<TerminalFields>,
    ) -> anyhow::Result<UpdateOutcome> {
        let mut rows = self.rows.lock().unwrap();
        let Some(meal) = rows.get_mut(&id) else {
            return Ok(UpdateOutcome::NotFound);
        };
        if meal.status != expected {
            return Ok(UpdateOutcome::ConditionFailed(meal.status));
        }
        meal.status = to;
        meal.status_changed_at = OffsetDateTime::now_utc();
        if let Some(f) = fields {
            meal.name = f.name;
            meal.icon = f.icon;
            meal.foods = f.foods;
        }
        Ok(UpdateOutcome::Applied)
    }

    async fn find_stuck_processing(&self, older_than: Duration) -> anyhow::Result<Vec<Meal>> {
        let cutoff = OffsetDateTime::now_utc() - older_than;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .filter(|m| m.status == MealStatus::Processing && m.status_changed_at < cutoff)
            .cloned()
            .collect())
    }
}

// ---------- object store ----------

#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
    pub presigned: Mutex<Vec<(String, Duration)>>,
    fail_presign: bool,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_presign: true,
            ..Self::default()
        }
    }

    pub fn put(&self, key: &str, body: Bytes) {
        self.objects.lock().unwrap().insert(key.to_string(), body);
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn presign_put(&self, key: &str, expires: Duration) -> anyhow::Result<String> {
        if self.fail_presign {
            anyhow::bail!("object stager is down");
        }
        self.presigned
            .lock()
            .unwrap()
            .push((key.to_string(), expires));
        Ok(format!("https://uploads.test/{key}"))
    }

    async fn fetch(&self, key: &str) -> anyhow::Result<Option<Bytes>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }
}

// ---------- work queue ----------

#[derive(Default)]
pub struct FakeQueue {
    pub published: Mutex<Vec<MealUploadedEvent>>,
    pub acked: Mutex<Vec<String>>,
    pub requeued: Mutex<Vec<(String, Duration)>>,
    messages: Mutex<VecDeque<QueueMessage>>,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, msg: QueueMessage) {
        self.messages.lock().unwrap().push_back(msg);
    }

    pub fn published_ids(&self) -> Vec<Uuid> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.meal_id)
            .collect()
    }
}

#[async_trait]
impl WorkQueue for FakeQueue {
    async fn publish(&self, event: &MealUploadedEvent) -> anyhow::Result<()> {
        self.published.lock().unwrap().push(*event);
        Ok(())
    }

    async fn receive(&self) -> anyhow::Result<Vec<QueueMessage>> {
        let mut messages = self.messages.lock().unwrap();
        Ok(messages.drain(..).collect())
    }

    async fn ack(&self, receipt: &str) -> anyhow::Result<()> {
        self.acked.lock().unwrap().push(receipt.to_string());
        Ok(())
    }

    async fn requeue(&self, receipt: &str, delay: Duration) -> anyhow::Result<()> {
        self.requeued
            .lock()
            .unwrap()
            .push((receipt.to_string(), delay));
        Ok(())
    }
}

// ---------- classifier ----------

/// Scripted classifier: answers with the queued results in order. Panics when
/// called more often than scripted, which doubles as a "no extra calls" check.
pub struct StubClassifier {
    script: Mutex<VecDeque<Result<Classification, ClassifierError>>>,
    pub calls: AtomicU32,
    pub delay: Option<Duration>,
}

impl StubClassifier {
    pub fn with_script(
        script: Vec<Result<Classification, ClassifierError>>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
            delay: None,
        }
    }

    pub fn unreachable() -> Self {
        Self::with_script(Vec::new())
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for StubClassifier {
    async fn classify(
        &self,
        _media: Bytes,
        _input: foodiary::meals::repo_types::InputType,
    ) -> Result<Classification, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .expect("classifier called more often than scripted")
    }
}

// ---------- wiring helpers ----------

pub struct Harness {
    pub store: Arc<InMemoryMealStore>,
    pub storage: Arc<FakeObjectStore>,
    pub queue: Arc<FakeQueue>,
    pub classifier: Arc<StubClassifier>,
    pub ctx: Arc<ProcessorContext>,
}

pub fn harness(classifier: StubClassifier) -> Harness {
    harness_with_timeout(classifier, Duration::from_secs(5))
}

pub fn harness_with_timeout(classifier: StubClassifier, classify_timeout: Duration) -> Harness {
    let store = Arc::new(InMemoryMealStore::new());
    let storage = Arc::new(FakeObjectStore::new());
    let queue = Arc::new(FakeQueue::new());
    let classifier = Arc::new(classifier);
    let ctx = Arc::new(ProcessorContext {
        store: store.clone(),
        storage: storage.clone(),
        classifier: classifier.clone(),
        classify_timeout,
    });
    Harness {
        store,
        storage,
        queue,
        classifier,
        ctx,
    }
}

pub fn event_message(meal_id: Uuid, receive_count: u32) -> QueueMessage {
    QueueMessage {
        body: serde_json::to_string(&MealUploadedEvent { meal_id }).unwrap(),
        receipt: format!("receipt-{meal_id}-{receive_count}"),
        receive_count,
    }
}
