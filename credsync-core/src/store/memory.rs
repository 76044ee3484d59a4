//! In-memory credential store implementation.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::broadcast;

use super::{CredentialStore, StoreError, StoreEvent};
use crate::model::{RawRecord, RecordId};

/// Default capacity of the change notification buffer.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// In-memory credential store for testing and development.
///
/// This store is not persistent; data is lost when the process exits. It
/// behaves like an observer-driven provider: every successful mutation is
/// published to subscribers, including mutations requested by the cache
/// itself.
///
/// # Thread Safety
///
/// This implementation uses interior mutability and is safe to share across
/// threads.
pub struct MemoryStore {
    data: RwLock<HashMap<RecordId, RawRecord>>,
    events: broadcast::Sender<StoreEvent>,
    pending_failure: Mutex<Option<String>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create an empty store whose notification buffer holds `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            data: RwLock::new(HashMap::new()),
            events,
            pending_failure: Mutex::new(None),
        }
    }

    /// Create a memory store with initial records.
    ///
    /// Seeding does not publish notifications.
    pub fn with_records(records: impl IntoIterator<Item = RawRecord>) -> Self {
        let store = Self::new();
        store.seed(records);
        store
    }

    /// Load initial records from a JSON file containing an array of records.
    pub fn from_json_file(path: &Path, capacity: usize) -> Result<Self, StoreError> {
        let contents = std::fs::read_to_string(path)?;
        let records: Vec<RawRecord> = serde_json::from_str(&contents)?;
        let store = Self::with_capacity(capacity);
        store.seed(records);
        Ok(store)
    }

    fn seed(&self, records: impl IntoIterator<Item = RawRecord>) {
        let mut data = self.data.write();
        for record in records {
            data.insert(record.id.clone(), record);
        }
    }

    /// Make the next store call fail with a backend error.
    pub fn fail_next_with(&self, message: impl Into<String>) {
        *self.pending_failure.lock() = Some(message.into());
    }

    /// Delete every record and notify subscribers.
    pub fn remove_all(&self) {
        self.data.write().clear();
        self.publish(StoreEvent::AllRemoved);
    }

    /// Look up a record directly, bypassing any cache.
    pub fn record(&self, id: &RecordId) -> Option<RawRecord> {
        self.data.read().get(id).cloned()
    }

    /// Number of live change subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    fn check_failure(&self) -> Result<(), StoreError> {
        match self.pending_failure.lock().take() {
            Some(message) => Err(StoreError::BackendError { message }),
            None => Ok(()),
        }
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records_count", &self.data.read().len())
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_all(&self) -> Result<Vec<RawRecord>, StoreError> {
        self.check_failure()?;
        Ok(self.data.read().values().cloned().collect())
    }

    async fn add(&self, record: &RawRecord) -> Result<(), StoreError> {
        self.check_failure()?;
        {
            let mut data = self.data.write();
            if data.contains_key(&record.id) {
                return Err(StoreError::AlreadyExists {
                    id: record.id.clone(),
                });
            }
            data.insert(record.id.clone(), record.clone());
        }
        self.publish(StoreEvent::Added(record.clone()));
        Ok(())
    }

    async fn update(&self, record: &RawRecord) -> Result<(), StoreError> {
        self.check_failure()?;
        {
            let mut data = self.data.write();
            let entry = data.get_mut(&record.id).ok_or_else(|| StoreError::NotFound {
                id: record.id.clone(),
            })?;
            *entry = record.clone();
        }
        self.publish(StoreEvent::Updated(record.clone()));
        Ok(())
    }

    async fn remove(&self, id: &RecordId) -> Result<(), StoreError> {
        self.check_failure()?;
        if self.data.write().remove(id).is_none() {
            return Err(StoreError::NotFound { id: id.clone() });
        }
        self.publish(StoreEvent::Removed(id.clone()));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Secret;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(id: &str) -> RawRecord {
        let now = Utc::now();
        RawRecord {
            id: RecordId::new(id),
            origin: format!("https://{}.example.com", id.to_lowercase()),
            form_target_origin: None,
            http_realm: None,
            username: format!("{}user", id),
            password: Secret::new(format!("{}pass", id)),
            username_field: "username".to_string(),
            password_field: "password".to_string(),
            times_used: 0,
            time_created: now,
            time_last_used: now,
            time_password_changed: now,
        }
    }

    #[tokio::test]
    async fn test_memory_store_add_publishes() {
        let store = MemoryStore::new();
        let mut events = store.subscribe();
        let foo = record("FOO");

        store.add(&foo).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(events.recv().await.unwrap(), StoreEvent::Added(foo));
    }

    #[tokio::test]
    async fn test_memory_store_rejects_duplicate() {
        let store = MemoryStore::with_records([record("FOO")]);
        let result = store.add(&record("FOO")).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_memory_store_update_unknown() {
        let store = MemoryStore::new();
        let result = store.update(&record("FOO")).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_memory_store_remove_publishes() {
        let store = MemoryStore::with_records([record("FOO")]);
        let mut events = store.subscribe();

        store.remove(&RecordId::new("FOO")).await.unwrap();

        assert!(store.is_empty());
        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::Removed(RecordId::new("FOO"))
        );
    }

    #[tokio::test]
    async fn test_memory_store_remove_all() {
        let store = MemoryStore::with_records([record("FOO"), record("BAR")]);
        let mut events = store.subscribe();

        store.remove_all();

        assert!(store.is_empty());
        assert_eq!(events.recv().await.unwrap(), StoreEvent::AllRemoved);
    }

    #[tokio::test]
    async fn test_memory_store_injected_failure() {
        let store = MemoryStore::new();
        store.fail_next_with("backend offline");

        let result = store.add(&record("FOO")).await;
        assert!(matches!(result, Err(StoreError::BackendError { .. })));
        assert!(store.is_empty());

        // Only the next call fails.
        store.add(&record("FOO")).await.unwrap();
        assert_eq!(store.len(), 1);

        store.fail_next_with("backend offline");
        assert!(matches!(
            store.get_all().await,
            Err(StoreError::BackendError { .. })
        ));
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_counts_subscribers() {
        let store = MemoryStore::new();
        assert_eq!(store.subscriber_count(), 0);

        let events = store.subscribe();
        assert_eq!(store.subscriber_count(), 1);
        drop(events);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_memory_store_from_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("seed.json");
        std::fs::write(
            &path,
            r#"[{"guid":"FOO","hostname":"https://foo.example.com","password":"FOOpass"}]"#,
        )
        .unwrap();

        let store = MemoryStore::from_json_file(&path, 16).unwrap();
        let all = store.get_all().await.unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].username, "");
        assert_eq!(all[0].password.expose(), "FOOpass");
    }
}
