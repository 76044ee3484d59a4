//! Authoritative in-memory view of the credential store.
//!
//! [`CredentialCache`] mirrors the records held by a [`CredentialStore`] and is
//! the only path through which this process reads or changes them:
//!
//! - Reads ([`list`](CredentialCache::list), [`get`](CredentialCache::get))
//!   are served from memory and return [`NormalizedRecord`]s.
//! - Mutations ([`add`](CredentialCache::add),
//!   [`update`](CredentialCache::update), [`remove`](CredentialCache::remove))
//!   go to the store first and touch the mirror only once the store has
//!   accepted them.
//! - Changes the store reports on its own are folded in through
//!   [`apply_from_provider`](CredentialCache::apply_from_provider).
//!
//! The record lock is never held across a store call. Two mutations of the
//! same record can therefore interleave; whichever reaches the store last
//! wins, and the store's change notifications bring the mirror back in line.
//!
//! Every mutation is registered as a pending write before the store is
//! called. A provider may report the change before its call returns; such a
//! notification is applied to the mirror but yields no [`ChangeEvent`], since
//! the caller of the mutation reports it.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::SyncError;
use crate::event::ChangeEvent;
use crate::model::{self, NormalizedRecord, RawRecord, RecordId, RecordInput};
use crate::store::{CredentialStore, StoreEvent};
use crate::telemetry::{EventExtra, Telemetry};

/// Telemetry object name for cache metrics.
const METRIC_OBJECT: &str = "datastore";

/// In-memory mirror of the external credential store.
pub struct CredentialCache {
    store: Arc<dyn CredentialStore>,
    telemetry: Arc<dyn Telemetry>,
    records: RwLock<HashMap<RecordId, RawRecord>>,
    pending: Mutex<Vec<PendingWrite>>,
    next_token: AtomicU64,
}

/// A store write issued by this cache that has not returned yet.
struct PendingWrite {
    token: u64,
    id: RecordId,
    /// The record the store will hold, or `None` for a removal.
    expected: Option<RawRecord>,
}

/// Unregisters a pending write when the mutation finishes, however it ends.
struct PendingGuard<'a> {
    pending: &'a Mutex<Vec<PendingWrite>>,
    token: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let token = self.token;
        self.pending.lock().retain(|write| write.token != token);
    }
}

impl CredentialCache {
    /// Create an empty cache over `store`. Call [`load`](Self::load) to fill it.
    pub fn new(store: Arc<dyn CredentialStore>, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            store,
            telemetry,
            records: RwLock::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            next_token: AtomicU64::new(0),
        }
    }

    /// The store this cache mirrors.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Replace the cached records with everything the store currently holds.
    ///
    /// Returns the number of records loaded.
    pub async fn load(&self) -> Result<usize, SyncError> {
        let records = self.store.get_all().await?;
        let count = records.len();

        let mapping = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect::<HashMap<_, _>>();
        *self.records.write() = mapping;

        info!(count, "Loaded credential records from store");
        Ok(count)
    }

    /// Drop every cached record. Used on shutdown.
    pub fn clear(&self) {
        self.records.write().clear();
        debug!("Credential cache cleared");
    }

    /// Number of cached records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// All cached records, in no particular order.
    pub fn list(&self) -> Vec<NormalizedRecord> {
        self.records
            .read()
            .values()
            .cloned()
            .map(NormalizedRecord::from_raw)
            .collect()
    }

    /// Look up one record.
    pub fn get(&self, id: &RecordId) -> Option<NormalizedRecord> {
        self.records
            .read()
            .get(id)
            .cloned()
            .map(NormalizedRecord::from_raw)
    }

    /// Create a new record.
    ///
    /// `origin` and `password` are required. A fresh ID is always assigned,
    /// the usage counter starts at zero and all timestamps are set to now.
    /// When neither a form target nor an HTTP realm is given, the form is
    /// assumed to submit to the record's own origin.
    pub async fn add(&self, input: RecordInput) -> Result<NormalizedRecord, SyncError> {
        let origin = input
            .origin
            .filter(|origin| !origin.is_empty())
            .ok_or_else(|| SyncError::validation("missing origin"))?;
        let password = input
            .password
            .filter(|password| !password.is_empty())
            .ok_or_else(|| SyncError::validation("missing password"))?;

        let has_target = input
            .form_target_origin
            .as_deref()
            .is_some_and(|target| !target.is_empty());
        let has_realm = input
            .http_realm
            .as_deref()
            .is_some_and(|realm| !realm.is_empty());
        let form_target_origin = if has_target || has_realm {
            input.form_target_origin
        } else {
            Some(origin.clone())
        };

        let now = model::now();
        let record = RawRecord {
            id: RecordId::generate(),
            origin,
            form_target_origin,
            http_realm: input.http_realm,
            username: input.username.unwrap_or_default(),
            password,
            username_field: input.username_field.unwrap_or_default(),
            password_field: input.password_field.unwrap_or_default(),
            times_used: 0,
            time_created: now,
            time_last_used: now,
            time_password_changed: now,
        };

        let _pending = self.begin_write(&record.id, Some(record.clone()));
        self.store.add(&record).await?;
        self.records.write().insert(record.id.clone(), record.clone());
        debug!(id = %record.id, "Added record");

        self.record_metric("added", &record.id, None).await;
        Ok(NormalizedRecord::from_raw(record))
    }

    /// Change an existing record.
    ///
    /// Fields present in `input` replace the cached values, absent ones are
    /// kept. The ID, creation time and usage data never change here.
    /// `timePasswordChanged` moves to now only when the password differs.
    pub async fn update(&self, input: RecordInput) -> Result<NormalizedRecord, SyncError> {
        let id = input
            .id
            .clone()
            .ok_or_else(|| SyncError::validation("id missing"))?;
        let prior = self
            .records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound { id: id.clone() })?;

        let updated = merge(&prior, input);
        let fields = changed_fields(&prior, &updated);

        let _pending = self.begin_write(&id, Some(updated.clone()));
        self.store.update(&updated).await?;
        self.records.write().insert(id.clone(), updated.clone());
        debug!(id = %id, fields = ?fields, "Updated record");

        self.record_metric("updated", &id, Some(fields.as_slice())).await;
        Ok(NormalizedRecord::from_raw(updated))
    }

    /// Delete a record.
    ///
    /// Removing an unknown ID is not an error and returns `Ok(None)`.
    pub async fn remove(&self, id: &RecordId) -> Result<Option<NormalizedRecord>, SyncError> {
        let Some(existing) = self.records.read().get(id).cloned() else {
            debug!(id = %id, "Remove requested for unknown record");
            return Ok(None);
        };

        let _pending = self.begin_write(id, None);
        self.store.remove(id).await?;
        let removed = self.records.write().remove(id).unwrap_or(existing);
        debug!(id = %id, "Removed record");

        self.record_metric("deleted", id, None).await;
        Ok(Some(NormalizedRecord::from_raw(removed)))
    }

    /// Fold a change reported by the store into the cache.
    ///
    /// The store is not called. Returns the event clients should see, or
    /// `None` when the change is a mutation made through this cache, either
    /// still in flight or already reflected.
    pub fn apply_from_provider(&self, event: StoreEvent) -> Option<ChangeEvent> {
        let pending = self.pending.lock();
        let in_flight = pending.iter().any(|write| match &event {
            StoreEvent::Added(record) | StoreEvent::Updated(record) => {
                write.id == record.id && write.expected.as_ref() == Some(record)
            }
            StoreEvent::Removed(id) => write.id == *id && write.expected.is_none(),
            StoreEvent::AllRemoved => false,
        });
        let mut records = self.records.write();
        drop(pending);

        if in_flight {
            match event {
                StoreEvent::Added(record) | StoreEvent::Updated(record) => {
                    records.insert(record.id.clone(), record);
                }
                StoreEvent::Removed(id) => {
                    records.remove(&id);
                }
                StoreEvent::AllRemoved => {}
            }
            debug!("Provider reported a write still in flight");
            return None;
        }

        let change = match event {
            StoreEvent::Added(record) | StoreEvent::Updated(record) => {
                let previous = records.insert(record.id.clone(), record.clone());
                match previous {
                    Some(previous) if previous == record => None,
                    Some(_) => Some(ChangeEvent::UpdatedItem {
                        item: NormalizedRecord::from_raw(record),
                    }),
                    None => Some(ChangeEvent::AddedItem {
                        item: NormalizedRecord::from_raw(record),
                    }),
                }
            }
            StoreEvent::Removed(id) => records
                .remove(&id)
                .map(|_| ChangeEvent::RemovedItem { id }),
            StoreEvent::AllRemoved => {
                if records.is_empty() {
                    None
                } else {
                    records.clear();
                    Some(ChangeEvent::RemovedAll)
                }
            }
        };

        match &change {
            Some(event) => debug!(kind = event.kind(), "Applied provider change"),
            None => debug!("Provider change already reflected in cache"),
        }
        change
    }

    fn begin_write(&self, id: &RecordId, expected: Option<RawRecord>) -> PendingGuard<'_> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().push(PendingWrite {
            token,
            id: id.clone(),
            expected,
        });
        PendingGuard {
            pending: &self.pending,
            token,
        }
    }

    async fn record_metric(&self, method: &str, id: &RecordId, fields: Option<&[&str]>) {
        let mut extra = EventExtra::new();
        extra.insert("itemid".to_string(), id.to_string());
        if let Some(fields) = fields {
            extra.insert("fields".to_string(), fields.join(","));
        }
        self.telemetry
            .record_event(method, METRIC_OBJECT, extra)
            .await;
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("records_count", &self.len())
            .finish()
    }
}

/// Apply client-supplied fields on top of a stored record.
fn merge(prior: &RawRecord, input: RecordInput) -> RawRecord {
    let mut next = prior.clone();

    if let Some(origin) = input.origin {
        next.origin = origin;
    }
    if let Some(target) = input.form_target_origin {
        next.form_target_origin = Some(target);
    }
    if let Some(realm) = input.http_realm {
        next.http_realm = Some(realm);
    }
    if let Some(username) = input.username {
        next.username = username;
    }
    if let Some(field) = input.username_field {
        next.username_field = field;
    }
    if let Some(field) = input.password_field {
        next.password_field = field;
    }
    if let Some(password) = input.password {
        if password != prior.password {
            next.password = password;
            next.time_password_changed = model::now();
        }
    }

    next
}

/// Wire names of the user-editable fields that differ between two records.
fn changed_fields(prior: &RawRecord, next: &RawRecord) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if prior.origin != next.origin {
        fields.push("origin");
    }
    if prior.form_target_origin != next.form_target_origin {
        fields.push("formTargetOrigin");
    }
    if prior.http_realm != next.http_realm {
        fields.push("httpRealm");
    }
    if prior.username != next.username {
        fields.push("username");
    }
    if prior.password != next.password {
        fields.push("password");
    }
    if prior.username_field != next.username_field {
        fields.push("usernameField");
    }
    if prior.password_field != next.password_field {
        fields.push("passwordField");
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Secret;
    use chrono::{TimeZone, Utc};

    fn stored() -> RawRecord {
        RawRecord {
            id: RecordId::new("FOO"),
            origin: "https://foo.example.com".to_string(),
            form_target_origin: Some("https://foo.example.com".to_string()),
            http_realm: None,
            username: "FOOuser".to_string(),
            password: Secret::new("FOOpass"),
            username_field: "username".to_string(),
            password_field: "password".to_string(),
            times_used: 1,
            time_created: Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap(),
            time_last_used: Utc.with_ymd_and_hms(2019, 1, 3, 12, 0, 0).unwrap(),
            time_password_changed: Utc.with_ymd_and_hms(2019, 1, 2, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_merge_keeps_absent_fields() {
        let prior = stored();
        let next = merge(
            &prior,
            RecordInput {
                id: Some(prior.id.clone()),
                username: Some("renamed".to_string()),
                ..Default::default()
            },
        );

        assert_eq!(next.username, "renamed");
        assert_eq!(next.origin, prior.origin);
        assert_eq!(next.password, prior.password);
        assert_eq!(next.time_password_changed, prior.time_password_changed);
        assert_eq!(changed_fields(&prior, &next), vec!["username"]);
    }

    #[test]
    fn test_merge_same_password_keeps_timestamp() {
        let prior = stored();
        let next = merge(
            &prior,
            RecordInput {
                password: Some(Secret::new("FOOpass")),
                ..Default::default()
            },
        );

        assert_eq!(next.time_password_changed, prior.time_password_changed);
        assert!(changed_fields(&prior, &next).is_empty());
    }

    #[test]
    fn test_merge_new_password_moves_timestamp() {
        let prior = stored();
        let next = merge(
            &prior,
            RecordInput {
                password: Some(Secret::new("changed")),
                ..Default::default()
            },
        );

        assert!(next.time_password_changed > prior.time_password_changed);
        assert_eq!(next.time_created, prior.time_created);
        assert_eq!(next.times_used, prior.times_used);
        assert_eq!(changed_fields(&prior, &next), vec!["password"]);
    }

    #[test]
    fn test_merge_never_changes_id() {
        let prior = stored();
        let next = merge(
            &prior,
            RecordInput {
                id: Some(RecordId::new("OTHER")),
                ..Default::default()
            },
        );
        assert_eq!(next.id, prior.id);
    }
}
