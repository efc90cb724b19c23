// cache/instance_cache.rs - Shared instance record store
//
// Holds one record per referenced instance id. Records are created on first
// reference and live until invalidate()/flush(). The resolution queue is the
// only writer of the fetch-state fields (is_fetching, is_fetched,
// fetch_error, fields, name, types, space); readers observe changes through
// snapshots or the broadcast channel returned by subscribe().

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

use crate::transport::{FieldDescriptor, InstanceType, SummaryEntry};

/// Key of the display-name field synthesized on every resolved record
pub const NAME_FIELD: &str = "http://schema.org/name";

/// Descriptor name of the synthesized display-name field
pub const NAME_FIELD_LABEL: &str = "Name";

const EVENT_CAPACITY: usize = 1024;

/// Cached state of one referenced instance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceRecord {
    pub id: String,
    pub name: Option<String>,
    pub is_fetching: bool,
    pub is_fetched: bool,
    pub fetch_error: Option<String>,
    pub fields: IndexMap<String, FieldDescriptor>,
    pub types: Vec<InstanceType>,
    pub space: Option<String>,
    /// UI-only visibility flag
    pub show: bool,
}

/// Where a record stands in its fetch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Unresolved,
    Fetching,
    Resolved,
    Errored,
}

impl InstanceRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            is_fetching: false,
            is_fetched: false,
            fetch_error: None,
            fields: IndexMap::new(),
            types: Vec::new(),
            space: None,
            show: false,
        }
    }

    pub fn state(&self) -> ResolutionState {
        if self.is_fetching {
            ResolutionState::Fetching
        } else if self.fetch_error.is_some() {
            ResolutionState::Errored
        } else if self.is_fetched {
            ResolutionState::Resolved
        } else {
            ResolutionState::Unresolved
        }
    }

    /// Display label: the resolved name, falling back to the id
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Change notifications published by the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEvent {
    Created(String),
    Fetching(String),
    Resolved(String),
    Failed { id: String, message: String },
    Invalidated(String),
    Flushed,
}

/// Process-wide store of instance records keyed by id
pub struct InstanceCache {
    records: RwLock<HashMap<String, InstanceRecord>>,
    events: broadcast::Sender<RecordEvent>,
}

impl Default for InstanceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceCache {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            records: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to record changes
    ///
    /// Slow receivers may lag and miss events; use [`InstanceCache::get`]
    /// to re-read current state after a `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.events.subscribe()
    }

    /// Return the record for `id`, creating an unresolved one if absent
    pub fn get_or_create(&self, id: &str) -> InstanceRecord {
        let mut records = self.write();
        if let Some(record) = records.get(id) {
            return record.clone();
        }

        let record = InstanceRecord::new(id);
        records.insert(id.to_string(), record.clone());
        drop(records);

        self.publish(RecordEvent::Created(id.to_string()));
        record
    }

    pub fn get(&self, id: &str) -> Option<InstanceRecord> {
        self.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// All records, ordered by id
    pub fn snapshot(&self) -> Vec<InstanceRecord> {
        let mut records: Vec<InstanceRecord> = self.read().values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Set the UI visibility flag. Returns true if the flag changed.
    pub fn set_show(&self, id: &str, show: bool) -> bool {
        let mut records = self.write();
        match records.get_mut(id) {
            Some(record) if record.show != show => {
                record.show = show;
                true
            }
            _ => false,
        }
    }

    /// Drop a single record; the next reference recreates it unresolved
    pub fn invalidate(&self, id: &str) -> Option<InstanceRecord> {
        let removed = self.write().remove(id);
        if removed.is_some() {
            self.publish(RecordEvent::Invalidated(id.to_string()));
        }
        removed
    }

    /// Drop every record
    pub fn flush(&self) {
        self.write().clear();
        self.publish(RecordEvent::Flushed);
    }

    /// Start a fetch cycle: set is_fetching and clear any stale error
    pub(crate) fn mark_fetching(&self, ids: &[String]) {
        let mut started = Vec::with_capacity(ids.len());
        {
            let mut records = self.write();
            for id in ids {
                let record = records
                    .entry(id.clone())
                    .or_insert_with(|| InstanceRecord::new(id.as_str()));
                record.is_fetching = true;
                record.fetch_error = None;
                started.push(id.clone());
            }
        }

        for id in started {
            self.publish(RecordEvent::Fetching(id));
        }
    }

    /// Apply a successful summary entry
    ///
    /// The backend's fields are kept and the display-name field is always
    /// (re)written from the entry's `name`. Dropped unless the record is
    /// fetching: an invalidated record, even if recreated since, never
    /// receives a result from the request that was in flight.
    pub(crate) fn apply_summary(&self, id: &str, entry: &SummaryEntry) {
        let mut fields = entry.field_map();
        let name_value = entry.name.clone().map(Value::String).unwrap_or(Value::Null);
        fields.insert(
            NAME_FIELD.to_string(),
            FieldDescriptor::new(NAME_FIELD_LABEL, name_value),
        );

        let applied = {
            let mut records = self.write();
            match records.get_mut(id) {
                Some(record) if record.is_fetching => {
                    record.fields = fields;
                    record.name = entry.name.clone();
                    record.types = entry.types.clone();
                    record.space = entry.space.clone();
                    record.is_fetched = true;
                    record.is_fetching = false;
                    true
                }
                _ => false,
            }
        };

        if applied {
            self.publish(RecordEvent::Resolved(id.to_string()));
        } else {
            tracing::debug!(id, "record invalidated while in flight; dropping summary");
        }
    }

    /// Record a failed resolution; fields are left untouched. Like
    /// `apply_summary`, only applies to a record that is fetching.
    pub(crate) fn apply_error(&self, id: &str, message: String) {
        let applied = {
            let mut records = self.write();
            match records.get_mut(id) {
                Some(record) if record.is_fetching => {
                    record.fetch_error = Some(message.clone());
                    record.is_fetching = false;
                    true
                }
                _ => false,
            }
        };

        if applied {
            self.publish(RecordEvent::Failed {
                id: id.to_string(),
                message,
            });
        } else {
            tracing::debug!(id, "record invalidated while in flight; dropping error");
        }
    }

    fn publish(&self, event: RecordEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, InstanceRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, InstanceRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}
