//! In-memory application cache of event records.
//!
//! Views read events through two kinds of slots:
//!
//! - a **detail** slot per event, filled by the event page
//! - **list** slots, one per named query (`"all"`, `"starred"`, a search...),
//!   each holding event records by value
//!
//! The same event can sit in several slots at once. [`QueryCache`] implements
//! [`PreferenceCache`] so the synchronizer can patch every copy after a
//! confirmed write.

use serde::{Deserialize, Serialize};
use star_sync_core::cache::PreferenceCache;
use star_sync_core::preference::EntityId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// An event as returned by the API
///
/// Listing endpoints identify events by `event_id`, older endpoints by `id`.
/// Fields the cache does not interpret are kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Identifier used by the listing endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EntityId>,

    /// Identifier used by older endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,

    /// Whether the current user starred the event
    #[serde(rename = "isStarred", default)]
    pub is_starred: bool,

    /// Everything else
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EventRecord {
    /// Record identified by `event_id`
    #[must_use]
    pub fn new(event_id: impl Into<EntityId>, is_starred: bool) -> Self {
        Self {
            event_id: Some(event_id.into()),
            id: None,
            is_starred,
            extra: serde_json::Map::new(),
        }
    }

    /// Record identified by the legacy `id` field
    #[must_use]
    pub fn with_legacy_id(id: impl Into<EntityId>, is_starred: bool) -> Self {
        Self {
            event_id: None,
            id: Some(id.into()),
            is_starred,
            extra: serde_json::Map::new(),
        }
    }

    /// Attach an uninterpreted field
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Whether either identifier is `entity_id`
    #[must_use]
    pub fn matches(&self, entity_id: &EntityId) -> bool {
        self.event_id.as_ref() == Some(entity_id) || self.id.as_ref() == Some(entity_id)
    }
}

#[derive(Debug, Default)]
struct Slots {
    details: HashMap<EntityId, EventRecord>,
    lists: BTreeMap<String, Vec<EventRecord>>,
}

/// Detail and list slots behind one lock
///
/// A patch takes the write lock once, so readers see every copy of an event
/// either before or after the patch.
#[derive(Debug, Default)]
pub struct QueryCache {
    slots: RwLock<Slots>,
}

impl QueryCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the detail record of an event
    pub fn put_detail(&self, entity_id: EntityId, record: EventRecord) {
        self.write().details.insert(entity_id, record);
    }

    /// Store the result of a list query
    pub fn put_list(&self, key: impl Into<String>, records: Vec<EventRecord>) {
        self.write().lists.insert(key.into(), records);
    }

    /// Detail record of an event, if cached
    #[must_use]
    pub fn detail(&self, entity_id: &EntityId) -> Option<EventRecord> {
        self.read().details.get(entity_id).cloned()
    }

    /// Records of a list query, if cached
    #[must_use]
    pub fn list(&self, key: &str) -> Option<Vec<EventRecord>> {
        self.read().lists.get(key).cloned()
    }

    /// Forget every slot holding `entity_id`
    ///
    /// Drops the detail slot and every list containing the event, so the
    /// next read refetches. Returns the number of slots removed.
    pub fn invalidate(&self, entity_id: &EntityId) -> usize {
        let mut slots = self.write();
        let mut removed = usize::from(slots.details.remove(entity_id).is_some());

        let before = slots.lists.len();
        slots
            .lists
            .retain(|_, records| !records.iter().any(|r| r.matches(entity_id)));
        removed += before - slots.lists.len();

        tracing::debug!(entity_id = %entity_id, removed, "Invalidated cached slots");
        removed
    }
}

impl PreferenceCache for QueryCache {
    fn patch_preference(&self, entity_id: &EntityId, value: bool) -> usize {
        let mut slots = self.write();
        let mut patched = 0;

        if let Some(record) = slots.details.get_mut(entity_id) {
            record.is_starred = value;
            patched += 1;
        }

        for record in slots
            .lists
            .values_mut()
            .flat_map(|records| records.iter_mut())
            .filter(|record| record.matches(entity_id))
        {
            record.is_starred = value;
            patched += 1;
        }

        tracing::trace!(entity_id = %entity_id, value, patched, "Patched cached records");
        patched
    }
}
