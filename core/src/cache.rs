//! Cache fan-out target.
//!
//! Views keep their own cached copies of an entity: a detail slot for the
//! entity page, and list slots that embed the entity by value. After a
//! confirmed write the synchronizer patches all of them through this trait
//! without knowing which collections currently hold the entity.

use crate::preference::EntityId;

/// Key-indexed store that can patch every record matching an entity
pub trait PreferenceCache: Send + Sync {
    /// Set the preference field of every cached record whose identity matches
    /// `entity_id`, whether stored standalone or embedded in a collection.
    ///
    /// Must apply the update in one pass so no reader observes a partial
    /// update. Returns the number of records patched.
    fn patch_preference(&self, entity_id: &EntityId, value: bool) -> usize;
}
