//! Preference service abstraction.
//!
//! The preference service is the remote data source that stores whether a
//! user has starred an entity. The synchronizer only cares whether a write
//! succeeded; the error variants exist for logging.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Opaque identifier of a toggleable entity (an event, in the site)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create an entity id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Errors returned by a [`PreferenceService`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreferenceError {
    /// The request never reached the service or the connection dropped.
    #[error("Network error: {0}")]
    Network(String),

    /// The service answered but refused the write.
    #[error("Preference write rejected ({status}): {message}")]
    Rejected {
        /// HTTP-like status code reported by the service
        status: u16,
        /// Message returned by the service
        message: String,
    },

    /// The service did not answer in time.
    #[error("Preference service timed out")]
    Timeout,

    /// The service is not available (e.g. not configured).
    #[error("Preference service unavailable: {0}")]
    Unavailable(String),
}

/// Result type for preference service calls
pub type PreferenceResult = Result<(), PreferenceError>;

/// Boxed future returned by [`PreferenceService`] methods
pub type PreferenceFuture = Pin<Box<dyn Future<Output = PreferenceResult> + Send>>;

/// Remote store of per-user boolean preferences
///
/// Implementations own their timeouts: every returned future must resolve.
pub trait PreferenceService: Send + Sync {
    /// Mark the entity as starred
    ///
    /// # Errors
    ///
    /// Returns [`PreferenceError`] if the write fails or is rejected.
    fn set_true(&self, entity_id: EntityId) -> PreferenceFuture;

    /// Remove the star from the entity
    ///
    /// # Errors
    ///
    /// Returns [`PreferenceError`] if the write fails or is rejected.
    fn set_false(&self, entity_id: EntityId) -> PreferenceFuture;

    /// Write `value` for the entity, dispatching to [`set_true`](Self::set_true)
    /// or [`set_false`](Self::set_false)
    ///
    /// # Errors
    ///
    /// Returns [`PreferenceError`] if the write fails or is rejected.
    fn set_preference(&self, entity_id: EntityId, value: bool) -> PreferenceFuture {
        if value {
            self.set_true(entity_id)
        } else {
            self.set_false(entity_id)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl PreferenceService for Recorder {
        fn set_true(&self, entity_id: EntityId) -> PreferenceFuture {
            self.calls
                .lock()
                .unwrap()
                .push((entity_id.as_str().to_string(), true));
            Box::pin(async { Ok(()) })
        }

        fn set_false(&self, entity_id: EntityId) -> PreferenceFuture {
            self.calls
                .lock()
                .unwrap()
                .push((entity_id.as_str().to_string(), false));
            Box::pin(async { Err(PreferenceError::Timeout) })
        }
    }

    #[tokio::test]
    async fn set_preference_dispatches_on_value() {
        let service = Recorder::default();

        assert!(service.set_preference(EntityId::new("a"), true).await.is_ok());
        assert_eq!(
            service.set_preference(EntityId::new("b"), false).await,
            Err(PreferenceError::Timeout)
        );

        let calls = service.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("a".to_string(), true), ("b".to_string(), false)]);
    }

    #[test]
    fn entity_id_serializes_as_plain_string() {
        let id = EntityId::new("evt-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"evt-7\"");
        assert_eq!(id.to_string(), "evt-7");
    }

    #[test]
    fn rejected_error_mentions_status() {
        let err = PreferenceError::Rejected {
            status: 403,
            message: "forbidden".into(),
        };
        assert_eq!(err.to_string(), "Preference write rejected (403): forbidden");
    }
}
