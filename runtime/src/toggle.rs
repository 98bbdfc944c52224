//! Optimistic star toggle for one entity.
//!
//! [`StarToggle`] owns a [`Store`] running the [`ToggleReducer`]. Views call
//! [`toggle`](StarToggle::toggle) and render [`current_value`](StarToggle::current_value);
//! the store takes care of the debounce window, the network write and the
//! reconciliation.

use crate::error::StoreError;
use crate::store::Store;
use star_sync_core::effect::EffectId;
use star_sync_core::preference::EntityId;
use star_sync_core::toggle::{ToggleAction, ToggleEnvironment, ToggleReducer, ToggleState};
use std::time::Duration;
use tokio::sync::broadcast;

type ToggleStore = Store<ToggleState, ToggleAction, ToggleEnvironment, ToggleReducer>;

/// Optimistic, debounced star toggle
///
/// # Example
///
/// ```ignore
/// let star = StarToggle::new(EntityId::new("evt-42"), false, env);
///
/// star.toggle().await?; // true, shown immediately
/// star.toggle().await?; // false again
///
/// // The burst ended where it started: no request is sent.
/// star.settle().await;
/// ```
pub struct StarToggle {
    store: ToggleStore,
    entity_id: EntityId,
    debounce_id: EffectId,
    detached: bool,
}

impl StarToggle {
    /// Create a toggle seeded with the entity's fetched value
    #[must_use]
    pub fn new(entity_id: EntityId, seed: bool, env: ToggleEnvironment) -> Self {
        let store = Store::new(
            ToggleState::new(entity_id.clone(), seed),
            ToggleReducer::new(),
            env,
        );

        Self {
            store,
            debounce_id: ToggleReducer::debounce_id(&entity_id),
            entity_id,
            detached: false,
        }
    }

    /// Entity this toggle writes
    #[must_use]
    pub const fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    /// Value to render
    pub async fn current_value(&self) -> bool {
        self.store.state(ToggleState::current_value).await
    }

    /// Last value confirmed by the preference service
    pub async fn server_value(&self) -> bool {
        self.store.state(ToggleState::server_value).await
    }

    /// Whether a write is in flight
    pub async fn is_loading(&self) -> bool {
        self.store.state(ToggleState::is_loading).await
    }

    /// Copy of the full synchronizer state
    pub async fn snapshot(&self) -> ToggleState {
        self.store.state(ToggleState::clone).await
    }

    /// Flip the star
    ///
    /// The new value is applied before this returns and is returned.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the toggle's store is shutting down.
    pub async fn toggle(&self) -> Result<bool, StoreError> {
        self.store
            .send_then(ToggleAction::Toggle, ToggleState::current_value)
            .await
    }

    /// Reset both values to a freshly fetched seed
    ///
    /// Discards unconfirmed local changes and any pending debounce window.
    /// A seed equal to the previous one is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the toggle's store is shutting down.
    pub async fn reseed(&self, value: bool) -> Result<(), StoreError> {
        self.store.send(ToggleAction::Reseed { value }).await
    }

    /// Wait until the debounce window and every write have finished
    pub async fn settle(&self) {
        self.store.settle().await;
    }

    /// Like [`settle`](Self::settle), bounded by `timeout`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if work is still running after `timeout`.
    pub async fn settle_timeout(&self, timeout: Duration) -> Result<(), StoreError> {
        self.store.settle_timeout(timeout).await
    }

    /// Subscribe to actions fed back by timers and writes
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<ToggleAction> {
        self.store.subscribe_actions()
    }

    /// Tear the toggle down
    ///
    /// A toggle still inside its debounce window is written immediately.
    /// The write completes in the background; its result patches the cache
    /// but produces no notification.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the toggle's store is shutting down.
    pub async fn detach(mut self) -> Result<(), StoreError> {
        self.detached = true;
        self.store.send(ToggleAction::Detach).await
    }
}

impl Drop for StarToggle {
    fn drop(&mut self) {
        if self.detached {
            return;
        }

        // The timer must not outlive the owner, even without a runtime.
        self.store.cancel(&self.debounce_id);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(
                entity_id = %self.entity_id,
                "Dropped outside a runtime, pending toggle discarded"
            );
            return;
        };

        let store = self.store.clone();
        handle.spawn(async move {
            if let Err(error) = store.send(ToggleAction::Detach).await {
                tracing::debug!(error = %error, "Detach on drop skipped");
            }
        });
    }
}

impl std::fmt::Debug for StarToggle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StarToggle")
            .field("entity_id", &self.entity_id)
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}
