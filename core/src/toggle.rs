//! Optimistic toggle state machine.
//!
//! One [`ToggleState`] tracks a single entity's boolean preference as two
//! values: the value confirmed by the preference service and the value the
//! user currently sees. [`ToggleReducer`] flips the local value immediately,
//! coalesces bursts of toggles behind a debounce window, writes the final
//! value once, and reconciles the outcome.
//!
//! # Generations
//!
//! Every toggle bumps `generation`. The debounce timer and every network
//! write carry the generation they were created for, and the reducer uses it
//! to tell current outcomes from stale ones:
//!
//! - a timer whose generation is not the current one is ignored;
//! - a success whose generation is not newer than `confirmed_generation` is
//!   dropped, so an older write that resolves late never overwrites a newer
//!   confirmed value;
//! - a failure only rolls back the local value when no newer input is
//!   pending and no newer write has been issued.
//!
//! Cache fan-out and notifications are synchronous, in-memory collaborators.
//! They are invoked from the reducer so their order matches the order of
//! state transitions.

use crate::cache::PreferenceCache;
use crate::effect::{Effect, EffectId};
use crate::environment::Clock;
use crate::notification::{Notification, NotificationKind, Notifier};
use crate::preference::{EntityId, PreferenceError, PreferenceService};
use crate::reducer::Reducer;
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;
use std::time::Duration;

/// Default debounce window between the last toggle and the network write
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Tunables for the synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleConfig {
    /// Quiet period after the last toggle before the value is written
    pub debounce: Duration,
}

impl ToggleConfig {
    /// Create a config with the given debounce window
    #[must_use]
    pub const fn new(debounce: Duration) -> Self {
        Self { debounce }
    }
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

/// A write that has been sent to the preference service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedCommit {
    /// Generation the write was issued for
    pub generation: u64,
    /// Value being written
    pub value: bool,
}

/// State of one toggleable entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleState {
    /// Entity being toggled
    pub entity_id: EntityId,
    /// Last seed or confirmed value, compared against fresh entity data
    pub seed: bool,
    /// Last value confirmed by the preference service (or the seed)
    pub server_value: bool,
    /// Value shown to the user
    pub local_value: bool,
    /// Bumped on every toggle and re-seed
    pub generation: u64,
    /// Generation of the most recently issued write
    pub issued_generation: u64,
    /// Generation of the most recently applied success (or re-seed)
    pub confirmed_generation: u64,
    /// Most recently issued write, until it resolves
    pub last_issued: Option<IssuedCommit>,
    /// Writes that have been issued and not yet resolved
    pub in_flight: usize,
    /// A debounce window is open
    pub debounce_pending: bool,
    /// The owning view is gone; no more toggles or notifications
    pub detached: bool,
    /// Error of the last failed write not yet followed by a success
    pub last_error: Option<PreferenceError>,
}

impl ToggleState {
    /// Create state seeded from an externally supplied value
    #[must_use]
    pub const fn new(entity_id: EntityId, seed: bool) -> Self {
        Self {
            entity_id,
            seed,
            server_value: seed,
            local_value: seed,
            generation: 0,
            issued_generation: 0,
            confirmed_generation: 0,
            last_issued: None,
            in_flight: 0,
            debounce_pending: false,
            detached: false,
            last_error: None,
        }
    }

    /// Value to render
    #[must_use]
    pub const fn current_value(&self) -> bool {
        self.local_value
    }

    /// Last confirmed value
    #[must_use]
    pub const fn server_value(&self) -> bool {
        self.server_value
    }

    /// Whether a write is in flight
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    /// Whether a debounce window is open
    #[must_use]
    pub const fn has_pending_commit(&self) -> bool {
        self.debounce_pending
    }

    /// Value the server will hold once outstanding writes land
    ///
    /// The most recently issued write if it has not resolved yet, otherwise
    /// the confirmed server value. A debounced commit is skipped when the
    /// local value equals this.
    #[must_use]
    pub fn baseline(&self) -> bool {
        self.last_issued
            .map_or(self.server_value, |commit| commit.value)
    }
}

/// Inputs to the synchronizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleAction {
    /// User flipped the star
    Toggle,
    /// The debounce window for `generation` elapsed
    CommitFired {
        /// Generation the timer was scheduled for
        generation: u64,
    },
    /// The preference service accepted a write
    CommitSucceeded {
        /// Generation the write was issued for
        generation: u64,
        /// Value written
        value: bool,
    },
    /// The preference service failed or rejected a write
    CommitFailed {
        /// Generation the write was issued for
        generation: u64,
        /// Value that was not written
        value: bool,
        /// Why it failed
        error: PreferenceError,
    },
    /// The entity was fetched again with a new seed value
    Reseed {
        /// Freshly fetched value
        value: bool,
    },
    /// The owning view went away
    ///
    /// Flushes a pending debounce window as a fire-and-forget write.
    Detach,
}

/// Collaborators of the synchronizer
#[derive(Clone)]
pub struct ToggleEnvironment {
    /// Remote preference store
    pub service: Arc<dyn PreferenceService>,
    /// Cached copies of the entity to patch after a confirmed write
    pub cache: Arc<dyn PreferenceCache>,
    /// User-visible notification sink
    pub notifier: Arc<dyn Notifier>,
    /// Timestamps for notifications
    pub clock: Arc<dyn Clock>,
    /// Tunables
    pub config: ToggleConfig,
}

impl ToggleEnvironment {
    /// Create an environment with the default config
    pub fn new(
        service: Arc<dyn PreferenceService>,
        cache: Arc<dyn PreferenceCache>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service,
            cache,
            notifier,
            clock,
            config: ToggleConfig::default(),
        }
    }

    /// Replace the config
    #[must_use]
    pub const fn with_config(mut self, config: ToggleConfig) -> Self {
        self.config = config;
        self
    }
}

impl std::fmt::Debug for ToggleEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToggleEnvironment")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Reducer implementing the optimistic toggle rules
#[derive(Debug, Clone, Copy, Default)]
pub struct ToggleReducer;

impl ToggleReducer {
    /// Creates a new toggle reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Cancellation key of an entity's debounce timer
    #[must_use]
    pub fn debounce_id(entity_id: &EntityId) -> EffectId {
        EffectId::new(format!("star-commit:{entity_id}"))
    }

    /// Record a write as issued and describe the network call
    fn issue_commit(state: &mut ToggleState, env: &ToggleEnvironment) -> Effect<ToggleAction> {
        let generation = state.generation;
        let value = state.local_value;

        state.in_flight += 1;
        state.issued_generation = generation;
        state.last_issued = Some(IssuedCommit { generation, value });

        metrics::counter!("star_sync.commits.issued").increment(1);
        tracing::debug!(
            entity_id = %state.entity_id,
            generation,
            value,
            "Issuing preference write"
        );

        let service = Arc::clone(&env.service);
        let entity_id = state.entity_id.clone();

        Effect::Future(Box::pin(async move {
            match service.set_preference(entity_id, value).await {
                Ok(()) => Some(ToggleAction::CommitSucceeded { generation, value }),
                Err(error) => Some(ToggleAction::CommitFailed {
                    generation,
                    value,
                    error,
                }),
            }
        }))
    }

    fn notify(state: &ToggleState, kind: NotificationKind, env: &ToggleEnvironment) {
        if state.detached {
            return;
        }
        env.notifier
            .notify(Notification::new(state.entity_id.clone(), kind, env.clock.now()));
    }

    /// Clear the bookkeeping of a write that has resolved
    fn settle_commit(state: &mut ToggleState, generation: u64) {
        state.in_flight = state.in_flight.saturating_sub(1);
        if state
            .last_issued
            .is_some_and(|commit| commit.generation == generation)
        {
            state.last_issued = None;
        }
    }

    fn on_toggle(
        state: &mut ToggleState,
        env: &ToggleEnvironment,
    ) -> SmallVec<[Effect<ToggleAction>; 4]> {
        if state.detached {
            tracing::debug!(entity_id = %state.entity_id, "Toggle ignored after detach");
            return smallvec![Effect::None];
        }

        state.local_value = !state.local_value;
        state.generation += 1;
        state.debounce_pending = true;

        tracing::trace!(
            entity_id = %state.entity_id,
            generation = state.generation,
            local_value = state.local_value,
            "Toggled"
        );

        smallvec![Effect::debounce(
            Self::debounce_id(&state.entity_id),
            env.config.debounce,
            ToggleAction::CommitFired {
                generation: state.generation,
            },
        )]
    }

    fn on_commit_fired(
        state: &mut ToggleState,
        generation: u64,
        env: &ToggleEnvironment,
    ) -> SmallVec<[Effect<ToggleAction>; 4]> {
        if generation != state.generation || !state.debounce_pending {
            tracing::trace!(
                entity_id = %state.entity_id,
                generation,
                current = state.generation,
                "Superseded debounce timer ignored"
            );
            return smallvec![Effect::None];
        }

        state.debounce_pending = false;

        if state.local_value == state.baseline() {
            metrics::counter!("star_sync.commits.skipped").increment(1);
            tracing::debug!(
                entity_id = %state.entity_id,
                value = state.local_value,
                "Burst resolved to the confirmed value, skipping write"
            );
            return smallvec![Effect::None];
        }

        smallvec![Self::issue_commit(state, env)]
    }

    fn on_commit_succeeded(
        state: &mut ToggleState,
        generation: u64,
        value: bool,
        env: &ToggleEnvironment,
    ) -> SmallVec<[Effect<ToggleAction>; 4]> {
        Self::settle_commit(state, generation);

        if generation <= state.confirmed_generation {
            metrics::counter!("star_sync.commits", "outcome" => "stale").increment(1);
            tracing::debug!(
                entity_id = %state.entity_id,
                generation,
                confirmed = state.confirmed_generation,
                "Dropping stale success"
            );
            return smallvec![Effect::None];
        }

        metrics::counter!("star_sync.commits", "outcome" => "success").increment(1);
        state.server_value = value;
        state.seed = value;
        state.confirmed_generation = generation;
        state.last_error = None;

        let patched = env.cache.patch_preference(&state.entity_id, value);
        tracing::debug!(
            entity_id = %state.entity_id,
            generation,
            value,
            patched,
            "Preference confirmed"
        );

        // Nothing else can still change the value: show what the server holds.
        if state.in_flight == 0 && !state.debounce_pending {
            state.local_value = state.server_value;
        }

        // Only announce a value the star shows and no pending window will change.
        if generation == state.issued_generation
            && !state.debounce_pending
            && state.local_value == value
        {
            Self::notify(state, NotificationKind::for_value(value), env);
        }

        smallvec![Effect::None]
    }

    fn on_commit_failed(
        state: &mut ToggleState,
        generation: u64,
        value: bool,
        error: PreferenceError,
        env: &ToggleEnvironment,
    ) -> SmallVec<[Effect<ToggleAction>; 4]> {
        Self::settle_commit(state, generation);
        metrics::counter!("star_sync.commits", "outcome" => "failure").increment(1);
        tracing::warn!(
            entity_id = %state.entity_id,
            generation,
            value,
            error = %error,
            "Preference write failed"
        );

        let superseded = generation != state.issued_generation
            || generation <= state.confirmed_generation
            || state.debounce_pending;
        if superseded {
            tracing::debug!(
                entity_id = %state.entity_id,
                generation,
                "Newer input owns the local value, not rolling back"
            );
            if generation > state.confirmed_generation {
                state.last_error = Some(error);
            }
            return smallvec![Effect::None];
        }

        state.local_value = state.server_value;
        state.last_error = Some(error);
        Self::notify(state, NotificationKind::Failed, env);

        smallvec![Effect::None]
    }

    fn on_reseed(state: &mut ToggleState, value: bool) -> SmallVec<[Effect<ToggleAction>; 4]> {
        if value == state.seed {
            return smallvec![Effect::None];
        }

        tracing::debug!(
            entity_id = %state.entity_id,
            value,
            discarded_local = state.local_value,
            "Re-seeded from fresh entity data"
        );

        state.seed = value;
        state.server_value = value;
        state.local_value = value;
        state.generation += 1;
        state.confirmed_generation = state.generation;
        state.last_issued = None;
        state.debounce_pending = false;
        state.last_error = None;

        smallvec![Effect::Cancel(Self::debounce_id(&state.entity_id))]
    }

    fn on_detach(
        state: &mut ToggleState,
        env: &ToggleEnvironment,
    ) -> SmallVec<[Effect<ToggleAction>; 4]> {
        if state.detached {
            return smallvec![Effect::None];
        }
        state.detached = true;

        let mut effects: SmallVec<[Effect<ToggleAction>; 4]> =
            smallvec![Effect::Cancel(Self::debounce_id(&state.entity_id))];

        if state.debounce_pending {
            state.debounce_pending = false;
            if state.local_value != state.baseline() {
                tracing::debug!(
                    entity_id = %state.entity_id,
                    "Flushing pending toggle on detach"
                );
                effects.push(Self::issue_commit(state, env));
            }
        }

        effects
    }
}

impl Reducer for ToggleReducer {
    type State = ToggleState;
    type Action = ToggleAction;
    type Environment = ToggleEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ToggleAction::Toggle => Self::on_toggle(state, env),
            ToggleAction::CommitFired { generation } => {
                Self::on_commit_fired(state, generation, env)
            },
            ToggleAction::CommitSucceeded { generation, value } => {
                Self::on_commit_succeeded(state, generation, value, env)
            },
            ToggleAction::CommitFailed {
                generation,
                value,
                error,
            } => Self::on_commit_failed(state, generation, value, error, env),
            ToggleAction::Reseed { value } => Self::on_reseed(state, value),
            ToggleAction::Detach => Self::on_detach(state, env),
        }
    }
}
