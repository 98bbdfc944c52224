//! # Star Sync Runtime
//!
//! Runtime for the star-sync toggle synchronizer.
//!
//! This crate provides the Store runtime that coordinates reducer execution
//! and effect handling, plus the production collaborators of the toggle
//! synchronizer.
//!
//! ## Core Components
//!
//! - **Store**: Manages state and executes effects, including cancellable ones
//! - **`StarToggle`**: Optimistic star/favourite toggle for one entity
//! - **`QueryCache`**: Application cache holding detail and list copies of events
//! - **`HttpPreferenceService`**: Preference service over HTTP
//! - **`BroadcastNotifier`**: Fans notifications out to UI subscribers
//!
//! ## Example
//!
//! ```ignore
//! use star_sync_runtime::StarToggle;
//!
//! let star = StarToggle::new(EntityId::new("evt-42"), false, env);
//!
//! // Flips immediately; the write happens after the debounce window
//! let starred = star.toggle().await?;
//! assert!(starred);
//! ```

use star_sync_core::{effect::Effect, effect::EffectId, reducer::Reducer};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::AbortHandle;

/// Environment-driven configuration
pub mod config;

/// Preference service over HTTP
pub mod http;

/// Broadcast notification sink
pub mod notifier;

/// In-memory application cache of event records
pub mod query_cache;

/// Optimistic star toggle facade
pub mod toggle;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        ///
        /// Some effects were still running when the timeout elapsed.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for effects to settle
        #[error("Timeout waiting for effects to settle")]
        Timeout,
    }
}

/// Internal: guard that decrements the pending-effect count on drop
///
/// Aborted effects drop their future, so the count stays correct for
/// cancelled timers too.
struct PendingGuard(Arc<watch::Sender<usize>>);

impl PendingGuard {
    fn new(pending: &Arc<watch::Sender<usize>>) -> Self {
        pending.send_modify(|count| *count += 1);
        Self(Arc::clone(pending))
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count = count.saturating_sub(1));
    }
}

/// Internal: a running cancellable effect
struct Registration {
    token: u64,
    abort: AbortHandle,
}

/// Internal: running cancellable effects by id
#[derive(Default)]
struct CancellationRegistry {
    running: Mutex<HashMap<EffectId, Registration>>,
    next_token: AtomicU64,
}

impl CancellationRegistry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EffectId, Registration>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Abort the effect running under `id`; returns whether one was running
    fn cancel(&self, id: &EffectId) -> bool {
        let Some(registration) = self.lock().remove(id) else {
            return false;
        };
        registration.abort.abort();
        metrics::counter!("store.effects.cancelled").increment(1);
        tracing::trace!(effect_id = %id, "Cancelled running effect");
        true
    }

    /// Forget `id` if it still belongs to the registration `token`
    fn release(&self, id: &EffectId, token: u64) {
        let mut running = self.lock();
        if running.get(id).is_some_and(|r| r.token == token) {
            running.remove(id);
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Store module - The runtime for reducers
///
/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, CancellationRegistry, Duration, Effect, EffectId, Future, Ordering,
        PendingGuard, Pin, Reducer, Registration, RwLock, watch,
    };
    use crate::error::StoreError;
    use tokio::sync::broadcast;

    type EffectFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop and cancellation)
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = Store::new(
    ///     ToggleState::new(entity_id, false),
    ///     ToggleReducer::new(),
    ///     environment,
    /// );
    ///
    /// store.send(ToggleAction::Toggle).await?;
    /// ```
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<watch::Sender<usize>>,
        cancellations: Arc<CancellationRegistry>,
        /// Action broadcast channel for observing actions produced by effects.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
        A: Clone + Send + 'static,
        S: Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// Action broadcast capacity defaults to 16 (increase with
        /// [`with_broadcast_capacity`](Self::with_broadcast_capacity)).
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
        }

        /// Create a store with a custom action broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));
            let (pending_effects, _) = watch::channel(0);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(pending_effects),
                cancellations: Arc::new(CancellationRegistry::default()),
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires write lock on state
        /// 2. Calls reducer with (state, action, environment)
        /// 3. Starts the returned effects in spawned tasks
        ///
        /// Returns once the state change is visible, not when effects complete.
        /// Use [`settle`](Self::settle) to wait for effects.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            self.send_then(action, |_| ()).await
        }

        /// Send an action and read the resulting state under the same lock
        ///
        /// No other action can run between the reducer and `read`.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action, read), name = "store_send")]
        pub async fn send_then<F, T>(&self, action: A, read: F) -> Result<T, StoreError>
        where
            F: FnOnce(&S) -> T,
        {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            metrics::counter!("store.commands.total").increment(1);

            let (effects, value) = {
                let mut state = self.state.write().await;
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                tracing::trace!("Reducer completed, returned {} effects", effects.len());
                (effects, read(&*state))
            };

            for effect in effects {
                self.execute_effect(effect);
            }

            Ok(value)
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let starred = store.state(|s| s.current_value()).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Subscribe to all actions produced by effects
        ///
        /// Only actions fed back by effects are broadcast, not the ones passed
        /// to [`send`](Self::send).
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Number of effects that have started and not finished
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            *self.pending_effects.borrow()
        }

        /// Number of cancellable effects currently running
        #[must_use]
        pub fn running_cancellables(&self) -> usize {
            self.cancellations.len()
        }

        /// Abort the cancellable effect running under `id`
        ///
        /// Synchronous so it can be called from `Drop`. Returns whether an
        /// effect was running.
        pub fn cancel(&self, id: &EffectId) -> bool {
            self.cancellations.cancel(id)
        }

        /// Wait until no effect is running
        ///
        /// Includes effects started by feedback actions, so this waits for a
        /// whole cascade (timer → write → result) to finish.
        pub async fn settle(&self) {
            let mut pending = self.pending_effects.subscribe();
            // The sender lives as long as `self`, so this cannot fail.
            let _ = pending.wait_for(|count| *count == 0).await;
        }

        /// Wait until no effect is running, up to `timeout`
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::Timeout`] if effects are still running after `timeout`.
        pub async fn settle_timeout(&self, timeout: Duration) -> Result<(), StoreError> {
            tokio::time::timeout(timeout, self.settle())
                .await
                .map_err(|_| StoreError::Timeout)
        }

        /// Gracefully shut down the store
        ///
        /// Stops accepting new actions, then waits for running effects.
        /// Effects that complete after shutdown began cannot feed actions back.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if the timeout expires before all
        /// pending effects complete.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);

            if self.settle_timeout(timeout).await.is_err() {
                let pending = self.pending_effects();
                tracing::error!(
                    pending_effects = pending,
                    "Shutdown timeout: {} effects still running", pending
                );
                metrics::counter!("store.shutdown.timeout").increment(1);
                return Err(StoreError::ShutdownTimeout(pending));
            }

            tracing::info!("All effects completed, shutdown successful");
            Ok(())
        }

        /// Start an effect
        ///
        /// - `None`: No-op
        /// - `Cancel`: Aborts the cancellable effect running under the id
        /// - `Cancellable`: Aborts any effect running under the id, then spawns this one
        /// - everything else: Spawned and run to completion
        fn execute_effect(&self, effect: Effect<A>) {
            match effect {
                Effect::None => {
                    tracing::trace!("Executing Effect::None (no-op)");
                },
                Effect::Cancel(id) => {
                    metrics::counter!("store.effects.executed", "type" => "cancel").increment(1);
                    self.cancellations.cancel(&id);
                },
                Effect::Cancellable { id, effect } => {
                    metrics::counter!("store.effects.executed", "type" => "cancellable")
                        .increment(1);
                    let guard = PendingGuard::new(&self.pending_effects);
                    let token = self.cancellations.next_token.fetch_add(1, Ordering::Relaxed);

                    // Held across spawn + insert so the task cannot release
                    // its id before it is registered.
                    let mut running = self.cancellations.lock();
                    if let Some(previous) = running.remove(&id) {
                        previous.abort.abort();
                        metrics::counter!("store.effects.cancelled").increment(1);
                        tracing::trace!(effect_id = %id, "Replaced running effect");
                    }

                    let store = self.clone();
                    let task_id = id.clone();
                    let task = tokio::spawn(async move {
                        let _guard = guard;
                        store.run_effect(*effect).await;
                        store.cancellations.release(&task_id, token);
                    });

                    running.insert(
                        id,
                        Registration {
                            token,
                            abort: task.abort_handle(),
                        },
                    );
                },
                effect => {
                    metrics::counter!("store.effects.executed", "type" => "task").increment(1);
                    let guard = PendingGuard::new(&self.pending_effects);
                    let store = self.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        store.run_effect(effect).await;
                    });
                },
            }
        }

        /// Run an effect to completion inside the current task
        fn run_effect(&self, effect: Effect<A>) -> EffectFuture<'_> {
            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Future(fut) => {
                        if let Some(action) = fut.await {
                            self.feed_back(action).await;
                        }
                    },
                    Effect::Delay { duration, action } => {
                        tokio::time::sleep(duration).await;
                        tracing::trace!("Effect::Delay completed, sending action");
                        self.feed_back(*action).await;
                    },
                    Effect::Parallel(effects) => {
                        futures::future::join_all(
                            effects.into_iter().map(|effect| self.run_effect(effect)),
                        )
                        .await;
                    },
                    Effect::Sequential(effects) => {
                        for effect in effects {
                            self.run_effect(effect).await;
                        }
                    },
                    effect @ (Effect::Cancellable { .. } | Effect::Cancel(_)) => {
                        self.execute_effect(effect);
                    },
                }
            })
        }

        /// Broadcast an effect-produced action and send it back into the store
        async fn feed_back(&self, action: A) {
            let _ = self.action_broadcast.send(action.clone());

            if let Err(error) = self.send(action).await {
                tracing::warn!(error = %error, "Dropped action produced by effect");
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                cancellations: Arc::clone(&self.cancellations),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use error::StoreError;
pub use http::HttpPreferenceService;
pub use notifier::BroadcastNotifier;
pub use query_cache::{EventRecord, QueryCache};
pub use store::Store;
pub use toggle::StarToggle;

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use star_sync_core::{SmallVec, smallvec};

    #[derive(Debug, Clone, PartialEq)]
    enum TestAction {
        Schedule(u32),
        Fired(u32),
        Stop,
        Chain,
    }

    #[derive(Debug, Clone, Default)]
    struct TestState {
        fired: Vec<u32>,
    }

    #[derive(Clone)]
    struct TestEnv;

    #[derive(Clone)]
    struct TestReducer;

    fn timer_id() -> EffectId {
        EffectId::new("timer")
    }

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Schedule(n) => smallvec![Effect::debounce(
                    timer_id(),
                    Duration::from_millis(100),
                    TestAction::Fired(n),
                )],
                TestAction::Fired(n) => {
                    state.fired.push(n);
                    smallvec![Effect::None]
                },
                TestAction::Stop => smallvec![Effect::Cancel(timer_id())],
                TestAction::Chain => smallvec![Effect::chain(vec![
                    Effect::Future(Box::pin(async { Some(TestAction::Fired(1)) })),
                    Effect::Delay {
                        duration: Duration::from_millis(50),
                        action: Box::new(TestAction::Fired(2)),
                    },
                ])],
            }
        }
    }

    fn store() -> Store<TestState, TestAction, TestEnv, TestReducer> {
        Store::new(TestState::default(), TestReducer, TestEnv)
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_cancels_previous_timer() {
        let store = store();

        for n in 1..=3 {
            store.send(TestAction::Schedule(n)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
        assert_eq!(store.running_cancellables(), 1);

        store.settle().await;

        assert_eq!(store.state(|s| s.fired.clone()).await, vec![3]);
        assert_eq!(store.running_cancellables(), 0);
        assert_eq!(store.pending_effects(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_timer() {
        let store = store();

        store.send(TestAction::Schedule(1)).await.unwrap();
        store.send(TestAction::Stop).await.unwrap();
        store.settle().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(store.state(|s| s.fired.is_empty()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_cancel_reports_whether_running() {
        let store = store();

        assert!(!store.cancel(&timer_id()));
        store.send(TestAction::Schedule(1)).await.unwrap();
        assert!(store.cancel(&timer_id()));
        store.settle().await;

        assert!(store.state(|s| s.fired.is_empty()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_effects_run_in_order_and_broadcast() {
        let store = store();
        let mut actions = store.subscribe_actions();

        store.send(TestAction::Chain).await.unwrap();
        store.settle().await;

        assert_eq!(store.state(|s| s.fired.clone()).await, vec![1, 2]);
        assert_eq!(actions.recv().await.unwrap(), TestAction::Fired(1));
        assert_eq!(actions.recv().await.unwrap(), TestAction::Fired(2));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_rejects_new_actions() {
        let store = store();

        store.shutdown(Duration::from_secs(1)).await.unwrap();

        assert_eq!(
            store.send(TestAction::Fired(1)).await,
            Err(StoreError::ShutdownInProgress)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_then_reads_state_after_reduce() {
        let store = store();

        let fired = store
            .send_then(TestAction::Fired(7), |s| s.fired.clone())
            .await
            .unwrap();

        assert_eq!(fired, vec![7]);
    }
}
