//! In-memory collaborators for synchronizer tests
//!
//! - [`MockPreferenceService`]: scripted preference service that records calls
//! - [`RecordingCache`]: cache fan-out target that records patches
//! - [`RecordingNotifier`]: notifier that records notifications
//! - [`TestHarness`]: a [`ToggleEnvironment`] wired to all three

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use crate::mocks::test_clock;
use star_sync_core::cache::PreferenceCache;
use star_sync_core::notification::{Notification, NotificationKind, Notifier};
use star_sync_core::preference::{
    EntityId, PreferenceError, PreferenceFuture, PreferenceResult, PreferenceService,
};
use star_sync_core::toggle::{ToggleConfig, ToggleEnvironment};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One call made to a [`MockPreferenceService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceCall {
    /// Entity written
    pub entity_id: EntityId,
    /// Value written
    pub value: bool,
}

/// Scripted answer for the next call to a [`MockPreferenceService`]
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// How long the call takes
    pub latency: Duration,
    /// What the call returns
    pub result: PreferenceResult,
}

impl MockResponse {
    /// Immediate success
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            latency: Duration::ZERO,
            result: Ok(()),
        }
    }

    /// Immediate failure
    #[must_use]
    pub const fn fail(error: PreferenceError) -> Self {
        Self {
            latency: Duration::ZERO,
            result: Err(error),
        }
    }

    /// Delay the answer
    #[must_use]
    pub const fn after(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

/// Preference service double
///
/// Answers calls from a script of [`MockResponse`]s in order; once the script
/// runs out every call succeeds after the default latency.
///
/// # Example
///
/// ```
/// use star_sync_testing::{MockPreferenceService, MockResponse};
/// use star_sync_core::preference::{EntityId, PreferenceError, PreferenceService};
///
/// # async fn example() {
/// let service = MockPreferenceService::new();
/// service.push_response(MockResponse::fail(PreferenceError::Timeout));
///
/// assert!(service.set_true(EntityId::new("evt-1")).await.is_err());
/// assert!(service.set_true(EntityId::new("evt-1")).await.is_ok());
/// assert_eq!(service.call_count(), 2);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockPreferenceService {
    calls: Mutex<Vec<PreferenceCall>>,
    script: Mutex<VecDeque<MockResponse>>,
    default_latency: Duration,
}

impl MockPreferenceService {
    /// Service that succeeds immediately unless scripted otherwise
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Service whose unscripted calls take `latency`
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            default_latency: latency,
            ..Self::default()
        }
    }

    /// Queue the answer for a future call
    pub fn push_response(&self, response: MockResponse) {
        self.script.lock().unwrap().push_back(response);
    }

    /// Make the next call fail with `error`
    pub fn fail_next(&self, error: PreferenceError) {
        self.push_response(MockResponse::fail(error));
    }

    /// All calls made so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<PreferenceCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn answer(&self, entity_id: EntityId, value: bool) -> PreferenceFuture {
        self.calls
            .lock()
            .unwrap()
            .push(PreferenceCall { entity_id, value });

        let response = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockResponse::ok().after(self.default_latency));

        Box::pin(async move {
            if !response.latency.is_zero() {
                tokio::time::sleep(response.latency).await;
            }
            response.result
        })
    }
}

impl PreferenceService for MockPreferenceService {
    fn set_true(&self, entity_id: EntityId) -> PreferenceFuture {
        self.answer(entity_id, true)
    }

    fn set_false(&self, entity_id: EntityId) -> PreferenceFuture {
        self.answer(entity_id, false)
    }
}

/// Cache double that records every patch
#[derive(Debug, Default)]
pub struct RecordingCache {
    patches: Mutex<Vec<(EntityId, bool)>>,
}

impl RecordingCache {
    /// Create an empty recording cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Patches applied so far, in order
    #[must_use]
    pub fn patches(&self) -> Vec<(EntityId, bool)> {
        self.patches.lock().unwrap().clone()
    }
}

impl PreferenceCache for RecordingCache {
    fn patch_preference(&self, entity_id: &EntityId, value: bool) -> usize {
        self.patches.lock().unwrap().push((entity_id.clone(), value));
        1
    }
}

/// Notifier double that records every notification
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    /// Create an empty recording notifier
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications emitted so far, in order
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    /// Kinds of the notifications emitted so far
    #[must_use]
    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.kind)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }
}

/// A [`ToggleEnvironment`] wired to recording doubles
///
/// Keeps handles on the doubles so tests can inspect them after driving the
/// synchronizer.
pub struct TestHarness {
    /// Scripted preference service
    pub service: Arc<MockPreferenceService>,
    /// Recording cache
    pub cache: Arc<RecordingCache>,
    /// Recording notifier
    pub notifier: Arc<RecordingNotifier>,
    /// Environment using the doubles above and [`test_clock`]
    pub env: ToggleEnvironment,
}

impl TestHarness {
    /// Harness with an immediately succeeding service and the default config
    #[must_use]
    pub fn new() -> Self {
        Self::with_service(MockPreferenceService::new())
    }

    /// Harness around a prepared service
    #[must_use]
    pub fn with_service(service: MockPreferenceService) -> Self {
        let service = Arc::new(service);
        let cache = Arc::new(RecordingCache::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let env = ToggleEnvironment::new(
            Arc::clone(&service) as Arc<dyn PreferenceService>,
            Arc::clone(&cache) as Arc<dyn PreferenceCache>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::new(test_clock()),
        );

        Self {
            service,
            cache,
            notifier,
            env,
        }
    }

    /// Replace the synchronizer config
    #[must_use]
    pub fn with_config(mut self, config: ToggleConfig) -> Self {
        self.env = self.env.with_config(config);
        self
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_responses_are_used_in_order() {
        let service = MockPreferenceService::new();
        service.fail_next(PreferenceError::Timeout);
        service.push_response(MockResponse::ok());

        let id = EntityId::new("evt-1");
        assert_eq!(
            service.set_true(id.clone()).await,
            Err(PreferenceError::Timeout)
        );
        assert_eq!(service.set_false(id.clone()).await, Ok(()));
        assert_eq!(service.set_false(id.clone()).await, Ok(()));

        let values: Vec<bool> = service.calls().iter().map(|c| c.value).collect();
        assert_eq!(values, vec![true, false, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_the_answer() {
        let service = MockPreferenceService::with_latency(Duration::from_millis(250));
        let start = tokio::time::Instant::now();

        service.set_true(EntityId::new("evt-1")).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[test]
    fn harness_shares_doubles_with_environment() {
        let harness = TestHarness::new();
        harness
            .env
            .cache
            .patch_preference(&EntityId::new("evt-1"), true);
        harness.env.notifier.notify(Notification::new(
            EntityId::new("evt-1"),
            NotificationKind::Added,
            chrono::Utc::now(),
        ));

        assert_eq!(harness.cache.patches().len(), 1);
        assert_eq!(harness.notifier.kinds(), vec![NotificationKind::Added]);
    }
}
