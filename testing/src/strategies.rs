//! Proptest strategies for synchronizer inputs
//!
//! A [`Step`] is something the outside world does to a synchronizer: the
//! user toggles, the debounce window elapses, an outstanding write resolves,
//! or the entity is fetched again. Tests replay steps against the reducer
//! and feed back the matching actions, the way the runtime would.

use proptest::prelude::*;
use star_sync_core::preference::{PreferenceError, PreferenceResult};

/// One external event in a synchronizer's life
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The user flips the star
    Toggle,
    /// The open debounce window, if any, elapses
    ElapseWindow,
    /// The outstanding write at `index` (modulo the number outstanding) resolves
    Resolve {
        /// Which outstanding write resolves
        index: usize,
        /// With what result
        outcome: PreferenceResult,
    },
    /// The entity is fetched again
    Reseed(bool),
}

/// Any preference error
pub fn preference_error() -> impl Strategy<Value = PreferenceError> {
    prop_oneof![
        "[a-z ]{0,16}".prop_map(PreferenceError::Network),
        (400_u16..600, "[a-z ]{0,16}")
            .prop_map(|(status, message)| PreferenceError::Rejected { status, message }),
        Just(PreferenceError::Timeout),
    ]
}

/// Mostly successful write outcomes
pub fn outcome() -> impl Strategy<Value = PreferenceResult> {
    prop_oneof![
        3 => Just(Ok(())),
        1 => preference_error().prop_map(Err),
    ]
}

/// A single step
pub fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => Just(Step::Toggle),
        3 => Just(Step::ElapseWindow),
        3 => (any::<usize>(), outcome())
            .prop_map(|(index, outcome)| Step::Resolve { index, outcome }),
        1 => any::<bool>().prop_map(Step::Reseed),
    ]
}

/// Sequences of up to `max_len` steps
pub fn steps(max_len: usize) -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec(step(), 0..=max_len)
}

/// A burst of `1..=max` toggles, as a count
pub fn burst(max: usize) -> impl Strategy<Value = usize> {
    1..=max.max(1)
}
