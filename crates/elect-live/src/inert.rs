//! Smoothing of transient regressions for display.

use std::sync::Mutex;

use crate::lock;
use crate::state::FetchState;

/// Merge `current` with the last state shown.
///
/// A regression (`completed` dropping back to `false`, or the payload
/// disappearing) keeps the previous payload and completion while still
/// showing `current`'s loading, failure and error. Anything else passes
/// `current` through unchanged.
#[must_use]
pub fn smooth<T: Clone>(previous: &FetchState<T>, current: FetchState<T>) -> FetchState<T> {
    let regressed = (!current.completed && previous.completed)
        || (current.data.is_none() && previous.data.is_some());
    if !regressed {
        return current;
    }
    FetchState {
        completed: current.completed || previous.completed,
        data: current.data.or_else(|| previous.data.clone()),
        ..current
    }
}

/// Per-consumer memory of the last smoothed state.
///
/// The underlying resource is never touched; two consumers of the same
/// data each keep their own memory.
#[derive(Debug)]
pub struct InertState<T> {
    previous: Mutex<Option<FetchState<T>>>,
}

impl<T> Default for InertState<T> {
    fn default() -> Self {
        Self {
            previous: Mutex::new(None),
        }
    }
}

impl<T: Clone> InertState<T> {
    /// Create an empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Smooth `current` against the remembered state and remember the
    /// result.
    pub fn apply(&self, current: FetchState<T>) -> FetchState<T> {
        let mut previous = lock(&self.previous);
        let next = match previous.as_ref() {
            Some(previous) => smooth(previous, current),
            None => current,
        };
        *previous = Some(next.clone());
        next
    }

    /// Forget the remembered state.
    pub fn reset(&self) {
        *lock(&self.previous) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LiveError;

    #[test]
    fn test_keeps_data_while_reloading() {
        let previous = FetchState::ready("X");
        let current = FetchState::pending();
        let smoothed = smooth(&previous, current);
        assert_eq!(smoothed.data, Some("X"));
        assert!(smoothed.completed);
        assert!(smoothed.loading);
    }

    #[test]
    fn test_progress_passes_through() {
        let previous = FetchState::<&str>::pending();
        let current = FetchState::ready("Y");
        assert_eq!(smooth(&previous, current.clone()), current);
    }

    #[test]
    fn test_failure_visible_over_old_data() {
        let previous = FetchState::ready(1);
        let current = FetchState::failure(LiveError::Curtain);
        let smoothed = smooth(&previous, current);
        assert!(smoothed.failed);
        assert_eq!(smoothed.error, Some(LiveError::Curtain));
        assert_eq!(smoothed.data, Some(1));
        assert!(smoothed.completed);
    }

    #[test]
    fn test_newer_data_wins() {
        let previous = FetchState::ready(1);
        let current = FetchState::ready(2);
        assert_eq!(smooth(&previous, current).data, Some(2));
    }

    #[test]
    fn test_inert_state_remembers_across_blips() {
        let inert = InertState::new();
        assert!(inert.apply(FetchState::<u8>::pending()).loading);
        assert_eq!(inert.apply(FetchState::ready(7)).data, Some(7));
        // Two regressions in a row still show the last good value.
        assert_eq!(inert.apply(FetchState::pending()).data, Some(7));
        assert_eq!(
            inert
                .apply(FetchState::failure(LiveError::NoPointer))
                .data,
            Some(7)
        );

        inert.reset();
        assert!(inert.apply(FetchState::pending()).data.is_none());
    }
}
