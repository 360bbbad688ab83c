//! Resolution of the active snapshot directory.

use std::sync::Arc;

use elect_model::LatestFile;

use crate::error::LiveError;
use crate::reactive::{Setting, Tracker};
use crate::resource::Resource;
use crate::state::FetchState;

/// Derive the active directory from the pointer file state.
///
/// - An incomplete pointer state (still loading, or never loaded) is
///   propagated as is.
/// - An empty pointer list fails with [`LiveError::NoPointer`], whatever
///   the lock.
/// - A locked control block fails with [`LiveError::Curtain`] unless
///   `curtain_bypass` is set.
#[must_use]
pub fn directory_from_latest(
    latest: &FetchState<Arc<LatestFile>>,
    curtain_bypass: bool,
) -> FetchState<String> {
    if !latest.completed {
        return latest.clone().retype();
    }
    let Some(file) = latest.data.as_deref() else {
        return latest.clone().retype();
    };
    let Some(pointer) = file.active_pointer() else {
        return FetchState::failure(LiveError::NoPointer);
    };
    if file.is_locked() && !curtain_bypass {
        return FetchState::failure(LiveError::Curtain);
    }
    FetchState::ready(pointer.directory.clone())
}

/// Inputs of the directory projection.
#[derive(Clone)]
pub struct DirectorySources {
    /// Pointer file resource.
    pub latest: Resource<Arc<LatestFile>>,
    /// Manual directory, taking precedence over the pointer file.
    pub override_directory: Setting<Option<String>>,
    /// Ignore the operators' lock.
    pub curtain_bypass: Setting<bool>,
}

impl DirectorySources {
    /// Resolve the directory, recording the sources read.
    ///
    /// The pointer file is not read at all while an override is set, so
    /// an override alone never starts polling.
    pub fn resolve(&self, cx: &mut Tracker) -> FetchState<String> {
        if let Some(directory) = cx.read(&self.override_directory)
            && !directory.is_empty()
        {
            return FetchState::ready(directory);
        }
        let latest = cx.read(&self.latest);
        let bypass = cx.read(&self.curtain_bypass);
        directory_from_latest(&latest, bypass)
    }
}

impl std::fmt::Debug for DirectorySources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySources")
            .field("latest", &self.latest)
            .field("override_directory", &self.override_directory)
            .field("curtain_bypass", &self.curtain_bypass)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use elect_model::{Control, Pointer};
    use serde_json::json;

    use super::*;
    use crate::reactive::Projection;

    fn pointers() -> LatestFile {
        LatestFile::with_pointers(vec![Pointer::new(1.0, "a"), Pointer::new(5.0, "b")])
    }

    fn locked() -> Control {
        Control {
            locked: Some(json!("TRUE")),
            status: None,
        }
    }

    #[test]
    fn test_picks_latest_pointer() {
        let state = directory_from_latest(&FetchState::ready(Arc::new(pointers())), false);
        assert!(state.completed);
        assert_eq!(state.data.as_deref(), Some("b"));
    }

    #[test]
    fn test_curtain() {
        let file = Arc::new(pointers().with_control(locked()));
        let state = directory_from_latest(&FetchState::ready(Arc::clone(&file)), false);
        assert!(state.failed);
        assert_eq!(state.error, Some(LiveError::Curtain));
        assert!(state.data.is_none());

        let bypassed = directory_from_latest(&FetchState::ready(file), true);
        assert_eq!(bypassed.data.as_deref(), Some("b"));
    }

    #[test]
    fn test_lock_requires_exact_value() {
        let control = Control {
            locked: Some(json!("true")),
            status: None,
        };
        let file = Arc::new(pointers().with_control(control));
        let state = directory_from_latest(&FetchState::ready(file), false);
        assert_eq!(state.data.as_deref(), Some("b"));
    }

    #[test]
    fn test_empty_pointers_regardless_of_lock() {
        for file in [
            LatestFile::with_pointers(Vec::new()),
            LatestFile::with_pointers(Vec::new()).with_control(locked()),
            LatestFile::default(),
        ] {
            let state = directory_from_latest(&FetchState::ready(Arc::new(file)), true);
            assert!(state.failed);
            assert_eq!(state.error, Some(LiveError::NoPointer));
        }
    }

    #[test]
    fn test_incomplete_state_propagates() {
        let pending = directory_from_latest(&FetchState::pending(), false);
        assert!(pending.loading);
        assert!(!pending.completed);

        let failed = directory_from_latest(
            &FetchState::failure(LiveError::Network("refused".to_string())),
            false,
        );
        assert!(failed.failed);
        assert_eq!(failed.error, Some(LiveError::Network("refused".to_string())));
    }

    #[test]
    fn test_override_wins_and_skips_pointer() {
        let sources = DirectorySources {
            latest: Resource::new("/data/latest.json"),
            override_directory: Setting::new(Some("20190324T1800".to_string())),
            curtain_bypass: Setting::new(false),
        };
        let resolver = sources.clone();
        let directory = Projection::new("directory", move |cx| resolver.resolve(cx));
        let _subscription = directory.subscribe(|| {});

        assert_eq!(directory.get().data.as_deref(), Some("20190324T1800"));
        assert!(!sources.latest.is_activated());

        sources.override_directory.set(None);
        assert!(directory.get().loading);
        assert!(sources.latest.is_activated());
    }

    #[test]
    fn test_empty_override_is_ignored() {
        let sources = DirectorySources {
            latest: Resource::new("/data/latest.json"),
            override_directory: Setting::new(Some(String::new())),
            curtain_bypass: Setting::new(false),
        };
        let mut tracker = Tracker::new();
        assert!(sources.resolve(&mut tracker).loading);
        assert_eq!(tracker.len(), 3);
    }
}
