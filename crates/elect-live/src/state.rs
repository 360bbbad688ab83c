//! Fetch state of one logical endpoint.

use crate::error::LiveError;

/// Outcome of fetching one endpoint, as seen by consumers.
///
/// `completed` never goes back to `false` for a given resource once a
/// fetch has succeeded, and `data` survives failed refreshes.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchState<T> {
    /// A fetch is in flight.
    pub loading: bool,
    /// The most recent fetch attempt failed.
    pub failed: bool,
    /// At least one fetch has succeeded.
    pub completed: bool,
    /// Payload of the most recent successful fetch.
    pub data: Option<T>,
    /// The most recent failure, cleared on success.
    pub error: Option<LiveError>,
}

/// The "never fetched" sentinel: loading, nothing else.
impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self {
            loading: true,
            failed: false,
            completed: false,
            data: None,
            error: None,
        }
    }
}

impl<T> FetchState<T> {
    /// State of a resource that has never been fetched.
    #[must_use]
    pub fn pending() -> Self {
        Self::default()
    }

    /// Completed state holding `data`.
    #[must_use]
    pub fn ready(data: T) -> Self {
        Self {
            loading: false,
            failed: false,
            completed: true,
            data: Some(data),
            error: None,
        }
    }

    /// Failed state with no data.
    #[must_use]
    pub fn failure(error: LiveError) -> Self {
        Self {
            loading: false,
            failed: true,
            completed: false,
            data: None,
            error: Some(error),
        }
    }

    /// Mark a fetch as started. Other fields are left untouched.
    pub fn begin_fetch(&mut self) {
        self.loading = true;
    }

    /// Apply a successful fetch.
    pub fn succeed(&mut self, data: T) {
        self.failed = false;
        self.completed = true;
        self.loading = false;
        self.data = Some(data);
        self.error = None;
    }

    /// Apply a failed fetch. `completed` and `data` are kept.
    pub fn fail(&mut self, error: LiveError) {
        self.failed = true;
        self.loading = false;
        self.error = Some(error);
    }

    /// Whether a payload is available.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Same flags and error, without data.
    #[must_use]
    pub fn retype<U>(self) -> FetchState<U> {
        FetchState {
            loading: self.loading,
            failed: self.failed,
            completed: self.completed,
            data: None,
            error: self.error,
        }
    }

    /// Transform the payload, keeping the flags.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchState<U> {
        let Self {
            loading,
            failed,
            completed,
            data,
            error,
        } = self;
        FetchState {
            loading,
            failed,
            completed,
            data: data.map(f),
            error,
        }
    }

    /// Transform the payload into an optional value, keeping the flags.
    ///
    /// Used to narrow a payload to one of its entries; a missing entry
    /// leaves the state without data.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Option<U>) -> FetchState<U> {
        let Self {
            loading,
            failed,
            completed,
            data,
            error,
        } = self;
        FetchState {
            loading,
            failed,
            completed,
            data: data.and_then(f),
            error,
        }
    }

    /// Borrow the payload.
    #[must_use]
    pub fn borrowed(&self) -> FetchState<&T> {
        FetchState {
            loading: self.loading,
            failed: self.failed,
            completed: self.completed,
            data: self.data.as_ref(),
            error: self.error.clone(),
        }
    }
}
