//! Memoized per-key instances.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use crate::lock;
use crate::resource::Resource;

/// A map that creates each value once and hands out clones afterwards.
///
/// Entries are never evicted.
pub struct Memo<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Memo<K, V> {
    /// Create an empty memo.
    pub fn new() -> Self {
        Self::default()
    }

    /// The value for `key`, created with `create` on first use.
    ///
    /// `create` runs under the memo's lock and must not reenter it.
    pub fn get_or_insert_with(&self, key: K, create: impl FnOnce() -> V) -> V {
        lock(&self.entries).entry(key).or_insert_with(create).clone()
    }

    /// Number of memoized entries.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether nothing was memoized yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` was memoized.
    pub fn contains(&self, key: &K) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Memoized keys, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        lock(&self.entries).keys().cloned().collect()
    }
}

type Factory<T> = Box<dyn Fn(&str) -> Resource<T> + Send + Sync>;

/// One [`Resource`] per data file path.
///
/// Asking twice for the same path returns the same resource, so a file is
/// fetched at most once per snapshot directory no matter how many
/// projections read it.
pub struct ResourceRegistry<T> {
    memo: Memo<String, Resource<T>>,
    factory: Factory<T>,
}

impl<T: Clone + Send + 'static> ResourceRegistry<T> {
    /// Create a registry building resources with `factory`.
    pub fn new(factory: impl Fn(&str) -> Resource<T> + Send + Sync + 'static) -> Self {
        Self {
            memo: Memo::new(),
            factory: Box::new(factory),
        }
    }

    /// The resource for `path`, created on first request.
    pub fn get_or_create(&self, path: &str) -> Resource<T> {
        self.memo
            .get_or_insert_with(path.to_string(), || (self.factory)(path))
    }

    /// Number of resources created so far.
    pub fn len(&self) -> usize {
        self.memo.len()
    }

    /// Whether no resource was created yet.
    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }

    /// Whether a resource exists for `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.memo.contains(&path.to_string())
    }

    /// Paths with a resource, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = self.memo.keys();
        paths.sort();
        paths
    }
}

impl<T> std::fmt::Debug for ResourceRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resources", &lock(&self.memo.entries).len())
            .finish()
    }
}
