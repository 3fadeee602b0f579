//! Identity-keyed cancellation of in-flight effects.
//!
//! Every [`Effect::Cancellable`](crate::effect::Effect::Cancellable) registers the
//! task backing it under a [`CancelId`] when it is driven, and removes itself again
//! when it finishes, fails, or is dropped. [`Effect::Cancel`](crate::effect::Effect::Cancel)
//! aborts everything registered under an id.
//!
//! The registry is an ordinary value: each `Store` (and each `TestStore`) owns one
//! and hands it to every effect it drives, so tests never share cancellation state.
//!
//! # Example
//!
//! ```
//! use composable_store_core::cancellation::{CancelId, CancellationRegistry};
//! use futures::future::AbortHandle;
//!
//! #[derive(Debug, Hash, PartialEq, Eq)]
//! struct SearchRequest;
//!
//! let registry = CancellationRegistry::new();
//! let (handle, _registration) = AbortHandle::new_pair();
//!
//! registry.register(CancelId::new(SearchRequest), handle.clone());
//! assert_eq!(registry.task_count(&CancelId::new(SearchRequest)), 1);
//!
//! assert_eq!(registry.cancel_all(&CancelId::new(SearchRequest)), 1);
//! assert!(handle.is_aborted());
//! assert!(registry.is_empty());
//! ```

use futures::future::AbortHandle;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Object-safe view of a cancellation key.
trait Key: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn Key) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<K> Key for K
where
    K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn Key) -> bool {
        other
            .as_any()
            .downcast_ref::<K>()
            .is_some_and(|other| other == self)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<K>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// Opaque key grouping effect tasks for bulk cancellation.
///
/// Any `Hash + Eq + Debug` value can serve as a key. Keys of different types never
/// compare equal, so a unit struct per feature is the usual way to keep ids from
/// colliding:
///
/// ```
/// use composable_store_core::cancellation::CancelId;
///
/// #[derive(Debug, Hash, PartialEq, Eq)]
/// struct TimerId;
///
/// assert_eq!(CancelId::new(TimerId), CancelId::new(TimerId));
/// assert_ne!(CancelId::new(1_u32), CancelId::new(1_u64));
/// assert_eq!(CancelId::from("search"), CancelId::new("search"));
/// ```
#[derive(Clone)]
pub struct CancelId(Arc<dyn Key>);

impl CancelId {
    /// Wrap any hashable, comparable value as a cancellation id.
    #[must_use]
    pub fn new<K>(key: K) -> Self
    where
        K: Hash + Eq + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(key))
    }
}

impl PartialEq for CancelId {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(&*other.0)
    }
}

impl Eq for CancelId {}

impl Hash for CancelId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

impl fmt::Debug for CancelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CancelId").field(&self.0).finish()
    }
}

impl From<&'static str> for CancelId {
    fn from(key: &'static str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CancelId {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

impl From<u64> for CancelId {
    fn from(key: u64) -> Self {
        Self::new(key)
    }
}

/// Identifies one registered task within its id's set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey(u64);

#[derive(Default)]
struct RegistryState {
    next_key: u64,
    tasks: HashMap<CancelId, HashMap<TaskKey, AbortHandle>>,
}

/// Table of in-flight cancellable tasks, keyed by [`CancelId`].
///
/// Cloning is cheap and yields a handle to the same table. All operations take a
/// single mutex for the duration of a map update, so `register`, `unregister` and
/// `cancel_all` are linearizable with respect to each other: a task removed by
/// `cancel_all` that finishes at the same moment simply finds nothing to unregister.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    inner: Arc<Mutex<RegistryState>>,
    on_cancel: Option<CancelHook>,
}

type CancelHook = Arc<dyn Fn(&CancelId, usize) + Send + Sync>;

impl CancellationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that reports every non-empty `cancel_all` to `hook`
    /// with the id and the number of tasks cancelled.
    ///
    /// The hook runs after the registry lock is released.
    #[must_use]
    pub fn with_cancel_hook<F>(hook: F) -> Self
    where
        F: Fn(&CancelId, usize) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::default(),
            on_cancel: Some(Arc::new(hook)),
        }
    }

    // A panic while holding the lock cannot leave the maps half-updated.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `handle` to the set registered under `id`, creating the set if needed.
    pub fn register(&self, id: CancelId, handle: AbortHandle) -> TaskKey {
        let mut state = self.lock();
        let key = TaskKey(state.next_key);
        state.next_key += 1;

        tracing::trace!(?id, ?key, "Registering cancellable task");
        state.tasks.entry(id).or_default().insert(key, handle);
        key
    }

    /// Remove one task from the set under `id`, deleting the entry when it empties.
    ///
    /// Returns `false` if the task was no longer registered (for example because it
    /// was cancelled in the meantime).
    pub fn unregister(&self, id: &CancelId, key: TaskKey) -> bool {
        let mut state = self.lock();
        let Some(tasks) = state.tasks.get_mut(id) else {
            return false;
        };

        let removed = tasks.remove(&key).is_some();
        if tasks.is_empty() {
            state.tasks.remove(id);
        }

        tracing::trace!(?id, ?key, removed, "Unregistered cancellable task");
        removed
    }

    /// Abort and forget every task registered under `id`.
    ///
    /// Returns the number of tasks cancelled; zero if the id is unknown.
    pub fn cancel_all(&self, id: &CancelId) -> usize {
        let cancelled = {
            let mut state = self.lock();
            let Some(tasks) = state.tasks.remove(id) else {
                return 0;
            };

            for handle in tasks.values() {
                handle.abort();
            }
            tasks.len()
        };

        tracing::debug!(?id, cancelled, "Cancelled in-flight effects");
        if let Some(hook) = &self.on_cancel {
            hook(id, cancelled);
        }
        cancelled
    }

    /// Whether any task is currently registered under `id`.
    #[must_use]
    pub fn is_registered(&self, id: &CancelId) -> bool {
        self.lock().tasks.contains_key(id)
    }

    /// Number of tasks currently registered under `id`.
    #[must_use]
    pub fn task_count(&self, id: &CancelId) -> usize {
        self.lock().tasks.get(id).map_or(0, HashMap::len)
    }

    /// Number of ids with at least one live task.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Whether no id has a live task.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().tasks.is_empty()
    }
}

impl fmt::Debug for CancellationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("CancellationRegistry")
            .field("ids", &state.tasks.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
