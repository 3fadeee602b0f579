//! # Composable Store Runtime
//!
//! Runtime implementation for the Composable Store architecture.
//!
//! This crate provides the [`Store`] that owns a feature's state, runs its reducer for
//! every action, and executes the effects the reducer returns.
//!
//! ## Core Components
//!
//! - **Store**: Single-writer state container bound to an [`ExecutionContext`]
//! - **Effect Executor**: Drives effect descriptions as local tasks and feeds their
//!   outputs back through [`Store::send`]
//! - **Scoping**: Child stores projected from a parent ([`Store::scope`],
//!   [`Store::scope_each`]) that forward their actions upward and mirror the parent's state
//!
//! ## Threading
//!
//! A store is bound to the thread that created it. `send` must be called from that
//! thread, inside a [`tokio::task::LocalSet`]; effects run as local tasks on it.
//! Published snapshots are immutable `Arc`s and can be read from anywhere.
//!
//! ## Example
//!
//! ```
//! use composable_store_core::{smallvec, Effect, Reducer, SmallVec};
//! use composable_store_runtime::{ExecutionContext, Store};
//!
//! #[derive(Clone, Debug, Default)]
//! struct CounterState {
//!     count: i64,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum CounterAction {
//!     Increment,
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = CounterState;
//!     type Action = CounterAction;
//!     type Environment = ();
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CounterState,
//!         _action: CounterAction,
//!         _env: &(),
//!     ) -> SmallVec<[Effect<CounterAction>; 4]> {
//!         state.count += 1;
//!         smallvec![]
//!     }
//! }
//!
//! let runtime = tokio::runtime::Builder::new_current_thread()
//!     .enable_time()
//!     .build()
//!     .map_err(|e| e.to_string())?;
//! let local = tokio::task::LocalSet::new();
//!
//! local.block_on(&runtime, async {
//!     let store = Store::new(
//!         CounterState::default(),
//!         CounterReducer,
//!         (),
//!         ExecutionContext::current(),
//!     );
//!     store.send(CounterAction::Increment);
//!     assert_eq!(store.current_state().count, 1);
//! });
//! # Ok::<(), String>(())
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;
use tokio::sync::watch;

/// Prometheus metrics for observability
pub mod metrics;

mod navigation;
mod store;

pub use error::{ConfigError, StoreError};
pub use navigation::{DismissHandler, NavigableStore, Navigator};
pub use store::{StateStream, Store};

/// Error types for the Store runtime
pub mod error {
    use composable_store_core::effect::EffectError;
    use thiserror::Error;

    /// Errors that can occur during Store operations
    ///
    /// Effect failures never halt a store. They are logged, counted, and published
    /// to [`Store::subscribe_faults`](crate::Store::subscribe_faults) subscribers.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// An effect producer reported a failure
        #[error("Effect execution failed: {0}")]
        EffectFailed(#[from] EffectError),

        /// An effect task panicked
        #[error("Effect panicked: {0}")]
        EffectPanicked(String),

        /// The store configuration was rejected
        #[error("Invalid store configuration: {0}")]
        InvalidConfig(#[from] ConfigError),

        /// Waiting for effects took longer than allowed
        #[error("Timed out after {0:?} waiting for effects")]
        Timeout(std::time::Duration),
    }

    /// Errors raised while building a [`StoreConfig`](crate::StoreConfig)
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum ConfigError {
        /// An environment variable could not be parsed
        #[error("{key}={value:?} is not valid: {reason}")]
        InvalidValue {
            /// Variable name
            key: String,
            /// Raw value
            value: String,
            /// What was wrong with it
            reason: String,
        },

        /// The broadcast buffer must hold at least one snapshot
        #[error("broadcast capacity must be greater than zero")]
        ZeroCapacity,
    }
}

/// Environment variable naming a store in logs and metrics.
pub const STORE_NAME_ENV: &str = "STORE_NAME";

/// Environment variable sizing the state broadcast buffer.
pub const STORE_BROADCAST_CAPACITY_ENV: &str = "STORE_BROADCAST_CAPACITY";

/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use composable_store_runtime::StoreConfig;
///
/// let config = StoreConfig::default()
///     .with_name("todos")
///     .with_broadcast_capacity(256);
///
/// assert_eq!(config.name, "todos");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Name used in tracing spans and metric labels
    pub name: String,
    /// Number of snapshots a state subscriber may fall behind before skipping ahead
    pub broadcast_capacity: usize,
}

impl StoreConfig {
    /// Default number of buffered snapshots per subscriber
    pub const DEFAULT_BROADCAST_CAPACITY: usize = 64;

    /// Create a new configuration with custom values
    #[must_use]
    pub fn new(name: impl Into<String>, broadcast_capacity: usize) -> Self {
        Self {
            name: name.into(),
            broadcast_capacity,
        }
    }

    /// Set the store name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the broadcast buffer size
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Check the configuration can back a store.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroCapacity`] if the broadcast capacity is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    /// Read the configuration from `STORE_NAME` and `STORE_BROADCAST_CAPACITY`,
    /// falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unusable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(STORE_NAME_ENV) {
            let name = name.trim();
            if name.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: STORE_NAME_ENV.to_string(),
                    value: name.to_string(),
                    reason: "name must not be empty".to_string(),
                });
            }
            config.name = name.to_string();
        }

        if let Some(raw) = lookup(STORE_BROADCAST_CAPACITY_ENV) {
            config.broadcast_capacity =
                raw.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        key: STORE_BROADCAST_CAPACITY_ENV.to_string(),
                        value: raw.clone(),
                        reason: e.to_string(),
                    })?;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: "store".to_string(),
            broadcast_capacity: Self::DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

/// The thread a store is bound to.
///
/// Every [`Store::send`] checks it is running on its store's context and panics
/// otherwise. Capture the context on the thread that will drive the store:
///
/// ```
/// use composable_store_runtime::ExecutionContext;
///
/// let context = ExecutionContext::current();
/// assert!(context.is_current());
///
/// let elsewhere = std::thread::spawn(move || context.is_current())
///     .join()
///     .unwrap_or(true);
/// assert!(!elsewhere);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionContext {
    thread: ThreadId,
}

impl ExecutionContext {
    /// The context of the calling thread.
    #[must_use]
    pub fn current() -> Self {
        Self {
            thread: std::thread::current().id(),
        }
    }

    /// Whether the caller is running on this context.
    #[must_use]
    pub fn is_current(self) -> bool {
        std::thread::current().id() == self.thread
    }

    /// The bound thread.
    #[must_use]
    pub const fn thread_id(self) -> ThreadId {
        self.thread
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`] to allow waiting for the effects that action
/// started. Actions those effects feed back get their own handles; waiting here
/// does not cover them.
///
/// # Example
///
/// ```ignore
/// let mut handle = store.send(Action::Start);
/// handle.wait_with_timeout(Duration::from_secs(5)).await?;
/// // All effects from Action::Start are now complete
/// ```
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    /// Create a handle and the tracking half kept by the effect task.
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());

        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };

        let tracking = EffectTracking {
            counter,
            notifier: tx,
        };

        (handle, tracking)
    }

    /// Create a handle that's already complete
    ///
    /// Returned for actions that started no effect.
    #[must_use]
    pub fn completed() -> Self {
        let (tx, rx) = watch::channel(());
        let _ = tx.send(());

        Self {
            effects: Arc::new(AtomicUsize::new(0)),
            completion: rx,
        }
    }

    /// Whether every tracked effect has finished.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.effects.load(Ordering::SeqCst) == 0
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires before all effects complete.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout(timeout))
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.effects.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Internal: Effect tracking context carried by an effect task
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: watch::Sender<()>,
}

impl EffectTracking {
    /// Increment the effect counter (effect started)
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the effect counter (effect completed)
    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: RAII guard that decrements effect counter on drop
///
/// Ensures the effect counter is always decremented, even if the effect panics
/// or its task is aborted.
struct DecrementGuard(EffectTracking);

impl DecrementGuard {
    fn new(tracking: EffectTracking) -> Self {
        tracking.increment();
        Self(tracking)
    }
}

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}
