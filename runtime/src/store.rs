//! Store module - The runtime for reducers
//!
//! Store runtime for coordinating reducer execution and effect handling.

use crate::metrics::StoreMetrics;
use crate::{DecrementGuard, EffectHandle, ExecutionContext, StoreConfig, StoreError};
use composable_store_core::cancellation::CancellationRegistry;
use composable_store_core::effect::{Effect, EffectStream};
use composable_store_core::optics::{ActionPrism, StateLens};
use composable_store_core::reducer::{Effects, Reducer};
use futures::stream::{BoxStream, StreamExt};
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;

/// Push stream of state snapshots, as returned by [`Store::states`].
pub type StateStream<S> = BoxStream<'static, Arc<S>>;

type Step<S, A> = Box<dyn Fn(&mut S, A) -> Effects<A> + Send + Sync>;
type Forward<A> = Box<dyn Fn(A) -> Option<EffectHandle> + Send + Sync>;
type Resync<S> = Box<dyn Fn() -> (u64, Option<S>) + Send + Sync>;
type Projection<P, S> = Arc<dyn Fn(&P) -> Option<S> + Send + Sync>;

/// One published snapshot. Versions increase by one per publish.
struct Published<S> {
    version: u64,
    state: Arc<S>,
}

impl<S> Clone for Published<S> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            state: Arc::clone(&self.state),
        }
    }
}

enum Driver<S, A> {
    /// Runs the reducer itself.
    Root {
        step: Step<S, A>,
        registry: CancellationRegistry,
    },
    /// Forwards to a parent and mirrors its state.
    Scoped(ScopeLink<S, A>),
}

struct ScopeLink<S, A> {
    forward: Forward<A>,
    resync: Resync<S>,
    /// Latest parent version applied to this child.
    source_version: AtomicU64,
    subscription: Mutex<Option<tokio::task::AbortHandle>>,
}

impl<S, A> ScopeLink<S, A> {
    fn cancel(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.abort();
            tracing::trace!("Scoped store detached from its parent");
        }
    }
}

struct Inner<S, A> {
    name: Arc<str>,
    context: ExecutionContext,
    driver: Driver<S, A>,
    snapshot: watch::Sender<Published<S>>,
    states: broadcast::Sender<Published<S>>,
    faults: broadcast::Sender<StoreError>,
    capacity: usize,
}

impl<S, A> Inner<S, A> {
    fn published(&self) -> Published<S> {
        self.snapshot.borrow().clone()
    }

    fn publish(&self, state: S) {
        let version = self.snapshot.borrow().version + 1;
        let published = Published {
            version,
            state: Arc::new(state),
        };
        self.snapshot.send_replace(published.clone());
        // No subscribers is fine.
        let _ = self.states.send(published);
        tracing::trace!(store = %self.name, version, "Published state");
    }

    /// Apply a parent snapshot to a scoped child, ignoring anything older than what
    /// the child already shows. `None` means the child's element is gone: the last
    /// good snapshot stays.
    fn apply_source(&self, version: u64, local: Option<S>) {
        let Driver::Scoped(link) = &self.driver else {
            return;
        };
        if version <= link.source_version.load(Ordering::SeqCst) {
            return;
        }
        link.source_version.store(version, Ordering::SeqCst);

        match local {
            Some(state) => self.publish(state),
            None => tracing::trace!(store = %self.name, "Element gone, keeping last snapshot"),
        }
    }

    fn report_fault(&self, error: StoreError) {
        tracing::error!(store = %self.name, %error, "Effect failed");
        StoreMetrics::record_effect_failed(&self.name);
        let _ = self.faults.send(error);
    }
}

impl<S, A> Drop for Inner<S, A> {
    fn drop(&mut self) {
        if let Driver::Scoped(link) = &self.driver {
            link.cancel();
        }
    }
}

/// The Store - runtime coordinator for a reducer
///
/// The Store manages:
/// 1. State (an immutable `Arc` snapshot, replaced after every action)
/// 2. Reducer and environment (closed over into a step function)
/// 3. Effect execution (local tasks whose outputs are sent back in)
/// 4. Cancellation (one [`CancellationRegistry`] per root store)
///
/// Cloning is cheap; clones share the same state.
///
/// # Type Parameters
///
/// - `S`: State type
/// - `A`: Action type
///
/// # Example
///
/// ```ignore
/// let local = tokio::task::LocalSet::new();
/// local.run_until(async {
///     let store = Store::new(AppState::default(), app_reducer(), env, ExecutionContext::current());
///     store.send(AppAction::AddTodoButtonTapped);
///     assert_eq!(store.current_state().todos.len(), 1);
/// }).await;
/// ```
pub struct Store<S, A> {
    inner: Arc<Inner<S, A>>,
}

impl<S, A> Clone for Store<S, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, A> fmt::Debug for Store<S, A>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let published = self.inner.published();
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("version", &published.version)
            .field("state", &published.state)
            .finish_non_exhaustive()
    }
}

impl<S, A> Store<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: fmt::Debug + Send + 'static,
{
    /// Create a new store with initial state, reducer, and environment
    ///
    /// # Arguments
    ///
    /// - `initial_state`: The starting state for the store
    /// - `reducer`: The reducer implementation (business logic)
    /// - `environment`: Injected dependencies
    /// - `context`: The thread the store is driven from
    #[must_use]
    pub fn new<R>(
        initial_state: S,
        reducer: R,
        environment: R::Environment,
        context: ExecutionContext,
    ) -> Self
    where
        R: Reducer<State = S, Action = A> + Send + Sync + 'static,
        R::Environment: Send + Sync + 'static,
    {
        Self::build(initial_state, reducer, environment, context, &StoreConfig::default())
    }

    /// Create a new store with custom configuration
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if the configuration fails validation.
    pub fn with_config<R>(
        initial_state: S,
        reducer: R,
        environment: R::Environment,
        context: ExecutionContext,
        config: &StoreConfig,
    ) -> Result<Self, StoreError>
    where
        R: Reducer<State = S, Action = A> + Send + Sync + 'static,
        R::Environment: Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self::build(initial_state, reducer, environment, context, config))
    }

    fn build<R>(
        initial_state: S,
        reducer: R,
        environment: R::Environment,
        context: ExecutionContext,
        config: &StoreConfig,
    ) -> Self
    where
        R: Reducer<State = S, Action = A> + Send + Sync + 'static,
        R::Environment: Send + Sync + 'static,
    {
        let name: Arc<str> = Arc::from(config.name.as_str());
        let registry = {
            let name = Arc::clone(&name);
            CancellationRegistry::with_cancel_hook(move |_id, count| {
                StoreMetrics::record_cancelled(&name, count);
            })
        };
        let step: Step<S, A> =
            Box::new(move |state: &mut S, action: A| reducer.reduce(state, action, &environment));
        let (faults, _) = broadcast::channel(config.broadcast_capacity);

        tracing::debug!(store = %name, "Store created");
        Self::from_parts(
            name,
            context,
            Driver::Root { step, registry },
            initial_state,
            faults,
            config.broadcast_capacity,
        )
    }

    fn from_parts(
        name: Arc<str>,
        context: ExecutionContext,
        driver: Driver<S, A>,
        initial_state: S,
        faults: broadcast::Sender<StoreError>,
        capacity: usize,
    ) -> Self {
        let (snapshot, _) = watch::channel(Published {
            version: 0,
            state: Arc::new(initial_state),
        });
        let (states, _) = broadcast::channel(capacity);

        Self {
            inner: Arc::new(Inner {
                name,
                context,
                driver,
                snapshot,
                states,
                faults,
                capacity,
            }),
        }
    }

    /// Name used in logs and metric labels.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The context this store must be driven from.
    #[must_use]
    pub fn context(&self) -> ExecutionContext {
        self.inner.context
    }

    /// Send an action to the store
    ///
    /// This is the primary way to interact with the store:
    /// 1. Runs the reducer on a copy of the current state
    /// 2. Publishes the new state before any effect starts
    /// 3. Spawns the returned effects as one local task
    /// 4. Every action an effect produces is sent back through `send`
    ///
    /// A scoped store forwards the action to its parent instead and then
    /// re-reads its own state from the parent.
    ///
    /// # Returns
    ///
    /// An [`EffectHandle`] that can be used to wait for the effects this action started.
    ///
    /// # Panics
    ///
    /// Panics if called off the store's [`ExecutionContext`], or outside a
    /// [`tokio::task::LocalSet`] when the reducer returns effects. If the reducer
    /// panics, the panic propagates to the caller.
    #[tracing::instrument(skip_all, name = "store_send", fields(store = %self.inner.name))]
    pub fn send(&self, action: A) -> EffectHandle {
        self.ensure_on_context(&action);

        match &self.inner.driver {
            Driver::Root { step, registry } => {
                tracing::debug!(?action, "Processing action");
                let mut state = S::clone(&self.inner.snapshot.borrow().state);

                let start = Instant::now();
                let effects = {
                    let span = tracing::debug_span!("reducer_execution");
                    let _enter = span.enter();
                    step(&mut state, action)
                };
                StoreMetrics::record_action(&self.inner.name, start.elapsed());

                self.inner.publish(state);
                self.run_effects(effects, registry)
            },
            Driver::Scoped(link) => {
                let Some(handle) = (link.forward)(action) else {
                    tracing::warn!("Action sent to a scoped store whose element is gone; ignored");
                    return EffectHandle::completed();
                };
                let (version, local) = (link.resync)();
                self.inner.apply_source(version, local);
                handle
            },
        }
    }

    #[allow(clippy::panic)] // Sending off-context is a programming error
    fn ensure_on_context(&self, action: &A) {
        if !self.inner.context.is_current() {
            panic!(
                "store `{}` received {action:?} on thread {:?}, but it is bound to thread {:?}",
                self.inner.name,
                std::thread::current().id(),
                self.inner.context.thread_id(),
            );
        }
    }

    fn run_effects(&self, effects: Effects<A>, registry: &CancellationRegistry) -> EffectHandle {
        let effect = Effect::merge(effects.into_vec());
        if effect.is_none() {
            return EffectHandle::completed();
        }

        StoreMetrics::record_effect_started(&self.inner.name);
        let (handle, tracking) = EffectHandle::new();
        let guard = DecrementGuard::new(tracking);
        let outputs = effect.into_stream(registry);
        let store = Arc::downgrade(&self.inner);
        let span = tracing::debug_span!("execute_effect", store = %self.inner.name);

        tokio::task::spawn_local(
            async move {
                let _guard = guard;
                let run = AssertUnwindSafe(Self::feed_back(Weak::clone(&store), outputs))
                    .catch_unwind()
                    .await;

                if let Err(panic) = run {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    if let Some(inner) = store.upgrade() {
                        inner.report_fault(StoreError::EffectPanicked(message));
                    }
                }
            }
            .instrument(span),
        );

        handle
    }

    async fn feed_back(store: Weak<Inner<S, A>>, mut outputs: EffectStream<A>) {
        while let Some(output) = outputs.next().await {
            let Some(inner) = store.upgrade() else {
                tracing::trace!("Store dropped, abandoning effect outputs");
                return;
            };

            match output {
                Ok(action) => {
                    tracing::trace!("Effect produced an action");
                    let _ = Self { inner }.send(action);
                },
                // Other merged effects keep running.
                Err(error) => inner.report_fault(StoreError::from(error)),
            }
        }
        tracing::trace!("Effect completed");
    }

    /// The latest published state. Never suspends.
    #[must_use]
    pub fn current_state(&self) -> Arc<S> {
        Arc::clone(&self.inner.snapshot.borrow().state)
    }

    /// Read current state via a closure
    ///
    /// ```ignore
    /// let todo_count = store.state(|s| s.todos.len());
    /// ```
    pub fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        f(&self.current_state())
    }

    /// Subscribe to state snapshots.
    ///
    /// The stream starts with the latest snapshot at subscription time, then yields
    /// every later publish in order. Nothing published earlier is replayed. A
    /// subscriber more than the configured broadcast capacity behind skips ahead
    /// (with a warning). The stream ends when the store is dropped.
    #[must_use]
    pub fn states(&self) -> StateStream<S> {
        let mut receiver = self.inner.states.subscribe();
        let initial = self.inner.published();
        let name = Arc::clone(&self.inner.name);

        Box::pin(async_stream::stream! {
            let mut last_version = initial.version;
            yield initial.state;

            loop {
                match receiver.recv().await {
                    Ok(published) => {
                        if published.version > last_version {
                            last_version = published.version;
                            yield published.state;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(store = %name, skipped, "State subscriber lagged, skipping ahead");
                        StoreMetrics::record_lagged(&name, skipped);
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Subscribe to effect failures and panics reported by this store (and, for a
    /// scoped store, by its root).
    #[must_use]
    pub fn subscribe_faults(&self) -> broadcast::Receiver<StoreError> {
        self.inner.faults.subscribe()
    }

    /// Stop mirroring the parent. No-op on a root store.
    ///
    /// A cancelled child keeps its last snapshot and still forwards actions.
    pub fn cancel(&self) {
        if let Driver::Scoped(link) = &self.inner.driver {
            link.cancel();
        }
    }

    /// Whether this is a scoped store still mirroring its parent.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        match &self.inner.driver {
            Driver::Root { .. } => false,
            Driver::Scoped(link) => link
                .subscription
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(|subscription| !subscription.is_finished()),
        }
    }

    /// Derive a child store through a pair of functions.
    ///
    /// The child's state is always `to_local` of the parent's state. Sending to the
    /// child sends `from_local(action)` to the parent, so the child never runs a
    /// reducer of its own.
    ///
    /// # Panics
    ///
    /// Panics if called outside a [`tokio::task::LocalSet`]; the mirroring
    /// subscription is a local task.
    #[must_use]
    pub fn scope<L, LA, F, G>(&self, to_local: F, from_local: G) -> Store<L, LA>
    where
        L: Clone + Send + Sync + 'static,
        LA: fmt::Debug + Send + 'static,
        F: Fn(&S) -> L + Send + Sync + 'static,
        G: Fn(LA) -> A + Send + Sync + 'static,
    {
        let initial = to_local(&*self.current_state());
        let project: Projection<S, L> = Arc::new(move |state: &S| Some(to_local(state)));
        let parent = self.clone();
        let forward: Forward<LA> = Box::new(move |action| Some(parent.send(from_local(action))));

        self.attach(initial, project, forward, "scope")
    }

    /// Derive a child store that shares the parent's action type.
    ///
    /// # Panics
    ///
    /// Panics if called outside a [`tokio::task::LocalSet`].
    #[must_use]
    pub fn scope_state<L, F>(&self, to_local: F) -> Store<L, A>
    where
        L: Clone + Send + Sync + 'static,
        F: Fn(&S) -> L + Send + Sync + 'static,
    {
        self.scope(to_local, |action| action)
    }

    /// Derive a child store through a lens and a prism.
    ///
    /// # Panics
    ///
    /// Panics if called outside a [`tokio::task::LocalSet`].
    #[must_use]
    pub fn scope_lens<L, LA>(
        &self,
        lens: StateLens<S, L>,
        prism: ActionPrism<A, LA>,
    ) -> Store<L, LA>
    where
        L: Clone + Send + Sync + 'static,
        LA: fmt::Debug + Send + 'static,
    {
        self.scope(
            move |state| lens.get(state).clone(),
            move |action| prism.embed(action),
        )
    }

    /// Derive one child store per element of a keyed list.
    ///
    /// Each child follows its element by id through every parent update, wherever
    /// the element moves in the list. Once the element is removed the child keeps
    /// its last snapshot, and actions sent to it are dropped with a warning.
    ///
    /// # Panics
    ///
    /// Panics if called outside a [`tokio::task::LocalSet`].
    #[must_use]
    pub fn scope_each<L, LA, Id, F, I, G>(
        &self,
        to_list: F,
        id_of: I,
        from_local: G,
    ) -> Vec<Store<L, LA>>
    where
        L: Clone + Send + Sync + 'static,
        LA: fmt::Debug + Send + 'static,
        Id: PartialEq + Clone + fmt::Debug + Send + Sync + 'static,
        F: Fn(&S) -> &[L] + Send + Sync + 'static,
        I: Fn(&L) -> Id + Send + Sync + 'static,
        G: Fn(Id, LA) -> A + Send + Sync + 'static,
    {
        let to_list = Arc::new(to_list);
        let id_of = Arc::new(id_of);
        let from_local = Arc::new(from_local);
        let current = self.current_state();

        to_list(&*current)
            .iter()
            .map(|element| {
                let id = id_of(element);

                let project: Projection<S, L> = {
                    let (to_list, id_of, id) = (Arc::clone(&to_list), Arc::clone(&id_of), id.clone());
                    Arc::new(move |state: &S| {
                        to_list(state).iter().find(|e| id_of(*e) == id).cloned()
                    })
                };

                let forward: Forward<LA> = {
                    let parent = self.clone();
                    let (to_list, id_of, from_local, id) = (
                        Arc::clone(&to_list),
                        Arc::clone(&id_of),
                        Arc::clone(&from_local),
                        id.clone(),
                    );
                    Box::new(move |action| {
                        let present = to_list(&*parent.current_state())
                            .iter()
                            .any(|e| id_of(e) == id);
                        if !present {
                            tracing::warn!(?id, ?action, "Element no longer in the list");
                            return None;
                        }
                        Some(parent.send(from_local(id.clone(), action)))
                    })
                };

                self.attach(element.clone(), project, forward, &format!("[{id:?}]"))
            })
            .collect()
    }

    /// Build a scoped child and start mirroring this store into it.
    fn attach<L, LA>(
        &self,
        initial: L,
        project: Projection<S, L>,
        forward: Forward<LA>,
        label: &str,
    ) -> Store<L, LA>
    where
        L: Clone + Send + Sync + 'static,
        LA: fmt::Debug + Send + 'static,
    {
        // Subscribe before reading the source version so no publish falls in between.
        let mut parent_states = self.inner.states.subscribe();
        let source = self.inner.published();

        let resync: Resync<L> = {
            let parent = Arc::downgrade(&self.inner);
            let project = Arc::clone(&project);
            Box::new(move || match parent.upgrade() {
                Some(parent) => {
                    let published = parent.published();
                    (published.version, project(&*published.state))
                },
                None => (0, None),
            })
        };

        let link = ScopeLink {
            forward,
            resync,
            source_version: AtomicU64::new(source.version),
            subscription: Mutex::new(None),
        };
        let name: Arc<str> = Arc::from(format!("{}/{label}", self.inner.name));
        let child = Store::from_parts(
            name,
            self.inner.context,
            Driver::Scoped(link),
            initial,
            self.inner.faults.clone(),
            self.inner.capacity,
        );

        let weak_child = Arc::downgrade(&child.inner);
        let weak_parent = Arc::downgrade(&self.inner);
        let subscription = tokio::task::spawn_local(async move {
            loop {
                let published = match parent_states.recv().await {
                    Ok(published) => published,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Scoped store lagged behind its parent, resynchronising");
                        let Some(parent) = weak_parent.upgrade() else {
                            break;
                        };
                        parent.published()
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let Some(child) = weak_child.upgrade() else {
                    break;
                };
                child.apply_source(published.version, project(&*published.state));
            }
        });

        if let Driver::Scoped(link) = &child.inner.driver {
            *link
                .subscription
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(subscription.abort_handle());
        }
        tracing::debug!(store = %child.inner.name, "Scoped store attached");
        child
    }
}
