//! Stores that carry navigation callbacks down to their scoped children.
//!
//! The runtime never interprets routes. A [`Navigator`] is whatever the embedding
//! application provides, and every store scoped from a [`NavigableStore`] gets the
//! same one, so a deeply nested feature can push or pop screens without knowing
//! where it sits in the tree.

use crate::{EffectHandle, Store};
use composable_store_core::optics::{ActionPrism, StateLens};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Callback run when a navigated-to route is dismissed.
pub type DismissHandler = Box<dyn FnOnce() + Send>;

type NavigateFn = dyn Fn(&str, DismissHandler) + Send + Sync;
type PopFn = dyn Fn() + Send + Sync;

/// Navigation hooks supplied by the host application.
#[derive(Clone)]
pub struct Navigator {
    navigate_to: Arc<NavigateFn>,
    pop_back_stack: Arc<PopFn>,
}

impl Navigator {
    /// Build a navigator from the host's two callbacks.
    pub fn new<N, P>(navigate_to: N, pop_back_stack: P) -> Self
    where
        N: Fn(&str, DismissHandler) + Send + Sync + 'static,
        P: Fn() + Send + Sync + 'static,
    {
        Self {
            navigate_to: Arc::new(navigate_to),
            pop_back_stack: Arc::new(pop_back_stack),
        }
    }

    /// A navigator that only logs, for hosts without navigation.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(
            |route, _on_dismiss| tracing::debug!(route, "Navigation requested without a host"),
            || tracing::debug!("Back navigation requested without a host"),
        )
    }

    /// Ask the host to show `route`; `on_dismiss` runs when it is closed.
    pub fn navigate_to(&self, route: &str, on_dismiss: DismissHandler) {
        tracing::debug!(route, "Navigating");
        (self.navigate_to)(route, on_dismiss);
    }

    /// Ask the host to go back one screen.
    pub fn pop_back_stack(&self) {
        tracing::debug!("Popping back stack");
        (self.pop_back_stack)();
    }
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator").finish_non_exhaustive()
    }
}

/// A [`Store`] paired with a [`Navigator`].
///
/// Dereferences to the store, so `send`, `current_state` and `states` work as usual.
/// The scoping methods here return navigable children sharing the navigator.
pub struct NavigableStore<S, A> {
    store: Store<S, A>,
    navigator: Navigator,
}

impl<S, A> Clone for NavigableStore<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            navigator: self.navigator.clone(),
        }
    }
}

impl<S, A> NavigableStore<S, A>
where
    S: Clone + Send + Sync + 'static,
    A: fmt::Debug + Send + 'static,
{
    /// Pair a store with a navigator.
    #[must_use]
    pub const fn new(store: Store<S, A>, navigator: Navigator) -> Self {
        Self { store, navigator }
    }

    /// The wrapped store.
    #[must_use]
    pub const fn store(&self) -> &Store<S, A> {
        &self.store
    }

    /// The shared navigator.
    #[must_use]
    pub const fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Send an action to the wrapped store.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Store::send`].
    pub fn send(&self, action: A) -> EffectHandle {
        self.store.send(action)
    }

    /// Ask the host to show `route`.
    pub fn navigate_to<D>(&self, route: &str, on_dismiss: D)
    where
        D: FnOnce() + Send + 'static,
    {
        self.navigator.navigate_to(route, Box::new(on_dismiss));
    }

    /// Ask the host to go back one screen.
    pub fn pop_back_stack(&self) {
        self.navigator.pop_back_stack();
    }

    /// Navigable version of [`Store::scope`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a [`tokio::task::LocalSet`].
    #[must_use]
    pub fn scope<L, LA, F, G>(&self, to_local: F, from_local: G) -> NavigableStore<L, LA>
    where
        L: Clone + Send + Sync + 'static,
        LA: fmt::Debug + Send + 'static,
        F: Fn(&S) -> L + Send + Sync + 'static,
        G: Fn(LA) -> A + Send + Sync + 'static,
    {
        NavigableStore::new(self.store.scope(to_local, from_local), self.navigator.clone())
    }

    /// Navigable version of [`Store::scope_state`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a [`tokio::task::LocalSet`].
    #[must_use]
    pub fn scope_state<L, F>(&self, to_local: F) -> NavigableStore<L, A>
    where
        L: Clone + Send + Sync + 'static,
        F: Fn(&S) -> L + Send + Sync + 'static,
    {
        NavigableStore::new(self.store.scope_state(to_local), self.navigator.clone())
    }

    /// Navigable version of [`Store::scope_lens`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a [`tokio::task::LocalSet`].
    #[must_use]
    pub fn scope_lens<L, LA>(
        &self,
        lens: StateLens<S, L>,
        prism: ActionPrism<A, LA>,
    ) -> NavigableStore<L, LA>
    where
        L: Clone + Send + Sync + 'static,
        LA: fmt::Debug + Send + 'static,
    {
        NavigableStore::new(self.store.scope_lens(lens, prism), self.navigator.clone())
    }

    /// Navigable version of [`Store::scope_each`].
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
    ) -> Vec<NavigableStore<L, LA>>
    where
        L: Clone + Send + Sync + 'static,
        LA: fmt::Debug + Send + 'static,
        Id: PartialEq + Clone + fmt::Debug + Send + Sync + 'static,
        F: Fn(&S) -> &[L] + Send + Sync + 'static,
        I: Fn(&L) -> Id + Send + Sync + 'static,
        G: Fn(Id, LA) -> A + Send + Sync + 'static,
    {
        self.store
            .scope_each(to_list, id_of, from_local)
            .into_iter()
            .map(|store| NavigableStore::new(store, self.navigator.clone()))
            .collect()
    }
}

impl<S, A> Deref for NavigableStore<S, A> {
    type Target = Store<S, A>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl<S, A> fmt::Debug for NavigableStore<S, A>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigableStore")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
