//! Exhaustive, virtual-time test harness for reducers and their effects.
//!
//! A [`TestStore`] runs a reducer the way a Store does, but every action an
//! effect produces is queued instead of reduced. The test must `receive` each one,
//! in order, stating how it changes the state. Time only moves when the test
//! moves it, so debounces and delays are deterministic.
//!
//! Tests that use timers need a paused clock:
//!
//! ```ignore
//! #[tokio::test(start_paused = true)]
//! async fn search_is_debounced() {
//!     let mut store = TestStore::new(SearchState::default(), SearchReducer, env());
//!
//!     store.send(SearchAction::QueryChanged("rust".into()), |s| s.query = "rust".into());
//!     store.advance_time_by(Duration::from_millis(300)).await;
//!     store.receive(SearchAction::Response(vec![]), |s| s.results = Some(vec![]));
//!     store.finish();
//! }
//! ```

#![allow(clippy::module_name_repetitions)] // TestStore is the natural name

use composable_store_core::cancellation::CancellationRegistry;
use composable_store_core::effect::{EffectError, EffectStream};
use composable_store_core::optics::{ActionPrism, StateLens};
use composable_store_core::reducer::{Effects, Reducer};
use futures::stream::{SelectAll, StreamExt};
use futures::FutureExt;
use std::collections::VecDeque;
use std::fmt::{self, Debug, Write as _};
use std::time::Duration;

/// Deterministic harness around a reducer.
///
/// # Panics
///
/// Dropping a `TestStore` that still holds received actions panics, unless the
/// thread is already panicking.
pub struct TestStore<R>
where
    R: Reducer,
{
    reducer: R,
    environment: R::Environment,
    state: R::State,
    registry: CancellationRegistry,
    in_flight: SelectAll<EffectStream<R::Action>>,
    received: VecDeque<R::Action>,
}

impl<R> TestStore<R>
where
    R: Reducer,
    R::State: Clone + PartialEq + Debug,
    R::Action: PartialEq + Debug + Send + 'static,
{
    /// Create a harness starting from `initial_state`.
    #[must_use]
    pub fn new(initial_state: R::State, reducer: R, environment: R::Environment) -> Self {
        Self {
            reducer,
            environment,
            state: initial_state,
            registry: CancellationRegistry::new(),
            in_flight: SelectAll::new(),
            received: VecDeque::new(),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &R::State {
        &self.state
    }

    /// Whether effects produced actions that have not been received yet.
    #[must_use]
    pub fn has_pending_actions(&self) -> bool {
        !self.received.is_empty()
    }

    /// Number of effects still running.
    #[must_use]
    pub fn in_flight_effects(&self) -> usize {
        self.in_flight.len()
    }

    /// Send `action` and assert the resulting state.
    ///
    /// `update` receives a copy of the state before the action and must turn it into
    /// the state expected afterwards. Effects are started and driven until they
    /// suspend.
    ///
    /// # Panics
    ///
    /// Panics if received actions are still pending, if the state differs from the
    /// expectation, or if an effect fails.
    #[track_caller]
    #[allow(clippy::panic)] // Test assertion
    pub fn send<F>(&mut self, action: R::Action, update: F)
    where
        F: FnOnce(&mut R::State),
    {
        if let Some(pending) = self.received.front() {
            panic!(
                "Must handle {} received action(s) before sending {action:?}.\n  next: {pending:?}",
                self.received.len(),
            );
        }

        let mut expected = self.state.clone();
        update(&mut expected);
        self.step(action, &expected);
    }

    /// Reduce the earliest received action and assert the resulting state.
    ///
    /// # Panics
    ///
    /// Panics if nothing was received, if the earliest received action is not
    /// `action`, if the state differs from the expectation, or if an effect fails.
    #[track_caller]
    pub fn receive<F>(&mut self, action: R::Action, update: F)
    where
        F: FnOnce(&mut R::State),
    {
        let mut expected = self.state.clone();
        update(&mut expected);
        self.receive_expecting(action, &expected);
    }

    /// Mutate the environment between steps.
    ///
    /// # Panics
    ///
    /// Panics if received actions are still pending.
    #[track_caller]
    #[allow(clippy::panic)] // Test assertion
    pub fn environment<F>(&mut self, update: F)
    where
        F: FnOnce(&mut R::Environment),
    {
        if let Some(pending) = self.received.front() {
            panic!(
                "Must handle {} received action(s) before changing the environment.\n  next: {pending:?}",
                self.received.len(),
            );
        }
        update(&mut self.environment);
    }

    /// Move the clock forward by `duration`, collecting every action effects emit
    /// on the way.
    ///
    /// Timers fire in deadline order, each at its own instant. Requires a paused
    /// tokio clock.
    ///
    /// # Panics
    ///
    /// Panics if an effect fails.
    pub async fn advance_time_by(&mut self, duration: Duration) {
        let deadline = tokio::time::sleep(duration);
        tokio::pin!(deadline);

        loop {
            if self.in_flight.is_empty() {
                deadline.as_mut().await;
                break;
            }

            let output = tokio::select! {
                biased;
                output = self.in_flight.next() => output,
                () = deadline.as_mut() => break,
            };
            match output {
                Some(output) => self.collect(output),
                None => {
                    deadline.as_mut().await;
                    break;
                },
            }
        }

        // Timers due exactly at the deadline.
        self.flush();
    }

    /// Run the clock until every in-flight effect has finished.
    ///
    /// Never returns while an effect that runs forever is still in flight; cancel
    /// it first. Requires a paused tokio clock.
    ///
    /// # Panics
    ///
    /// Panics if an effect fails.
    pub async fn advance_until_idle(&mut self) {
        while let Some(output) = self.in_flight.next().await {
            self.collect(output);
        }
    }

    /// End the script, asserting that every received action was handled.
    ///
    /// Effects still in flight are dropped, which also releases their
    /// cancellation ids.
    ///
    /// # Panics
    ///
    /// Panics if received actions are still pending.
    #[track_caller]
    pub fn finish(mut self) {
        self.assert_all_received();
        self.drop_in_flight();
    }

    /// Assert on and send local actions through a lens and a prism.
    pub fn scope<L, LA>(
        &mut self,
        lens: StateLens<R::State, L>,
        prism: ActionPrism<R::Action, LA>,
    ) -> ScopedTestStore<'_, R, L, LA> {
        ScopedTestStore {
            parent: self,
            lens,
            prism,
        }
    }

    #[track_caller]
    #[allow(clippy::panic)] // Test assertion
    fn receive_expecting(&mut self, action: R::Action, expected: &R::State) {
        let Some(received) = self.received.pop_front() else {
            panic!("Expected to receive {action:?}, but no action was received.");
        };
        if received != action {
            panic!(
                "Received an unexpected action.\n{}",
                diff(&action, &received, "expected", "received")
            );
        }
        self.step(received, expected);
    }

    #[track_caller]
    #[allow(clippy::panic)] // Test assertion
    fn step(&mut self, action: R::Action, expected: &R::State) {
        let description = format!("{action:?}");
        let effects = self
            .reducer
            .reduce(&mut self.state, action, &self.environment);
        self.start(effects);
        self.flush();

        if self.state != *expected {
            panic!(
                "State mismatch after {description}.\n{}",
                diff(expected, &self.state, "expected", "actual")
            );
        }
    }

    fn start(&mut self, effects: Effects<R::Action>) {
        for effect in effects {
            if !effect.is_none() {
                self.in_flight.push(effect.into_stream(&self.registry));
            }
        }
    }

    /// Poll in-flight effects until none can make progress without the clock moving.
    fn flush(&mut self) {
        while let Some(Some(output)) = self.in_flight.next().now_or_never() {
            self.collect(output);
        }
    }

    #[allow(clippy::panic)] // Test assertion
    fn collect(&mut self, output: Result<R::Action, EffectError>) {
        match output {
            Ok(action) => {
                tracing::trace!(?action, "Effect emitted an action");
                self.received.push_back(action);
            },
            Err(error) => panic!("An effect failed: {error}"),
        }
    }

    #[track_caller]
    #[allow(clippy::panic)] // Test assertion
    fn assert_all_received(&self) {
        if !self.received.is_empty() {
            panic!(
                "The store received {} unexpected action(s):\n{}",
                self.received.len(),
                self.received
                    .iter()
                    .map(|action| format!("  {action:?}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
        }
    }

    fn drop_in_flight(&mut self) {
        if !self.in_flight.is_empty() {
            tracing::debug!(effects = self.in_flight.len(), "Dropping in-flight effects");
        }
        self.in_flight = SelectAll::new();
        self.received.clear();
    }
}

impl<R> Drop for TestStore<R>
where
    R: Reducer,
{
    #[allow(clippy::panic)] // Test assertion
    fn drop(&mut self) {
        if !self.received.is_empty() && !std::thread::panicking() {
            panic!(
                "TestStore dropped with {} unhandled received action(s); receive them or call finish()",
                self.received.len()
            );
        }
    }
}

impl<R> fmt::Debug for TestStore<R>
where
    R: Reducer,
    R::State: Debug,
    R::Action: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestStore")
            .field("state", &self.state)
            .field("received", &self.received)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

/// A [`TestStore`] seen through a lens and a prism.
///
/// Assertions are written against the local slice; everything else about the
/// parent state must stay as it was.
pub struct ScopedTestStore<'a, R, L, LA>
where
    R: Reducer,
{
    parent: &'a mut TestStore<R>,
    lens: StateLens<R::State, L>,
    prism: ActionPrism<R::Action, LA>,
}

impl<R, L, LA> ScopedTestStore<'_, R, L, LA>
where
    R: Reducer,
    R::State: Clone + PartialEq + Debug,
    R::Action: PartialEq + Debug + Send + 'static,
    LA: Debug,
{
    /// Current local state.
    #[must_use]
    pub fn state(&self) -> &L {
        self.lens.get(&self.parent.state)
    }

    /// Send a local action and assert the resulting local state.
    ///
    /// # Panics
    ///
    /// Same as [`TestStore::send`].
    #[track_caller]
    pub fn send<F>(&mut self, action: LA, update: F)
    where
        F: FnOnce(&mut L),
    {
        let lens = self.lens;
        self.parent
            .send(self.prism.embed(action), |state| update(lens.get_mut(state)));
    }

    /// Receive a local action and assert the resulting local state.
    ///
    /// # Panics
    ///
    /// Same as [`TestStore::receive`].
    #[track_caller]
    pub fn receive<F>(&mut self, action: LA, update: F)
    where
        F: FnOnce(&mut L),
    {
        let lens = self.lens;
        self.parent
            .receive(self.prism.embed(action), |state| update(lens.get_mut(state)));
    }

    /// See [`TestStore::advance_time_by`].
    pub async fn advance_time_by(&mut self, duration: Duration) {
        self.parent.advance_time_by(duration).await;
    }

    /// See [`TestStore::advance_until_idle`].
    pub async fn advance_until_idle(&mut self) {
        self.parent.advance_until_idle().await;
    }

    /// Whether the parent holds received actions.
    #[must_use]
    pub fn has_pending_actions(&self) -> bool {
        self.parent.has_pending_actions()
    }
}

/// Line diff of two pretty-printed values.
fn diff<T: Debug + ?Sized>(expected: &T, actual: &T, left: &str, right: &str) -> String {
    let expected = format!("{expected:#?}");
    let actual = format!("{actual:#?}");
    let expected: Vec<&str> = expected.lines().collect();
    let actual: Vec<&str> = actual.lines().collect();

    let mut out = format!("  (-{left} +{right})\n");
    for index in 0..expected.len().max(actual.len()) {
        match (expected.get(index), actual.get(index)) {
            (Some(e), Some(a)) if e == a => {
                let _ = writeln!(out, "   {e}");
            },
            (e, a) => {
                if let Some(e) = e {
                    let _ = writeln!(out, "  -{e}");
                }
                if let Some(a) = a {
                    let _ = writeln!(out, "  +{a}");
                }
            },
        }
    }
    out
}
