//! Reducer composition utilities
//!
//! This module provides utilities for composing reducers in various ways:
//! - **`combine_reducers`** / [`ReducerExt::combine`]: Run multiple reducers on the same state/action
//! - **[`ReducerExt::pullback`]**: Lift a child reducer into a parent through a lens and a prism
//! - **[`ReducerExt::for_each`]**: Lift an element reducer over a keyed list
//! - **[`ReducerExt::optional`]**: Lift a reducer over state that may be absent
//! - **[`ReducerExt::debug`]**: Trace every action and resulting state
//!
//! Lifting never creates or removes the child state. A sibling reducer combined with
//! the lifted one owns those transitions.
//!
//! # Examples
//!
//! ## Combining Reducers
//!
//! ```
//! use composable_store_core::{smallvec, Effect, Reducer, SmallVec};
//! use composable_store_core::composition::combine_reducers;
//!
//! #[derive(Clone)]
//! struct MyState {
//!     count: i32,
//!     name: String,
//! }
//!
//! #[derive(Clone)]
//! enum MyAction {
//!     Increment,
//!     SetName(String),
//! }
//!
//! struct CounterReducer;
//! struct NameReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = MyState;
//!     type Action = MyAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut MyState, action: MyAction, _env: &()) -> SmallVec<[Effect<MyAction>; 4]> {
//!         if let MyAction::Increment = action {
//!             state.count += 1;
//!         }
//!         smallvec![]
//!     }
//! }
//!
//! impl Reducer for NameReducer {
//!     type State = MyState;
//!     type Action = MyAction;
//!     type Environment = ();
//!
//!     fn reduce(&self, state: &mut MyState, action: MyAction, _env: &()) -> SmallVec<[Effect<MyAction>; 4]> {
//!         if let MyAction::SetName(name) = action {
//!             state.name = name;
//!         }
//!         smallvec![]
//!     }
//! }
//!
//! let combined = combine_reducers(vec![Box::new(CounterReducer), Box::new(NameReducer)]);
//! let mut state = MyState { count: 0, name: String::new() };
//! let _ = combined.reduce(&mut state, MyAction::SetName("Ada".into()), &());
//! assert_eq!(state.name, "Ada");
//! ```

use crate::effect::Effect;
use crate::optics::{ActionPrism, StateLens};
use crate::reducer::{Effects, Reducer};
use std::fmt;
use std::marker::PhantomData;

/// Combines multiple reducers that operate on the same state and action types.
///
/// Each reducer is run in sequence on the same state with its own clone of the
/// action, and all effects are collected. The runtime runs the collected effects
/// concurrently, so no reducer's effects replace another's.
///
/// # Type Parameters
///
/// - `S`: The state type
/// - `A`: The action type
/// - `E`: The environment type
///
/// # Examples
///
/// ```
/// use composable_store_core::{smallvec, Effect, Reducer, SmallVec};
/// use composable_store_core::composition::combine_reducers;
///
/// #[derive(Clone)]
/// struct AppState {
///     counter: i32,
///     logged: bool,
/// }
///
/// #[derive(Clone)]
/// enum AppAction {
///     Increment,
///     Log,
/// }
///
/// struct CounterReducer;
/// struct LoggingReducer;
///
/// impl Reducer for CounterReducer {
///     type State = AppState;
///     type Action = AppAction;
///     type Environment = ();
///
///     fn reduce(&self, state: &mut AppState, action: AppAction, _env: &()) -> SmallVec<[Effect<AppAction>; 4]> {
///         if matches!(action, AppAction::Increment) {
///             state.counter += 1;
///         }
///         smallvec![]
///     }
/// }
///
/// impl Reducer for LoggingReducer {
///     type State = AppState;
///     type Action = AppAction;
///     type Environment = ();
///
///     fn reduce(&self, state: &mut AppState, action: AppAction, _env: &()) -> SmallVec<[Effect<AppAction>; 4]> {
///         if matches!(action, AppAction::Log) {
///             state.logged = true;
///         }
///         smallvec![]
///     }
/// }
///
/// let combined = combine_reducers(vec![Box::new(CounterReducer), Box::new(LoggingReducer)]);
///
/// let mut state = AppState { counter: 0, logged: false };
/// let effects = combined.reduce(&mut state, AppAction::Increment, &());
/// assert_eq!(state.counter, 1);
/// assert!(effects.is_empty());
/// ```
#[must_use]
pub fn combine_reducers<S, A, E>(
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>>,
) -> CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    CombinedReducer { reducers }
}

/// A combined reducer that runs multiple reducers in sequence.
///
/// Created by [`combine_reducers`].
pub struct CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    reducers: Vec<Box<dyn Reducer<State = S, Action = A, Environment = E> + Send + Sync>>,
}

impl<S, A, E> Reducer for CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        let mut all_effects = Effects::new();

        for reducer in &self.reducers {
            let effects = reducer.reduce(state, action.clone(), env);
            all_effects.extend(effects);
        }

        all_effects
    }
}

impl<S, A, E> fmt::Debug for CombinedReducer<S, A, E>
where
    S: 'static,
    A: Clone + 'static,
    E: 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedReducer")
            .field("reducers", &self.reducers.len())
            .finish()
    }
}

/// Two reducers run in order on the same state. Created by [`ReducerExt::combine`].
#[derive(Debug, Clone)]
pub struct Combine<R1, R2> {
    first: R1,
    second: R2,
}

impl<R1, R2> Reducer for Combine<R1, R2>
where
    R1: Reducer,
    R2: Reducer<State = R1::State, Action = R1::Action, Environment = R1::Environment>,
    R1::Action: Clone,
{
    type State = R1::State;
    type Action = R1::Action;
    type Environment = R1::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        let mut effects = self.first.reduce(state, action.clone(), env);
        effects.extend(self.second.reduce(state, action, env));
        effects
    }
}

/// A child reducer lifted into a parent domain. Created by [`ReducerExt::pullback`].
pub struct Pullback<R, GS, GA, GE>
where
    R: Reducer,
{
    reducer: R,
    lens: StateLens<GS, R::State>,
    prism: ActionPrism<GA, R::Action>,
    environment: fn(&GE) -> &R::Environment,
}

impl<R, GS, GA, GE> Reducer for Pullback<R, GS, GA, GE>
where
    R: Reducer,
    R::Action: Send + 'static,
    GA: Send + 'static,
{
    type State = GS;
    type Action = GA;
    type Environment = GE;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        let Some(local_action) = self.prism.extract(action) else {
            return Effects::new();
        };

        let embed = self.prism.embedder();
        self.reducer
            .reduce(self.lens.get_mut(state), local_action, (self.environment)(env))
            .into_iter()
            .map(|effect| effect.map(embed))
            .collect()
    }
}

impl<R, GS, GA, GE> fmt::Debug for Pullback<R, GS, GA, GE>
where
    R: Reducer + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pullback")
            .field("reducer", &self.reducer)
            .field("lens", &self.lens)
            .field("prism", &self.prism)
            .finish_non_exhaustive()
    }
}

/// An element reducer lifted over a keyed list. Created by [`ReducerExt::for_each`].
pub struct ForEach<R, GS, GA, GE, Id>
where
    R: Reducer,
{
    reducer: R,
    lens: StateLens<GS, Vec<R::State>>,
    prism: ActionPrism<GA, (Id, R::Action)>,
    id_of: fn(&R::State) -> Id,
    environment: fn(&GE) -> &R::Environment,
}

impl<R, GS, GA, GE, Id> Reducer for ForEach<R, GS, GA, GE, Id>
where
    R: Reducer,
    R::Action: Send + 'static,
    GA: Send + 'static,
    Id: PartialEq + Clone + fmt::Debug + Send + Sync + 'static,
{
    type State = GS;
    type Action = GA;
    type Environment = GE;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        let Some((id, local_action)) = self.prism.extract(action) else {
            return Effects::new();
        };

        let id_of = self.id_of;
        let Some(element) = self
            .lens
            .get_mut(state)
            .iter_mut()
            .find(|element| id_of(element) == id)
        else {
            tracing::debug!(?id, "Action for an element no longer in the list ignored");
            return Effects::new();
        };

        let embed = self.prism.embedder();
        self.reducer
            .reduce(element, local_action, (self.environment)(env))
            .into_iter()
            .map(|effect| {
                let id = id.clone();
                effect.map(move |action| embed((id.clone(), action)))
            })
            .collect()
    }
}

impl<R, GS, GA, GE, Id> fmt::Debug for ForEach<R, GS, GA, GE, Id>
where
    R: Reducer + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForEach")
            .field("reducer", &self.reducer)
            .field("lens", &self.lens)
            .field("prism", &self.prism)
            .finish_non_exhaustive()
    }
}

/// A reducer over state that may be absent. Created by [`ReducerExt::optional`].
#[derive(Debug, Clone)]
pub struct OptionalReducer<R> {
    reducer: R,
}

impl<R> Reducer for OptionalReducer<R>
where
    R: Reducer,
{
    type State = Option<R::State>;
    type Action = R::Action;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        match state {
            Some(state) => self.reducer.reduce(state, action, env),
            None => Effects::new(),
        }
    }
}

/// A reducer that traces every action and the state it produced.
/// Created by [`ReducerExt::debug`].
#[derive(Debug, Clone)]
pub struct DebugReducer<R> {
    reducer: R,
    label: String,
}

impl<R> Reducer for DebugReducer<R>
where
    R: Reducer,
    R::State: fmt::Debug,
    R::Action: fmt::Debug,
{
    type State = R::State;
    type Action = R::Action;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        tracing::debug!(reducer = %self.label, ?action, "Received action");
        let effects = self.reducer.reduce(state, action, env);
        tracing::debug!(
            reducer = %self.label,
            ?state,
            effects = effects.len(),
            "Reduced state"
        );
        effects
    }
}

/// A reducer backed by a closure. Created by [`reducer_fn`].
pub struct ReducerFn<S, A, E, F> {
    f: F,
    _marker: PhantomData<fn(&mut S, A, &E)>,
}

/// Build a reducer from a closure.
///
/// # Example
///
/// ```
/// use composable_store_core::{smallvec, Effect, Reducer};
/// use composable_store_core::composition::reducer_fn;
/// use composable_store_core::reducer::Effects;
///
/// let counter = reducer_fn(|count: &mut i32, delta: i32, _env: &()| -> Effects<i32> {
///     *count += delta;
///     smallvec![]
/// });
///
/// let mut count = 0;
/// let _ = counter.reduce(&mut count, 5, &());
/// assert_eq!(count, 5);
/// ```
#[must_use]
pub const fn reducer_fn<S, A, E, F>(f: F) -> ReducerFn<S, A, E, F>
where
    F: Fn(&mut S, A, &E) -> Effects<A>,
{
    ReducerFn {
        f,
        _marker: PhantomData,
    }
}

impl<S, A, E, F> Reducer for ReducerFn<S, A, E, F>
where
    F: Fn(&mut S, A, &E) -> Effects<A>,
{
    type State = S;
    type Action = A;
    type Environment = E;

    fn reduce(&self, state: &mut S, action: A, env: &E) -> Effects<A> {
        (self.f)(state, action, env)
    }
}

impl<S, A, E, F> Clone for ReducerFn<S, A, E, F>
where
    F: Clone,
{
    fn clone(&self) -> Self {
        Self {
            f: self.f.clone(),
            _marker: PhantomData,
        }
    }
}

impl<S, A, E, F> fmt::Debug for ReducerFn<S, A, E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerFn").finish_non_exhaustive()
    }
}

/// Combinators available on every [`Reducer`].
pub trait ReducerExt: Reducer + Sized {
    /// Run `self`, then `other`, on the same state and action; effects of both are kept.
    fn combine<R>(self, other: R) -> Combine<Self, R>
    where
        R: Reducer<State = Self::State, Action = Self::Action, Environment = Self::Environment>,
    {
        Combine {
            first: self,
            second: other,
        }
    }

    /// Lift this reducer into a parent domain.
    ///
    /// Parent actions `prism` does not match leave the state untouched and produce
    /// no effect. Matching actions are reduced on the slice `lens` focuses, and every
    /// effect output is wrapped back with the prism.
    fn pullback<GS, GA, GE>(
        self,
        lens: StateLens<GS, Self::State>,
        prism: ActionPrism<GA, Self::Action>,
        environment: fn(&GE) -> &Self::Environment,
    ) -> Pullback<Self, GS, GA, GE> {
        Pullback {
            reducer: self,
            lens,
            prism,
            environment,
        }
    }

    /// Lift this element reducer over the list `lens` focuses.
    ///
    /// The action's id is resolved against the list at reduce time. An id with no
    /// matching element is ignored. Otherwise only that element changes, in place,
    /// and its effects' outputs are tagged with the same id.
    fn for_each<GS, GA, GE, Id>(
        self,
        lens: StateLens<GS, Vec<Self::State>>,
        prism: ActionPrism<GA, (Id, Self::Action)>,
        id_of: fn(&Self::State) -> Id,
        environment: fn(&GE) -> &Self::Environment,
    ) -> ForEach<Self, GS, GA, GE, Id> {
        ForEach {
            reducer: self,
            lens,
            prism,
            id_of,
            environment,
        }
    }

    /// Run this reducer only while the state is present.
    fn optional(self) -> OptionalReducer<Self> {
        OptionalReducer { reducer: self }
    }

    /// Trace every action and the resulting state at debug level.
    fn debug(self, label: impl Into<String>) -> DebugReducer<Self> {
        DebugReducer {
            reducer: self,
            label: label.into(),
        }
    }
}

impl<R> ReducerExt for R where R: Reducer {}

/// Identity environment projection for lifted reducers sharing their parent's environment.
#[must_use]
pub const fn same_environment<E>(env: &E) -> &E {
    env
}

/// Convenience for reducers whose effects never fire: an empty effect list.
#[must_use]
pub fn no_effects<A>() -> Effects<A> {
    Effects::new()
}

/// Wrap a single effect as an effect list.
#[must_use]
pub fn just<A>(effect: Effect<A>) -> Effects<A> {
    let mut effects = Effects::new();
    effects.push(effect);
    effects
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationRegistry;
    use crate::{smallvec, SmallVec};
    use proptest::prelude::*;

    #[derive(Clone, Default, Debug, PartialEq)]
    struct TestState {
        counter: i32,
        name: String,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Increment,
        Decrement,
        SetName(String),
        Echo(i32),
    }

    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.counter += 1;
                    smallvec![Effect::send(TestAction::Echo(1))]
                },
                TestAction::Decrement => {
                    state.counter -= 1;
                    smallvec![]
                },
                TestAction::SetName(_) | TestAction::Echo(_) => smallvec![],
            }
        }
    }

    struct NameReducer;

    impl Reducer for NameReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::SetName(name) => {
                    state.name = name;
                    smallvec![]
                },
                TestAction::Increment => smallvec![Effect::send(TestAction::Echo(2))],
                _ => smallvec![],
            }
        }
    }

    async fn outputs<A: Send + 'static>(effects: Effects<A>) -> Vec<A> {
        let registry = CancellationRegistry::new();
        let mut outputs = Vec::new();
        for effect in effects {
            let result = effect.sink(&registry, |a| outputs.push(a)).await;
            assert!(result.is_ok());
        }
        outputs
    }

    #[test]
    fn test_combine_reducers() {
        let combined = combine_reducers(vec![Box::new(CounterReducer), Box::new(NameReducer)]);

        let mut state = TestState::default();

        let _ = combined.reduce(&mut state, TestAction::Increment, &());
        assert_eq!(state.counter, 1);

        let _ = combined.reduce(&mut state, TestAction::SetName("Alice".to_string()), &());
        assert_eq!(state.name, "Alice");

        let _ = combined.reduce(&mut state, TestAction::Decrement, &());
        assert_eq!(state.counter, 0);
        assert_eq!(state.name, "Alice");
    }

    #[tokio::test]
    async fn test_combine_keeps_every_reducers_effects() {
        let combined = CounterReducer.combine(NameReducer);
        let mut state = TestState::default();

        let effects = combined.reduce(&mut state, TestAction::Increment, &());

        assert_eq!(effects.len(), 2);
        assert_eq!(
            outputs(effects).await,
            vec![TestAction::Echo(1), TestAction::Echo(2)]
        );
    }

    // Pullback tests
    #[derive(Clone, Default, Debug, PartialEq)]
    struct SubState {
        value: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum SubAction {
        Add(i32),
        Multiply(i32),
        Added,
    }

    struct SubReducer;

    impl Reducer for SubReducer {
        type State = SubState;
        type Action = SubAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                SubAction::Add(n) => {
                    state.value += n;
                    smallvec![Effect::send(SubAction::Added)]
                },
                SubAction::Multiply(n) => {
                    state.value *= n;
                    smallvec![]
                },
                SubAction::Added => smallvec![],
            }
        }
    }

    #[derive(Clone, Default, Debug, PartialEq)]
    struct ParentState {
        sub: SubState,
        items: Vec<Item>,
        maybe: Option<SubState>,
        other: String,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum ParentAction {
        Sub(SubAction),
        Item(u32, SubAction),
        Unrelated,
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Item {
        id: u32,
        sub: SubState,
    }

    struct ItemReducer;

    impl Reducer for ItemReducer {
        type State = Item;
        type Action = SubAction;
        type Environment = ();

        fn reduce(&self, state: &mut Item, action: SubAction, env: &()) -> Effects<SubAction> {
            SubReducer.reduce(&mut state.sub, action, env)
        }
    }

    fn sub_lens() -> StateLens<ParentState, SubState> {
        StateLens::new(|p| &p.sub, |p| &mut p.sub)
    }

    fn sub_prism() -> ActionPrism<ParentAction, SubAction> {
        ActionPrism::new(
            |a| match a {
                ParentAction::Sub(sub) => Some(sub),
                _ => None,
            },
            ParentAction::Sub,
        )
    }

    fn items_lens() -> StateLens<ParentState, Vec<Item>> {
        StateLens::new(|p| &p.items, |p| &mut p.items)
    }

    fn item_prism() -> ActionPrism<ParentAction, (u32, SubAction)> {
        ActionPrism::new(
            |a| match a {
                ParentAction::Item(id, sub) => Some((id, sub)),
                _ => None,
            },
            |(id, sub)| ParentAction::Item(id, sub),
        )
    }

    #[tokio::test]
    async fn test_pullback_reduces_slice_and_embeds_outputs() {
        let lifted = SubReducer.pullback(sub_lens(), sub_prism(), same_environment);

        let mut state = ParentState {
            sub: SubState { value: 5 },
            other: "test".to_string(),
            ..ParentState::default()
        };

        let effects = lifted.reduce(&mut state, ParentAction::Sub(SubAction::Add(3)), &());
        assert_eq!(state.sub.value, 8);
        assert_eq!(state.other, "test");
        assert_eq!(
            outputs(effects).await,
            vec![ParentAction::Sub(SubAction::Added)]
        );

        let _ = lifted.reduce(&mut state, ParentAction::Sub(SubAction::Multiply(2)), &());
        assert_eq!(state.sub.value, 16);
    }

    #[test]
    fn test_pullback_ignores_unmatched_actions() {
        let lifted = SubReducer.pullback(sub_lens(), sub_prism(), same_environment);
        let mut state = ParentState::default();
        let before = state.clone();

        let effects = lifted.reduce(&mut state, ParentAction::Unrelated, &());

        assert!(effects.is_empty());
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_for_each_tags_outputs_with_element_id() {
        let lifted = ItemReducer.for_each(items_lens(), item_prism(), |item| item.id, same_environment);
        let mut state = ParentState {
            items: vec![
                Item { id: 1, sub: SubState { value: 1 } },
                Item { id: 2, sub: SubState { value: 2 } },
            ],
            ..ParentState::default()
        };

        let effects = lifted.reduce(&mut state, ParentAction::Item(2, SubAction::Add(10)), &());

        assert_eq!(state.items[0].sub.value, 1);
        assert_eq!(state.items[1].sub.value, 12);
        assert_eq!(
            outputs(effects).await,
            vec![ParentAction::Item(2, SubAction::Added)]
        );
    }

    #[test]
    fn test_for_each_stale_id_is_noop() {
        let lifted = ItemReducer.for_each(items_lens(), item_prism(), |item| item.id, same_environment);
        let mut state = ParentState {
            items: vec![Item { id: 1, sub: SubState { value: 1 } }],
            ..ParentState::default()
        };
        let before = state.clone();

        let effects = lifted.reduce(&mut state, ParentAction::Item(99, SubAction::Add(1)), &());

        assert!(effects.is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn test_optional_absent_state_is_noop() {
        let lifted = SubReducer.optional().pullback(
            StateLens::new(|p: &ParentState| &p.maybe, |p| &mut p.maybe),
            sub_prism(),
            same_environment,
        );

        let mut state = ParentState::default();
        let effects = lifted.reduce(&mut state, ParentAction::Sub(SubAction::Add(1)), &());
        assert!(effects.is_empty());
        assert_eq!(state.maybe, None);

        state.maybe = Some(SubState { value: 1 });
        let effects = lifted.reduce(&mut state, ParentAction::Sub(SubAction::Add(1)), &());
        assert_eq!(effects.len(), 1);
        assert_eq!(state.maybe, Some(SubState { value: 2 }));
    }

    #[test]
    fn test_debug_reducer_is_transparent() {
        let mut plain = TestState::default();
        let mut traced = TestState::default();

        let _ = CounterReducer.reduce(&mut plain, TestAction::Increment, &());
        let _ = CounterReducer
            .debug("counter")
            .reduce(&mut traced, TestAction::Increment, &());

        assert_eq!(plain, traced);
    }

    #[test]
    fn test_reducer_fn() {
        let reducer = reducer_fn(|state: &mut TestState, action: TestAction, _env: &()| {
            if let TestAction::SetName(name) = action {
                state.name = name;
            }
            no_effects()
        });

        let mut state = TestState::default();
        let _ = reducer.reduce(&mut state, TestAction::SetName("Bob".into()), &());
        assert_eq!(state.name, "Bob");
    }

    proptest! {
        #[test]
        fn prop_for_each_preserves_order_and_siblings(
            values in prop::collection::vec(-1000_i32..1000, 1..20),
            pick in any::<prop::sample::Index>(),
            delta in -100_i32..100,
        ) {
            let lifted = ItemReducer.for_each(items_lens(), item_prism(), |item| item.id, same_environment);
            let items: Vec<Item> = values
                .iter()
                .enumerate()
                .map(|(i, v)| Item { id: u32::try_from(i).unwrap_or(u32::MAX), sub: SubState { value: *v } })
                .collect();
            let target = pick.index(items.len());
            let mut state = ParentState { items: items.clone(), ..ParentState::default() };

            let _ = lifted.reduce(&mut state, ParentAction::Item(items[target].id, SubAction::Add(delta)), &());

            prop_assert_eq!(state.items.len(), items.len());
            for (i, (before, after)) in items.iter().zip(&state.items).enumerate() {
                prop_assert_eq!(before.id, after.id);
                if i == target {
                    prop_assert_eq!(after.sub.value, before.sub.value + delta);
                } else {
                    prop_assert_eq!(after, before);
                }
            }
        }

        #[test]
        fn prop_unmatched_action_never_changes_state(value in any::<i32>(), other in ".*") {
            let lifted = SubReducer.pullback(sub_lens(), sub_prism(), same_environment);
            let mut state = ParentState {
                sub: SubState { value },
                other,
                ..ParentState::default()
            };
            let before = state.clone();

            let effects = lifted.reduce(&mut state, ParentAction::Unrelated, &());

            prop_assert!(effects.is_empty());
            prop_assert_eq!(state, before);
        }
    }
}
