//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.
//! Nothing is executed: effects are only inspected as descriptions. Use
//! [`TestStore`](crate::TestStore) when the effects themselves must run.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use composable_store_core::{effect::Effect, reducer::Reducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Type alias for effect assertion functions
type EffectAssertion<A> = Box<dyn FnOnce(&[Effect<A>])>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// # Example
///
/// ```
/// use composable_store_core::{smallvec, Effect, Reducer, SmallVec};
/// use composable_store_testing::{assertions, ReducerTest};
///
/// #[derive(Clone, Debug)]
/// struct Counter {
///     count: i32,
/// }
///
/// #[derive(Clone, Debug)]
/// enum CounterAction {
///     Increment,
/// }
///
/// struct CounterReducer;
///
/// impl Reducer for CounterReducer {
///     type State = Counter;
///     type Action = CounterAction;
///     type Environment = ();
///
///     fn reduce(
///         &self,
///         state: &mut Counter,
///         _action: CounterAction,
///         _env: &(),
///     ) -> SmallVec<[Effect<CounterAction>; 4]> {
///         state.count += 1;
///         smallvec![]
///     }
/// }
///
/// ReducerTest::new(CounterReducer)
///     .with_env(())
///     .given_state(Counter { count: 0 })
///     .when_action(CounterAction::Increment)
///     .then_state(|state| assert_eq!(state.count, 1))
///     .then_effects(assertions::assert_no_effects)
///     .run();
/// ```
pub struct ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    reducer: R,
    environment: Option<E>,
    initial_state: Option<S>,
    actions: Vec<A>,
    state_assertions: Vec<StateAssertion<S>>,
    effect_assertions: Vec<EffectAssertion<A>>,
}

impl<R, S, A, E> ReducerTest<R, S, A, E>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            environment: None,
            initial_state: None,
            actions: Vec::new(),
            state_assertions: Vec::new(),
            effect_assertions: Vec::new(),
        }
    }

    /// Set the environment for the test
    #[must_use]
    pub fn with_env(mut self, env: E) -> Self {
        self.environment = Some(env);
        self
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add an action to reduce (When)
    #[must_use]
    pub fn when_action(mut self, action: A) -> Self {
        self.actions.push(action);
        self
    }

    /// Add several actions, reduced in order (When)
    #[must_use]
    pub fn when_actions(mut self, actions: impl IntoIterator<Item = A>) -> Self {
        self.actions.extend(actions);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Add an assertion about the effects of every reduced action (Then)
    #[must_use]
    pub fn then_effects<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&[Effect<A>]) + 'static,
    {
        self.effect_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if initial state, action, or environment is not set,
    /// or if any assertions fail.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(
            !self.actions.is_empty(),
            "At least one action must be set with when_action()"
        );

        let env = self
            .environment
            .expect("Environment must be set with with_env()");

        let mut effects = Vec::new();
        for action in self.actions {
            effects.extend(self.reducer.reduce(&mut state, action, &env));
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }

        for assertion in self.effect_assertions {
            assertion(&effects);
        }
    }
}

/// Helper assertions for effects
///
/// Searches look through `Parallel`, `Sequential` and `Cancellable` wrappers.
pub mod assertions {
    use composable_store_core::cancellation::CancelId;
    use composable_store_core::effect::Effect;
    use std::time::Duration;

    fn any_effect<A>(effects: &[Effect<A>], predicate: &dyn Fn(&Effect<A>) -> bool) -> bool {
        effects.iter().any(|effect| {
            predicate(effect)
                || match effect {
                    Effect::Parallel(inner) | Effect::Sequential(inner) => {
                        any_effect(inner, predicate)
                    },
                    Effect::Cancellable { effect, .. } => {
                        any_effect(std::slice::from_ref(effect.as_ref()), predicate)
                    },
                    _ => false,
                }
        })
    }

    /// Assert that there are no effects
    ///
    /// # Panics
    ///
    /// Panics if effects is not empty.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(Effect::is_none),
            "Expected no effects, but found {}: {:?}",
            effects.len(),
            effects
        );
    }

    /// Assert the number of effects
    ///
    /// # Panics
    ///
    /// Panics if the number of effects doesn't match expected.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_effects_count<A>(effects: &[Effect<A>], expected: usize) {
        assert_eq!(
            effects.len(),
            expected,
            "Expected {} effects, but found {}",
            expected,
            effects.len()
        );
    }

    /// Assert that effects contain at least one Future effect
    ///
    /// # Panics
    ///
    /// Panics if no Future effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_future_effect<A>(effects: &[Effect<A>]) {
        assert!(
            any_effect(effects, &|e| matches!(e, Effect::Future(_))),
            "Expected at least one Future effect, but none found"
        );
    }

    /// Assert that effects delay `action` by `duration`
    ///
    /// # Panics
    ///
    /// Panics if no matching `Delay` effect is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_delay<A>(effects: &[Effect<A>], duration: Duration, action: &A)
    where
        A: PartialEq + std::fmt::Debug,
    {
        assert!(
            any_effect(effects, &|e| matches!(
                e,
                Effect::Delay { duration: d, action: a } if *d == duration && **a == *action
            )),
            "Expected a Delay of {duration:?} for {action:?}, but none found in {effects:?}"
        );
    }

    /// Assert that effects contain work registered under `id`
    ///
    /// # Panics
    ///
    /// Panics if no `Cancellable` effect with that id is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_has_cancellable<A>(effects: &[Effect<A>], id: &CancelId)
    where
        A: std::fmt::Debug,
    {
        assert!(
            any_effect(effects, &|e| matches!(e, Effect::Cancellable { id: i, .. } if i == id)),
            "Expected a Cancellable effect with id {id:?}, but none found in {effects:?}"
        );
    }

    /// Assert that effects cancel `id`
    ///
    /// # Panics
    ///
    /// Panics if no `Cancel` effect with that id is found.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_cancels<A>(effects: &[Effect<A>], id: &CancelId)
    where
        A: std::fmt::Debug,
    {
        assert!(
            any_effect(effects, &|e| matches!(e, Effect::Cancel(i) if i == id)),
            "Expected a Cancel effect for {id:?}, but none found in {effects:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use composable_store_core::cancellation::CancelId;
    use composable_store_core::effect::Effect;
    use composable_store_core::reducer::Reducer;
    use composable_store_core::{smallvec, SmallVec};
    use std::time::Duration;

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum TestAction {
        Increment,
        Decrement,
        IncrementLater,
        Stop,
    }

    struct TestReducer;

    struct TestEnv;

    impl Reducer for TestReducer {
        type State = TestState;
        type Action = TestAction;
        type Environment = TestEnv;

        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            match action {
                TestAction::Increment => {
                    state.count += 1;
                    smallvec![Effect::None]
                },
                TestAction::Decrement => {
                    state.count -= 1;
                    smallvec![]
                },
                TestAction::IncrementLater => smallvec![Effect::Delay {
                    duration: Duration::from_secs(1),
                    action: Box::new(TestAction::Increment),
                }
                .cancellable("later", true)],
                TestAction::Stop => smallvec![Effect::cancel("later")],
            }
        }
    }

    #[test]
    fn test_reducer_test_increment() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .then_effects(|effects| {
                assertions::assert_no_effects(effects);
            })
            .run();
    }

    #[test]
    fn test_reducer_test_action_sequence() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 5 })
            .when_actions([TestAction::Decrement, TestAction::Decrement, TestAction::Increment])
            .then_state(|state| {
                assert_eq!(state.count, 4);
            })
            .then_effects(|effects| assertions::assert_effects_count(effects, 1))
            .run();
    }

    #[test]
    fn test_assertions_look_inside_wrappers() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::IncrementLater)
            .then_effects(|effects| {
                assertions::assert_has_cancellable(effects, &CancelId::from("later"));
                assertions::assert_has_delay(
                    effects,
                    Duration::from_secs(1),
                    &TestAction::Increment,
                );
            })
            .run();
    }

    #[test]
    fn test_assertions_cancel() {
        ReducerTest::new(TestReducer)
            .with_env(TestEnv)
            .given_state(TestState { count: 0 })
            .when_action(TestAction::Stop)
            .then_effects(|effects| assertions::assert_cancels(effects, &CancelId::from("later")))
            .run();
    }

    #[test]
    fn test_assertions_no_effects() {
        assertions::assert_no_effects::<TestAction>(&[Effect::None]);
        assertions::assert_no_effects::<TestAction>(&[]);
    }

    #[test]
    #[should_panic(expected = "Expected at least one Future effect")]
    fn test_missing_future_effect_panics() {
        assertions::assert_has_future_effect::<TestAction>(&[Effect::None]);
    }
}
