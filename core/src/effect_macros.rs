//! Declarative macros for ergonomic effect construction
//!
//! These macros reduce boilerplate when creating common `Effect` shapes inside
//! reducers.

/// Create an `Effect::Future` from an async block
///
/// The block must evaluate to `Option<Action>`.
///
/// # Example
///
/// ```rust,ignore
/// use composable_store_core::async_effect;
///
/// async_effect! {
///     let fact = env.facts.fetch(count).await;
///     Some(CounterAction::FactResponse(fact))
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions
///
/// # Example
///
/// ```rust,ignore
/// use composable_store_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(1),
///     action: AppAction::SortCompletedTodos
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

/// Create a debounced effect: `effect` starts after `duration` unless another
/// debounce with the same `id` supersedes it first.
///
/// # Example
///
/// ```rust,ignore
/// use composable_store_core::debounce;
/// use std::time::Duration;
///
/// debounce! {
///     id: SearchQueryId,
///     duration: Duration::from_millis(300),
///     effect: search_effect
/// }
/// ```
#[macro_export]
macro_rules! debounce {
    (
        id: $id:expr,
        duration: $duration:expr,
        effect: $effect:expr
    ) => {
        $crate::effect::Effect::debounce($effect, $crate::cancellation::CancelId::new($id), $duration)
    };
}

#[cfg(test)]
mod tests {
    use crate::cancellation::CancelId;
    use crate::effect::Effect;
    use std::time::Duration;

    #[derive(Clone, Debug)]
    enum TestAction {
        AsyncResult { value: i32 },
        TimeoutExpired,
    }

    #[derive(Debug, Hash, PartialEq, Eq)]
    struct SearchId;

    #[test]
    fn test_async_effect_macro() {
        let effect = async_effect! {
            Some(TestAction::AsyncResult { value: 42 })
        };

        assert!(matches!(effect, Effect::Future(_)));
    }

    #[test]
    fn test_delay_macro() {
        let effect = delay! {
            duration: Duration::from_secs(30),
            action: TestAction::TimeoutExpired
        };

        assert!(matches!(effect, Effect::Delay { .. }));
    }

    #[test]
    #[allow(clippy::panic)]
    fn test_debounce_macro() {
        let effect = debounce! {
            id: SearchId,
            duration: Duration::from_millis(300),
            effect: Effect::send(TestAction::TimeoutExpired)
        };

        match effect {
            Effect::Cancellable {
                id,
                cancel_in_flight,
                ..
            } => {
                assert_eq!(id, CancelId::new(SearchId));
                assert!(cancel_in_flight);
            },
            other => panic!("expected a cancellable effect, got {other:?}"),
        }
    }
}
