//! Effect module - Side effect descriptions
//!
//! Effects describe side effects to be performed by a runtime. They are values, not
//! execution: building an `Effect` does no work, and nothing happens until a runtime
//! drives it (see [`Effect::into_stream`] and [`Effect::sink`]). Every output an
//! effect produces is an action that the runtime feeds back into the reducer.
//!
//! Effects compose:
//! - [`Effect::merge`] runs effects concurrently and interleaves their outputs
//! - [`Effect::concatenate`] runs effects one after another
//! - [`Effect::map`] lifts a child feature's effect into the parent's action type
//! - [`Effect::cancellable`], [`Effect::cancel`] and [`Effect::debounce`] tie
//!   effects to a [`CancelId`] in a [`CancellationRegistry`]

use crate::cancellation::{CancelId, CancellationRegistry, TaskKey};
use futures::future::{self, AbortHandle, Abortable};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Boxed future producing at most one action.
pub type EffectFuture<Action> = Pin<Box<dyn Future<Output = Option<Action>> + Send>>;

/// Boxed stream of actions.
pub type ActionStream<Action> = Pin<Box<dyn Stream<Item = Action> + Send>>;

/// Boxed stream of fallible actions.
pub type TryActionStream<Action> = Pin<Box<dyn Stream<Item = Result<Action, EffectError>> + Send>>;

/// The interpreted form of an effect, as consumed by runtimes.
pub type EffectStream<Action> = BoxStream<'static, Result<Action, EffectError>>;

type SharedMap<A, B> = Arc<dyn Fn(A) -> B + Send + Sync>;

/// Failure raised while an effect is producing outputs.
///
/// An error ends the failing effect's remaining outputs; it never affects other
/// effects or the store that drives them. Reducers that expect a failure should
/// turn it into a result action instead (see [`Effect::future`]).
///
/// `EffectError` is comparable so it can be carried inside state and asserted on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EffectError {
    /// The producer reported a failure
    #[error("Effect failed: {0}")]
    Failed(String),
}

impl EffectError {
    /// Build a failure from any message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Effect type - describes a side effect to be executed
///
/// Effects are NOT executed immediately. They are descriptions of what should happen,
/// returned from reducers and executed by the Store runtime.
///
/// # Type Parameters
///
/// - `Action`: The action type that effects can produce (feedback loop)
pub enum Effect<Action> {
    /// No-op effect
    None,

    /// Run effects concurrently, interleaving their outputs
    Parallel(Vec<Effect<Action>>),

    /// Run effects one after another
    Sequential(Vec<Effect<Action>>),

    /// Dispatch an action after a delay
    Delay {
        /// How long to wait
        duration: Duration,
        /// Action to dispatch after delay
        action: Box<Action>,
    },

    /// Suspend for a duration without producing anything
    Timer(Duration),

    /// Arbitrary async computation
    ///
    /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
    Future(EffectFuture<Action>),

    /// Producer of zero or more actions
    Stream(ActionStream<Action>),

    /// Producer of zero or more actions that may fail part way
    TryStream(TryActionStream<Action>),

    /// Effect registered under an id so it can be cancelled
    Cancellable {
        /// Registry key
        id: CancelId,
        /// Cancel everything already registered under `id` before starting
        cancel_in_flight: bool,
        /// The effect doing the work
        effect: Box<Effect<Action>>,
    },

    /// Cancel everything registered under an id
    Cancel(CancelId),
}

// Manual Debug implementation since Future doesn't implement Debug
impl<Action> std::fmt::Debug for Effect<Action>
where
    Action: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::None => write!(f, "Effect::None"),
            Effect::Parallel(effects) => f.debug_tuple("Effect::Parallel").field(effects).finish(),
            Effect::Sequential(effects) => {
                f.debug_tuple("Effect::Sequential").field(effects).finish()
            },
            Effect::Delay { duration, action } => f
                .debug_struct("Effect::Delay")
                .field("duration", duration)
                .field("action", action)
                .finish(),
            Effect::Timer(duration) => f.debug_tuple("Effect::Timer").field(duration).finish(),
            Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            Effect::Stream(_) => write!(f, "Effect::Stream(<stream>)"),
            Effect::TryStream(_) => write!(f, "Effect::TryStream(<stream>)"),
            Effect::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => f
                .debug_struct("Effect::Cancellable")
                .field("id", id)
                .field("cancel_in_flight", cancel_in_flight)
                .field("effect", effect)
                .finish(),
            Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
        }
    }
}

impl<Action> Default for Effect<Action> {
    fn default() -> Self {
        Self::None
    }
}

impl<Action> Effect<Action> {
    /// An effect that completes immediately without output.
    #[must_use]
    pub const fn none() -> Self {
        Self::None
    }

    /// Combine effects to run concurrently
    #[must_use]
    pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
        Effect::Parallel(effects)
    }

    /// Chain effects to run sequentially
    ///
    /// Each effect starts only after the previous one has completed.
    #[must_use]
    pub const fn concatenate(effects: Vec<Effect<Action>>) -> Effect<Action> {
        Effect::Sequential(effects)
    }

    /// Suspend for `duration`, producing nothing.
    #[must_use]
    pub const fn timer(duration: Duration) -> Self {
        Self::Timer(duration)
    }

    /// An effect that cancels every task registered under `id` when driven.
    #[must_use]
    pub fn cancel(id: impl Into<CancelId>) -> Self {
        Self::Cancel(id.into())
    }

    /// Register this effect under `id` while it runs.
    ///
    /// With `cancel_in_flight`, everything already registered under `id` is cancelled
    /// before this effect starts.
    #[must_use]
    pub fn cancellable(self, id: impl Into<CancelId>, cancel_in_flight: bool) -> Self {
        Self::Cancellable {
            id: id.into(),
            cancel_in_flight,
            effect: Box::new(self),
        }
    }

    /// Delay this effect by `duration`, dropping it if a newer debounce with the same
    /// id starts before the delay elapses.
    ///
    /// Built from a timer followed by the effect, made cancellable with
    /// `cancel_in_flight`, so a superseded debounce never starts its work.
    #[must_use]
    pub fn debounce(self, id: impl Into<CancelId>, duration: Duration) -> Self {
        Self::concatenate(vec![Self::timer(duration), self]).cancellable(id, true)
    }

    /// Whether this effect can never produce output or do any work.
    #[must_use]
    pub fn is_none(&self) -> bool {
        match self {
            Self::None => true,
            Self::Parallel(effects) | Self::Sequential(effects) => {
                effects.iter().all(Self::is_none)
            },
            _ => false,
        }
    }
}

impl<Action> Effect<Action>
where
    Action: Send + 'static,
{
    /// Effect producing `action` as soon as it is driven.
    #[must_use]
    pub fn send(action: Action) -> Self {
        Self::Future(Box::pin(async move { Some(action) }))
    }

    /// Effect running `future`, feeding back its action if it returns one.
    ///
    /// Fallible work is expected to fold its outcome into an action:
    ///
    /// ```
    /// use composable_store_core::effect::Effect;
    ///
    /// #[derive(Debug)]
    /// enum Action {
    ///     FactResponse(Result<String, String>),
    /// }
    ///
    /// async fn fetch_fact(number: i64) -> Result<String, String> {
    ///     Ok(format!("{number} is a good number"))
    /// }
    ///
    /// let effect = Effect::future(async move {
    ///     Some(Action::FactResponse(fetch_fact(42).await))
    /// });
    /// assert!(!effect.is_none());
    /// ```
    #[must_use]
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Option<Action>> + Send + 'static,
    {
        Self::Future(Box::pin(future))
    }

    /// Effect yielding every item of `stream`.
    ///
    /// `async_stream::stream!` makes generator-style producers straightforward.
    #[must_use]
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Action> + Send + 'static,
    {
        Self::Stream(Box::pin(stream))
    }

    /// Effect yielding every `Ok` item of `stream`; the first `Err` ends it.
    #[must_use]
    pub fn try_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Action, EffectError>> + Send + 'static,
    {
        Self::TryStream(Box::pin(stream))
    }

    /// Transform every output of this effect.
    ///
    /// Used to lift a child feature's effect into its parent's action type.
    #[must_use]
    pub fn map<B, F>(self, f: F) -> Effect<B>
    where
        B: Send + 'static,
        F: Fn(Action) -> B + Send + Sync + 'static,
    {
        let f: SharedMap<Action, B> = Arc::new(f);
        self.map_shared(&f)
    }

    fn map_shared<B>(self, f: &SharedMap<Action, B>) -> Effect<B>
    where
        B: Send + 'static,
    {
        match self {
            Effect::None => Effect::None,
            Effect::Parallel(effects) => {
                Effect::Parallel(effects.into_iter().map(|e| e.map_shared(f)).collect())
            },
            Effect::Sequential(effects) => {
                Effect::Sequential(effects.into_iter().map(|e| e.map_shared(f)).collect())
            },
            Effect::Delay { duration, action } => Effect::Delay {
                duration,
                action: Box::new(f(*action)),
            },
            Effect::Timer(duration) => Effect::Timer(duration),
            Effect::Future(future) => {
                let f = Arc::clone(f);
                Effect::Future(Box::pin(async move { future.await.map(|action| f(action)) }))
            },
            Effect::Stream(stream) => {
                let f = Arc::clone(f);
                Effect::Stream(Box::pin(stream.map(move |action| f(action))))
            },
            Effect::TryStream(stream) => {
                let f = Arc::clone(f);
                Effect::TryStream(Box::pin(
                    stream.map(move |result| result.map(|action| f(action))),
                ))
            },
            Effect::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => Effect::Cancellable {
                id,
                cancel_in_flight,
                effect: Box::new(effect.map_shared(f)),
            },
            Effect::Cancel(id) => Effect::Cancel(id),
        }
    }

    /// Interpret this effect as a stream of outputs.
    ///
    /// Nothing runs until the returned stream is polled. Cancellable parts register
    /// with `registry` when they start and deregister when they end or are dropped.
    /// A cancelled effect simply ends; the only items of type `Err` come from
    /// [`Effect::TryStream`] producers.
    #[must_use]
    pub fn into_stream(self, registry: &CancellationRegistry) -> EffectStream<Action> {
        match self {
            Effect::None => stream::empty().boxed(),
            Effect::Parallel(effects) => {
                stream::select_all(effects.into_iter().map(|e| e.into_stream(registry))).boxed()
            },
            Effect::Sequential(effects) => {
                let registry = registry.clone();
                Box::pin(async_stream::stream! {
                    // A failure ends the whole sequence, not just the failing part.
                    'parts: for effect in effects {
                        let mut outputs = effect.into_stream(&registry);
                        while let Some(item) = outputs.next().await {
                            let failed = item.is_err();
                            yield item;
                            if failed {
                                break 'parts;
                            }
                        }
                    }
                })
            },
            Effect::Delay { duration, action } => stream::once(async move {
                tokio::time::sleep(duration).await;
                Ok(*action)
            })
            .boxed(),
            Effect::Timer(duration) => stream::once(async move { tokio::time::sleep(duration).await })
                .filter_map(|()| future::ready(None::<Result<Action, EffectError>>))
                .boxed(),
            Effect::Future(future) => stream::once(future)
                .filter_map(|action| future::ready(action.map(Ok)))
                .boxed(),
            Effect::Stream(stream) => stream.map(Ok).boxed(),
            Effect::TryStream(mut stream) => Box::pin(async_stream::stream! {
                while let Some(item) = stream.next().await {
                    let failed = item.is_err();
                    yield item;
                    if failed {
                        break;
                    }
                }
            }),
            Effect::Cancellable {
                id,
                cancel_in_flight,
                effect,
            } => {
                let registry = registry.clone();
                let inner = effect.into_stream(&registry);
                Box::pin(async_stream::stream! {
                    if cancel_in_flight {
                        registry.cancel_all(&id);
                    }

                    let (handle, abort_registration) = AbortHandle::new_pair();
                    let key = registry.register(id.clone(), handle.clone());
                    let _registration = Registration { registry: &registry, id: &id, key };

                    let mut inner = Abortable::new(inner, abort_registration);
                    while let Some(item) = inner.next().await {
                        // An output racing a cancellation is dropped.
                        if handle.is_aborted() {
                            break;
                        }
                        yield item;
                    }
                })
            },
            Effect::Cancel(id) => {
                let registry = registry.clone();
                stream::once(async move {
                    registry.cancel_all(&id);
                })
                .filter_map(|()| future::ready(None::<Result<Action, EffectError>>))
                .boxed()
            },
        }
    }

    /// Drive this effect to completion, handing every output to `on_output` in order.
    ///
    /// Cancellation is not an error: a cancelled effect just stops producing.
    ///
    /// # Errors
    ///
    /// Returns the [`EffectError`] that ended a failing producer.
    pub async fn sink<F>(
        self,
        registry: &CancellationRegistry,
        mut on_output: F,
    ) -> Result<(), EffectError>
    where
        F: FnMut(Action),
    {
        let mut outputs = self.into_stream(registry);
        while let Some(output) = outputs.next().await {
            on_output(output?);
        }
        Ok(())
    }
}

/// Removes a cancellable task from the registry when its stream ends or is dropped.
struct Registration<'a> {
    registry: &'a CancellationRegistry,
    id: &'a CancelId,
    key: TaskKey,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.unregister(self.id, self.key);
    }
}
