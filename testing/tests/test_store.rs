//! Integration tests for the `TestStore` harness.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use composable_store_core::effect::{Effect, EffectError};
use composable_store_core::optics::{ActionPrism, StateLens};
use composable_store_core::{reducer::Reducer, smallvec, SmallVec};
use composable_store_testing::{init_test_tracing, TestStore};
use futures::stream;
use proptest::prelude::*;
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct Timer {
    ticks: u32,
    running: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct AppState {
    count: i64,
    query: String,
    results: Vec<String>,
    timer: Timer,
    next_id: u64,
    ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
enum TimerAction {
    Start,
    Tick,
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
enum AppAction {
    Increment,
    IncrementLater,
    QueryChanged(String),
    SearchResponse(String),
    Timer(TimerAction),
    Broken,
    NewId,
}

#[derive(Debug, Hash, PartialEq, Eq)]
struct SearchId;

#[derive(Debug, Hash, PartialEq, Eq)]
struct TimerId;

struct AppEnv {
    id_step: u64,
}

struct AppReducer;

impl Reducer for AppReducer {
    type State = AppState;
    type Action = AppAction;
    type Environment = AppEnv;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            AppAction::Increment => {
                state.count += 1;
                smallvec![]
            },
            AppAction::IncrementLater => smallvec![Effect::Delay {
                duration: Duration::from_millis(500),
                action: Box::new(AppAction::Increment),
            }],
            AppAction::QueryChanged(query) => {
                state.query.clone_from(&query);
                smallvec![Effect::send(AppAction::SearchResponse(query))
                    .debounce(composable_store_core::cancellation::CancelId::new(SearchId), Duration::from_millis(1000))]
            },
            AppAction::SearchResponse(result) => {
                state.results.push(result);
                smallvec![]
            },
            AppAction::Timer(TimerAction::Start) => {
                state.timer.running = true;
                smallvec![Effect::stream(async_stream::stream! {
                    loop {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        yield AppAction::Timer(TimerAction::Tick);
                    }
                })
                .cancellable(composable_store_core::cancellation::CancelId::new(TimerId), true)]
            },
            AppAction::Timer(TimerAction::Tick) => {
                state.timer.ticks += 1;
                smallvec![]
            },
            AppAction::Timer(TimerAction::Stop) => {
                state.timer.running = false;
                smallvec![Effect::cancel(composable_store_core::cancellation::CancelId::new(TimerId))]
            },
            AppAction::Broken => smallvec![Effect::try_stream(stream::iter(vec![Err(
                EffectError::failed("disk full")
            )]))],
            AppAction::NewId => {
                state.next_id += env.id_step;
                state.ids.push(state.next_id);
                smallvec![]
            },
        }
    }
}

fn test_store() -> TestStore<AppReducer> {
    init_test_tracing();
    TestStore::new(AppState::default(), AppReducer, AppEnv { id_step: 1 })
}

fn timer_lens() -> StateLens<AppState, Timer> {
    StateLens::new(|s| &s.timer, |s| &mut s.timer)
}

fn timer_prism() -> ActionPrism<AppAction, TimerAction> {
    ActionPrism::new(
        |action| match action {
            AppAction::Timer(action) => Some(action),
            _ => None,
        },
        AppAction::Timer,
    )
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn delayed_action_is_received_after_the_delay() {
    let mut store = test_store();

    store.send(AppAction::IncrementLater, |_| {});
    store.advance_time_by(Duration::from_millis(499)).await;
    assert!(!store.has_pending_actions());

    store.advance_time_by(Duration::from_millis(1)).await;
    assert!(store.has_pending_actions());
    store.receive(AppAction::Increment, |s| s.count = 1);

    assert_eq!(store.in_flight_effects(), 0);
    store.finish();
}

#[tokio::test(start_paused = true)]
async fn debounce_delivers_only_the_last_value() {
    let mut store = test_store();

    for query in ["1", "2", "3"] {
        store.send(AppAction::QueryChanged(query.to_string()), |s| {
            s.query = query.to_string();
        });
        store.advance_time_by(Duration::from_millis(500)).await;
    }
    assert!(!store.has_pending_actions());

    store.advance_time_by(Duration::from_millis(500)).await;
    store.receive(AppAction::SearchResponse("3".to_string()), |s| {
        s.results = vec!["3".to_string()];
    });
    store.finish();
}

#[tokio::test(start_paused = true)]
async fn advance_until_idle_runs_every_timer() {
    let mut store = test_store();

    store.send(AppAction::IncrementLater, |_| {});
    store.advance_until_idle().await;

    store.receive(AppAction::Increment, |s| s.count = 1);
    store.finish();
}

#[tokio::test(start_paused = true)]
async fn ticks_stop_after_cancel() {
    let mut store = test_store();

    store.send(AppAction::Timer(TimerAction::Start), |s| s.timer.running = true);
    store.advance_time_by(Duration::from_millis(250)).await;
    store.receive(AppAction::Timer(TimerAction::Tick), |s| s.timer.ticks = 1);
    store.receive(AppAction::Timer(TimerAction::Tick), |s| s.timer.ticks = 2);

    store.send(AppAction::Timer(TimerAction::Stop), |s| s.timer.running = false);
    store.advance_time_by(Duration::from_secs(10)).await;
    assert!(!store.has_pending_actions());
    assert_eq!(store.in_flight_effects(), 0);
    store.finish();
}

#[tokio::test(start_paused = true)]
async fn scoped_store_asserts_on_the_local_slice() {
    let mut store = test_store();

    {
        let mut timer = store.scope(timer_lens(), timer_prism());
        timer.send(TimerAction::Start, |t| t.running = true);
        timer.advance_time_by(Duration::from_millis(100)).await;
        assert!(timer.has_pending_actions());
        timer.receive(TimerAction::Tick, |t| t.ticks = 1);
        timer.send(TimerAction::Stop, |t| t.running = false);
        assert_eq!(timer.state().ticks, 1);
    }

    assert_eq!(store.state().timer, Timer { ticks: 1, running: false });
    store.finish();
}

#[tokio::test]
async fn environment_can_change_between_steps() {
    let mut store = test_store();

    store.send(AppAction::NewId, |s| {
        s.next_id = 1;
        s.ids = vec![1];
    });
    store.environment(|env| env.id_step = 10);
    store.send(AppAction::NewId, |s| {
        s.next_id = 11;
        s.ids.push(11);
    });
    store.finish();
}

#[tokio::test]
#[should_panic(expected = "State mismatch after Increment")]
async fn wrong_expectation_fails() {
    let mut store = test_store();
    store.send(AppAction::Increment, |s| s.count = 2);
}

#[tokio::test(start_paused = true)]
#[should_panic(expected = "Must handle 1 received action(s) before sending")]
async fn sending_with_pending_actions_fails() {
    let mut store = test_store();
    store.send(AppAction::IncrementLater, |_| {});
    store.advance_time_by(Duration::from_millis(500)).await;
    store.send(AppAction::Increment, |s| s.count = 1);
}

#[tokio::test]
#[should_panic(expected = "but no action was received")]
async fn receiving_nothing_fails() {
    let mut store = test_store();
    store.receive(AppAction::Increment, |s| s.count = 1);
}

#[tokio::test(start_paused = true)]
#[should_panic(expected = "Received an unexpected action")]
async fn receiving_the_wrong_action_fails() {
    let mut store = test_store();
    store.send(AppAction::IncrementLater, |_| {});
    store.advance_time_by(Duration::from_millis(500)).await;
    store.receive(AppAction::NewId, |_| {});
}

#[tokio::test(start_paused = true)]
#[should_panic(expected = "unhandled received action(s)")]
async fn dropping_with_unhandled_actions_fails() {
    let mut store = test_store();
    store.send(AppAction::IncrementLater, |_| {});
    store.advance_time_by(Duration::from_millis(500)).await;
}

#[tokio::test(start_paused = true)]
#[should_panic(expected = "received 1 unexpected action(s)")]
async fn finishing_with_unhandled_actions_fails() {
    let mut store = test_store();
    store.send(AppAction::IncrementLater, |_| {});
    store.advance_time_by(Duration::from_millis(500)).await;
    store.finish();
}

#[tokio::test]
#[should_panic(expected = "An effect failed: Effect failed: disk full")]
async fn effect_failure_fails_the_test() {
    let mut store = test_store();
    store.send(AppAction::Broken, |_| {});
}

proptest! {
    #[test]
    fn generated_ids_follow_the_environment(step in 1u64..1000, count in 1usize..20) {
        let mut store = TestStore::new(AppState::default(), AppReducer, AppEnv { id_step: step });
        for n in 1..=count as u64 {
            store.send(AppAction::NewId, |s| {
                s.next_id = n * step;
                s.ids.push(n * step);
            });
        }
        prop_assert_eq!(store.state().ids.len(), count);
        store.finish();
    }
}
