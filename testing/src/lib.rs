//! # Composable Store Testing
//!
//! Testing utilities and helpers for the Composable Store architecture.
//!
//! This crate provides:
//! - [`TestStore`]: runs a reducer and its effects on virtual time and requires
//!   every effect output to be received explicitly
//! - [`ScopedTestStore`]: the same assertions against a slice of the state
//! - [`ReducerTest`]: Given-When-Then checks of a single reducer pass
//! - [`assertions`]: helpers for inspecting effect descriptions
//!
//! ## Example
//!
//! ```ignore
//! use composable_store_testing::TestStore;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_completion_sorts_after_a_second() {
//!     let mut store = TestStore::new(AppState::default(), app_reducer(), env());
//!
//!     store.send(AppAction::todo(a, TodoAction::CheckBoxToggled), |s| {
//!         s.todos[0].is_complete = true;
//!     });
//!     store.advance_time_by(Duration::from_secs(1)).await;
//!     store.receive(AppAction::SortCompletedTodos, |s| s.todos.swap(0, 1));
//!     store.finish();
//! }
//! ```

pub mod reducer_test;
mod test_store;

pub use reducer_test::{assertions, ReducerTest};
pub use test_store::{ScopedTestStore, TestStore};

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Honors `RUST_LOG` and defaults to `warn`. Safe to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
