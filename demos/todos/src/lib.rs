//! Todo list built on the Composable Store architecture.
//!
//! The example shows:
//!
//! - A per-todo reducer lifted over a keyed list with `for_each`
//! - A delayed, cancellable effect: completed todos move to the end of the list one
//!   second after the last checkbox change
//! - An injected id generator, swapped out in tests
//! - One scoped store per row with `Store::scope_each`
//!
//! # Quick Start
//!
//! ```no_run
//! use composable_store_runtime::{ExecutionContext, Store};
//! use todos::{app_reducer, AppAction, AppEnvironment, AppState};
//!
//! # async fn example() {
//! let local = tokio::task::LocalSet::new();
//! local
//!     .run_until(async {
//!         let store = Store::new(
//!             AppState::default(),
//!             app_reducer(),
//!             AppEnvironment::live(),
//!             ExecutionContext::current(),
//!         );
//!         store.send(AppAction::AddTodoButtonTapped);
//!         assert_eq!(store.current_state().todos.len(), 1);
//!     })
//!     .await;
//! # }
//! ```

pub mod reducer;
pub mod types;

// Re-export commonly used types
pub use reducer::{
    app_reducer, AppEnvironment, AppReducer, TodoCompletionId, TodoEnvironment, TodoReducer,
    SORT_DELAY,
};
pub use types::{AppAction, AppState, EditMode, Filter, Todo, TodoAction, TodoId};
