//! Reducers for the todo list.
//!
//! [`TodoReducer`] handles a single todo. [`AppReducer`] handles the list itself and
//! schedules sorting a second after a checkbox changes; toggling again within that
//! second restarts the wait. [`app_reducer`] lifts the former over the list and
//! combines both.

use crate::types::{AppAction, AppState, Todo, TodoAction, TodoId};
use composable_store_core::composition::ReducerExt;
use composable_store_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How long completed todos stay in place before moving to the end.
pub const SORT_DELAY: Duration = Duration::from_secs(1);

/// Cancellation id for the pending sort.
#[derive(Debug, Hash, PartialEq, Eq)]
pub struct TodoCompletionId;

/// Dependencies of a single todo (none)
#[derive(Clone, Copy, Debug, Default)]
pub struct TodoEnvironment;

/// Dependencies of the list
#[derive(Clone)]
pub struct AppEnvironment {
    /// Produces ids for new todos
    pub uuid: Arc<dyn Fn() -> TodoId + Send + Sync>,
    todo: TodoEnvironment,
}

impl AppEnvironment {
    /// Environment generating ids with `uuid`
    pub fn new<F>(uuid: F) -> Self
    where
        F: Fn() -> TodoId + Send + Sync + 'static,
    {
        Self {
            uuid: Arc::new(uuid),
            todo: TodoEnvironment,
        }
    }

    /// Environment generating random ids
    #[must_use]
    pub fn live() -> Self {
        Self::new(TodoId::new)
    }

    /// Environment that always produces `id`
    #[must_use]
    pub fn fixed(id: TodoId) -> Self {
        Self::new(move || id)
    }

    fn todo(&self) -> &TodoEnvironment {
        &self.todo
    }
}

impl fmt::Debug for AppEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppEnvironment").finish_non_exhaustive()
    }
}

/// Reducer for one todo
#[derive(Clone, Copy, Debug, Default)]
pub struct TodoReducer;

impl Reducer for TodoReducer {
    type State = Todo;
    type Action = TodoAction;
    type Environment = TodoEnvironment;

    fn reduce(
        &self,
        todo: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TodoAction::CheckBoxToggled(checked) => todo.is_complete = checked,
            TodoAction::TextFieldChanged(text) => todo.description = text,
        }
        smallvec![]
    }
}

/// Reducer for the list
#[derive(Clone, Copy, Debug, Default)]
pub struct AppReducer;

impl Reducer for AppReducer {
    type State = AppState;
    type Action = AppAction;
    type Environment = AppEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            AppAction::AddTodoButtonTapped => {
                state.todos.push(Todo::new((env.uuid)()));
                smallvec![]
            },
            AppAction::ClearCompletedButtonTapped => {
                state.todos.retain(|todo| !todo.is_complete);
                smallvec![]
            },
            AppAction::EditModeChanged(mode) => {
                state.edit_mode = mode;
                smallvec![]
            },
            AppAction::FilterPicked(filter) => {
                state.filter = filter;
                smallvec![]
            },
            AppAction::SortCompletedTodos => {
                state.sort_completed();
                smallvec![]
            },
            AppAction::Todo(_, TodoAction::CheckBoxToggled(_)) => smallvec![Effect::Delay {
                duration: SORT_DELAY,
                action: Box::new(AppAction::SortCompletedTodos),
            }
            .cancellable(composable_store_core::cancellation::CancelId::new(TodoCompletionId), true)],
            // Handled by the per-todo reducer.
            AppAction::Todo(..) => smallvec![],
        }
    }
}

/// The full feature: list logic plus every todo's own reducer.
#[must_use]
pub fn app_reducer(
) -> impl Reducer<State = AppState, Action = AppAction, Environment = AppEnvironment> + Send + Sync
{
    AppReducer
        .combine(TodoReducer.for_each(
            AppState::todos_lens(),
            AppAction::todo_prism(),
            |todo| todo.id,
            AppEnvironment::todo,
        ))
        .debug("todos")
}
