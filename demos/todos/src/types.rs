//! Domain types for the todo list.

use composable_store_core::optics::{ActionPrism, StateLens};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a todo
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TodoId(Uuid);

impl TodoId {
    /// Generate a random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// A fixed id, for tests and fixtures
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// The underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TodoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TodoId({})", self.0)
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single todo
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Todo {
    /// What needs doing
    pub description: String,
    /// Identity within the list
    pub id: TodoId,
    /// Whether it is done
    pub is_complete: bool,
}

impl Todo {
    /// An empty, incomplete todo
    #[must_use]
    pub const fn new(id: TodoId) -> Self {
        Self {
            description: String::new(),
            id,
            is_complete: false,
        }
    }
}

/// Actions on one todo
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TodoAction {
    /// The checkbox was set to the given value
    CheckBoxToggled(bool),
    /// The description was edited
    TextFieldChanged(String),
}

/// Whether the list is being reordered or deleted from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EditMode {
    /// Editing
    Active,
    /// Browsing
    #[default]
    Inactive,
}

/// Which todos are shown
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Filter {
    /// Everything
    #[default]
    All,
    /// Incomplete todos
    Active,
    /// Completed todos
    Completed,
}

/// State of the whole list screen
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppState {
    /// Current edit mode
    pub edit_mode: EditMode,
    /// Current filter
    pub filter: Filter,
    /// All todos, in display order
    pub todos: Vec<Todo>,
}

impl AppState {
    /// State holding just these todos
    #[must_use]
    pub fn with_todos(todos: impl IntoIterator<Item = Todo>) -> Self {
        Self {
            todos: todos.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Todos the current filter shows
    pub fn filtered_todos(&self) -> impl Iterator<Item = &Todo> {
        let filter = self.filter;
        self.todos.iter().filter(move |todo| match filter {
            Filter::All => true,
            Filter::Active => !todo.is_complete,
            Filter::Completed => todo.is_complete,
        })
    }

    /// Move completed todos after incomplete ones, keeping relative order
    pub fn sort_completed(&mut self) {
        // Stable sort: equal keys keep their order.
        self.todos.sort_by_key(|todo| todo.is_complete);
    }

    /// Number of completed todos
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.todos.iter().filter(|todo| todo.is_complete).count()
    }

    /// Focus on the todo list
    #[must_use]
    pub fn todos_lens() -> StateLens<Self, Vec<Todo>> {
        StateLens::new(|state| &state.todos, |state| &mut state.todos)
    }
}

/// Actions of the list screen
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppAction {
    /// Append a new empty todo
    AddTodoButtonTapped,
    /// Remove every completed todo
    ClearCompletedButtonTapped,
    /// Switch the edit mode
    EditModeChanged(EditMode),
    /// Switch the filter
    FilterPicked(Filter),
    /// Move completed todos to the end of the list
    SortCompletedTodos,
    /// An action for the todo with this id
    Todo(TodoId, TodoAction),
}

impl AppAction {
    /// Match and build per-todo actions
    #[must_use]
    pub fn todo_prism() -> ActionPrism<Self, (TodoId, TodoAction)> {
        ActionPrism::new(
            |action| match action {
                Self::Todo(id, action) => Some((id, action)),
                _ => None,
            },
            |(id, action)| Self::Todo(id, action),
        )
    }
}
