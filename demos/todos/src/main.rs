//! Todo list demo binary.
//!
//! Drives a real `Store` on a local task set: adds todos, edits and completes them
//! through per-row scoped stores, and waits for the delayed sort.
//!
//! Configuration comes from `STORE_NAME` and `STORE_BROADCAST_CAPACITY`; logging
//! from `RUST_LOG`. Set `METRICS_ADDR` to also print the Prometheus metrics.

use composable_store_runtime::metrics::MetricsServer;
use composable_store_runtime::{
    ExecutionContext, NavigableStore, Navigator, Store, StoreConfig, STORE_NAME_ENV,
};
use std::time::Duration;
use todos::{app_reducer, AppAction, AppEnvironment, AppState, Todo, TodoAction, SORT_DELAY};
use tokio::task::LocalSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todos=info,composable_store_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics = match std::env::var("METRICS_ADDR") {
        Ok(addr) => {
            let mut server = MetricsServer::new(addr.parse()?);
            server.start()?;
            Some(server)
        },
        Err(_) => None,
    };

    let mut config = StoreConfig::from_env()?;
    if std::env::var_os(STORE_NAME_ENV).is_none() {
        config = config.with_name("todos");
    }

    LocalSet::new().run_until(run(&config)).await?;

    if let Some(text) = metrics.as_ref().and_then(MetricsServer::render) {
        tracing::info!(bytes = text.len(), "Rendered metrics");
        println!("\n=== Metrics ===\n{text}");
    }
    Ok(())
}

async fn run(config: &StoreConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Todos Example ===\n");

    let store = Store::with_config(
        AppState::default(),
        app_reducer(),
        AppEnvironment::live(),
        ExecutionContext::current(),
        config,
    )?;
    let navigator = Navigator::new(
        |route, _on_dismiss| println!("  (navigate to {route})"),
        || println!("  (back)"),
    );
    let store = NavigableStore::new(store, navigator);

    for _ in 0..3 {
        store.send(AppAction::AddTodoButtonTapped);
    }
    tracing::info!(count = store.current_state().todos.len(), "Added todos");

    let rows = store.scope_each(
        |state: &AppState| state.todos.as_slice(),
        |todo: &Todo| todo.id,
        AppAction::Todo,
    );
    for (row, text) in rows.iter().zip(["Buy milk", "Write documentation", "Ship it"]) {
        row.send(TodoAction::TextFieldChanged(text.to_string()));
    }
    print_todos("Created", &store.current_state());

    let first = &rows[0];
    first.navigate_to(&format!("todos/{}", first.current_state().id), || {});
    let mut handle = first.send(TodoAction::CheckBoxToggled(true));
    print_todos("Completed the first todo", &store.current_state());

    tracing::info!(delay = ?SORT_DELAY, "Waiting for completed todos to sort");
    handle.wait_with_timeout(SORT_DELAY + Duration::from_secs(1)).await?;
    tracing::info!(completed = store.current_state().completed_count(), "Sort fired");
    print_todos("Sorted", &store.current_state());

    // Rows follow their todo, wherever it moved.
    let moved = first.current_state();
    println!(
        "\nFirst row still shows {:?} (complete: {})",
        moved.description, moved.is_complete
    );
    first.pop_back_stack();

    store.send(AppAction::ClearCompletedButtonTapped);
    print_todos("Cleared completed", &store.current_state());

    // The first row's todo is gone; this is ignored.
    first.send(TodoAction::CheckBoxToggled(false));
    println!(
        "\nFinal: {} todo(s), stale row kept {:?}",
        store.current_state().todos.len(),
        first.current_state().description
    );

    Ok(())
}

fn print_todos(title: &str, state: &AppState) {
    println!("\n{title}:");
    for todo in &state.todos {
        let status = if todo.is_complete { "✓" } else { " " };
        println!("  [{status}] {}", todo.description);
    }
}
