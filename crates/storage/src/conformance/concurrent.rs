use std::future::Future;
use std::sync::Arc;

use super::{advance, make_definition, make_instance, ConformanceStore, TestResult};
use crate::StorageError;

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "racing_saves_exactly_one_wins",
            racing_saves_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "racing_creates_exactly_one_wins",
            racing_creates_exactly_one_wins(factory).await,
        ),
    ]
}

/// N tasks read the same instance at version 0 and race to save a transition.
/// Exactly one save succeeds; the rest must get ConcurrentConflict.
async fn racing_saves_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    let def = make_definition("race");
    let instance = make_instance(&def, "t-1")?;
    store
        .create_instance(instance.clone())
        .await
        .map_err(|e| e.to_string())?;

    let mut handles = Vec::with_capacity(N);
    for _ in 0..N {
        let store = Arc::clone(&store);
        let (next, entity) = advance(&def, &instance)?;
        handles.push(tokio::spawn(async move {
            store.save_instance(next, 0, Some(entity)).await
        }));
    }

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.map_err(|e| format!("task panicked: {e}"))? {
            Ok(_) => wins += 1,
            Err(StorageError::ConcurrentConflict { .. }) => conflicts += 1,
            Err(other) => return Err(format!("unexpected error: {other}")),
        }
    }

    if wins != 1 || conflicts != N - 1 {
        return Err(format!(
            "expected 1 win and {} conflicts, got {wins} wins and {conflicts} conflicts",
            N - 1
        ));
    }

    let stored = store
        .get_instance(&instance.id)
        .await
        .map_err(|e| e.to_string())?;
    if stored.version != 1 || stored.history.len() != 1 {
        return Err(format!(
            "final instance at version {} with {} history entries",
            stored.version,
            stored.history.len()
        ));
    }
    Ok(())
}

async fn racing_creates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    let def = make_definition("race_create");

    let mut handles = Vec::with_capacity(N);
    for _ in 0..N {
        let store = Arc::clone(&store);
        let instance = make_instance(&def, "t-1")?;
        handles.push(tokio::spawn(async move {
            store.create_instance(instance).await
        }));
    }

    let mut wins = 0;
    for handle in handles {
        match handle.await.map_err(|e| format!("task panicked: {e}"))? {
            Ok(()) => wins += 1,
            Err(StorageError::AlreadyInitialized { .. }) => {}
            Err(other) => return Err(format!("unexpected error: {other}")),
        }
    }

    if wins != 1 {
        return Err(format!("expected exactly one create to win, got {wins}"));
    }
    Ok(())
}
