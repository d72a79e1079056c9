use std::future::Future;

use super::{advance, expect_eq, make_definition, make_instance, ConformanceStore, TestResult};
use crate::StorageError;

pub(super) async fn run_instance_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "instance",
            "create_then_get_round_trips",
            create_then_get_round_trips(factory).await,
        ),
        TestResult::from_result(
            "instance",
            "duplicate_create_is_rejected",
            duplicate_create_is_rejected(factory).await,
        ),
        TestResult::from_result(
            "instance",
            "missing_instance_is_not_found",
            missing_instance_is_not_found(factory).await,
        ),
        TestResult::from_result(
            "instance",
            "find_by_entity_matches_type_and_id",
            find_by_entity_matches_type_and_id(factory).await,
        ),
        TestResult::from_result(
            "version",
            "save_with_current_version_succeeds",
            save_with_current_version_succeeds(factory).await,
        ),
        TestResult::from_result(
            "version",
            "save_with_stale_version_conflicts",
            save_with_stale_version_conflicts(factory).await,
        ),
        TestResult::from_result(
            "version",
            "save_of_unknown_instance_is_not_found",
            save_of_unknown_instance_is_not_found(factory).await,
        ),
        TestResult::from_result(
            "entity",
            "entity_is_written_with_instance",
            entity_is_written_with_instance(factory).await,
        ),
        TestResult::from_result(
            "entity",
            "conflicting_save_leaves_entity_untouched",
            conflicting_save_leaves_entity_untouched(factory).await,
        ),
        TestResult::from_result(
            "entity",
            "put_entity_replaces_document",
            put_entity_replaces_document(factory).await,
        ),
    ]
}

async fn create_then_get_round_trips<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let def = make_definition("round_trip");
    let instance = make_instance(&def, "t-1")?;
    store
        .create_instance(instance.clone())
        .await
        .map_err(|e| e.to_string())?;
    let loaded = store
        .get_instance(&instance.id)
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("loaded instance", loaded, instance)
}

async fn duplicate_create_is_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let def = make_definition("dup");
    let instance = make_instance(&def, "t-1")?;
    store
        .create_instance(instance.clone())
        .await
        .map_err(|e| e.to_string())?;
    match store.create_instance(instance).await {
        Err(StorageError::AlreadyInitialized { .. }) => Ok(()),
        other => Err(format!("expected AlreadyInitialized, got {other:?}")),
    }
}

async fn missing_instance_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    match store.get_instance("ticket:nope").await {
        Err(StorageError::InstanceNotFound { instance_id }) => {
            expect_eq("instance_id", instance_id.as_str(), "ticket:nope")
        }
        other => Err(format!("expected InstanceNotFound, got {other:?}")),
    }
}

async fn find_by_entity_matches_type_and_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let def = make_definition("lookup");
    for id in ["t-1", "t-2"] {
        store
            .create_instance(make_instance(&def, id)?)
            .await
            .map_err(|e| e.to_string())?;
    }

    let found = store
        .find_by_entity("ticket", "t-2")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("t-2 not found")?;
    expect_eq("entity_id", found.entity_id.as_str(), "t-2")?;

    let missing = store
        .find_by_entity("order", "t-2")
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("other entity type", missing.is_none(), true)
}

async fn save_with_current_version_succeeds<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let def = make_definition("save");
    let instance = make_instance(&def, "t-1")?;
    store
        .create_instance(instance.clone())
        .await
        .map_err(|e| e.to_string())?;

    let (next, entity) = advance(&def, &instance)?;
    let version = store
        .save_instance(next.clone(), instance.version, Some(entity))
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("returned version", version, instance.version + 1)?;

    let loaded = store
        .get_instance(&instance.id)
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("stored instance", loaded, next)
}

async fn save_with_stale_version_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let def = make_definition("stale");
    let instance = make_instance(&def, "t-1")?;
    store
        .create_instance(instance.clone())
        .await
        .map_err(|e| e.to_string())?;

    let (next, _) = advance(&def, &instance)?;
    store
        .save_instance(next.clone(), 0, None)
        .await
        .map_err(|e| e.to_string())?;

    match store.save_instance(next, 0, None).await {
        Err(StorageError::ConcurrentConflict {
            expected_version,
            actual_version,
            ..
        }) => {
            expect_eq("expected_version", expected_version, 0)?;
            expect_eq("actual_version", actual_version, 1)
        }
        other => Err(format!("expected ConcurrentConflict, got {other:?}")),
    }
}

async fn save_of_unknown_instance_is_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let def = make_definition("unknown");
    let instance = make_instance(&def, "t-1")?;
    match store.save_instance(instance, 0, None).await {
        Err(StorageError::InstanceNotFound { .. }) => Ok(()),
        other => Err(format!("expected InstanceNotFound, got {other:?}")),
    }
}

async fn entity_is_written_with_instance<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let def = make_definition("coupled");
    let instance = make_instance(&def, "t-1")?;
    store
        .create_instance(instance.clone())
        .await
        .map_err(|e| e.to_string())?;

    let (next, entity) = advance(&def, &instance)?;
    store
        .save_instance(next, 0, Some(entity.clone()))
        .await
        .map_err(|e| e.to_string())?;

    let loaded = store
        .get_entity("ticket", "t-1")
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("entity", loaded, Some(entity))
}

async fn conflicting_save_leaves_entity_untouched<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let def = make_definition("untouched");
    let instance = make_instance(&def, "t-1")?;
    store
        .create_instance(instance.clone())
        .await
        .map_err(|e| e.to_string())?;

    let (next, entity) = advance(&def, &instance)?;
    if store.save_instance(next, 7, Some(entity)).await.is_ok() {
        return Err("save with wrong version succeeded".to_string());
    }

    let loaded = store
        .get_entity("ticket", "t-1")
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("entity after conflict", loaded, None)?;
    let stored = store
        .get_instance(&instance.id)
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("instance after conflict", stored, instance)
}

async fn put_entity_replaces_document<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut first = bobbin_workflow::EntityState::new();
    first.insert("progress".into(), serde_json::json!(0.1));
    let mut second = bobbin_workflow::EntityState::new();
    second.insert("customer".into(), serde_json::json!("acme"));

    store
        .put_entity("order", "o-1", first)
        .await
        .map_err(|e| e.to_string())?;
    store
        .put_entity("order", "o-1", second.clone())
        .await
        .map_err(|e| e.to_string())?;

    let loaded = store
        .get_entity("order", "o-1")
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("entity", loaded, Some(second))
}
