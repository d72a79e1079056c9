use std::future::Future;

use super::{expect_eq, make_definition, ConformanceStore, TestResult};
use crate::StorageError;

pub(super) async fn run_definition_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "definition",
            "create_assigns_id_and_timestamps",
            create_assigns_id_and_timestamps(factory).await,
        ),
        TestResult::from_result(
            "definition",
            "create_with_taken_id_is_rejected",
            create_with_taken_id_is_rejected(factory).await,
        ),
        TestResult::from_result(
            "definition",
            "update_bumps_version_and_keeps_audit",
            update_bumps_version_and_keeps_audit(factory).await,
        ),
        TestResult::from_result(
            "definition",
            "list_pages_in_creation_order",
            list_pages_in_creation_order(factory).await,
        ),
        TestResult::from_result(
            "definition",
            "delete_removes_definition",
            delete_removes_definition(factory).await,
        ),
        TestResult::from_result(
            "activation",
            "activate_is_exclusive_per_code",
            activate_is_exclusive_per_code(factory).await,
        ),
        TestResult::from_result(
            "activation",
            "deactivate_hides_from_active_lookup",
            deactivate_hides_from_active_lookup(factory).await,
        ),
        TestResult::from_result(
            "activation",
            "missing_definition_errors",
            missing_definition_errors(factory).await,
        ),
    ]
}

async fn create_assigns_id_and_timestamps<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let created = store
        .create_definition(make_definition("a"))
        .await
        .map_err(|e| e.to_string())?;
    if created.id.is_empty() {
        return Err("no id assigned".to_string());
    }
    if created.created_at == 0 || created.updated_at == 0 {
        return Err("timestamps not stamped".to_string());
    }
    expect_eq("version", created.version, 1)?;

    let loaded = store
        .get_definition(&created.id)
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("loaded", loaded, created)
}

async fn create_with_taken_id_is_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut def = make_definition("a");
    def.id = "fixed".to_string();
    store
        .create_definition(def.clone())
        .await
        .map_err(|e| e.to_string())?;
    match store.create_definition(def).await {
        Err(StorageError::DefinitionExists { id }) => expect_eq("id", id.as_str(), "fixed"),
        other => Err(format!("expected DefinitionExists, got {other:?}")),
    }
}

async fn update_bumps_version_and_keeps_audit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let mut def = make_definition("a");
    def.created_by = "designer".to_string();
    let created = store
        .create_definition(def)
        .await
        .map_err(|e| e.to_string())?;
    store
        .activate(&created.id)
        .await
        .map_err(|e| e.to_string())?;

    let mut edit = make_definition("a");
    edit.name = "Renamed".to_string();
    edit.created_by = "someone else".to_string();
    let updated = store
        .update_definition(&created.id, edit)
        .await
        .map_err(|e| e.to_string())?;

    expect_eq("id", updated.id.as_str(), created.id.as_str())?;
    expect_eq("version", updated.version, created.version + 1)?;
    expect_eq("name", updated.name.as_str(), "Renamed")?;
    expect_eq("created_by", updated.created_by.as_str(), "designer")?;
    expect_eq("created_at", updated.created_at, created.created_at)?;
    expect_eq("is_active", updated.is_active, true)
}

async fn list_pages_in_creation_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    for code in ["a", "b", "c", "d", "e"] {
        store
            .create_definition(make_definition(code))
            .await
            .map_err(|e| e.to_string())?;
    }

    let (page, total) = store
        .list_definitions(2, 2)
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("total", total, 5)?;
    let codes: Vec<&str> = page.iter().map(|d| d.code.as_str()).collect();
    expect_eq("page 2 codes", codes, vec!["c", "d"])?;

    let (last, _) = store
        .list_definitions(3, 2)
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("last page size", last.len(), 1)?;

    let (beyond, _) = store
        .list_definitions(9, 2)
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("beyond last page", beyond.len(), 0)
}

async fn delete_removes_definition<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let created = store
        .create_definition(make_definition("a"))
        .await
        .map_err(|e| e.to_string())?;
    store
        .delete_definition(&created.id)
        .await
        .map_err(|e| e.to_string())?;
    match store.get_definition(&created.id).await {
        Err(StorageError::DefinitionNotFound { .. }) => {}
        other => return Err(format!("expected DefinitionNotFound, got {other:?}")),
    }
    match store.delete_definition(&created.id).await {
        Err(StorageError::DefinitionNotFound { .. }) => Ok(()),
        other => Err(format!("second delete: expected DefinitionNotFound, got {other:?}")),
    }
}

async fn activate_is_exclusive_per_code<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let first = store
        .create_definition(make_definition("order"))
        .await
        .map_err(|e| e.to_string())?;
    let second = store
        .create_definition(make_definition("order"))
        .await
        .map_err(|e| e.to_string())?;
    let other = store
        .create_definition(make_definition("ticket"))
        .await
        .map_err(|e| e.to_string())?;

    for id in [&first.id, &other.id, &second.id] {
        store.activate(id).await.map_err(|e| e.to_string())?;
    }

    let active = store
        .get_active_by_code("order")
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("active order id", active.id.as_str(), second.id.as_str())?;

    let first = store
        .get_definition(&first.id)
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("first still active", first.is_active, false)?;

    let other = store
        .get_definition(&other.id)
        .await
        .map_err(|e| e.to_string())?;
    expect_eq("other code untouched", other.is_active, true)
}

async fn deactivate_hides_from_active_lookup<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    let created = store
        .create_definition(make_definition("order"))
        .await
        .map_err(|e| e.to_string())?;
    store
        .activate(&created.id)
        .await
        .map_err(|e| e.to_string())?;
    store
        .deactivate(&created.id)
        .await
        .map_err(|e| e.to_string())?;

    match store.get_active_by_code("order").await {
        Err(StorageError::NoActiveDefinition { code }) => expect_eq("code", code.as_str(), "order"),
        other => Err(format!("expected NoActiveDefinition, got {other:?}")),
    }
}

async fn missing_definition_errors<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = factory().await;
    for result in [
        store.activate("ghost").await,
        store.deactivate("ghost").await,
        store.delete_definition("ghost").await,
    ] {
        match result {
            Err(StorageError::DefinitionNotFound { .. }) => {}
            other => return Err(format!("expected DefinitionNotFound, got {other:?}")),
        }
    }
    match store
        .update_definition("ghost", make_definition("ghost"))
        .await
    {
        Err(StorageError::DefinitionNotFound { .. }) => Ok(()),
        other => Err(format!("update: expected DefinitionNotFound, got {other:?}")),
    }
}
