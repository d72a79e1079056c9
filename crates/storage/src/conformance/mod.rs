//! Conformance test suite for store implementations.
//!
//! This module provides a backend-agnostic test suite that any store
//! implementing both [`InstanceStore`] and [`DefinitionStore`] can run to
//! verify correctness. The suite covers:
//!
//! - **Instances**: creation, duplicate detection, lookup by entity
//! - **Versioning / OCC**: compare-and-swap saves and conflict reporting
//! - **Entity coupling**: entity documents written together with instances
//! - **Definitions**: id assignment, versioning, paging, activation
//! - **Concurrency**: racing saves on one instance serialize
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use bobbin_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn sqlite_conformance() {
//!     let report = run_conformance_suite(|| async { open_test_store().await }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod definition;
mod instance;

use std::fmt;
use std::future::Future;

use bobbin_workflow::{
    Engine, EntityState, Operator, StateKind, StateNode, Transition, TransitionRequest,
    WorkflowDefinition, WorkflowInstance,
};

use crate::{DefinitionStore, InstanceStore};

/// Stores the suite can run against.
pub trait ConformanceStore: InstanceStore + DefinitionStore {}

impl<T: InstanceStore + DefinitionStore> ConformanceStore for T {}

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "instance", "definition").
    pub category: String,
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL [{}/{}]: {}",
                r.category,
                r.name,
                r.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: ConformanceStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(instance::run_instance_tests(&factory).await);
    results.extend(definition::run_definition_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn make_definition(code: &str) -> WorkflowDefinition {
    WorkflowDefinition::new(code, format!("Test workflow {code}"))
        .with_state(StateNode::new("open", "Open", StateKind::Start))
        .with_state(StateNode::new("closed", "Closed", StateKind::End))
        .with_transition(Transition::new("open", "close", "closed"))
        .with_transition(Transition::new("closed", "reopen", "open"))
}

fn make_instance(definition: &WorkflowDefinition, entity_id: &str) -> Result<WorkflowInstance, String> {
    Engine::new(definition)
        .start("ticket", entity_id)
        .map_err(|e| e.to_string())
}

/// `instance` advanced by one `close` transition, as a caller would save it.
fn advance(
    definition: &WorkflowDefinition,
    instance: &WorkflowInstance,
) -> Result<(WorkflowInstance, EntityState), String> {
    let mut next = instance.clone();
    let mut entity = EntityState::new();
    entity.insert("closed_by".into(), serde_json::json!("tester"));
    Engine::new(definition)
        .execute(
            &mut next,
            &TransitionRequest::new("close", Operator::system()),
            &mut entity,
        )
        .map_err(|e| e.to_string())?;
    Ok((next, entity))
}

fn expect_eq<T: PartialEq + fmt::Debug>(label: &str, actual: T, expected: T) -> Result<(), String> {
    if actual == expected {
        Ok(())
    } else {
        Err(format!("{label}: expected {expected:?}, got {actual:?}"))
    }
}
