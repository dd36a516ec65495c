//! Resumption round-trip: persisting the not-yet-successful module set after
//! a failed build and reattempting exactly that set on the next invocation.

use anyhow::bail;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use reactor::{
    BuildConfig, BuildContext, BuildStatus, FailurePolicy, ModuleBuilder, ModuleDescriptor,
    ModuleId, ModuleState, Parallelism, ProjectGraph, Reactor, ResumptionSelector,
    ResumptionStateStore,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

fn id(artifact: &str) -> ModuleId {
    ModuleId::new("com.acme", artifact, "1.0")
}

/// a and c are independent; d depends on b.
fn graph() -> Arc<ProjectGraph> {
    Arc::new(
        ProjectGraph::from_descriptors(vec![
            ModuleDescriptor::new(id("a"), vec![]),
            ModuleDescriptor::new(id("b"), vec![]),
            ModuleDescriptor::new(id("c"), vec![]),
            ModuleDescriptor::new(id("d"), vec![id("b")]),
        ])
        .unwrap(),
    )
}

fn config(policy: FailurePolicy) -> BuildConfig {
    BuildConfig {
        parallelism: Parallelism::Fixed(1),
        failure_policy: policy,
    }
}

fn store_path(test: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("reactor_resume_{test}"));
    let _ = std::fs::remove_dir_all(&path);
    path
}

struct RecordingBuilder {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl RecordingBuilder {
    fn failing_on(artifacts: &[&str]) -> Self {
        Self {
            failing: artifacts.iter().map(|a| id(a).coordinate()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        let mut calls = self.calls.lock().unwrap().clone();
        calls.sort();
        calls
    }
}

#[async_trait]
impl ModuleBuilder for RecordingBuilder {
    async fn build_module(&self, module: &ModuleId, _ctx: &BuildContext) -> anyhow::Result<()> {
        let coordinate = module.coordinate();
        self.calls.lock().unwrap().push(coordinate.clone());
        if self.failing.contains(&coordinate) {
            bail!("scripted failure for {coordinate}");
        }
        Ok(())
    }
}

#[tokio::test]
async fn failed_build_persists_remaining_and_resume_reattempts_them() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store = ResumptionStateStore::open(store_path("round_trip")).unwrap();

    // First invocation: b fails under fail-at-end, d is skipped as its
    // dependent, a and c succeed.
    let builder = Arc::new(RecordingBuilder::failing_on(&["b"]));
    let reactor = Reactor::new(graph(), config(FailurePolicy::FailAtEnd), builder).unwrap();
    let report = reactor.run().await.unwrap();
    assert_eq!(report.status, BuildStatus::Failed);

    let persisted = store.snapshot(&report).unwrap();
    assert_eq!(
        persisted.to_string(),
        format!("{},{}", id("b").coordinate(), id("d").coordinate())
    );

    // Second invocation: resume with the persisted selection, b now builds.
    let selection = ResumptionStateStore::merge(
        &ResumptionSelector::new(),
        store.load().unwrap().as_ref(),
    );
    let builder = Arc::new(RecordingBuilder::failing_on(&[]));
    let reactor = Reactor::new(graph(), config(FailurePolicy::FailAtEnd), builder.clone()).unwrap();
    let report = reactor.run_selected(&selection).await.unwrap();

    assert_eq!(report.status, BuildStatus::Succeeded);
    // a and c are treated as already built: not reattempted, not reported.
    assert_eq!(
        builder.calls(),
        vec![id("b").coordinate(), id("d").coordinate()]
    );
    assert!(report.outcome_for(&id("a")).is_none());
    assert!(report.outcome_for(&id("c")).is_none());
    assert_eq!(report.outcome_for(&id("b")).unwrap().state, ModuleState::Succeeded);
    assert_eq!(report.outcome_for(&id("d")).unwrap().state, ModuleState::Succeeded);

    // A successful build clears the record.
    store.snapshot(&report).unwrap();
    assert_eq!(store.load().unwrap(), Some(ResumptionSelector::new()));
}

#[tokio::test]
async fn absent_record_is_distinguished_from_empty_record() {
    let store = ResumptionStateStore::open(store_path("absent_vs_empty")).unwrap();
    assert_eq!(store.load().unwrap(), None);

    // A failed build followed by a successful one leaves an empty record.
    let builder = Arc::new(RecordingBuilder::failing_on(&["b"]));
    let reactor = Reactor::new(graph(), config(FailurePolicy::FailAtEnd), builder).unwrap();
    let failed_report = reactor.run().await.unwrap();
    store.snapshot(&failed_report).unwrap();
    assert!(!store.load().unwrap().unwrap().is_empty());

    let builder = Arc::new(RecordingBuilder::failing_on(&[]));
    let reactor = Reactor::new(graph(), config(FailurePolicy::FailAtEnd), builder).unwrap();
    let ok_report = reactor.run().await.unwrap();
    store.snapshot(&ok_report).unwrap();
    assert_eq!(store.load().unwrap(), Some(ResumptionSelector::new()));
}

#[tokio::test]
async fn explicit_selection_takes_precedence_over_persisted() {
    let persisted: ResumptionSelector = [id("b").coordinate()].into_iter().collect();
    let explicit: ResumptionSelector = [":d".to_string()].into_iter().collect();

    let merged = ResumptionStateStore::merge(&explicit, Some(&persisted));
    assert_eq!(merged, explicit);

    // With only d selected, b is treated as built even though it was
    // persisted as remaining.
    let builder = Arc::new(RecordingBuilder::failing_on(&[]));
    let reactor = Reactor::new(graph(), config(FailurePolicy::FailAtEnd), builder.clone()).unwrap();
    let report = reactor.run_selected(&merged).await.unwrap();
    assert_eq!(report.status, BuildStatus::Succeeded);
    assert_eq!(builder.calls(), vec![id("d").coordinate()]);
}

#[tokio::test]
async fn selector_matching_no_module_is_not_fatal() {
    let selection: ResumptionSelector =
        [":d".to_string(), ":no-such-module".to_string()].into_iter().collect();
    assert_eq!(
        selection.unmatched_selectors(&graph()),
        vec![":no-such-module"]
    );

    let builder = Arc::new(RecordingBuilder::failing_on(&[]));
    let reactor = Reactor::new(graph(), config(FailurePolicy::FailAtEnd), builder.clone()).unwrap();
    let report = reactor.run_selected(&selection).await.unwrap();
    assert_eq!(report.status, BuildStatus::Succeeded);
    assert_eq!(builder.calls(), vec![id("d").coordinate()]);
}
