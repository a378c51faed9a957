//! End-to-end runs over the simulated store and destination.

use pullsync::adapters::{DestinationEvent, Script, SimulatedDestination, SimulatedObjectStore};
use pullsync::config::AppConfig;
use pullsync::context::AppContext;
use pullsync::core::{Outcome, Runner};
use pullsync::destination::DestinationService;
use pullsync::error::{RunError, ServiceError};
use pullsync::source::ObjectStore;
use std::sync::Arc;

fn context(destination_root: &str) -> AppContext {
    AppContext::new(AppConfig {
        simulation: true,
        poll_interval_ms: 1,
        max_polls: 10,
        concurrency_limit: 4,
        destination_root: destination_root.to_string(),
        ..Default::default()
    })
}

fn runner(
    ctx: &AppContext,
    store: SimulatedObjectStore,
    dest: &Arc<SimulatedDestination>,
) -> Runner {
    let store: Arc<dyn ObjectStore> = Arc::new(store);
    let dest: Arc<dyn DestinationService> = dest.clone();
    Runner::from_context(ctx, store, dest)
}

fn shoot_store() -> SimulatedObjectStore {
    SimulatedObjectStore::new("media")
        .with_object("shoot/", "")
        .with_object("shoot/a.jpg", "a")
        .with_object("shoot/b.jpg", "b")
        .with_object("shoot/raw/c.cr3", "c")
        .with_object("elsewhere/d.jpg", "d")
}

#[tokio::test]
async fn test_run_copies_every_file_into_fresh_folder() {
    let dest = Arc::new(SimulatedDestination::new().with_default(Script::CompleteAfter(1)));
    let ctx = context("");

    let summary = runner(&ctx, shoot_store(), &dest).run("shoot").await.unwrap();

    let container = summary.container.expect("folder provisioned");
    let name = container.path().trim_start_matches('/');
    assert_eq!(name.len(), 10);
    assert!(name.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(dest.folders(), vec![container.path().to_string()]);

    assert_eq!(summary.report.len(), 3);
    assert!(summary.report.all_succeeded());
    assert!(summary.report.get("shoot/raw/c.cr3").is_some());
    assert!(summary.report.get("shoot/").is_none());
}

#[tokio::test]
async fn test_empty_listing_short_circuits() {
    let dest = Arc::new(SimulatedDestination::new());
    let ctx = context("");

    let summary = runner(&ctx, shoot_store(), &dest).run("missing").await.unwrap();

    assert!(summary.container.is_none());
    assert!(summary.report.is_empty());
    assert!(dest.folders().is_empty());
}

#[tokio::test]
async fn test_provision_failure_aborts_run() {
    let dest = Arc::new(
        SimulatedDestination::new()
            .failing_folder_creation(ServiceError::Auth("invalid_access_token".to_string())),
    );
    let ctx = context("");

    let err = runner(&ctx, shoot_store(), &dest).run("shoot").await.unwrap_err();

    assert!(matches!(err, RunError::Provision(_)));
    assert!(dest.events().is_empty());
}

#[tokio::test]
async fn test_list_failure_aborts_before_provisioning() {
    let dest = Arc::new(SimulatedDestination::new());
    let ctx = context("");
    let store = shoot_store().with_page_size(1).fail_on_page(2);

    let err = runner(&ctx, store, &dest).run("shoot").await.unwrap_err();

    assert!(matches!(err, RunError::List(ref e) if e.page == 2));
    assert!(dest.folders().is_empty());
}

#[tokio::test]
async fn test_destination_root_is_parent_of_run_folder() {
    let dest = Arc::new(SimulatedDestination::new());
    let ctx = context("/imports");

    let summary = runner(&ctx, shoot_store(), &dest).run("shoot").await.unwrap();

    let container = summary.container.unwrap();
    assert!(container.path().starts_with("/imports/"));
    assert!(
        dest.events()
            .iter()
            .any(|e| *e == DestinationEvent::Submit("a.jpg".to_string()))
    );
}

#[tokio::test]
async fn test_partial_failure_still_reports_everything() {
    let dest = Arc::new(
        SimulatedDestination::new()
            .with_script("b.jpg", Script::Never)
            .with_script("c.cr3", Script::FailAfter(0, "insufficient_space".to_string())),
    );
    let ctx = context("");

    let summary = runner(&ctx, shoot_store(), &dest).run("shoot").await.unwrap();
    let report = &summary.report;

    assert_eq!(report.len(), 3);
    assert!(!report.all_succeeded());
    assert_eq!(report.get("shoot/a.jpg").map(|e| &e.outcome), Some(&Outcome::Success));
    assert_eq!(report.get("shoot/b.jpg").map(|e| &e.outcome), Some(&Outcome::Timeout));
    assert_eq!(report.get("shoot/b.jpg").map(|e| e.polls), Some(10));
    assert_eq!(report.failed(), 1);
}
