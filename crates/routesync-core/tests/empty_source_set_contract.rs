//! Contract Test: Empty Source Set
//!
//! Constraints verified:
//! - An empty directory is a legitimate result, not a failure
//! - Routing tables end empty
//! - A running proxy is stopped and removed, and no configuration is written
//!
//! If this test fails, the last tenant leaving leaves stale routes behind.

mod common;

use common::*;
use routesync_core::model::ProxyOutcome;
use tempfile::tempdir;
use tokio_test::assert_ok;

#[tokio::test]
async fn empty_source_set_clears_tables_and_stops_proxy() {
    let dir = tempdir().unwrap();
    let destination = MemoryDestination::new(Vec::new());
    destination.seed_domains(&[("gone.example", "10.0.0.1")]);
    let harness = Harness::new(
        dir.path(),
        destination,
        ScriptedFetcher::new(),
        MockRuntime::new(true),
    );
    let (engine, _events) = harness.engine();

    let report = assert_ok!(engine.run_once().await);

    assert_eq!(report.sources_discovered, 0);
    assert!(harness.destination.domains().is_empty());
    assert_eq!(harness.destination.reset_calls(), 1);
    assert_eq!(harness.destination.status_calls(), 0);
    assert_eq!(harness.fetcher.calls(), 0);
    assert_eq!(harness.reloader.calls(), 1);

    assert_eq!(report.proxy, ProxyOutcome::Stopped);
    assert!(!harness.runtime.is_up());
    assert_eq!(harness.runtime.calls(), vec!["stop routesync-nginx"]);
    assert!(harness.rendered_config().is_none());
}

#[tokio::test]
async fn empty_source_set_with_no_proxy_does_nothing_to_the_runtime() {
    let dir = tempdir().unwrap();
    let harness = Harness::new(
        dir.path(),
        MemoryDestination::new(Vec::new()),
        ScriptedFetcher::new(),
        MockRuntime::new(false),
    );
    let (engine, _events) = harness.engine();

    let report = assert_ok!(engine.run_once().await);

    assert_eq!(report.proxy, ProxyOutcome::AlreadyStopped);
    assert!(harness.runtime.calls().is_empty());
}
