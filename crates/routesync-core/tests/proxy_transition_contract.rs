//! Contract Test: Proxy Transitions
//!
//! Constraints verified:
//! - Absent proxy + sources: configuration rendered, proxy started with mounts
//! - Running proxy + sources: configuration re-rendered, proxy reloaded in place
//! - Running proxy + no sources: proxy stopped
//! - The configuration reflects the addresses discovered at the start of the run
//!
//! If this test fails, HTTP routing drifts from the tenant set.

mod common;

use common::*;
use routesync_core::config::EngineConfig;
use routesync_core::error::Result;
use routesync_core::model::{ProxyOutcome, SourceRecord};
use routesync_core::traits::DomainFetcher;
use routesync_core::{ProxyReconciler, SyncEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use tokio_test::assert_ok;

#[tokio::test]
async fn absent_proxy_is_started_with_one_server_line() {
    let dir = tempdir().unwrap();
    let harness = Harness::new(
        dir.path(),
        MemoryDestination::new(vec![source(1, "10.0.0.1")]),
        ScriptedFetcher::new().with("10.0.0.1", &["a.example"]),
        MockRuntime::new(false),
    );
    let (engine, _events) = harness.engine();

    let report = assert_ok!(engine.run_once().await);

    assert_eq!(report.proxy, ProxyOutcome::Started { servers: 1 });
    assert!(harness.runtime.is_up());
    assert_eq!(
        harness.rendered_config().unwrap(),
        "upstream pbx {\nserver 10.0.0.1;\n}\n"
    );

    let spec = harness.runtime.last_spec().expect("container was started");
    assert_eq!(spec.name, "routesync-nginx");
    assert_eq!(spec.image, "nginx:latest");
    assert_eq!((spec.ports[0].host, spec.ports[0].container), (80, 80));
    assert_eq!(spec.mounts[0].target, "/etc/nginx/conf.d/default.conf");
    assert_eq!(spec.mounts[1].target, "/etc/nginx/html");
}

#[tokio::test]
async fn running_proxy_is_reloaded_then_stopped_when_sources_vanish() {
    let dir = tempdir().unwrap();
    let harness = Harness::new(
        dir.path(),
        MemoryDestination::new(vec![source(1, "10.0.0.1"), source(2, "10.0.0.2")]),
        ScriptedFetcher::new().with("10.0.0.1", &["a.example"]),
        MockRuntime::new(true),
    );
    let (engine, _events) = harness.engine();

    let report = assert_ok!(engine.run_once().await);
    assert_eq!(report.proxy, ProxyOutcome::Reloaded { servers: 2 });
    assert_eq!(
        harness.rendered_config().unwrap(),
        "upstream pbx {\nserver 10.0.0.1;\nserver 10.0.0.2;\n}\n"
    );

    harness.destination.set_sources(Vec::new());
    let report = assert_ok!(engine.run_once().await);
    assert_eq!(report.proxy, ProxyOutcome::Stopped);

    assert_eq!(
        harness.runtime.calls(),
        vec!["exec routesync-nginx nginx -s reload", "stop routesync-nginx"]
    );
}

#[tokio::test]
async fn duplicate_addresses_are_listed_once() {
    let dir = tempdir().unwrap();
    let harness = Harness::new(
        dir.path(),
        MemoryDestination::new(vec![
            source(1, "10.0.0.1"),
            source(2, "10.0.0.2"),
            source(3, "10.0.0.1"),
        ]),
        ScriptedFetcher::new()
            .with("10.0.0.1", &["a.example"])
            .with("10.0.0.2", &["b.example"]),
        MockRuntime::new(false),
    );
    let (engine, _events) = harness.engine();

    let report = assert_ok!(engine.run_once().await);

    assert_eq!(report.proxy, ProxyOutcome::Started { servers: 2 });
    assert_eq!(
        harness.rendered_config().unwrap(),
        "upstream pbx {\nserver 10.0.0.1;\nserver 10.0.0.2;\n}\n"
    );
    // every source still has its own status row
    assert_eq!(harness.destination.status_count(), 3);
}

#[tokio::test]
async fn proxy_failure_is_reported_but_not_fatal() {
    let dir = tempdir().unwrap();
    let harness = Harness::new(
        dir.path(),
        MemoryDestination::new(vec![source(1, "10.0.0.1")]),
        ScriptedFetcher::new().with("10.0.0.1", &["a.example"]),
        MockRuntime::new(false),
    );
    std::fs::remove_file(&harness.proxy.template_path).unwrap();
    let (engine, _events) = harness.engine();

    let report = assert_ok!(engine.run_once().await);

    assert!(matches!(report.proxy, ProxyOutcome::Failed { .. }));
    assert!(report.reloaded);
    assert_eq!(harness.destination.domain_names(), vec!["a.example"]);
    assert!(harness.runtime.calls().is_empty());
}

#[tokio::test]
async fn engine_without_proxy_skips_reconciliation() {
    let dir = tempdir().unwrap();
    let harness = Harness::new(
        dir.path(),
        MemoryDestination::new(vec![source(1, "10.0.0.1")]),
        ScriptedFetcher::new().with("10.0.0.1", &["a.example"]),
        MockRuntime::new(false),
    );
    let (engine, _events) = SyncEngine::builder()
        .lock(harness.lock.clone())
        .destination(Arc::clone(&harness.destination))
        .fetcher(harness.fetcher.clone())
        .reloader(harness.reloader.clone())
        .build(&EngineConfig::default())
        .unwrap();

    let report = assert_ok!(engine.run_once().await);

    assert_eq!(report.proxy, ProxyOutcome::Skipped);
    assert!(harness.runtime.calls().is_empty());
    assert!(harness.rendered_config().is_none());
}

/// Fetcher that registers one more source in the directory on its first call
struct GrowingFetcher {
    destination: Arc<MemoryDestination>,
    grown: Vec<SourceRecord>,
    added: AtomicBool,
}

#[async_trait::async_trait]
impl DomainFetcher for GrowingFetcher {
    async fn enabled_domains(&self, source: &SourceRecord) -> Result<Vec<String>> {
        if !self.added.swap(true, Ordering::SeqCst) {
            self.destination.set_sources(self.grown.clone());
        }
        Ok(vec![format!("tenant{}.example", source.id)])
    }

    fn fetcher_name(&self) -> &'static str {
        "growing"
    }
}

#[tokio::test]
async fn source_added_mid_run_waits_for_the_next_run() {
    let dir = tempdir().unwrap();
    let harness = Harness::new(
        dir.path(),
        MemoryDestination::new(vec![source(1, "10.0.0.1")]),
        ScriptedFetcher::new(),
        MockRuntime::new(false),
    );
    let fetcher = Arc::new(GrowingFetcher {
        destination: Arc::clone(&harness.destination),
        grown: vec![source(1, "10.0.0.1"), source(2, "10.0.0.2")],
        added: AtomicBool::new(false),
    });
    let (engine, _events) = SyncEngine::builder()
        .lock(harness.lock.clone())
        .destination(Arc::clone(&harness.destination))
        .fetcher(fetcher)
        .reloader(harness.reloader.clone())
        .proxy(ProxyReconciler::new(
            harness.proxy.clone(),
            Box::new(harness.runtime.clone()),
        ))
        .build(&EngineConfig::default())
        .unwrap();

    let report = assert_ok!(engine.run_once().await);

    assert_eq!(report.sources_discovered, 1);
    assert_eq!(report.proxy, ProxyOutcome::Started { servers: 1 });
    assert_eq!(
        harness.rendered_config().unwrap(),
        "upstream pbx {\nserver 10.0.0.1;\n}\n"
    );
    assert_eq!(harness.destination.domain_names(), vec!["tenant1.example"]);
    assert!(harness.destination.status(2).is_none());

    let report = assert_ok!(engine.run_once().await);

    assert_eq!(report.sources_discovered, 2);
    assert_eq!(report.proxy, ProxyOutcome::Reloaded { servers: 2 });
    assert_eq!(
        harness.rendered_config().unwrap(),
        "upstream pbx {\nserver 10.0.0.1;\nserver 10.0.0.2;\n}\n"
    );
    assert_eq!(
        harness.destination.domain_names(),
        vec!["tenant1.example", "tenant2.example"]
    );
}
