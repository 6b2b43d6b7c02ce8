use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use tempfile::TempDir;

use fairshare::{Application, RunOptions, ShutdownManager};
use fairshare_config::{AppConfig, AuditBackend};
use fairshare_domain::{
    AuditAction, AuditFilter, AvailabilityEvent, Clock, RosterRepository, WorkItem, Worker,
};
use fairshare_testing_utils::{fleet, uniform_routes, ManualClock, TestEnv};

fn write_json<T: serde::Serialize>(dir: &Path, name: &str, value: &T) -> String {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

fn config_with_feeds(dir: &Path, workers: &[Worker], items: &[WorkItem]) -> AppConfig {
    let mut config = AppConfig::default();
    config.feeds.workers_path = Some(write_json(dir, "workers.json", &workers));
    config.feeds.work_items_path = Some(write_json(dir, "work_items.json", &items));
    config.api.enabled = false;
    config.observability.metrics_enabled = false;
    config
}

async fn build(config: AppConfig) -> Application {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new());
    Application::with_clock(config, RunOptions { api_enabled: false }, clock)
        .await
        .unwrap()
}

async fn actions(app: &Application) -> Vec<AuditAction> {
    app.engine()
        .audit_query(AuditFilter::default())
        .stream()
        .map_ok(|entry| entry.action)
        .try_collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_bootstrap_publishes_uniform_baseline() {
    let dir = TempDir::new().unwrap();
    let config = config_with_feeds(dir.path(), &fleet(3, 0, 5), &uniform_routes(15, 1.0));
    let app = build(config).await;

    app.bootstrap().await.unwrap();

    let current = app.engine().get_current_assignment().await.unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(current.item_count(), 15);
    assert!(current.counts_by_worker().values().all(|count| *count == 5));
    assert!(current.snapshot.gini.abs() < 1e-9);
    assert_eq!(actions(&app).await, vec![AuditAction::BaselinePublished]);
}

#[tokio::test]
async fn test_bootstrap_survives_infeasible_roster() {
    let dir = TempDir::new().unwrap();
    let config = config_with_feeds(dir.path(), &fleet(3, 0, 5), &uniform_routes(20, 1.0));
    let app = build(config).await;

    app.bootstrap().await.unwrap();

    assert!(app.engine().get_current_assignment().await.is_err());
    assert_eq!(actions(&app).await, vec![AuditAction::OptimizationFailed]);
}

#[tokio::test]
async fn test_bootstrap_without_feeds_waits() {
    let app = build(AppConfig::default()).await;

    app.bootstrap().await.unwrap();

    assert!(app.engine().get_current_assignment().await.is_err());
    assert!(actions(&app).await.is_empty());
}

#[tokio::test]
async fn test_bootstrap_rejects_malformed_feed() {
    let dir = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    let path = dir.path().join("workers.json");
    std::fs::write(&path, "{ not json").unwrap();
    config.feeds.workers_path = Some(path.to_string_lossy().into_owned());
    let app = build(config).await;

    assert!(app.bootstrap().await.is_err());
}

#[tokio::test]
async fn test_sqlite_audit_survives_restart() {
    let dir = TempDir::new().unwrap();
    let mut config = config_with_feeds(dir.path(), &fleet(3, 0, 5), &uniform_routes(15, 1.0));
    config.storage.audit_backend = AuditBackend::Sqlite;
    config.storage.sqlite_url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("audit.db").to_string_lossy()
    );

    {
        let app = build(config.clone()).await;
        app.bootstrap().await.unwrap();
        assert_eq!(actions(&app).await, vec![AuditAction::BaselinePublished]);
    }

    // 基线只保存在内存中，重启后会重新求解并追加审计
    let restarted = build(config).await;
    restarted.bootstrap().await.unwrap();
    let history = actions(&restarted).await;
    assert_eq!(
        history,
        vec![AuditAction::BaselinePublished, AuditAction::BaselinePublished]
    );

    let page = restarted
        .engine()
        .get_audit_log(&AuditFilter::default(), None, 1)
        .await
        .unwrap();
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].subject, "baseline:1");
    assert!(page.next_cursor.is_some());
}

#[tokio::test]
async fn test_run_until_shutdown() {
    let dir = TempDir::new().unwrap();
    let mut config = config_with_feeds(dir.path(), &fleet(3, 0, 5), &uniform_routes(15, 1.0));
    config.scheduler.tick_interval_seconds = 1;
    config.marketplace.sweep_interval_seconds = 1;

    let app = Arc::new(build(config).await);
    app.bootstrap().await.unwrap();

    let shutdown = ShutdownManager::new();
    let handle = {
        let app = Arc::clone(&app);
        let rx = shutdown.subscribe().await;
        tokio::spawn(async move { app.run(rx).await })
    };

    let listener = app.engine().availability_listener();
    let scheduler = app.engine().scheduler();
    assert!(
        TestEnv::wait_for(
            || {
                let listener = listener.clone();
                let scheduler = scheduler.clone();
                async move { listener.is_running().await && scheduler.is_running().await }
            },
            Duration::from_secs(2),
        )
        .await
    );

    let sender = app.availability_sender();
    sender
        .send(AvailabilityEvent::suspended(
            "d-2",
            "请假",
            app.engine().context().clock.now(),
        ))
        .await
        .unwrap();
    let roster = app.engine().context().roster.clone();
    assert!(
        TestEnv::wait_for(
            || {
                let roster = roster.clone();
                async move {
                    roster
                        .get_worker("d-2")
                        .await
                        .ok()
                        .flatten()
                        .is_some_and(|w| w.is_suspended())
                }
            },
            Duration::from_secs(2),
        )
        .await
    );

    shutdown.shutdown().await;
    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("应用未能在超时内退出")
        .unwrap();
    assert!(result.is_ok());
    assert!(!listener.is_running().await);
    assert!(!scheduler.is_running().await);
}

#[tokio::test]
async fn test_run_twice_is_rejected() {
    let mut config = AppConfig::default();
    config.scheduler.enabled = false;
    config.marketplace.sweep_interval_seconds = 1;
    let app = Arc::new(build(config).await);
    let shutdown = ShutdownManager::new();

    let first = {
        let app = Arc::clone(&app);
        let rx = shutdown.subscribe().await;
        tokio::spawn(async move { app.run(rx).await })
    };
    let listener = app.engine().availability_listener();
    assert!(
        TestEnv::wait_for(
            || {
                let listener = listener.clone();
                async move { listener.is_running().await }
            },
            Duration::from_secs(2),
        )
        .await
    );

    let second = app.run(shutdown.subscribe().await).await;
    assert!(second.is_err());

    shutdown.shutdown().await;
    tokio::time::timeout(Duration::from_secs(10), first)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
