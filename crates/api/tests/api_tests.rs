use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use fairshare_api::{create_app, AppState};
use fairshare_config::{ApiConfig, MarketplaceConfig, SchedulerConfig, SolverConfig};
use fairshare_domain::{Availability, RosterRepository};
use fairshare_engine::{EngineContext, FairnessEngine, LoadModel, Repositories};
use fairshare_infrastructure::{
    InMemoryAuditRepository, InMemoryBaselineRepository, InMemoryProposalRepository,
    InMemoryRosterRepository,
};
use fairshare_observability::MetricsCollector;
use fairshare_testing_utils::{fleet, uniform_routes, ManualClock, RecordingAlertChannel, TestEnv};

struct TestApp {
    router: Router,
    engine: FairnessEngine,
    roster: Arc<InMemoryRosterRepository>,
}

impl TestApp {
    async fn spawn(routes: usize) -> Self {
        let roster = Arc::new(InMemoryRosterRepository::default());
        let ctx = EngineContext::new(
            Repositories {
                roster: roster.clone(),
                proposals: Arc::new(InMemoryProposalRepository::new()),
                baselines: Arc::new(InMemoryBaselineRepository::new()),
                audit: Arc::new(InMemoryAuditRepository::new()),
            },
            Arc::new(ManualClock::new()),
            Arc::new(MetricsCollector::new().unwrap()),
            Arc::new(RecordingAlertChannel::new()),
            LoadModel::default(),
        );
        let engine = FairnessEngine::new(
            ctx,
            SolverConfig::default(),
            SchedulerConfig::default(),
            MarketplaceConfig::default(),
        )
        .unwrap();
        engine
            .load_roster(fleet(3, 0, 5), uniform_routes(routes, 50.0), None)
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(16);
        let listener = engine.availability_listener();
        tokio::spawn(async move { listener.listen(rx).await });

        let state = AppState {
            engine: engine.clone(),
            availability: tx,
        };
        Self {
            router: create_app(state, &ApiConfig::default()),
            engine,
            roster,
        }
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Worker当前持有的第一条路线
    async fn item_of(&self, worker: &str) -> String {
        let current = self.engine.get_current_assignment().await.unwrap();
        let item = current.items_of(worker).next().unwrap().to_string();
        item
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::spawn(15).await;
    let (status, json) = app.call("GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "fairshare");
    assert!(json["baseline"].is_null());

    app.call("POST", "/api/optimization/run", None).await;
    let (_, json) = app.call("GET", "/health", None).await;
    assert_eq!(json["baseline"]["version"], 1);
}

#[tokio::test]
async fn test_assignment_lifecycle() {
    let app = TestApp::spawn(15).await;

    let (status, json) = app.call("GET", "/api/assignment/current", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
    assert_eq!(json["data"]["type"], "NO_BASELINE");

    let (status, json) = app.call("POST", "/api/optimization/run", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["version"], 1);
    assert!(json["data"]["gini_after"].as_f64().unwrap() < 1e-9);

    let (status, json) = app.call("GET", "/api/assignment/current", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["version"], 1);
    assert_eq!(json["data"]["placements"].as_object().unwrap().len(), 15);

    let (status, _) = app.call("GET", "/api/assignment/7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = app.call("GET", "/api/fairness/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_infeasible_run_maps_to_422() {
    let app = TestApp::spawn(20).await;

    let (status, json) = app.call("POST", "/api/optimization/run", None).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["data"]["type"], "INFEASIBLE");
    let binding = json["data"]["binding"].as_array().unwrap();
    assert!(binding.iter().any(|b| b["kind"] == "capacity"));
}

#[tokio::test]
async fn test_swap_endpoints() {
    let app = TestApp::spawn(15).await;
    app.call("POST", "/api/optimization/run", None).await;
    let item = app.item_of("d-1").await;

    let (status, json) = app
        .call(
            "POST",
            "/api/swaps",
            Some(json!({
                "from_worker": "d-1",
                "to_worker": "d-2",
                "from_items": [item],
                "reason": "家里有事"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["state"], "pending");
    let id = json["data"]["id"].as_str().unwrap().to_string();

    let (status, json) = app.call("GET", &format!("/api/swaps/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["from_worker"], "d-1");

    let (status, json) = app.call("GET", "/api/swaps?worker_id=d-2&state=pending", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    let (status, _) = app.call("GET", "/api/swaps?state=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = app
        .call(
            "POST",
            &format!("/api/swaps/{id}/respond"),
            Some(json!({"responder": "d-3", "decision": "accept"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["success"], false);

    let (status, _) = app
        .call(
            "POST",
            &format!("/api/swaps/{id}/cancel"),
            Some(json!({"actor": "nobody"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = app
        .call(
            "POST",
            &format!("/api/swaps/{id}/respond"),
            Some(json!({"responder": "d-2", "decision": "reject"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["state"], "rejected");
    assert_eq!(json["data"]["rejection"]["type"], "counterparty_declined");

    let (status, json) = app
        .call(
            "POST",
            &format!("/api/swaps/{id}/cancel"),
            Some(json!({"actor": "worker:d-1"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["data"]["type"], "INVALID_TRANSITION");

    let (status, _) = app
        .call("GET", &format!("/api/swaps/{}", uuid::Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_swap_request() {
    let app = TestApp::spawn(15).await;
    app.call("POST", "/api/optimization/run", None).await;

    let (status, json) = app
        .call(
            "POST",
            "/api/swaps",
            Some(json!({"from_worker": "d-1", "to_worker": "d-1", "from_items": ["r-01"]})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["type"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_audit_paging() {
    let app = TestApp::spawn(15).await;
    app.call("POST", "/api/optimization/run", None).await;
    app.call("POST", "/api/optimization/run", None).await;

    let (status, json) = app
        .call("GET", "/api/audit?action=baseline_published&page_size=1", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["entries"].as_array().unwrap().len(), 1);
    let cursor = json["data"]["next_cursor"].as_u64().unwrap();

    let (status, json) = app
        .call(
            "GET",
            &format!("/api/audit?action=baseline_published&page_size=1&page={cursor}"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["entries"][0]["subject"], "baseline:2");

    let (status, _) = app.call("GET", "/api/audit?page_size=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.call("GET", "/api/audit?action=unknown", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_availability_report_is_applied_by_listener() {
    let app = TestApp::spawn(15).await;

    let (status, json) = app
        .call(
            "POST",
            "/api/workers/d-2/availability",
            Some(json!({"availability": "suspended", "reason": "疲劳"})),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["data"]["worker_id"], "d-2");

    let roster = app.roster.clone();
    assert!(
        TestEnv::wait_for(
            || {
                let roster = roster.clone();
                async move {
                    matches!(
                        roster.get_worker("d-2").await,
                        Ok(Some(w)) if w.availability == Availability::Suspended
                    )
                }
            },
            Duration::from_secs(2),
        )
        .await
    );

    let (status, _) = app
        .call(
            "POST",
            "/api/workers/d-99/availability",
            Some(json!({"availability": "suspended"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = app.call("GET", "/api/workers", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 3);
}
