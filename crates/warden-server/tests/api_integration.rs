//! HTTP API integration tests: every endpoint against a mock upstream.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

use warden_audit::AuditLog;
use warden_config::{ServerConfig, WardenConfig};
use warden_gateway::Gateway;
use warden_upstream::{MockFault, MockUpstream};

fn setup_with(config: WardenConfig, upstream: MockUpstream) -> (axum::Router, Arc<Gateway>) {
    let (log, _) = AuditLog::in_memory();
    let gateway = Arc::new(Gateway::new(&config, Arc::new(upstream), Arc::new(log)));
    let router = warden_server::build_router(gateway.clone(), config.server.clone());
    (router, gateway)
}

fn setup() -> (axum::Router, Arc<Gateway>) {
    let mut config = WardenConfig::default();
    config.retry.backoff_ms = 5;
    setup_with(config, MockUpstream::new("mock"))
}

/// Helper to read the full body bytes from a response.
async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn plan(caller: &str) -> serde_json::Value {
    serde_json::json!({
        "callerId": caller,
        "correlationId": "corr-42",
        "actions": [
            { "actionId": "r", "actionType": "generate_report", "budgetImpact": 10.0 },
            { "actionId": "e", "actionType": "send_email", "templateId": "weekly_digest" }
        ]
    })
}

// ── Health & Metrics ───────────────────────────────────────────

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = setup();
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["breaker"], "closed");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup();
    let resp = app
        .clone()
        .oneshot(post_json("/v1/plans", plan("agent-1")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let ct = resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(ct.contains("text/plain"));
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(body.contains("warden_submissions_total 1"));
    assert!(body.contains("warden_dispositions_total{status=\"Approved\"} 1"));
    assert!(body.contains("warden_breaker_state 0"));
}

// ── Plans ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_submit_plan() {
    let (app, _) = setup();
    let resp = app
        .oneshot(post_json("/v1/plans", plan("agent-1")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "Approved");
    assert_eq!(json["correlationId"], "corr-42");
    assert_eq!(json["actions"][0]["tier"], "Tier1Safe");
    assert_eq!(json["actions"][1]["tier"], "Tier2Constrained");
    assert_eq!(json["actions"][1]["autoExecutable"], true);
    assert_eq!(json["executionSummary"]["tier1Executed"], 1);
    assert_eq!(json["executionSummary"]["tier2Executed"], 1);
    assert!(json["latencyMs"].is_u64());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_submit_plan_malformed_body() {
    let (app, _) = setup();
    let resp = app
        .oneshot(post_json("/v1/plans", serde_json::json!({ "actions": [] })))
        .await
        .unwrap();
    // Missing required field "callerId"
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_budget_exceeded_is_429() {
    let mut config = WardenConfig::default();
    config.budget.daily_limit = 5.0;
    let (app, _) = setup_with(config, MockUpstream::new("mock"));
    let resp = app
        .oneshot(post_json("/v1/plans", plan("agent-1")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    let json = body_json(resp).await;
    assert_eq!(json["kind"], "budget_exceeded");
    assert!(json["error"].as_str().unwrap().contains("daily_budget"));
}

#[tokio::test]
async fn test_upstream_down_is_503() {
    let mut config = WardenConfig::default();
    config.retry.backoff_ms = 5;
    let upstream = MockUpstream::new("mock");
    upstream.set_refine_fault(Some(MockFault::ServerError(500)));
    let (app, gateway) = setup_with(config, upstream);

    for _ in 0..4 {
        let resp = app
            .clone()
            .oneshot(post_json("/v1/plans", plan("agent-1")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(resp).await;
        assert_eq!(json["kind"], "service_unavailable");
    }
    assert!(!gateway.breaker().can_proceed());

    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["breaker"], "open");
}

// ── Breaker, budget, kill switch ───────────────────────────────

#[tokio::test]
async fn test_breaker_snapshot() {
    let (app, _) = setup();
    let resp = app
        .oneshot(Request::get("/v1/breaker").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["state"], "Closed");
    assert_eq!(json["failureThreshold"], 3);
}

#[tokio::test]
async fn test_budget_lookup() {
    let (app, _) = setup();

    let resp = app
        .clone()
        .oneshot(Request::get("/v1/budget/agent-1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["kind"], "not_found");

    app.clone()
        .oneshot(post_json("/v1/plans", plan("agent-1")))
        .await
        .unwrap();

    let resp = app
        .oneshot(Request::get("/v1/budget/agent-1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["callerId"], "agent-1");
    assert_eq!(json["day"]["used"], 10.0);
    assert_eq!(json["month"]["used"], 10.0);
}

#[tokio::test]
async fn test_kill_switch_endpoint() {
    let (app, gateway) = setup();
    let resp = app
        .clone()
        .oneshot(post_json("/v1/kill-switch", serde_json::json!({ "active": true })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["active"], true);
    assert_eq!(json["previous"], false);
    assert!(gateway.kill_switch().is_active());

    let resp = app
        .oneshot(post_json("/v1/plans", plan("agent-1")))
        .await
        .unwrap();
    let json = body_json(resp).await;
    assert_eq!(json["status"], "SimulationOnly");
    assert_eq!(json["executionSummary"]["tier1Executed"], 0);
}

// ── Background cleanup ─────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_cleanup_task_evicts_idle_callers() {
    let mut config = WardenConfig::default();
    config.policy.allowed_callers = vec!["agent-1".into()];
    let (app, gateway) = setup_with(config, MockUpstream::new("mock"));

    let resp = app
        .oneshot(post_json("/v1/plans", plan("stranger")))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["status"], "Blocked");
    assert_eq!(gateway.budget().tracked_callers(), 1);

    let task = warden_server::spawn_cleanup(gateway.clone(), warden_server::CLEANUP_INTERVAL);
    tokio::time::sleep(warden_server::CLEANUP_INTERVAL / 2).await;
    assert_eq!(gateway.budget().tracked_callers(), 1);
    tokio::time::sleep(warden_server::CLEANUP_INTERVAL).await;
    assert_eq!(gateway.budget().tracked_callers(), 0);
    task.abort();
}

// ── Auth ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_api_key_required() {
    let mut config = WardenConfig::default();
    config.server = ServerConfig {
        api_key: Some("s3cret".into()),
        ..Default::default()
    };
    let (app, _) = setup_with(config, MockUpstream::new("mock"));

    let resp = app
        .clone()
        .oneshot(Request::get("/v1/breaker").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(
            Request::get("/v1/breaker")
                .header("authorization", "Bearer s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Health stays open.
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
