//! End-to-end agent tests over a real SQLite database.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::common::{post_json, Fixture};

#[tokio::test]
async fn test_customer_lookup_envelope() {
    let fixture = Fixture::new().await;
    let (status, body) = post_json(
        fixture.app(),
        Some(&fixture.key),
        json!({
            "table": "customer",
            "columns": ["customer_id", "customer_name"],
            "filters": [{"column": "customer_id", "operator": "IN", "value": ["1001", "1002"]}],
            "order_by": [{"column": "customer_id"}],
            "limit": 10
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "success": true,
            "columns": ["customer_id", "customer_name"],
            "rows": [["1001", "ABC Glass Co"], ["1002", "XYZ Corp"]],
            "row_count": 2
        })
    );
}

#[tokio::test]
async fn test_join_with_explicit_columns() {
    let fixture = Fixture::new().await;
    let (_, body) = post_json(
        fixture.app(),
        Some(&fixture.key),
        json!({
            "table": "customer",
            "alias": "c",
            "columns": ["c.customer_id", "r.route_name"],
            "joins": [{
                "table": "delivery_routes", "alias": "r", "join_type": "INNER",
                "on_left": "c.route_id", "on_right": "r.route_id"
            }],
            "filters": [{"column": "c.customer_id", "operator": "=", "value": "1001"}]
        }),
    )
    .await;

    assert_eq!(body["success"], true, "{body}");
    assert_eq!(body["rows"], json!([["1001", "North"]]));
}

#[tokio::test]
async fn test_join_without_columns_is_rejected() {
    let fixture = Fixture::new().await;
    let (status, body) = post_json(
        fixture.app(),
        Some(&fixture.key),
        json!({
            "table": "customer",
            "alias": "c",
            "joins": [{"table": "delivery_routes", "alias": "r", "on_left": "c.route_id", "on_right": "r.route_id"}]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_kind"], "validation");
    assert!(body["error"].as_str().unwrap().contains("Columns required"));
}

#[tokio::test]
async fn test_restricted_column_is_rejected() {
    let fixture = Fixture::new().await;
    let (_, body) = post_json(
        fixture.app(),
        Some(&fixture.key),
        json!({"table": "delivery_routes", "columns": ["route_id", "driver_phone"]}),
    )
    .await;

    assert_eq!(body["error_kind"], "validation");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("delivery_routes.driver_phone"));
}

#[tokio::test]
async fn test_driver_error_is_reported_verbatim() {
    let fixture = Fixture::new().await;
    let (status, body) = post_json(
        fixture.app(),
        Some(&fixture.key),
        json!({"table": "customer", "columns": ["nonexistent_column"]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error_kind"], "driver");
    assert!(body["error"].as_str().unwrap().contains("nonexistent_column"));
}

#[tokio::test]
async fn test_injection_attempt_matches_nothing() {
    let fixture = Fixture::new().await;
    let (_, body) = post_json(
        fixture.app(),
        Some(&fixture.key),
        json!({
            "table": "customer",
            "columns": ["customer_id"],
            "filters": [{"column": "customer_name", "operator": "=", "value": "x' OR '1'='1"}]
        }),
    )
    .await;

    assert_eq!(body["success"], true);
    assert_eq!(body["row_count"], 0);
    assert_eq!(body["columns"], json!(["customer_id"]));
}

#[tokio::test]
async fn test_sentinel_dates_become_null() {
    let fixture = Fixture::new().await;
    let (_, body) = post_json(
        fixture.app(),
        Some(&fixture.key),
        json!({
            "table": "orders",
            "columns": ["order_id", "order_date", "total"],
            "filters": [{"column": "customer_id", "operator": "=", "value": "1001"}],
            "order_by": [{"column": "order_id"}]
        }),
    )
    .await;

    assert_eq!(body["rows"], json!([[501, "20240115", 120.5], [502, null, 80.0]]));
}

#[tokio::test]
async fn test_auth_failures_are_401() {
    let fixture = Fixture::new().await;
    let descriptor = json!({"table": "customer"});

    let (status, body) = post_json(fixture.app(), None, descriptor.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_kind"], "auth");

    let (status, _) = post_json(fixture.app(), Some("rbk_guessed-key"), descriptor).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_report() {
    let fixture = Fixture::new().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = fixture.app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database_connected"], true);
    assert_eq!(body["driver_available"], true);
    assert_eq!(body["test_query"], "SELECT 1");
    assert!(body["database"].as_str().unwrap().ends_with("(read-only)"));
}

#[tokio::test]
async fn test_health_reports_missing_database() {
    let mut fixture = Fixture::new().await;
    fixture.config.database.url = "sqlite:///nonexistent/dir/erp.db".into();

    let report = fixture.service().health().await;
    assert!(!report.is_healthy());
    assert!(!report.database_connected);
    assert!(report.message.is_some());
}
