//! Agent HTTP server.
//!
//! `GET /health` is unauthenticated. `POST /query` requires the
//! `X-Agent-Key` header; query failures are reported inside a 200 envelope,
//! credential failures as 401 and unparseable bodies as 400.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::QueryResponse;
use crate::auth::{CredentialStore, KEY_HEADER};
use crate::descriptor::QueryDescriptor;
use crate::error::{BridgeError, Result};
use crate::query::{HealthReport, QueryService};

/// Shared, read-only state for all requests.
pub struct AppState {
    pub service: QueryService,
    pub credentials: Arc<dyn CredentialStore>,
}

impl AppState {
    pub fn new(service: QueryService, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            service,
            credentials,
        }
    }
}

/// Builds the agent router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/query", post(query))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serves the router until Ctrl-C.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| BridgeError::internal(format!("Listener has no address: {e}")))?;
    info!("Agent listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
        .map_err(|e| BridgeError::internal(format!("Server error: {e}")))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.service.health().await)
}

async fn query(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: std::result::Result<Json<QueryDescriptor>, JsonRejection>,
) -> (StatusCode, Json<QueryResponse>) {
    let presented = headers
        .get(KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let credential = match state.credentials.verify(presented).await {
        Ok(credential) => credential,
        Err(e) => {
            warn!("Rejected request: {e}");
            return (StatusCode::UNAUTHORIZED, Json(QueryResponse::failure(&e)));
        }
    };

    let descriptor = match body {
        Ok(Json(descriptor)) => descriptor,
        Err(rejection) => {
            let e = BridgeError::bad_request(rejection.body_text());
            debug!(credential = credential.label(), "Malformed request: {e}");
            return (StatusCode::BAD_REQUEST, Json(QueryResponse::failure(&e)));
        }
    };

    debug!(credential = credential.label(), table = %descriptor.table, "Query received");
    match state.service.run(descriptor).await {
        Ok(result) => (StatusCode::OK, Json(QueryResponse::success(result))),
        Err(e) => {
            warn!(credential = credential.label(), kind = %e.kind(), "Query failed: {e}");
            (StatusCode::OK, Json(QueryResponse::failure(&e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_key, StaticCredentialStore};
    use crate::db::{ColumnInfo, MockDriver, RawResultSet, RawValue};
    use crate::guard::{Allowlist, AllowlistGuard};
    use crate::query::{IsolatedExecutor, ResultCoercer};
    use crate::sql::StatementBuilder;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value as JsonValue};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Router, String) {
        let driver = MockDriver::new(RawResultSet::with_data(
            vec![ColumnInfo::new("customer_id", "CHAR(10)")],
            vec![vec![RawValue::Text("1001 ".into())]],
        ));
        let service = QueryService::new(
            AllowlistGuard::new(Arc::new(Allowlist::new(["customer"])), 100),
            StatementBuilder::default(),
            IsolatedExecutor::new(Arc::new(driver), Duration::from_secs(5)),
            ResultCoercer::default(),
            "SELECT 1",
        );
        let key = generate_key(None);
        let store = StaticCredentialStore::new(vec![key.record]);
        (
            router(Arc::new(AppState::new(service, Arc::new(store)))),
            key.key,
        )
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, JsonValue) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_query(key: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header(KEY_HEADER, key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_query_success() {
        let (app, key) = app();
        let (status, body) = send(app, post_query(Some(&key), r#"{"table": "customer"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"success": true, "columns": ["customer_id"], "rows": [["1001"]], "row_count": 1})
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_401() {
        let (app, _) = app();
        let (status, body) = send(app, post_query(None, r#"{"table": "customer"}"#)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "auth");
    }

    #[tokio::test]
    async fn test_wrong_key_is_401() {
        let (app, _) = app();
        let (status, _) = send(app, post_query(Some("rbk_wrong"), r#"{"table": "customer"}"#)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let (app, key) = app();
        let (status, body) = send(app, post_query(Some(&key), r#"{"table": 42"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_kind"], "bad_request");
    }

    #[tokio::test]
    async fn test_validation_failure_is_200_envelope() {
        let (app, key) = app();
        let (status, body) = send(app, post_query(Some(&key), r#"{"table": "payroll"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "validation");
        assert!(body["error"].as_str().unwrap().contains("payroll"));
    }

    #[tokio::test]
    async fn test_health_needs_no_key() {
        let (app, _) = app();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database_connected"], true);
    }
}
