//! Shared fixture: an on-disk SQLite "ERP" database behind a full agent.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use rowbridge::auth::{generate_key, StaticCredentialStore, KEY_HEADER};
use rowbridge::config::Config;
use rowbridge::db::{driver_for, ResultSet};
use rowbridge::descriptor::QueryDescriptor;
use rowbridge::error::{BridgeError, Result};
use rowbridge::query::QueryService;
use rowbridge::transport::{router, AppState, QueryResponse, QueryTransport};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection};
use tempfile::TempDir;
use tower::ServiceExt;

/// Number of rows in the `customer` table.
pub const CUSTOMER_COUNT: usize = 25;

pub struct Fixture {
    _dir: TempDir,
    pub config: Config,
    pub key: String,
}

impl Fixture {
    /// Creates and seeds the database and an agent config pointing at it.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("erp.db");
        seed(&path).await;

        let key = generate_key(Some("integration".into()));
        let mut config = Config::default();
        config.database.url = format!("sqlite://{}", path.display());
        config.database.query_timeout_secs = 5;
        config.agent.max_page_size = 100;
        config.allowlist.tables = vec![
            "customer".into(),
            "orders".into(),
            "delivery_routes".into(),
        ];
        config.allowlist.columns.insert(
            "delivery_routes".into(),
            vec!["route_id".into(), "route_name".into()],
        );
        config.coercion.date_columns = vec!["order_date".into()];
        config.credentials = vec![key.record];

        Self {
            _dir: dir,
            config,
            key: key.key,
        }
    }

    pub fn service(&self) -> QueryService {
        let driver = driver_for(&self.config.database).unwrap();
        QueryService::from_config(&self.config, driver)
    }

    pub fn app(&self) -> Router {
        let store = StaticCredentialStore::new(self.config.credentials.clone());
        router(Arc::new(AppState::new(self.service(), Arc::new(store))))
    }

    pub fn transport(&self) -> RouterTransport {
        RouterTransport {
            app: self.app(),
            key: self.key.clone(),
            calls: AtomicUsize::new(0),
        }
    }
}

async fn seed(path: &std::path::Path) {
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .connect()
        .await
        .unwrap();

    let ddl = [
        "CREATE TABLE customer (customer_id CHAR(10), customer_name CHAR(30), route_id INTEGER, credit_limit REAL)",
        "CREATE TABLE delivery_routes (route_id INTEGER, route_name CHAR(20), driver_phone CHAR(12))",
        "CREATE TABLE orders (order_id INTEGER, customer_id CHAR(10), order_date CHAR(8), total REAL)",
        "INSERT INTO delivery_routes VALUES (1, 'North          ', '555-0100'), (2, 'South', '555-0101')",
        "INSERT INTO customer VALUES ('1001', 'ABC Glass Co        ', 1, 2500.0)",
        "INSERT INTO customer VALUES ('1002', 'XYZ Corp', 2, 0.0)",
        "INSERT INTO orders VALUES (501, '1001', '20240115', 120.5), (502, '1001', '18991230', 80.0), (503, '1003', '20231201', 15.25)",
    ];
    for statement in ddl {
        sqlx::query(statement).execute(&mut conn).await.unwrap();
    }
    for n in 3..=CUSTOMER_COUNT {
        sqlx::query("INSERT INTO customer VALUES (?, ?, ?, ?)")
            .bind(format!("{}", 1000 + n))
            .bind(format!("Customer {n}"))
            .bind((n % 2 + 1) as i64)
            .bind(100.0 * n as f64)
            .execute(&mut conn)
            .await
            .unwrap();
    }
    conn.close().await.unwrap();
}

/// Sends requests straight into the router, counting queries.
pub struct RouterTransport {
    app: Router,
    key: String,
    calls: AtomicUsize,
}

impl RouterTransport {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryTransport for RouterTransport {
    async fn query(&self, descriptor: &QueryDescriptor) -> Result<ResultSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let request = Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .header(KEY_HEADER, &self.key)
            .body(Body::from(serde_json::to_vec(descriptor).unwrap()))
            .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(BridgeError::auth("rejected"));
        }
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let envelope: QueryResponse = serde_json::from_slice(&bytes).unwrap();
        envelope.into_result()
    }
}

/// POSTs raw JSON to `/query` and returns status and body.
pub async fn post_json(app: Router, key: Option<&str>, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header(KEY_HEADER, key);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}
