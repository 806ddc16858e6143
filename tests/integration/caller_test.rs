//! Caller-side helpers driven against a live agent.

use std::sync::Arc;
use std::time::Duration;

use rowbridge::caller::{BatchAssembler, PaginationProber, TotalEstimate};
use rowbridge::db::Value;
use rowbridge::descriptor::{FilterCondition, OrderBy, QueryDescriptor};
use rowbridge::error::ErrorKind;
use rowbridge::transport::{server, AgentClient, QueryTransport};

use super::common::{Fixture, CUSTOMER_COUNT};

fn customers_by_id() -> QueryDescriptor {
    QueryDescriptor::new("customer")
        .columns(["customer_id", "customer_name"])
        .order_by(OrderBy::asc("customer_id"))
}

#[tokio::test]
async fn test_paging_walks_every_customer_once() {
    let fixture = Fixture::new().await;
    let transport = fixture.transport();
    let prober = PaginationProber::new(&transport, 10);

    let first = prober.fetch_page(&customers_by_id(), 0).await.unwrap();
    assert_eq!(first.rows.len(), 10);
    assert!(first.has_next);
    assert_eq!(first.estimated_total, TotalEstimate::AtLeast(11));

    let last = prober.fetch_page(&customers_by_id(), 2).await.unwrap();
    assert_eq!(last.rows.len(), 5);
    assert!(!last.has_next);
    assert_eq!(last.estimated_total, TotalEstimate::Exact(CUSTOMER_COUNT as u64));

    let all = prober.fetch_all(&customers_by_id()).await.unwrap();
    assert_eq!(all.row_count, CUSTOMER_COUNT);
    let ids: Vec<String> = all
        .rows
        .iter()
        .map(|row| row[0].as_text().unwrap())
        .collect();
    let expected: Vec<String> = (1..=CUSTOMER_COUNT).map(|n| format!("{}", 1000 + n)).collect();
    assert_eq!(ids, expected);
    // two single-page fetches plus three pages for the full walk
    assert_eq!(transport.calls(), 5);
}

#[tokio::test]
async fn test_paging_an_empty_result() {
    let fixture = Fixture::new().await;
    let transport = fixture.transport();
    let descriptor = customers_by_id().filter(FilterCondition::eq("customer_id", "9999"));

    let page = PaginationProber::new(&transport, 10)
        .fetch_page(&descriptor, 0)
        .await
        .unwrap();
    assert!(page.rows.is_empty());
    assert!(!page.has_next);
    assert_eq!(page.estimated_total, TotalEstimate::Exact(0));
}

#[tokio::test]
async fn test_page_size_equal_to_agent_maximum_is_rejected() {
    let fixture = Fixture::new().await;
    let transport = fixture.transport();

    // the probe row pushes the limit to max_page_size + 1
    let err = PaginationProber::new(&transport, 100)
        .fetch_page(&customers_by_id(), 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let page = PaginationProber::new(&transport, 99)
        .fetch_page(&customers_by_id(), 0)
        .await
        .unwrap();
    assert_eq!(page.rows.len(), CUSTOMER_COUNT);
}

#[tokio::test]
async fn test_orders_batched_by_customer() {
    let fixture = Fixture::new().await;
    let transport = fixture.transport();
    let template = QueryDescriptor::new("orders")
        .columns(["order_id", "customer_id", "total"])
        .order_by(OrderBy::asc("order_id"));

    let related = BatchAssembler::new(&transport)
        .with_max_rows(50)
        .fetch_related(["1001", "1002", "1003", "1001"], &template, "customer_id")
        .await
        .unwrap();

    assert_eq!(transport.calls(), 1);
    assert_eq!(related.parent_ids(), vec!["1001", "1003"]);
    assert_eq!(related.get("1001").unwrap().len(), 2);
    assert_eq!(related.get("1003").unwrap()[0][0], Value::Int(503));
    assert!(related.get("1002").is_none());
}

#[tokio::test]
async fn test_batch_never_drops_rows_at_the_agent_cap() {
    let mut fixture = Fixture::new().await;
    fixture.config.agent.max_page_size = 2;
    let transport = fixture.transport();
    let template = QueryDescriptor::new("orders")
        .columns(["order_id", "customer_id"])
        .order_by(OrderBy::asc("order_id"));

    // 1001 has two orders and 1003 one: three rows against a ceiling of one
    let err = BatchAssembler::new(&transport)
        .with_max_rows(1)
        .fetch_related(["1001", "1003"], &template, "customer_id")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    // the default ceiling cannot be served by this agent at all
    let err = BatchAssembler::new(&transport)
        .fetch_related(["1001", "1003"], &template, "customer_id")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let related = BatchAssembler::new(&transport)
        .with_max_rows(1)
        .fetch_related(["1003"], &template, "customer_id")
        .await
        .unwrap();
    assert_eq!(related.parent_ids(), vec!["1003"]);
}

#[tokio::test]
async fn test_empty_batch_issues_no_query() {
    let fixture = Fixture::new().await;
    let transport = fixture.transport();
    let template = QueryDescriptor::new("orders").columns(["order_id", "customer_id"]);

    let related = BatchAssembler::new(&transport)
        .fetch_related(Vec::<String>::new(), &template, "customer_id")
        .await
        .unwrap();

    assert!(related.is_empty());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_agent_client_over_a_socket() {
    let fixture = Fixture::new().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = fixture.app();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let base = format!("http://{addr}");
    let client = AgentClient::new(&base, fixture.key.clone(), Duration::from_secs(5)).unwrap();
    assert!(client.is_healthy().await);

    let result = client
        .query(&customers_by_id().filter(FilterCondition::eq("customer_id", "1002")))
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["customer_id", "customer_name"]);
    assert_eq!(result.rows, vec![vec![Value::from("1002"), Value::from("XYZ Corp")]]);

    let intruder = AgentClient::new(&base, "rbk_not-a-real-key", Duration::from_secs(5)).unwrap();
    let err = intruder.query(&customers_by_id()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);

    let err = client
        .query(&QueryDescriptor::new("payroll"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().contains("payroll"));
}

#[tokio::test]
async fn test_server_shutdown_helper_accepts_listener() {
    // serve() only returns on ctrl-c; check it starts and answers health.
    let fixture = Fixture::new().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store = rowbridge::auth::StaticCredentialStore::new(fixture.config.credentials.clone());
    let state = Arc::new(server::AppState::new(fixture.service(), Arc::new(store)));
    tokio::spawn(server::serve(listener, state));

    let client = AgentClient::new(&format!("http://{addr}"), fixture.key.clone(), Duration::from_secs(5)).unwrap();
    let report = client.health().await.unwrap();
    assert!(report.is_healthy());
}

#[tokio::test]
async fn test_agent_client_behind_a_path_prefix() {
    let fixture = Fixture::new().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = axum::Router::new().nest("/agent", fixture.app());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = AgentClient::new(&format!("http://{addr}/agent"), fixture.key.clone(), Duration::from_secs(5)).unwrap();
    assert!(client.is_healthy().await);

    let result = client
        .query(&customers_by_id().filter(FilterCondition::eq("customer_id", "1001")))
        .await
        .unwrap();
    assert_eq!(result.rows, vec![vec![Value::from("1001"), Value::from("ABC Glass Co")]]);
}
