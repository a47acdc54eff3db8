//! Data Gateway behavior: caching, invalidation, failure taxonomy, and the
//! REST backend's wire mapping.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fieldgate_core::config::{BackendConfig, CacheConfig};
use fieldgate_core::prelude::*;
use fieldgate_core::store::ProfileStore;

fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn memory_gateway() -> (DataGateway, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let gateway = DataGateway::new(backend.clone(), &CacheConfig::default());
    (gateway, backend)
}

// ─────────────────────────────────────────────────────────────────────────────
// Caching semantics
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn equivalent_options_share_one_cache_entry() {
    let (gateway, _) = memory_gateway();

    // Same query, one with noise filters that carry no constraint.
    let plain = QueryOptions::new().filter("status", json!("pending"));
    let noisy = QueryOptions::new()
        .filter("status", json!("pending"))
        .filter("region", json!(""))
        .filter("city", serde_json::Value::Null);

    gateway.list("orders", &plain).await.unwrap();
    gateway.list("orders", &noisy).await.unwrap();

    let stats = gateway.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.entries, 1);
}

#[tokio::test]
async fn writes_flag_every_key_for_the_resource() {
    let (gateway, _) = memory_gateway();

    gateway
        .create("dealers", record(&[("name", json!("Acme")), ("city", json!("Pune"))]))
        .await
        .unwrap();

    let all = QueryOptions::new();
    let pune = QueryOptions::new().filter("city", json!("Pune"));
    let limited = QueryOptions::new().limit(5);
    for opts in [&all, &pune, &limited] {
        gateway.list("dealers", opts).await.unwrap();
    }
    gateway.list("farmers", &all).await.unwrap();

    gateway
        .create("dealers", record(&[("name", json!("Bharat"))]))
        .await
        .unwrap();

    // All three dealer keys are stale now; the farmers key is not.
    for opts in [&all, &pune, &limited] {
        let before = gateway.cache_stats().stale_hits;
        gateway.list("dealers", opts).await.unwrap();
        assert_eq!(gateway.cache_stats().stale_hits, before + 1);
    }

    gateway.list("farmers", &all).await.unwrap();
    assert_eq!(
        gateway.cache_stats().hits,
        1,
        "cross-resource entry stays fresh"
    );
}

#[tokio::test]
async fn stale_reads_converge_after_background_refresh() {
    let (gateway, _) = memory_gateway();
    let opts = QueryOptions::new();

    gateway
        .create("orders", record(&[("status", json!("pending"))]))
        .await
        .unwrap();
    gateway.list("orders", &opts).await.unwrap();

    gateway
        .create("orders", record(&[("status", json!("pending"))]))
        .await
        .unwrap();

    // The first post-write read serves the stale snapshot.
    let stale = gateway.list("orders", &opts).await.unwrap();
    assert_eq!(stale.len(), 1);

    // Eventually consistent: the spawned refresh lands.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let fresh = gateway.list("orders", &opts).await.unwrap();
    assert_eq!(fresh.len(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure taxonomy
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn row_level_policy_rejection_is_permission_denied() {
    let backend = Arc::new(MemoryBackend::new());
    backend.deny_writes("orders");
    let gateway = DataGateway::new(backend.clone(), &CacheConfig::default());

    let err = gateway
        .create("orders", record(&[("status", json!("pending"))]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);
    assert_eq!(err.user_message(), "Permission denied by security policy");
    assert!(!err.is_retryable());

    // Reads still work on the denied resource.
    gateway.list("orders", &QueryOptions::new()).await.unwrap();
}

#[tokio::test]
async fn unique_constraint_rejection_is_constraint_violation() {
    let backend = Arc::new(MemoryBackend::new());
    backend.require_unique("dealers", "phone");
    let gateway = DataGateway::new(backend, &CacheConfig::default());

    gateway
        .create("dealers", record(&[("phone", json!("111"))]))
        .await
        .unwrap();
    let err = gateway
        .create("dealers", record(&[("phone", json!("111"))]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConstraintViolation);
}

// ─────────────────────────────────────────────────────────────────────────────
// REST backend wire mapping
// ─────────────────────────────────────────────────────────────────────────────

fn rest_backend(server: &MockServer) -> RestBackend {
    RestBackend::new(&BackendConfig {
        url: server.uri(),
        anon_key: "anon-key".to_string(),
        request_timeout_secs: 5,
    })
    .unwrap()
}

#[tokio::test]
async fn rest_list_renders_postgrest_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/orders"))
        .and(query_param("select", "*"))
        .and(query_param("status", "eq.pending"))
        .and(query_param("order", "created_at.desc"))
        .and(query_param("limit", "20"))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "o-1"}])))
        .expect(1)
        .mount(&server)
        .await;

    let backend = rest_backend(&server);
    let rows = backend
        .list(
            "orders",
            &QueryOptions::new()
                .filter("status", json!("pending"))
                .filter("region", json!("")) // dropped before the wire
                .order_by("created_at", false)
                .limit(20),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn rest_insert_returns_representation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/dealers"))
        .and(header("Prefer", "return=representation"))
        .and(body_json(json!([{"name": "Acme"}])))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!([{"id": "d-1", "name": "Acme"}])),
        )
        .mount(&server)
        .await;

    let backend = rest_backend(&server);
    let row = backend
        .insert("dealers", record(&[("name", json!("Acme"))]))
        .await
        .unwrap();
    assert_eq!(row.get("id"), Some(&json!("d-1")));
}

#[tokio::test]
async fn rest_maps_rls_body_to_permission_denied() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/orders"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "message": "new row violates row-level security policy for table \"orders\""
        })))
        .mount(&server)
        .await;

    let backend = rest_backend(&server);
    let err = backend
        .insert("orders", record(&[("status", json!("pending"))]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);
    assert_eq!(err.user_message(), "Permission denied by security policy");
}

#[tokio::test]
async fn rest_maps_duplicate_key_to_constraint_violation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/dealers"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint"
        })))
        .mount(&server)
        .await;

    let backend = rest_backend(&server);
    let err = backend
        .insert("dealers", record(&[("phone", json!("111"))]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ConstraintViolation);
}

#[tokio::test]
async fn rest_sign_in_stores_bearer_for_later_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "user-token",
            "user": {"id": "subject-1"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/profiles"))
        .and(query_param("id", "eq.subject-1"))
        .and(header("Authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "subject-1",
            "email": "sales@demo.test",
            "role": "sales_officer",
            "department": "sales"
        }])))
        .mount(&server)
        .await;

    let backend = rest_backend(&server);
    let subject = backend.sign_in("sales@demo.test", "pw").await.unwrap();
    assert_eq!(subject.as_str(), "subject-1");

    let profile = backend.get_by_id(subject.as_str()).await.unwrap().unwrap();
    assert_eq!(profile.role.as_deref(), Some("sales_officer"));
}

#[tokio::test]
async fn rest_sign_in_rejection_is_authentication_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let backend = rest_backend(&server);
    let err = backend.sign_in("sales@demo.test", "wrong").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthenticationFailed);
}

#[tokio::test]
async fn rest_upload_returns_public_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/storage/v1/object/imports/farmers/upload.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Key": "ok"})))
        .mount(&server)
        .await;

    let backend = rest_backend(&server);
    let url = backend
        .upload("imports", "farmers/upload.csv", b"name\nRamesh\n")
        .await
        .unwrap();
    assert_eq!(
        url,
        format!(
            "{}/storage/v1/object/public/imports/farmers/upload.csv",
            server.uri()
        )
    );
}

#[tokio::test]
async fn rest_network_failure_is_retryable() {
    // Nothing listening on this port.
    let backend = RestBackend::new(&BackendConfig {
        url: "http://127.0.0.1:9".to_string(),
        anon_key: "anon-key".to_string(),
        request_timeout_secs: 1,
    })
    .unwrap();

    let err = backend
        .list("orders", &QueryOptions::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NetworkError);
    assert!(err.is_retryable());
}
