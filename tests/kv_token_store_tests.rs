use chrono::Utc;
use opencharacter::{
    config::KvConfig,
    models::MagicLinkPayload,
    services::{KvTokenStore, TokenStore, TokenStoreError},
};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VALUES_PATH: &str = "/client/v4/accounts/acct-1/storage/kv/namespaces/ns-1/values";

fn kv_store(server: &MockServer) -> KvTokenStore {
    KvTokenStore::new(&KvConfig {
        api_base: format!("{}/client/v4", server.uri()),
        account_id: "acct-1".to_string(),
        namespace_id: "ns-1".to_string(),
        api_token: "kv-secret".to_string(),
    })
    .unwrap()
}

#[tokio::test]
async fn test_put_sends_payload_with_ttl() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(format!("{}/tok123", VALUES_PATH)))
        .and(header("authorization", "Bearer kv-secret"))
        .and(query_param("expiration_ttl", "900"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let store = kv_store(&server);
    let payload = MagicLinkPayload {
        email: "a@b.com".to_string(),
        expires: Utc::now().timestamp_millis() + 900_000,
    };

    store.put("tok123", &payload).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["email"], "a@b.com");
    assert_eq!(body["expires"], payload.expires);
}

#[tokio::test]
async fn test_short_ttl_is_raised_to_kv_minimum() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path(format!("{}/tok123", VALUES_PATH)))
        .and(query_param("expiration_ttl", "60"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = kv_store(&server);
    let payload = MagicLinkPayload {
        email: "a@b.com".to_string(),
        expires: Utc::now().timestamp_millis() + 5_000,
    };

    store.put("tok123", &payload).await.unwrap();
}

#[tokio::test]
async fn test_take_reads_then_deletes() {
    let server = MockServer::start().await;
    let stored = json!({ "email": "a@b.com", "expires": 1_700_000_000_000i64 });

    Mock::given(method("GET"))
        .and(path(format!("{}/tok123", VALUES_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_string(stored.to_string()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/tok123", VALUES_PATH)))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = kv_store(&server);
    let payload = store.take("tok123").await.unwrap().unwrap();

    assert_eq!(payload.email, "a@b.com");
    assert_eq!(payload.expires, 1_700_000_000_000);
}

#[tokio::test]
async fn test_missing_key_is_none_and_not_deleted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{}/gone", VALUES_PATH)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = kv_store(&server);
    assert!(store.take("gone").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_of_missing_key_is_ok() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path(format!("{}/gone", VALUES_PATH)))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let store = kv_store(&server);
    assert!(store.delete("gone").await.is_ok());
}

#[tokio::test]
async fn test_server_errors_surface_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = kv_store(&server);
    let result = store.get("tok123").await;
    assert!(matches!(result, Err(TokenStoreError::UnexpectedStatus(503))));
}

#[tokio::test]
async fn test_corrupt_payload_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let store = kv_store(&server);
    let result = store.get("tok123").await;
    assert!(matches!(result, Err(TokenStoreError::Payload(_))));
}

#[tokio::test]
async fn test_take_of_corrupt_payload_still_deletes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{}/tok123", VALUES_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/tok123", VALUES_PATH)))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = kv_store(&server);
    let result = store.take("tok123").await;
    assert!(matches!(result, Err(TokenStoreError::Payload(_))));
}
