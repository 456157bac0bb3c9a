//! Fetch-pipeline behavior against a live mock endpoint

use std::time::{Duration, SystemTime};

use signet_jwk::{
    BackoffPolicy, KeySetCache, RegistryError, TargetOptions, fetch_key_set_document,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEYS: &str = r#"{"keys":[{"kty":"EC","kid":"ec-1","crv":"P-256","x":"xx","y":"yy"}]}"#;

#[tokio::test]
async fn retries_are_paced_by_the_backoff_policy() {
    let server = MockServer::start().await;
    // Two transient failures, then success
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(KEYS, "application/json"))
        .mount(&server)
        .await;

    let url = format!("{}/jwks.json", server.uri());
    let client = reqwest::Client::new();
    let backoff = BackoffPolicy::Constant {
        interval: Duration::from_millis(10),
        max_attempts: 3,
    };

    let outcome = fetch_key_set_document(&client, &url, &backoff).await.unwrap();
    assert!(!outcome.body.is_empty());
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn null_backoff_fails_on_first_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/jwks.json", server.uri());
    let client = reqwest::Client::new();

    let err = fetch_key_set_document(&client, &url, &BackoffPolicy::Null)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::FetchFailed { .. }));
}

#[tokio::test]
async fn exhausted_backoff_surfaces_the_last_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let url = format!("{}/jwks.json", server.uri());
    let client = reqwest::Client::new();
    let backoff = BackoffPolicy::Constant {
        interval: Duration::from_millis(5),
        max_attempts: 2,
    };

    let err = fetch_key_set_document(&client, &url, &backoff).await.unwrap_err();
    assert!(matches!(err, RegistryError::FetchFailed { .. }));
}

#[tokio::test]
async fn max_age_drives_the_scheduled_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(KEYS, "application/json")
                .insert_header("Cache-Control", "public, max-age=120"),
        )
        .expect(1)
        .mount(&server)
        .await;
    let url = format!("{}/jwks.json", server.uri());

    let cache = KeySetCache::new(CancellationToken::new());
    cache.configure(
        &url,
        TargetOptions {
            min_refresh_interval: Some(Duration::from_secs(1)),
            ..TargetOptions::default()
        },
    );
    cache.fetch(&url).await.unwrap();

    let snapshot = cache
        .snapshot()
        .into_iter()
        .find(|target| target.url == url)
        .unwrap();
    let next_refresh = snapshot.next_refresh.unwrap();
    let lower = SystemTime::now() + Duration::from_secs(60);
    let upper = SystemTime::now() + Duration::from_secs(180);
    assert!(next_refresh > lower && next_refresh < upper);
}
