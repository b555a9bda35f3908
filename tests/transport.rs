//! Retry-loop behaviour of the transport client.

mod common;

use std::time::Duration;

use httpmock::prelude::*;
use mwclient::req::{Params, RequestMessage};
use mwclient::res::RawJsonParser;
use mwclient::{CancellationToken, Error};
use serde_json::json;
use url::Url;

fn query_message() -> RequestMessage {
    let mut params = Params::new();
    params.insert("action", "query");
    params.insert("format", "json");
    RequestMessage::get(params)
}

#[tokio::test]
async fn server_errors_are_retried_until_budget_is_exhausted() {
    let server = MockServer::start_async().await;
    let failing = server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php");
            then.status(503);
        })
        .await;

    let client = common::test_client();
    let endpoint: Url = server.url("/api.php").parse().unwrap();
    let cancel = CancellationToken::new();
    let err = client
        .invoke(&endpoint, &query_message(), &RawJsonParser, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HttpStatus(s) if s.as_u16() == 503));
    // initial attempt plus the default three retries
    assert_eq!(failing.hits_async().await, 4);

    failing.delete_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"batchcomplete": true}));
        })
        .await;
    let value = client
        .invoke(&endpoint, &query_message(), &RawJsonParser, &cancel)
        .await
        .unwrap();
    assert_eq!(value.get("batchcomplete"), Some(&json!(true)));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start_async().await;
    let not_found = server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php");
            then.status(404);
        })
        .await;

    let client = common::test_client();
    let endpoint: Url = server.url("/api.php").parse().unwrap();
    let err = client
        .invoke(
            &endpoint,
            &query_message(),
            &RawJsonParser,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HttpStatus(s) if s.as_u16() == 404));
    assert_eq!(not_found.hits_async().await, 1);
}

#[tokio::test]
async fn unparseable_bodies_are_retried() {
    let server = MockServer::start_async().await;
    let garbage = server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php");
            then.status(200).body("<html>varnish error</html>");
        })
        .await;

    let client = common::test_client();
    let endpoint: Url = server.url("/api.php").parse().unwrap();
    let err = client
        .invoke(
            &endpoint,
            &query_message(),
            &RawJsonParser,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidResponse(_)));
    assert_eq!(garbage.hits_async().await, 4);
}

#[tokio::test]
async fn maxlag_responses_are_retried_with_the_reported_lag() {
    let server = MockServer::start_async().await;
    let lagged = server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "error": {"code": "maxlag", "info": "Waiting for a database", "lag": 0}
                }));
        })
        .await;

    let client = common::test_client();
    let endpoint: Url = server.url("/api.php").parse().unwrap();
    let err = client
        .invoke(
            &endpoint,
            &query_message(),
            &RawJsonParser,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.api_code(), Some("maxlag"));
    assert_eq!(lagged.hits_async().await, 4);
}

#[tokio::test]
async fn timeouts_surface_after_the_budget() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"batchcomplete": true}))
                .delay(Duration::from_secs(5));
        })
        .await;

    let client = common::test_client();
    client.set_timeout(Duration::from_millis(100));
    client.set_max_retries(0);
    let endpoint: Url = server.url("/api.php").parse().unwrap();
    let err = client
        .invoke(
            &endpoint,
            &query_message(),
            &RawJsonParser,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));
}

#[tokio::test]
async fn cancellation_aborts_pending_io() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"batchcomplete": true}))
                .delay(Duration::from_secs(5));
        })
        .await;

    let client = common::test_client();
    let endpoint: Url = server.url("/api.php").parse().unwrap();
    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });
    let started = std::time::Instant::now();
    let err = client
        .invoke(&endpoint, &query_message(), &RawJsonParser, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(4));
}
