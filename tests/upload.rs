//! Chunked upload state machine behaviour.

mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use httpmock::Mock;
use mwclient::upload::{ChunkedUploadSource, StashPhase, UploadResultCode, UploadSource};
use mwclient::{AutoWatchBehavior, CancellationToken, Error};
use serde_json::{json, Value};

async fn token_mock(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php").query_param("meta", "tokens");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"tokens": {"csrftoken": "t1"}}}));
        })
        .await;
}

/// Mocks one chunk POST, matched on the multipart `offset` part value.
async fn chunk_mock<'a>(server: &'a MockServer, offset: u64, body: Value) -> Mock<'a> {
    let marker = format!("name=\"offset\"\r\n\r\n{offset}\r\n");
    server
        .mock_async(move |when, then| {
            when.method(POST).path("/api.php").body_contains(marker);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(body);
        })
        .await
}

#[tokio::test]
async fn chunks_are_stashed_in_sequence() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();
    token_mock(&server).await;

    let source = ChunkedUploadSource::new(site, "Test.png", Cursor::new(b"0123456789".to_vec()))
        .await
        .unwrap()
        .with_chunk_size(4);
    assert_eq!(source.total_size().await, 10);

    let m = chunk_mock(
        &server,
        0,
        json!({"upload": {"result": "Continue", "filekey": "fk1", "offset": 4}}),
    )
    .await;
    let r = source.stash_next_chunk(&cancel).await.unwrap();
    assert_eq!(r.result, UploadResultCode::Continue);
    assert_eq!(source.uploaded_size().await, 4);
    assert_eq!(source.file_key().await.as_deref(), Some("fk1"));
    m.delete_async().await;

    let m = chunk_mock(
        &server,
        4,
        json!({"upload": {"result": "Continue", "filekey": "fk1", "offset": 8}}),
    )
    .await;
    source.stash_next_chunk(&cancel).await.unwrap();
    assert_eq!(source.uploaded_size().await, 8);
    m.delete_async().await;

    let m = chunk_mock(
        &server,
        8,
        json!({"upload": {"result": "Success", "filekey": "fk1"}}),
    )
    .await;
    let r = source.stash_next_chunk(&cancel).await.unwrap();
    assert_eq!(r.result, UploadResultCode::Success);
    assert_eq!(m.hits_async().await, 1);
    assert_eq!(source.uploaded_size().await, 10);
    assert_eq!(source.phase().await, StashPhase::AllStashed);

    // a further stash call is rejected
    let err = source.stash_next_chunk(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::InvalidOperation(_)));

    match source.to_upload_source().await.unwrap() {
        UploadSource::FileKey(key) => assert_eq!(key, "fk1"),
        _ => panic!("expected a file key source"),
    }
}

#[tokio::test]
async fn server_offsets_are_authoritative() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();
    token_mock(&server).await;

    let source = ChunkedUploadSource::new(site, "Test.png", Cursor::new(b"0123456789".to_vec()))
        .await
        .unwrap()
        .with_chunk_size(4);

    // the server acknowledges less than we sent; its count wins
    let first = chunk_mock(
        &server,
        0,
        json!({"upload": {"result": "Continue", "filekey": "fk1", "offset": 2}}),
    )
    .await;
    source.stash_next_chunk(&cancel).await.unwrap();
    assert_eq!(source.uploaded_size().await, 2);
    first.delete_async().await;

    let second = chunk_mock(
        &server,
        2,
        json!({"upload": {"result": "Continue", "filekey": "fk1", "offset": 6}}),
    )
    .await;
    source.stash_next_chunk(&cancel).await.unwrap();
    assert_eq!(source.uploaded_size().await, 6);
    assert_eq!(second.hits_async().await, 1);
}

#[tokio::test]
async fn stashfailed_offset_rewinds_within_one_call() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();
    token_mock(&server).await;

    let source = ChunkedUploadSource::new(site, "Test.png", Cursor::new(b"0123456789".to_vec()))
        .await
        .unwrap()
        .with_chunk_size(4);

    let at_zero = chunk_mock(
        &server,
        0,
        json!({"upload": {"result": "Continue", "filekey": "fk1", "offset": 4}}),
    )
    .await;
    source.stash_next_chunk(&cancel).await.unwrap();
    assert_eq!(source.uploaded_size().await, 4);

    // the next chunk bounces with a corrective offset of zero; the same
    // stash call rewinds and re-sends from there
    let bounced = chunk_mock(
        &server,
        4,
        json!({"error": {"code": "stashfailed", "info": "Invalid chunk offset", "offset": 0}}),
    )
    .await;
    let r = source.stash_next_chunk(&cancel).await.unwrap();
    assert_eq!(bounced.hits_async().await, 1);
    assert_eq!(at_zero.hits_async().await, 2);
    assert_eq!(r.result, UploadResultCode::Continue);
    assert_eq!(source.uploaded_size().await, 4);
    assert_eq!(source.phase().await, StashPhase::ChunkImpending);
}

#[tokio::test]
async fn concurrent_stash_calls_are_rejected() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();
    token_mock(&server).await;

    server
        .mock_async(|when, then| {
            when.method(POST).path("/api.php");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"upload": {"result": "Continue", "filekey": "fk1", "offset": 4}}))
                .delay(Duration::from_millis(300));
        })
        .await;

    let source = Arc::new(
        ChunkedUploadSource::new(site, "Test.png", Cursor::new(b"0123456789".to_vec()))
            .await
            .unwrap()
            .with_chunk_size(4),
    );
    let in_flight = {
        let source = source.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { source.stash_next_chunk(&cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    let err = source.stash_next_chunk(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::ConcurrentStash));
    in_flight.await.unwrap().unwrap();
}

#[tokio::test]
async fn stashed_key_commits_through_the_page_upload() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();
    token_mock(&server).await;

    let commit = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api.php")
                .body_contains("filekey=fk1")
                .body_contains("filename=Test.png");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"upload": {
                    "result": "Success",
                    "filekey": "fk1",
                    "imageinfo": {
                        "timestamp": "2024-05-01T10:00:00Z",
                        "user": "ExampleBot",
                        "size": 10,
                        "url": "https://example.org/images/Test.png",
                        "mime": "image/png",
                        "sha1": "da39a3ee"
                    }
                }}));
        })
        .await;

    let mut page = site.page("File:Test.png");
    let result = page
        .upload(
            UploadSource::file_key("fk1"),
            Some("chunked upload"),
            true,
            AutoWatchBehavior::NoChange,
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(commit.hits_async().await, 1);
    assert_eq!(result.result, UploadResultCode::Success);
    let rev = page.file_revision().unwrap();
    assert_eq!(rev.mime.as_deref(), Some("image/png"));
    assert_eq!(rev.size, Some(10));
}

#[tokio::test]
async fn upload_warnings_surface_with_their_context() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();
    token_mock(&server).await;

    server
        .mock_async(|when, then| {
            // the direct-file upload goes out as multipart
            when.method(POST).path("/api.php");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"upload": {
                    "result": "Warning",
                    "filekey": "fk9",
                    "warnings": {
                        "duplicate": ["Other.png"],
                        "exists": "Test.png"
                    }
                }}));
        })
        .await;

    let mut page = site.page("File:Test.png");
    let err = page
        .upload(
            UploadSource::bytes(&b"PNG..."[..]),
            None,
            false,
            AutoWatchBehavior::NoChange,
            &cancel,
        )
        .await
        .unwrap_err();
    match err {
        Error::UploadWarning(result) => {
            assert_eq!(result.file_key.as_deref(), Some("fk9"));
            assert!(result.warnings.contains_key("exists"));
            assert_eq!(result.duplicate_titles, ["Other.png"]);
        }
        other => panic!("expected an upload warning, got {other:?}"),
    }
}
