//! Page handle behaviour: refresh, redirects, purge, mutations.

mod common;

use httpmock::prelude::*;
use mwclient::page::{PageQueryOptions, PurgeFailureReason, WikiPage};
use mwclient::req::page_ops::{MoveOptions, PurgeOptions};
use mwclient::rev::fetch_revisions;
use mwclient::{AutoWatchBehavior, CancellationToken, Error};
use serde_json::json;

#[tokio::test]
async fn refresh_loads_page_state() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api.php")
                .query_param("titles", "Sandbox");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"pages": [{
                    "pageid": 11,
                    "ns": 0,
                    "title": "Sandbox",
                    "contentmodel": "wikitext",
                    "pagelanguage": "en",
                    "touched": "2024-05-01T10:00:00Z",
                    "lastrevid": 42,
                    "length": 13,
                    "protection": [
                        {"type": "edit", "level": "autoconfirmed", "expiry": "infinity"}
                    ],
                    "restrictiontypes": ["edit", "move"],
                    "pageprops": {"wikibase_item": "Q42"},
                    "revisions": [{
                        "revid": 42, "parentid": 41,
                        "timestamp": "2024-05-01T10:00:00Z",
                        "slots": {"main": {"contentmodel": "wikitext", "content": "Hello, world!"}}
                    }]
                }]}}));
        })
        .await;

    let mut page = site.page("Sandbox");
    page.refresh(PageQueryOptions::FETCH_CONTENT, &cancel)
        .await
        .unwrap();
    assert_eq!(page.exists(), Some(true));
    assert_eq!(page.id(), Some(11));
    assert_eq!(page.content(), Some("Hello, world!"));
    assert_eq!(page.content_model(), Some("wikitext"));
    assert_eq!(page.last_revision_id(), Some(42));
    assert_eq!(page.content_length(), Some(13));
    assert_eq!(page.protections().len(), 1);
    assert_eq!(page.restriction_types(), ["edit", "move"]);
    assert_eq!(
        page.page_properties().get("wikibase_item").map(String::as_str),
        Some("Q42")
    );
}

#[tokio::test]
async fn refresh_of_missing_page_preserves_identity() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php").query_param("titles", "Nope");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"pages": [
                    {"ns": 0, "title": "Nope", "missing": true}
                ]}}));
        })
        .await;

    let mut page = site.page("Nope");
    page.refresh(PageQueryOptions::empty(), &cancel).await.unwrap();
    assert_eq!(page.exists(), Some(false));
    assert_eq!(page.title(), Some("Nope"));
    assert_eq!(page.content(), None);
    assert_eq!(page.last_revision_id(), None);
}

#[tokio::test]
async fn redirect_chain_is_resolved_and_recorded() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api.php")
                .query_param("titles", "Foo")
                .query_param("redirects", "");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {
                    "redirects": [
                        {"from": "Foo", "to": "Foo2"},
                        {"from": "Foo2", "to": "Foo23"},
                        {"from": "Foo23", "to": "Foo24"}
                    ],
                    "pages": [{
                        "pageid": 99, "ns": 0, "title": "Foo24",
                        "contentmodel": "wikitext", "lastrevid": 7,
                        "touched": "2024-01-01T00:00:00Z", "length": 4
                    }]
                }}));
        })
        .await;

    let mut page = site.page("Foo");
    page.refresh(PageQueryOptions::RESOLVE_REDIRECTS, &cancel)
        .await
        .unwrap();
    assert_eq!(page.title(), Some("Foo24"));
    assert_eq!(page.redirect_path(), ["Foo", "Foo2", "Foo23"]);
    assert!(!page.is_redirect());
    assert_eq!(page.exists(), Some(true));
}

#[tokio::test]
async fn circular_redirects_are_detected() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php").query_param("titles", "Foo");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {
                    "redirects": [
                        {"from": "Foo", "to": "Bar"},
                        {"from": "Bar", "to": "Foo"}
                    ],
                    "pages": []
                }}));
        })
        .await;

    let mut page = site.page("Foo");
    let err = page
        .refresh(PageQueryOptions::RESOLVE_REDIRECTS, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CircularRedirect(_)));
}

#[tokio::test]
async fn normalized_titles_match_back() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {
                    "normalized": [{"from": "foo bar", "to": "Foo bar"}],
                    "pages": [{
                        "pageid": 3, "ns": 0, "title": "Foo bar",
                        "contentmodel": "wikitext", "lastrevid": 5,
                        "touched": "2024-01-01T00:00:00Z", "length": 9
                    }]
                }}));
        })
        .await;

    let mut page = site.page("foo bar");
    page.refresh(PageQueryOptions::empty(), &cancel).await.unwrap();
    assert_eq!(page.title(), Some("Foo bar"));
    assert_eq!(page.exists(), Some(true));
}

#[tokio::test]
async fn bulk_purge_reports_individual_failures() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    let purge = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api.php")
                .body_contains("action=purge")
                .body_contains("forcelinkupdate=");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"purge": [
                    {"ns": 0, "title": "A", "purged": true},
                    {"title": "B<bad>", "invalid": true, "invalidreason": "contains <"},
                    {"ns": 0, "title": "C", "purged": true}
                ]}));
        })
        .await;

    let pages: Vec<WikiPage> = ["A", "B<bad>", "C"].iter().map(|t| site.page(*t)).collect();
    let failures = WikiPage::purge_pages(
        &pages,
        PurgeOptions::FORCE_LINK_UPDATE,
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(purge.hits_async().await, 1);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].title, "B<bad>");
    assert!(matches!(
        failures[0].reason,
        PurgeFailureReason::Invalid(_)
    ));
}

#[tokio::test]
async fn revision_fetch_preserves_input_order_and_shares_stubs() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api.php")
                .query_param("revids", "248199|248197|255289");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"pages": [
                    {"pageid": 100, "ns": 0, "title": "清", "revisions": [
                        {"revid": 248197, "parentid": 248196,
                         "timestamp": "2010-01-01T00:00:00Z", "user": "A"},
                        {"revid": 248199, "parentid": 248197,
                         "timestamp": "2010-01-02T00:00:00Z", "user": "B"}
                    ]},
                    {"pageid": 101, "ns": 0, "title": "香草", "revisions": [
                        {"revid": 255289, "parentid": 0,
                         "timestamp": "2011-05-09T00:00:00Z", "user": "C"}
                    ]}
                ]}}));
        })
        .await;

    let revisions = fetch_revisions(&site, &[248199, 248197, 255289], false, &cancel)
        .await
        .unwrap();
    assert_eq!(revisions.len(), 3);
    let first = revisions[0].as_ref().unwrap();
    let second = revisions[1].as_ref().unwrap();
    let third = revisions[2].as_ref().unwrap();
    assert_eq!(first.id, 248199);
    assert_eq!(second.id, 248197);
    assert_eq!(first.page.title.as_deref(), Some("清"));
    assert_eq!(first.page, second.page);
    assert_eq!(third.page.title.as_deref(), Some("香草"));
}

#[tokio::test]
async fn update_content_reports_no_change() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php").query_param("meta", "tokens");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"tokens": {"csrftoken": "t1"}}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api.php").body_contains("action=edit");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"edit": {
                    "result": "Success", "pageid": 11, "nochange": true
                }}));
        })
        .await;

    let mut page = site.page("Sandbox");
    page.set_content("same text");
    let changed = page
        .update_content("noop", true, false, AutoWatchBehavior::NoChange, &cancel)
        .await
        .unwrap();
    assert!(!changed);
}

#[tokio::test]
async fn protected_page_edit_is_unauthorized() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php").query_param("meta", "tokens");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"tokens": {"csrftoken": "t1"}}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api.php").body_contains("action=edit");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"error": {
                    "code": "protectedpage",
                    "info": "This page has been protected to prevent editing."
                }}));
        })
        .await;

    let mut page = site.page("Main Page");
    page.set_content("defaced");
    let err = page
        .update_content("no", false, false, AutoWatchBehavior::NoChange, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));
}

#[tokio::test]
async fn edit_conflicts_surface_as_conflicts() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php").query_param("meta", "tokens");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"tokens": {"csrftoken": "t1"}}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api.php").body_contains("action=edit");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"error": {"code": "editconflict", "info": "Edit conflict."}}));
        })
        .await;

    let mut page = site.page("Busy page");
    page.set_content("mine");
    let err = page
        .update_content("c", false, false, AutoWatchBehavior::NoChange, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::OperationConflict(_)));
}

#[tokio::test]
async fn move_tracks_the_new_title() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php").query_param("meta", "tokens");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"tokens": {"csrftoken": "t1"}}}));
        })
        .await;
    let mv = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api.php")
                .body_contains("action=move")
                .body_contains("noredirect=");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"move": {"from": "Old name", "to": "New name"}}));
        })
        .await;

    let mut page = site.page("Old name");
    page.move_to(
        "New name",
        Some("housekeeping"),
        MoveOptions::NO_REDIRECT,
        AutoWatchBehavior::NoChange,
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(mv.hits_async().await, 1);
    assert_eq!(page.title(), Some("New name"));
}

#[tokio::test]
async fn deleting_a_missing_page_returns_false() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php").query_param("meta", "tokens");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"tokens": {"csrftoken": "t1"}}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api.php").body_contains("action=delete");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"error": {
                    "code": "missingtitle", "info": "The page you specified doesn't exist."
                }}));
        })
        .await;

    let mut page = site.page("Ghost");
    let deleted = page
        .delete(Some("gone"), AutoWatchBehavior::NoChange, &cancel)
        .await
        .unwrap();
    assert!(!deleted);
    assert_eq!(page.exists(), Some(false));
}
