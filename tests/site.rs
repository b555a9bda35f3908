//! Site controller behaviour: bootstrap, tokens, login, discovery.

mod common;

use httpmock::prelude::*;
use mwclient::{AutoWatchBehavior, CancellationToken, LoginPolicy, Site, SiteOptions};
use serde_json::json;

#[tokio::test]
async fn bootstrap_loads_site_and_account_in_one_request() {
    let server = MockServer::start_async().await;
    let mut query = common::siteinfo_query("MediaWiki 1.40.0");
    query["userinfo"] = json!({
        "id": 7, "name": "ExampleBot",
        "groups": ["bot"], "rights": ["apihighlimits", "edit"]
    });
    let bootstrap = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api.php")
                .query_param("meta", "siteinfo|userinfo");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({ "query": query }));
        })
        .await;

    let cancel = CancellationToken::new();
    let site = Site::connect(
        common::test_client(),
        &server.url("/api.php"),
        SiteOptions::default(),
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(bootstrap.hits_async().await, 1);

    let info = site.site_info().unwrap();
    assert_eq!(info.site_name, "Testipedia");
    assert_eq!(info.namespaces.resolve("image").unwrap().id, 6);
    let account = site.account_info();
    assert_eq!(account.name, "ExampleBot");
    assert!(account.has_right("apihighlimits"));
}

#[tokio::test]
async fn deferred_bootstrap_raises_until_refreshed() {
    let server = MockServer::start_async().await;
    let options = SiteOptions {
        explicit_info_refresh: true,
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    let site = Site::connect(
        common::test_client(),
        &server.url("/api.php"),
        options,
        &cancel,
    )
    .await
    .unwrap();
    assert!(matches!(
        site.site_info(),
        Err(mwclient::Error::SiteNotInitialized)
    ));
}

#[tokio::test]
async fn cached_token_is_reused_and_invalidated_on_badtoken() {
    let server = MockServer::start_async().await;
    let client = common::test_client();
    let site = common::site_at(&server, client);
    let cancel = CancellationToken::new();

    let tokens_v1 = server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php").query_param("meta", "tokens");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"tokens": {"csrftoken": "t1"}}}));
        })
        .await;
    let edit_stale = server
        .mock_async(|when, then| {
            when.method(POST).path("/api.php").body_contains("token=t1");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"error": {"code": "badtoken", "info": "Invalid CSRF token."}}));
        })
        .await;
    let edit_fresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/api.php").body_contains("token=t2");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"edit": {
                    "result": "Success",
                    "pageid": 11,
                    "newrevid": 42,
                    "newtimestamp": "2024-05-01T10:00:00Z"
                }}));
        })
        .await;

    // prime the cache, then reuse it without another fetch
    assert_eq!(site.get_token("csrf", &cancel).await.unwrap(), "t1");
    assert_eq!(site.get_token("csrf", &cancel).await.unwrap(), "t1");
    assert_eq!(tokens_v1.hits_async().await, 1);

    tokens_v1.delete_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php").query_param("meta", "tokens");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"tokens": {"csrftoken": "t2"}}}));
        })
        .await;

    let mut page = site.page("Sandbox");
    page.set_content("Hello");
    let changed = page
        .update_content("greeting", false, false, AutoWatchBehavior::Preferences, &cancel)
        .await
        .unwrap();
    assert!(changed);
    assert_eq!(page.last_revision_id(), Some(42));
    assert_eq!(edit_stale.hits_async().await, 1);
    assert_eq!(edit_fresh.hits_async().await, 1);
}

#[tokio::test]
async fn legacy_login_round_trip() {
    let server = MockServer::start_async().await;
    let client = common::test_client();
    let options = SiteOptions {
        login_policy: LoginPolicy::Legacy,
        ..Default::default()
    };
    let site = Site::with_options(client, &server.url("/api.php"), options).unwrap();
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api.php")
                .query_param("meta", "tokens")
                .query_param("type", "login");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"tokens": {"logintoken": "lt1"}}}));
        })
        .await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api.php")
                .body_contains("action=login")
                .body_contains("lgtoken=lt1");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"login": {
                    "result": "Success", "lguserid": 7, "lgusername": "ExampleBot"
                }}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api.php")
                .query_param("meta", "userinfo");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"userinfo": {
                    "id": 7, "name": "ExampleBot", "groups": ["bot"], "rights": ["edit"]
                }}}));
        })
        .await;

    site.login("ExampleBot", "hunter2", &cancel).await.unwrap();
    assert_eq!(login.hits_async().await, 1);
    let account = site.account_info();
    assert_eq!(account.name, "ExampleBot");
    assert!(!account.is_anonymous);
}

#[tokio::test]
async fn clientlogin_pass() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api.php")
                .query_param("type", "login");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"tokens": {"logintoken": "lt9"}}}));
        })
        .await;
    let login = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api.php")
                .body_contains("action=clientlogin")
                .body_contains("logintoken=lt9");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"clientlogin": {"status": "PASS", "username": "ExampleBot"}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api.php")
                .query_param("meta", "userinfo");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"userinfo": {
                    "id": 7, "name": "ExampleBot", "groups": [], "rights": []
                }}}));
        })
        .await;

    site.login("ExampleBot", "hunter2", &cancel).await.unwrap();
    assert_eq!(login.hits_async().await, 1);
    assert_eq!(site.account_info().name, "ExampleBot");
}

#[tokio::test]
async fn failed_login_is_unauthorized() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api.php")
                .query_param("type", "login");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"tokens": {"logintoken": "lt9"}}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api.php").body_contains("action=clientlogin");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"clientlogin": {
                    "status": "FAIL",
                    "message": "Incorrect username or password entered."
                }}));
        })
        .await;

    let err = site
        .login("ExampleBot", "wrong", &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, mwclient::Error::Unauthorized(_)));
}

#[tokio::test]
async fn open_search_returns_ordered_entries() {
    let server = MockServer::start_async().await;
    let site = common::site_at(&server, common::test_client());
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api.php")
                .query_param("action", "opensearch")
                .query_param("search", "Sand");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!([
                    "Sand",
                    ["Sandbox", "Sandstone"],
                    ["a test page", ""],
                    ["https://example.org/wiki/Sandbox", "https://example.org/wiki/Sandstone"]
                ]));
        })
        .await;

    let entries = site
        .open_search("Sand", mwclient::Limit::Value(2), &cancel)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].title, "Sandbox");
    assert_eq!(entries[0].description.as_deref(), Some("a test page"));
    assert_eq!(entries[1].title, "Sandstone");
    assert_eq!(entries[1].description, None);
}

#[tokio::test]
async fn api_endpoint_discovery_follows_edit_uri() {
    let server = MockServer::start_async().await;
    let client = common::test_client();
    let cancel = CancellationToken::new();

    let rsd_href = format!("{}?action=rsd", server.url("/weird/api.php"));
    server
        .mock_async(|when, then| {
            when.method(GET).path("/");
            then.status(200)
                .header("content-type", "text/html")
                .body(format!(
                    "<html><head><link rel=\"EditURI\" type=\"application/rsd+xml\" \
                     href=\"{rsd_href}\"/></head><body>hi</body></html>"
                ));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/weird/api.php")
                .query_param("meta", "siteinfo");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"general": {
                    "generator": "MediaWiki 1.40.0", "sitename": "Hidden"
                }}}));
        })
        .await;

    let found = Site::search_api_endpoint(&client, &server.base_url(), &cancel)
        .await
        .unwrap();
    assert_eq!(found.map(|u| u.to_string()), Some(server.url("/weird/api.php")));
}

#[tokio::test]
async fn api_endpoint_discovery_prefers_conventional_paths() {
    let server = MockServer::start_async().await;
    let client = common::test_client();
    let cancel = CancellationToken::new();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/w/api.php")
                .query_param("meta", "siteinfo");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"general": {
                    "generator": "MediaWiki 1.40.0", "sitename": "Conventional"
                }}}));
        })
        .await;

    let found = Site::search_api_endpoint(&client, &server.base_url(), &cancel)
        .await
        .unwrap();
    assert_eq!(found.map(|u| u.to_string()), Some(server.url("/w/api.php")));
}

#[tokio::test]
async fn concurrent_token_requests_share_one_fetch() {
    let server = MockServer::start_async().await;
    let client = common::test_client();
    let site = common::site_at(&server, client);
    let cancel = CancellationToken::new();

    let tokens = server
        .mock_async(|when, then| {
            when.method(GET).path("/api.php").query_param("meta", "tokens");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"query": {"tokens": {"csrftoken": "shared"}}}))
                .delay(std::time::Duration::from_millis(100));
        })
        .await;

    let (a, b, c) = tokio::join!(
        site.get_token("csrf", &cancel),
        site.get_token("csrf", &cancel),
        site.get_token("edit", &cancel),
    );
    assert_eq!(a.unwrap(), "shared");
    assert_eq!(b.unwrap(), "shared");
    // "edit" folds into csrf on a modern server
    assert_eq!(c.unwrap(), "shared");
    assert_eq!(tokens.hits_async().await, 1);
}

#[tokio::test]
async fn logout_resets_account_state() {
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
    let logout = server
        .mock_async(|when, then| {
            when.method(POST).path("/api.php").body_contains("action=logout");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({}));
        })
        .await;

    site.logout(&cancel).await.unwrap();
    assert_eq!(logout.hits_async().await, 1);
    assert!(site.account_info().is_anonymous);
}
