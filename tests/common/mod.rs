//! Shared helpers for the mock-server integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use httpmock::MockServer;
use mwclient::site::info::SiteInfo;
use mwclient::{Site, WikiClient};
use serde_json::{json, Value};

/// A client that does not sleep between retries.
pub fn test_client() -> Arc<WikiClient> {
    let client = WikiClient::new().unwrap();
    client.set_retry_delay(Duration::ZERO);
    Arc::new(client)
}

pub fn siteinfo_query(generator: &str) -> Value {
    json!({
        "general": {
            "mainpage": "Main Page",
            "sitename": "Testipedia",
            "generator": generator,
            "case": "first-letter",
            "lang": "en",
            "minuploadchunksize": 1024
        },
        "namespaces": {
            "0": {"id": 0, "name": "", "content": true},
            "1": {"id": 1, "name": "Talk", "canonical": "Talk"},
            "4": {"id": 4, "name": "Testipedia", "canonical": "Project"},
            "6": {"id": 6, "name": "File", "canonical": "File"},
            "10": {"id": 10, "name": "Template", "canonical": "Template"},
            "14": {"id": 14, "name": "Category", "canonical": "Category"}
        },
        "namespacealiases": [{"id": 6, "alias": "Image"}],
        "interwikimap": [
            {"prefix": "en", "url": "https://en.wikipedia.org/wiki/$1", "language": "English"}
        ],
        "extensions": [],
        "magicwords": []
    })
}

pub fn site_info(generator: &str) -> SiteInfo {
    SiteInfo::from_query(&siteinfo_query(generator)).unwrap()
}

/// A site bound to the mock server, seeded with modern site info.
pub fn site_at(server: &MockServer, client: Arc<WikiClient>) -> Site {
    Site::with_site_info(client, &server.url("/api.php"), site_info("MediaWiki 1.40.0")).unwrap()
}

/// A site bound to the mock server with no site info at all.
pub fn bare_site_at(server: &MockServer, client: Arc<WikiClient>) -> Site {
    Site::new(client, &server.url("/api.php")).unwrap()
}
