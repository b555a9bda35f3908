use reqwest::StatusCode;
use serde_json::json;

use crate::error::Error;
use crate::req::RequestId;
use crate::res::{
    take_continuation, upgrade_legacy_pages, ApiResponseParser, ParseContext, RawJsonParser,
    ResponseParser,
};

fn ctx() -> ParseContext {
    ParseContext::new(RequestId::from_raw(0))
}

#[test]
fn server_errors_request_retry() {
    let mut ctx = ctx();
    let parser = RawJsonParser;
    let err = parser
        .parse_response(&mut ctx, StatusCode::SERVICE_UNAVAILABLE, b"")
        .unwrap_err();
    assert!(matches!(err, Error::HttpStatus(_)));
    assert!(ctx.needs_retry);

    let mut ctx = self::ctx();
    let err = parser
        .parse_response(&mut ctx, StatusCode::NOT_FOUND, b"")
        .unwrap_err();
    assert!(matches!(err, Error::HttpStatus(_)));
    assert!(!ctx.needs_retry);
}

#[test]
fn garbage_body_requests_retry() {
    let mut ctx = ctx();
    let err = RawJsonParser
        .parse_response(&mut ctx, StatusCode::OK, b"<html>oops</html>")
        .unwrap_err();
    assert!(matches!(err, Error::InvalidResponse(_)));
    assert!(ctx.needs_retry);
}

#[test]
fn error_codes_dispatch_to_kinds() {
    let cases = [
        ("permissiondenied", "Unauthorized"),
        ("readapidenied", "Unauthorized"),
        ("mustbeloggedin", "Unauthorized"),
        ("badtoken", "BadToken"),
        ("unknown_action", "InvalidAction"),
        ("assertuserfailed", "AccountAssertion"),
        ("assertbotfailed", "AccountAssertion"),
        ("editconflict", "OperationConflict"),
        ("prev_revision", "OperationConflict"),
        ("internal_api_error_DBQueryError", "RemoteInternal"),
        ("ratelimited", "OperationFailed"),
    ];
    for (code, expected) in cases {
        let body = json!({"error": {"code": code, "info": "x"}}).to_string();
        let err = RawJsonParser
            .parse_response(&mut ctx(), StatusCode::OK, body.as_bytes())
            .unwrap_err();
        let got = match err {
            Error::Unauthorized(_) => "Unauthorized",
            Error::BadToken(_) => "BadToken",
            Error::InvalidAction(_) => "InvalidAction",
            Error::AccountAssertion(_) => "AccountAssertion",
            Error::OperationConflict(_) => "OperationConflict",
            Error::RemoteInternal(_) => "RemoteInternal",
            Error::OperationFailed(_) => "OperationFailed",
            other => panic!("unexpected error kind for {code}: {other:?}"),
        };
        assert_eq!(got, expected, "code {code}");
    }
}

#[test]
fn maxlag_sets_retry_with_lag_delay() {
    let body = json!({"error": {"code": "maxlag", "info": "lagged", "lag": 7}}).to_string();
    let mut ctx = ctx();
    let err = RawJsonParser
        .parse_response(&mut ctx, StatusCode::OK, body.as_bytes())
        .unwrap_err();
    assert!(matches!(err, Error::OperationFailed(_)));
    assert!(ctx.needs_retry);
    assert_eq!(ctx.retry_after, Some(std::time::Duration::from_secs(7)));
}

#[test]
fn typed_parser_decodes_envelope() {
    #[derive(serde::Deserialize)]
    struct Resp {
        batchcomplete: bool,
    }
    let body = json!({"batchcomplete": true}).to_string();
    let parser = ApiResponseParser::<Resp>::default();
    let resp = parser
        .parse_response(&mut ctx(), StatusCode::OK, body.as_bytes())
        .unwrap();
    assert!(resp.batchcomplete);
}

#[test]
fn modern_continuation_is_taken() {
    let mut v = json!({
        "continue": {"apcontinue": "Foo", "continue": "-||"},
        "query": {"allpages": []}
    });
    let cont = take_continuation(&mut v).unwrap();
    assert_eq!(cont.get("apcontinue").and_then(|v| v.as_str()), Some("Foo"));
    assert_eq!(cont.len(), 2);
    assert!(take_continuation(&mut v).is_none());
}

#[test]
fn legacy_query_continue_is_flattened() {
    let mut v = json!({
        "query-continue": {
            "categorymembers": {"cmcontinue": "page|X|123"}
        },
        "query": {"categorymembers": []}
    });
    let cont = take_continuation(&mut v).unwrap();
    assert_eq!(
        cont.get("cmcontinue").and_then(|v| v.as_str()),
        Some("page|X|123")
    );
}

#[test]
fn legacy_pages_upgrade_to_fv2_shapes() {
    let mut query = json!({
        "pages": {
            "42": {
                "pageid": 42,
                "ns": 0,
                "title": "Foo",
                "redirect": "",
                "revisions": [{"revid": 7, "minor": "", "*": "text"}]
            },
            "-1": {"title": "Bar", "missing": ""}
        }
    });
    upgrade_legacy_pages(&mut query);
    let pages = query.get("pages").unwrap().as_array().unwrap();
    assert_eq!(pages.len(), 2);
    let foo = pages
        .iter()
        .find(|p| p.get("title").and_then(|t| t.as_str()) == Some("Foo"))
        .unwrap();
    assert_eq!(foo.get("redirect"), Some(&json!(true)));
    let rev = &foo.get("revisions").unwrap().as_array().unwrap()[0];
    assert_eq!(rev.get("content"), Some(&json!("text")));
    assert_eq!(rev.get("minor"), Some(&json!(true)));
    assert!(rev.get("*").is_none());
}
