//! Response parsing: the strategy trait dispatched by the transport, the
//! default MediaWiki JSON envelope handling, and continuation extraction.

use std::marker::PhantomData;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::req::RequestId;

/// Mutable context handed to a [`ResponseParser`]. Setting `needs_retry`
/// asks the transport to run the request again within its retry budget;
/// `retry_after` suggests the delay.
pub struct ParseContext {
    pub request_id: RequestId,
    pub needs_retry: bool,
    pub retry_after: Option<Duration>,
}

impl ParseContext {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            needs_retry: false,
            retry_after: None,
        }
    }
}

/// Strategy that turns a raw HTTP response into a domain value or a typed
/// error, optionally requesting a retry through the context.
pub trait ResponseParser {
    type Output;

    fn parse_response(
        &self,
        ctx: &mut ParseContext,
        status: StatusCode,
        body: &[u8],
    ) -> Result<Self::Output>;
}

/// Shared envelope handling: HTTP status classification, JSON decoding,
/// warning emission, and the `maxlag` retry hint. Does NOT translate the
/// `error` member; callers that need the raw error (the chunked uploader)
/// use [`LenientJsonParser`], everything else layers the dispatch on top.
fn read_envelope(ctx: &mut ParseContext, status: StatusCode, body: &[u8]) -> Result<Value> {
    if !status.is_success() {
        if status.is_server_error() {
            ctx.needs_retry = true;
        }
        return Err(Error::HttpStatus(status));
    }
    let root: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            ctx.needs_retry = true;
            return Err(Error::InvalidResponse(format!(
                "response body is not JSON: {e}"
            )));
        }
    };
    if let Some(warnings) = root.get("warnings") {
        emit_warnings(ctx.request_id, warnings);
    }
    if let Some(lag) = maxlag_seconds(&root) {
        ctx.needs_retry = true;
        ctx.retry_after = Some(Duration::from_secs(lag));
    }
    Ok(root)
}

fn emit_warnings(request_id: RequestId, warnings: &Value) {
    match warnings {
        // formatversion=2: {"main": {"warnings": "..."}}; fv1 uses "*"
        Value::Object(map) => {
            for (module, body) in map {
                let text = body
                    .get("warnings")
                    .or_else(|| body.get("*"))
                    .and_then(Value::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| body.to_string());
                warn!(%request_id, %module, "API warning: {text}");
            }
        }
        // errorformat=plaintext style: [{"code": ..., "module": ...}]
        Value::Array(items) => {
            for item in items {
                warn!(%request_id, "API warning: {item}");
            }
        }
        other => warn!(%request_id, "API warning: {other}"),
    }
}

fn maxlag_seconds(root: &Value) -> Option<u64> {
    let error = root.get("error")?;
    if error.get("code").and_then(Value::as_str) == Some("maxlag") {
        error.get("lag").and_then(Value::as_u64).or(Some(5))
    } else {
        None
    }
}

/// Translates an `error`/`errors` member into the crate taxonomy.
pub(crate) fn dispatch_api_error(root: &Value) -> Option<Error> {
    let (code, message) = if let Some(error) = root.get("error") {
        (
            error.get("code").and_then(Value::as_str).unwrap_or("unknown"),
            error
                .get("info")
                .or_else(|| error.get("*"))
                .and_then(Value::as_str)
                .unwrap_or(""),
        )
    } else if let Some(first) = root.get("errors").and_then(|e| e.get(0)) {
        (
            first.get("code").and_then(Value::as_str).unwrap_or("unknown"),
            first
                .get("text")
                .or_else(|| first.get("html"))
                .or_else(|| first.get("*"))
                .and_then(Value::as_str)
                .unwrap_or(""),
        )
    } else {
        return None;
    };
    Some(Error::from_api_error(code, message))
}

/// The default parser: envelope + error dispatch + `serde` decoding into
/// the caller's response type.
pub struct ApiResponseParser<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for ApiResponseParser<T> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> ResponseParser for ApiResponseParser<T> {
    type Output = T;

    fn parse_response(
        &self,
        ctx: &mut ParseContext,
        status: StatusCode,
        body: &[u8],
    ) -> Result<T> {
        let root = read_envelope(ctx, status, body)?;
        if let Some(err) = dispatch_api_error(&root) {
            return Err(err);
        }
        Ok(serde_json::from_value(root)?)
    }
}

/// Envelope + error dispatch, returning the raw JSON value.
#[derive(Default)]
pub struct RawJsonParser;

impl ResponseParser for RawJsonParser {
    type Output = Value;

    fn parse_response(
        &self,
        ctx: &mut ParseContext,
        status: StatusCode,
        body: &[u8],
    ) -> Result<Value> {
        let root = read_envelope(ctx, status, body)?;
        if let Some(err) = dispatch_api_error(&root) {
            return Err(err);
        }
        Ok(root)
    }
}

/// Envelope only: the `error` member, if any, is left in the value for the
/// caller to inspect. Used where an error body carries usable state (the
/// chunked uploader's `stashfailed` offset).
#[derive(Default)]
pub struct LenientJsonParser;

impl ResponseParser for LenientJsonParser {
    type Output = Value;

    fn parse_response(
        &self,
        ctx: &mut ParseContext,
        status: StatusCode,
        body: &[u8],
    ) -> Result<Value> {
        read_envelope(ctx, status, body)
    }
}

/// Pulls the continuation map out of a query response, folding the legacy
/// `query-continue` shape (one object per module) into a flat map.
pub fn take_continuation(root: &mut Value) -> Option<Map<String, Value>> {
    if let Some(cont) = root.get_mut("continue") {
        if let Value::Object(map) = cont.take() {
            return Some(map);
        }
        return None;
    }
    if let Some(legacy) = root.get_mut("query-continue") {
        if let Value::Object(modules) = legacy.take() {
            let mut flat = Map::new();
            for (_, inner) in modules {
                if let Value::Object(inner) = inner {
                    flat.extend(inner);
                }
            }
            if !flat.is_empty() {
                return Some(flat);
            }
        }
    }
    None
}

/// Normalises a `formatversion=1` query response into the fv2 shape the
/// decoding layer expects: the `pages` id-keyed object becomes an array,
/// `"*"` content keys become named fields, and empty-string flags become
/// booleans.
pub fn upgrade_legacy_pages(query: &mut Value) {
    let Some(pages) = query.get_mut("pages") else {
        return;
    };
    if let Value::Object(map) = pages {
        let mut list: Vec<Value> = map.values().cloned().collect();
        for page in &mut list {
            upgrade_legacy_page(page);
        }
        *pages = Value::Array(list);
    }
}

fn upgrade_legacy_page(page: &mut Value) {
    let Some(obj) = page.as_object_mut() else {
        return;
    };
    for flag in ["missing", "invalid", "special", "redirect", "new"] {
        if let Some(v) = obj.get_mut(flag) {
            if v.as_str() == Some("") {
                *v = Value::Bool(true);
            }
        }
    }
    if let Some(Value::Array(revisions)) = obj.get_mut("revisions") {
        for rev in revisions {
            if let Some(robj) = rev.as_object_mut() {
                if let Some(content) = robj.remove("*") {
                    robj.insert("content".to_owned(), content);
                }
                for flag in ["minor", "bot", "new", "anon"] {
                    if let Some(v) = robj.get_mut(flag) {
                        if v.as_str() == Some("") {
                            *v = Value::Bool(true);
                        }
                    }
                }
            }
        }
    }
}
