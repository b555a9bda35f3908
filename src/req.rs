//! Wire request messages: heterogeneous parameter maps and their encoding
//! into query strings, `application/x-www-form-urlencoded` bodies, or
//! `multipart/form-data` bodies.

use std::borrow::Cow;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock};

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use url::Url;

use crate::error::{Error, Result};
use crate::types::{AutoWatchBehavior, Limit, MwTimestamp};

pub mod edit;
pub mod login;
pub mod page_ops;
pub mod query;
pub mod upload;

/// A single field value in a request message.
///
/// The encoding rules: strings go out verbatim, `true` becomes the empty
/// string and `false` is omitted, numbers and timestamps use their invariant
/// decimal / RFC 3339 forms, string sequences are pipe-joined (switching to
/// the `\x1f` form when an element itself contains `|`), and byte payloads
/// force the whole message into multipart.
#[derive(Debug)]
pub enum ParamValue {
    Text(Cow<'static, str>),
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Time(MwTimestamp),
    Watch(AutoWatchBehavior),
    List(Vec<String>),
    Payload(Payload),
}

impl ParamValue {
    /// The scalar encoding, or `None` when the field is omitted entirely.
    /// Payloads have no scalar form; they are emitted as multipart parts.
    pub fn encode(&self) -> Option<Cow<'_, str>> {
        match self {
            ParamValue::Text(s) => Some(Cow::Borrowed(&**s)),
            ParamValue::Bool(true) => Some(Cow::Borrowed("")),
            ParamValue::Bool(false) => None,
            ParamValue::Int(v) => Some(Cow::Owned(v.to_string())),
            ParamValue::UInt(v) => Some(Cow::Owned(v.to_string())),
            ParamValue::Float(v) => Some(Cow::Owned(v.to_string())),
            ParamValue::Time(t) => Some(Cow::Owned(t.to_wire())),
            ParamValue::Watch(w) => Some(Cow::Borrowed(w.as_str())),
            ParamValue::List(items) => Some(Cow::Owned(encode_multivalue(items))),
            ParamValue::Payload(_) => None,
        }
    }

    pub fn is_payload(&self) -> bool {
        matches!(self, ParamValue::Payload(_))
    }
}

impl From<&'static str> for ParamValue {
    fn from(s: &'static str) -> Self {
        ParamValue::Text(Cow::Borrowed(s))
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(Cow::Owned(s))
    }
}

impl From<Cow<'static, str>> for ParamValue {
    fn from(s: Cow<'static, str>) -> Self {
        ParamValue::Text(s)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        ParamValue::UInt(v)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::UInt(v as u64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<MwTimestamp> for ParamValue {
    fn from(t: MwTimestamp) -> Self {
        ParamValue::Time(t)
    }
}

impl From<AutoWatchBehavior> for ParamValue {
    fn from(w: AutoWatchBehavior) -> Self {
        ParamValue::Watch(w)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(items: Vec<String>) -> Self {
        ParamValue::List(items)
    }
}

impl From<Payload> for ParamValue {
    fn from(p: Payload) -> Self {
        ParamValue::Payload(p)
    }
}

/// A byte-stream field. `Bytes` payloads can be re-emitted on every retry;
/// raw streams are one-shot and mark the whole message non-retriable.
#[derive(Debug)]
pub struct Payload {
    filename: Cow<'static, str>,
    body: PayloadBody,
}

enum PayloadBody {
    Bytes(Bytes),
    Stream(Mutex<Option<Body>>),
}

impl fmt::Debug for PayloadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            PayloadBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl Payload {
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self {
            filename: Cow::Borrowed("dummy"),
            body: PayloadBody::Bytes(data.into()),
        }
    }

    pub fn stream(body: Body) -> Self {
        Self {
            filename: Cow::Borrowed("dummy"),
            body: PayloadBody::Stream(Mutex::new(Some(body))),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<Cow<'static, str>>) -> Self {
        self.filename = filename.into();
        self
    }

    fn replayable(&self) -> bool {
        matches!(self.body, PayloadBody::Bytes(_))
    }

    fn to_part(&self) -> Result<Part> {
        let body = match &self.body {
            PayloadBody::Bytes(b) => Body::from(b.clone()),
            PayloadBody::Stream(slot) => {
                let taken = slot.lock().expect("payload lock poisoned").take();
                taken.ok_or(Error::InvalidOperation(
                    "the request body stream was already consumed",
                ))?
            }
        };
        Ok(Part::stream(body).file_name(self.filename.clone().into_owned()))
    }
}

/// Joins string values with `|`, or with `\x1f` (prefixed) when any value
/// contains a pipe itself.
#[must_use]
pub fn encode_multivalue<S: AsRef<str>>(values: &[S]) -> String {
    let sep = if values.iter().any(|v| v.as_ref().contains('|')) {
        '\u{1F}'
    } else {
        '|'
    };
    let mut s = String::new();
    if sep == '\u{1F}' {
        s.push(sep);
    }
    for (i, item) in values.iter().enumerate() {
        if i != 0 {
            s.push(sep);
        }
        s.push_str(item.as_ref());
    }
    s
}

/// Sink for request parameters. Builders write through this so that the
/// same parameter set can be emitted plain or with a module prefix.
pub trait ParamSink {
    fn add(&mut self, name: Cow<'static, str>, value: ParamValue);
}

/// An ordered heterogeneous parameter collection.
#[derive(Debug, Default)]
pub struct Params {
    pairs: Vec<(Cow<'static, str>, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<Cow<'static, str>>, value: impl Into<ParamValue>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Inserts only when the value is present. `Option<bool>` filters and
    /// the like stay off the wire entirely when unset.
    pub fn insert_opt<V: Into<ParamValue>>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        value: Option<V>,
    ) {
        if let Some(v) = value {
            self.insert(name, v);
        }
    }

    pub fn insert_limit(&mut self, name: impl Into<Cow<'static, str>>, limit: Limit) {
        if let Some(v) = limit.to_wire() {
            self.insert(name, v);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.pairs.iter().map(|(k, v)| (&**k, v))
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn has_payload(&self) -> bool {
        self.pairs.iter().any(|(_, v)| v.is_payload())
    }

    /// Percent-encoded `a=b&c=d` rendition of the scalar fields.
    pub fn to_query_string(&self) -> String {
        let mut s = String::new();
        for (name, value) in &self.pairs {
            if let Some(v) = value.encode() {
                if !s.is_empty() {
                    s.push('&');
                }
                s.push_str(&urlencoding::encode(name));
                s.push('=');
                s.push_str(&urlencoding::encode(&v));
            }
        }
        s
    }
}

impl ParamSink for Params {
    fn add(&mut self, name: Cow<'static, str>, value: ParamValue) {
        self.pairs.push((name, value));
    }
}

/// Adaptor that prepends a module prefix (`ap`, `gap`, ...) to every
/// parameter name written through it.
pub struct Prefixed<'a> {
    inner: &'a mut dyn ParamSink,
    prefix: &'a str,
}

impl<'a> Prefixed<'a> {
    pub fn new(inner: &'a mut dyn ParamSink, prefix: &'a str) -> Self {
        Self { inner, prefix }
    }
}

impl ParamSink for Prefixed<'_> {
    fn add(&mut self, name: Cow<'static, str>, value: ParamValue) {
        let name = format!("{}{}", self.prefix, name);
        self.inner.add(Cow::Owned(name), value);
    }
}

/// A stable, process-unique request trace id: the high 32 bits come from
/// startup entropy, the low 32 bits from a monotonic counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RequestId(u64);

static ID_SEED: OnceLock<u32> = OnceLock::new();
static ID_COUNTER: AtomicU32 = AtomicU32::new(0);

impl RequestId {
    pub fn next() -> Self {
        let seed = *ID_SEED.get_or_init(|| {
            let mut hasher = RandomState::new().build_hasher();
            std::process::id().hash(&mut hasher);
            hasher.finish() as u32
        });
        let low = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        RequestId(u64::from(seed) << 32 | u64::from(low))
    }

    pub const fn from_raw(raw: u64) -> Self {
        RequestId(raw)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// HTTP method of a request message.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum HttpMethod {
    Get,
    Post,
}

/// The body a message produces for one send attempt.
pub enum RequestBody {
    None,
    Form(String),
    Multipart(Form),
}

/// A complete wire request: method, parameters, trace id.
#[derive(Debug)]
pub struct RequestMessage {
    id: RequestId,
    method: HttpMethod,
    params: Params,
    /// Extra pre-encoded query fragment, appended verbatim. Used to fold an
    /// opaque continuation map into a GET request.
    raw_query: Option<String>,
    force_multipart: bool,
}

impl RequestMessage {
    pub fn get(params: Params) -> Self {
        Self {
            id: RequestId::next(),
            method: HttpMethod::Get,
            params,
            raw_query: None,
            force_multipart: false,
        }
    }

    pub fn post(params: Params) -> Self {
        Self {
            id: RequestId::next(),
            method: HttpMethod::Post,
            params,
            raw_query: None,
            force_multipart: false,
        }
    }

    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = id;
        self
    }

    pub fn with_raw_query(mut self, fragment: String) -> Self {
        self.raw_query = Some(fragment);
        self
    }

    pub fn force_multipart(mut self) -> Self {
        self.force_multipart = true;
        self
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    pub fn is_multipart(&self) -> bool {
        self.force_multipart || self.params.has_payload()
    }

    /// Whether the message can be sent again after a failed attempt. Raw
    /// byte streams are one-shot, everything else re-encodes freely.
    pub fn retriable(&self) -> bool {
        self.params.pairs.iter().all(|(_, v)| match v {
            ParamValue::Payload(p) => p.replayable(),
            _ => true,
        })
    }

    /// The query-string component, for GET messages.
    pub fn http_query(&self) -> Option<String> {
        if self.method != HttpMethod::Get {
            return None;
        }
        let mut q = self.params.to_query_string();
        if let Some(extra) = &self.raw_query {
            if !extra.is_empty() {
                if !q.is_empty() {
                    q.push('&');
                }
                q.push_str(extra);
            }
        }
        Some(q)
    }

    /// Produces the body for one send attempt.
    pub fn http_body(&self) -> Result<RequestBody> {
        match self.method {
            HttpMethod::Get => Ok(RequestBody::None),
            HttpMethod::Post => {
                if self.is_multipart() {
                    let mut form = Form::new();
                    for (name, value) in &self.params.pairs {
                        match value {
                            ParamValue::Payload(p) => {
                                form = form.part(name.clone().into_owned(), p.to_part()?);
                            }
                            other => {
                                if let Some(v) = other.encode() {
                                    form = form
                                        .text(name.clone().into_owned(), v.into_owned());
                                }
                            }
                        }
                    }
                    Ok(RequestBody::Multipart(form))
                } else {
                    Ok(RequestBody::Form(self.params.to_query_string()))
                }
            }
        }
    }
}

/// Builds a GET URL for a message against an endpoint.
pub fn build_url(endpoint: &Url, message: &RequestMessage) -> Url {
    let mut url = endpoint.clone();
    if let Some(q) = message.http_query() {
        if !q.is_empty() {
            url.set_query(Some(&q));
        }
    }
    url
}
