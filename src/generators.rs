//! The continuation engine: lazy, restartable sequences over MediaWiki
//! `list`/`prop` queries, and the upgrade of a module into a page stream
//! through the `generator=` mechanism.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use futures_util::{Stream, StreamExt, TryStreamExt};
use pin_project::pin_project;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{trace, trace_span};

use crate::error::{Error, Result};
use crate::page::{PageQueryOptions, WikiPage};
use crate::req::{ParamSink, Params, Prefixed, RequestMessage};
use crate::res::{take_continuation, upgrade_legacy_pages};
use crate::site::Site;

pub mod allpages;
pub mod categorymembers;
pub mod links;
pub mod recentchanges;
pub mod revisions;
pub mod search;

/// Whether a module hangs off `list=` or `prop=`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ModuleKind {
    List,
    Prop,
}

/// Redirect filtering shared by the title-enumerating modules.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum RedirectsFilter {
    #[default]
    All,
    Redirects,
    NonRedirects,
}

impl RedirectsFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectsFilter::All => "all",
            RedirectsFilter::Redirects => "redirects",
            RedirectsFilter::NonRedirects => "nonredirects",
        }
    }
}

/// One query module: its wire name, parameter prefix, parameters, and the
/// extraction of items from the `query` subtree of a response.
pub trait QueryModule: Send {
    type Item: DeserializeOwned + Send + 'static;

    /// The module name (`allpages`, `categorymembers`, ...).
    fn name(&self) -> &'static str;

    /// The parameter prefix (`ap`, `cm`, ...); `g` is prepended on top
    /// when the module runs as a generator.
    fn prefix(&self) -> &'static str;

    fn kind(&self) -> ModuleKind {
        ModuleKind::List
    }

    /// Writes the prefixed module parameters (without their prefix).
    fn write_params(&self, sink: &mut dyn ParamSink);

    /// Writes unprefixed parameters (page selectors for prop modules).
    fn base_params(&self, _params: &mut Params) {}

    /// Pulls this page of items out of the `query` subtree.
    fn extract(&mut self, query: &mut Value) -> Result<Vec<Self::Item>> {
        extract_list_items(query, self.name())
    }
}

/// Default extraction for list modules: the array under
/// `query.<module>`.
pub fn extract_list_items<T: DeserializeOwned>(
    query: &mut Value,
    name: &str,
) -> Result<Vec<T>> {
    match query.get_mut(name) {
        Some(items) => Ok(serde_json::from_value(items.take())?),
        None => Ok(Vec::new()),
    }
}

/// Extraction for prop modules: the array under the first entry of
/// `query.pages`.
pub fn extract_prop_items<T: DeserializeOwned>(
    query: &mut Value,
    name: &str,
) -> Result<Vec<T>> {
    let Some(pages) = query.get_mut("pages").and_then(Value::as_array_mut) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for page in pages {
        if let Some(items) = page.get_mut(name) {
            let items: Vec<T> = serde_json::from_value(items.take())?;
            out.extend(items);
        }
    }
    Ok(out)
}

/// The server-side cursor state of one iteration.
#[derive(Debug, Default)]
enum ContinuationState {
    #[default]
    Initial,
    Paging(Map<String, Value>),
    End,
    /// Entered on cancellation; every later `next_page` re-raises.
    Faulted,
}

/// A pull-based sequence over a list/prop module: each `next_page` call
/// issues one request and advances the server-side cursor.
pub struct ListSource<M: QueryModule> {
    site: Site,
    module: M,
    state: ContinuationState,
    cancel: CancellationToken,
}

impl<M: QueryModule> ListSource<M> {
    pub fn new(site: Site, module: M) -> Self {
        Self {
            site,
            module,
            state: ContinuationState::Initial,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn module(&self) -> &M {
        &self.module
    }

    /// Drops any cursor state so the next `next_page` re-issues the first
    /// query.
    pub fn restart(&mut self) {
        self.state = ContinuationState::Initial;
    }

    fn build_message(&self) -> Result<RequestMessage> {
        let mut params = Params::new();
        params.insert("action", "query");
        match self.module.kind() {
            ModuleKind::List => params.insert("list", self.module.name()),
            ModuleKind::Prop => params.insert("prop", self.module.name()),
        }
        self.module.base_params(&mut params);
        {
            let mut sink = Prefixed::new(&mut params, self.module.prefix());
            self.module.write_params(&mut sink);
        }
        let mut message = RequestMessage::get(params);
        if let ContinuationState::Paging(cont) = &self.state {
            message = message.with_raw_query(serde_urlencoded::to_string(cont)?);
        }
        Ok(message)
    }

    /// Folds a response into the cursor state and extracts its items.
    fn absorb(&mut self, mut value: Value) -> Result<Vec<M::Item>> {
        let cont = take_continuation(&mut value);
        let items = match value.get_mut("query") {
            Some(query) => {
                if self.site.format_version() == 1 {
                    upgrade_legacy_pages(query);
                }
                self.module.extract(query)?
            }
            None => Vec::new(),
        };
        trace!(module = self.module.name(), n = items.len(), more = cont.is_some(), "page received");
        self.state = match cont {
            Some(c) => ContinuationState::Paging(c),
            None => ContinuationState::End,
        };
        Ok(items)
    }

    fn record_failure(&mut self, error: &Error) {
        if error.is_cancelled() {
            self.state = ContinuationState::Faulted;
        }
        // transient failures leave the cursor in place so the same page
        // can be re-requested
    }

    /// Fetches the next page of results, or `None` at end of stream.
    pub async fn next_page(&mut self) -> Result<Option<Vec<M::Item>>> {
        match self.state {
            ContinuationState::End => return Ok(None),
            ContinuationState::Faulted => return Err(Error::Cancelled),
            _ => {}
        }
        let message = self.build_message()?;
        match self.site.invoke_value(message, &self.cancel).await {
            Ok(value) => self.absorb(value).map(Some),
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Adapts the source into an item stream. Pagination stays
    /// demand-driven: a page is requested only once the previous one is
    /// drained.
    pub fn into_stream(self) -> ListStream<M>
    where
        M: 'static,
    {
        ListStream {
            source: Some(self),
            state: StreamState::Idle,
            span: trace_span!("list_stream"),
        }
    }
}

type PageFuture<M> = BoxFuture<
    'static,
    (
        ListSource<M>,
        Result<Option<Vec<<M as QueryModule>::Item>>>,
    ),
>;

#[pin_project(project = StreamStateProj)]
enum StreamState<M: QueryModule + 'static> {
    Idle,
    Fut(#[pin] PageFuture<M>),
    Values(VecDeque<M::Item>),
    Done,
}

/// Item-by-item stream over a [`ListSource`].
#[pin_project]
pub struct ListStream<M: QueryModule + 'static> {
    source: Option<ListSource<M>>,
    #[pin]
    state: StreamState<M>,
    span: tracing::Span,
}

impl<M: QueryModule + 'static> ListStream<M> {
    /// Hands the source back, e.g. to restart the iteration.
    pub fn into_source(self) -> Option<ListSource<M>> {
        self.source
    }
}

impl<M: QueryModule + 'static> Stream for ListStream<M> {
    type Item = Result<M::Item>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.as_mut().project();
        let _entered = this.span.enter();
        loop {
            match this.state.as_mut().project() {
                StreamStateProj::Idle => {
                    let Some(mut source) = this.source.take() else {
                        this.state.set(StreamState::Done);
                        continue;
                    };
                    if matches!(source.state, ContinuationState::End) {
                        *this.source = Some(source);
                        this.state.set(StreamState::Done);
                        return Poll::Ready(None);
                    }
                    let fut: PageFuture<M> = Box::pin(async move {
                        let res = source.next_page().await;
                        (source, res)
                    });
                    this.state.set(StreamState::Fut(fut));
                }
                StreamStateProj::Fut(fut) => match fut.poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready((source, res)) => {
                        *this.source = Some(source);
                        match res {
                            Err(e) => {
                                this.state.set(StreamState::Done);
                                return Poll::Ready(Some(Err(e)));
                            }
                            Ok(None) => {
                                this.state.set(StreamState::Done);
                                return Poll::Ready(None);
                            }
                            Ok(Some(items)) if items.is_empty() => {
                                this.state.set(StreamState::Idle);
                            }
                            Ok(Some(items)) => {
                                this.state.set(StreamState::Values(items.into()));
                            }
                        }
                    }
                },
                StreamStateProj::Values(values) => {
                    let item = values.pop_front();
                    let drained = values.is_empty();
                    if drained {
                        this.state.set(StreamState::Idle);
                    }
                    if let Some(item) = item {
                        return Poll::Ready(Some(Ok(item)));
                    }
                }
                StreamStateProj::Done => return Poll::Ready(None),
            }
        }
    }
}

/// A module upgraded to a page stream: the module runs as
/// `generator=<name>` and its page identities are joined with the
/// requested page properties in the same request.
pub struct PageSource<M: QueryModule> {
    site: Site,
    module: M,
    options: PageQueryOptions,
    state: ContinuationState,
    cancel: CancellationToken,
}

impl<M: QueryModule> PageSource<M> {
    pub fn new(site: Site, module: M, options: PageQueryOptions) -> Self {
        Self {
            site,
            module,
            options,
            state: ContinuationState::Initial,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn restart(&mut self) {
        self.state = ContinuationState::Initial;
    }

    fn build_message(&self) -> Result<RequestMessage> {
        let mut params = Params::new();
        params.insert("action", "query");
        params.insert("generator", self.module.name());
        self.module.base_params(&mut params);
        {
            let prefix = format!("g{}", self.module.prefix());
            let mut sink = Prefixed::new(&mut params, &prefix);
            self.module.write_params(&mut sink);
        }
        crate::page::write_page_query_params(&mut params, self.options);
        let mut message = RequestMessage::get(params);
        if let ContinuationState::Paging(cont) = &self.state {
            message = message.with_raw_query(serde_urlencoded::to_string(cont)?);
        }
        Ok(message)
    }

    /// Fetches the next page of page objects. Input order is preserved by
    /// sorting on the per-item `index` hint when the server provides one.
    pub async fn next_page(&mut self) -> Result<Option<Vec<WikiPage>>> {
        match self.state {
            ContinuationState::End => return Ok(None),
            ContinuationState::Faulted => return Err(Error::Cancelled),
            _ => {}
        }
        let message = self.build_message()?;
        let mut value = match self.site.invoke_value(message, &self.cancel).await {
            Ok(v) => v,
            Err(e) => {
                if e.is_cancelled() {
                    self.state = ContinuationState::Faulted;
                }
                return Err(e);
            }
        };
        let cont = take_continuation(&mut value);
        let mut pages = Vec::new();
        if let Some(query) = value.get_mut("query") {
            if self.site.format_version() == 1 {
                upgrade_legacy_pages(query);
            }
            if let Some(list) = query.get_mut("pages").and_then(Value::as_array_mut) {
                list.sort_by_key(|p| p.get("index").and_then(Value::as_i64).unwrap_or(i64::MAX));
                for page in list.iter() {
                    pages.push(WikiPage::from_query_value(&self.site, page));
                }
            }
        }
        self.state = match cont {
            Some(c) => ContinuationState::Paging(c),
            None => ContinuationState::End,
        };
        Ok(Some(pages))
    }

    /// Adapts the source into a page stream.
    pub fn into_stream(self) -> impl Stream<Item = Result<WikiPage>>
    where
        M: 'static,
    {
        futures_util::stream::try_unfold(self, |mut source| async move {
            match source.next_page().await? {
                Some(pages) => Ok::<_, Error>(Some((
                    futures_util::stream::iter(pages.into_iter().map(Ok)),
                    source,
                ))),
                None => Ok(None),
            }
        })
        .try_flatten()
    }
}

/// Takes up to `n` items from a stream, collecting them into a vector.
/// Convenience for the common "first page of results" shape.
pub async fn collect_n<S, T>(stream: S, n: usize) -> Result<Vec<T>>
where
    S: Stream<Item = Result<T>>,
{
    stream.take(n).try_collect().await
}
