//! Page handles: lazy views of one wiki page with refresh, edit, move,
//! delete and purge operations.

use std::collections::HashMap;

use bitflags::bitflags;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::req::edit::EditBuilder;
use crate::req::page_ops::{
    DeleteRequest, MoveOptions, MoveRequest, PageTarget, PurgeOptions, PurgeRequest,
};
use crate::req::query::QueryBuilder;
use crate::req::upload::UploadRequest;
use crate::req::{Params, RequestMessage};
use crate::res::upgrade_legacy_pages;
use crate::rev::{ApiFileRevision, ApiRevision, FileRevision, II_PROPS, RV_PROPS};
use crate::site::info::Namespace;
use crate::site::Site;
use crate::types::{AutoWatchBehavior, MwTimestamp};
use crate::upload::{parse_upload_result, UploadResult, UploadSource};

bitflags! {
    /// Sentinels for pages the server reports as unreachable or dynamic.
    pub struct PageStubFlags: u8 {
        const MISSING = 1 << 0;
        const INVALID = 1 << 1;
        const SPECIAL = 1 << 2;
    }
}

impl Default for PageStubFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// The identity of a page. Any of the three identifying fields may be
/// unknown; the flags preserve missing/invalid/special markers so a stub
/// round-trips without ambiguity.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct WikiPageStub {
    #[serde(rename = "pageid", default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "ns", default)]
    pub namespace_id: Option<i32>,
    #[serde(skip)]
    pub flags: PageStubFlags,
}

impl WikiPageStub {
    pub fn from_title(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: Some(title.into()),
            namespace_id: None,
            flags: PageStubFlags::empty(),
        }
    }

    pub fn from_id(id: u64) -> Self {
        Self {
            id: Some(id),
            title: None,
            namespace_id: None,
            flags: PageStubFlags::empty(),
        }
    }

    /// Reads identity and sentinel flags from one `query.pages` entry.
    pub(crate) fn from_value(v: &Value) -> Self {
        let mut flags = PageStubFlags::empty();
        for (key, flag) in [
            ("missing", PageStubFlags::MISSING),
            ("invalid", PageStubFlags::INVALID),
            ("special", PageStubFlags::SPECIAL),
        ] {
            if matches!(v.get(key), Some(Value::Bool(true)) | Some(Value::String(_))) {
                flags |= flag;
            }
        }
        Self {
            id: v.get("pageid").and_then(Value::as_u64),
            title: v.get("title").and_then(Value::as_str).map(str::to_owned),
            namespace_id: v.get("ns").and_then(Value::as_i64).map(|n| n as i32),
            flags,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.flags.contains(PageStubFlags::MISSING)
    }

    pub fn is_invalid(&self) -> bool {
        self.flags.contains(PageStubFlags::INVALID)
    }

    pub fn is_special(&self) -> bool {
        self.flags.contains(PageStubFlags::SPECIAL)
    }
}

bitflags! {
    /// What a refresh should fetch beyond the basic page record.
    pub struct PageQueryOptions: u8 {
        const FETCH_CONTENT       = 1 << 0;
        const RESOLVE_REDIRECTS   = 1 << 1;
        const FETCH_EXTRACT       = 1 << 2;
        const FETCH_GEO_COORDINATE = 1 << 3;
    }
}

impl Default for PageQueryOptions {
    fn default() -> Self {
        Self::empty()
    }
}

/// One protection rule on a page.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ProtectionInfo {
    #[serde(rename = "type")]
    pub protection_type: String,
    pub level: String,
    #[serde(default)]
    pub expiry: Option<String>,
}

/// A primary coordinate from the GeoData extension.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct GeoCoordinate {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub globe: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

/// Counters from `prop=categoryinfo`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct CategoryInfo {
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub pages: u64,
    #[serde(default)]
    pub files: u64,
    #[serde(default)]
    pub subcats: u64,
}

/// Kind-specific payload resolved during refresh.
#[derive(Clone, Debug)]
pub enum PageDetail {
    File { latest: FileRevision },
    Category(CategoryInfo),
}

/// A failed entry from a bulk purge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurgeFailure {
    pub title: String,
    pub reason: PurgeFailureReason,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurgeFailureReason {
    Missing,
    Invalid(String),
}

/// An in-memory handle to one page. Clones are independent; concurrent
/// mutation through clones is last-writer-wins.
#[derive(Clone, Debug)]
pub struct WikiPage {
    site: Site,
    stub: WikiPageStub,
    exists: Option<bool>,
    content: Option<String>,
    content_model: Option<String>,
    page_language: Option<String>,
    last_revision_id: Option<u64>,
    last_revision_timestamp: Option<MwTimestamp>,
    last_touched: Option<MwTimestamp>,
    content_length: Option<u64>,
    protections: Vec<ProtectionInfo>,
    restriction_types: Vec<String>,
    is_redirect: bool,
    redirect_path: Vec<String>,
    page_props: HashMap<String, String>,
    extract: Option<String>,
    coordinate: Option<GeoCoordinate>,
    detail: Option<PageDetail>,
}

impl Site {
    /// A handle to the page with the given title.
    pub fn page(&self, title: impl Into<String>) -> WikiPage {
        WikiPage::new(self.clone(), WikiPageStub::from_title(title))
    }

    /// A handle to the page with the given id.
    pub fn page_from_id(&self, id: u64) -> WikiPage {
        WikiPage::new(self.clone(), WikiPageStub::from_id(id))
    }
}

impl WikiPage {
    fn new(site: Site, stub: WikiPageStub) -> Self {
        Self {
            site,
            stub,
            exists: None,
            content: None,
            content_model: None,
            page_language: None,
            last_revision_id: None,
            last_revision_timestamp: None,
            last_touched: None,
            content_length: None,
            protections: Vec::new(),
            restriction_types: Vec::new(),
            is_redirect: false,
            redirect_path: Vec::new(),
            page_props: HashMap::new(),
            extract: None,
            coordinate: None,
            detail: None,
        }
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn stub(&self) -> &WikiPageStub {
        &self.stub
    }

    pub fn id(&self) -> Option<u64> {
        self.stub.id
    }

    pub fn title(&self) -> Option<&str> {
        self.stub.title.as_deref()
    }

    pub fn namespace_id(&self) -> Option<i32> {
        self.stub.namespace_id
    }

    /// Whether the page exists on the server; `None` before any refresh.
    pub fn exists(&self) -> Option<bool> {
        self.exists
    }

    pub fn is_special_page(&self) -> bool {
        self.stub.is_special()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    /// Replaces the local content; pushed to the server by
    /// [`WikiPage::update_content`].
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = Some(content.into());
    }

    pub fn content_model(&self) -> Option<&str> {
        self.content_model.as_deref()
    }

    pub fn page_language(&self) -> Option<&str> {
        self.page_language.as_deref()
    }

    pub fn last_revision_id(&self) -> Option<u64> {
        self.last_revision_id
    }

    pub fn last_touched(&self) -> Option<MwTimestamp> {
        self.last_touched
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn protections(&self) -> &[ProtectionInfo] {
        &self.protections
    }

    pub fn restriction_types(&self) -> &[String] {
        &self.restriction_types
    }

    pub fn is_redirect(&self) -> bool {
        self.is_redirect
    }

    /// Intermediate titles traversed when redirects were resolved, in
    /// traversal order.
    pub fn redirect_path(&self) -> &[String] {
        &self.redirect_path
    }

    pub fn page_properties(&self) -> &HashMap<String, String> {
        &self.page_props
    }

    pub fn extract(&self) -> Option<&str> {
        self.extract.as_deref()
    }

    pub fn coordinate(&self) -> Option<&GeoCoordinate> {
        self.coordinate.as_ref()
    }

    pub fn detail(&self) -> Option<&PageDetail> {
        self.detail.as_ref()
    }

    /// The latest file revision, for file pages.
    pub fn file_revision(&self) -> Option<&FileRevision> {
        match &self.detail {
            Some(PageDetail::File { latest }) => Some(latest),
            _ => None,
        }
    }

    pub fn category_info(&self) -> Option<&CategoryInfo> {
        match &self.detail {
            Some(PageDetail::Category(info)) => Some(info),
            _ => None,
        }
    }

    /// Reloads this handle from the server.
    pub async fn refresh(
        &mut self,
        options: PageQueryOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut pages = [self];
        refresh_pages_inner(&mut pages, options, cancel).await
    }

    /// Reloads a batch of handles with as few requests as the server's
    /// limits allow (50 titles per request, 500 with `apihighlimits`).
    pub async fn refresh_pages(
        pages: &mut [WikiPage],
        options: PageQueryOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut refs: Vec<&mut WikiPage> = pages.iter_mut().collect();
        refresh_pages_inner(&mut refs, options, cancel).await
    }

    /// Pushes the local content to the server. Returns `true` iff the
    /// server recorded a real change.
    pub async fn update_content(
        &mut self,
        summary: &str,
        minor: bool,
        bot: bool,
        watch: AutoWatchBehavior,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let content = self
            .content
            .clone()
            .ok_or(Error::InvalidOperation("no local content to save"))?;
        let summary = summary.to_owned();
        let base_timestamp = self.last_revision_timestamp;
        let target = self.edit_target()?;
        let value = self
            .site
            .mutating_invoke(cancel, move |token| {
                let mut builder = EditBuilder::new()
                    .text(content.clone())
                    .summary(summary.clone())
                    .watchlist(watch)
                    .token(token);
                builder = match &target {
                    PageTarget::Title(t) => builder.title(t.clone()),
                    PageTarget::Id(id) => builder.page_id(*id),
                };
                if minor {
                    builder = builder.minor();
                }
                if bot {
                    builder = builder.bot();
                }
                if let Some(ts) = base_timestamp {
                    builder = builder.basetimestamp(ts);
                }
                builder.build()
            })
            .await?;
        let edit = value.get("edit").cloned().unwrap_or(Value::Null);
        let changed = edit.get("nochange").is_none();
        if let Some(revid) = edit.get("newrevid").and_then(Value::as_u64) {
            self.last_revision_id = Some(revid);
        }
        if let Some(ts) = edit.get("newtimestamp").and_then(Value::as_str) {
            if let Ok(ts) = MwTimestamp::parse(ts) {
                self.last_revision_timestamp = Some(ts);
            }
        }
        if let Some(id) = edit.get("pageid").and_then(Value::as_u64) {
            self.stub.id = Some(id);
        }
        self.exists = Some(true);
        debug!(title = ?self.stub.title, changed, "edit saved");
        Ok(changed)
    }

    /// Moves (renames) the page. On success the handle tracks the new
    /// title.
    pub async fn move_to(
        &mut self,
        new_title: &str,
        reason: Option<&str>,
        options: MoveOptions,
        watch: AutoWatchBehavior,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let target = self.edit_target()?;
        let new_title_owned = new_title.to_owned();
        let reason = reason.map(str::to_owned);
        let value = self
            .site
            .mutating_invoke(cancel, move |token| {
                MoveRequest {
                    from: match &target {
                        PageTarget::Title(t) => PageTarget::Title(t.clone()),
                        PageTarget::Id(id) => PageTarget::Id(*id),
                    },
                    to: new_title_owned.clone(),
                    reason: reason.clone(),
                    options,
                    watch,
                    token,
                }
                .build()
            })
            .await?;
        if let Some(to) = value
            .get("move")
            .and_then(|m| m.get("to"))
            .and_then(Value::as_str)
        {
            self.stub.title = Some(to.to_owned());
        }
        Ok(())
    }

    /// Deletes the page. Returns `false` when the page was already gone.
    pub async fn delete(
        &mut self,
        reason: Option<&str>,
        watch: AutoWatchBehavior,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let target = self.edit_target()?;
        let reason = reason.map(str::to_owned);
        let result = self
            .site
            .mutating_invoke(cancel, move |token| {
                DeleteRequest {
                    target: match &target {
                        PageTarget::Title(t) => PageTarget::Title(t.clone()),
                        PageTarget::Id(id) => PageTarget::Id(*id),
                    },
                    reason: reason.clone(),
                    watch,
                    token,
                }
                .build()
            })
            .await;
        match result {
            Ok(_) => {
                self.exists = Some(false);
                self.clear_content_fields();
                Ok(true)
            }
            Err(Error::OperationFailed(api))
                if api.code == "missingtitle" || api.code == "cantdelete" =>
            {
                self.exists = Some(false);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Purges the parser cache of a batch of pages; the returned records
    /// describe the pages the server refused.
    pub async fn purge_pages(
        pages: &[WikiPage],
        options: PurgeOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<PurgeFailure>> {
        let Some(first) = pages.first() else {
            return Ok(Vec::new());
        };
        let site = &first.site;
        let titles: Vec<String> = pages
            .iter()
            .filter_map(|p| p.stub.title.clone())
            .collect();
        let chunk_size = site_batch_limit(site);
        let mut failures = Vec::new();
        for chunk in titles.chunks(chunk_size) {
            let params = PurgeRequest {
                titles: chunk.to_vec(),
                options,
            }
            .build();
            let value = site
                .invoke_value(RequestMessage::post(params), cancel)
                .await?;
            if let Some(results) = value.get("purge").and_then(Value::as_array) {
                for entry in results {
                    let title = entry
                        .get("title")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned();
                    if flag_set(entry, "invalid") {
                        failures.push(PurgeFailure {
                            title,
                            reason: PurgeFailureReason::Invalid(
                                entry
                                    .get("invalidreason")
                                    .and_then(Value::as_str)
                                    .unwrap_or_default()
                                    .to_owned(),
                            ),
                        });
                    } else if flag_set(entry, "missing") {
                        failures.push(PurgeFailure {
                            title,
                            reason: PurgeFailureReason::Missing,
                        });
                    }
                }
            }
        }
        Ok(failures)
    }

    /// Purges this page alone.
    pub async fn purge(
        &self,
        options: PurgeOptions,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let failures =
            Self::purge_pages(std::slice::from_ref(self), options, cancel).await?;
        Ok(failures.is_empty())
    }

    /// If this page is a redirect, returns a new handle refreshed onto the
    /// final target.
    pub async fn get_redirect_target(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<WikiPage>> {
        if !self.is_redirect {
            return Ok(None);
        }
        let mut target = WikiPage::new(self.site.clone(), self.stub.clone());
        target
            .refresh(PageQueryOptions::RESOLVE_REDIRECTS, cancel)
            .await?;
        Ok(Some(target))
    }

    /// Whether the page is a disambiguation page: by the Disambiguator
    /// page prop when the extension is installed, by transclusion of the
    /// site's disambiguation templates otherwise.
    pub async fn is_disambiguation(&mut self, cancel: &CancellationToken) -> Result<bool> {
        let info = self.site.site_info()?;
        if info.has_extension("Disambiguator") {
            if self.exists.is_none() {
                self.refresh(PageQueryOptions::empty(), cancel).await?;
            }
            return Ok(self.page_props.contains_key("disambiguation"));
        }
        let templates = self.site.disambiguation_templates(cancel).await?.clone();
        if templates.is_empty() {
            return Ok(false);
        }
        let title = self
            .stub
            .title
            .clone()
            .ok_or_else(|| Error::InvalidResponse("page handle has no title".to_owned()))?;
        let params = QueryBuilder::new()
            .titles([title])
            .prop("templates")
            .param("tlnamespace", Namespace::TEMPLATE)
            .param("tltemplates", templates.join("|"))
            .build();
        let value = self
            .site
            .invoke_value(RequestMessage::get(params), cancel)
            .await?;
        let transcluded = value
            .get("query")
            .and_then(|q| q.get("pages"))
            .and_then(Value::as_array)
            .map(|pages| {
                pages.iter().any(|p| {
                    p.get("templates")
                        .and_then(Value::as_array)
                        .map(|t| !t.is_empty())
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false);
        Ok(transcluded)
    }

    /// Uploads a file to this page's title, committing a stashed key,
    /// fetching a URL, or sending bytes directly.
    pub async fn upload(
        &mut self,
        source: UploadSource,
        comment: Option<&str>,
        ignore_warnings: bool,
        watch: AutoWatchBehavior,
        cancel: &CancellationToken,
    ) -> Result<UploadResult> {
        let title = self
            .stub
            .title
            .clone()
            .ok_or_else(|| Error::InvalidResponse("page handle has no title".to_owned()))?;
        let info = self.site.site_info()?;
        let filename = strip_file_namespace(&title, &info);
        let retry_copy = source.try_clone();
        let comment = comment.map(str::to_owned);

        let token = self.site.get_token("csrf", cancel).await?;
        let build = |token: String, source: UploadSource| {
            UploadRequest {
                filename: filename.clone(),
                comment: comment.clone(),
                text: None,
                watch,
                ignore_warnings,
                token,
                body: source.into_upload_body(&info),
            }
            .build()
        };
        let gate = self.site.mutation_gate().await;
        let result = self
            .site
            .invoke_value(RequestMessage::post(build(token, source)), cancel)
            .await;
        gate.mark();
        let value = match result {
            Err(Error::BadToken(_)) if retry_copy.is_some() => {
                self.site.invalidate_token("csrf");
                let token = self.site.get_token("csrf", cancel).await?;
                let gate = self.site.mutation_gate().await;
                let retried = self
                    .site
                    .invoke_value(
                        RequestMessage::post(build(
                            token,
                            retry_copy.expect("checked above"),
                        )),
                        cancel,
                    )
                    .await;
                gate.mark();
                retried?
            }
            other => other?,
        };
        let result = parse_upload_result(&value, self.stub.clone())?;
        if result.is_warning() && !ignore_warnings {
            return Err(Error::UploadWarning(Box::new(result)));
        }
        if let Some(rev) = &result.file_revision {
            self.detail = Some(PageDetail::File {
                latest: rev.clone(),
            });
            self.exists = Some(true);
        }
        Ok(result)
    }

    fn edit_target(&self) -> Result<PageTarget> {
        if let Some(title) = &self.stub.title {
            Ok(PageTarget::Title(title.clone()))
        } else if let Some(id) = self.stub.id {
            Ok(PageTarget::Id(id))
        } else {
            Err(Error::InvalidResponse(
                "page handle has neither title nor id".to_owned(),
            ))
        }
    }

    fn clear_content_fields(&mut self) {
        self.content = None;
        self.content_model = None;
        self.page_language = None;
        self.last_revision_id = None;
        self.last_revision_timestamp = None;
        self.last_touched = None;
        self.content_length = None;
        self.protections.clear();
        self.is_redirect = false;
        self.page_props.clear();
        self.extract = None;
        self.coordinate = None;
        self.detail = None;
    }

    /// Builds a handle from one `query.pages` entry, as the page-stream
    /// generators receive them.
    pub(crate) fn from_query_value(site: &Site, entry: &Value) -> WikiPage {
        let mut page = WikiPage::new(site.clone(), WikiPageStub::from_value(entry));
        page.load_entry(entry);
        page
    }

    /// Populates the handle from one `query.pages` entry.
    fn load_entry(&mut self, entry: &Value) {
        let stub = WikiPageStub::from_value(entry);
        // identity is preserved even for missing pages
        if stub.title.is_some() {
            self.stub.title = stub.title;
        }
        if stub.id.is_some() {
            self.stub.id = stub.id;
        }
        if stub.namespace_id.is_some() {
            self.stub.namespace_id = stub.namespace_id;
        }
        self.stub.flags = stub.flags;

        if self.stub.is_missing() || self.stub.is_invalid() {
            self.exists = Some(false);
            self.clear_content_fields();
            return;
        }
        if self.stub.is_special() {
            self.exists = Some(true);
            self.clear_content_fields();
            self.content_length = Some(0);
            return;
        }
        self.exists = Some(true);
        self.content_model = entry
            .get("contentmodel")
            .and_then(Value::as_str)
            .map(str::to_owned);
        self.page_language = entry
            .get("pagelanguage")
            .and_then(Value::as_str)
            .map(str::to_owned);
        self.last_revision_id = entry.get("lastrevid").and_then(Value::as_u64);
        self.last_touched = entry
            .get("touched")
            .and_then(Value::as_str)
            .and_then(|s| MwTimestamp::parse(s).ok());
        self.content_length = entry.get("length").and_then(Value::as_u64);
        self.is_redirect = flag_set(entry, "redirect");
        self.protections = entry
            .get("protection")
            .cloned()
            .map(|p| serde_json::from_value(p).unwrap_or_default())
            .unwrap_or_default();
        self.restriction_types = entry
            .get("restrictiontypes")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        self.page_props = entry
            .get("pageprops")
            .and_then(Value::as_object)
            .map(|o| {
                o.iter()
                    .map(|(k, v)| {
                        let v = v.as_str().map(str::to_owned).unwrap_or_else(|| v.to_string());
                        (k.clone(), v)
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.extract = entry
            .get("extract")
            .and_then(Value::as_str)
            .map(str::to_owned);
        self.coordinate = entry
            .get("coordinates")
            .and_then(Value::as_array)
            .and_then(|a| a.first())
            .and_then(|c| serde_json::from_value(c.clone()).ok());

        if let Some(revisions) = entry.get("revisions").and_then(Value::as_array) {
            if let Some(rev) = revisions.first() {
                if let Ok(rev) = serde_json::from_value::<ApiRevision>(rev.clone()) {
                    let rev = rev.into_revision(self.stub.clone());
                    self.last_revision_timestamp = rev.timestamp;
                    if self.last_revision_id.is_none() {
                        self.last_revision_id = Some(rev.id);
                    }
                    if rev.content.is_some() {
                        self.content = rev.content;
                    }
                    if self.content_model.is_none() {
                        self.content_model = rev.content_model;
                    }
                }
            }
        }

        self.detail = None;
        if let Some(info) = entry.get("categoryinfo") {
            if let Ok(info) = serde_json::from_value::<CategoryInfo>(info.clone()) {
                self.detail = Some(PageDetail::Category(info));
            }
        }
        if let Some(revs) = entry.get("imageinfo").and_then(Value::as_array) {
            if let Some(first) = revs.first() {
                if let Ok(rev) = serde_json::from_value::<ApiFileRevision>(first.clone()) {
                    self.detail = Some(PageDetail::File {
                        latest: rev.into_file_revision(self.stub.clone()),
                    });
                }
            }
        }
    }
}

fn flag_set(v: &Value, key: &str) -> bool {
    matches!(v.get(key), Some(Value::Bool(true)) | Some(Value::String(_)))
}

fn strip_file_namespace(title: &str, info: &crate::site::info::SiteInfo) -> String {
    if let Some((prefix, rest)) = title.split_once(':') {
        if let Some(ns) = info.namespaces.resolve(prefix) {
            if ns.id == Namespace::FILE {
                return rest.trim().to_owned();
            }
        }
    }
    title.to_owned()
}

fn site_batch_limit(site: &Site) -> usize {
    if site.account_info().has_right("apihighlimits") {
        500
    } else {
        50
    }
}

/// Writes the `prop=` selection and its dependent parameters for a page
/// data query; shared between refresh and the page-stream generators.
pub(crate) fn write_page_query_params(params: &mut Params, options: PageQueryOptions) {
    let mut prop = vec!["info", "pageprops", "revisions", "categoryinfo", "imageinfo"];
    if options.contains(PageQueryOptions::FETCH_EXTRACT) {
        prop.push("extracts");
    }
    if options.contains(PageQueryOptions::FETCH_GEO_COORDINATE) {
        prop.push("coordinates");
    }
    params.insert("prop", prop.join("|"));
    params.insert("inprop", "protection");
    let mut rvprop = RV_PROPS.to_owned();
    if options.contains(PageQueryOptions::FETCH_CONTENT) {
        rvprop.push_str("|content");
        params.insert("rvslots", "main");
    }
    params.insert("rvprop", rvprop);
    params.insert("iiprop", II_PROPS);
    if options.contains(PageQueryOptions::FETCH_EXTRACT) {
        params.insert("exintro", true);
        params.insert("explaintext", true);
        params.insert("exlimit", "max");
    }
    if options.contains(PageQueryOptions::RESOLVE_REDIRECTS) {
        params.insert("redirects", true);
    }
}

async fn refresh_pages_inner(
    pages: &mut [&mut WikiPage],
    options: PageQueryOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let Some(first) = pages.first() else {
        return Ok(());
    };
    let site = first.site.clone();

    // extracts are served at most 20 pages at a time
    let mut chunk_size = site_batch_limit(&site);
    if options.contains(PageQueryOptions::FETCH_EXTRACT) {
        chunk_size = chunk_size.min(20);
    }

    // partition into title-addressed and id-addressed handles
    let mut by_title: Vec<usize> = Vec::new();
    let mut by_id: Vec<usize> = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        if page.stub.title.is_some() {
            by_title.push(i);
        } else if page.stub.id.is_some() {
            by_id.push(i);
        }
    }

    for chunk in by_title.chunks(chunk_size) {
        let titles: Vec<String> = chunk
            .iter()
            .map(|&i| pages[i].stub.title.clone().expect("partitioned by title"))
            .collect();
        let build = || {
            let mut params = Params::new();
            params.insert("action", "query");
            params.insert("titles", titles.clone());
            write_page_query_params(&mut params, options);
            if chunk.len() == 1 {
                params.insert("rvlimit", 1u64);
            }
            params
        };
        let value = fetch_folded(&site, build, cancel).await?;
        apply_refresh_response(&site, pages, chunk, value, options)?;
    }
    for chunk in by_id.chunks(chunk_size) {
        let ids: Vec<String> = chunk
            .iter()
            .map(|&i| pages[i].stub.id.expect("partitioned by id").to_string())
            .collect();
        let build = || {
            let mut params = Params::new();
            params.insert("action", "query");
            params.insert("pageids", ids.clone());
            write_page_query_params(&mut params, options);
            if chunk.len() == 1 {
                params.insert("rvlimit", 1u64);
            }
            params
        };
        let value = fetch_folded(&site, build, cancel).await?;
        apply_refresh_response(&site, pages, chunk, value, options)?;
    }
    Ok(())
}

/// Issues a page-data query, following prop continuation (`rvcontinue` and
/// friends) until the batch is complete and folding every response into
/// one value.
async fn fetch_folded<F: Fn() -> Params>(
    site: &Site,
    build: F,
    cancel: &CancellationToken,
) -> Result<Value> {
    let mut value = site
        .invoke_value(RequestMessage::get(build()), cancel)
        .await?;
    while let Some(cont) = crate::res::take_continuation(&mut value) {
        let message = RequestMessage::get(build())
            .with_raw_query(serde_urlencoded::to_string(&cont)?);
        let next = site.invoke_value(message, cancel).await?;
        crate::util::merge_values(&mut value, next);
    }
    Ok(value)
}

/// Matches one query response back onto the handles of a chunk: by
/// normalised title first, then by id.
fn apply_refresh_response(
    site: &Site,
    pages: &mut [&mut WikiPage],
    chunk: &[usize],
    mut value: Value,
    options: PageQueryOptions,
) -> Result<()> {
    let Some(query) = value.get_mut("query") else {
        return Err(crate::rev::missing_query());
    };
    if site.format_version() == 1 {
        upgrade_legacy_pages(query);
    }

    let normalized: HashMap<String, String> = mapping_pairs(query.get("normalized"));
    let redirects: HashMap<String, String> = mapping_pairs(query.get("redirects"));

    // a folded continuation repeats page entries; merge them per page
    let raw_pages = match query.get_mut("pages").map(Value::take) {
        Some(Value::Array(a)) => a,
        _ => Vec::new(),
    };
    let mut entries: Vec<Value> = Vec::new();
    for entry in raw_pages {
        let existing = entries.iter().position(|e| {
            let same_id = matches!(
                (
                    e.get("pageid").and_then(Value::as_u64),
                    entry.get("pageid").and_then(Value::as_u64),
                ),
                (Some(a), Some(b)) if a == b
            );
            same_id
                || (entry.get("title").is_some() && e.get("title") == entry.get("title"))
        });
        match existing {
            Some(i) => crate::util::merge_values(&mut entries[i], entry),
            None => entries.push(entry),
        }
    }

    let mut by_title: HashMap<String, &Value> = HashMap::new();
    let mut by_id: HashMap<u64, &Value> = HashMap::new();
    for entry in &entries {
        if let Some(title) = entry.get("title").and_then(Value::as_str) {
            by_title.insert(title.to_owned(), entry);
        }
        if let Some(id) = entry.get("pageid").and_then(Value::as_u64) {
            by_id.insert(id, entry);
        }
    }

    for &i in chunk {
        let page = &mut *pages[i];
        let entry = match (&page.stub.title, page.stub.id) {
            (Some(title), _) => {
                let mut current = normalized.get(title).unwrap_or(title).clone();
                let mut path = Vec::new();
                if options.contains(PageQueryOptions::RESOLVE_REDIRECTS) {
                    let mut seen = std::collections::HashSet::new();
                    while let Some(next) = redirects.get(&current) {
                        if !seen.insert(current.clone()) {
                            return Err(Error::CircularRedirect(current));
                        }
                        path.push(current);
                        current = next.clone();
                    }
                }
                let entry = by_title.get(&current).copied();
                if entry.is_some() {
                    page.stub.title = Some(current);
                    page.redirect_path = path;
                }
                entry
            }
            (None, Some(id)) => by_id.get(&id).copied(),
            (None, None) => None,
        };
        match entry {
            Some(entry) => page.load_entry(entry),
            None => {
                page.exists = Some(false);
                page.clear_content_fields();
            }
        }
    }
    Ok(())
}

fn mapping_pairs(value: Option<&Value>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(Value::Array(items)) = value {
        for item in items {
            if let (Some(from), Some(to)) = (
                item.get("from").and_then(Value::as_str),
                item.get("to").and_then(Value::as_str),
            ) {
                map.insert(from.to_owned(), to.to_owned());
            }
        }
    }
    map
}
