//! The site controller: one `api.php` endpoint, its bootstrapped metadata,
//! the session account state, and the token cache.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bitflags::bitflags;
use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, OnceCell};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ApiError, Error, Result};
use crate::req::login::{logout as logout_params, ClientLogin, Login};
use crate::req::query::QueryBuilder;
use crate::req::{Params, RequestMessage};
use crate::res::{ParseContext, RawJsonParser, ResponseParser};
use crate::transport::WikiClient;
use crate::types::Limit;

pub mod info;
mod token;

use info::{AccountInfo, SiteInfo};
use token::TokenCache;

bitflags! {
    /// Which `assert=` parameter mutating calls carry.
    pub struct AccountAssertion: u8 {
        const ASSERT_USER = 1 << 0;
        const ASSERT_BOT  = 1 << 1;
    }
}

/// Which login action to speak.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum LoginPolicy {
    /// `clientlogin` on servers ≥ 1.27, legacy `login` below.
    #[default]
    Auto,
    Legacy,
    ClientLogin,
}

/// Per-site behaviour knobs.
#[derive(Clone, Debug)]
pub struct SiteOptions {
    pub assertion: AccountAssertion,
    /// Skip the site-info bootstrap until the caller asks; operations that
    /// need site info fail with [`Error::SiteNotInitialized`] until then.
    pub explicit_info_refresh: bool,
    /// Minimum gap between mutating calls on this site.
    pub throttle_time: Duration,
    pub login_policy: LoginPolicy,
    /// `maxlag` value attached to mutating calls.
    pub maxlag: Option<u64>,
}

impl Default for SiteOptions {
    fn default() -> Self {
        Self {
            assertion: AccountAssertion::empty(),
            explicit_info_refresh: false,
            throttle_time: Duration::ZERO,
            login_policy: LoginPolicy::Auto,
            maxlag: Some(5),
        }
    }
}

type ReauthHandler =
    Arc<dyn Fn(Site) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static>;

struct SiteInner {
    client: Arc<WikiClient>,
    endpoint: Url,
    options: SiteOptions,
    info: RwLock<Option<Arc<SiteInfo>>>,
    account: RwLock<AccountInfo>,
    tokens: TokenCache,
    mutation_gate: AsyncMutex<Option<Instant>>,
    reauth: RwLock<Option<ReauthHandler>>,
    disambig_templates: OnceCell<Vec<String>>,
}

/// A controller for one wiki site. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Site {
    inner: Arc<SiteInner>,
}

impl std::fmt::Debug for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Site")
            .field("endpoint", &self.inner.endpoint)
            .finish()
    }
}

impl Site {
    /// Creates a controller without touching the network. Call
    /// [`Site::bootstrap`] before operations that need site info, or use
    /// [`Site::connect`].
    pub fn new(client: Arc<WikiClient>, endpoint: &str) -> Result<Self> {
        Self::with_options(client, endpoint, SiteOptions::default())
    }

    pub fn with_options(
        client: Arc<WikiClient>,
        endpoint: &str,
        options: SiteOptions,
    ) -> Result<Self> {
        let endpoint: Url = endpoint.parse()?;
        Ok(Self {
            inner: Arc::new(SiteInner {
                client,
                endpoint,
                options,
                info: RwLock::new(None),
                account: RwLock::new(AccountInfo::anonymous()),
                tokens: TokenCache::default(),
                mutation_gate: AsyncMutex::new(None),
                reauth: RwLock::new(None),
                disambig_templates: OnceCell::new(),
            }),
        })
    }

    /// Creates a controller and bootstraps it in one step (unless the
    /// options ask for explicit refresh).
    pub async fn connect(
        client: Arc<WikiClient>,
        endpoint: &str,
        options: SiteOptions,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let site = Self::with_options(client, endpoint, options)?;
        if !site.inner.options.explicit_info_refresh {
            site.bootstrap(cancel).await?;
        }
        Ok(site)
    }

    /// Creates a controller seeded with previously obtained site info, for
    /// restored sessions and offline use.
    pub fn with_site_info(
        client: Arc<WikiClient>,
        endpoint: &str,
        info: SiteInfo,
    ) -> Result<Self> {
        let site = Self::new(client, endpoint)?;
        *site.inner.info.write().expect("site info lock poisoned") = Some(Arc::new(info));
        Ok(site)
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    pub fn client(&self) -> &WikiClient {
        &self.inner.client
    }

    pub fn options(&self) -> &SiteOptions {
        &self.inner.options
    }

    /// The bootstrapped site info.
    pub fn site_info(&self) -> Result<Arc<SiteInfo>> {
        self.inner
            .info
            .read()
            .expect("site info lock poisoned")
            .clone()
            .ok_or(Error::SiteNotInitialized)
    }

    pub fn account_info(&self) -> AccountInfo {
        self.inner
            .account
            .read()
            .expect("account lock poisoned")
            .clone()
    }

    /// The JSON format version spoken to this server: 2 unless the server
    /// is known to predate 1.25.
    pub fn format_version(&self) -> u8 {
        match self.site_info() {
            Ok(info) if !info.version.at_least(1, 25) => 1,
            _ => 2,
        }
    }

    /// Installs a callback invoked once when an account assertion fails;
    /// the failed call is then retried.
    pub fn set_reauth_handler<F>(&self, handler: F)
    where
        F: Fn(Site) -> BoxFuture<'static, Result<()>> + Send + Sync + 'static,
    {
        *self.inner.reauth.write().expect("reauth lock poisoned") = Some(Arc::new(handler));
    }

    /// Fetches `meta=siteinfo|userinfo` in one request and populates the
    /// site and account records.
    pub async fn bootstrap(&self, cancel: &CancellationToken) -> Result<()> {
        let params = QueryBuilder::new()
            .meta("siteinfo")
            .meta("userinfo")
            .param(
                "siprop",
                "general|namespaces|namespacealiases|interwikimap|extensions|magicwords",
            )
            .param("uiprop", "groups|rights")
            .build();
        let value = self
            .invoke(RequestMessage::get(params), &RawJsonParser, cancel)
            .await?;
        let query = value
            .get("query")
            .ok_or_else(|| Error::InvalidResponse("siteinfo response lacks query".to_owned()))?;
        let info = SiteInfo::from_query(query)?;
        debug!(site = %info.site_name, version = %info.generator, "site info loaded");
        let account = query
            .get("userinfo")
            .map(AccountInfo::from_userinfo)
            .unwrap_or_default();
        *self.inner.info.write().expect("site info lock poisoned") = Some(Arc::new(info));
        *self.inner.account.write().expect("account lock poisoned") = account;
        Ok(())
    }

    pub async fn refresh_site_info(&self, cancel: &CancellationToken) -> Result<()> {
        let params = QueryBuilder::new()
            .meta("siteinfo")
            .param(
                "siprop",
                "general|namespaces|namespacealiases|interwikimap|extensions|magicwords",
            )
            .build();
        let value = self
            .invoke(RequestMessage::get(params), &RawJsonParser, cancel)
            .await?;
        let query = value
            .get("query")
            .ok_or_else(|| Error::InvalidResponse("siteinfo response lacks query".to_owned()))?;
        let info = SiteInfo::from_query(query)?;
        *self.inner.info.write().expect("site info lock poisoned") = Some(Arc::new(info));
        Ok(())
    }

    pub async fn refresh_account_info(&self, cancel: &CancellationToken) -> Result<()> {
        let params = QueryBuilder::new()
            .meta("userinfo")
            .param("uiprop", "groups|rights")
            .build();
        let value = self
            .invoke(RequestMessage::get(params), &RawJsonParser, cancel)
            .await?;
        let userinfo = value
            .get("query")
            .and_then(|q| q.get("userinfo"))
            .ok_or_else(|| Error::InvalidResponse("userinfo response lacks query".to_owned()))?;
        *self.inner.account.write().expect("account lock poisoned") =
            AccountInfo::from_userinfo(userinfo);
        Ok(())
    }

    /// Core dispatch: appends the format parameters, injects `assert=` and
    /// `maxlag` on mutating calls, sends through the transport, and runs
    /// the one-shot re-auth retry on assertion failure.
    pub async fn invoke<P: ResponseParser>(
        &self,
        mut message: RequestMessage,
        parser: &P,
        cancel: &CancellationToken,
    ) -> Result<P::Output> {
        let mutating = message.params().get("token").is_some()
            && message.method() == crate::req::HttpMethod::Post;
        if mutating {
            let assertion = self.inner.options.assertion;
            if assertion.contains(AccountAssertion::ASSERT_BOT) {
                message.params_mut().insert("assert", "bot");
            } else if assertion.contains(AccountAssertion::ASSERT_USER) {
                message.params_mut().insert("assert", "user");
            }
            if let Some(lag) = self.inner.options.maxlag {
                message.params_mut().insert("maxlag", lag);
            }
        }
        message.params_mut().insert("format", "json");
        if self.format_version() == 2 {
            message.params_mut().insert("formatversion", "2");
        }

        let first = self
            .inner
            .client
            .invoke(&self.inner.endpoint, &message, parser, cancel)
            .await;
        match first {
            Err(Error::AccountAssertion(api)) if message.retriable() => {
                let handler = self
                    .inner
                    .reauth
                    .read()
                    .expect("reauth lock poisoned")
                    .clone();
                match handler {
                    Some(handler) => {
                        warn!(code = %api.code, "account assertion failed, re-authenticating");
                        handler(self.clone()).await?;
                        self.inner
                            .client
                            .invoke(&self.inner.endpoint, &message, parser, cancel)
                            .await
                    }
                    None => Err(Error::AccountAssertion(api)),
                }
            }
            other => other,
        }
    }

    /// [`Site::invoke`] shorthand returning the raw JSON value.
    pub async fn invoke_value(
        &self,
        message: RequestMessage,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.invoke(message, &RawJsonParser, cancel).await
    }

    /// Runs a token-bearing mutating action: takes the modification gate,
    /// builds the parameters around a csrf token, and on `badtoken`
    /// invalidates the cache and retries exactly once. The badtoken retry
    /// does not consume transport retry budget.
    pub async fn mutating_invoke<F>(
        &self,
        cancel: &CancellationToken,
        build: F,
    ) -> Result<Value>
    where
        F: Fn(String) -> Params,
    {
        let mut bad_token = None;
        for attempt in 0..2u8 {
            let token = self.get_token("csrf", cancel).await?;
            let message = RequestMessage::post(build(token));
            let gate = self.mutation_gate().await;
            let result = self.invoke_value(message, cancel).await;
            gate.mark();
            match result {
                Err(Error::BadToken(api)) if attempt == 0 => {
                    warn!(code = %api.code, "token rejected, fetching a fresh one");
                    self.invalidate_token("csrf");
                    bad_token = Some(Error::BadToken(api));
                }
                other => return other,
            }
        }
        Err(bad_token.expect("loop exited without a result"))
    }

    /// Returns a token of the given kind, fetching it on first use.
    /// Concurrent callers for one kind share a single request.
    pub async fn get_token(&self, kind: &str, cancel: &CancellationToken) -> Result<String> {
        let version = self
            .site_info()
            .map(|i| i.version)
            .unwrap_or_default();
        let kind = token::normalize_kind(kind, version).to_owned();
        let slot = self.inner.tokens.slot(&kind);
        let value = slot
            .get_or_try_init(|| self.fetch_token(kind.clone(), cancel))
            .await?;
        Ok(value.clone())
    }

    /// Fetches several token kinds in one request, seeding the cache for
    /// all of them.
    pub async fn get_tokens(
        &self,
        kinds: &[&str],
        cancel: &CancellationToken,
    ) -> Result<HashMap<String, String>> {
        let version = self
            .site_info()
            .map(|i| i.version)
            .unwrap_or_default();
        let kinds: Vec<String> = kinds
            .iter()
            .map(|k| token::normalize_kind(k, version).to_owned())
            .collect();
        let params = QueryBuilder::new()
            .meta("tokens")
            .param("type", kinds.join("|"))
            .build();
        let value = self
            .invoke(RequestMessage::get(params), &RawJsonParser, cancel)
            .await?;
        let tokens = value
            .get("query")
            .and_then(|q| q.get("tokens"))
            .and_then(Value::as_object)
            .ok_or_else(|| Error::InvalidResponse("tokens response lacks query".to_owned()))?;
        let mut out = HashMap::new();
        for kind in kinds {
            let key = format!("{kind}token");
            if let Some(token) = tokens.get(&key).and_then(Value::as_str) {
                self.inner.tokens.seed(&kind, token.to_owned());
                out.insert(kind, token.to_owned());
            }
        }
        Ok(out)
    }

    async fn fetch_token(&self, kind: String, cancel: &CancellationToken) -> Result<String> {
        let params = QueryBuilder::new()
            .meta("tokens")
            .param("type", kind.clone())
            .build();
        let value = self
            .invoke(RequestMessage::get(params), &RawJsonParser, cancel)
            .await?;
        value
            .get("query")
            .and_then(|q| q.get("tokens"))
            .and_then(|t| t.get(format!("{kind}token")))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                Error::InvalidResponse(format!("server returned no {kind} token"))
            })
    }

    /// Drops a cached token after the server rejected it.
    pub fn invalidate_token(&self, kind: &str) {
        let version = self
            .site_info()
            .map(|i| i.version)
            .unwrap_or_default();
        self.inner.tokens.invalidate(token::normalize_kind(kind, version));
    }

    /// Logs in with the configured [`LoginPolicy`]. On success the token
    /// cache is reset and the account info refreshed.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let policy = match self.inner.options.login_policy {
            LoginPolicy::Auto => match self.site_info() {
                Ok(info) if !info.version.at_least(1, 27) => LoginPolicy::Legacy,
                _ => LoginPolicy::ClientLogin,
            },
            p => p,
        };
        let mut token = self.fetch_token("login".to_owned(), cancel).await?;
        match policy {
            LoginPolicy::Legacy | LoginPolicy::Auto => {
                // the legacy flow may hand back a fresh token and ask again
                for _ in 0..2 {
                    let params = Login {
                        name: username.to_owned(),
                        password: password.to_owned(),
                        token: token.clone(),
                    }
                    .build();
                    let value = self
                        .invoke_value(RequestMessage::post(params), cancel)
                        .await?;
                    let login = value.get("login").cloned().unwrap_or(Value::Null);
                    match login.get("result").and_then(Value::as_str) {
                        Some("Success") => {
                            self.finish_login(cancel).await?;
                            return Ok(());
                        }
                        Some("NeedToken") => {
                            token = login
                                .get("token")
                                .and_then(Value::as_str)
                                .map(str::to_owned)
                                .ok_or_else(|| {
                                    Error::InvalidResponse(
                                        "NeedToken response without token".to_owned(),
                                    )
                                })?;
                        }
                        Some(other) => {
                            return Err(Error::Unauthorized(ApiError {
                                code: other.to_owned(),
                                message: login
                                    .get("reason")
                                    .and_then(Value::as_str)
                                    .unwrap_or("login failed")
                                    .to_owned(),
                            }))
                        }
                        None => {
                            return Err(Error::InvalidResponse(
                                "login response lacks result".to_owned(),
                            ))
                        }
                    }
                }
                Err(Error::Unauthorized(ApiError {
                    code: "NeedToken".to_owned(),
                    message: "server kept asking for a new login token".to_owned(),
                }))
            }
            LoginPolicy::ClientLogin => {
                let mut return_url = self.inner.endpoint.clone();
                return_url.set_path("/");
                return_url.set_query(None);
                let params = ClientLogin {
                    username: username.to_owned(),
                    password: password.to_owned(),
                    token,
                    return_url: return_url.to_string(),
                }
                .build();
                let value = self
                    .invoke_value(RequestMessage::post(params), cancel)
                    .await?;
                let status = value
                    .get("clientlogin")
                    .and_then(|c| c.get("status"))
                    .and_then(Value::as_str);
                match status {
                    Some("PASS") => {
                        self.finish_login(cancel).await?;
                        Ok(())
                    }
                    Some(other) => Err(Error::Unauthorized(ApiError {
                        code: other.to_owned(),
                        message: value
                            .get("clientlogin")
                            .and_then(|c| c.get("message").or_else(|| c.get("messagecode")))
                            .and_then(Value::as_str)
                            .unwrap_or("login failed")
                            .to_owned(),
                    })),
                    None => Err(Error::InvalidResponse(
                        "clientlogin response lacks status".to_owned(),
                    )),
                }
            }
        }
    }

    async fn finish_login(&self, cancel: &CancellationToken) -> Result<()> {
        self.inner.tokens.clear();
        self.refresh_account_info(cancel).await
    }

    /// Logs out and resets the account state to anonymous.
    pub async fn logout(&self, cancel: &CancellationToken) -> Result<()> {
        let token = self.get_token("csrf", cancel).await?;
        let params = logout_params(token);
        self.invoke_value(RequestMessage::post(params), cancel)
            .await?;
        self.inner.tokens.clear();
        *self.inner.account.write().expect("account lock poisoned") = AccountInfo::anonymous();
        Ok(())
    }

    /// `action=opensearch`: an ordered result set for a search-as-you-type
    /// box.
    pub async fn open_search(
        &self,
        query: &str,
        limit: Limit,
        cancel: &CancellationToken,
    ) -> Result<Vec<OpenSearchEntry>> {
        let mut params = Params::new();
        params.insert("action", "opensearch");
        params.insert("search", query.to_owned());
        params.insert_limit("limit", limit);
        let value = self
            .invoke_value(RequestMessage::get(params), cancel)
            .await?;
        let titles = value.get(1).and_then(Value::as_array);
        let descriptions = value.get(2).and_then(Value::as_array);
        let urls = value.get(3).and_then(Value::as_array);
        let mut entries = Vec::new();
        if let Some(titles) = titles {
            for (i, title) in titles.iter().enumerate() {
                let Some(title) = title.as_str() else { continue };
                let pick = |arr: Option<&Vec<Value>>| {
                    arr.and_then(|a| a.get(i))
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_owned)
                };
                entries.push(OpenSearchEntry {
                    title: title.to_owned(),
                    description: pick(descriptions),
                    url: pick(urls),
                });
            }
        }
        Ok(entries)
    }

    /// Tries to locate the `api.php` endpoint behind a bare host or page
    /// URL: the conventional `/w/api.php` and `/api.php` locations first,
    /// then the `<link rel="EditURI">` advertisement in the page HTML.
    pub async fn search_api_endpoint(
        client: &WikiClient,
        hint: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Url>> {
        let hint = hint.trim();
        let with_scheme = if hint.contains("://") {
            hint.to_owned()
        } else {
            format!("https://{hint}")
        };
        let base: Url = with_scheme.parse()?;

        let mut candidates = Vec::new();
        if base.path().ends_with("api.php") {
            candidates.push(base.clone());
        }
        for path in ["/w/api.php", "/api.php"] {
            if let Ok(u) = base.join(path) {
                if !candidates.contains(&u) {
                    candidates.push(u);
                }
            }
        }
        for candidate in &candidates {
            if probe_endpoint(client, candidate, cancel).await {
                return Ok(Some(candidate.clone()));
            }
        }

        // HTML discovery: <link rel="EditURI" href=".../api.php?action=rsd"/>
        let message = RequestMessage::get(Params::new());
        let html = match client.invoke(&base, &message, &HtmlParser, cancel).await {
            Ok(html) => html,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(_) => return Ok(None),
        };
        if let Some(href) = find_edit_uri(&html) {
            if let Ok(mut found) = base.join(&href) {
                found.set_query(None);
                if probe_endpoint(client, &found, cancel).await {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    /// Serialises mutating calls on this site and enforces the configured
    /// throttle gap. Callers hold the guard across the request and `mark`
    /// it once the server was actually hit.
    pub(crate) async fn mutation_gate(&self) -> MutationGuard<'_> {
        let slot = self.inner.mutation_gate.lock().await;
        if let Some(last) = *slot {
            let throttle = self.inner.options.throttle_time;
            let elapsed = last.elapsed();
            if elapsed < throttle {
                tokio::time::sleep(throttle - elapsed).await;
            }
        }
        MutationGuard { slot }
    }

    /// The template titles listed on `MediaWiki:Disambiguationspage`,
    /// fetched once and cached for the lifetime of the controller.
    pub(crate) async fn disambiguation_templates(
        &self,
        cancel: &CancellationToken,
    ) -> Result<&Vec<String>> {
        self.inner
            .disambig_templates
            .get_or_try_init(|| async {
                let params = QueryBuilder::new()
                    .titles(["MediaWiki:Disambiguationspage".to_owned()])
                    .prop("links")
                    .param("plnamespace", crate::site::info::Namespace::TEMPLATE)
                    .param_limit("pllimit", Limit::Max)
                    .build();
                let value = self
                    .invoke_value(RequestMessage::get(params), cancel)
                    .await?;
                let mut titles = Vec::new();
                if let Some(pages) = value
                    .get("query")
                    .and_then(|q| q.get("pages"))
                    .and_then(Value::as_array)
                {
                    for page in pages {
                        if let Some(links) = page.get("links").and_then(Value::as_array) {
                            for link in links {
                                if let Some(t) = link.get("title").and_then(Value::as_str) {
                                    titles.push(t.to_owned());
                                }
                            }
                        }
                    }
                }
                Ok(titles)
            })
            .await
    }
}

/// Serialisation guard for mutating calls; see [`Site::mutation_gate`].
pub(crate) struct MutationGuard<'a> {
    slot: AsyncMutexGuard<'a, Option<Instant>>,
}

impl MutationGuard<'_> {
    /// Records the mutation instant, starting the throttle window for the
    /// next caller.
    pub fn mark(mut self) {
        *self.slot = Some(Instant::now());
    }
}

/// One `action=opensearch` result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenSearchEntry {
    pub title: String,
    pub description: Option<String>,
    pub url: Option<String>,
}

async fn probe_endpoint(client: &WikiClient, candidate: &Url, cancel: &CancellationToken) -> bool {
    let mut params = Params::new();
    params.insert("action", "query");
    params.insert("meta", "siteinfo");
    params.insert("siprop", "general");
    params.insert("format", "json");
    let message = RequestMessage::get(params);
    match client
        .invoke(candidate, &message, &crate::res::LenientJsonParser, cancel)
        .await
    {
        Ok(value) => value
            .get("query")
            .and_then(|q| q.get("general"))
            .is_some(),
        Err(_) => false,
    }
}

fn find_edit_uri(html: &str) -> Option<String> {
    let at = html.find("rel=\"EditURI\"").or_else(|| html.find("rel='EditURI'"))?;
    // scan the surrounding <link ...> tag for its href attribute
    let tag_start = html[..at].rfind('<')?;
    let tag_end = at + html[at..].find('>')?;
    let tag = &html[tag_start..tag_end];
    let href_at = tag.find("href=")? + "href=".len();
    let rest = &tag[href_at..];
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_owned())
}

/// Body-as-text parser used by endpoint discovery.
struct HtmlParser;

impl ResponseParser for HtmlParser {
    type Output = String;

    fn parse_response(
        &self,
        ctx: &mut ParseContext,
        status: StatusCode,
        body: &[u8],
    ) -> Result<String> {
        if !status.is_success() {
            if status.is_server_error() {
                ctx.needs_retry = true;
            }
            return Err(Error::HttpStatus(status));
        }
        Ok(String::from_utf8_lossy(body).into_owned())
    }
}
