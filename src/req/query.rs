//! Builder for plain `action=query` requests (page info, revisions,
//! tokens, site/user metadata).

use std::borrow::Cow;

use crate::req::Params;
use crate::types::Limit;

/// Composes an `action=query` parameter set out of prop/list/meta modules
/// and page selectors. The module-specific parameters are appended through
/// the usual prefix convention by the callers that know them; this builder
/// only owns the shared surface.
#[derive(Default)]
pub struct QueryBuilder {
    titles: Vec<String>,
    pageids: Vec<u64>,
    revids: Vec<u64>,
    prop: Vec<&'static str>,
    list: Vec<&'static str>,
    meta: Vec<&'static str>,
    redirects: bool,
    extra: Params,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn titles<I: IntoIterator<Item = String>>(mut self, titles: I) -> Self {
        self.titles.extend(titles);
        self
    }

    pub fn pageids<I: IntoIterator<Item = u64>>(mut self, ids: I) -> Self {
        self.pageids.extend(ids);
        self
    }

    pub fn revids<I: IntoIterator<Item = u64>>(mut self, ids: I) -> Self {
        self.revids.extend(ids);
        self
    }

    pub fn prop(mut self, module: &'static str) -> Self {
        self.prop.push(module);
        self
    }

    pub fn list(mut self, module: &'static str) -> Self {
        self.list.push(module);
        self
    }

    pub fn meta(mut self, module: &'static str) -> Self {
        self.meta.push(module);
        self
    }

    /// Ask the server to resolve redirects in the title selection.
    pub fn resolve_redirects(mut self) -> Self {
        self.redirects = true;
        self
    }

    pub fn param(
        mut self,
        name: impl Into<Cow<'static, str>>,
        value: impl Into<crate::req::ParamValue>,
    ) -> Self {
        self.extra.insert(name, value);
        self
    }

    pub fn param_limit(mut self, name: impl Into<Cow<'static, str>>, limit: Limit) -> Self {
        self.extra.insert_limit(name, limit);
        self
    }

    pub fn build(self) -> Params {
        let mut params = Params::new();
        params.insert("action", "query");
        if !self.prop.is_empty() {
            params.insert("prop", join_static(&self.prop));
        }
        if !self.list.is_empty() {
            params.insert("list", join_static(&self.list));
        }
        if !self.meta.is_empty() {
            params.insert("meta", join_static(&self.meta));
        }
        if !self.titles.is_empty() {
            params.insert("titles", self.titles);
        }
        if !self.pageids.is_empty() {
            let ids: Vec<String> = self.pageids.iter().map(u64::to_string).collect();
            params.insert("pageids", ids);
        }
        if !self.revids.is_empty() {
            let ids: Vec<String> = self.revids.iter().map(u64::to_string).collect();
            params.insert("revids", ids);
        }
        if self.redirects {
            params.insert("redirects", true);
        }
        for (name, value) in self.extra.pairs {
            params.pairs.push((name, value));
        }
        params
    }
}

fn join_static(items: &[&'static str]) -> String {
    items.join("|")
}
