//! Link-graph modules: what links to a page, what embeds it, what it
//! links out to.

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::generators::{extract_prop_items, ModuleKind, QueryModule, RedirectsFilter};
use crate::page::WikiPageStub;
use crate::req::{ParamSink, Params};
use crate::types::Limit;

/// `list=backlinks`: pages linking to a title.
#[derive(Debug)]
pub struct Backlinks {
    pub title: String,
    pub namespace: Option<i32>,
    pub redirects_filter: RedirectsFilter,
    pub limit: Limit,
}

impl Backlinks {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            namespace: None,
            redirects_filter: RedirectsFilter::All,
            limit: Limit::Max,
        }
    }
}

impl QueryModule for Backlinks {
    type Item = WikiPageStub;

    fn name(&self) -> &'static str {
        "backlinks"
    }

    fn prefix(&self) -> &'static str {
        "bl"
    }

    fn write_params(&self, sink: &mut dyn ParamSink) {
        sink.add("title".into(), self.title.clone().into());
        if let Some(ns) = self.namespace {
            sink.add("namespace".into(), ns.into());
        }
        if self.redirects_filter != RedirectsFilter::All {
            sink.add("filterredir".into(), self.redirects_filter.as_str().into());
        }
        if let Some(limit) = self.limit.to_wire() {
            sink.add("limit".into(), limit.into());
        }
    }
}

/// `list=embeddedin`: pages transcluding a template.
#[derive(Debug)]
pub struct EmbeddedIn {
    pub title: String,
    pub namespace: Option<i32>,
    pub limit: Limit,
}

impl EmbeddedIn {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            namespace: None,
            limit: Limit::Max,
        }
    }
}

impl QueryModule for EmbeddedIn {
    type Item = WikiPageStub;

    fn name(&self) -> &'static str {
        "embeddedin"
    }

    fn prefix(&self) -> &'static str {
        "ei"
    }

    fn write_params(&self, sink: &mut dyn ParamSink) {
        sink.add("title".into(), self.title.clone().into());
        if let Some(ns) = self.namespace {
            sink.add("namespace".into(), ns.into());
        }
        if let Some(limit) = self.limit.to_wire() {
            sink.add("limit".into(), limit.into());
        }
    }
}

/// A page reference with a redirect marker, as the link-graph prop
/// modules return them.
#[derive(Deserialize, Debug, Clone)]
pub struct LinkReference {
    pub pageid: Option<u64>,
    pub ns: Option<i32>,
    pub title: Option<String>,
    #[serde(default)]
    pub redirect: bool,
}

macro_rules! prop_link_module {
    ($(#[$doc:meta])* $Name:ident, $module:literal, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $Name {
            pub target: String,
            pub namespace: Option<i32>,
            pub limit: Limit,
        }

        impl $Name {
            pub fn new(target: impl Into<String>) -> Self {
                Self {
                    target: target.into(),
                    namespace: None,
                    limit: Limit::Max,
                }
            }
        }

        impl QueryModule for $Name {
            type Item = LinkReference;

            fn name(&self) -> &'static str {
                $module
            }

            fn prefix(&self) -> &'static str {
                $prefix
            }

            fn kind(&self) -> ModuleKind {
                ModuleKind::Prop
            }

            fn base_params(&self, params: &mut Params) {
                params.insert("titles", self.target.clone());
            }

            fn write_params(&self, sink: &mut dyn ParamSink) {
                if let Some(ns) = self.namespace {
                    sink.add("namespace".into(), ns.into());
                }
                if let Some(limit) = self.limit.to_wire() {
                    sink.add("limit".into(), limit.into());
                }
            }

            fn extract(&mut self, query: &mut Value) -> Result<Vec<LinkReference>> {
                extract_prop_items(query, $module)
            }
        }
    };
}

prop_link_module! {
    /// `prop=linkshere`: pages linking to the target, including via
    /// redirects.
    LinksHere, "linkshere", "lh"
}

prop_link_module! {
    /// `prop=fileusage`: pages using the target file.
    FileUsage, "fileusage", "fu"
}

prop_link_module! {
    /// `prop=templates`: templates transcluded by the target page.
    Transclusions, "templates", "tl"
}

/// `prop=langlinks`: the interlanguage links of one page.
#[derive(Debug)]
pub struct LanguageLinks {
    pub target: String,
    pub limit: Limit,
}

impl LanguageLinks {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            limit: Limit::Max,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct LanguageLink {
    pub lang: String,
    #[serde(alias = "*")]
    pub title: String,
}

impl QueryModule for LanguageLinks {
    type Item = LanguageLink;

    fn name(&self) -> &'static str {
        "langlinks"
    }

    fn prefix(&self) -> &'static str {
        "ll"
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Prop
    }

    fn base_params(&self, params: &mut Params) {
        params.insert("titles", self.target.clone());
    }

    fn write_params(&self, sink: &mut dyn ParamSink) {
        if let Some(limit) = self.limit.to_wire() {
            sink.add("limit".into(), limit.into());
        }
    }

    fn extract(&mut self, query: &mut Value) -> Result<Vec<LanguageLink>> {
        extract_prop_items(query, "langlinks")
    }
}
