//! `list=allpages`: enumerate pages of one namespace in title order.

use crate::generators::{QueryModule, RedirectsFilter};
use crate::page::WikiPageStub;
use crate::req::ParamSink;
use crate::types::{Limit, SortDirection};

#[derive(Debug, Default)]
pub struct AllPages {
    pub namespace: Option<i32>,
    /// Title to start enumerating from (inclusive).
    pub start_title: Option<String>,
    /// Restrict to titles beginning with this prefix.
    pub prefix: Option<String>,
    pub redirects_filter: RedirectsFilter,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    /// Restrict to titles protected from this action (`edit`, `move`, ...).
    pub protection_type: Option<String>,
    pub direction: SortDirection,
    pub limit: Limit,
}

impl AllPages {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueryModule for AllPages {
    type Item = WikiPageStub;

    fn name(&self) -> &'static str {
        "allpages"
    }

    fn prefix(&self) -> &'static str {
        "ap"
    }

    fn write_params(&self, sink: &mut dyn ParamSink) {
        if let Some(from) = &self.start_title {
            sink.add("from".into(), from.clone().into());
        }
        if let Some(prefix) = &self.prefix {
            sink.add("prefix".into(), prefix.clone().into());
        }
        if let Some(ns) = self.namespace {
            sink.add("namespace".into(), ns.into());
        }
        if self.redirects_filter != RedirectsFilter::All {
            sink.add("filterredir".into(), self.redirects_filter.as_str().into());
        }
        if let Some(min) = self.min_size {
            sink.add("minsize".into(), min.into());
        }
        if let Some(max) = self.max_size {
            sink.add("maxsize".into(), max.into());
        }
        if let Some(prtype) = &self.protection_type {
            sink.add("prtype".into(), prtype.clone().into());
        }
        if self.direction != SortDirection::Ascending {
            sink.add("dir".into(), self.direction.as_str().into());
        }
        if let Some(limit) = self.limit.to_wire() {
            sink.add("limit".into(), limit.into());
        }
    }
}

/// `list=allpages` restricted to a title prefix: the classic prefix index.
#[derive(Debug, Default)]
pub struct PrefixIndex {
    pub prefix: String,
    pub namespace: Option<i32>,
    pub include_redirects: bool,
    pub limit: Limit,
}

impl PrefixIndex {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            namespace: None,
            include_redirects: true,
            limit: Limit::Max,
        }
    }
}

impl QueryModule for PrefixIndex {
    type Item = WikiPageStub;

    fn name(&self) -> &'static str {
        "allpages"
    }

    fn prefix(&self) -> &'static str {
        "ap"
    }

    fn write_params(&self, sink: &mut dyn ParamSink) {
        sink.add("prefix".into(), self.prefix.clone().into());
        if let Some(ns) = self.namespace {
            sink.add("namespace".into(), ns.into());
        }
        if !self.include_redirects {
            sink.add(
                "filterredir".into(),
                RedirectsFilter::NonRedirects.as_str().into(),
            );
        }
        if let Some(limit) = self.limit.to_wire() {
            sink.add("limit".into(), limit.into());
        }
    }
}
