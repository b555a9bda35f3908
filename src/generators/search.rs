//! `list=search`: full-text search.

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::generators::{extract_list_items, QueryModule};
use crate::req::ParamSink;
use crate::types::{Limit, MwTimestamp};

/// What the query string is matched against.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SearchWhat {
    #[default]
    Text,
    Title,
    NearMatch,
}

impl SearchWhat {
    fn as_str(&self) -> &'static str {
        match self {
            SearchWhat::Text => "text",
            SearchWhat::Title => "title",
            SearchWhat::NearMatch => "nearmatch",
        }
    }
}

#[derive(Debug)]
pub struct Search {
    pub query: String,
    pub what: SearchWhat,
    pub namespaces: Vec<i32>,
    pub limit: Limit,
    /// `totalhits` as advertised by the server, available after the first
    /// page has been received.
    pub total_hits: Option<u64>,
}

impl Search {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            what: SearchWhat::Text,
            namespaces: Vec::new(),
            limit: Limit::Max,
            total_hits: None,
        }
    }
}

impl QueryModule for Search {
    type Item = SearchResult;

    fn name(&self) -> &'static str {
        "search"
    }

    fn prefix(&self) -> &'static str {
        "sr"
    }

    fn write_params(&self, sink: &mut dyn ParamSink) {
        sink.add("search".into(), self.query.clone().into());
        if self.what != SearchWhat::Text {
            sink.add("what".into(), self.what.as_str().into());
        }
        if !self.namespaces.is_empty() {
            let ns: Vec<String> = self.namespaces.iter().map(i32::to_string).collect();
            sink.add("namespace".into(), ns.into());
        }
        sink.add("info".into(), "totalhits".into());
        sink.add(
            "prop".into(),
            vec![
                "size".to_owned(),
                "wordcount".to_owned(),
                "timestamp".to_owned(),
                "snippet".to_owned(),
            ]
            .into(),
        );
        if let Some(limit) = self.limit.to_wire() {
            sink.add("limit".into(), limit.into());
        }
    }

    fn extract(&mut self, query: &mut Value) -> Result<Vec<SearchResult>> {
        if let Some(hits) = query
            .get("searchinfo")
            .and_then(|i| i.get("totalhits"))
            .and_then(Value::as_u64)
        {
            self.total_hits = Some(hits);
        }
        extract_list_items(query, "search")
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct SearchResult {
    pub ns: i32,
    pub title: String,
    pub pageid: u64,
    pub size: Option<u64>,
    pub wordcount: Option<u64>,
    pub snippet: Option<String>,
    pub timestamp: Option<MwTimestamp>,
}
