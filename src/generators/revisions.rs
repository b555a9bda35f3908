//! `prop=revisions` as a sequence: the edit history of one page.

use serde_json::Value;

use crate::error::Result;
use crate::generators::{ModuleKind, QueryModule};
use crate::page::WikiPageStub;
use crate::req::{ParamSink, Params};
use crate::rev::{ApiRevision, Revision, RV_PROPS};
use crate::types::{Direction, Limit, MwTimestamp};

/// Selects the page whose history is enumerated.
#[derive(Debug, Clone)]
pub enum HistoryTarget {
    Title(String),
    Id(u64),
}

#[derive(Debug)]
pub struct RevisionHistory {
    pub target: HistoryTarget,
    pub start_time: Option<MwTimestamp>,
    pub end_time: Option<MwTimestamp>,
    pub start_id: Option<u64>,
    pub end_id: Option<u64>,
    pub direction: Direction,
    pub fetch_content: bool,
    pub limit: Limit,
}

impl RevisionHistory {
    pub fn for_title(title: impl Into<String>) -> Self {
        Self::new(HistoryTarget::Title(title.into()))
    }

    pub fn for_page_id(id: u64) -> Self {
        Self::new(HistoryTarget::Id(id))
    }

    fn new(target: HistoryTarget) -> Self {
        Self {
            target,
            start_time: None,
            end_time: None,
            start_id: None,
            end_id: None,
            direction: Direction::Older,
            fetch_content: false,
            limit: Limit::Max,
        }
    }
}

impl QueryModule for RevisionHistory {
    type Item = Revision;

    fn name(&self) -> &'static str {
        "revisions"
    }

    fn prefix(&self) -> &'static str {
        "rv"
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Prop
    }

    fn base_params(&self, params: &mut Params) {
        match &self.target {
            HistoryTarget::Title(title) => params.insert("titles", title.clone()),
            HistoryTarget::Id(id) => params.insert("pageids", *id),
        }
    }

    fn write_params(&self, sink: &mut dyn ParamSink) {
        let mut props = RV_PROPS.to_owned();
        if self.fetch_content {
            props.push_str("|content");
            sink.add("slots".into(), "main".into());
        }
        sink.add("prop".into(), props.into());
        if let Some(start) = self.start_time {
            sink.add("start".into(), start.into());
        }
        if let Some(end) = self.end_time {
            sink.add("end".into(), end.into());
        }
        if let Some(id) = self.start_id {
            sink.add("startid".into(), id.into());
        }
        if let Some(id) = self.end_id {
            sink.add("endid".into(), id.into());
        }
        sink.add("dir".into(), self.direction.as_str().into());
        if let Some(limit) = self.limit.to_wire() {
            sink.add("limit".into(), limit.into());
        }
    }

    fn extract(&mut self, query: &mut Value) -> Result<Vec<Revision>> {
        let Some(pages) = query.get_mut("pages").and_then(Value::as_array_mut) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for page in pages {
            let stub = WikiPageStub::from_value(page);
            if let Some(revisions) = page.get_mut("revisions") {
                let revisions: Vec<ApiRevision> = serde_json::from_value(revisions.take())?;
                out.extend(
                    revisions
                        .into_iter()
                        .map(|rev| rev.into_revision(stub.clone())),
                );
            }
        }
        Ok(out)
    }
}
