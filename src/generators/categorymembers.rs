//! `list=categorymembers`: enumerate the members of one category.

use bitflags::bitflags;
use serde::Deserialize;

use crate::generators::QueryModule;
use crate::req::ParamSink;
use crate::types::{Direction, Limit, MwTimestamp};

bitflags! {
    /// Which member kinds to enumerate.
    pub struct CategoryMemberTypes: u8 {
        const PAGE   = 1 << 0;
        const SUBCAT = 1 << 1;
        const FILE   = 1 << 2;
    }
}

impl Default for CategoryMemberTypes {
    fn default() -> Self {
        Self::all()
    }
}

impl CategoryMemberTypes {
    fn to_wire(self) -> Vec<String> {
        let mut out = Vec::new();
        if self.contains(Self::PAGE) {
            out.push("page".to_owned());
        }
        if self.contains(Self::SUBCAT) {
            out.push("subcat".to_owned());
        }
        if self.contains(Self::FILE) {
            out.push("file".to_owned());
        }
        out
    }
}

/// Sort order of the member listing.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CategoryMembersSort {
    #[default]
    SortKey,
    Timestamp,
}

#[derive(Debug)]
pub struct CategoryMembers {
    /// Full category title, `Category:` prefix included.
    pub category: String,
    pub member_types: CategoryMemberTypes,
    pub sort: CategoryMembersSort,
    pub direction: Direction,
    pub limit: Limit,
}

impl CategoryMembers {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            member_types: CategoryMemberTypes::default(),
            sort: CategoryMembersSort::SortKey,
            direction: Direction::Newer,
            limit: Limit::Max,
        }
    }
}

impl QueryModule for CategoryMembers {
    type Item = CategoryMember;

    fn name(&self) -> &'static str {
        "categorymembers"
    }

    fn prefix(&self) -> &'static str {
        "cm"
    }

    fn write_params(&self, sink: &mut dyn ParamSink) {
        sink.add("title".into(), self.category.clone().into());
        sink.add(
            "prop".into(),
            vec![
                "ids".to_owned(),
                "title".to_owned(),
                "sortkeyprefix".to_owned(),
                "type".to_owned(),
                "timestamp".to_owned(),
            ]
            .into(),
        );
        if self.member_types != CategoryMemberTypes::all() {
            sink.add("type".into(), self.member_types.to_wire().into());
        }
        if self.sort == CategoryMembersSort::Timestamp {
            sink.add("sort".into(), "timestamp".into());
            sink.add("dir".into(), self.direction.as_str().into());
        }
        if let Some(limit) = self.limit.to_wire() {
            sink.add("limit".into(), limit.into());
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct CategoryMember {
    pub pageid: Option<u64>,
    pub ns: Option<i32>,
    pub title: Option<String>,
    pub sortkeyprefix: Option<String>,
    #[serde(rename = "type")]
    pub member_type: Option<String>,
    pub timestamp: Option<MwTimestamp>,
}
