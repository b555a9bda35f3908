//! `list=recentchanges`: the site-wide change feed.

use bitflags::bitflags;
use serde::Deserialize;

use crate::generators::QueryModule;
use crate::req::ParamSink;
use crate::types::{Direction, Limit, MwTimestamp};

bitflags! {
    /// Change kinds to include.
    pub struct RecentChangeTypes: u8 {
        const EDIT       = 1 << 0;
        const NEW        = 1 << 1;
        const LOG        = 1 << 2;
        const EXTERNAL   = 1 << 3;
        const CATEGORIZE = 1 << 4;
    }
}

impl Default for RecentChangeTypes {
    fn default() -> Self {
        Self::EDIT | Self::NEW | Self::LOG
    }
}

impl RecentChangeTypes {
    fn to_wire(self) -> Vec<String> {
        let mut out = Vec::new();
        for (flag, name) in [
            (Self::EDIT, "edit"),
            (Self::NEW, "new"),
            (Self::LOG, "log"),
            (Self::EXTERNAL, "external"),
            (Self::CATEGORIZE, "categorize"),
        ] {
            if self.contains(flag) {
                out.push(name.to_owned());
            }
        }
        out
    }
}

/// Tri-state filters mapped onto `rcshow` (`minor` / `!minor`, ...).
#[derive(Debug, Default, Clone, Copy)]
pub struct RecentChangesFilters {
    pub minor: Option<bool>,
    pub bot: Option<bool>,
    pub anonymous: Option<bool>,
    pub patrolled: Option<bool>,
    pub redirect: Option<bool>,
}

impl RecentChangesFilters {
    fn to_wire(self) -> Vec<String> {
        let mut out = Vec::new();
        for (value, name) in [
            (self.minor, "minor"),
            (self.bot, "bot"),
            (self.anonymous, "anon"),
            (self.patrolled, "patrolled"),
            (self.redirect, "redirect"),
        ] {
            match value {
                Some(true) => out.push(name.to_owned()),
                Some(false) => out.push(format!("!{name}")),
                None => {}
            }
        }
        out
    }
}

#[derive(Debug, Default)]
pub struct RecentChanges {
    pub start_time: Option<MwTimestamp>,
    pub end_time: Option<MwTimestamp>,
    pub direction: Direction,
    pub types: RecentChangeTypes,
    pub filters: RecentChangesFilters,
    pub namespace: Option<i32>,
    /// Only list the latest revision of each page.
    pub last_revisions_only: bool,
    pub limit: Limit,
}

impl RecentChanges {
    pub fn new() -> Self {
        Self {
            types: RecentChangeTypes::default(),
            ..Default::default()
        }
    }
}

impl QueryModule for RecentChanges {
    type Item = RecentChange;

    fn name(&self) -> &'static str {
        "recentchanges"
    }

    fn prefix(&self) -> &'static str {
        "rc"
    }

    fn write_params(&self, sink: &mut dyn ParamSink) {
        if let Some(start) = self.start_time {
            sink.add("start".into(), start.into());
        }
        if let Some(end) = self.end_time {
            sink.add("end".into(), end.into());
        }
        sink.add("dir".into(), self.direction.as_str().into());
        sink.add(
            "prop".into(),
            vec![
                "title".to_owned(),
                "ids".to_owned(),
                "timestamp".to_owned(),
                "user".to_owned(),
                "userid".to_owned(),
                "comment".to_owned(),
                "flags".to_owned(),
                "sizes".to_owned(),
                "tags".to_owned(),
                "sha1".to_owned(),
                "redirect".to_owned(),
            ]
            .into(),
        );
        sink.add("type".into(), self.types.to_wire().into());
        let show = self.filters.to_wire();
        if !show.is_empty() {
            sink.add("show".into(), show.into());
        }
        if let Some(ns) = self.namespace {
            sink.add("namespace".into(), ns.into());
        }
        if self.last_revisions_only {
            sink.add("toponly".into(), true.into());
        }
        if let Some(limit) = self.limit.to_wire() {
            sink.add("limit".into(), limit.into());
        }
    }
}

bitflags! {
    /// Flags of a single change.
    pub struct RecentChangeFlags: u8 {
        const MINOR     = 1 << 0;
        const BOT       = 1 << 1;
        const NEW       = 1 << 2;
        const ANONYMOUS = 1 << 3;
        const REDIRECT  = 1 << 4;
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct RecentChange {
    #[serde(rename = "type")]
    pub change_type: String,
    pub ns: Option<i32>,
    pub title: Option<String>,
    pub pageid: Option<u64>,
    pub revid: Option<u64>,
    pub old_revid: Option<u64>,
    pub rcid: Option<u64>,
    pub user: Option<String>,
    pub userid: Option<u64>,
    pub oldlen: Option<u64>,
    pub newlen: Option<u64>,
    pub timestamp: Option<MwTimestamp>,
    pub comment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub sha1: Option<String>,
    #[serde(default)]
    minor: bool,
    #[serde(default)]
    bot: bool,
    #[serde(default)]
    new: bool,
    #[serde(default)]
    anon: bool,
    #[serde(default)]
    redirect: bool,
}

impl RecentChange {
    pub fn flags(&self) -> RecentChangeFlags {
        let mut flags = RecentChangeFlags::empty();
        for (on, flag) in [
            (self.minor, RecentChangeFlags::MINOR),
            (self.bot, RecentChangeFlags::BOT),
            (self.new, RecentChangeFlags::NEW),
            (self.anon, RecentChangeFlags::ANONYMOUS),
            (self.redirect, RecentChangeFlags::REDIRECT),
        ] {
            if on {
                flags |= flag;
            }
        }
        flags
    }
}
