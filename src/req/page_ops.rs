//! Parameter builders for the page-level mutating actions.

use bitflags::bitflags;

use crate::req::Params;
use crate::types::AutoWatchBehavior;

bitflags! {
    /// Options for `action=move`.
    pub struct MoveOptions: u8 {
        /// Do not move the associated talk page.
        const LEAVE_TALK      = 1 << 0;
        const MOVE_SUBPAGES   = 1 << 1;
        /// Suppress creation of a redirect at the old title.
        const NO_REDIRECT     = 1 << 2;
        const IGNORE_WARNINGS = 1 << 3;
    }
}

bitflags! {
    /// Options for `action=purge`.
    pub struct PurgeOptions: u8 {
        const FORCE_LINK_UPDATE           = 1 << 0;
        const FORCE_RECURSIVE_LINK_UPDATE = 1 << 1;
    }
}

pub struct MoveRequest {
    pub from: PageTarget,
    pub to: String,
    pub reason: Option<String>,
    pub options: MoveOptions,
    pub watch: AutoWatchBehavior,
    pub token: String,
}

/// Identifies the page a mutating action operates on.
pub enum PageTarget {
    Title(String),
    Id(u64),
}

impl PageTarget {
    fn write(self, params: &mut Params, title_key: &'static str, id_key: &'static str) {
        match self {
            PageTarget::Title(t) => params.insert(title_key, t),
            PageTarget::Id(id) => params.insert(id_key, id),
        }
    }
}

impl MoveRequest {
    pub fn build(self) -> Params {
        let mut params = Params::new();
        params.insert("action", "move");
        self.from.write(&mut params, "from", "fromid");
        params.insert("to", self.to);
        params.insert_opt("reason", self.reason);
        // "movetalk" is on unless the caller opts out
        if !self.options.contains(MoveOptions::LEAVE_TALK) {
            params.insert("movetalk", true);
        }
        if self.options.contains(MoveOptions::MOVE_SUBPAGES) {
            params.insert("movesubpages", true);
        }
        if self.options.contains(MoveOptions::NO_REDIRECT) {
            params.insert("noredirect", true);
        }
        if self.options.contains(MoveOptions::IGNORE_WARNINGS) {
            params.insert("ignorewarnings", true);
        }
        params.insert("watchlist", self.watch);
        params.insert("token", self.token);
        params
    }
}

pub struct DeleteRequest {
    pub target: PageTarget,
    pub reason: Option<String>,
    pub watch: AutoWatchBehavior,
    pub token: String,
}

impl DeleteRequest {
    pub fn build(self) -> Params {
        let mut params = Params::new();
        params.insert("action", "delete");
        self.target.write(&mut params, "title", "pageid");
        params.insert_opt("reason", self.reason);
        params.insert("watchlist", self.watch);
        params.insert("token", self.token);
        params
    }
}

pub struct PurgeRequest {
    pub titles: Vec<String>,
    pub options: PurgeOptions,
}

impl PurgeRequest {
    pub fn build(self) -> Params {
        let mut params = Params::new();
        params.insert("action", "purge");
        params.insert("titles", self.titles);
        if self.options.contains(PurgeOptions::FORCE_LINK_UPDATE) {
            params.insert("forcelinkupdate", true);
        }
        if self.options.contains(PurgeOptions::FORCE_RECURSIVE_LINK_UPDATE) {
            params.insert("forcerecursivelinkupdate", true);
        }
        params
    }
}
