//! Builder for `action=edit`.

use std::borrow::Cow;

use crate::req::Params;
use crate::types::{AutoWatchBehavior, MwTimestamp};

/// Builds the parameter set of an `action=edit` request.
///
/// Only the fields that were set are emitted; flags follow the usual
/// encoding (present as the empty string when on, absent when off).
#[derive(Default)]
pub struct EditBuilder {
    params: Params,
}

macro_rules! text_setters {
    ($($name:ident)*) => {$(
        pub fn $name(mut self, value: impl Into<Cow<'static, str>>) -> Self {
            self.params.insert(stringify!($name), value.into());
            self
        }
    )*};
}

macro_rules! flag_setters {
    ($($name:ident)*) => {$(
        pub fn $name(mut self) -> Self {
            self.params.insert(stringify!($name), true);
            self
        }
    )*};
}

impl EditBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    text_setters! {
        title text summary md5 prependtext appendtext undoafter
        contentformat contentmodel token captchaword captchaid
    }

    flag_setters! {
        minor notminor bot recreate createonly nocreate redirect
    }

    pub fn page_id(mut self, id: u64) -> Self {
        self.params.insert("pageid", id);
        self
    }

    pub fn new_section(mut self, section_title: impl Into<Cow<'static, str>>) -> Self {
        self.params.insert("section", "new");
        self.params.insert("sectiontitle", section_title.into());
        self
    }

    pub fn section(mut self, section: u64) -> Self {
        self.params.insert("section", section);
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.params.insert("tags", tags);
        self
    }

    pub fn baserevid(mut self, id: u64) -> Self {
        self.params.insert("baserevid", id);
        self
    }

    pub fn basetimestamp(mut self, t: MwTimestamp) -> Self {
        self.params.insert("basetimestamp", t);
        self
    }

    pub fn starttimestamp(mut self, t: MwTimestamp) -> Self {
        self.params.insert("starttimestamp", t);
        self
    }

    pub fn undo(mut self, revid: u64) -> Self {
        self.params.insert("undo", revid);
        self
    }

    pub fn watchlist(mut self, watch: AutoWatchBehavior) -> Self {
        self.params.insert("watchlist", watch);
        self
    }

    pub fn build(self) -> Params {
        let mut params = Params::new();
        params.insert("action", "edit");
        for (name, value) in self.params.pairs {
            params.pairs.push((name, value));
        }
        params
    }
}
