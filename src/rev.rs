//! Revision and file-revision models.

use bitflags::bitflags;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::page::WikiPageStub;
use crate::req::query::QueryBuilder;
use crate::req::RequestMessage;
use crate::res::upgrade_legacy_pages;
use crate::site::Site;
use crate::types::MwTimestamp;

bitflags! {
    pub struct RevisionFlags: u8 {
        const MINOR     = 1 << 0;
        const BOT       = 1 << 1;
        const NEW       = 1 << 2;
        const ANONYMOUS = 1 << 3;
    }
}

bitflags! {
    /// Fields the server suppressed (revision deletion).
    pub struct RevisionHiddenFields: u8 {
        const USER    = 1 << 0;
        const COMMENT = 1 << 1;
        const CONTENT = 1 << 2;
    }
}

impl Default for RevisionFlags {
    fn default() -> Self {
        Self::empty()
    }
}

impl Default for RevisionHiddenFields {
    fn default() -> Self {
        Self::empty()
    }
}

/// One revision of a page.
#[derive(Debug, Clone)]
pub struct Revision {
    pub id: u64,
    pub parent_id: u64,
    pub page: WikiPageStub,
    pub timestamp: Option<MwTimestamp>,
    pub user_name: Option<String>,
    pub user_id: Option<u64>,
    pub comment: Option<String>,
    pub content_model: Option<String>,
    pub sha1: Option<String>,
    pub content_length: Option<u64>,
    pub tags: Vec<String>,
    pub flags: RevisionFlags,
    pub hidden: RevisionHiddenFields,
    pub content: Option<String>,
}

// `QueryModule::Item` requires `DeserializeOwned`, but `Revision` is always
// built via `ApiRevision::into_revision` (see `RevisionHistory::extract`,
// which overrides the trait's default extraction and never goes through
// this impl).
impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D>(_deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Err(serde::de::Error::custom(
            "Revision is not deserialized directly; use ApiRevision::into_revision",
        ))
    }
}

/// The revision shape on the wire, both with and without `rvslots`.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct ApiRevision {
    #[serde(default)]
    pub revid: u64,
    #[serde(default)]
    pub parentid: u64,
    pub timestamp: Option<MwTimestamp>,
    pub user: Option<String>,
    pub userid: Option<u64>,
    pub comment: Option<String>,
    pub contentmodel: Option<String>,
    pub sha1: Option<String>,
    pub size: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub minor: bool,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub anon: bool,
    #[serde(default)]
    pub userhidden: bool,
    #[serde(default)]
    pub commenthidden: bool,
    #[serde(default)]
    pub sha1hidden: bool,
    pub content: Option<String>,
    pub slots: Option<ApiSlots>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct ApiSlots {
    pub main: Option<ApiSlot>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct ApiSlot {
    pub contentmodel: Option<String>,
    pub content: Option<String>,
}

impl ApiRevision {
    pub(crate) fn into_revision(self, page: WikiPageStub) -> Revision {
        let mut flags = RevisionFlags::empty();
        for (on, flag) in [
            (self.minor, RevisionFlags::MINOR),
            (self.bot, RevisionFlags::BOT),
            (self.new, RevisionFlags::NEW),
            (self.anon, RevisionFlags::ANONYMOUS),
        ] {
            if on {
                flags |= flag;
            }
        }
        let mut hidden = RevisionHiddenFields::empty();
        for (on, flag) in [
            (self.userhidden, RevisionHiddenFields::USER),
            (self.commenthidden, RevisionHiddenFields::COMMENT),
            (self.sha1hidden, RevisionHiddenFields::CONTENT),
        ] {
            if on {
                hidden |= flag;
            }
        }
        let (slot_model, slot_content) = match self.slots.and_then(|s| s.main) {
            Some(slot) => (slot.contentmodel, slot.content),
            None => (None, None),
        };
        Revision {
            id: self.revid,
            parent_id: self.parentid,
            page,
            timestamp: self.timestamp,
            user_name: self.user,
            user_id: self.userid,
            comment: self.comment,
            content_model: slot_model.or(self.contentmodel),
            sha1: self.sha1,
            content_length: self.size,
            tags: self.tags,
            flags,
            hidden,
            content: slot_content.or(self.content),
        }
    }
}

pub(crate) const RV_PROPS: &str = "ids|timestamp|flags|comment|user|userid|contentmodel|sha1|size|tags";

/// Fetches specific revisions by id. The output preserves the input order;
/// revisions the server did not return come back as `None`. Revisions of
/// the same page share one stub value.
pub async fn fetch_revisions(
    site: &Site,
    ids: &[u64],
    fetch_content: bool,
    cancel: &CancellationToken,
) -> Result<Vec<Option<Revision>>> {
    let mut rvprop = RV_PROPS.to_owned();
    if fetch_content {
        rvprop.push_str("|content");
    }
    let mut builder = QueryBuilder::new()
        .revids(ids.iter().copied())
        .prop("revisions")
        .param("rvprop", rvprop);
    if fetch_content {
        builder = builder.param("rvslots", "main");
    }
    let mut value = site
        .invoke_value(RequestMessage::get(builder.build()), cancel)
        .await?;
    let Some(query) = value.get_mut("query") else {
        return Ok(vec![None; ids.len()]);
    };
    if site.format_version() == 1 {
        upgrade_legacy_pages(query);
    }
    let mut by_id: std::collections::HashMap<u64, Revision> = std::collections::HashMap::new();
    if let Some(pages) = query.get_mut("pages").and_then(Value::as_array_mut) {
        for page in pages {
            let stub = WikiPageStub::from_value(page);
            if let Some(revisions) = page.get_mut("revisions") {
                let revisions: Vec<ApiRevision> = serde_json::from_value(revisions.take())?;
                for rev in revisions {
                    by_id.insert(rev.revid, rev.into_revision(stub.clone()));
                }
            }
        }
    }
    Ok(ids.iter().map(|id| by_id.remove(id)).collect())
}

/// One revision of a file, from `prop=imageinfo`.
#[derive(Debug, Clone)]
pub struct FileRevision {
    pub timestamp: Option<MwTimestamp>,
    pub user_name: Option<String>,
    pub comment: Option<String>,
    pub url: Option<String>,
    pub description_url: Option<String>,
    pub size: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sha1: Option<String>,
    pub mime: Option<String>,
    pub bit_depth: Option<u32>,
    pub is_anonymous: bool,
    pub page: WikiPageStub,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct ApiFileRevision {
    pub timestamp: Option<MwTimestamp>,
    pub user: Option<String>,
    pub comment: Option<String>,
    pub url: Option<String>,
    pub descriptionurl: Option<String>,
    pub size: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub sha1: Option<String>,
    pub mime: Option<String>,
    pub bitdepth: Option<u32>,
    #[serde(default)]
    pub anon: bool,
}

impl ApiFileRevision {
    pub(crate) fn into_file_revision(self, page: WikiPageStub) -> FileRevision {
        FileRevision {
            timestamp: self.timestamp,
            user_name: self.user,
            comment: self.comment,
            url: self.url,
            description_url: self.descriptionurl,
            size: self.size,
            width: self.width,
            height: self.height,
            sha1: self.sha1,
            mime: self.mime,
            bit_depth: self.bitdepth,
            is_anonymous: self.anon,
            page,
        }
    }
}

pub(crate) const II_PROPS: &str = "timestamp|user|comment|url|size|sha1|mime|bitdepth";

/// Parse error helper shared by revision consumers.
pub(crate) fn missing_query() -> Error {
    Error::InvalidResponse("response lacks a query object".to_owned())
}
