//! Site metadata loaded from `meta=siteinfo` and `meta=userinfo`.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::title::normalize;

/// Server version triple parsed out of the `generator` string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct MwVersion {
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
}

impl MwVersion {
    pub const fn new(major: u32, minor: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    /// Parses `"MediaWiki 1.39.1-wmf.4"` and the like. Unparseable parts
    /// default to zero.
    pub fn parse(generator: &str) -> Self {
        let numbers = generator.rsplit(' ').next().unwrap_or(generator);
        let mut parts = numbers.split('.').map(|p| {
            let digits: String = p.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u32>().unwrap_or(0)
        });
        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            revision: parts.next().unwrap_or(0),
        }
    }

    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

/// First-letter casing policy of a site or namespace.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum TitleCase {
    /// The first letter of a title is upper-cased.
    #[default]
    FirstLetter,
    CaseSensitive,
}

impl TitleCase {
    fn parse(s: &str) -> Self {
        if s == "case-sensitive" {
            TitleCase::CaseSensitive
        } else {
            TitleCase::FirstLetter
        }
    }
}

/// One namespace of a site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Namespace {
    pub id: i32,
    /// The English canonical name; empty for the main namespace.
    pub canonical: String,
    /// The localized display name; empty for the main namespace.
    pub localized: String,
    pub aliases: BTreeSet<String>,
    pub is_content: bool,
}

impl Namespace {
    pub const MEDIA: i32 = -2;
    pub const SPECIAL: i32 = -1;
    pub const MAIN: i32 = 0;
    pub const TALK: i32 = 1;
    pub const USER: i32 = 2;
    pub const PROJECT: i32 = 4;
    pub const FILE: i32 = 6;
    pub const MEDIAWIKI: i32 = 8;
    pub const TEMPLATE: i32 = 10;
    pub const HELP: i32 = 12;
    pub const CATEGORY: i32 = 14;

    pub fn is_talk(&self) -> bool {
        self.id > Self::MAIN && self.id % 2 == 1
    }

    pub fn is_subject(&self) -> bool {
        !self.is_talk()
    }

    /// The talk namespace id paired with this namespace, when one exists.
    pub fn talk_id(&self) -> Option<i32> {
        if self.id < Self::MAIN {
            None
        } else if self.is_talk() {
            Some(self.id)
        } else {
            Some(self.id + 1)
        }
    }

    pub fn subject_id(&self) -> i32 {
        if self.is_talk() {
            self.id - 1
        } else {
            self.id
        }
    }

    /// The name shown to users: localized when present, canonical
    /// otherwise.
    pub fn display_name(&self) -> &str {
        if self.localized.is_empty() {
            &self.canonical
        } else {
            &self.localized
        }
    }
}

/// The namespace table of one site, indexed by id and by every known name.
#[derive(Clone, Debug, Default)]
pub struct NamespaceCollection {
    by_id: HashMap<i32, Namespace>,
    index: HashMap<String, i32>,
}

impl NamespaceCollection {
    pub fn get(&self, id: i32) -> Option<&Namespace> {
        self.by_id.get(&id)
    }

    /// Case-insensitive lookup by canonical name, localized name or alias,
    /// after whitespace/underscore normalisation.
    pub fn resolve(&self, name: &str) -> Option<&Namespace> {
        let key = Self::index_key(name);
        self.index.get(&key).and_then(|id| self.by_id.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Namespace> {
        self.by_id.values()
    }

    fn index_key(name: &str) -> String {
        normalize(name).to_lowercase()
    }

    pub fn insert(&mut self, ns: Namespace) {
        for name in [&ns.canonical, &ns.localized] {
            if !name.is_empty() {
                self.index.insert(Self::index_key(name), ns.id);
            }
        }
        for alias in &ns.aliases {
            self.index.insert(Self::index_key(alias), ns.id);
        }
        // the main namespace has no name but must resolve by id
        self.by_id.insert(ns.id, ns);
    }

    pub fn add_alias(&mut self, id: i32, alias: &str) {
        if let Some(ns) = self.by_id.get_mut(&id) {
            ns.aliases.insert(alias.to_owned());
            self.index.insert(Self::index_key(alias), id);
        }
    }
}

/// One row of the interwiki map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterwikiEntry {
    pub prefix: String,
    pub url: String,
    pub is_local: bool,
    pub is_language_link: bool,
    pub is_extra_language_link: bool,
}

/// The interwiki table of one site, keyed by lower-cased prefix.
#[derive(Clone, Debug, Default)]
pub struct InterwikiMap {
    entries: HashMap<String, InterwikiEntry>,
}

impl InterwikiMap {
    pub fn resolve(&self, prefix: &str) -> Option<&InterwikiEntry> {
        self.entries.get(&prefix.to_lowercase())
    }

    pub fn insert(&mut self, entry: InterwikiEntry) {
        self.entries.insert(entry.prefix.to_lowercase(), entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterwikiEntry> {
        self.entries.values()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MagicWord {
    pub name: String,
    pub aliases: Vec<String>,
    pub case_sensitive: bool,
}

/// Site metadata, immutable after bootstrap.
#[derive(Clone, Debug, Default)]
pub struct SiteInfo {
    pub generator: String,
    pub version: MwVersion,
    pub site_name: String,
    pub main_page: String,
    pub language: String,
    pub case: TitleCase,
    pub min_upload_chunk_size: Option<u64>,
    pub max_upload_size: Option<u64>,
    pub extensions: Vec<String>,
    pub namespaces: NamespaceCollection,
    pub interwiki: InterwikiMap,
    pub magic_words: Vec<MagicWord>,
}

/// Truthy for both fv2 (`true`) and fv1 (`""` presence) flag encodings.
fn flag(v: Option<&Value>) -> bool {
    matches!(v, Some(Value::Bool(true)) | Some(Value::String(_)))
}

fn str_field(v: &Value, key: &str) -> String {
    v.get(key).and_then(Value::as_str).unwrap_or("").to_owned()
}

impl SiteInfo {
    pub fn has_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }

    /// Builds the record from the `query` object of a
    /// `meta=siteinfo&siprop=general|namespaces|namespacealiases|interwikimap|extensions|magicwords`
    /// response.
    pub fn from_query(query: &Value) -> Result<Self> {
        let general = query
            .get("general")
            .ok_or_else(|| Error::InvalidResponse("siteinfo lacks general".to_owned()))?;
        let generator = str_field(general, "generator");
        let mut info = SiteInfo {
            version: MwVersion::parse(&generator),
            generator,
            site_name: str_field(general, "sitename"),
            main_page: str_field(general, "mainpage"),
            language: str_field(general, "lang"),
            case: TitleCase::parse(&str_field(general, "case")),
            min_upload_chunk_size: general
                .get("minuploadchunksize")
                .and_then(Value::as_u64),
            max_upload_size: general.get("maxuploadsize").and_then(Value::as_u64),
            ..Default::default()
        };

        if let Some(Value::Object(namespaces)) = query.get("namespaces") {
            for ns in namespaces.values() {
                let Some(id) = ns.get("id").and_then(Value::as_i64) else {
                    continue;
                };
                let localized = ns
                    .get("name")
                    .or_else(|| ns.get("*"))
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_owned();
                info.namespaces.insert(Namespace {
                    id: id as i32,
                    canonical: str_field(ns, "canonical"),
                    localized,
                    aliases: BTreeSet::new(),
                    is_content: flag(ns.get("content")),
                });
            }
        }
        if let Some(Value::Array(aliases)) = query.get("namespacealiases") {
            for alias in aliases {
                let id = alias.get("id").and_then(Value::as_i64).unwrap_or(0) as i32;
                let name = alias
                    .get("alias")
                    .or_else(|| alias.get("*"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if !name.is_empty() {
                    info.namespaces.add_alias(id, name);
                }
            }
        }
        if let Some(Value::Array(map)) = query.get("interwikimap") {
            for entry in map {
                let prefix = str_field(entry, "prefix");
                if prefix.is_empty() {
                    continue;
                }
                info.interwiki.insert(InterwikiEntry {
                    prefix,
                    url: str_field(entry, "url"),
                    is_local: flag(entry.get("local")),
                    is_language_link: entry.get("language").is_some(),
                    is_extra_language_link: flag(entry.get("extralanglink")),
                });
            }
        }
        if let Some(Value::Array(extensions)) = query.get("extensions") {
            for ext in extensions {
                let name = str_field(ext, "name");
                if !name.is_empty() {
                    info.extensions.push(name);
                }
            }
        }
        if let Some(Value::Array(words)) = query.get("magicwords") {
            for word in words {
                info.magic_words.push(MagicWord {
                    name: str_field(word, "name"),
                    aliases: word
                        .get("aliases")
                        .and_then(Value::as_array)
                        .map(|a| {
                            a.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_owned)
                                .collect()
                        })
                        .unwrap_or_default(),
                    case_sensitive: flag(word.get("case-sensitive")),
                });
            }
        }
        Ok(info)
    }
}

/// The account the session is acting as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    pub name: String,
    pub id: u64,
    pub is_anonymous: bool,
    pub groups: BTreeSet<String>,
    pub rights: BTreeSet<String>,
}

impl Default for AccountInfo {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl AccountInfo {
    pub fn anonymous() -> Self {
        Self {
            name: String::new(),
            id: 0,
            is_anonymous: true,
            groups: BTreeSet::new(),
            rights: BTreeSet::new(),
        }
    }

    pub fn has_right(&self, right: &str) -> bool {
        self.rights.contains(right)
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Builds the record from the `query.userinfo` object.
    pub fn from_userinfo(userinfo: &Value) -> Self {
        let collect = |key: &str| -> BTreeSet<String> {
            userinfo
                .get(key)
                .and_then(Value::as_array)
                .map(|a| {
                    a.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default()
        };
        let id = userinfo.get("id").and_then(Value::as_u64).unwrap_or(0);
        Self {
            name: str_field(userinfo, "name"),
            id,
            is_anonymous: flag(userinfo.get("anon")) || id == 0,
            groups: collect("groups"),
            rights: collect("rights"),
        }
    }
}
