//! Parsing and formatting of wiki link titles: interwiki prefixes,
//! namespace prefixes, sections and display anchors.

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::family::WikiFamily;
use crate::site::info::{Namespace, SiteInfo, TitleCase};
use crate::site::Site;

/// Normalises a title part: underscores become spaces, runs of ASCII
/// whitespace collapse into a single space, leading and trailing
/// whitespace is stripped.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        if c == '_' || c.is_ascii_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    out
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '[' | ']' | '{' | '}' | '<' | '>' | '|') || c.is_control()
}

/// A decomposed wiki link.
///
/// Equality ignores the original input text: two links parsed from
/// different spellings of the same target compare equal.
#[derive(Clone, Debug, Eq)]
pub struct WikiLink {
    original: String,
    interwiki: Option<String>,
    namespace_id: Option<i32>,
    namespace_name: Option<String>,
    title: String,
    section: Option<String>,
    anchor: Option<String>,
}

impl PartialEq for WikiLink {
    fn eq(&self, other: &Self) -> bool {
        self.interwiki == other.interwiki
            && self.namespace_id == other.namespace_id
            && self.namespace_name == other.namespace_name
            && self.title == other.title
            && self.section == other.section
            && self.anchor == other.anchor
    }
}

impl WikiLink {
    /// The text this link was parsed from, verbatim.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The effective interwiki prefix. With a chain of prefixes, the last
    /// one wins; its site's tables were authoritative for the rest of the
    /// parse.
    pub fn interwiki(&self) -> Option<&str> {
        self.interwiki.as_deref()
    }

    /// The namespace id on the target site, when it could be resolved.
    pub fn namespace_id(&self) -> Option<i32> {
        self.namespace_id
    }

    /// The namespace display name on the target site.
    pub fn namespace_name(&self) -> Option<&str> {
        self.namespace_name.as_deref()
    }

    /// The page title without namespace, section or anchor.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    /// Reconstructs the full normalised title,
    /// `interwiki:Namespace:Title#section|anchor` with empty segments
    /// omitted. Parsing the result yields a link equal to this one.
    pub fn full_title(&self) -> String {
        let mut s = String::new();
        if let Some(iw) = &self.interwiki {
            s.push_str(iw);
            s.push(':');
        }
        if let Some(ns) = &self.namespace_name {
            if !ns.is_empty() {
                s.push_str(ns);
                s.push(':');
            }
        }
        s.push_str(&self.title);
        if let Some(section) = &self.section {
            s.push('#');
            s.push_str(section);
            if let Some(anchor) = &self.anchor {
                s.push('|');
                s.push_str(anchor);
            }
        }
        s
    }

    /// Parses a link against one site's namespace and interwiki tables.
    /// Interwiki prefixes are recognised, but the text after a prefix is
    /// kept as an opaque local title since the foreign site's tables are
    /// not available; use [`WikiLink::parse_with_family`] for cross-site
    /// resolution.
    pub fn parse(info: &SiteInfo, text: &str, default_ns: i32) -> Result<WikiLink> {
        let mut state = ParseState::start(text, default_ns);
        loop {
            let Some((head, rest)) = state.split_prefix() else {
                break;
            };
            if info.interwiki.resolve(&head).is_some() {
                state.take_interwiki(head, rest);
                // no foreign tables to keep resolving against
                state.opaque = true;
            } else if !state.opaque && state.take_namespace(info, &head, rest) {
                break;
            } else {
                break;
            }
        }
        state.finish(info)
    }

    /// Parses a link, resolving interwiki prefixes through a
    /// [`WikiFamily`]: a prefix registered in the family switches the
    /// "current site" whose tables drive the remaining parse.
    pub async fn parse_with_family(
        site: &Site,
        family: &WikiFamily,
        text: &str,
        default_ns: i32,
        cancel: &CancellationToken,
    ) -> Result<WikiLink> {
        let mut info = site.site_info()?;
        let mut state = ParseState::start(text, default_ns);
        loop {
            let Some((head, rest)) = state.split_prefix() else {
                break;
            };
            if info.interwiki.resolve(&head).is_some() || family.knows(&head) {
                state.take_interwiki(head.clone(), rest);
                match family.get_site(&head, cancel).await? {
                    Some(sibling) => {
                        info = sibling.site_info()?;
                        state.opaque = false;
                    }
                    None => state.opaque = true,
                }
            } else if !state.opaque && state.take_namespace(&info, &head, rest) {
                break;
            } else {
                break;
            }
        }
        state.finish(&info)
    }
}

impl fmt::Display for WikiLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_title())
    }
}

struct ParseState {
    original: String,
    work: String,
    default_ns: i32,
    interwiki: Option<String>,
    namespace: Option<(i32, String)>,
    /// Set after an interwiki prefix whose site tables are unavailable;
    /// the remainder stays an opaque local title.
    opaque: bool,
}

impl ParseState {
    fn start(text: &str, mut default_ns: i32) -> Self {
        let mut work = normalize(text);
        if let Some(rest) = work.strip_prefix(':') {
            default_ns = Namespace::MAIN;
            work = normalize(rest);
        }
        Self {
            original: text.to_owned(),
            work,
            default_ns,
            interwiki: None,
            namespace: None,
            opaque: false,
        }
    }

    /// Splits the next `prefix:` off the working text. The prefix comes
    /// back normalised to lower case.
    fn split_prefix(&self) -> Option<(String, String)> {
        let (head, rest) = self.work.split_once(':')?;
        let head = normalize(head).to_lowercase();
        Some((head, normalize(rest)))
    }

    fn take_interwiki(&mut self, prefix: String, rest: String) {
        self.interwiki = Some(prefix);
        self.work = rest;
    }

    fn take_namespace(&mut self, info: &SiteInfo, head: &str, rest: String) -> bool {
        match info.namespaces.resolve(head) {
            Some(ns) => {
                self.namespace = Some((ns.id, ns.display_name().to_owned()));
                self.work = rest;
                true
            }
            None => false,
        }
    }

    fn finish(mut self, info: &SiteInfo) -> Result<WikiLink> {
        if self.namespace.is_none() && !self.opaque {
            if let Some(ns) = info.namespaces.get(self.default_ns) {
                self.namespace = Some((ns.id, ns.display_name().to_owned()));
            }
        }

        let work = std::mem::take(&mut self.work);
        let (title_part, section, anchor) = match work.find('#') {
            Some(pos) => {
                let frag = work[pos + 1..].trim();
                let (section, anchor) = match frag.split_once('|') {
                    Some((section, anchor)) => (
                        Some(section.trim().to_owned()),
                        Some(anchor.trim().to_owned()),
                    ),
                    None => (Some(frag.to_owned()), None),
                };
                (work[..pos].trim_end().to_owned(), section, anchor)
            }
            None => (work, None, None),
        };

        if title_part.chars().any(is_forbidden) {
            return Err(Error::BadTitle {
                text: self.original,
                reason: "title contains a forbidden character",
            });
        }
        if title_part.is_empty() && self.interwiki.is_none() {
            return Err(Error::BadTitle {
                text: self.original,
                reason: "title is empty",
            });
        }

        let title = match info.case {
            TitleCase::FirstLetter => upper_first(&title_part),
            TitleCase::CaseSensitive => title_part,
        };

        let (namespace_id, namespace_name) = match self.namespace {
            Some((id, name)) => (Some(id), Some(name)),
            None => (None, None),
        };

        Ok(WikiLink {
            original: self.original,
            interwiki: self.interwiki,
            namespace_id,
            namespace_name,
            title,
            section,
            anchor,
        })
    }
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_lowercase() => {
            let mut out = String::with_capacity(s.len());
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
            out
        }
        _ => s.to_owned(),
    }
}
