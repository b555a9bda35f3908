//! Wire-level value types shared across the request and response layers.

use std::fmt;

use chrono::{DateTime, Utc};

/// A point in time as MediaWiki exchanges it: RFC 3339 with second
/// precision, always UTC.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct MwTimestamp(pub DateTime<Utc>);

impl MwTimestamp {
    pub fn to_wire(&self) -> String {
        self.0.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(s).map(|d| Self(d.into()))
    }
}

impl fmt::Display for MwTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl serde::Serialize for MwTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_wire().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for MwTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        MwTimestamp::parse(&s).map_err(serde::de::Error::custom)
    }
}

impl From<DateTime<Utc>> for MwTimestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

/// A timestamp parameter that also accepts the server-side `now` keyword.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NowableTime {
    Now,
    Timestamp(MwTimestamp),
}

impl NowableTime {
    pub fn to_wire(&self) -> String {
        match self {
            Self::Now => "now".to_owned(),
            Self::Timestamp(t) => t.to_wire(),
        }
    }
}

impl serde::Serialize for NowableTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Now => "now".serialize(serializer),
            Self::Timestamp(time) => time.serialize(serializer),
        }
    }
}

impl From<DateTime<Utc>> for NowableTime {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::Timestamp(MwTimestamp(dt))
    }
}

/// Result-set size for a single API request.
#[derive(Clone, Copy, Debug, Default)]
pub enum Limit {
    /// Let the server pick the largest page it allows.
    #[default]
    Max,
    Value(usize),
    /// Leave the limit parameter off entirely.
    None,
}

impl Limit {
    pub fn to_wire(&self) -> Option<String> {
        match self {
            Limit::Max => Some("max".to_owned()),
            Limit::Value(v) => Some(v.to_string()),
            Limit::None => None,
        }
    }
}

/// Chronological direction for time-ordered queries.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Direction {
    #[default]
    Newer,
    Older,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Newer => "newer",
            Direction::Older => "older",
        }
    }
}

/// Alphabetical direction for title-ordered queries.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ascending",
            SortDirection::Descending => "descending",
        }
    }
}

/// What a mutating action should do to the acting user's watchlist.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum AutoWatchBehavior {
    /// Follow the user's site preferences.
    #[default]
    Preferences,
    NoChange,
    Watch,
    Unwatch,
}

impl AutoWatchBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoWatchBehavior::Preferences => "preferences",
            AutoWatchBehavior::NoChange => "nochange",
            AutoWatchBehavior::Watch => "watch",
            AutoWatchBehavior::Unwatch => "unwatch",
        }
    }
}
