//! # Column Resolution
//!
//! Maps human-authored header names onto the semantic roles the pipeline needs.
//!
//! Headers are compared after lower-casing and removing whitespace and `_`, so
//! `"TS_Local"`, `"ts local"` and `"tslocal"` all resolve to the timestamp role.
//! Keywords for a role are tried in priority order, and for each keyword the
//! headers are scanned left to right; the first hit wins.
//!
//! | Role | Default keywords |
//! |------|------------------|
//! | [`ColumnRole::Timestamp`] | `tslocal`, `timestamp`, `datetime` |
//! | [`ColumnRole::Date`] | `date`, `day`, `날짜` |
//! | [`ColumnRole::Time`] | `time`, `시간` |
//! | [`ColumnRole::Latitude`] | `lat`, `latitude`, `위도` |
//! | [`ColumnRole::Longitude`] | `lng`, `longitude`, `경도` |

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Semantic role of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ColumnRole {
    Timestamp,
    Date,
    Time,
    Latitude,
    Longitude,
}

impl ColumnRole {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Date => "date",
            Self::Time => "time",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        }
    }

    /// Built-in keywords, highest priority first.
    pub const fn default_keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Timestamp => &["tslocal", "timestamp", "datetime"],
            Self::Date => &["date", "day", "날짜"],
            Self::Time => &["time", "시간"],
            Self::Latitude => &["lat", "latitude", "위도"],
            Self::Longitude => &["lng", "longitude", "경도"],
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword lists per role, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RoleKeywords {
    pub timestamp: Vec<String>,
    pub date: Vec<String>,
    pub time: Vec<String>,
    pub latitude: Vec<String>,
    pub longitude: Vec<String>,
}

impl RoleKeywords {
    pub fn for_role(&self, role: ColumnRole) -> &[String] {
        match role {
            ColumnRole::Timestamp => &self.timestamp,
            ColumnRole::Date => &self.date,
            ColumnRole::Time => &self.time,
            ColumnRole::Latitude => &self.latitude,
            ColumnRole::Longitude => &self.longitude,
        }
    }
}

impl Default for RoleKeywords {
    fn default() -> Self {
        let owned = |role: ColumnRole| -> Vec<String> {
            role.default_keywords().iter().map(|k| k.to_string()).collect()
        };
        Self {
            timestamp: owned(ColumnRole::Timestamp),
            date: owned(ColumnRole::Date),
            time: owned(ColumnRole::Time),
            latitude: owned(ColumnRole::Latitude),
            longitude: owned(ColumnRole::Longitude),
        }
    }
}

/// Resolved column index per role for one sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColumnRoles {
    pub timestamp: Option<usize>,
    pub date: Option<usize>,
    pub time: Option<usize>,
    pub latitude: Option<usize>,
    pub longitude: Option<usize>,
}

impl ColumnRoles {
    /// Resolve every role against one header row.
    pub fn resolve<H: AsRef<str>>(headers: &[H], keywords: &RoleKeywords, exact: bool) -> Self {
        let find = |role| find_column_index(headers, keywords.for_role(role), exact);
        Self {
            timestamp: find(ColumnRole::Timestamp),
            date: find(ColumnRole::Date),
            time: find(ColumnRole::Time),
            latitude: find(ColumnRole::Latitude),
            longitude: find(ColumnRole::Longitude),
        }
    }

    pub fn get(&self, role: ColumnRole) -> Option<usize> {
        match role {
            ColumnRole::Timestamp => self.timestamp,
            ColumnRole::Date => self.date,
            ColumnRole::Time => self.time,
            ColumnRole::Latitude => self.latitude,
            ColumnRole::Longitude => self.longitude,
        }
    }

    /// A combined timestamp column, or both a date and a time column.
    pub fn has_timestamp(&self) -> bool {
        self.timestamp.is_some() || (self.date.is_some() && self.time.is_some())
    }

    /// Everything a sheet needs to yield location records.
    pub fn is_complete(&self) -> bool {
        self.has_timestamp() && self.latitude.is_some() && self.longitude.is_some()
    }

    /// Roles whose absence makes the sheet incomplete.
    pub fn missing(&self) -> Vec<ColumnRole> {
        let mut missing = Vec::new();
        if !self.has_timestamp() {
            if self.date.is_none() {
                missing.push(ColumnRole::Date);
            }
            if self.time.is_none() {
                missing.push(ColumnRole::Time);
            }
            missing.insert(0, ColumnRole::Timestamp);
        }
        if self.latitude.is_none() {
            missing.push(ColumnRole::Latitude);
        }
        if self.longitude.is_none() {
            missing.push(ColumnRole::Longitude);
        }
        missing
    }
}

/// Resolve all roles with substring matching.
///
/// # Example
/// ```
/// use location_grouper::{resolve, RoleKeywords};
///
/// let headers = ["No", "TS_Local", "위도", "경도"];
/// let roles = resolve(&headers, &RoleKeywords::default());
/// assert_eq!(roles.timestamp, Some(1));
/// assert_eq!(roles.latitude, Some(2));
/// assert_eq!(roles.longitude, Some(3));
/// assert!(roles.is_complete());
/// ```
pub fn resolve<H: AsRef<str>>(headers: &[H], keywords: &RoleKeywords) -> ColumnRoles {
    ColumnRoles::resolve(headers, keywords, false)
}

/// Lower-case and drop whitespace and underscores.
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Index of the first header matching any keyword, keywords tried in order.
pub fn find_column_index<H: AsRef<str>, K: AsRef<str>>(
    headers: &[H],
    keywords: &[K],
    exact: bool,
) -> Option<usize> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h.as_ref())).collect();
    keywords.iter().find_map(|keyword| {
        let keyword = keyword.as_ref().to_lowercase();
        normalized.iter().position(|header| {
            !header.is_empty()
                && if exact {
                    *header == keyword
                } else {
                    header.contains(keyword.as_str())
                }
        })
    })
}
