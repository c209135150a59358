//! # Grouping
//!
//! Composite group keys and the hierarchical [`GroupTree`] built from them.
//!
//! A key has one segment per grouping column, joined by [`GROUP_SEPARATOR`].
//! The tree nests one level per segment: every level but the last is a
//! [`GroupNode::Branch`], the last holds the records as a [`GroupNode::Leaf`].
//! Nodes are addressed by *full keys*, the joined segments from the root down
//! to that node (`"kim"`, `"kim|2024-01-15"`).
//!
//! The tree is rebuilt from scratch whenever grouping inputs change and is
//! never edited in place.
//!
//! ## Example
//!
//! ```rust
//! use location_grouper::{build_hierarchy, count, load_sheet, CellValue, PipelineConfig, RawSheet};
//!
//! let sheet = RawSheet::new("s", vec![
//!     vec!["timestamp".into(), "lat".into(), "lng".into()],
//!     vec!["2024-01-15 08:00:00".into(), CellValue::Number(37.5), CellValue::Number(127.0)],
//!     vec!["2024-01-15 09:00:00".into(), CellValue::Number(37.6), CellValue::Number(127.1)],
//! ]);
//! let mut records = load_sheet(&sheet, &PipelineConfig::default()).unwrap();
//! records[0].group = Some("kim|morning".to_string());
//! records[1].group = Some("kim|evening".to_string());
//!
//! let tree = build_hierarchy(&records);
//! assert_eq!(tree.child_keys(Some("kim")), vec!["kim|evening", "kim|morning"]);
//! assert_eq!(tree.get("kim").map(count), Some(2));
//! ```

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::records::compare_chronological;
use crate::sheet::{process, validate, SchemaError};
use crate::temporal::{serial_to_calendar, serial_value};
use crate::{CellValue, LocationRecord, PipelineConfig, RawSheet};

/// Separates segments of a composite group key.
pub const GROUP_SEPARATOR: char = '|';

/// Segment used when a row has no value for a grouping column.
pub const UNKNOWN_GROUP: &str = "Unknown";

// ============================================================================
// Keys
// ============================================================================

/// Composite key of one row for the given grouping columns.
///
/// Columns are looked up by exact header name. Per column:
/// - a missing or blank value gives [`UNKNOWN_GROUP`];
/// - a column named like "date" turns serial numbers above the threshold into
///   a calendar date;
/// - otherwise a column named like "time" turns positive numbers into a time
///   of day;
/// - anything else is used as written.
pub fn build_group_key<H: AsRef<str>>(
    row: &[CellValue],
    group_columns: &[String],
    headers: &[H],
    config: &PipelineConfig,
) -> String {
    let segments: Vec<String> = group_columns
        .iter()
        .map(|column| {
            let value = headers
                .iter()
                .position(|header| header.as_ref() == column)
                .and_then(|index| row.get(index))
                .filter(|value| !value.is_blank());
            match value {
                Some(value) => key_segment(column, value, config),
                None => UNKNOWN_GROUP.to_string(),
            }
        })
        .collect();
    segments.join(&GROUP_SEPARATOR.to_string())
}

fn key_segment(column: &str, value: &CellValue, config: &PipelineConfig) -> String {
    let column = column.to_lowercase();
    let converted = if column.contains("date") {
        serial_value(value, config.serial_date_threshold)
            .and_then(|serial| serial_to_calendar(serial, &config.timezone))
            .map(|parts| parts.date)
    } else if column.contains("time") {
        value
            .as_number()
            .filter(|serial| *serial > 0.0)
            .and_then(|serial| serial_to_calendar(serial, &config.timezone))
            .map(|parts| parts.time)
    } else {
        None
    };
    converted.unwrap_or_else(|| value.to_string())
}

// ============================================================================
// Tree
// ============================================================================

/// One node of the group hierarchy.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GroupNode {
    /// Records of one fully-qualified key, chronologically sorted
    Leaf(Vec<LocationRecord>),
    /// Next grouping level
    Branch(GroupTree),
}

impl GroupNode {
    /// Number of records at or below this node.
    pub fn count(&self) -> usize {
        count(self)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }
}

/// Segment → node mapping, children in sorted key order.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct GroupTree {
    children: BTreeMap<String, GroupNode>,
}

impl GroupTree {
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Top-level segments and their nodes.
    pub fn iter(&self) -> btree_map::Iter<'_, String, GroupNode> {
        self.children.iter()
    }

    /// Node addressed by a full key.
    pub fn get(&self, full_key: &str) -> Option<&GroupNode> {
        let mut parts = full_key.split(GROUP_SEPARATOR);
        let mut node = self.children.get(parts.next()?)?;
        for part in parts {
            match node {
                GroupNode::Branch(tree) => node = tree.children.get(part)?,
                GroupNode::Leaf(_) => return None,
            }
        }
        Some(node)
    }

    /// Full keys of the direct children of `parent`, or of the top level for `None`.
    /// Leaves and unknown keys have no children.
    pub fn child_keys(&self, parent: Option<&str>) -> Vec<String> {
        match parent {
            None => self.children.keys().cloned().collect(),
            Some(parent) => match self.get(parent) {
                Some(GroupNode::Branch(tree)) => tree
                    .children
                    .keys()
                    .map(|segment| join_key(parent, segment))
                    .collect(),
                _ => Vec::new(),
            },
        }
    }

    /// Every full key in the tree, branches and leaves, parents before children.
    pub fn full_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        self.walk(None, &mut |key, _| keys.push(key.to_string()));
        keys
    }

    /// Full keys of all leaves, in sorted order.
    pub fn leaf_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        self.walk(None, &mut |key, node| {
            if node.is_leaf() {
                keys.push(key.to_string());
            }
        });
        keys
    }

    /// Full keys of the leaves at or below `key`.
    pub fn leaf_keys_under(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(GroupNode::Leaf(_)) => vec![key.to_string()],
            Some(GroupNode::Branch(tree)) => {
                let mut keys = Vec::new();
                tree.walk(Some(key), &mut |full, node| {
                    if node.is_leaf() {
                        keys.push(full.to_string());
                    }
                });
                keys
            }
            None => Vec::new(),
        }
    }

    /// Insert a record at the path given by its group key.
    ///
    /// Returns false, leaving the tree unchanged, when the record has no key or
    /// its path runs into a node of the other shape.
    pub fn insert(&mut self, record: LocationRecord) -> bool {
        let Some(key) = record.group.clone() else {
            return false;
        };
        let parts: Vec<&str> = key.split(GROUP_SEPARATOR).collect();
        let Some((last, parents)) = parts.split_last() else {
            return false;
        };

        let mut current = self;
        for part in parents {
            let node = current
                .children
                .entry(part.to_string())
                .or_insert_with(|| GroupNode::Branch(GroupTree::default()));
            match node {
                GroupNode::Branch(tree) => current = tree,
                GroupNode::Leaf(_) => return false,
            }
        }

        match current
            .children
            .entry(last.to_string())
            .or_insert_with(|| GroupNode::Leaf(Vec::new()))
        {
            GroupNode::Leaf(records) => {
                records.push(record);
                true
            }
            GroupNode::Branch(_) => false,
        }
    }

    fn walk<F: FnMut(&str, &GroupNode)>(&self, prefix: Option<&str>, visit: &mut F) {
        for (segment, node) in &self.children {
            let full = match prefix {
                Some(prefix) => join_key(prefix, segment),
                None => segment.clone(),
            };
            visit(&full, node);
            if let GroupNode::Branch(tree) = node {
                tree.walk(Some(full.as_str()), visit);
            }
        }
    }

    fn sort_leaves(&mut self) {
        for node in self.children.values_mut() {
            match node {
                GroupNode::Leaf(records) => records.sort_by(compare_chronological),
                GroupNode::Branch(tree) => tree.sort_leaves(),
            }
        }
    }
}

/// Full key of `segment` beneath `parent`.
pub(crate) fn join_key(parent: &str, segment: &str) -> String {
    format!("{}{}{}", parent, GROUP_SEPARATOR, segment)
}

/// Full key of the parent of `key`, `None` at the top level.
pub(crate) fn parent_key(key: &str) -> Option<&str> {
    key.rfind(GROUP_SEPARATOR).map(|index| &key[..index])
}

/// Build the hierarchy from records carrying group keys.
///
/// Records without a key, and records whose key collides with a node of the
/// other shape (a value containing the separator), are logged and left out.
pub fn build_hierarchy(records: &[LocationRecord]) -> GroupTree {
    let mut tree = GroupTree::default();
    let mut skipped = 0usize;

    for record in records {
        let key = record.group.clone();
        if !tree.insert(record.clone()) {
            skipped += 1;
            warn!(
                "[Grouping] Skipping row {} of '{}': group key {:?} conflicts with existing groups",
                record.row_index, record.sheet_name, key
            );
        }
    }

    tree.sort_leaves();
    debug!(
        "[Grouping] Built hierarchy: {} top-level groups from {} records ({} skipped)",
        tree.children.len(),
        records.len(),
        skipped
    );
    tree
}

/// Number of records at or below `node`.
pub fn count(node: &GroupNode) -> usize {
    match node {
        GroupNode::Leaf(records) => records.len(),
        GroupNode::Branch(tree) => tree.children.values().map(count).sum(),
    }
}

// ============================================================================
// Assignment
// ============================================================================

/// Records tagged with group keys, plus the sheets that could not take part.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupingOutcome {
    pub records: Vec<LocationRecord>,
    pub issues: Vec<SchemaError>,
    /// Rows left out because a grouping value contains [`GROUP_SEPARATOR`].
    pub ambiguous_rows: usize,
}

/// Process every selected sheet and tag its records with group keys.
///
/// Sheets that fail validation or lack one of the grouping columns are skipped
/// and reported in [`GroupingOutcome::issues`]. Rows whose key does not split
/// back into one segment per column are logged and left out, so every leaf of
/// the tree built from the outcome sits at the same depth.
///
/// # Arguments
/// * `sheets` - All loaded sheets, in load order
/// * `selected` - Names of the sheets taking part
/// * `group_columns` - Exact header names, outermost level first
/// * `config` - Column keywords, serial threshold and time zones
///
/// # Returns
/// Tagged records in sheet order (each sheet sorted by time), plus one
/// [`SchemaError`] per skipped sheet.
///
/// # Example
/// ```
/// use std::collections::BTreeSet;
/// use location_grouper::{assign_groups, PipelineConfig, RawSheet};
///
/// let sheet = RawSheet::new("s", vec![
///     vec!["timestamp".into(), "lat".into(), "lng".into(), "driver".into()],
///     vec!["2024-01-15 08:00:00".into(), "37.5".into(), "127.0".into(), "kim".into()],
///     vec!["2024-01-15 09:00:00".into(), "37.6".into(), "127.1".into(), "".into()],
/// ]);
/// let selected: BTreeSet<String> = ["s".to_string()].into_iter().collect();
/// let columns = vec!["driver".to_string()];
/// let outcome = assign_groups(&[sheet], &selected, &columns, &PipelineConfig::default());
///
/// let keys: Vec<_> = outcome.records.iter().map(|r| r.group.as_deref()).collect();
/// assert_eq!(keys, vec![Some("kim"), Some("Unknown")]);
/// ```
pub fn assign_groups(
    sheets: &[RawSheet],
    selected: &BTreeSet<String>,
    group_columns: &[String],
    config: &PipelineConfig,
) -> GroupingOutcome {
    let mut outcome = GroupingOutcome::default();
    // one segment per column; an empty column list still yields one segment
    let depth = group_columns.len().max(1);

    for sheet in sheets {
        if !selected.contains(&sheet.name) {
            debug!("[Grouping] Sheet '{}' not selected", sheet.name);
            continue;
        }

        let headers = sheet.headers();
        let roles = match validate(&headers, &sheet.name, config) {
            Ok(roles) => roles,
            Err(err) => {
                warn!("[Grouping] {}", err);
                outcome.issues.push(err);
                continue;
            }
        };

        if let Some(column) = group_columns
            .iter()
            .find(|column| !headers.iter().any(|header| header == *column))
        {
            let err = SchemaError::MissingGroupColumn {
                sheet: sheet.name.clone(),
                column: column.clone(),
            };
            warn!("[Grouping] {}", err);
            outcome.issues.push(err);
            continue;
        }

        for mut record in process(sheet, &roles, config) {
            let key = build_group_key(&record.raw_data, group_columns, &headers, config);
            if key.split(GROUP_SEPARATOR).count() != depth {
                warn!(
                    "[Grouping] Skipping row {} of '{}': a value in group key {:?} contains '{}'",
                    record.row_index, record.sheet_name, key, GROUP_SEPARATOR
                );
                outcome.ambiguous_rows += 1;
                continue;
            }
            record.group = Some(key);
            outcome.records.push(record);
        }
    }

    info!(
        "[Grouping] Assigned {} records to groups by {:?} ({} sheets skipped, {} ambiguous rows)",
        outcome.records.len(),
        group_columns,
        outcome.issues.len(),
        outcome.ambiguous_rows
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::temporal::TimeZoneConfig;

    fn text_sheet(name: &str, rows: &[&[&str]]) -> RawSheet {
        RawSheet::new(
            name,
            rows.iter()
                .map(|row| row.iter().map(|cell| CellValue::from(*cell)).collect())
                .collect(),
        )
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn selected(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn drivers_sheet() -> RawSheet {
        text_sheet(
            "Sheet1",
            &[
                &["timestamp", "lat", "lng", "driver", "shift"],
                &["2024-01-15 10:00:00", "37.50", "127.00", "kim", "am"],
                &["2024-01-15 08:00:00", "37.51", "127.01", "kim", "am"],
                &["2024-01-15 18:00:00", "37.52", "127.02", "kim", "pm"],
                &["2024-01-15 09:00:00", "37.53", "127.03", "lee", "am"],
                &["2024-01-15 11:00:00", "37.54", "127.04", "", "am"],
            ],
        )
    }

    #[test]
    fn test_missing_value_is_unknown() {
        let headers = ["driver", "shift"];
        let config = PipelineConfig::default();
        let row = vec![CellValue::Empty, CellValue::from("am")];
        assert_eq!(
            build_group_key(&row, &columns(&["driver", "shift"]), &headers, &config),
            "Unknown|am"
        );

        // short row and unknown column
        let row = vec![CellValue::from("kim")];
        assert_eq!(
            build_group_key(&row, &columns(&["driver", "shift", "car"]), &headers, &config),
            "kim|Unknown|Unknown"
        );
    }

    #[test]
    fn test_zero_is_a_value() {
        let headers = ["zone"];
        let row = vec![CellValue::Number(0.0)];
        assert_eq!(
            build_group_key(&row, &columns(&["zone"]), &headers, &PipelineConfig::default()),
            "0"
        );
    }

    #[test]
    fn test_date_and_time_segments_converted() {
        let config = PipelineConfig {
            timezone: TimeZoneConfig {
                source_offset_seconds: 0,
                display_offset_seconds: 0,
            },
            ..PipelineConfig::default()
        };
        let headers = ["Visit Date", "StartTime", "count"];
        let row = vec![
            CellValue::Number(45306.0),
            CellValue::from("0.25"),
            CellValue::Number(45306.0),
        ];
        assert_eq!(
            build_group_key(
                &row,
                &columns(&["Visit Date", "StartTime", "count"]),
                &headers,
                &config
            ),
            "2024-01-15|06:00:00|45306"
        );

        // small numbers in a date column stay as written
        let row = vec![CellValue::Number(7.0), CellValue::from("late"), CellValue::Empty];
        assert_eq!(
            build_group_key(&row, &columns(&["Visit Date", "StartTime"]), &headers, &config),
            "7|late"
        );
    }

    #[test]
    fn test_assign_and_build_hierarchy() {
        let sheets = vec![drivers_sheet()];
        let outcome = assign_groups(
            &sheets,
            &selected(&["Sheet1"]),
            &columns(&["driver", "shift"]),
            &PipelineConfig::default(),
        );
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.records.len(), 5);

        let tree = build_hierarchy(&outcome.records);
        assert_eq!(tree.child_keys(None), vec!["Unknown", "kim", "lee"]);
        assert_eq!(tree.child_keys(Some("kim")), vec!["kim|am", "kim|pm"]);
        assert_eq!(tree.get("kim").map(count), Some(3));
        assert_eq!(tree.get("Unknown|am").map(count), Some(1));
        assert_eq!(
            tree.leaf_keys(),
            vec!["Unknown|am", "kim|am", "kim|pm", "lee|am"]
        );
        assert_eq!(tree.leaf_keys_under("kim"), vec!["kim|am", "kim|pm"]);
        assert_eq!(
            tree.full_keys(),
            vec!["Unknown", "Unknown|am", "kim", "kim|am", "kim|pm", "lee", "lee|am"]
        );

        // leaves are chronological
        match tree.get("kim|am") {
            Some(GroupNode::Leaf(records)) => {
                let stamps: Vec<&str> = records.iter().map(|r| r.timestamp.as_str()).collect();
                assert_eq!(stamps, vec!["2024-01-15 08:00:00", "2024-01-15 10:00:00"]);
            }
            other => panic!("expected leaf, got {:?}", other),
        }
    }

    #[test]
    fn test_grouping_is_idempotent() {
        let sheets = vec![drivers_sheet()];
        let config = PipelineConfig::default();
        let group_columns = columns(&["driver"]);
        let sheet_names = selected(&["Sheet1"]);

        let first = assign_groups(&sheets, &sheet_names, &group_columns, &config);
        let second = assign_groups(&sheets, &sheet_names, &group_columns, &config);
        assert_eq!(first, second);
        assert_eq!(build_hierarchy(&first.records), build_hierarchy(&second.records));
    }

    #[test]
    fn test_sheets_without_group_column_reported() {
        let other = text_sheet(
            "Sheet2",
            &[
                &["timestamp", "lat", "lng"],
                &["2024-01-15 08:00:00", "37.5", "127.0"],
            ],
        );
        let broken = text_sheet("Sheet3", &[&["memo"], &["x"]]);
        let sheets = vec![drivers_sheet(), other, broken];

        let outcome = assign_groups(
            &sheets,
            &selected(&["Sheet1", "Sheet2", "Sheet3"]),
            &columns(&["driver"]),
            &PipelineConfig::default(),
        );
        assert_eq!(outcome.records.len(), 5);
        assert_eq!(outcome.issues.len(), 2);
        assert_eq!(
            outcome.issues[0],
            SchemaError::MissingGroupColumn {
                sheet: "Sheet2".to_string(),
                column: "driver".to_string(),
            }
        );
        assert_eq!(outcome.issues[1].sheet(), "Sheet3");
    }

    #[test]
    fn test_unselected_sheets_ignored() {
        let sheets = vec![drivers_sheet()];
        let outcome = assign_groups(
            &sheets,
            &BTreeSet::new(),
            &columns(&["driver"]),
            &PipelineConfig::default(),
        );
        assert!(outcome.records.is_empty());
        assert!(outcome.issues.is_empty());
    }

    fn collision_sheet(rows: &[&[&str]]) -> GroupingOutcome {
        let header: &[&str] = &["timestamp", "lat", "lng", "driver", "shift"];
        let mut all = vec![header];
        all.extend_from_slice(rows);
        assign_groups(
            &[text_sheet("s", &all)],
            &selected(&["s"]),
            &columns(&["driver", "shift"]),
            &PipelineConfig::default(),
        )
    }

    #[test]
    fn test_separator_collision_left_out() {
        let outcome = collision_sheet(&[
            &["2024-01-15 08:00:00", "37.5", "127.0", "kim", "am"],
            &["2024-01-15 09:00:00", "37.5", "127.0", "kim|am", "x"],
            &["2024-01-15 10:00:00", "37.5", "127.0", "kim", "am|late"],
            &["2024-01-15 11:00:00", "37.5", "127.0", "lee", "pm"],
        ]);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.ambiguous_rows, 2);

        let tree = build_hierarchy(&outcome.records);
        assert_eq!(tree.leaf_keys(), vec!["kim|am", "lee|pm"]);
        assert_eq!(tree.get("kim|am").map(count), Some(1));
    }

    #[test]
    fn test_separator_collision_independent_of_order() {
        // the ambiguous row comes first in time
        let outcome = collision_sheet(&[
            &["2024-01-15 08:00:00", "37.5", "127.0", "kim|am", "x"],
            &["2024-01-15 09:00:00", "37.5", "127.0", "kim", "am"],
            &["2024-01-15 10:00:00", "37.5", "127.0", "lee", "pm"],
        ]);
        assert_eq!(outcome.ambiguous_rows, 1);

        let tree = build_hierarchy(&outcome.records);
        assert_eq!(tree.leaf_keys(), vec!["kim|am", "lee|pm"]);
        assert!(tree.get("kim|am|x").is_none());
        match tree.get("kim|am") {
            Some(GroupNode::Leaf(records)) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].timestamp, "2024-01-15 09:00:00");
            }
            other => panic!("expected leaf, got {:?}", other),
        }
    }

    #[test]
    fn test_insert_rejects_mismatched_shape() {
        let outcome = collision_sheet(&[
            &["2024-01-15 08:00:00", "37.5", "127.0", "kim", "am"],
        ]);
        let mut tree = build_hierarchy(&outcome.records);

        let mut deeper = outcome.records[0].clone();
        deeper.group = Some("kim|am|x".to_string());
        assert!(!tree.insert(deeper));

        let mut shallower = outcome.records[0].clone();
        shallower.group = Some("kim".to_string());
        assert!(!tree.insert(shallower));
        assert_eq!(tree.leaf_keys(), vec!["kim|am"]);
    }

    #[test]
    fn test_parent_key() {
        assert_eq!(parent_key("a|b|c"), Some("a|b"));
        assert_eq!(parent_key("a"), None);
        assert_eq!(join_key("a|b", "c"), "a|b|c");
    }
}
