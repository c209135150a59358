//! # Session
//!
//! Application state for one loaded workbook, threaded explicitly through the
//! pure pipeline.
//!
//! A [`Session`] owns the loaded sheets, the [`SelectionState`] and the chosen
//! grouping columns. Everything shown is re-derived from those on each
//! [`Session::render`]; nothing computed is kept between renders.
//!
//! - With no grouping columns, [`View::Sheets`] holds one sorted track per
//!   selected sheet.
//! - With grouping columns, [`View::Groups`] holds the group tree, one track
//!   per selected leaf group, and gray connectors between consecutive groups.

use std::collections::BTreeSet;
use std::io::Read;

use log::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::geo_utils::{self, PathSegment};
use crate::grouping::{assign_groups, build_hierarchy, GroupNode, GroupTree};
use crate::ingest::{sheets_from_csv, IngestError};
use crate::selection::SelectionState;
use crate::sheet::{load_sheet, summarize, SchemaError, SheetSummary};
use crate::{Bounds, GpsPoint, LocationRecord, PipelineConfig, RawSheet};

// ============================================================================
// View
// ============================================================================

/// Sorted records of one sheet.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SheetTrack {
    pub sheet_name: String,
    pub records: Vec<LocationRecord>,
}

impl SheetTrack {
    /// Hops of the drawn path, in record order.
    pub fn path_segments(&self) -> Vec<PathSegment> {
        geo_utils::path_segments(&self.records)
    }
}

/// Sorted records of one selected leaf group.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupTrack {
    /// Full group key
    pub key: String,
    pub records: Vec<LocationRecord>,
}

impl GroupTrack {
    pub fn path_segments(&self) -> Vec<PathSegment> {
        geo_utils::path_segments(&self.records)
    }
}

/// Render data for grouping mode.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GroupView {
    /// Whole hierarchy, selected or not
    pub tree: GroupTree,
    /// Visible leaf groups in tree order
    pub tracks: Vec<GroupTrack>,
    /// Last record of each visible group to the first record of the next,
    /// groups taken in sorted full-key order
    pub connectors: Vec<PathSegment>,
    /// Extent of all visible records
    pub bounds: Option<Bounds>,
    /// Selected sheets left out of grouping
    pub issues: Vec<SchemaError>,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(tag = "mode", rename_all = "snake_case")
)]
pub enum View {
    Sheets {
        tracks: Vec<SheetTrack>,
        issues: Vec<SchemaError>,
        /// Present when exactly one sheet is selected and it has records
        bounds: Option<Bounds>,
        /// Number of selected sheets this view was built from
        selected_sheets: usize,
    },
    Groups(GroupView),
}

impl View {
    /// Number of visible records.
    pub fn record_count(&self) -> usize {
        match self {
            Self::Sheets { tracks, .. } => tracks.iter().map(|t| t.records.len()).sum(),
            Self::Groups(view) => view.tracks.iter().map(|t| t.records.len()).sum(),
        }
    }

    pub fn issues(&self) -> &[SchemaError] {
        match self {
            Self::Sheets { issues, .. } => issues,
            Self::Groups(view) => &view.issues,
        }
    }

    pub fn bounds(&self) -> Option<Bounds> {
        match self {
            Self::Sheets { bounds, .. } => *bounds,
            Self::Groups(view) => view.bounds,
        }
    }

    /// Centroid of every visible record, `None` when nothing is visible.
    ///
    /// Unlike [`bounds`](Self::bounds) this is always filled in, so a renderer
    /// can recenter on a multi-sheet view it does not fit.
    pub fn center(&self) -> Option<GpsPoint> {
        let visible: Vec<GpsPoint> = match self {
            Self::Sheets { tracks, .. } => tracks.iter().flat_map(|t| points(&t.records)).collect(),
            Self::Groups(view) => view.tracks.iter().flat_map(|t| points(&t.records)).collect(),
        };
        geo_utils::compute_center(&visible)
    }

    /// The schema error to put in front of the user: only when a single sheet
    /// is shown without grouping and that sheet was rejected.
    pub fn blocking_issue(&self) -> Option<&SchemaError> {
        match self {
            Self::Sheets {
                issues,
                selected_sheets: 1,
                ..
            } => issues.first(),
            _ => None,
        }
    }

    /// Serialize the view for a browser front end.
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Session
// ============================================================================

/// Loaded sheets plus the user's current choices.
#[derive(Debug, Clone, Default)]
pub struct Session {
    config: PipelineConfig,
    sheets: Vec<RawSheet>,
    selection: SelectionState,
    group_columns: Vec<String>,
}

impl Session {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sheets(&self) -> &[RawSheet] {
        &self.sheets
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn group_columns(&self) -> &[String] {
        &self.group_columns
    }

    /// Replace everything with a new set of sheets.
    ///
    /// Selection and grouping columns are reset and the first sheet is
    /// selected. Sheets repeating an earlier name are ignored.
    pub fn load(&mut self, sheets: Vec<RawSheet>) {
        self.selection = SelectionState::default();
        self.group_columns.clear();
        self.sheets.clear();

        let mut seen = BTreeSet::new();
        for sheet in sheets {
            if !seen.insert(sheet.name.clone()) {
                warn!("[Session] Duplicate sheet name '{}' ignored", sheet.name);
                continue;
            }
            self.sheets.push(sheet);
        }

        if let Some(first) = self.sheets.first() {
            self.selection.select_sheet(&first.name, true);
        }
        info!("[Session] Loaded {} sheets", self.sheets.len());
    }

    /// Read CSV text, split it into sheets and load them.
    /// Returns the number of sheets loaded.
    pub fn load_csv<R: Read>(&mut self, reader: R) -> Result<usize, IngestError> {
        let sheets = sheets_from_csv(reader, &self.config)?;
        self.load(sheets);
        Ok(self.sheets.len())
    }

    /// Header names across all sheets in first-seen order, blanks skipped.
    pub fn all_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for sheet in &self.sheets {
            for header in sheet.headers().iter() {
                if !header.is_empty() && !columns.contains(header) {
                    columns.push(header.clone());
                }
            }
        }
        columns
    }

    pub fn sheet_summaries(&self) -> Vec<SheetSummary> {
        self.sheets
            .iter()
            .map(|sheet| summarize(sheet, &self.config))
            .collect()
    }

    /// Choose grouping columns; empty names are dropped.
    ///
    /// Group selection is cleared only when the resulting list differs from
    /// the current one. Returns whether it did.
    pub fn set_group_columns(&mut self, columns: Vec<String>) -> bool {
        let columns: Vec<String> = columns.into_iter().filter(|c| !c.is_empty()).collect();
        let changed = columns != self.group_columns;
        if changed {
            debug!("[Session] Grouping columns {:?} -> {:?}", self.group_columns, columns);
            self.selection.clear_groups();
        }
        self.group_columns = columns;
        changed
    }

    /// Flip a sheet's selection. Group selection is kept.
    pub fn toggle_sheet(&mut self, name: &str) -> bool {
        self.selection.toggle_sheet(name)
    }

    /// Hierarchy of the selected sheets for the current grouping columns.
    pub fn group_tree(&self) -> GroupTree {
        if self.group_columns.is_empty() {
            return GroupTree::default();
        }
        let outcome = assign_groups(
            &self.sheets,
            self.selection.sheets(),
            &self.group_columns,
            &self.config,
        );
        build_hierarchy(&outcome.records)
    }

    /// Flip a group node with cascading. Returns whether it is now selected.
    pub fn toggle_group(&mut self, key: &str) -> bool {
        let tree = self.group_tree();
        self.selection.select_all_if_empty(&tree);
        self.selection.toggle_group(&tree, key)
    }

    /// Record the user opening or closing a branch in the group tree.
    pub fn set_expanded(&mut self, key: &str, expanded: bool) {
        self.selection.set_expanded(key, expanded);
    }

    /// Derive the current view.
    ///
    /// In grouping mode an empty group selection is first filled with every
    /// key, so a fresh grouping shows everything.
    pub fn render(&mut self) -> View {
        if self.group_columns.is_empty() {
            self.render_sheets()
        } else {
            View::Groups(self.render_groups())
        }
    }

    fn render_sheets(&self) -> View {
        let mut tracks = Vec::new();
        let mut issues = Vec::new();
        let selected: Vec<&RawSheet> = self
            .sheets
            .iter()
            .filter(|sheet| self.selection.is_sheet_selected(&sheet.name))
            .collect();

        for sheet in &selected {
            match load_sheet(sheet, &self.config) {
                Ok(records) if records.is_empty() => {
                    debug!("[Session] Sheet '{}' has no valid records", sheet.name);
                }
                Ok(records) => tracks.push(SheetTrack {
                    sheet_name: sheet.name.clone(),
                    records,
                }),
                Err(err) => {
                    warn!("[Session] {}", err);
                    issues.push(err);
                }
            }
        }

        let bounds = match (selected.len(), tracks.as_slice()) {
            (1, [track]) => Bounds::from_points(&points(&track.records)),
            _ => None,
        };

        debug!(
            "[Session] Rendered {} sheet tracks ({} rejected)",
            tracks.len(),
            issues.len()
        );
        View::Sheets {
            tracks,
            issues,
            bounds,
            selected_sheets: selected.len(),
        }
    }

    fn render_groups(&mut self) -> GroupView {
        let outcome = assign_groups(
            &self.sheets,
            self.selection.sheets(),
            &self.group_columns,
            &self.config,
        );
        let tree = build_hierarchy(&outcome.records);
        self.selection.select_all_if_empty(&tree);

        let tracks: Vec<GroupTrack> = tree
            .leaf_keys()
            .into_iter()
            .filter(|key| self.selection.is_group_selected(key))
            .filter_map(|key| match tree.get(&key) {
                Some(GroupNode::Leaf(records)) if !records.is_empty() => Some(GroupTrack {
                    records: records.clone(),
                    key,
                }),
                _ => None,
            })
            .collect();

        let connectors = connect_groups(&tracks);
        let visible: Vec<GpsPoint> = tracks.iter().flat_map(|t| points(&t.records)).collect();

        debug!(
            "[Session] Rendered {} of {} groups, {} connectors",
            tracks.len(),
            tree.leaf_keys().len(),
            connectors.len()
        );
        GroupView {
            bounds: Bounds::from_points(&visible),
            tree,
            tracks,
            connectors,
            issues: outcome.issues,
        }
    }
}

fn points(records: &[LocationRecord]) -> Vec<GpsPoint> {
    records.iter().map(LocationRecord::point).collect()
}

/// Join each group's last record to the next group's first, in sorted key order.
fn connect_groups(tracks: &[GroupTrack]) -> Vec<PathSegment> {
    let mut ordered: Vec<&GroupTrack> = tracks.iter().collect();
    ordered.sort_by(|a, b| a.key.cmp(&b.key));

    ordered
        .windows(2)
        .filter_map(|pair| {
            let last = pair[0].records.last()?;
            let first = pair[1].records.first()?;
            Some(PathSegment::between(last, first))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CellValue;

    fn text_sheet(name: &str, rows: &[&[&str]]) -> RawSheet {
        RawSheet::new(
            name,
            rows.iter()
                .map(|row| row.iter().map(|cell| CellValue::from(*cell)).collect())
                .collect(),
        )
    }

    fn trips() -> RawSheet {
        text_sheet(
            "trips",
            &[
                &["timestamp", "lat", "lng", "driver", "shift"],
                &["2024-01-15 09:00:00", "37.50", "127.00", "kim", "am"],
                &["2024-01-15 08:00:00", "37.51", "127.01", "kim", "am"],
                &["2024-01-15 18:00:00", "37.52", "127.02", "kim", "pm"],
                &["2024-01-15 10:00:00", "37.53", "127.03", "lee", "am"],
                &["2024-01-15 11:00:00", "bad", "127.04", "lee", "am"],
            ],
        )
    }

    fn visits() -> RawSheet {
        text_sheet(
            "visits",
            &[
                &["날짜", "시간", "위도", "경도", "driver"],
                &["2024-01-16", "08:00:00", "35.10", "129.00", "park"],
            ],
        )
    }

    fn notes() -> RawSheet {
        text_sheet("notes", &[&["memo"], &["hello"]])
    }

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_load_selects_first_sheet() {
        let mut session = Session::default();
        session.load(vec![trips(), visits()]);
        assert!(session.selection().is_sheet_selected("trips"));
        assert!(!session.selection().is_sheet_selected("visits"));

        let view = session.render();
        assert_eq!(view.record_count(), 4);
        match &view {
            View::Sheets { tracks, bounds, .. } => {
                assert_eq!(tracks.len(), 1);
                assert_eq!(tracks[0].records[0].timestamp, "2024-01-15 08:00:00");
                assert_eq!(tracks[0].path_segments().len(), 3);
                assert!(bounds.is_some());
            }
            View::Groups(_) => panic!("expected sheet view"),
        }
    }

    #[test]
    fn test_reload_resets_state() {
        let mut session = Session::default();
        session.load(vec![trips()]);
        session.set_group_columns(columns(&["driver"]));
        session.render();
        session.toggle_group("kim");

        session.load(vec![visits()]);
        assert!(session.group_columns().is_empty());
        assert!(session.selection().groups().is_empty());
        assert_eq!(
            session.selection().sheets().iter().collect::<Vec<_>>(),
            vec!["visits"]
        );
    }

    #[test]
    fn test_duplicate_sheet_names_ignored() {
        let mut session = Session::default();
        session.load(vec![trips(), trips()]);
        assert_eq!(session.sheets().len(), 1);
    }

    #[test]
    fn test_bounds_only_for_single_sheet() {
        let mut session = Session::default();
        session.load(vec![trips(), visits()]);
        session.toggle_sheet("visits");

        let view = session.render();
        assert_eq!(view.record_count(), 5);
        assert!(view.bounds().is_none());

        let center = view.center().unwrap();
        assert!((center.latitude - 37.032).abs() < 1e-9);
        assert!((center.longitude - 127.412).abs() < 1e-9);
    }

    #[test]
    fn test_blocking_issue_for_single_rejected_sheet() {
        let mut session = Session::default();
        session.load(vec![notes(), trips()]);

        let view = session.render();
        assert_eq!(view.record_count(), 0);
        assert!(view.center().is_none());
        assert!(matches!(
            view.blocking_issue(),
            Some(SchemaError::MissingRequiredColumns { .. })
        ));

        session.toggle_sheet("trips");
        let view = session.render();
        assert_eq!(view.issues().len(), 1);
        assert!(view.blocking_issue().is_none());
    }

    #[test]
    fn test_all_columns_first_seen_order() {
        let mut session = Session::default();
        session.load(vec![trips(), visits()]);
        assert_eq!(
            session.all_columns(),
            vec!["timestamp", "lat", "lng", "driver", "shift", "날짜", "시간", "위도", "경도"]
        );
    }

    #[test]
    fn test_group_view() {
        let mut session = Session::default();
        session.load(vec![trips(), visits()]);
        session.toggle_sheet("visits");
        assert!(session.set_group_columns(columns(&["driver", "shift", ""])));
        assert_eq!(session.group_columns(), &["driver", "shift"]);

        let view = match session.render() {
            View::Groups(view) => view,
            other => panic!("expected group view, got {:?}", other),
        };
        // visits has no "shift" column
        assert_eq!(view.issues.len(), 1);
        let keys: Vec<&str> = view.tracks.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["kim|am", "kim|pm", "lee|am"]);
        assert_eq!(view.connectors.len(), 2);
        assert_eq!(view.connectors[0].from, view.tracks[0].records[1].point());
        assert_eq!(view.connectors[0].to, view.tracks[1].records[0].point());
        assert!(view.bounds.is_some());
        assert!(session.selection().is_fully_selected(&view.tree, "kim"));
    }

    #[test]
    fn test_group_toggle_hides_tracks() {
        let mut session = Session::default();
        session.load(vec![trips()]);
        session.set_group_columns(columns(&["driver", "shift"]));
        session.render();

        assert!(!session.toggle_group("kim|pm"));
        let view = session.render();
        assert_eq!(view.record_count(), 3);

        assert!(!session.toggle_group("lee"));
        let view = session.render();
        assert_eq!(view.record_count(), 2);
        match view {
            View::Groups(view) => {
                assert!(view.connectors.is_empty());
                assert!(session.selection().is_partially_selected(&view.tree, "kim"));
            }
            View::Sheets { .. } => panic!("expected group view"),
        }
    }

    #[test]
    fn test_group_selection_reset_only_on_column_change() {
        let mut session = Session::default();
        session.load(vec![trips()]);
        session.set_group_columns(columns(&["driver"]));
        session.render();
        session.toggle_group("lee");
        let before = session.selection().groups().clone();

        assert!(!session.set_group_columns(columns(&["driver"])));
        assert_eq!(session.selection().groups(), &before);

        // toggling sheets keeps group selection
        session.toggle_sheet("trips");
        assert_eq!(session.selection().groups(), &before);

        assert!(session.set_group_columns(columns(&["shift"])));
        assert!(session.selection().groups().is_empty());
    }

    #[test]
    fn test_deselected_everything_shows_nothing() {
        let mut session = Session::default();
        session.load(vec![trips()]);
        session.set_group_columns(columns(&["driver"]));
        session.render();
        session.toggle_group("kim");
        session.toggle_group("lee");
        // all deselected: the empty selection is refilled on the next render
        let view = session.render();
        assert_eq!(view.record_count(), 4);
    }

    #[test]
    fn test_sheet_summaries() {
        let mut session = Session::default();
        session.load(vec![trips(), notes()]);
        let summaries = session.sheet_summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].row_count, 5);
        assert!(summaries[0].distance_km > 0.0);
        assert_eq!(summaries[1].distance_km, 0.0);
    }

    #[test]
    fn test_load_csv() {
        let text = "\
timestamp,lat,lng
2024-01-15 08:00:00,37.5,127.0
timestamp,lat,lng
2024-01-16 08:00:00,35.1,129.0
";
        let mut session = Session::default();
        assert_eq!(session.load_csv(text.as_bytes()).unwrap(), 2);
        assert!(session.selection().is_sheet_selected("Sheet1"));
        assert_eq!(session.render().record_count(), 1);
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_view_to_json() {
        let mut session = Session::default();
        session.load(vec![trips()]);
        let json = session.render().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["mode"], "sheets");
        assert_eq!(value["tracks"][0]["sheet_name"], "trips");
    }
}
