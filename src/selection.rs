//! # Selection State
//!
//! Which sheets and which groups are visible, with cascading parent/child
//! semantics over a [`GroupTree`].
//!
//! Group selection is a set of full keys. It keeps these rules at every level:
//! - a branch is selected when all of its direct children are selected;
//! - when none of them are, the branch is deselected and collapsed;
//! - when only some are, the branch key is absent and the children are left
//!   alone.
//!
//! The tri-state [`SelectionLevel`] shown for a node is derived from its
//! descendant leaves on demand and never stored.
//!
//! ## Example
//!
//! ```rust
//! use location_grouper::{SelectionLevel, SelectionState};
//! # use location_grouper::{build_hierarchy, load_sheet, CellValue, PipelineConfig, RawSheet};
//! # let sheet = RawSheet::new("s", vec![
//! #     vec!["timestamp".into(), "lat".into(), "lng".into()],
//! #     vec!["2024-01-15 08:00:00".into(), CellValue::Number(37.5), CellValue::Number(127.0)],
//! #     vec!["2024-01-15 09:00:00".into(), CellValue::Number(37.6), CellValue::Number(127.1)],
//! # ]);
//! # let mut records = load_sheet(&sheet, &PipelineConfig::default()).unwrap();
//! # records[0].group = Some("kim|am".to_string());
//! # records[1].group = Some("kim|pm".to_string());
//! # let tree = build_hierarchy(&records);
//!
//! let mut selection = SelectionState::default();
//! selection.select_all_if_empty(&tree);
//! assert_eq!(selection.selection_level(&tree, "kim"), SelectionLevel::All);
//!
//! selection.toggle_group(&tree, "kim|pm");
//! assert!(selection.is_partially_selected(&tree, "kim"));
//! assert!(!selection.is_group_selected("kim"));
//! ```

use std::collections::BTreeSet;

use log::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::grouping::{parent_key, GroupTree};
use crate::LocationRecord;

/// Derived check state of one tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SelectionLevel {
    /// Every leaf below is selected
    All,
    /// Some but not all leaves below are selected
    Some,
    None,
}

/// Visible sheets, selected group keys and collapsed branches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SelectionState {
    sheets: BTreeSet<String>,
    groups: BTreeSet<String>,
    collapsed: BTreeSet<String>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Sheets
    // ------------------------------------------------------------------------

    pub fn sheets(&self) -> &BTreeSet<String> {
        &self.sheets
    }

    pub fn is_sheet_selected(&self, name: &str) -> bool {
        self.sheets.contains(name)
    }

    /// Flip one sheet. Returns whether it is now selected.
    pub fn toggle_sheet(&mut self, name: &str) -> bool {
        let checked = !self.sheets.contains(name);
        self.select_sheet(name, checked);
        checked
    }

    pub fn select_sheet(&mut self, name: &str, checked: bool) {
        if checked {
            self.sheets.insert(name.to_string());
        } else {
            self.sheets.remove(name);
        }
        debug!("[Selection] Sheet '{}' selected: {}", name, checked);
    }

    // ------------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------------

    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    /// Whether `key` itself is in the selected set.
    pub fn is_group_selected(&self, key: &str) -> bool {
        self.groups.contains(key)
    }

    /// Flip one node, cascading to its descendants and up to its ancestors.
    /// Returns whether the node is now selected.
    pub fn toggle_group(&mut self, tree: &GroupTree, key: &str) -> bool {
        let checked = !self.groups.contains(key);
        self.set_group(tree, key, checked);
        checked
    }

    /// Set one node, cascading to its descendants and up to its ancestors.
    pub fn set_group(&mut self, tree: &GroupTree, key: &str, checked: bool) {
        self.mark(key, checked);
        self.cascade_to_children(tree, key, checked);
        self.recompute_parent(tree, key);
    }

    /// Give every descendant of `key` the same state, one level at a time.
    pub fn cascade_to_children(&mut self, tree: &GroupTree, key: &str, checked: bool) {
        for child in tree.child_keys(Some(key)) {
            self.mark(&child, checked);
            self.cascade_to_children(tree, &child, checked);
        }
    }

    /// Re-derive the state of each ancestor of `key` from its direct children.
    pub fn recompute_parent(&mut self, tree: &GroupTree, key: &str) {
        let mut current = parent_key(key);
        while let Some(parent) = current {
            let children = tree.child_keys(Some(parent));
            if children.is_empty() {
                break;
            }
            let selected = children
                .iter()
                .filter(|child| self.groups.contains(child.as_str()))
                .count();

            if selected == children.len() {
                self.groups.insert(parent.to_string());
            } else {
                self.groups.remove(parent);
                if selected == 0 {
                    self.collapsed.insert(parent.to_string());
                }
            }
            current = parent_key(parent);
        }
    }

    /// Drop every group selection and collapse state.
    pub fn clear_groups(&mut self) {
        self.groups.clear();
        self.collapsed.clear();
    }

    /// Select every key of the tree when nothing is selected yet.
    ///
    /// Returns true when the selection was filled.
    pub fn select_all_if_empty(&mut self, tree: &GroupTree) -> bool {
        if !self.groups.is_empty() {
            return false;
        }
        let keys = tree.full_keys();
        if keys.is_empty() {
            return false;
        }
        debug!("[Selection] Selecting all {} group keys", keys.len());
        self.groups.extend(keys);
        true
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Check state of a node, derived from the leaves below it.
    pub fn selection_level(&self, tree: &GroupTree, key: &str) -> SelectionLevel {
        let leaves = tree.leaf_keys_under(key);
        let selected = leaves
            .iter()
            .filter(|leaf| self.groups.contains(leaf.as_str()))
            .count();

        if leaves.is_empty() || selected == 0 {
            SelectionLevel::None
        } else if selected == leaves.len() {
            SelectionLevel::All
        } else {
            SelectionLevel::Some
        }
    }

    pub fn is_fully_selected(&self, tree: &GroupTree, key: &str) -> bool {
        self.selection_level(tree, key) == SelectionLevel::All
    }

    pub fn is_partially_selected(&self, tree: &GroupTree, key: &str) -> bool {
        self.selection_level(tree, key) == SelectionLevel::Some
    }

    pub fn is_collapsed(&self, key: &str) -> bool {
        self.collapsed.contains(key)
    }

    /// Record the user opening or closing a branch.
    pub fn set_expanded(&mut self, key: &str, expanded: bool) {
        if expanded {
            self.collapsed.remove(key);
        } else {
            self.collapsed.insert(key.to_string());
        }
    }

    /// Whether a record belongs to the visible subset: its sheet is selected and,
    /// when it carries a group key, that key is selected.
    pub fn is_visible(&self, record: &LocationRecord) -> bool {
        self.sheets.contains(&record.sheet_name)
            && record
                .group
                .as_ref()
                .map_or(true, |group| self.groups.contains(group))
    }

    fn mark(&mut self, key: &str, checked: bool) {
        if checked {
            self.groups.insert(key.to_string());
        } else {
            self.groups.remove(key);
        }
    }
}
