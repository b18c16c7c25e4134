/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Serializable Cabinet records.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::api::TabId;
use crate::hierarchy::HierarchyState;

/// One captured tab. `children` carries the subtree, so a Cabinet is a
/// fully independent deep copy of the forest it was taken from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CabinetTab {
    /// External id at capture time. Stale once the source tabs close;
    /// restoration assigns fresh ids.
    pub id: TabId,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub favicon: Option<String>,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub children: Vec<CabinetTab>,
}

impl CabinetTab {
    /// Deep-copy a live forest into captured form. Guarded against
    /// children lists that loop back into ancestors; a node is copied
    /// at most once.
    pub fn forest_from_state(state: &HierarchyState) -> Vec<CabinetTab> {
        let mut visited = HashSet::new();
        state
            .roots()
            .iter()
            .filter_map(|&root| Self::from_node(state, root, &mut visited))
            .collect()
    }

    fn from_node(
        state: &HierarchyState,
        id: TabId,
        visited: &mut HashSet<TabId>,
    ) -> Option<CabinetTab> {
        if !visited.insert(id) {
            return None;
        }
        let node = state.get(id)?;
        Some(CabinetTab {
            id,
            title: node.title.clone(),
            url: node.url.clone(),
            favicon: node.favicon.clone(),
            is_pinned: node.is_pinned,
            children: node
                .children
                .iter()
                .filter_map(|&child| Self::from_node(state, child, visited))
                .collect(),
        })
    }
}

/// Total node count across a captured forest.
pub fn count_forest(tabs: &[CabinetTab]) -> usize {
    tabs.iter()
        .map(|tab| 1 + count_forest(&tab.children))
        .sum()
}

/// Flatten a captured forest in pre-order.
pub fn flatten(tabs: &[CabinetTab]) -> Vec<&CabinetTab> {
    let mut out = Vec::new();
    let mut stack: Vec<&CabinetTab> = tabs.iter().rev().collect();
    while let Some(tab) = stack.pop() {
        out.push(tab);
        for child in tab.children.iter().rev() {
            stack.push(child);
        }
    }
    out
}

/// Maximum nesting depth of a captured forest; 0 for an empty one.
pub fn forest_depth(tabs: &[CabinetTab]) -> u32 {
    tabs.iter()
        .map(|tab| 1 + forest_depth(&tab.children))
        .max()
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CabinetMetadata {
    /// Node count recorded at capture time; checked against the tree
    /// on validation.
    pub tab_count: usize,
}

/// A named, persisted snapshot of one forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cabinet {
    /// Generated at save time.
    pub id: String,
    /// 1–100 characters, case-insensitively unique among saved
    /// Cabinets.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Epoch milliseconds.
    pub created_at: u64,
    pub updated_at: u64,
    pub tabs: Vec<CabinetTab>,
    pub metadata: CabinetMetadata,
}

/// The single persisted blob: every Cabinet, written whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct CabinetCollection {
    pub cabinets: Vec<Cabinet>,
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
