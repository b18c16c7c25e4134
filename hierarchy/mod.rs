/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tab forest maintenance.
//!
//! Core structures:
//! - `TabNode`: one externally-owned tab with its parent/child links
//! - `HierarchyState`: one forest (id arena + ordered root list)
//! - `HierarchyEngine`: builds and mutates the forest from external
//!   tab events, validates integrity, and notifies subscribers
//!
//! Boundary: the engine is the single write path. Collaborators read
//! through [`HierarchyEngine::state`] and mutate through the named
//! operations only.

pub mod delete;

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use log::warn;

use crate::api::{TabDescriptor, TabId};
use crate::config::Config;

/// One tab in the forest.
#[derive(Debug, Clone, PartialEq)]
pub struct TabNode {
    /// External identity; unique within the forest.
    pub id: TabId,
    pub title: String,
    pub url: String,
    pub favicon: Option<String>,
    /// Owning node. Must agree with membership in that node's
    /// `children`; `None` for roots.
    pub parent_id: Option<TabId>,
    /// Ordered owned children.
    pub children: Vec<TabId>,
    /// Depth from the nearest root, clamped to the configured maximum.
    pub level: u32,
    pub is_active: bool,
    pub is_pinned: bool,
    pub is_loading: bool,
}

/// One forest, scoped to one external container.
#[derive(Debug, Clone, Default)]
pub struct HierarchyState {
    pub(crate) roots: Vec<TabId>,
    pub(crate) nodes: HashMap<TabId, TabNode>,
    pub(crate) active_tab: Option<TabId>,
}

impl HierarchyState {
    /// Ordered root tab ids.
    pub fn roots(&self) -> &[TabId] {
        &self.roots
    }

    pub fn get(&self, id: TabId) -> Option<&TabNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: TabId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Total tracked node count.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Id of the single active tab, when one is tracked.
    pub fn active_tab(&self) -> Option<TabId> {
        self.active_tab
    }

    /// Iterate all nodes in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &TabNode> {
        self.nodes.values()
    }

    /// The node plus all its descendants in pre-order. Guarded
    /// against corrupt children lists that loop back into ancestors.
    pub(crate) fn collect_subtree(&self, id: TabId) -> Vec<TabId> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            out.push(current);
            for &child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }
}

/// Outcome of an integrity check. `errors` is empty iff `is_valid`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Handle returned by [`HierarchyEngine::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type ChangeCallback = Box<dyn FnMut(&HierarchyState)>;

/// Partial field update for [`HierarchyEngine::update_tab`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabUpdate {
    pub title: Option<String>,
    pub url: Option<String>,
    pub favicon: Option<String>,
    pub is_active: Option<bool>,
    pub is_pinned: Option<bool>,
    pub is_loading: Option<bool>,
}

/// Builds and mutates a [`HierarchyState`] from external tab events.
///
/// Mutations are synchronous in-memory edits; only subscriber
/// notification is deferred, through a single debounce deadline that
/// the host pumps from its event loop.
pub struct HierarchyEngine {
    state: HierarchyState,
    max_depth: u32,
    debounce: Duration,
    subscribers: Vec<(SubscriberId, ChangeCallback)>,
    next_subscriber: u64,
    pending_notify: Option<Instant>,
}

impl HierarchyEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            state: HierarchyState::default(),
            max_depth: config.max_depth,
            debounce: Duration::from_millis(config.debounce_ms),
            subscribers: Vec::new(),
            next_subscriber: 0,
            pending_notify: None,
        }
    }

    /// Current forest. Reads only; mutate through the operations.
    pub fn state(&self) -> &HierarchyState {
        &self.state
    }

    /// Full rebuild from a flat external tab list.
    ///
    /// Two passes so the input may arrive unordered and reference
    /// openers declared later in the list. A tab with no opener, or
    /// whose opener is absent, becomes a root. Children and roots are
    /// ordered by the external display order.
    pub fn build_from_tabs(&mut self, resources: &[TabDescriptor]) {
        let mut state = HierarchyState::default();
        let mut ordered: Vec<(TabId, Option<TabId>, u32, bool)> =
            Vec::with_capacity(resources.len());

        for desc in resources {
            let Some(id) = desc.id else {
                warn!("Ignoring tab without an id: {}", desc.url);
                continue;
            };
            if state.nodes.contains_key(&id) {
                warn!("Ignoring duplicate tab id {id}");
                continue;
            }
            state.nodes.insert(id, node_from_descriptor(id, desc));
            ordered.push((id, desc.opener_id, desc.display_order, desc.active));
        }

        ordered.sort_by_key(|&(_, _, order, _)| order);

        for &(id, opener, _, active) in &ordered {
            let parent = opener.filter(|p| *p != id && state.nodes.contains_key(p));
            match parent {
                Some(pid) => {
                    if let Some(node) = state.nodes.get_mut(&pid) {
                        node.children.push(id);
                    }
                    if let Some(node) = state.nodes.get_mut(&id) {
                        node.parent_id = Some(pid);
                    }
                },
                None => state.roots.push(id),
            }
            if active {
                if let Some(prev) = state.active_tab.take() {
                    if let Some(node) = state.nodes.get_mut(&prev) {
                        node.is_active = false;
                    }
                }
                state.active_tab = Some(id);
            }
        }

        assign_levels(&mut state, self.max_depth);
        self.state = state;
        self.schedule_notify();
    }

    /// Insert one tab. An explicit parent overrides the opener hint;
    /// an unknown parent falls back to root placement. A descriptor
    /// without an id is logged and ignored.
    pub fn add_tab(&mut self, desc: &TabDescriptor, explicit_parent: Option<TabId>) {
        let Some(id) = desc.id else {
            warn!("Ignoring tab without an id: {}", desc.url);
            return;
        };
        if self.state.nodes.contains_key(&id) {
            warn!("Tab {id} already tracked; ignoring add");
            return;
        }

        let parent = match explicit_parent {
            Some(p) if p != id && self.state.nodes.contains_key(&p) => Some(p),
            Some(p) => {
                warn!("Explicit parent {p} unknown; adding tab {id} as root");
                None
            },
            None => desc
                .opener_id
                .filter(|p| *p != id && self.state.nodes.contains_key(p)),
        };

        let level = parent
            .and_then(|p| self.state.nodes.get(&p))
            .map(|n| n.level.saturating_add(1).min(self.max_depth))
            .unwrap_or(0);

        let mut node = node_from_descriptor(id, desc);
        node.parent_id = parent;
        node.level = level;
        self.state.nodes.insert(id, node);

        match parent {
            Some(pid) => {
                if let Some(p) = self.state.nodes.get_mut(&pid) {
                    p.children.push(id);
                }
            },
            None => self.state.roots.push(id),
        }

        if desc.active {
            if let Some(prev) = self.state.active_tab.take() {
                if let Some(prev_node) = self.state.nodes.get_mut(&prev) {
                    prev_node.is_active = false;
                }
            }
            self.state.active_tab = Some(id);
        }
        self.schedule_notify();
    }

    /// Remove a tab and all its descendants from the store, returning
    /// the removed ids (empty when the id is unknown). Clears the
    /// active-tab pointer if it was inside the removed subtree.
    pub fn remove_tab(&mut self, id: TabId) -> Vec<TabId> {
        if !self.state.nodes.contains_key(&id) {
            return Vec::new();
        }
        let removed = self.state.collect_subtree(id);

        let parent = self.state.nodes.get(&id).and_then(|n| n.parent_id);
        match parent {
            Some(pid) => {
                if let Some(p) = self.state.nodes.get_mut(&pid) {
                    p.children.retain(|c| *c != id);
                }
            },
            None => self.state.roots.retain(|r| *r != id),
        }

        for tid in &removed {
            self.state.nodes.remove(tid);
        }

        if let Some(active) = self.state.active_tab {
            if removed.contains(&active) {
                self.state.active_tab = None;
            }
        }

        // Dangling root entries can survive a corrupt children list.
        let HierarchyState { roots, nodes, .. } = &mut self.state;
        roots.retain(|r| nodes.contains_key(r));

        self.schedule_notify();
        removed
    }

    /// Merge fields into a tab. Setting `is_active: Some(true)` moves
    /// the active-tab pointer here; callers deactivate the previously
    /// active tab themselves.
    pub fn update_tab(&mut self, id: TabId, update: &TabUpdate) -> bool {
        let mut active_change = None;
        {
            let Some(node) = self.state.nodes.get_mut(&id) else {
                warn!("Update for unknown tab {id}");
                return false;
            };
            if let Some(title) = &update.title {
                node.title = title.clone();
            }
            if let Some(url) = &update.url {
                node.url = url.clone();
            }
            if let Some(favicon) = &update.favicon {
                node.favicon = Some(favicon.clone());
            }
            if let Some(pinned) = update.is_pinned {
                node.is_pinned = pinned;
            }
            if let Some(loading) = update.is_loading {
                node.is_loading = loading;
            }
            if let Some(active) = update.is_active {
                node.is_active = active;
                active_change = Some(active);
            }
        }
        match active_change {
            Some(true) => self.state.active_tab = Some(id),
            Some(false) if self.state.active_tab == Some(id) => {
                self.state.active_tab = None;
            },
            _ => {},
        }
        self.schedule_notify();
        true
    }

    /// Detach a tab from its current parent (or the roots) and
    /// reattach it under `new_parent` (or as a root), recomputing
    /// levels for the whole moved subtree. Refuses moves that would
    /// put a node under its own descendant.
    pub fn move_tab(&mut self, id: TabId, new_parent: Option<TabId>) -> bool {
        if !self.state.nodes.contains_key(&id) {
            warn!("Move for unknown tab {id}");
            return false;
        }
        if new_parent == Some(id) {
            warn!("Tab {id} cannot be its own parent");
            return false;
        }
        if let Some(np) = new_parent {
            if !self.state.nodes.contains_key(&np) {
                warn!("Move target parent {np} unknown");
                return false;
            }
            if self.is_ancestor(id, np) {
                warn!("Refusing move of tab {id}: target {np} is inside its subtree");
                return false;
            }
        }

        let old_parent = self.state.nodes.get(&id).and_then(|n| n.parent_id);
        match old_parent {
            Some(pid) => {
                if let Some(p) = self.state.nodes.get_mut(&pid) {
                    p.children.retain(|c| *c != id);
                }
            },
            None => self.state.roots.retain(|r| *r != id),
        }

        let level = match new_parent {
            Some(pid) => {
                let parent_level = self.state.nodes.get(&pid).map(|n| n.level).unwrap_or(0);
                if let Some(p) = self.state.nodes.get_mut(&pid) {
                    p.children.push(id);
                }
                parent_level.saturating_add(1).min(self.max_depth)
            },
            None => {
                self.state.roots.push(id);
                0
            },
        };

        if let Some(node) = self.state.nodes.get_mut(&id) {
            node.parent_id = new_parent;
            node.level = level;
        }
        self.relevel_subtree(id);
        self.schedule_notify();
        true
    }

    /// Integrity check; never mutates. Callers gate destructive
    /// operations (cascading delete) on the result.
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut ids: Vec<TabId> = self.state.nodes.keys().copied().collect();
        ids.sort();

        // Cycle scan over parent chains; one report is enough to
        // condemn the tree, so stop at the first hit.
        'scan: for &id in &ids {
            let mut visited = HashSet::from([id]);
            let mut current = self.state.nodes.get(&id).and_then(|n| n.parent_id);
            while let Some(pid) = current {
                if pid == id {
                    errors.push(format!("Circular reference: tab {id} is its own ancestor"));
                    break 'scan;
                }
                if !visited.insert(pid) {
                    errors.push(format!("Circular reference detected involving tab {id}"));
                    break 'scan;
                }
                current = self.state.nodes.get(&pid).and_then(|n| n.parent_id);
            }
        }

        let mut reachable = HashSet::new();
        let mut stack: Vec<TabId> = self.state.roots.clone();
        while let Some(id) = stack.pop() {
            if !reachable.insert(id) {
                continue;
            }
            if let Some(node) = self.state.nodes.get(&id) {
                stack.extend(node.children.iter().copied());
            }
        }
        for &id in &ids {
            if !reachable.contains(&id) {
                errors.push(format!("Tab {id} is not reachable from any root"));
            }
        }

        for &id in &ids {
            let Some(node) = self.state.nodes.get(&id) else {
                continue;
            };
            if let Some(pid) = node.parent_id {
                match self.state.nodes.get(&pid) {
                    None => errors.push(format!("Tab {id} references missing parent {pid}")),
                    Some(parent) if !parent.children.contains(&id) => {
                        errors.push(format!(
                            "Tab {id} is not listed as a child of its parent {pid}"
                        ));
                    },
                    _ => {},
                }
            }
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// Register a change subscriber. Delivery is debounced: each
    /// mutation resets one pending deadline, and [`Self::pump`] fires
    /// it once the deadline passes.
    pub fn on_change(&mut self, callback: impl FnMut(&HierarchyState) + 'static) -> SubscriberId {
        self.next_subscriber += 1;
        let id = SubscriberId(self.next_subscriber);
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Unregister a subscriber; returns whether it was registered.
    pub fn off_change(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Deliver the pending notification if its deadline has passed.
    /// Hosts call this from their event loop tick.
    pub fn pump(&mut self, now: Instant) -> bool {
        match self.pending_notify {
            Some(deadline) if deadline <= now => {
                self.pending_notify = None;
                self.deliver();
                true
            },
            _ => false,
        }
    }

    /// Deliver a pending notification immediately, ignoring the
    /// debounce deadline. Returns whether anything was pending.
    pub fn flush_changes(&mut self) -> bool {
        if self.pending_notify.take().is_some() {
            self.deliver();
            true
        } else {
            false
        }
    }

    /// True when a mutation is awaiting notification delivery.
    pub fn has_pending_notification(&self) -> bool {
        self.pending_notify.is_some()
    }

    fn schedule_notify(&mut self) {
        self.pending_notify = Some(Instant::now() + self.debounce);
    }

    fn deliver(&mut self) {
        let state = &self.state;
        for (_, callback) in self.subscribers.iter_mut() {
            callback(state);
        }
    }

    fn is_ancestor(&self, ancestor: TabId, start: TabId) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(start);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            if !visited.insert(id) {
                return false;
            }
            current = self.state.nodes.get(&id).and_then(|n| n.parent_id);
        }
        false
    }

    fn relevel_subtree(&mut self, id: TabId) {
        let start_level = self.state.nodes.get(&id).map(|n| n.level).unwrap_or(0);
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([(id, start_level)]);
        while let Some((current, level)) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            let children = match self.state.nodes.get_mut(&current) {
                Some(node) => {
                    node.level = level.min(self.max_depth);
                    node.children.clone()
                },
                None => continue,
            };
            for child in children {
                queue.push_back((child, level.saturating_add(1)));
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut HierarchyState {
        &mut self.state
    }
}

fn node_from_descriptor(id: TabId, desc: &TabDescriptor) -> TabNode {
    TabNode {
        id,
        title: desc.title.clone(),
        url: desc.url.clone(),
        favicon: desc.favicon.clone(),
        parent_id: None,
        children: Vec::new(),
        level: 0,
        is_active: desc.active,
        is_pinned: desc.pinned,
        is_loading: desc.loading,
    }
}

fn assign_levels(state: &mut HierarchyState, max_depth: u32) {
    let mut visited = HashSet::new();
    let mut queue: VecDeque<(TabId, u32)> = state.roots.iter().map(|&r| (r, 0)).collect();
    while let Some((id, level)) = queue.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let children = match state.nodes.get_mut(&id) {
            Some(node) => {
                node.level = level.min(max_depth);
                node.children.clone()
            },
            None => continue,
        };
        for child in children {
            queue.push_back((child, level.saturating_add(1)));
        }
    }
}


/// Top-level `#[cfg(test)]` scope: the `proptest!` macro has
/// edition-2024 compatibility issues when nested inside another test
/// module.
#[cfg(test)]
mod hierarchy_proptests {
    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::{HierarchyEngine, TabId};
    use crate::api::{ContainerId, TabDescriptor};
    use crate::config::Config;

    fn descriptor(id: TabId, opener: Option<TabId>, order: u32) -> TabDescriptor {
        TabDescriptor {
            id: Some(id),
            title: String::new(),
            url: format!("https://example.com/{id}"),
            favicon: None,
            opener_id: opener,
            active: false,
            pinned: false,
            loading: false,
            container: ContainerId(1),
            display_order: order,
        }
    }

    proptest! {
        #[test]
        fn build_preserves_input_id_set(raw in prop::collection::vec((any::<u64>(), any::<u32>()), 1..24)) {
            let mut descs = Vec::new();
            for (i, (opener_raw, order)) in raw.iter().enumerate() {
                let id = (i + 1) as u64;
                // Openers only reference earlier ids, so every input is
                // a well-formed forest.
                let pick = opener_raw % (i as u64 + 2);
                let opener = if pick == 0 { None } else { Some(TabId(pick)) };
                descs.push(descriptor(TabId(id), opener, *order));
            }

            let mut engine = HierarchyEngine::new(&Config::default());
            engine.build_from_tabs(&descs);

            let built: BTreeSet<u64> = engine.state().iter().map(|n| n.id.0).collect();
            let input: BTreeSet<u64> = (1..=raw.len() as u64).collect();
            prop_assert_eq!(built, input);
            prop_assert!(engine.validate().is_valid);
        }

        #[test]
        fn remove_never_leaves_unreachable_ids(
            raw in prop::collection::vec((any::<u64>(), any::<u32>()), 2..20),
            target in any::<u64>(),
        ) {
            let mut descs = Vec::new();
            for (i, (opener_raw, order)) in raw.iter().enumerate() {
                let id = (i + 1) as u64;
                let pick = opener_raw % (i as u64 + 2);
                let opener = if pick == 0 { None } else { Some(TabId(pick)) };
                descs.push(descriptor(TabId(id), opener, *order));
            }

            let mut engine = HierarchyEngine::new(&Config::default());
            engine.build_from_tabs(&descs);
            let victim = TabId(target % raw.len() as u64 + 1);
            engine.remove_tab(victim);

            let report = engine.validate();
            prop_assert!(report.is_valid, "errors: {:?}", report.errors);
        }
    }
}
