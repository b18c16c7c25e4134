/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Cascading delete planning and execution.
//!
//! A plan lists the target and every descendant, deepest level first,
//! so child resources are gone from the external system before their
//! parents. Execution walks the plan sequentially, tolerating tabs
//! that already disappeared and recording per-item failures without
//! aborting the batch.

use log::{debug, warn};

use crate::api::{TabApi, TabId};
use crate::hierarchy::{HierarchyEngine, HierarchyState};

/// Advisory result of [`validate_delete_safety`]. `can_delete: false`
/// is reserved for a corrupt hierarchy or an unknown target; everything
/// else is a warning the caller may present and override.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSafety {
    pub can_delete: bool,
    pub warnings: Vec<String>,
}

/// Aggregate outcome of [`execute_delete`]. `success` means every
/// planned removal went through (or the tab was already gone).
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOutcome {
    pub success: bool,
    pub deleted: Vec<TabId>,
    pub errors: Vec<String>,
}

/// Ordered deletion set for a tab: the tab and all its descendants,
/// sorted by level descending. Ties keep pre-order discovery, so
/// siblings stay in tree order but never precede their own
/// descendants. Empty when the id is unknown.
pub fn plan_delete(state: &HierarchyState, id: TabId) -> Vec<TabId> {
    let subtree = state.collect_subtree(id);
    let mut indexed: Vec<(TabId, u32)> = subtree
        .into_iter()
        .map(|tid| (tid, state.get(tid).map(|n| n.level).unwrap_or(0)))
        .collect();
    indexed.sort_by(|a, b| b.1.cmp(&a.1));
    indexed.into_iter().map(|(tid, _)| tid).collect()
}

/// Pre-flight check for a cascading delete.
pub fn validate_delete_safety(
    engine: &HierarchyEngine,
    id: TabId,
    max_count: usize,
) -> DeleteSafety {
    let report = engine.validate();
    if !report.is_valid {
        return DeleteSafety {
            can_delete: false,
            warnings: vec![format!(
                "Hierarchy failed integrity validation: {}",
                report.errors.join("; ")
            )],
        };
    }

    let plan = plan_delete(engine.state(), id);
    if plan.is_empty() {
        return DeleteSafety {
            can_delete: false,
            warnings: vec![format!("Tab {id} is not tracked")],
        };
    }

    let mut warnings = Vec::new();
    if engine
        .state()
        .active_tab()
        .is_some_and(|active| plan.contains(&active))
    {
        warnings.push("The currently active tab will be closed".to_string());
    }
    let pinned = plan
        .iter()
        .filter(|tid| engine.state().get(**tid).is_some_and(|n| n.is_pinned))
        .count();
    if pinned > 0 {
        warnings.push(format!("{pinned} pinned tab(s) will be closed"));
    }
    if plan.len() > max_count {
        warnings.push(format!(
            "Closing {} tabs exceeds the limit of {max_count}",
            plan.len()
        ));
    }

    DeleteSafety {
        can_delete: true,
        warnings,
    }
}

/// Execute a cascading delete against the external resource API.
///
/// Each planned id is confirmed to still exist (a tab that is already
/// gone counts as removed, not as an error), removed externally, and
/// dropped from the local store so later lookups in the same batch see
/// consistent state. Failures are recorded and the walk continues.
pub fn execute_delete(
    engine: &mut HierarchyEngine,
    api: &mut dyn TabApi,
    id: TabId,
) -> DeleteOutcome {
    let plan = plan_delete(engine.state(), id);
    if plan.is_empty() {
        return DeleteOutcome {
            success: false,
            deleted: Vec::new(),
            errors: vec![format!("Tab {id} is not tracked")],
        };
    }

    let mut deleted = Vec::new();
    let mut errors = Vec::new();
    for tid in plan {
        match api.get(tid) {
            Ok(None) => {
                debug!("Tab {tid} already gone externally");
                engine.remove_tab(tid);
                deleted.push(tid);
            },
            Ok(Some(_)) => match api.remove(tid) {
                Ok(()) => {
                    engine.remove_tab(tid);
                    deleted.push(tid);
                },
                Err(e) => {
                    warn!("Failed to remove tab {tid}: {e}");
                    errors.push(format!("Failed to remove tab {tid}: {e}"));
                },
            },
            Err(e) => {
                warn!("Failed to query tab {tid}: {e}");
                errors.push(format!("Failed to query tab {tid}: {e}"));
            },
        }
    }

    DeleteOutcome {
        success: errors.is_empty(),
        deleted,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ContainerId, TabDescriptor};
    use crate::config::Config;
    use crate::hierarchy::TabUpdate;
    use crate::testing::FakeTabApi;

    fn desc(id: u64, opener: Option<u64>, order: u32) -> TabDescriptor {
        TabDescriptor {
            id: Some(TabId(id)),
            title: format!("Tab {id}"),
            url: format!("https://example.com/{id}"),
            favicon: None,
            opener_id: opener.map(TabId),
            active: false,
            pinned: false,
            loading: false,
            container: ContainerId(1),
            display_order: order,
        }
    }

    /// Target 10 with children 4 and 5; 4 has child 6.
    fn engine_with_family() -> HierarchyEngine {
        let mut engine = HierarchyEngine::new(&Config::default());
        engine.build_from_tabs(&[
            desc(10, None, 0),
            desc(4, Some(10), 1),
            desc(5, Some(10), 2),
            desc(6, Some(4), 3),
        ]);
        engine
    }

    #[test]
    fn plan_orders_deepest_level_first() {
        let engine = engine_with_family();
        let plan = plan_delete(engine.state(), TabId(10));
        assert_eq!(plan, vec![TabId(6), TabId(4), TabId(5), TabId(10)]);
    }

    #[test]
    fn plan_levels_are_non_increasing() {
        let engine = engine_with_family();
        let plan = plan_delete(engine.state(), TabId(10));
        let levels: Vec<u32> = plan
            .iter()
            .map(|tid| engine.state().get(*tid).unwrap().level)
            .collect();
        assert!(levels.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn plan_for_leaf_is_just_the_leaf() {
        let engine = engine_with_family();
        assert_eq!(plan_delete(engine.state(), TabId(6)), vec![TabId(6)]);
    }

    #[test]
    fn plan_for_unknown_id_is_empty() {
        let engine = engine_with_family();
        assert!(plan_delete(engine.state(), TabId(99)).is_empty());
    }

    #[test]
    fn safety_warns_about_active_and_pinned_tabs() {
        let mut engine = engine_with_family();
        engine.update_tab(
            TabId(6),
            &TabUpdate {
                is_active: Some(true),
                ..TabUpdate::default()
            },
        );
        engine.update_tab(
            TabId(4),
            &TabUpdate {
                is_pinned: Some(true),
                ..TabUpdate::default()
            },
        );

        let safety = validate_delete_safety(&engine, TabId(10), 100);
        assert!(safety.can_delete);
        assert!(safety.warnings.iter().any(|w| w.contains("active")));
        assert!(safety.warnings.iter().any(|w| w.contains("1 pinned")));
    }

    #[test]
    fn safety_warns_when_plan_exceeds_limit() {
        let engine = engine_with_family();
        let safety = validate_delete_safety(&engine, TabId(10), 2);
        assert!(safety.can_delete);
        assert!(safety.warnings.iter().any(|w| w.contains("exceeds")));
    }

    #[test]
    fn safety_refuses_corrupt_hierarchy() {
        let mut engine = engine_with_family();
        {
            let state = engine.state_mut();
            state.nodes.get_mut(&TabId(10)).unwrap().parent_id = Some(TabId(6));
            state.roots.clear();
        }
        let safety = validate_delete_safety(&engine, TabId(10), 100);
        assert!(!safety.can_delete);
        assert!(
            safety
                .warnings
                .iter()
                .any(|w| w.contains("integrity validation"))
        );
    }

    #[test]
    fn safety_refuses_unknown_target() {
        let engine = engine_with_family();
        assert!(!validate_delete_safety(&engine, TabId(99), 100).can_delete);
    }

    #[test]
    fn execute_removes_children_before_parents_externally() {
        let mut engine = engine_with_family();
        let mut api = FakeTabApi::new();
        api.seed(&[
            desc(10, None, 0),
            desc(4, Some(10), 1),
            desc(5, Some(10), 2),
            desc(6, Some(4), 3),
        ]);

        let outcome = execute_delete(&mut engine, &mut api, TabId(10));
        assert!(outcome.success);
        assert_eq!(
            outcome.deleted,
            vec![TabId(6), TabId(4), TabId(5), TabId(10)]
        );
        assert_eq!(api.removed, vec![TabId(6), TabId(4), TabId(5), TabId(10)]);
        assert!(api.is_empty());
        assert!(engine.state().is_empty());
    }

    #[test]
    fn execute_treats_already_gone_tab_as_removed() {
        let mut engine = engine_with_family();
        let mut api = FakeTabApi::new();
        // Tab 5 vanished externally before we ran.
        api.seed(&[desc(10, None, 0), desc(4, Some(10), 1), desc(6, Some(4), 3)]);

        let outcome = execute_delete(&mut engine, &mut api, TabId(10));
        assert!(outcome.success);
        assert!(outcome.deleted.contains(&TabId(5)));
        assert!(outcome.errors.is_empty());
        assert!(engine.state().is_empty());
    }

    #[test]
    fn execute_continues_past_individual_failures() {
        let mut engine = engine_with_family();
        let mut api = FakeTabApi::new();
        api.seed(&[
            desc(10, None, 0),
            desc(4, Some(10), 1),
            desc(5, Some(10), 2),
            desc(6, Some(4), 3),
        ]);
        api.fail_remove(TabId(4));

        let outcome = execute_delete(&mut engine, &mut api, TabId(10));
        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("tab 4"));
        // The rest of the plan still ran.
        assert_eq!(outcome.deleted, vec![TabId(6), TabId(5), TabId(10)]);
        // Removing the parent cascades the stuck child out of the
        // local store, so the forest stays orphan-free.
        assert!(engine.state().is_empty());
        assert!(engine.validate().is_valid);
    }

    #[test]
    fn execute_on_unknown_target_fails_without_calls() {
        let mut engine = engine_with_family();
        let mut api = FakeTabApi::new();
        let outcome = execute_delete(&mut engine, &mut api, TabId(99));
        assert!(!outcome.success);
        assert!(outcome.deleted.is_empty());
        assert!(api.removed.is_empty());
    }
}

/// Top-level `#[cfg(test)]` scope: the `proptest!` macro has
/// edition-2024 compatibility issues when nested inside another test
/// module.
#[cfg(test)]
mod delete_proptests {
    use proptest::prelude::*;

    use super::plan_delete;
    use crate::api::{ContainerId, TabDescriptor, TabId};
    use crate::config::Config;
    use crate::hierarchy::HierarchyEngine;

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
        fn plan_levels_never_increase(
            raw in prop::collection::vec((any::<u64>(), any::<u32>()), 1..24),
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
            let plan = plan_delete(engine.state(), victim);
            prop_assert!(!plan.is_empty());
            prop_assert_eq!(plan[plan.len() - 1], victim);

            let levels: Vec<u32> = plan
                .iter()
                .map(|tid| engine.state().get(*tid).map(|n| n.level).unwrap_or(0))
                .collect();
            prop_assert!(levels.windows(2).all(|pair| pair[0] >= pair[1]));
        }
    }
}
