/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Cabinet restoration.
//!
//! Planning turns a Cabinet into an ordered creation work list where
//! every item's `order` exceeds its parent's, so the executor can
//! resolve opener references through an order → new-id map filled in
//! as tabs are created. Execution walks the list sequentially,
//! records per-item failures, and never aborts the batch; only a
//! failure to resolve the target container is fatal.

use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};
use url::Url;

use crate::api::{CreateTabProps, TabApi, TabDescriptor, TabId};
use crate::cabinet::CabinetRepository;
use crate::cabinet::types::{Cabinet, CabinetTab, count_forest, flatten, forest_depth};
use crate::config::Config;
use crate::error::Error;
use crate::storage::BlobStore;

/// Keeps the container alive while `close_existing` empties it.
const PLACEHOLDER_URL: &str = "about:blank";

const MULTI_DOMAIN_FACTOR: usize = 3;
const DEEP_NESTING_LEVELS: u32 = 3;

/// One creation step. `parent_order` names the `order` of an earlier
/// item whose newly assigned id becomes this tab's opener.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanItem {
    pub order: usize,
    pub parent_order: Option<usize>,
    /// Id the tab had at capture time; informational only.
    pub source_id: TabId,
    pub url: String,
    pub title: String,
    pub pinned: bool,
    /// Policy-excluded; the executor records it as failed without
    /// issuing a creation call.
    pub restricted: bool,
}

/// Ordered creation work list plus advisory warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct RestorationPlan {
    pub items: Vec<PlanItem>,
    pub warnings: Vec<String>,
    pub excluded_count: usize,
    pub estimated_ms: u64,
}

impl RestorationPlan {
    pub fn restorable_count(&self) -> usize {
        self.items.iter().filter(|i| !i.restricted).count()
    }
}

/// Advisory pre-restore check against the currently open tabs.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyReport {
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Pre-flight readiness verdict for one Cabinet.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreAnalysis {
    pub can_restore: bool,
    pub blockers: Vec<String>,
    pub factors: Vec<String>,
    pub estimated_ms: u64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestoreSummary {
    pub total_tabs: usize,
    pub successful_tabs: usize,
    pub failed_tabs: usize,
}

/// Aggregate outcome of one restoration run. `success` means at least
/// one tab was created.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreOutcome {
    pub success: bool,
    pub restored_ids: Vec<TabId>,
    pub failed_urls: Vec<String>,
    /// How many of the failures were policy exclusions rather than
    /// creation errors.
    pub restricted_count: usize,
    pub errors: Vec<String>,
    pub summary: RestoreSummary,
}

/// Why a URL is excluded from recreation, or `None` if it is fair
/// game. Internal and administrative schemes are never recreated.
fn restriction_reason(url: &str, config: &Config) -> Option<String> {
    match Url::parse(url) {
        Ok(parsed) if config.is_restricted_scheme(parsed.scheme()) => {
            Some(format!("restricted scheme '{}'", parsed.scheme()))
        },
        Ok(_) => None,
        Err(_) => Some("not a parseable URL".to_string()),
    }
}

/// Build the ordered creation plan for a Cabinet.
///
/// Root items come first, in original sibling order; descendants
/// follow depth-first, each recorded after its parent.
pub fn create_restoration_plan(cabinet: &Cabinet, config: &Config) -> RestorationPlan {
    let mut items = Vec::with_capacity(count_forest(&cabinet.tabs));

    for root in &cabinet.tabs {
        let order = items.len();
        items.push(plan_item(order, None, root, config));
    }
    // Root orders stay valid below: descendants only append.
    for (order, root) in cabinet.tabs.iter().enumerate() {
        push_descendants(&mut items, root, order, config);
    }

    let excluded: Vec<&PlanItem> = items.iter().filter(|i| i.restricted).collect();
    let excluded_count = excluded.len();
    let mut warnings: Vec<String> = excluded
        .iter()
        .map(|item| format!("Skipping restricted URL: {}", item.url))
        .collect();
    if excluded_count > 0 {
        warnings.push(format!(
            "{excluded_count} tab(s) will not be restored due to policy"
        ));
    }

    let widest_sibling_group = widest_group(&cabinet.tabs);
    if widest_sibling_group > config.large_restore_sibling_count {
        warnings.push(format!(
            "Large restoration: {widest_sibling_group} sibling tabs at one level"
        ));
    }

    let restorable = items.iter().filter(|i| !i.restricted).count();
    let estimated_ms = config.per_tab_restore_ms * restorable as u64;
    warnings.push(format!("Estimated restoration time: {estimated_ms} ms"));

    RestorationPlan {
        items,
        warnings,
        excluded_count,
        estimated_ms,
    }
}

fn plan_item(
    order: usize,
    parent_order: Option<usize>,
    tab: &CabinetTab,
    config: &Config,
) -> PlanItem {
    PlanItem {
        order,
        parent_order,
        source_id: tab.id,
        url: tab.url.clone(),
        title: tab.title.clone(),
        pinned: tab.is_pinned,
        restricted: restriction_reason(&tab.url, config).is_some(),
    }
}

fn push_descendants(
    items: &mut Vec<PlanItem>,
    parent: &CabinetTab,
    parent_order: usize,
    config: &Config,
) {
    for child in &parent.children {
        let order = items.len();
        items.push(plan_item(order, Some(parent_order), child, config));
        push_descendants(items, child, order, config);
    }
}

fn widest_group(tabs: &[CabinetTab]) -> usize {
    let mut widest = tabs.len();
    for tab in tabs {
        widest = widest.max(widest_group(&tab.children));
    }
    widest
}

/// Chunk the ordered plan into fixed-size batches. Orders only grow
/// within the plan, so a parent always lands in the same batch as its
/// child or an earlier one.
pub fn create_batch_restoration_plan(
    cabinet: &Cabinet,
    batch_size: usize,
    config: &Config,
) -> Vec<Vec<PlanItem>> {
    let plan = create_restoration_plan(cabinet, config);
    let size = batch_size.max(1);
    plan.items.chunks(size).map(|chunk| chunk.to_vec()).collect()
}

/// Advisory safety check against the currently open tab set. Never
/// blocks; callers present the warnings and proceed at will.
pub fn validate_restoration_safety(
    cabinet: &Cabinet,
    current: &[TabDescriptor],
    config: &Config,
) -> SafetyReport {
    let mut warnings = Vec::new();
    let mut recommendations = Vec::new();

    let incoming = count_forest(&cabinet.tabs);
    let existing = current.len();
    if existing + incoming > config.excessive_tab_count {
        warnings.push(format!(
            "Restoration would bring the open tab count to {} (threshold {})",
            existing + incoming,
            config.excessive_tab_count
        ));
        recommendations.push("Close unused tabs before restoring".to_string());
    }

    let open_urls: BTreeSet<&str> = current.iter().map(|d| d.url.as_str()).collect();
    let duplicates: BTreeSet<&str> = flatten(&cabinet.tabs)
        .iter()
        .map(|t| t.url.as_str())
        .filter(|u| open_urls.contains(u))
        .collect();
    if !duplicates.is_empty() {
        warnings.push(format!(
            "{} URL(s) are already open: {}",
            duplicates.len(),
            duplicates.iter().copied().collect::<Vec<_>>().join(", ")
        ));
    }

    if incoming > config.performance_warn_tab_count {
        warnings.push(format!(
            "Restoring {incoming} tabs at once may degrade responsiveness"
        ));
        recommendations.push("Consider restoring in batches".to_string());
    }

    SafetyReport {
        warnings,
        recommendations,
    }
}

/// Pre-flight readiness check. An empty Cabinet or one whose every
/// tab is policy-excluded cannot be restored; everything else folds
/// into the estimate and advisory notes.
pub fn analyze_cabinet_for_restoration(cabinet: &Cabinet, config: &Config) -> RestoreAnalysis {
    let mut blockers = Vec::new();
    let mut factors = Vec::new();
    let mut recommendations = Vec::new();

    let all_tabs = flatten(&cabinet.tabs);
    let total = all_tabs.len();
    let restorable = all_tabs
        .iter()
        .filter(|t| restriction_reason(&t.url, config).is_none())
        .count();

    if total == 0 {
        blockers.push("Cabinet contains no tabs".to_string());
    } else if restorable == 0 {
        blockers.push("Every tab is excluded by the restricted-URL policy".to_string());
    }

    if total > config.performance_warn_tab_count {
        factors.push(format!("{total} tabs"));
        recommendations.push("Restore in batches to keep the browser responsive".to_string());
    }

    let domains: BTreeSet<String> = all_tabs
        .iter()
        .filter_map(|t| {
            Url::parse(&t.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
        })
        .collect();
    if domains.len() > MULTI_DOMAIN_FACTOR {
        factors.push(format!("{} distinct domains", domains.len()));
    }

    let depth = forest_depth(&cabinet.tabs);
    if depth > DEEP_NESTING_LEVELS {
        factors.push(format!("nesting {depth} levels deep"));
        recommendations.push("Deeply nested groups restore more slowly".to_string());
    }

    RestoreAnalysis {
        can_restore: blockers.is_empty(),
        blockers,
        factors,
        estimated_ms: config.per_tab_restore_ms * restorable as u64,
        recommendations,
    }
}

/// Recreate a stored Cabinet in the current container.
///
/// Fails fast with [`Error::NotFound`] for an unknown Cabinet and
/// [`Error::ContainerResolution`] when no container can be resolved —
/// in both cases before any external call. Per-item creation failures
/// and policy exclusions are recorded in the outcome and never abort
/// the walk. Created tabs are never active; focus stays where it was.
pub fn restore_cabinet<S: BlobStore>(
    repo: &CabinetRepository<S>,
    api: &mut dyn TabApi,
    cabinet_id: &str,
    close_existing: bool,
) -> Result<RestoreOutcome, Error> {
    let cabinet = repo.get(cabinet_id)?;
    let config = repo.config();
    let plan = create_restoration_plan(&cabinet, config);

    let container = api
        .current_container()
        .ok_or_else(|| Error::ContainerResolution("no active window".to_string()))?;

    let mut errors = Vec::new();
    let mut placeholder = None;

    if close_existing {
        // The placeholder must exist before the last tab closes, or
        // the external system may tear the container down under us.
        match api.create(CreateTabProps {
            url: PLACEHOLDER_URL.to_string(),
            container,
            active: false,
            pinned: false,
            opener: None,
        }) {
            Ok(desc) => placeholder = desc.id,
            Err(e) => {
                warn!("Placeholder creation failed; keeping existing tabs: {e}");
                errors.push(format!("Failed to create placeholder tab: {e}"));
            },
        }

        if placeholder.is_some() {
            match api.list() {
                Ok(current) => {
                    for desc in current {
                        let Some(id) = desc.id else { continue };
                        if desc.container != container || desc.pinned || Some(id) == placeholder {
                            continue;
                        }
                        if let Err(e) = api.remove(id) {
                            errors.push(format!("Failed to close tab {id}: {e}"));
                        }
                    }
                },
                Err(e) => errors.push(format!("Failed to list existing tabs: {e}")),
            }
        }
    }

    let mut order_to_new: HashMap<usize, TabId> = HashMap::new();
    let mut restored_ids = Vec::new();
    let mut failed_urls = Vec::new();
    let mut restricted_count = 0;

    for item in &plan.items {
        if item.restricted {
            restricted_count += 1;
            failed_urls.push(item.url.clone());
            errors.push(format!("Restricted URL not restored: {}", item.url));
            continue;
        }

        let opener = item
            .parent_order
            .and_then(|po| order_to_new.get(&po).copied());
        match api.create(CreateTabProps {
            url: item.url.clone(),
            container,
            active: false,
            pinned: item.pinned,
            opener,
        }) {
            Ok(desc) => match desc.id {
                Some(new_id) => {
                    debug!("Restored {} as tab {new_id}", item.url);
                    order_to_new.insert(item.order, new_id);
                    restored_ids.push(new_id);
                },
                None => {
                    failed_urls.push(item.url.clone());
                    errors.push(format!("Created tab for {} carries no id", item.url));
                },
            },
            Err(e) => {
                warn!("Failed to create tab {}: {e}", item.url);
                failed_urls.push(item.url.clone());
                errors.push(format!("Failed to create tab {}: {e}", item.url));
            },
        }
    }

    if close_existing && !restored_ids.is_empty() {
        if let Some(pid) = placeholder {
            if let Err(e) = api.remove(pid) {
                errors.push(format!("Failed to remove placeholder tab: {e}"));
            }
        }
    }

    let total = plan.items.len();
    let successful = restored_ids.len();
    Ok(RestoreOutcome {
        success: successful > 0,
        restored_ids,
        failed_urls,
        restricted_count,
        errors,
        summary: RestoreSummary {
            total_tabs: total,
            successful_tabs: successful,
            failed_tabs: total - successful,
        },
    })
}
