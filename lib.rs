/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Tab hierarchy engine with Cabinet snapshots and restoration.
//!
//! Architecture:
//! - `hierarchy`: forest of externally-owned tabs — build from flat
//!   lists, mutate on external events, validate integrity, notify
//!   subscribers (debounced)
//! - `hierarchy::delete`: cascading delete plans, deepest level first,
//!   executed sequentially against the resource API
//! - `cabinet`: named snapshot ("Cabinet") records and their
//!   repository over an opaque blob store
//! - `restore`: ordered creation plans and the executor that replays
//!   them, remapping captured ids to newly assigned ones
//! - `storage`: the blob store trait plus in-memory and redb backends
//! - `api`: boundary traits to the external resource system
//!
//! Everything is single-threaded and cooperative: engine mutations are
//! synchronous, external calls are sequenced, and only change
//! notification is deferred. Construct an engine and a repository and
//! pass them by reference; there is no global state.

pub mod api;
pub mod cabinet;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod restore;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use api::{ContainerId, CreateTabProps, TabApi, TabDescriptor, TabId};
pub use cabinet::types::{Cabinet, CabinetMetadata, CabinetTab};
pub use cabinet::{CabinetRepository, CabinetUpdate, CabinetValidation, StorageInfo};
pub use config::Config;
pub use error::Error;
pub use hierarchy::delete::{
    DeleteOutcome, DeleteSafety, execute_delete, plan_delete, validate_delete_safety,
};
pub use hierarchy::{
    HierarchyEngine, HierarchyState, SubscriberId, TabNode, TabUpdate, ValidationReport,
};
pub use restore::{
    PlanItem, RestorationPlan, RestoreAnalysis, RestoreOutcome, RestoreSummary, SafetyReport,
    analyze_cabinet_for_restoration, create_batch_restoration_plan, create_restoration_plan,
    restore_cabinet, validate_restoration_safety,
};
pub use storage::{BlobStore, MemoryBlobStore, RedbBlobStore, StoreError};
