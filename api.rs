/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Boundary contracts to the external resource system.
//!
//! The engine never talks to a browser directly; hosts implement
//! [`TabApi`] over whatever chrome they embed in. Calls are issued
//! sequentially — correctness of deletion and restoration depends on
//! observing each result before the next call.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identifier assigned to a tab by the external resource system.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TabId(pub u64);

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the external grouping scope (a window) one forest
/// lives in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ContainerId(pub u64);

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Flat tab record as reported by the external system.
///
/// `id` is optional: events for half-created resources arrive without
/// one and are ignored by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabDescriptor {
    pub id: Option<TabId>,
    pub title: String,
    pub url: String,
    pub favicon: Option<String>,
    /// External hint for which tab caused this one's creation.
    pub opener_id: Option<TabId>,
    pub active: bool,
    pub pinned: bool,
    pub loading: bool,
    pub container: ContainerId,
    /// Original display position within the container.
    pub display_order: u32,
}

/// Creation request issued during restoration.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTabProps {
    pub url: String,
    pub container: ContainerId,
    /// Restoration never steals focus; always `false` there.
    pub active: bool,
    pub pinned: bool,
    pub opener: Option<TabId>,
}

/// External resource API consumed by the delete executor and the
/// restoration executor. Implementations live in the host.
pub trait TabApi {
    /// All tabs currently known to the external system.
    fn list(&mut self) -> Result<Vec<TabDescriptor>, Error>;

    /// Look up one tab; `Ok(None)` when it no longer exists.
    fn get(&mut self, id: TabId) -> Result<Option<TabDescriptor>, Error>;

    /// Create a tab, returning the descriptor with its assigned id.
    fn create(&mut self, props: CreateTabProps) -> Result<TabDescriptor, Error>;

    /// Remove a tab that is believed to exist.
    fn remove(&mut self, id: TabId) -> Result<(), Error>;

    /// The container restoration targets, when one can be resolved.
    fn current_container(&mut self) -> Option<ContainerId>;
}
