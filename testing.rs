/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! In-memory resource API for tests and harnesses.

use std::collections::{BTreeMap, HashSet};

use crate::api::{ContainerId, CreateTabProps, TabApi, TabDescriptor, TabId};
use crate::error::Error;

/// Scriptable [`TabApi`] double. Assigns fresh ids on creation,
/// records every call, and can be told to fail specific URLs or
/// removals.
pub struct FakeTabApi {
    tabs: BTreeMap<u64, TabDescriptor>,
    next_id: u64,
    next_order: u32,
    container: Option<ContainerId>,
    fail_create_urls: HashSet<String>,
    fail_remove: HashSet<TabId>,
    /// Every descriptor handed out by `create`, in call order.
    pub created: Vec<TabDescriptor>,
    /// Every id accepted by `remove`, in call order.
    pub removed: Vec<TabId>,
}

impl FakeTabApi {
    pub fn new() -> Self {
        Self {
            tabs: BTreeMap::new(),
            next_id: 1000,
            next_order: 0,
            container: Some(ContainerId(1)),
            fail_create_urls: HashSet::new(),
            fail_remove: HashSet::new(),
            created: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// A fake with no resolvable container, for restoration-failure
    /// paths.
    pub fn without_container() -> Self {
        let mut api = Self::new();
        api.container = None;
        api
    }

    /// Pre-populate the external tab set. Descriptors without ids are
    /// skipped.
    pub fn seed(&mut self, descs: &[TabDescriptor]) {
        for desc in descs {
            let Some(id) = desc.id else { continue };
            self.next_id = self.next_id.max(id.0 + 1);
            self.next_order = self.next_order.max(desc.display_order + 1);
            self.tabs.insert(id.0, desc.clone());
        }
    }

    /// Make every `create` for this URL fail.
    pub fn fail_create_url(&mut self, url: &str) {
        self.fail_create_urls.insert(url.to_string());
    }

    /// Make `remove` of this id fail.
    pub fn fail_remove(&mut self, id: TabId) {
        self.fail_remove.insert(id);
    }

    pub fn contains(&self, id: TabId) -> bool {
        self.tabs.contains_key(&id.0)
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }
}

impl Default for FakeTabApi {
    fn default() -> Self {
        Self::new()
    }
}

impl TabApi for FakeTabApi {
    fn list(&mut self) -> Result<Vec<TabDescriptor>, Error> {
        let mut tabs: Vec<TabDescriptor> = self.tabs.values().cloned().collect();
        tabs.sort_by_key(|d| d.display_order);
        Ok(tabs)
    }

    fn get(&mut self, id: TabId) -> Result<Option<TabDescriptor>, Error> {
        Ok(self.tabs.get(&id.0).cloned())
    }

    fn create(&mut self, props: CreateTabProps) -> Result<TabDescriptor, Error> {
        if self.fail_create_urls.contains(&props.url) {
            return Err(Error::External(format!("create refused for {}", props.url)));
        }
        let id = TabId(self.next_id);
        self.next_id += 1;
        let desc = TabDescriptor {
            id: Some(id),
            title: String::new(),
            url: props.url,
            favicon: None,
            opener_id: props.opener,
            active: props.active,
            pinned: props.pinned,
            loading: false,
            container: props.container,
            display_order: self.next_order,
        };
        self.next_order += 1;
        self.tabs.insert(id.0, desc.clone());
        self.created.push(desc.clone());
        Ok(desc)
    }

    fn remove(&mut self, id: TabId) -> Result<(), Error> {
        if self.fail_remove.contains(&id) {
            return Err(Error::External(format!("remove refused for tab {id}")));
        }
        if self.tabs.remove(&id.0).is_none() {
            return Err(Error::External(format!("no such tab {id}")));
        }
        self.removed.push(id);
        Ok(())
    }

    fn current_container(&mut self) -> Option<ContainerId> {
        self.container
    }
}
