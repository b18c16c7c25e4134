/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Cabinet persistence.
//!
//! The repository owns the blob store and funnels every reader and
//! writer through whole-collection get-all/set-all operations, so the
//! store only ever sees complete, consistent payloads. A failed write
//! leaves the previously stored collection untouched.

pub mod types;

use log::warn;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Error;
use crate::hierarchy::HierarchyState;
use crate::storage::BlobStore;
use types::{Cabinet, CabinetCollection, CabinetMetadata, CabinetTab, count_forest, flatten, now_ms};

const COLLECTION_KEY: &str = "cabinets";

/// Structural check result for one Cabinet.
#[derive(Debug, Clone, PartialEq)]
pub struct CabinetValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Quota accounting snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageInfo {
    pub bytes_used: u64,
    pub bytes_available: u64,
    pub quota_bytes: u64,
    pub near_limit: bool,
    pub cabinet_count: usize,
}

/// Partial field update for [`CabinetRepository::update`]. Replacing
/// `tabs` recomputes the recorded tab count.
#[derive(Debug, Clone, Default)]
pub struct CabinetUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub tabs: Option<Vec<CabinetTab>>,
}

/// CRUD, search, and quota accounting for saved Cabinets.
pub struct CabinetRepository<S: BlobStore> {
    store: S,
    config: Config,
}

impl<S: BlobStore> CabinetRepository<S> {
    pub fn new(store: S, config: Config) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Capture the live forest under a new name.
    ///
    /// Fails fast — before touching the store write path — on an
    /// invalid or duplicate name, an empty hierarchy, or a full
    /// Cabinet list. Store-level quota exhaustion surfaces as
    /// [`Error::QuotaExceeded`] with the prior collection retained.
    pub fn save(&mut self, name: &str, hierarchy: &HierarchyState) -> Result<Cabinet, Error> {
        let mut collection = self.load()?;
        let name = self.validate_name(name, &collection, None)?;
        if hierarchy.is_empty() {
            return Err(Error::Validation(
                "Cannot save an empty hierarchy".to_string(),
            ));
        }
        if collection.cabinets.len() >= self.config.max_cabinets {
            return Err(Error::Validation(format!(
                "Cabinet limit of {} reached",
                self.config.max_cabinets
            )));
        }

        let tabs = CabinetTab::forest_from_state(hierarchy);
        let tab_count = count_forest(&tabs);
        if tab_count != hierarchy.len() {
            warn!(
                "Captured {tab_count} tabs from a hierarchy tracking {}",
                hierarchy.len()
            );
        }

        let now = now_ms();
        let cabinet = Cabinet {
            id: Uuid::new_v4().to_string(),
            name,
            description: None,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            tabs,
            metadata: CabinetMetadata { tab_count },
        };
        collection.cabinets.push(cabinet.clone());
        self.persist(&collection)?;
        Ok(cabinet)
    }

    pub fn get(&self, id: &str) -> Result<Cabinet, Error> {
        self.load()?
            .cabinets
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::NotFound(format!("Cabinet {id} does not exist")))
    }

    /// All Cabinets, newest first.
    pub fn list(&self) -> Result<Vec<Cabinet>, Error> {
        let mut cabinets = self.load()?.cabinets;
        cabinets.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(cabinets)
    }

    /// Merge fields into a Cabinet. A name change obeys the same
    /// uniqueness rule as [`Self::save`].
    pub fn update(&mut self, id: &str, fields: &CabinetUpdate) -> Result<Cabinet, Error> {
        let mut collection = self.load()?;
        let validated_name = match &fields.name {
            Some(name) => Some(self.validate_name(name, &collection, Some(id))?),
            None => None,
        };

        let Some(cabinet) = collection.cabinets.iter_mut().find(|c| c.id == id) else {
            return Err(Error::NotFound(format!("Cabinet {id} does not exist")));
        };
        if let Some(name) = validated_name {
            cabinet.name = name;
        }
        if let Some(description) = &fields.description {
            cabinet.description = Some(description.clone());
        }
        if let Some(tags) = &fields.tags {
            cabinet.tags = tags.clone();
        }
        if let Some(tabs) = &fields.tabs {
            cabinet.tabs = tabs.clone();
            cabinet.metadata.tab_count = count_forest(tabs);
        }
        cabinet.updated_at = now_ms();

        let updated = cabinet.clone();
        self.persist(&collection)?;
        Ok(updated)
    }

    /// Re-capture a live forest under an existing Cabinet id.
    pub fn recapture(&mut self, id: &str, hierarchy: &HierarchyState) -> Result<Cabinet, Error> {
        if hierarchy.is_empty() {
            return Err(Error::Validation(
                "Cannot save an empty hierarchy".to_string(),
            ));
        }
        self.update(
            id,
            &CabinetUpdate {
                tabs: Some(CabinetTab::forest_from_state(hierarchy)),
                ..CabinetUpdate::default()
            },
        )
    }

    pub fn delete(&mut self, id: &str) -> Result<(), Error> {
        let mut collection = self.load()?;
        let before = collection.cabinets.len();
        collection.cabinets.retain(|c| c.id != id);
        if collection.cabinets.len() == before {
            return Err(Error::NotFound(format!("Cabinet {id} does not exist")));
        }
        self.persist(&collection)
    }

    pub fn rename(&mut self, id: &str, new_name: &str) -> Result<Cabinet, Error> {
        self.update(
            id,
            &CabinetUpdate {
                name: Some(new_name.to_string()),
                ..CabinetUpdate::default()
            },
        )
    }

    /// Case-insensitive search over names, descriptions, tags, and
    /// captured tab titles/urls. An empty query matches everything.
    pub fn search(&self, query: &str) -> Result<Vec<Cabinet>, Error> {
        let needle = query.trim().to_lowercase();
        let cabinets = self.list()?;
        if needle.is_empty() {
            return Ok(cabinets);
        }
        Ok(cabinets
            .into_iter()
            .filter(|c| cabinet_matches(c, &needle))
            .collect())
    }

    /// Structural check. A tab-count mismatch is a warning unless
    /// strict metadata validation is configured.
    pub fn validate_cabinet(&self, cabinet: &Cabinet) -> CabinetValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if cabinet.name.trim().is_empty() {
            errors.push("Cabinet name is empty".to_string());
        }
        if cabinet.created_at == 0 || cabinet.updated_at == 0 {
            errors.push("Cabinet timestamps are not set".to_string());
        }

        let actual = count_forest(&cabinet.tabs);
        if actual != cabinet.metadata.tab_count {
            let message = format!(
                "Tab count mismatch: metadata records {}, tree holds {actual}",
                cabinet.metadata.tab_count
            );
            if self.config.strict_metadata_validation {
                errors.push(message);
            } else {
                warnings.push(message);
            }
        }
        if cabinet.tabs.is_empty() {
            warnings.push("Cabinet has no tabs".to_string());
        }

        CabinetValidation {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn storage_info(&self) -> Result<StorageInfo, Error> {
        let bytes_used = self.store.bytes_in_use()?;
        let quota_bytes = self.store.quota_bytes();
        let cabinet_count = self.load()?.cabinets.len();
        Ok(StorageInfo {
            bytes_used,
            bytes_available: quota_bytes.saturating_sub(bytes_used),
            quota_bytes,
            near_limit: bytes_used as f64 >= quota_bytes as f64 * self.config.quota_warn_threshold,
            cabinet_count,
        })
    }

    fn load(&self) -> Result<CabinetCollection, Error> {
        match self.store.get_all(COLLECTION_KEY)? {
            None => Ok(CabinetCollection::default()),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::Store(format!("Corrupt cabinet collection: {e}"))),
        }
    }

    fn persist(&mut self, collection: &CabinetCollection) -> Result<(), Error> {
        let bytes = serde_json::to_vec(collection)
            .map_err(|e| Error::Store(format!("Failed to serialize cabinets: {e}")))?;
        self.store.set_all(COLLECTION_KEY, &bytes)?;
        Ok(())
    }

    fn validate_name(
        &self,
        name: &str,
        collection: &CabinetCollection,
        exclude_id: Option<&str>,
    ) -> Result<String, Error> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation(
                "Cabinet name must not be empty".to_string(),
            ));
        }
        if trimmed.chars().count() > self.config.max_name_len {
            return Err(Error::Validation(format!(
                "Cabinet name exceeds {} characters",
                self.config.max_name_len
            )));
        }
        let lower = trimmed.to_lowercase();
        let taken = collection
            .cabinets
            .iter()
            .any(|c| Some(c.id.as_str()) != exclude_id && c.name.to_lowercase() == lower);
        if taken {
            return Err(Error::Validation(format!(
                "A Cabinet named '{trimmed}' already exists"
            )));
        }
        Ok(trimmed.to_string())
    }
}

fn cabinet_matches(cabinet: &Cabinet, needle: &str) -> bool {
    if cabinet.name.to_lowercase().contains(needle) {
        return true;
    }
    if cabinet
        .description
        .as_ref()
        .is_some_and(|d| d.to_lowercase().contains(needle))
    {
        return true;
    }
    if cabinet
        .tags
        .iter()
        .any(|t| t.to_lowercase().contains(needle))
    {
        return true;
    }
    flatten(&cabinet.tabs).iter().any(|tab| {
        tab.title.to_lowercase().contains(needle) || tab.url.to_lowercase().contains(needle)
    })
}
