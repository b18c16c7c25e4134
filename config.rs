/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Engine and repository tunables.
//!
//! One flat struct with serde defaults; hosts load overrides from TOML
//! and pass the result to the engine, repository, and restoration
//! planners by reference.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Crate-wide configuration. Every threshold the engine, repository,
/// or restoration planner consults lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Depth clamp for `level` computation.
    pub max_depth: u32,

    /// Maximum number of saved Cabinets.
    pub max_cabinets: usize,

    /// Maximum Cabinet name length in characters.
    pub max_name_len: usize,

    /// Fraction of the blob-store quota at which `storage_info`
    /// reports `near_limit`.
    pub quota_warn_threshold: f64,

    /// Cascading deletes larger than this draw a warning.
    pub delete_warn_count: usize,

    /// Sibling-group size above which a restoration plan warns.
    pub large_restore_sibling_count: usize,

    /// Tab count above which restoration safety flags performance risk.
    pub performance_warn_tab_count: usize,

    /// Combined existing+incoming tab count considered excessive.
    pub excessive_tab_count: usize,

    /// Fixed per-tab cost used for restoration time estimates.
    pub per_tab_restore_ms: u64,

    /// Change-notification debounce window.
    pub debounce_ms: u64,

    /// When set, a Cabinet whose `metadata.tab_count` disagrees with
    /// the actual tree fails validation instead of warning.
    pub strict_metadata_validation: bool,

    /// URL schemes never recreated during restoration.
    pub restricted_schemes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: 25,
            max_cabinets: 100,
            max_name_len: 100,
            quota_warn_threshold: 0.8,
            delete_warn_count: 10,
            large_restore_sibling_count: 15,
            performance_warn_tab_count: 30,
            excessive_tab_count: 100,
            per_tab_restore_ms: 150,
            debounce_ms: 100,
            strict_metadata_validation: false,
            restricted_schemes: default_restricted_schemes(),
        }
    }
}

fn default_restricted_schemes() -> Vec<String> {
    [
        "chrome",
        "chrome-extension",
        "chrome-untrusted",
        "about",
        "edge",
        "brave",
        "opera",
        "vivaldi",
        "moz-extension",
        "devtools",
        "view-source",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// Parse a TOML override document. Unknown fields are tolerated;
    /// missing fields keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        toml::from_str(text).map_err(|e| Error::Validation(format!("Invalid config: {e}")))
    }

    /// True when `scheme` is excluded from restoration.
    pub fn is_restricted_scheme(&self, scheme: &str) -> bool {
        self.restricted_schemes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(scheme))
    }
}
