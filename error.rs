/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Crate-wide error taxonomy.
//!
//! Expected failure modes surface as `Result` values; batch operations
//! (cascading delete, restoration) record per-item failures in their
//! outcome structs instead of returning `Err`.

/// Errors surfaced by the engine, repository, and restoration paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Bad input: invalid name, empty hierarchy, duplicate name,
    /// malformed Cabinet, or a hierarchy failing integrity validation.
    Validation(String),

    /// Unknown tab or Cabinet id.
    NotFound(String),

    /// The blob store rejected a write for lack of space.
    QuotaExceeded { used: u64, quota: u64 },

    /// A URL whose scheme is excluded from recreation by policy.
    RestrictedUrl(String),

    /// A single external create/remove/query call failed.
    External(String),

    /// The active external container could not be resolved. Fatal for
    /// restoration; no external calls are made after this.
    ContainerResolution(String),

    /// Blob store failure other than quota exhaustion.
    Store(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Validation(e) => write!(f, "Validation error: {e}"),
            Error::NotFound(e) => write!(f, "Not found: {e}"),
            Error::QuotaExceeded { used, quota } => {
                write!(f, "Storage quota exceeded: {used} of {quota} bytes in use")
            },
            Error::RestrictedUrl(url) => write!(f, "Restricted URL: {url}"),
            Error::External(e) => write!(f, "External operation failed: {e}"),
            Error::ContainerResolution(e) => write!(f, "Cannot resolve container: {e}"),
            Error::Store(e) => write!(f, "Storage error: {e}"),
        }
    }
}

impl std::error::Error for Error {}
