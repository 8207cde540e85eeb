//! Remote manifest types
//!
//! The manifest is the authoritative list of objects in a bucket. Raw
//! entries arrive from the authority API as [`ManifestEntry`]; before
//! reconciliation they are validated into [`ManifestObject`]s, dropping
//! keys that cannot be mapped safely onto the local tree.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::ObjectKey;

/// One object as listed by the authority API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Stable remote identifier, when the authority has one
    #[serde(default)]
    pub id: Option<String>,
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ManifestEntry {
    /// Convenience constructor for a file entry
    pub fn file(key: impl Into<String>, size: u64) -> Self {
        Self {
            id: None,
            key: key.into(),
            size,
            is_folder: false,
            mime_type: None,
            updated_at: None,
        }
    }

    /// Convenience constructor for a folder entry
    pub fn folder(key: impl Into<String>) -> Self {
        Self {
            id: None,
            key: key.into(),
            size: 0,
            is_folder: true,
            mime_type: None,
            updated_at: None,
        }
    }
}

/// A validated manifest object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestObject {
    pub remote_id: Option<String>,
    pub key: ObjectKey,
    pub size: u64,
    pub is_folder: bool,
    pub mime_type: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ManifestObject {
    /// Validates a raw entry
    ///
    /// A key whose basename cannot be derived (trailing slash) is treated
    /// as a folder marker regardless of the `isFolder` flag.
    pub fn from_entry(entry: ManifestEntry) -> Result<Self, DomainError> {
        let key = ObjectKey::new(entry.key)?;
        let is_folder = entry.is_folder || key.basename().is_none();
        Ok(Self {
            remote_id: entry.id.filter(|id| !id.is_empty()),
            key,
            size: if is_folder { 0 } else { entry.size },
            is_folder,
            mime_type: entry.mime_type,
            updated_at: entry.updated_at,
        })
    }

    /// Display name (last key segment)
    pub fn name(&self) -> &str {
        self.key
            .trimmed()
            .rsplit('/')
            .next()
            .unwrap_or_else(|| self.key.trimmed())
    }
}

/// A validated manifest for one bucket
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    objects: Vec<ManifestObject>,
    rejected: Vec<(String, DomainError)>,
    keys: HashSet<String>,
}

impl Manifest {
    /// Validates raw entries, keeping the rejected ones for logging
    pub fn from_entries(entries: impl IntoIterator<Item = ManifestEntry>) -> Self {
        let mut manifest = Manifest::default();
        for entry in entries {
            let raw_key = entry.key.clone();
            match ManifestObject::from_entry(entry) {
                Ok(object) => {
                    manifest.keys.insert(object.key.trimmed().to_string());
                    manifest.objects.push(object);
                }
                Err(e) => manifest.rejected.push((raw_key, e)),
            }
        }
        manifest
    }

    pub fn objects(&self) -> &[ManifestObject] {
        &self.objects
    }

    /// Entries dropped as corrupt, with the reason
    pub fn rejected(&self) -> &[(String, DomainError)] {
        &self.rejected
    }

    /// Iterates over file (non-folder) objects
    pub fn files(&self) -> impl Iterator<Item = &ManifestObject> {
        self.objects.iter().filter(|o| !o.is_folder)
    }

    /// Iterates over folder objects
    pub fn folders(&self) -> impl Iterator<Item = &ManifestObject> {
        self.objects.iter().filter(|o| o.is_folder)
    }

    /// Returns true if an object exists at `key` (trailing slash ignored)
    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key.strip_suffix('/').unwrap_or(key))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
