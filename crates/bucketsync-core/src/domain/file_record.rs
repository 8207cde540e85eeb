//! FileRecord domain entity
//!
//! A local cache entry mirroring one object of a bucket's remote manifest.
//! File records are never the source of truth; they are always
//! reconcilable from the manifest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::manifest::ManifestObject;
use super::newtypes::{FileRecordId, ObjectKey};

/// Cached view of one remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    id: FileRecordId,
    remote_id: Option<String>,
    name: String,
    key: ObjectKey,
    is_folder: bool,
    size: u64,
    mime_type: Option<String>,
    bucket_id: String,
    parent_key: Option<ObjectKey>,
    is_synced: bool,
    last_synced_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Builds a record from a validated manifest object
    ///
    /// Records built from the manifest are synced: the manifest is the
    /// authoritative remote state.
    pub fn from_manifest(bucket_id: impl Into<String>, object: &ManifestObject) -> Self {
        Self {
            id: FileRecordId::new(),
            remote_id: object.remote_id.clone(),
            name: object.name().to_string(),
            key: object.key.clone(),
            is_folder: object.is_folder,
            size: object.size,
            mime_type: object.mime_type.clone(),
            bucket_id: bucket_id.into(),
            parent_key: object.key.parent(),
            is_synced: true,
            last_synced_at: Some(Utc::now()),
        }
    }

    /// Builds a record for a file the synchronizer just uploaded
    pub fn uploaded(
        bucket_id: impl Into<String>,
        key: ObjectKey,
        size: u64,
        mime_type: Option<String>,
    ) -> Self {
        let name = key.trimmed().rsplit('/').next().unwrap_or_default().to_string();
        let parent_key = key.parent();
        Self {
            id: FileRecordId::new(),
            remote_id: None,
            name,
            key,
            is_folder: false,
            size,
            mime_type,
            bucket_id: bucket_id.into(),
            parent_key,
            is_synced: true,
            last_synced_at: Some(Utc::now()),
        }
    }

    /// Reconstructs a record from persisted fields
    #[allow(clippy::too_many_arguments)]
    pub fn with_id(
        id: FileRecordId,
        remote_id: Option<String>,
        name: impl Into<String>,
        key: ObjectKey,
        is_folder: bool,
        size: u64,
        mime_type: Option<String>,
        bucket_id: impl Into<String>,
        parent_key: Option<ObjectKey>,
        is_synced: bool,
        last_synced_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            remote_id,
            name: name.into(),
            key,
            is_folder,
            size,
            mime_type,
            bucket_id: bucket_id.into(),
            parent_key,
            is_synced,
            last_synced_at,
        }
    }

    pub fn id(&self) -> &FileRecordId {
        &self.id
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn is_folder(&self) -> bool {
        self.is_folder
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn bucket_id(&self) -> &str {
        &self.bucket_id
    }

    pub fn parent_key(&self) -> Option<&ObjectKey> {
        self.parent_key.as_ref()
    }

    pub fn is_synced(&self) -> bool {
        self.is_synced
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    /// Flags the record as synced after a completed transfer
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.is_synced = true;
        self.last_synced_at = Some(at);
    }
}
