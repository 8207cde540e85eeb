//! Sync configuration and mapping entities
//!
//! A [`SyncConfiguration`] groups one or more [`Mapping`]s (local folder to
//! bucket pairings) under a shared schedule. The configuration's
//! `last_sync_timestamp` is advanced by the sync engine after every cycle.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ConfigId, MappingId};

/// A scheduled group of folder-to-bucket mappings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfiguration {
    id: ConfigId,
    name: String,
    interval_minutes: u32,
    is_active: bool,
    last_sync_timestamp: Option<DateTime<Utc>>,
}

impl SyncConfiguration {
    /// Creates a new active configuration that has never been synced
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationFailed` if the name is blank.
    pub fn new(name: impl Into<String>, interval_minutes: u32) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "configuration name cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            id: ConfigId::new(),
            name,
            interval_minutes,
            is_active: true,
            last_sync_timestamp: None,
        })
    }

    /// Reconstructs a configuration from persisted fields
    pub fn with_id(
        id: ConfigId,
        name: impl Into<String>,
        interval_minutes: u32,
        is_active: bool,
        last_sync_timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            interval_minutes,
            is_active,
            last_sync_timestamp,
        }
    }

    pub fn id(&self) -> &ConfigId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn last_sync_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_sync_timestamp
    }

    /// Returns true if the configuration should run a cycle at `now`
    ///
    /// Inactive configurations are never due. Active ones are due when
    /// they have never been synced, or when at least `interval_minutes`
    /// have elapsed since the last cycle.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match self.last_sync_timestamp {
            None => true,
            Some(last) => now - last >= Duration::minutes(i64::from(self.interval_minutes)),
        }
    }

    /// Records that a cycle finished at `at`
    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.last_sync_timestamp = Some(at);
    }

    pub fn set_active(&mut self, active: bool) {
        self.is_active = active;
    }

    pub fn set_interval_minutes(&mut self, minutes: u32) {
        self.interval_minutes = minutes;
    }
}

/// One local folder paired with one remote bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    id: MappingId,
    local_path: PathBuf,
    bucket_id: String,
    config_id: ConfigId,
}

impl Mapping {
    /// Creates a new mapping owned by `config_id`
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidPath` if `local_path` is not absolute,
    /// or `DomainError::ValidationFailed` if the bucket id is blank.
    pub fn new(
        local_path: impl Into<PathBuf>,
        bucket_id: impl Into<String>,
        config_id: ConfigId,
    ) -> Result<Self, DomainError> {
        let local_path = local_path.into();
        if !local_path.is_absolute() {
            return Err(DomainError::InvalidPath(format!(
                "mapping path must be absolute: {}",
                local_path.display()
            )));
        }
        let bucket_id = bucket_id.into();
        if bucket_id.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "bucket id cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            id: MappingId::new(),
            local_path,
            bucket_id,
            config_id,
        })
    }

    /// Reconstructs a mapping from persisted fields
    pub fn with_id(
        id: MappingId,
        local_path: impl Into<PathBuf>,
        bucket_id: impl Into<String>,
        config_id: ConfigId,
    ) -> Self {
        Self {
            id,
            local_path: local_path.into(),
            bucket_id: bucket_id.into(),
            config_id,
        }
    }

    pub fn id(&self) -> &MappingId {
        &self.id
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn bucket_id(&self) -> &str {
        &self.bucket_id
    }

    pub fn config_id(&self) -> &ConfigId {
        &self.config_id
    }

    /// Returns true if `path` lies inside this mapping's local root
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.local_path)
    }

    /// Returns the directory name of the local root
    pub fn root_name(&self) -> Option<&str> {
        self.local_path.file_name().and_then(|n| n.to_str())
    }
}
