//! Domain newtypes with validation
//!
//! Strongly-typed identifiers for the persisted entities plus the
//! [`ObjectKey`] type, which guarantees that a remote key can be mapped
//! safely onto a path below a mapping's local root.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based ID types
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from an existing UUID
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID value
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|e| {
                    DomainError::InvalidId(format!("Invalid {}: {e}", stringify!($name)))
                })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Identifier for Sync Configuration entities
    ConfigId
);

uuid_id!(
    /// Identifier for Mapping entities
    MappingId
);

uuid_id!(
    /// Identifier for Sync Job entities
    JobId
);

uuid_id!(
    /// Identifier for cached File Record entities
    FileRecordId
);

/// Identifier for activity records (database row ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(i64);

impl ActivityId {
    /// Create an ActivityId from an i64 value
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for ActivityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ActivityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// ObjectKey
// ============================================================================

/// Longest run of identical consecutive segments accepted in a key.
///
/// Keys like `photos/photos/photos/a.jpg` are produced by clients that
/// re-uploaded a mapping root into itself; beyond this depth they are
/// treated as manifest corruption.
pub const MAX_REPEATED_SEGMENTS: usize = 2;

/// A validated object key within a bucket
///
/// ObjectKey ensures the key is:
/// - Relative (no leading `/`)
/// - Free of `.`/`..` and empty interior segments
/// - Not self-recursive (see [`MAX_REPEATED_SEGMENTS`])
///
/// A trailing `/` is preserved and marks a folder placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Creates a new ObjectKey after validation
    pub fn new(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        if key.is_empty() {
            return Err(DomainError::InvalidKey("key is empty".to_string()));
        }
        if key.starts_with('/') || key.contains('\\') || key.contains('\0') {
            return Err(DomainError::InvalidKey(key));
        }

        let trimmed = key.strip_suffix('/').unwrap_or(&key);
        if trimmed.is_empty() {
            return Err(DomainError::InvalidKey(key));
        }

        let mut previous: Option<&str> = None;
        let mut run = 0usize;
        for segment in trimmed.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(DomainError::InvalidKey(key));
            }
            if previous == Some(segment) {
                run += 1;
                if run > MAX_REPEATED_SEGMENTS {
                    return Err(DomainError::InvalidKey(format!(
                        "{key} (self-recursive segment '{segment}')"
                    )));
                }
            } else {
                run = 1;
            }
            previous = Some(segment);
        }

        Ok(Self(key))
    }

    /// Builds a key from a path relative to a mapping root
    pub fn from_relative_path(relative: &Path) -> Result<Self, DomainError> {
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                std::path::Component::Normal(part) => {
                    let part = part.to_str().ok_or_else(|| {
                        DomainError::InvalidPath(relative.display().to_string())
                    })?;
                    parts.push(part);
                }
                _ => return Err(DomainError::InvalidPath(relative.display().to_string())),
            }
        }
        Self::new(parts.join("/"))
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the key is a folder placeholder (trailing slash)
    pub fn is_folder_marker(&self) -> bool {
        self.0.ends_with('/')
    }

    /// Returns the last segment, or `None` for folder placeholders
    pub fn basename(&self) -> Option<&str> {
        if self.is_folder_marker() {
            return None;
        }
        self.0.rsplit('/').next().filter(|name| !name.is_empty())
    }

    /// Returns the parent folder key (with trailing slash), if any
    pub fn parent(&self) -> Option<ObjectKey> {
        let trimmed = self.0.strip_suffix('/').unwrap_or(&self.0);
        let (parent, _) = trimmed.rsplit_once('/')?;
        Some(Self(format!("{parent}/")))
    }

    /// Returns the key with any trailing slash removed
    pub fn trimmed(&self) -> &str {
        self.0.strip_suffix('/').unwrap_or(&self.0)
    }

    /// Maps the key onto a path below `root`
    pub fn to_local_path(&self, root: &Path) -> PathBuf {
        self.trimmed()
            .split('/')
            .fold(root.to_path_buf(), |path, segment| path.join(segment))
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ObjectKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectKey> for String {
    fn from(key: ObjectKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
