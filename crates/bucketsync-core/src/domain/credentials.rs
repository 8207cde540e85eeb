//! Storage credential types
//!
//! [`BucketAccount`] is the encrypted account record the authority returns
//! for a bucket; [`StorageCredentials`] is the resolved, plaintext form used
//! to sign object storage requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account record owning a bucket, as stored by the authority
///
/// Key fields may be encrypted, empty, or redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketAccount {
    pub bucket_name: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Plaintext credentials for one bucket
#[derive(Clone, PartialEq, Eq)]
pub struct StorageCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub region: String,
    pub bucket_name: String,
}

impl StorageCredentials {
    /// Returns true if the access key carries `prefix` (temporary credentials)
    pub fn is_temporary(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.access_key.starts_with(prefix)
    }
}

// Keep secrets out of logs.
impl std::fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .field("region", &self.region)
            .field("bucket_name", &self.bucket_name)
            .finish()
    }
}

/// Session credentials handed to `init_sync`
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    /// Bearer token for the authority API
    pub token: String,
}

impl SessionCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("token", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = StorageCredentials {
            access_key: "AKIAEXAMPLE".to_string(),
            secret_key: "topsecret".to_string(),
            session_token: Some("tok".to_string()),
            region: "us-east-1".to_string(),
            bucket_name: "photos".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("topsecret"));
        assert!(!rendered.contains("tok\""));
    }

    #[test]
    fn test_is_temporary() {
        let mut creds = StorageCredentials {
            access_key: "ASIAXYZ".to_string(),
            secret_key: "s".to_string(),
            session_token: None,
            region: "us-east-1".to_string(),
            bucket_name: "b".to_string(),
        };
        assert!(creds.is_temporary("ASIA"));
        creds.access_key = "AKIAXYZ".to_string();
        assert!(!creds.is_temporary("ASIA"));
        assert!(!creds.is_temporary(""));
    }

    #[test]
    fn test_bucket_account_deserializes() {
        let json = r#"{"bucketName":"photos","region":"eu-west-1","accessKey":"a","secretKey":"s"}"#;
        let account: BucketAccount = serde_json::from_str(json).unwrap();
        assert_eq!(account.bucket_name, "photos");
        assert_eq!(account.region.as_deref(), Some("eu-west-1"));
        assert!(account.session_token.is_none());
    }
}
