//! Bucket credential resolution
//!
//! Turns a bucket identifier into usable [`StorageCredentials`]:
//!
//! 1. Fetch the owning account from the authority
//! 2. Decrypt the stored keys through the [`ISecretDecryptor`]
//! 3. Fall back to `AWS_*` environment credentials when the stored values are
//!    empty or masked
//! 4. Sanitize (trim whitespace, strip wrapping quotes)
//! 5. Reject temporary keys whose expiry has passed
//!
//! Every failure here is scoped to one file; callers record it and move on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use bucketsync_core::{
    config::{CredentialsConfig, StorageConfig},
    domain::{is_auth_failure, BucketAccount, StorageCredentials},
    ports::{IRemoteAuthority, ISecretDecryptor},
};

const ENV_ACCESS_KEY: &str = "AWS_ACCESS_KEY_ID";
const ENV_SECRET_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
const ENV_REGION: &str = "AWS_REGION";

/// Characters the dashboard uses to mask secrets it will not reveal
const MASK_CHARS: [char; 2] = ['*', '•'];

/// Environment lookup used for the fallback credentials
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Errors returned by [`CredentialResolver::resolve`]
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The authority has no account for this bucket
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    /// Neither stored nor environment credentials are usable
    #[error("No usable credentials for bucket {0}")]
    NoCredentials(String),

    /// Temporary credentials are past their expiry
    #[error("Credentials for bucket {bucket_id} expired at {expired_at}")]
    Expired {
        bucket_id: String,
        expired_at: DateTime<Utc>,
    },

    /// The authority lookup itself failed
    #[error("Account lookup failed: {0:#}")]
    Lookup(#[source] anyhow::Error),
}

impl CredentialError {
    /// Returns `true` if the authority rejected the session
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, CredentialError::Lookup(e) if is_auth_failure(e))
    }
}

/// Resolver settings taken from configuration
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub temporary_key_prefix: String,
    pub default_region: String,
}

impl ResolverSettings {
    pub fn from_config(credentials: &CredentialsConfig, storage: &StorageConfig) -> Self {
        Self {
            temporary_key_prefix: credentials.temporary_key_prefix.clone(),
            default_region: storage.region().to_string(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from_config(&CredentialsConfig::default(), &StorageConfig::default())
    }
}

/// Resolves storage credentials for a bucket
pub struct CredentialResolver {
    authority: Arc<dyn IRemoteAuthority>,
    decryptor: Arc<dyn ISecretDecryptor>,
    settings: ResolverSettings,
    env: EnvLookup,
}

impl CredentialResolver {
    pub fn new(
        authority: Arc<dyn IRemoteAuthority>,
        decryptor: Arc<dyn ISecretDecryptor>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            authority,
            decryptor,
            settings,
            env: Arc::new(|name: &str| std::env::var(name).ok()),
        }
    }

    /// Replaces the process environment lookup
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    /// Resolves credentials for `bucket_id`
    ///
    /// # Errors
    ///
    /// - `BucketNotFound` if the authority has no account for the bucket
    /// - `NoCredentials` if no usable key pair exists
    /// - `Expired` if temporary credentials are past their expiry
    /// - `Lookup` if the authority call failed
    pub async fn resolve(&self, bucket_id: &str) -> Result<StorageCredentials, CredentialError> {
        let account = self
            .authority
            .bucket_account(bucket_id)
            .await
            .map_err(CredentialError::Lookup)?
            .ok_or_else(|| CredentialError::BucketNotFound(bucket_id.to_string()))?;

        self.resolve_account(bucket_id, account, Utc::now())
    }

    fn resolve_account(
        &self,
        bucket_id: &str,
        account: BucketAccount,
        now: DateTime<Utc>,
    ) -> Result<StorageCredentials, CredentialError> {
        let stored_access = self.decrypt_field(bucket_id, "access_key", &account.access_key);
        let stored_secret = self.decrypt_field(bucket_id, "secret_key", &account.secret_key);
        let stored_token = account
            .session_token
            .as_deref()
            .map(|t| self.decrypt_field(bucket_id, "session_token", t));

        let (access_key, secret_key, session_token) =
            if is_usable(&stored_access) && is_usable(&stored_secret) {
                (stored_access, stored_secret, stored_token)
            } else {
                tracing::debug!(bucket_id, "Stored credentials unusable, trying environment");
                let access = self.env_value(ENV_ACCESS_KEY);
                let secret = self.env_value(ENV_SECRET_KEY);
                match (access, secret) {
                    (Some(access), Some(secret)) if is_usable(&access) && is_usable(&secret) => {
                        (access, secret, self.env_value(ENV_SESSION_TOKEN))
                    }
                    _ => return Err(CredentialError::NoCredentials(bucket_id.to_string())),
                }
            };

        let session_token = session_token
            .map(|t| sanitize(&t))
            .filter(|t| is_usable(t));

        let region = account
            .region
            .as_deref()
            .map(sanitize)
            .filter(|r| !r.is_empty())
            .or_else(|| self.env_value(ENV_REGION))
            .unwrap_or_else(|| self.settings.default_region.clone());

        let bucket_name = match sanitize(&account.bucket_name) {
            name if name.is_empty() => bucket_id.to_string(),
            name => name,
        };

        let credentials = StorageCredentials {
            access_key: sanitize(&access_key),
            secret_key: sanitize(&secret_key),
            session_token,
            region,
            bucket_name,
        };

        if credentials.is_temporary(&self.settings.temporary_key_prefix) {
            if let Some(expired_at) = account.expires_at.filter(|at| *at <= now) {
                return Err(CredentialError::Expired {
                    bucket_id: bucket_id.to_string(),
                    expired_at,
                });
            }
            if credentials.session_token.is_none() {
                tracing::warn!(
                    bucket_id,
                    "Temporary credentials without a session token; transfers will likely fail"
                );
            }
        }

        Ok(credentials)
    }

    fn decrypt_field(&self, bucket_id: &str, field: &str, value: &str) -> String {
        match self.decryptor.decrypt(value) {
            Ok(plain) => sanitize(&plain),
            Err(e) => {
                tracing::warn!(bucket_id, field, error = %e, "Failed to decrypt stored secret");
                String::new()
            }
        }
    }

    fn env_value(&self, name: &str) -> Option<String> {
        (self.env)(name).map(|v| sanitize(&v)).filter(|v| !v.is_empty())
    }
}

/// Trims whitespace and one pair of wrapping quotes
fn sanitize(value: &str) -> String {
    let trimmed = value.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| {
            trimmed
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}

fn is_usable(value: &str) -> bool {
    !value.is_empty() && !value.contains(MASK_CHARS)
}
