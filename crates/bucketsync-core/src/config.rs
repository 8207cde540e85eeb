//! Configuration module for BucketSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for BucketSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub watcher: WatcherConfig,
    pub transfer: TransferConfig,
    pub journal: JournalConfig,
    pub authority: AuthorityConfig,
    pub storage: StorageConfig,
    pub credentials: CredentialsConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Watched root; each mapping folder lives directly beneath it.
    pub root: PathBuf,
    /// Seconds between scheduler ticks.
    pub tick_interval_secs: u64,
    /// Configurations seeded into the state repository on start.
    pub configurations: Vec<ConfigurationEntry>,
}

/// One configured group of mappings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationEntry {
    pub name: String,
    /// Minutes between cycles for this configuration.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub mappings: Vec<MappingEntry>,
}

/// One local folder to bucket pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Absolute, or relative to `sync.root`.
    pub local_path: PathBuf,
    pub bucket_id: String,
}

impl MappingEntry {
    /// Resolves `local_path` against the sync root.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        if self.local_path.is_absolute() {
            self.local_path.clone()
        } else {
            root.join(&self.local_path)
        }
    }
}

/// Filesystem watcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: bool,
    /// Quiet period before a changed file is considered stable.
    pub stability_ms: u64,
    /// How often pending events are checked for stability.
    pub poll_interval_ms: u64,
    /// Delay before a path written by the synchronizer is released from the write guard.
    pub guard_release_ms: u64,
}

/// Object transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Multipart part size (in MiB); files up to one part use a single PUT.
    pub part_size_mb: u64,
    /// Parts in flight per multipart upload.
    pub max_concurrent_parts: usize,
    /// Upper bound for a single HTTP request, body included.
    pub request_timeout_secs: u64,
    /// Lifetime of signed URLs.
    pub signed_url_expiry_secs: u64,
}

/// Activity journal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Identical events inside this window collapse to one record.
    pub dedup_window_secs: u64,
    /// Synced and skip records older than this are pruned.
    pub retention_days: u32,
    /// Records per ledger POST.
    pub flush_batch_size: u32,
}

/// Central authority API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    pub base_url: String,
    /// Environment variable holding the bearer token.
    pub token_env: String,
}

/// Object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Custom S3-compatible endpoint; switches to path-style URLs.
    pub endpoint: Option<String>,
    pub default_region: String,
}

/// Credential resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Access key prefix identifying temporary credentials.
    pub temporary_key_prefix: String,
    /// Environment variable holding the secret decryption passphrase.
    pub encryption_key_env: String,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/bucketsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("bucketsync")
            .join("config.yaml")
    }

    /// Default location of the state database.
    pub fn default_db_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("bucketsync")
            .join("bucketsync.db")
    }
}

impl SyncConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

impl TransferConfig {
    pub fn part_size_bytes(&self) -> u64 {
        self.part_size_mb * 1024 * 1024
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn signed_url_expiry(&self) -> Duration {
        Duration::from_secs(self.signed_url_expiry_secs)
    }
}

impl WatcherConfig {
    pub fn stability(&self) -> Duration {
        Duration::from_millis(self.stability_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn guard_release(&self) -> Duration {
        Duration::from_millis(self.guard_release_ms)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_interval_minutes() -> u32 {
    15
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("BucketSync"),
            tick_interval_secs: 60,
            configurations: Vec::new(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stability_ms: 2000,
            poll_interval_ms: 250,
            guard_release_ms: 5000,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            part_size_mb: 5,
            max_concurrent_parts: 4,
            request_timeout_secs: 300,
            signed_url_expiry_secs: 3600,
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dedup_window_secs: 60,
            retention_days: 30,
            flush_batch_size: 100,
        }
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            token_env: "BUCKETSYNC_TOKEN".to_string(),
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            temporary_key_prefix: "ASIA".to_string(),
            encryption_key_env: "BUCKETSYNC_ENCRYPTION_KEY".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            default_region: "us-east-1".to_string(),
        }
    }
}

impl StorageConfig {
    /// Region used when a bucket account does not name one.
    pub fn region(&self) -> &str {
        if self.default_region.is_empty() {
            "us-east-1"
        } else {
            &self.default_region
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"journal.flush_batch_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.tick_interval_secs == 0 {
            errors.push(ValidationError::new(
                "sync.tick_interval_secs",
                "must be greater than 0",
            ));
        }
        let mut names = std::collections::HashSet::new();
        for (i, entry) in self.sync.configurations.iter().enumerate() {
            let field = format!("sync.configurations[{i}]");
            if entry.name.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("{field}.name"),
                    "must not be empty",
                ));
            } else if !names.insert(entry.name.as_str()) {
                errors.push(ValidationError::new(
                    format!("{field}.name"),
                    format!("duplicate configuration name: {}", entry.name),
                ));
            }
            if entry.interval_minutes == 0 {
                errors.push(ValidationError::new(
                    format!("{field}.interval_minutes"),
                    "must be greater than 0",
                ));
            }
            for (j, mapping) in entry.mappings.iter().enumerate() {
                if mapping.bucket_id.trim().is_empty() {
                    errors.push(ValidationError::new(
                        format!("{field}.mappings[{j}].bucket_id"),
                        "must not be empty",
                    ));
                }
                if mapping.local_path.as_os_str().is_empty() {
                    errors.push(ValidationError::new(
                        format!("{field}.mappings[{j}].local_path"),
                        "must not be empty",
                    ));
                }
            }
        }

        // --- watcher ---
        if self.watcher.poll_interval_ms == 0 {
            errors.push(ValidationError::new(
                "watcher.poll_interval_ms",
                "must be greater than 0",
            ));
        }

        // --- transfer ---
        // S3 rejects non-final parts smaller than 5 MiB.
        if self.transfer.part_size_mb < 5 {
            errors.push(ValidationError::new(
                "transfer.part_size_mb",
                "must be at least 5",
            ));
        }
        if self.transfer.max_concurrent_parts == 0 {
            errors.push(ValidationError::new(
                "transfer.max_concurrent_parts",
                "must be greater than 0",
            ));
        }
        if self.transfer.request_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "transfer.request_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.transfer.signed_url_expiry_secs == 0 || self.transfer.signed_url_expiry_secs > 604_800
        {
            errors.push(ValidationError::new(
                "transfer.signed_url_expiry_secs",
                "must be between 1 and 604800",
            ));
        }

        // --- journal ---
        if self.journal.retention_days == 0 {
            errors.push(ValidationError::new(
                "journal.retention_days",
                "must be greater than 0",
            ));
        }
        if self.journal.flush_batch_size == 0 {
            errors.push(ValidationError::new(
                "journal.flush_batch_size",
                "must be greater than 0",
            ));
        }

        // --- authority ---
        if url::Url::parse(&self.authority.base_url).is_err() {
            errors.push(ValidationError::new(
                "authority.base_url",
                format!("invalid URL: {}", self.authority.base_url),
            ));
        }
        if self.authority.token_env.trim().is_empty() {
            errors.push(ValidationError::new(
                "authority.token_env",
                "must not be empty",
            ));
        }

        // --- storage ---
        if let Some(endpoint) = &self.storage.endpoint {
            if url::Url::parse(endpoint).is_err() {
                errors.push(ValidationError::new(
                    "storage.endpoint",
                    format!("invalid URL: {endpoint}"),
                ));
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError::new(
                "logging.level",
                format!(
                    "invalid level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError::new(
                "logging.format",
                format!(
                    "invalid format '{}'; expected one of: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            ));
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows overriding individual fields.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder pre-filled with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn sync_root(mut self, root: PathBuf) -> Self {
        self.config.sync.root = root;
        self
    }

    pub fn sync_tick_interval(mut self, seconds: u64) -> Self {
        self.config.sync.tick_interval_secs = seconds;
        self
    }

    /// Append a configuration with the given mappings.
    pub fn configuration(
        mut self,
        name: impl Into<String>,
        interval_minutes: u32,
        mappings: Vec<MappingEntry>,
    ) -> Self {
        self.config.sync.configurations.push(ConfigurationEntry {
            name: name.into(),
            interval_minutes,
            active: true,
            mappings,
        });
        self
    }

    // --- watcher ---

    pub fn watcher_enabled(mut self, enabled: bool) -> Self {
        self.config.watcher.enabled = enabled;
        self
    }

    pub fn watcher_stability_ms(mut self, ms: u64) -> Self {
        self.config.watcher.stability_ms = ms;
        self
    }

    pub fn watcher_guard_release_ms(mut self, ms: u64) -> Self {
        self.config.watcher.guard_release_ms = ms;
        self
    }

    // --- transfer ---

    pub fn transfer_part_size_mb(mut self, mb: u64) -> Self {
        self.config.transfer.part_size_mb = mb;
        self
    }

    pub fn transfer_max_concurrent_parts(mut self, n: usize) -> Self {
        self.config.transfer.max_concurrent_parts = n;
        self
    }

    // --- journal ---

    pub fn journal_dedup_window_secs(mut self, secs: u64) -> Self {
        self.config.journal.dedup_window_secs = secs;
        self
    }

    pub fn journal_retention_days(mut self, days: u32) -> Self {
        self.config.journal.retention_days = days;
        self
    }

    pub fn journal_flush_batch_size(mut self, n: u32) -> Self {
        self.config.journal.flush_batch_size = n;
        self
    }

    // --- authority / storage ---

    pub fn authority_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.authority.base_url = url.into();
        self
    }

    pub fn storage_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.storage.endpoint = Some(endpoint.into());
        self
    }

    pub fn storage_default_region(mut self, region: impl Into<String>) -> Self {
        self.config.storage.default_region = region.into();
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.sync.tick_interval_secs, 60);
        assert!(cfg.sync.configurations.is_empty());
        assert!(cfg.watcher.enabled);
        assert_eq!(cfg.watcher.stability_ms, 2000);
        assert_eq!(cfg.watcher.guard_release_ms, 5000);
        assert_eq!(cfg.transfer.part_size_mb, 5);
        assert_eq!(cfg.transfer.part_size_bytes(), 5 * 1024 * 1024);
        assert_eq!(cfg.transfer.max_concurrent_parts, 4);
        assert_eq!(cfg.transfer.signed_url_expiry(), Duration::from_secs(3600));
        assert_eq!(cfg.journal.dedup_window_secs, 60);
        assert_eq!(cfg.journal.retention_days, 30);
        assert_eq!(cfg.journal.flush_batch_size, 100);
        assert_eq!(cfg.authority.token_env, "BUCKETSYNC_TOKEN");
        assert!(cfg.storage.endpoint.is_none());
        assert_eq!(cfg.storage.region(), "us-east-1");
        assert_eq!(cfg.credentials.temporary_key_prefix, "ASIA");
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, "pretty");
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
sync:
  root: /sync
  tick_interval_secs: 30
  configurations:
    - name: work
      interval_minutes: 5
      mappings:
        - local_path: bucket1
          bucket_id: b1
        - local_path: /elsewhere/photos
          bucket_id: b2
watcher:
  stability_ms: 500
transfer:
  part_size_mb: 8
  max_concurrent_parts: 2
journal:
  dedup_window_secs: 10
  retention_days: 7
authority:
  base_url: https://api.example.com
storage:
  endpoint: http://localhost:9000
  default_region: eu-west-1
logging:
  level: debug
  format: json
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.sync.root, PathBuf::from("/sync"));
        assert_eq!(cfg.sync.tick_interval_secs, 30);
        assert_eq!(cfg.sync.configurations.len(), 1);

        let work = &cfg.sync.configurations[0];
        assert_eq!(work.name, "work");
        assert_eq!(work.interval_minutes, 5);
        assert!(work.active);
        assert_eq!(
            work.mappings[0].resolve(&cfg.sync.root),
            PathBuf::from("/sync/bucket1")
        );
        assert_eq!(
            work.mappings[1].resolve(&cfg.sync.root),
            PathBuf::from("/elsewhere/photos")
        );

        // Unspecified fields in a present section keep their defaults.
        assert_eq!(cfg.watcher.stability_ms, 500);
        assert_eq!(cfg.watcher.guard_release_ms, 5000);
        assert_eq!(cfg.transfer.part_size_mb, 8);
        assert_eq!(cfg.transfer.request_timeout_secs, 300);
        assert_eq!(cfg.journal.flush_batch_size, 100);
        assert_eq!(cfg.storage.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(cfg.storage.region(), "eu-west-1");
        assert_eq!(cfg.logging.format, "json");
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.sync.tick_interval_secs, 60);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"sync: [not, a, map").unwrap();
        tmp.flush().unwrap();
        assert!(Config::load(tmp.path()).is_err());
    }

    // -- Validation --

    #[test]
    fn validate_catches_zero_tick_interval() {
        let cfg = ConfigBuilder::new().sync_tick_interval(0).build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "sync.tick_interval_secs"));
    }

    #[test]
    fn validate_catches_bad_configuration_entries() {
        let cfg = ConfigBuilder::new()
            .configuration(
                "work",
                0,
                vec![MappingEntry {
                    local_path: PathBuf::from("bucket1"),
                    bucket_id: String::new(),
                }],
            )
            .configuration("work", 5, vec![])
            .build();
        let fields: Vec<_> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"sync.configurations[0].interval_minutes".to_string()));
        assert!(fields.contains(&"sync.configurations[0].mappings[0].bucket_id".to_string()));
        assert!(fields.contains(&"sync.configurations[1].name".to_string()));
    }

    #[test]
    fn validate_catches_small_part_size() {
        let cfg = ConfigBuilder::new().transfer_part_size_mb(1).build();
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "transfer.part_size_mb"));
    }

    #[test]
    fn validate_catches_zero_journal_values() {
        let cfg = ConfigBuilder::new()
            .journal_retention_days(0)
            .journal_flush_batch_size(0)
            .build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "journal.retention_days"));
        assert!(errors.iter().any(|e| e.field == "journal.flush_batch_size"));
    }

    #[test]
    fn validate_catches_invalid_urls() {
        let cfg = ConfigBuilder::new()
            .authority_base_url("not a url")
            .storage_endpoint("::")
            .build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "authority.base_url"));
        assert!(errors.iter().any(|e| e.field == "storage.endpoint"));
    }

    #[test]
    fn validate_catches_invalid_logging() {
        let cfg = ConfigBuilder::new()
            .logging_level("verbose")
            .logging_format("xml")
            .build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.level"));
        assert!(errors.iter().any(|e| e.field == "logging.format"));
    }

    #[test]
    fn validate_accepts_all_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let cfg = ConfigBuilder::new().logging_level(*level).build();
            assert!(
                !cfg.validate().iter().any(|e| e.field == "logging.level"),
                "level {level} should be valid"
            );
        }
    }

    // -- Builder --

    #[test]
    fn builder_overrides_fields() {
        let cfg = ConfigBuilder::new()
            .sync_root(PathBuf::from("/data"))
            .watcher_enabled(false)
            .watcher_stability_ms(100)
            .watcher_guard_release_ms(50)
            .transfer_max_concurrent_parts(2)
            .journal_dedup_window_secs(5)
            .storage_default_region("ap-south-1")
            .build();
        assert_eq!(cfg.sync.root, PathBuf::from("/data"));
        assert!(!cfg.watcher.enabled);
        assert_eq!(cfg.watcher.stability(), Duration::from_millis(100));
        assert_eq!(cfg.watcher.guard_release(), Duration::from_millis(50));
        assert_eq!(cfg.transfer.max_concurrent_parts, 2);
        assert_eq!(cfg.journal.dedup_window_secs, 5);
        assert_eq!(cfg.storage.region(), "ap-south-1");
    }

    #[test]
    fn builder_build_validated_fails_for_invalid_config() {
        let result = ConfigBuilder::new().journal_flush_batch_size(0).build_validated();
        let errors = result.unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].to_string(),
            "journal.flush_batch_size: must be greater than 0"
        );
    }

    #[test]
    fn default_path_ends_with_config_yaml() {
        let path = Config::default_path();
        assert!(path.ends_with("bucketsync/config.yaml"));
        assert!(Config::default_db_path().ends_with("bucketsync/bucketsync.db"));
    }
}
