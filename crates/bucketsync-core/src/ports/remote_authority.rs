//! Remote authority port (driven/secondary port)
//!
//! The authority is the central API that owns bucket metadata: it lists
//! bucket manifests, hands out the (encrypted) account record for a bucket
//! and accepts activity ledger batches.
//!
//! ## Design Notes
//!
//! - Authorization failures must surface as
//!   [`RemoteError::Unauthorized`](crate::domain::RemoteError) somewhere in
//!   the returned error chain; the scheduler stops on them.
//! - Pagination is an adapter concern: `fetch_manifest` returns the whole
//!   listing.

use crate::domain::{BucketAccount, LedgerBatch, ManifestEntry};

/// Port trait for the central authority API
#[async_trait::async_trait]
pub trait IRemoteAuthority: Send + Sync {
    /// Returns every object listed for the bucket
    async fn fetch_manifest(&self, bucket_id: &str) -> anyhow::Result<Vec<ManifestEntry>>;

    /// Returns the account record owning the bucket, or `None` if unknown
    async fn bucket_account(&self, bucket_id: &str) -> anyhow::Result<Option<BucketAccount>>;

    /// Posts a batch to the activity ledger
    ///
    /// The ledger is append-only; posting the same batch twice is acceptable.
    async fn post_ledger(&self, batch: &LedgerBatch) -> anyhow::Result<()>;
}
