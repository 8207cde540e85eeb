//! BucketSync Audit - Write-ahead activity journal
//!
//! Provides:
//! - `ActivityJournal`: records every transfer attempt locally, collapses
//!   duplicates inside a window, flushes batches to the remote ledger and
//!   prunes old entries
//! - `JournalError`: failure classification for the journal operations
//! - Integration with `IStateRepository` for persistent journal storage

pub mod journal;

pub use journal::{ActivityJournal, FlushReport, JournalContext, JournalSettings, RecordOutcome};

/// Errors returned by [`ActivityJournal`] operations
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// The state repository rejected a read or write
    #[error("Journal storage failed: {0}")]
    Repository(String),

    /// The ledger POST failed; records stay unsynced
    #[error("Ledger flush failed: {0}")]
    Ledger(String),

    /// The ledger rejected the session credentials
    #[error("Ledger rejected session: {0}")]
    Unauthorized(String),

    /// `flush` was called on a journal without a ledger
    #[error("No ledger attached")]
    NoLedger,
}

impl JournalError {
    /// Returns `true` when the failure means the session must be renewed
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, JournalError::Unauthorized(_))
    }
}
