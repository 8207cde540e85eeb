//! Integration tests for bucketsync-storage
//!
//! Uses wiremock to simulate the authority API and an S3-compatible object
//! store, and verifies end-to-end behavior of manifest paging, account
//! lookup, ledger posting, uploads, downloads and deletes.

mod common;

mod test_authority;
mod test_transfers;
