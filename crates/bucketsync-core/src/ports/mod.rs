//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IStateRepository`] - Persistent storage for configurations, jobs, file records, journal
//! - [`IRemoteAuthority`] - Manifest listing, bucket accounts, activity ledger
//! - [`ISecretDecryptor`] - Decryption of stored credential values
//! - [`IUrlSigner`] - One-time signed URLs for object storage
//! - [`ITransferExecutor`] - Single-object upload, download and delete
//! - [`IProgressSink`] - Structured progress reporting

pub mod progress_sink;
pub mod remote_authority;
pub mod secret_decryptor;
pub mod state_repository;
pub mod transfer_executor;
pub mod url_signer;

pub use progress_sink::{IProgressSink, NullProgressSink};
pub use remote_authority::IRemoteAuthority;
pub use secret_decryptor::{ISecretDecryptor, PlaintextDecryptor};
pub use state_repository::{ActivityQuery, IStateRepository};
pub use transfer_executor::{DownloadRequest, ITransferExecutor, TransferOutcome, UploadRequest};
pub use url_signer::{IUrlSigner, PresignRequest, SignedOperation};
