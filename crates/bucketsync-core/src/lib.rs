//! BucketSync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncConfiguration`, `Mapping`, `SyncJob`, `FileRecord`, `ActivityRecord`
//! - **Port definitions** - Traits for adapters: `IStateRepository`, `IRemoteAuthority`,
//!   `IUrlSigner`, `ISecretDecryptor`, `ITransferExecutor`, `IProgressSink`
//! - **Configuration** - YAML configuration loading and validation
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external dependencies.
//! Ports define trait interfaces that adapter crates implement; the sync
//! crate orchestrates domain entities through them.

pub mod config;
pub mod domain;
pub mod ports;
