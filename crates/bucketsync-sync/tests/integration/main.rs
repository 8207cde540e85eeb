//! Integration tests for bucketsync-sync
//!
//! Runs the real storage adapters against a wiremock server that plays
//! both the authority API and a path-style object store, with state kept
//! in an in-memory SQLite database.

mod common;

mod test_loop_freedom;
mod test_service;
