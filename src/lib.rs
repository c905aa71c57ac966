//! hashsync - incremental deploys over SSH.
//!
//! [`deploy::SyncSession`] pushes a local build tree to a remote directory,
//! comparing content hashes rather than timestamps and never deleting
//! remote-only files. [`cleanup::CleanupSession`] recursively removes a
//! remote tree while keeping a set of preserved top-level entries. Both run
//! over any [`remote::RemoteFs`].

pub mod cleanup;
pub mod config;
pub mod deploy;
pub mod error;
pub mod path;
pub mod remote;
pub mod report;
pub mod scan;

pub use error::{Result, SyncError};
