//! Module archive ingestion library.
//!
//! This crate implements the upload pipeline of the code-module archive:
//! uploaded archives are unpacked, scored by an external quality gate and
//! then published into the version-controlled repository, quarantined, or
//! held for administrator review. It is used by the `modarchive-ingest` CLI
//! binary and can be driven programmatically from tests or other front ends.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Immutable archive configuration loaded from TOML
//! - [`error`] - Semantic error types naming the failing step
//! - [`executor`] - External command execution with timeouts
//! - [`extraction`] - Archive unpacking into the scratch area
//! - [`gate`] - Quality gate invocation and verdicts
//! - [`guard`] - Per-submitter in-flight upload guard
//! - [`indexer`] - Search-index maintenance
//! - [`mail`] - Administrator notifications
//! - [`metadata`] - Dependency listing and JSON regeneration
//! - [`notifier`] - Review routing for anonymous uploads
//! - [`output`] - User-facing messages
//! - [`pipeline`] - Upload pipeline orchestration
//! - [`publisher`] - Repository publication and quarantine
//! - [`resolver`] - Naming-conflict resolution
//! - [`store`] - Ownership registry, search index and identity lookup
//! - [`upload`] - Uploaded archives and accepted content types

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod extraction;
pub mod gate;
pub mod guard;
pub mod indexer;
pub mod mail;
pub mod metadata;
pub mod notifier;
pub mod output;
pub mod pipeline;
pub mod publisher;
pub mod resolver;
pub mod store;
pub mod upload;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
