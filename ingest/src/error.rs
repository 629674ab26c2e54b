//! Error types for the ingestion pipeline.
//!
//! Every fatal outcome of an upload maps to one [`IngestError`] variant. The
//! rendered message is shown to the submitter, so each variant names the step
//! that failed and carries enough detail to triage without server access.
//! A failed quality gate is not an error; see
//! [`crate::pipeline::UploadOutcome::Quarantined`].

use crate::extraction::ExtractionError;
use camino::Utf8PathBuf;
use modarchive_common::{Identity, IdentityError, NamingError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Publication step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    /// Moving the module into the staging area or the repository tree.
    Move,
    /// Regenerating the derived JSON metadata.
    ExtractionToJson,
    /// `vcs add`.
    VcsAdd,
    /// `vcs commit`.
    VcsCommit,
    /// `vcs push`.
    VcsPush,
}

impl PublishStage {
    /// Returns the stage name shown to users.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Move => "move",
            Self::ExtractionToJson => "extraction-to-json",
            Self::VcsAdd => "vcs add",
            Self::VcsCommit => "vcs commit",
            Self::VcsPush => "vcs push",
        }
    }
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that end an upload request.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The declared content type is not an accepted archive type.
    #[error("file type not supported: {content_type}")]
    UnsupportedContentType {
        /// The rejected content type.
        content_type: String,
    },

    /// The archive filename does not yield a module name.
    #[error(transparent)]
    Naming(#[from] NamingError),

    /// The submitter name is not a usable identity.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// The archive could not be unpacked.
    #[error("cannot extract {archive}: {source}")]
    Extraction {
        /// Original archive filename.
        archive: String,
        /// Underlying extraction failure.
        #[source]
        source: ExtractionError,
    },

    /// The submitter already has an upload in flight.
    #[error("another upload from {submitter} is in progress, please wait")]
    UploadInProgress {
        /// Submitter whose staging directory is occupied.
        submitter: Identity,
    },

    /// A publication step failed. Earlier steps are not rolled back.
    #[error("publish failed at {stage}: {message}; contact the archive administrators")]
    Publish {
        /// The failing step.
        stage: PublishStage,
        /// Description of the failure.
        message: String,
    },

    /// An external tool could not be started.
    #[error("failed to run {tool}: {message}")]
    Tool {
        /// Program that failed.
        tool: String,
        /// Description of the failure.
        message: String,
    },

    /// An external tool did not exit in time and was killed.
    #[error("{tool} timed out after {} seconds", .timeout.as_secs())]
    ToolTimedOut {
        /// Program that timed out.
        tool: String,
        /// The limit that was exceeded.
        timeout: Duration,
    },

    /// The ownership/search database failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A thread panicked while holding the database connection.
    #[error("database connection lock poisoned: {0}")]
    LockPoisoned(String),

    /// The configuration file could not be read or parsed.
    #[error("invalid configuration at {path}: {reason}")]
    Config {
        /// Path of the configuration file.
        path: Utf8PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to write output.
    #[error("failed to write output")]
    WriteFailed {
        /// The underlying error that caused the write to fail.
        #[source]
        source: std::io::Error,
    },

    /// Test stub received an unexpected or mismatched command invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

impl IngestError {
    /// Builds a [`IngestError::Publish`] for `stage`.
    pub fn publish(stage: PublishStage, message: impl Into<String>) -> Self {
        Self::Publish {
            stage,
            message: message.into(),
        }
    }

    /// Returns the failing publish stage, if this is a publish error.
    #[must_use]
    pub fn publish_stage(&self) -> Option<PublishStage> {
        match self {
            Self::Publish { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type alias using [`IngestError`].
pub type Result<T> = std::result::Result<T, IngestError>;
