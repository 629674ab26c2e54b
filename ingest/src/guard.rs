//! Per-submitter in-flight upload guard.
//!
//! Each authenticated submitter owns one directory under the staging root.
//! Its presence means an upload is in flight; a second request from the same
//! submitter is turned away until the first finishes.

use crate::error::{IngestError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use modarchive_common::Identity;
use std::fs;
use std::io;

/// Holds a submitter's staging directory for the duration of one upload.
///
/// The directory is removed, with anything left inside it, when the guard
/// drops.
#[derive(Debug)]
pub struct SubmitterGuard {
    submitter: Identity,
    dir: Utf8PathBuf,
}

impl SubmitterGuard {
    /// Claims `<staging_root>/<submitter>/`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::UploadInProgress`] if the directory already
    /// exists, leaving it untouched, or [`IngestError::Io`] if it cannot be
    /// created.
    pub fn acquire(staging_root: &Utf8Path, submitter: &Identity) -> Result<Self> {
        fs::create_dir_all(staging_root)?;
        let dir = staging_root.join(submitter.as_str());
        match fs::create_dir(&dir) {
            Ok(()) => {
                debug!("claimed staging directory {dir}");
                Ok(Self {
                    submitter: submitter.clone(),
                    dir,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(IngestError::UploadInProgress {
                    submitter: submitter.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the claimed directory.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Returns the submitter holding the guard.
    #[must_use]
    pub const fn submitter(&self) -> &Identity {
        &self.submitter
    }
}

impl Drop for SubmitterGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            warn!("failed to release staging directory {}: {e}", self.dir);
        }
    }
}
