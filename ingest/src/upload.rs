//! Uploaded archives and the content-type allow-set.

use crate::error::{IngestError, Result};
use modarchive_common::{ModuleName, Submitter};

/// Archive container family, chosen from the declared content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Tar, optionally gzip- or bzip2-compressed.
    Tar,
    /// Zip.
    Zip,
}

impl ArchiveKind {
    /// Maps a declared content type onto an archive family.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::UnsupportedContentType`] for anything outside
    /// the gzip, tar, bzip2 and zip types.
    ///
    /// # Examples
    ///
    /// ```
    /// use modarchive_ingest::upload::ArchiveKind;
    ///
    /// assert_eq!(ArchiveKind::from_content_type("application/zip")?, ArchiveKind::Zip);
    /// assert_eq!(ArchiveKind::from_content_type("application/x-gzip")?, ArchiveKind::Tar);
    /// assert!(ArchiveKind::from_content_type("text/plain").is_err());
    /// # Ok::<(), modarchive_ingest::error::IngestError>(())
    /// ```
    pub fn from_content_type(content_type: &str) -> Result<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/zip" => Ok(Self::Zip),
            "application/x-gzip"
            | "application/gzip"
            | "application/x-tar"
            | "application/x-bzip"
            | "application/x-bzip2" => Ok(Self::Tar),
            _ => Err(IngestError::UnsupportedContentType {
                content_type: content_type.to_owned(),
            }),
        }
    }

    /// Guesses the content type a browser would declare for `filename`.
    ///
    /// Used by the command-line front end when no type is given explicitly.
    #[must_use]
    pub fn guess_content_type(filename: &str) -> Option<&'static str> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some("application/zip")
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some("application/x-gzip")
        } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") {
            Some("application/x-bzip")
        } else if lower.ends_with(".tar") {
            Some("application/x-tar")
        } else {
            None
        }
    }
}

/// An archive as received from a submitter.
#[derive(Clone, Debug)]
pub struct UploadedArchive {
    filename: String,
    content_type: String,
    payload: Vec<u8>,
    submitter: Submitter,
}

impl UploadedArchive {
    /// Bundles an upload.
    #[must_use]
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        payload: Vec<u8>,
        submitter: Submitter,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            payload,
            submitter,
        }
    }

    /// Returns the original filename.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Returns the declared content type.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns the archive bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns who sent the upload.
    #[must_use]
    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    /// Validates the content type.
    ///
    /// # Errors
    ///
    /// See [`ArchiveKind::from_content_type`].
    pub fn kind(&self) -> Result<ArchiveKind> {
        ArchiveKind::from_content_type(&self.content_type)
    }

    /// Derives the module name from the filename.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Naming`] when the filename has no usable prefix.
    pub fn module_name(&self) -> Result<ModuleName> {
        Ok(ModuleName::from_archive_filename(&self.filename)?)
    }

    /// Returns the final path component of the filename, used as the scratch
    /// file name.
    #[must_use]
    pub fn base_filename(&self) -> &str {
        self.filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.filename)
    }
}
