//! Archive extraction into the scratch area.
//!
//! Unpacks `.tar`, `.tar.gz`, `.tar.bz2` and `.zip` uploads with path
//! traversal protection to prevent zip-slip attacks. The extracted module
//! is handed on as a [`StagedModule`], which removes its scratch directory
//! when dropped so nothing outlives a pipeline run.
//!
//! Every run works in its own directory: `users/<identity>` for
//! authenticated uploads, which the submitter guard serialises, and a
//! freshly claimed `anonymous/<slot>` otherwise.

use crate::error::{IngestError, Result};
use crate::upload::{ArchiveKind, UploadedArchive};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, warn};
use modarchive_common::{ModuleName, Submitter};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";

/// Trait for extracting uploads, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Unpacks `upload` and returns the staged module.
    ///
    /// The content type and module name are validated before anything is
    /// written, so input rejections leave the filesystem untouched.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::UnsupportedContentType`] or
    /// [`IngestError::Naming`] for invalid input, and
    /// [`IngestError::Extraction`] when the archive cannot be unpacked.
    fn extract(&self, upload: &UploadedArchive) -> Result<StagedModule>;
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction, including corrupt compressed data.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The zip container is malformed.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive contains no entries.
    #[error("archive contains no files")]
    EmptyArchive,
}

/// A freshly extracted module awaiting a verdict.
///
/// Owns its working directory under scratch; dropping the value removes
/// whatever is still there.
#[derive(Debug)]
pub struct StagedModule {
    name: ModuleName,
    path: Utf8PathBuf,
    unpack_root: Utf8PathBuf,
    workdir: Utf8PathBuf,
}

impl StagedModule {
    /// Takes ownership of an unpacked directory.
    ///
    /// If `unpack_root` holds exactly one directory and nothing else, that
    /// directory is the module root (the usual `alloc/…` tarball layout);
    /// otherwise the unpack directory itself is.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be listed.
    pub fn adopt(name: ModuleName, unpack_root: Utf8PathBuf) -> io::Result<Self> {
        let mut staged = Self::unlocated(name, unpack_root.clone(), unpack_root);
        staged.locate_root()?;
        Ok(staged)
    }

    fn unlocated(name: ModuleName, unpack_root: Utf8PathBuf, workdir: Utf8PathBuf) -> Self {
        Self {
            name,
            path: unpack_root.clone(),
            unpack_root,
            workdir,
        }
    }

    fn locate_root(&mut self) -> io::Result<()> {
        let entries = fs::read_dir(&self.unpack_root)?.collect::<io::Result<Vec<_>>>()?;
        let [only] = entries.as_slice() else {
            return Ok(());
        };
        if only.file_type()?.is_dir() {
            if let Ok(path) = Utf8PathBuf::try_from(only.path()) {
                self.path = path;
            }
        }
        Ok(())
    }

    /// Returns the module name derived from the archive filename.
    #[must_use]
    pub fn name(&self) -> &ModuleName {
        &self.name
    }

    /// Returns the module root inside scratch.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Moves the module to `dest`, replacing anything already there.
    ///
    /// This is a rename, not a copy: `dest` must be on the same filesystem
    /// as the scratch directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the old destination cannot be removed or the
    /// rename fails. On failure the module stays in scratch and is removed
    /// when `self` drops.
    pub fn relocate_to(self, dest: &Utf8Path) -> io::Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if dest.exists() {
            debug!("overwriting {dest}");
            fs::remove_dir_all(dest)?;
        }
        fs::rename(&self.path, dest)
    }
}

impl Drop for StagedModule {
    fn drop(&mut self) {
        if self.workdir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.workdir) {
                warn!("failed to clean scratch directory {}: {e}", self.workdir);
            }
        }
    }
}

/// Removes the uploaded archive from scratch on every exit path.
struct ScratchFile(Utf8PathBuf);

impl ScratchFile {
    fn write(path: Utf8PathBuf, bytes: &[u8]) -> io::Result<Self> {
        fs::write(&path, bytes)?;
        Ok(Self(path))
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.0) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                warn!("failed to remove uploaded archive {}: {e}", self.0);
            }
            _ => {}
        }
    }
}

/// Claims a working directory for one run under `scratch`.
///
/// An authenticated submitter always gets `users/<identity>`, clearing
/// whatever a crashed earlier run left there. Anonymous runs take the first
/// `anonymous/<slot>` that `create_dir` can create, so concurrent runs never
/// share a directory.
fn claim_workdir(scratch: &Utf8Path, submitter: &Submitter) -> io::Result<Utf8PathBuf> {
    if let Some(identity) = submitter.identity() {
        let dir = scratch.join("users").join(identity.as_str());
        if dir.exists() {
            warn!("removing stale scratch directory {dir}");
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        return Ok(dir);
    }

    let slots = scratch.join("anonymous");
    fs::create_dir_all(&slots)?;
    for slot in 0_u32.. {
        let dir = slots.join(slot.to_string());
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                debug!("scratch slot {dir} is taken");
            }
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::other("no free anonymous scratch slot"))
}

/// Extractor writing into a scratch directory.
#[derive(Debug, Clone)]
pub struct ScratchExtractor {
    scratch: Utf8PathBuf,
}

impl ScratchExtractor {
    /// Creates an extractor rooted at `scratch`.
    #[must_use]
    pub fn new(scratch: impl Into<Utf8PathBuf>) -> Self {
        Self {
            scratch: scratch.into(),
        }
    }
}

impl ArchiveExtractor for ScratchExtractor {
    fn extract(&self, upload: &UploadedArchive) -> Result<StagedModule> {
        let kind = upload.kind()?;
        let name = upload.module_name()?;

        let workdir = claim_workdir(&self.scratch, upload.submitter())?;
        let unpack_root = workdir.join(name.as_str());
        let mut staged = StagedModule::unlocated(name, unpack_root, workdir);
        fs::create_dir_all(&staged.unpack_root)?;
        let archive = ScratchFile::write(
            staged.workdir.join(upload.base_filename()),
            upload.payload(),
        )?;

        let dest = staged.unpack_root.as_std_path();
        let count = match kind {
            ArchiveKind::Zip => unpack_zip(archive.0.as_std_path(), dest),
            ArchiveKind::Tar => unpack_tar(archive.0.as_std_path(), dest),
        }
        .map_err(|source| IngestError::Extraction {
            archive: upload.filename().to_owned(),
            source,
        })?;
        staged.locate_root()?;

        debug!("extracted {count} entries for {}", staged.name());
        Ok(staged)
    }
}

/// Unpacks a tar archive, transparently decompressing gzip or bzip2 input.
///
/// Returns the number of entries written.
fn unpack_tar(archive_path: &Path, dest_dir: &Path) -> std::result::Result<usize, ExtractionError> {
    let mut file = File::open(archive_path)?;
    let mut magic = [0_u8; 3];
    let read = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;
    let head = magic.get(..read).unwrap_or_default();

    let reader = BufReader::new(file);
    let decoder: Box<dyn Read> = if head.starts_with(GZIP_MAGIC) {
        Box::new(flate2::read::GzDecoder::new(reader))
    } else if head.starts_with(BZIP2_MAGIC) {
        Box::new(bzip2::read::BzDecoder::new(reader))
    } else {
        Box::new(reader)
    };

    let mut archive = tar::Archive::new(decoder);
    let mut count = 0;
    for entry_result in archive.entries()? {
        let mut entry = entry_result?;
        let entry_path = entry.path()?.into_owned();

        validate_entry_path(&entry_path)?;
        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            validate_link_target(&entry_path, entry.link_name()?.as_deref())?;
        }

        // `unpack_in` refuses entries whose parent resolves outside
        // `dest_dir`, which catches writes through an earlier symlink.
        if !entry.unpack_in(dest_dir)? {
            return Err(ExtractionError::PathTraversal {
                path: entry_path.display().to_string(),
            });
        }
        count += 1;
    }

    if count == 0 {
        return Err(ExtractionError::EmptyArchive);
    }
    Ok(count)
}

/// Unpacks a zip archive. Returns the number of entries written.
fn unpack_zip(archive_path: &Path, dest_dir: &Path) -> std::result::Result<usize, ExtractionError> {
    let mut archive = zip::ZipArchive::new(BufReader::new(File::open(archive_path)?))?;
    if archive.is_empty() {
        return Err(ExtractionError::EmptyArchive);
    }

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(ExtractionError::PathTraversal {
                path: entry.name().to_owned(),
            });
        };
        validate_entry_path(&relative)?;

        let dest_path = dest_dir.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest_path)?;
        io::copy(&mut entry, &mut out)?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode & 0o777))?;
        }
    }
    Ok(archive.len())
}

/// Validate that an entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> std::result::Result<(), ExtractionError> {
    if path.is_absolute() || path.has_root() {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    for component in path.components() {
        if matches!(component, Component::ParentDir | Component::Prefix(_)) {
            return Err(ExtractionError::PathTraversal {
                path: path.display().to_string(),
            });
        }
    }
    Ok(())
}

/// Link entries may only point at relative targets that stay below the
/// link's own directory tree.
fn validate_link_target(
    entry_path: &Path,
    target: Option<&Path>,
) -> std::result::Result<(), ExtractionError> {
    let escapes = target.is_none_or(|target| {
        target.is_absolute()
            || target.has_root()
            || target
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    });
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: format!(
                "{} -> {}",
                entry_path.display(),
                target.map_or_else(String::new, |t| t.display().to_string())
            ),
        });
    }
    Ok(())
}
