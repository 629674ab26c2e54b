//! Publication into the canonical repository and quarantine into junk.
//!
//! Publishing is two-phase. The module is first assembled in the
//! submitter's staging directory, where the JSON description is
//! regenerated. Only then is it swapped into the repository tree, with the
//! previous content kept aside until the swap succeeds. Version control runs
//! last; a failing `add`, `commit` or `push` leaves the swapped module in
//! place for an operator to follow up.

use crate::config::ArchiveConfig;
use crate::error::{IngestError, PublishStage, Result};
use crate::executor::{CommandExecutor, CommandRequest, failure_message};
use crate::extraction::StagedModule;
use crate::metadata::MetadataExtractor;
use crate::resolver::Resolution;
use crate::store::OwnershipRegistry;
use camino::{Utf8Path, Utf8PathBuf};
use fs2::FileExt;
use log::{debug, info, warn};
use modarchive_common::{Identity, ModuleName};
use std::fs::{self, File, OpenOptions};

/// A module swapped into the repository and committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedModule {
    name: ModuleName,
    path: Utf8PathBuf,
}

impl PublishedModule {
    /// Describes a module already present at `path`.
    #[must_use]
    pub fn new(name: ModuleName, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name,
            path: path.into(),
        }
    }

    /// Returns the final name.
    #[must_use]
    pub const fn name(&self) -> &ModuleName {
        &self.name
    }

    /// Returns the module directory inside the repository.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// A module that failed the gate, parked under junk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JunkEntry {
    name: ModuleName,
    path: Utf8PathBuf,
}

impl JunkEntry {
    /// Describes a junk entry already present at `path`.
    #[must_use]
    pub fn new(name: ModuleName, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name,
            path: path.into(),
        }
    }

    /// Returns the junk entry name, `<module>-<identity>`.
    #[must_use]
    pub const fn name(&self) -> &ModuleName {
        &self.name
    }

    /// Returns the junk entry directory.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

/// Moves staged modules into the repository or into junk.
pub struct RepositoryPublisher<'a, E: CommandExecutor, R: OwnershipRegistry> {
    config: &'a ArchiveConfig,
    executor: &'a E,
    registry: &'a R,
}

impl<'a, E: CommandExecutor, R: OwnershipRegistry> RepositoryPublisher<'a, E, R> {
    /// Creates a publisher.
    #[must_use]
    pub const fn new(config: &'a ArchiveConfig, executor: &'a E, registry: &'a R) -> Self {
        Self {
            config,
            executor,
            registry,
        }
    }

    /// Publishes an accepted module under its resolved name.
    ///
    /// The caller must hold the submitter's staging guard, and the gate must
    /// have passed.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Publish`] naming the failing stage. A failure
    /// before the swap leaves the repository tree untouched; after the swap
    /// the new content stays in place. The ownership row of a
    /// [`Resolution::Fresh`] outcome is written only once the commit has
    /// succeeded.
    pub fn publish(
        &self,
        staged: StagedModule,
        resolution: &Resolution,
        submitter: &Identity,
    ) -> Result<PublishedModule> {
        let paths = &self.config.paths;
        let name = resolution.final_name();
        let relative = Utf8PathBuf::from(&paths.modules_dir).join(name.as_str());
        let staging_dir = paths.staging.join(submitter.as_str());
        let assembled = staging_dir.join(&relative);

        let _lock = self.lock_module(name)?;

        debug!("assembling {name} in {staging_dir}");
        staged
            .relocate_to(&assembled)
            .map_err(|e| IngestError::publish(PublishStage::Move, e.to_string()))?;

        let database = absolute(&paths.database)
            .map_err(|e| IngestError::publish(PublishStage::ExtractionToJson, e.to_string()))?;
        MetadataExtractor::new(self.executor, &self.config.tools).regenerate(
            &staging_dir,
            &relative,
            name,
            &paths.info_file,
            submitter,
            &database,
        )?;

        let dest = paths.module_dir(name);
        swap_into_place(&assembled, &dest, &staging_dir.join("previous"))
            .map_err(|e| IngestError::publish(PublishStage::Move, e.to_string()))?;
        info!("{name} swapped into {dest}");

        let vcs = &self.config.tools.vcs;
        let message = format!("web upload of {name} by {submitter}");
        self.vcs(PublishStage::VcsAdd, &vcs.add_args, &[relative.as_str()])?;
        self.vcs(PublishStage::VcsCommit, &vcs.commit_args, &[message.as_str()])?;

        if let Some(record) = resolution.pending_record() {
            self.registry.record(record)?;
            debug!("recorded {} as owner of {}", record.owner, record.module_path);
        }

        self.vcs(PublishStage::VcsPush, &vcs.push_args, &[])?;
        info!("published {name} for {submitter}");

        Ok(PublishedModule {
            name: name.clone(),
            path: dest,
        })
    }

    /// Parks a module that failed the gate under `<junk>/<name>-<identity>`,
    /// replacing any earlier entry of that name.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Io`] if the move fails.
    pub fn quarantine(&self, staged: StagedModule, submitter: &Identity) -> Result<JunkEntry> {
        let name = staged.name().with_suffix(submitter.as_str());
        let path = self.config.paths.junk.join(name.as_str());
        staged.relocate_to(&path)?;
        info!("quarantined {name} at {path}");
        Ok(JunkEntry { name, path })
    }

    fn vcs(&self, stage: PublishStage, base: &[String], extra: &[&str]) -> Result<()> {
        let vcs = &self.config.tools.vcs;
        let args: Vec<&str> = base
            .iter()
            .map(String::as_str)
            .chain(extra.iter().copied())
            .collect();
        let request = CommandRequest::new(&vcs.program, &args).in_dir(&self.config.paths.repository);

        let output = self
            .executor
            .run(&request)
            .map_err(|e| IngestError::publish(stage, e.to_string()))?;
        if !output.status.success() {
            return Err(IngestError::publish(stage, failure_message(&output)));
        }
        debug!("{stage} succeeded");
        Ok(())
    }

    /// Serialises publication of one final name across submitters. The lock
    /// is released when the returned file is closed.
    fn lock_module(&self, name: &ModuleName) -> Result<Option<File>> {
        if !self.config.publish.lock_module_names {
            return Ok(None);
        }
        let locks = &self.config.paths.locks;
        fs::create_dir_all(locks)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(locks.join(format!("{name}.lock")))?;
        file.lock_exclusive()?;
        debug!("locked module name {name}");
        Ok(Some(file))
    }
}

/// Replaces `dest` with `assembled`, keeping the old content at `backup`
/// until the rename has succeeded.
fn swap_into_place(assembled: &Utf8Path, dest: &Utf8Path, backup: &Utf8Path) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let had_previous = dest.exists();
    if had_previous {
        if backup.exists() {
            fs::remove_dir_all(backup)?;
        }
        if let Some(parent) = backup.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(dest, backup)?;
        debug!("moved previous {dest} aside");
    }

    if let Err(e) = fs::rename(assembled, dest) {
        if had_previous {
            if let Err(restore) = fs::rename(backup, dest) {
                warn!("failed to restore {dest} from {backup}: {restore}");
            }
        }
        return Err(e);
    }

    if had_previous {
        if let Err(e) = fs::remove_dir_all(backup) {
            warn!("failed to remove previous content at {backup}: {e}");
        }
    }
    Ok(())
}

fn absolute(path: &Utf8Path) -> std::io::Result<Utf8PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_owned());
    }
    let cwd = Utf8PathBuf::try_from(std::env::current_dir()?)
        .map_err(camino::FromPathBufError::into_io_error)?;
    Ok(cwd.join(path))
}
