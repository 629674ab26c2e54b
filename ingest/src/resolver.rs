//! Naming-conflict resolution.
//!
//! Uploads are never blocked by an ownership conflict. A name owned by
//! someone else is published under `<name>-<identity>` instead.

use crate::config::PathsConfig;
use crate::error::Result;
use crate::store::{OwnershipRecord, OwnershipRegistry};
use log::debug;
use modarchive_common::{Identity, ModuleName};

/// Where an accepted module will be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing exists at the uploaded name; the submitter becomes its owner
    /// once publishing succeeds.
    Fresh {
        /// Uploaded (and final) name.
        name: ModuleName,
        /// Ownership row to commit after a successful publish.
        record: OwnershipRecord,
    },
    /// The submitter already owns the name and may overwrite it.
    SelfOwned {
        /// Uploaded (and final) name.
        name: ModuleName,
        /// Repository-relative path, for messages.
        module_path: String,
    },
    /// Someone else owns the name (or nobody claims an existing entry).
    ForeignOwned {
        /// Name as uploaded.
        original: ModuleName,
        /// Disambiguated name, `<original>-<identity>`.
        renamed: ModuleName,
        /// Repository-relative path of the original entry.
        module_path: String,
        /// Whether the disambiguated name is already taken and will be
        /// overwritten.
        composite_exists: bool,
    },
}

impl Resolution {
    /// Returns the name the module is published under.
    #[must_use]
    pub const fn final_name(&self) -> &ModuleName {
        match self {
            Self::Fresh { name, .. } | Self::SelfOwned { name, .. } => name,
            Self::ForeignOwned { renamed, .. } => renamed,
        }
    }

    /// Returns the ownership row a successful publish should commit.
    #[must_use]
    pub const fn pending_record(&self) -> Option<&OwnershipRecord> {
        match self {
            Self::Fresh { record, .. } => Some(record),
            Self::SelfOwned { .. } | Self::ForeignOwned { .. } => None,
        }
    }

    /// Returns the message shown to the submitter, if the outcome warrants
    /// one.
    #[must_use]
    pub fn describe(&self, modules_dir: &str) -> Option<String> {
        match self {
            Self::Fresh { .. } => None,
            Self::SelfOwned { module_path, .. } => Some(format!(
                "{module_path} already exists (uploaded by you). Overwriting {module_path}"
            )),
            Self::ForeignOwned {
                renamed,
                module_path,
                composite_exists: false,
                ..
            } => Some(format!(
                "{module_path} already exists. Renaming to {renamed}"
            )),
            Self::ForeignOwned {
                renamed,
                composite_exists: true,
                ..
            } => Some(format!(
                "{modules_dir}/{renamed} already exists. Overwriting {renamed}"
            )),
        }
    }
}

/// Decides final module names from repository state and the ownership
/// registry.
pub struct ConflictResolver<'a, R: OwnershipRegistry> {
    paths: &'a PathsConfig,
    registry: &'a R,
}

impl<'a, R: OwnershipRegistry> ConflictResolver<'a, R> {
    /// Creates a resolver reading `registry` and the repository under
    /// `paths`.
    #[must_use]
    pub const fn new(paths: &'a PathsConfig, registry: &'a R) -> Self {
        Self { paths, registry }
    }

    /// Resolves the final name for `name` uploaded by `submitter`.
    ///
    /// Only reads; the ownership row of a [`Resolution::Fresh`] outcome is
    /// written by the publisher.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::IngestError::Database`] when the registry
    /// cannot be queried.
    pub fn resolve(&self, name: &ModuleName, submitter: &Identity) -> Result<Resolution> {
        let module_path = self.paths.module_key(name);
        let owner = self.registry.owner_of(&module_path)?;
        let entry_exists = self.paths.module_dir(name).exists();

        let resolution = match owner {
            None if !entry_exists => Resolution::Fresh {
                name: name.clone(),
                record: OwnershipRecord {
                    module_path,
                    owner: submitter.clone(),
                },
            },
            Some(owner) if owner == submitter.as_str() => Resolution::SelfOwned {
                name: name.clone(),
                module_path,
            },
            _ => {
                let renamed = name.with_suffix(submitter.as_str());
                let composite_exists = self.paths.module_dir(&renamed).exists();
                Resolution::ForeignOwned {
                    original: name.clone(),
                    renamed,
                    module_path,
                    composite_exists,
                }
            }
        };

        debug!("resolved {name} for {submitter}: {resolution:?}");
        Ok(resolution)
    }
}
