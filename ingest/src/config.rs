//! Archive configuration.
//!
//! All directory roles, external tool locations and mail settings live in a
//! single immutable [`ArchiveConfig`], deserialised from TOML and passed by
//! reference into each component. Missing keys fall back to defaults, unknown
//! keys are rejected so that typos surface immediately.
//!
//! ```toml
//! [paths]
//! scratch = "/srv/archive/tmp"
//! repository = "/srv/archive/repo"
//!
//! [tools]
//! timeout_secs = 120
//! gate = { program = "/usr/local/bin/ccanlint", args = ["-s"] }
//!
//! [mail]
//! from = "archive@example.org"
//! ```

use crate::error::{IngestError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use directories_next::ProjectDirs;
use modarchive_common::ModuleName;
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "MODARCHIVE_CONFIG";

const CONFIG_FILENAME: &str = "config.toml";

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Directory roles.
    pub paths: PathsConfig,
    /// External tool invocations.
    pub tools: ToolsConfig,
    /// Review notification settings.
    pub mail: MailConfig,
    /// Publication behaviour.
    pub publish: PublishConfig,
}

/// Filesystem locations used by the pipeline.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Where uploads are written and unpacked.
    pub scratch: Utf8PathBuf,
    /// Parent of the per-submitter staging directories.
    pub staging: Utf8PathBuf,
    /// Holding area for anonymous uploads.
    pub pending_review: Utf8PathBuf,
    /// Holding area for uploads that fail the quality gate.
    pub junk: Utf8PathBuf,
    /// Version-controlled working tree of the canonical repository.
    pub repository: Utf8PathBuf,
    /// Directory inside the repository that holds modules.
    pub modules_dir: String,
    /// SQLite database holding ownership, search and user tables.
    pub database: Utf8PathBuf,
    /// Module description file inside each module.
    pub info_file: String,
    /// Per-module-name lock files.
    pub locks: Utf8PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            scratch: Utf8PathBuf::from("tmp"),
            staging: Utf8PathBuf::from("staging"),
            pending_review: Utf8PathBuf::from("pending"),
            junk: Utf8PathBuf::from("junkcode"),
            repository: Utf8PathBuf::from("repo"),
            modules_dir: "ccan".to_owned(),
            database: Utf8PathBuf::from("modarchive.db"),
            info_file: "_info.c".to_owned(),
            locks: Utf8PathBuf::from("locks"),
        }
    }
}

impl PathsConfig {
    /// Returns the default layout with every directory below `root`.
    #[must_use]
    pub fn under(root: &Utf8Path) -> Self {
        let defaults = Self::default();
        Self {
            scratch: root.join(&defaults.scratch),
            staging: root.join(&defaults.staging),
            pending_review: root.join(&defaults.pending_review),
            junk: root.join(&defaults.junk),
            repository: root.join(&defaults.repository),
            database: root.join(&defaults.database),
            locks: root.join(&defaults.locks),
            ..defaults
        }
    }

    /// Returns the repository-relative path of a module, which is also the
    /// ownership registry key.
    #[must_use]
    pub fn module_key(&self, name: &ModuleName) -> String {
        format!("{}/{name}", self.modules_dir)
    }

    /// Returns the absolute location of a module in the canonical tree.
    #[must_use]
    pub fn module_dir(&self, name: &ModuleName) -> Utf8PathBuf {
        self.repository.join(&self.modules_dir).join(name.as_str())
    }
}

/// A program plus leading arguments.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ToolCommand {
    /// Program to execute, looked up on `PATH` when relative.
    pub program: String,
    /// Arguments placed before the per-call arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Creates a command without leading arguments.
    #[must_use]
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_owned(),
            args: Vec::new(),
        }
    }

    /// Returns the leading arguments followed by `extra`.
    #[must_use]
    pub fn args_with<'a>(&'a self, extra: &[&'a str]) -> Vec<&'a str> {
        self.args
            .iter()
            .map(String::as_str)
            .chain(extra.iter().copied())
            .collect()
    }
}

/// External tools.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    /// Upper bound on every external command, in seconds.
    pub timeout_secs: u64,
    /// Quality gate; receives the staged module path.
    pub gate: ToolCommand,
    /// Dependency lister used for module descriptions.
    pub metadata_extract: ToolCommand,
    /// JSON metadata regenerator.
    pub regenerator: ToolCommand,
    /// Version control.
    pub vcs: VcsConfig,
    /// Mail transfer agent reading a message on stdin.
    pub sendmail: ToolCommand,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            gate: ToolCommand::new("ccanlint"),
            metadata_extract: ToolCommand::new("ccan_depends"),
            regenerator: ToolCommand::new("infotojson"),
            vcs: VcsConfig::default(),
            sendmail: ToolCommand {
                program: "sendmail".to_owned(),
                args: vec!["-t".to_owned()],
            },
        }
    }
}

impl ToolsConfig {
    /// Returns the per-command timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Version-control argument vectors, run inside the repository tree.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct VcsConfig {
    /// VCS program.
    pub program: String,
    /// Arguments staging every change in the tree.
    pub add_args: Vec<String>,
    /// Arguments preceding the commit message.
    pub commit_args: Vec<String>,
    /// Arguments propagating the commit upstream.
    pub push_args: Vec<String>,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            program: "git".to_owned(),
            add_args: vec!["add".to_owned(), "--all".to_owned()],
            commit_args: vec![
                "commit".to_owned(),
                "--allow-empty".to_owned(),
                "-m".to_owned(),
            ],
            push_args: vec!["push".to_owned()],
        }
    }
}

/// Review notification settings.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MailConfig {
    /// Sender address.
    pub from: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "modarchive@localhost".to_owned(),
        }
    }
}

/// Publication behaviour.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    /// Serialise publication of the same final module name across
    /// submitters with an advisory file lock.
    pub lock_module_names: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            lock_module_names: true,
        }
    }
}

impl ArchiveConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] when the text is not valid TOML or
    /// contains unknown keys.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use modarchive_ingest::config::ArchiveConfig;
    ///
    /// let config = ArchiveConfig::from_toml_str(
    ///     "[paths]\nrepository = \"/srv/repo\"\n",
    ///     Utf8Path::new("inline.toml"),
    /// )?;
    /// assert_eq!(config.paths.repository, "/srv/repo");
    /// assert_eq!(config.paths.modules_dir, "ccan");
    /// # Ok::<(), modarchive_ingest::error::IngestError>(())
    /// ```
    pub fn from_toml_str(contents: &str, origin: &Utf8Path) -> Result<Self> {
        toml::from_str(contents).map_err(|e| IngestError::Config {
            path: origin.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] when the file cannot be read or parsed.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| IngestError::Config {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents, path)
    }

    /// Loads configuration from the first available source: `explicit`, then
    /// [`CONFIG_ENV_VAR`], then the platform configuration directory.
    ///
    /// Explicit and environment paths must exist. A missing file in the
    /// platform directory yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] when a required file is missing or any
    /// file fails to parse.
    pub fn resolve(explicit: Option<&Utf8Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            let path = Utf8PathBuf::try_from(std::path::PathBuf::from(path)).map_err(|e| {
                IngestError::Config {
                    path: Utf8PathBuf::from(CONFIG_ENV_VAR),
                    reason: e.to_string(),
                }
            })?;
            return Self::load(&path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                log::debug!("no configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Returns `<platform config dir>/modarchive/config.toml`, if the platform
/// exposes a configuration directory.
#[must_use]
pub fn default_config_path() -> Option<Utf8PathBuf> {
    ProjectDirs::from("org", "modarchive", "modarchive")
        .and_then(|dirs| Utf8PathBuf::try_from(dirs.config_dir().to_path_buf()).ok())
        .map(|dir| dir.join(CONFIG_FILENAME))
}
