//! CLI argument definitions for the archive ingest tool.
//!
//! The web front end hands each upload to `modarchive-ingest upload`; the
//! other subcommands serve operators.

use crate::upload::ArchiveKind;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Ingest module archives into the code archive.
#[derive(Parser, Debug)]
#[command(name = "modarchive-ingest")]
#[command(version, about)]
#[command(long_about = concat!(
    "Ingest module archives into the code archive.\n\n",
    "An upload is unpacked, scored by the quality gate and then published into ",
    "the version-controlled repository, parked under junk when it fails the ",
    "gate, or held for administrator review when the submitter is anonymous.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Publish an upload for a logged-in submitter:\n",
    "    $ modarchive-ingest upload alloc.tar.gz --submitter rusty\n\n",
    "  Route an anonymous upload for review:\n",
    "    $ modarchive-ingest upload alloc.zip\n\n",
    "  Show a published module:\n",
    "    $ modarchive-ingest describe alloc\n\n",
    "CONFIGURATION:\n",
    "  --config, then MODARCHIVE_CONFIG, then the platform config directory.",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file [default: platform-specific].
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true,
        conflicts_with = "quiet"
    )]
    pub verbosity: u8,

    /// Only print errors.
    #[arg(short, long, global = true, conflicts_with = "verbosity")]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Process one uploaded archive.
    Upload(UploadArgs),

    /// Describe a published module.
    Describe(DescribeArgs),

    /// Create the database tables if they are missing.
    InitDb,
}

/// Arguments for the upload command.
#[derive(Parser, Debug, Clone)]
pub struct UploadArgs {
    /// Archive to ingest.
    #[arg(value_name = "ARCHIVE")]
    pub archive: Utf8PathBuf,

    /// Authenticated submitter; omit for anonymous uploads.
    #[arg(short, long, value_name = "USER")]
    pub submitter: Option<String>,

    /// Declared content type [default: guessed from the file name].
    #[arg(long, value_name = "MIME")]
    pub content_type: Option<String>,

    /// File name as sent by the browser [default: the archive's name].
    #[arg(long, value_name = "NAME")]
    pub filename: Option<String>,
}

impl UploadArgs {
    /// Returns the file name the upload is processed under.
    #[must_use]
    pub fn effective_filename(&self) -> String {
        self.filename.clone().unwrap_or_else(|| {
            self.archive
                .file_name()
                .unwrap_or(self.archive.as_str())
                .to_owned()
        })
    }

    /// Returns the declared content type, guessing from the file name when
    /// none was given. An unguessable name yields an empty type, which the
    /// pipeline rejects.
    #[must_use]
    pub fn effective_content_type(&self) -> String {
        self.content_type.clone().unwrap_or_else(|| {
            ArchiveKind::guess_content_type(&self.effective_filename())
                .unwrap_or_default()
                .to_owned()
        })
    }
}

/// Arguments for the describe command.
#[derive(Parser, Debug, Clone)]
pub struct DescribeArgs {
    /// Module name under the modules directory.
    #[arg(value_name = "MODULE")]
    pub module: String,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
