//! Module metadata: dependency listing, description parsing and JSON
//! regeneration.

use crate::config::ToolsConfig;
use crate::error::{IngestError, PublishStage, Result};
use crate::executor::{CommandExecutor, CommandRequest, failure_message, output_lines};
use camino::Utf8Path;
use log::{debug, warn};
use modarchive_common::{Identity, ModuleInfo, ModuleName, html};

/// Dependencies reported by the metadata extractor, HTML-escaped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDependencies {
    /// Modules from the archive used directly.
    pub direct: Vec<String>,
    /// Libraries from outside the archive needed to compile.
    pub external: Vec<String>,
}

/// Everything shown when describing a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescription {
    /// Parsed description block, if the description file is usable.
    pub info: Option<ModuleInfo>,
    /// Dependency lists.
    pub dependencies: ModuleDependencies,
}

/// Runs the metadata extractor and the JSON regenerator.
pub struct MetadataExtractor<'a, E: CommandExecutor> {
    executor: &'a E,
    tools: &'a ToolsConfig,
}

impl<'a, E: CommandExecutor> MetadataExtractor<'a, E> {
    /// Creates an extractor using the configured tools.
    #[must_use]
    pub const fn new(executor: &'a E, tools: &'a ToolsConfig) -> Self {
        Self { executor, tools }
    }

    /// Lists the direct and external dependencies of the module at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Tool`] if the extractor fails or cannot be
    /// started, and [`IngestError::ToolTimedOut`] if it hangs.
    pub fn dependencies(&self, path: &Utf8Path) -> Result<ModuleDependencies> {
        Ok(ModuleDependencies {
            direct: self.escaped_lines(&["--direct", path.as_str()])?,
            external: self.escaped_lines(&["--compile", "--non-ccan", path.as_str()])?,
        })
    }

    fn escaped_lines(&self, extra: &[&str]) -> Result<Vec<String>> {
        let command = &self.tools.metadata_extract;
        let args = command.args_with(extra);
        let output = self
            .executor
            .run(&CommandRequest::new(&command.program, &args))?;
        if !output.status.success() {
            return Err(IngestError::Tool {
                tool: command.program.clone(),
                message: failure_message(&output),
            });
        }
        Ok(output_lines(&output.stdout)
            .iter()
            .map(|line| html::escape(line))
            .collect())
    }

    /// Reads the description file and the dependency lists of the module at
    /// `path`.
    ///
    /// An unreadable or malformed description file is reported as
    /// `info: None` rather than an error.
    ///
    /// # Errors
    ///
    /// See [`Self::dependencies`].
    pub fn describe(&self, path: &Utf8Path, info_file: &str) -> Result<ModuleDescription> {
        Ok(ModuleDescription {
            info: read_module_info(&path.join(info_file)),
            dependencies: self.dependencies(path)?,
        })
    }

    /// Regenerates the JSON description of a module.
    ///
    /// Runs from `working_dir` with `relative` naming the module directory
    /// inside it, writing `<relative>/json_<name>`.
    ///
    /// # Errors
    ///
    /// Returns a publish error at [`PublishStage::ExtractionToJson`] if the
    /// regenerator fails, times out or cannot be started.
    pub fn regenerate(
        &self,
        working_dir: &Utf8Path,
        relative: &Utf8Path,
        name: &ModuleName,
        info_file: &str,
        submitter: &Identity,
        database: &Utf8Path,
    ) -> Result<()> {
        let info = relative.join(info_file);
        let json = relative.join(format!("json_{name}"));
        let command = &self.tools.regenerator;
        let args = command.args_with(&[
            relative.as_str(),
            info.as_str(),
            json.as_str(),
            submitter.as_str(),
            database.as_str(),
        ]);
        let request = CommandRequest::new(&command.program, &args).in_dir(working_dir);

        let output = self
            .executor
            .run(&request)
            .map_err(|e| IngestError::publish(PublishStage::ExtractionToJson, e.to_string()))?;
        if !output.status.success() {
            return Err(IngestError::publish(
                PublishStage::ExtractionToJson,
                failure_message(&output),
            ));
        }
        debug!("regenerated {json}");
        Ok(())
    }
}

/// Parses the description block of `path`, logging why it is unusable when
/// it is.
#[must_use]
pub fn read_module_info(path: &Utf8Path) -> Option<ModuleInfo> {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            warn!("cannot read module description {path}: {e}");
            return None;
        }
    };
    match ModuleInfo::parse(&source) {
        Ok(info) => Some(info),
        Err(e) => {
            warn!("malformed module description {path}: {e}");
            None
        }
    }
}
