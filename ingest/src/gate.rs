//! Quality gate invocation.
//!
//! The gate is an opaque external scorer. Its stdout is the report and its
//! exit status the verdict; neither is interpreted beyond that.

use crate::config::ToolCommand;
use crate::error::{IngestError, Result};
use crate::executor::{CommandExecutor, CommandRequest, output_lines};
use camino::Utf8Path;
use log::{debug, info, warn};

/// Outcome of one gate run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerdict {
    passed: bool,
    report: Vec<String>,
}

impl GateVerdict {
    /// Builds a verdict from its parts.
    #[must_use]
    pub const fn new(passed: bool, report: Vec<String>) -> Self {
        Self { passed, report }
    }

    /// Returns `true` when the gate exited with status zero.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.passed
    }

    /// Returns the report lines in the order the gate printed them.
    #[must_use]
    pub fn report(&self) -> &[String] {
        &self.report
    }

    /// Returns the report as a single newline-terminated block.
    #[must_use]
    pub fn report_text(&self) -> String {
        self.report.iter().fold(String::new(), |mut acc, line| {
            acc.push_str(line);
            acc.push('\n');
            acc
        })
    }
}

/// Runs the configured gate program against staged modules.
pub struct QualityGate<'a, E: CommandExecutor> {
    executor: &'a E,
    command: &'a ToolCommand,
}

impl<'a, E: CommandExecutor> QualityGate<'a, E> {
    /// Creates a gate that runs `command` through `executor`.
    #[must_use]
    pub const fn new(executor: &'a E, command: &'a ToolCommand) -> Self {
        Self { executor, command }
    }

    /// Scores the module at `module_path`.
    ///
    /// A timeout counts as a failed verdict, with the timeout noted as the
    /// last report line.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Tool`] when the gate program cannot be started.
    pub fn evaluate(&self, module_path: &Utf8Path) -> Result<GateVerdict> {
        let args = self.command.args_with(&[module_path.as_str()]);
        let request = CommandRequest::new(&self.command.program, &args);

        let verdict = match self.executor.run(&request) {
            Ok(output) => GateVerdict::new(output.status.success(), output_lines(&output.stdout)),
            Err(err @ IngestError::ToolTimedOut { .. }) => {
                warn!("quality gate did not finish: {err}");
                GateVerdict::new(false, vec![err.to_string()])
            }
            Err(err) => return Err(err),
        };

        debug!("gate report for {module_path}: {} lines", verdict.report.len());
        info!(
            "gate {} for {module_path}",
            if verdict.passed { "passed" } else { "failed" }
        );
        Ok(verdict)
    }
}
