//! Messages shown to submitters and operators.

use crate::error::{IngestError, Result};
use crate::metadata::ModuleDescription;
use crate::pipeline::UploadOutcome;
use crate::store::SearchIndexEntry;
use std::io::Write;

/// Renders the result of an upload for the submitter.
///
/// Quarantined uploads include the full gate report so the submitter can
/// fix the module without asking for server access.
#[must_use]
pub fn outcome_message(outcome: &UploadOutcome, modules_dir: &str) -> String {
    let mut lines = Vec::new();
    match outcome {
        UploadOutcome::Published {
            module, resolution, ..
        } => {
            if let Some(note) = resolution.describe(modules_dir) {
                lines.push(note);
            }
            lines.push(format!("Stored to {modules_dir}/{}", module.name()));
        }
        UploadOutcome::Quarantined { entry, verdict } => {
            lines.push(format!(
                "Score for code is low. Cannot copy to repository. Moving to {}...",
                entry.path()
            ));
            if verdict.report().is_empty() {
                lines.push("Below is details for test.".to_owned());
            }
            lines.extend(verdict.report().iter().cloned());
        }
        UploadOutcome::RoutedForReview { review, .. } => {
            lines.push(format!(
                "Stored to temporary repository at {}.",
                review.path
            ));
            lines.push(if review.delivered {
                "Mail was sent to the administrators to get the code verified.".to_owned()
            } else {
                "The administrators could not be notified; please contact them directly."
                    .to_owned()
            });
        }
    }
    lines.join("\n")
}

/// Renders a module description for listings.
#[must_use]
pub fn description_text(
    name: &str,
    description: &ModuleDescription,
    indexed: Option<&SearchIndexEntry>,
) -> String {
    let mut lines = Vec::new();
    match &description.info {
        Some(info) => {
            lines.push(info.title().to_owned());
            lines.extend(info.description().iter().cloned());
        }
        None => lines.push(name.to_owned()),
    }
    if let Some(entry) = indexed {
        lines.push(String::new());
        lines.push(format!("Author: {}", entry.author));
    }
    push_list(&mut lines, "Dependencies", &description.dependencies.direct);
    push_list(
        &mut lines,
        "External dependencies",
        &description.dependencies.external,
    );
    lines.join("\n")
}

fn push_list(lines: &mut Vec<String>, heading: &str, items: &[String]) {
    lines.push(String::new());
    if items.is_empty() {
        lines.push(format!("{heading}: none"));
        return;
    }
    lines.push(format!("{heading}:"));
    lines.extend(items.iter().map(|item| format!("  - {item}")));
}

/// Writes `text` and a newline to `out`.
///
/// # Errors
///
/// Returns [`IngestError::WriteFailed`] if the writer fails.
pub fn write_text(out: &mut dyn Write, text: &str) -> Result<()> {
    writeln!(out, "{text}").map_err(|e| IngestError::WriteFailed { source: e })
}

/// Writes a line to stderr, ignoring failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateVerdict;
    use crate::metadata::ModuleDependencies;
    use crate::notifier::ReviewOutcome;
    use crate::publisher::{JunkEntry, PublishedModule};
    use crate::resolver::Resolution;
    use crate::store::OwnershipRecord;
    use camino::Utf8PathBuf;
    use modarchive_common::{Identity, ModuleInfo, ModuleName};
    use rstest::rstest;

    fn name(value: &str) -> ModuleName {
        ModuleName::new(value).expect("valid name")
    }

    #[test]
    fn renamed_publish_explains_the_rename() {
        let outcome = UploadOutcome::Published {
            module: PublishedModule::new(name("alloc-mallory"), "repo/ccan/alloc-mallory"),
            resolution: Resolution::ForeignOwned {
                original: name("alloc"),
                renamed: name("alloc-mallory"),
                module_path: "ccan/alloc".to_owned(),
                composite_exists: false,
            },
            verdict: GateVerdict::new(true, Vec::new()),
            entry: SearchIndexEntry {
                module: "alloc-mallory".to_owned(),
                author: "mallory".to_owned(),
                title: "alloc".to_owned(),
                description: String::new(),
            },
        };

        let text = outcome_message(&outcome, "ccan");
        assert_eq!(
            text,
            "ccan/alloc already exists. Renaming to alloc-mallory\nStored to ccan/alloc-mallory"
        );
    }

    #[test]
    fn fresh_publish_has_no_rename_note() {
        let outcome = UploadOutcome::Published {
            module: PublishedModule::new(name("alloc"), "repo/ccan/alloc"),
            resolution: Resolution::Fresh {
                name: name("alloc"),
                record: OwnershipRecord {
                    module_path: "ccan/alloc".to_owned(),
                    owner: Identity::new("rusty").expect("valid identity"),
                },
            },
            verdict: GateVerdict::new(true, Vec::new()),
            entry: SearchIndexEntry {
                module: "alloc".to_owned(),
                author: "rusty".to_owned(),
                title: "alloc".to_owned(),
                description: String::new(),
            },
        };
        assert_eq!(outcome_message(&outcome, "ccan"), "Stored to ccan/alloc");
    }

    #[rstest]
    #[case::with_report(vec!["has_tests: FAIL".to_owned()], "has_tests: FAIL", false)]
    #[case::empty_report(Vec::new(), "Below is details for test.", true)]
    fn quarantine_message_includes_report(
        #[case] report: Vec<String>,
        #[case] expected: &str,
        #[case] placeholder: bool,
    ) {
        let outcome = UploadOutcome::Quarantined {
            entry: JunkEntry::new(name("alloc-rusty"), "junkcode/alloc-rusty"),
            verdict: GateVerdict::new(false, report),
        };
        let text = outcome_message(&outcome, "ccan");
        assert!(text.contains("Cannot copy to repository. Moving to junkcode/alloc-rusty..."));
        assert!(text.contains(expected));
        assert_eq!(text.contains("Below is details"), placeholder);
    }

    #[rstest]
    #[case::delivered(true, "Mail was sent")]
    #[case::undelivered(false, "could not be notified")]
    fn review_message_reports_delivery(#[case] delivered: bool, #[case] expected: &str) {
        let outcome = UploadOutcome::RoutedForReview {
            review: ReviewOutcome {
                name: name("alloc"),
                path: Utf8PathBuf::from("pending/alloc"),
                delivered,
            },
            verdict: GateVerdict::new(false, Vec::new()),
        };
        let text = outcome_message(&outcome, "ccan");
        assert!(text.contains("pending/alloc"));
        assert!(text.contains(expected));
    }

    #[test]
    fn description_lists_dependencies() {
        let description = ModuleDescription {
            info: Some(ModuleInfo::new(
                "alloc - allocator",
                vec!["Allocates.".to_owned()],
            )),
            dependencies: ModuleDependencies {
                direct: vec!["ccan/str".to_owned()],
                external: Vec::new(),
            },
        };
        let text = description_text("alloc", &description, None);
        assert!(text.starts_with("alloc - allocator\nAllocates."));
        assert!(text.contains("Dependencies:\n  - ccan/str"));
        assert!(text.contains("External dependencies: none"));
    }

    #[test]
    fn write_text_reports_failures() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        let result = write_text(&mut Broken, "hello");
        assert!(matches!(result, Err(IngestError::WriteFailed { .. })));
    }
}
