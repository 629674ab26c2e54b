//! End-to-end tests for the upload pipeline.
//!
//! Real extraction, a real on-disk repository tree and an in-memory
//! database; only the external tools are stubbed.

use camino::{Utf8Path, Utf8PathBuf};
use modarchive_common::{Identity, Submitter};
use modarchive_ingest::config::{ArchiveConfig, PathsConfig};
use modarchive_ingest::error::{IngestError, PublishStage};
use modarchive_ingest::extraction::ScratchExtractor;
use modarchive_ingest::mail::SendmailMailer;
use modarchive_ingest::pipeline::{IngestPipeline, PipelineContext, UploadOutcome};
use modarchive_ingest::resolver::Resolution;
use modarchive_ingest::store::{Database, OwnershipRegistry, SearchIndex};
use modarchive_ingest::test_utils::{
    ArchiveFormat, ExpectedCall, StubExecutor, build_archive, failure_output, stdout_output,
    success_output,
};
use modarchive_ingest::upload::UploadedArchive;
use rstest::{fixture, rstest};
use std::process::Output;
use tempfile::TempDir;

const ALLOC_INFO: &str = "\
/**
 * alloc - memory allocator routines
 *
 * Carves a region of memory into allocations.
 */
int main(void) { return 0; }
";

struct Archive {
    _dir: TempDir,
    config: ArchiveConfig,
    db: Database,
}

#[fixture]
fn archive() -> Archive {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8 path");
    Archive {
        _dir: dir,
        config: ArchiveConfig {
            paths: PathsConfig::under(&root),
            ..ArchiveConfig::default()
        },
        db: Database::in_memory().expect("in-memory database"),
    }
}

impl Archive {
    fn run(&self, executor: &StubExecutor, upload: UploadedArchive) -> Result<UploadOutcome, IngestError> {
        let extractor = ScratchExtractor::new(self.config.paths.scratch.clone());
        let mailer = SendmailMailer::new(executor, &self.config.tools.sendmail, &self.config.mail.from);
        IngestPipeline::new(PipelineContext {
            config: &self.config,
            executor,
            extractor: &extractor,
            store: &self.db,
            mailer: &mailer,
        })
        .process(upload)
    }

    fn paths(&self) -> &PathsConfig {
        &self.config.paths
    }

    /// The gate runs on the module inside the run's scratch directory,
    /// `users/<identity>` or `anonymous/<slot>`.
    fn gate_call(&self, workdir: &str, result: Output) -> ExpectedCall {
        let staged = self.paths().scratch.join(workdir).join("alloc/alloc");
        ExpectedCall::new("ccanlint", [staged.as_str()], Ok(result))
    }

    fn publish_calls(&self, name: &str, submitter: &str) -> Vec<ExpectedCall> {
        let rel = format!("ccan/{name}");
        let message = format!("web upload of {name} by {submitter}");
        vec![
            ExpectedCall::new(
                "infotojson",
                [
                    rel.clone(),
                    format!("{rel}/_info.c"),
                    format!("{rel}/json_{name}"),
                    submitter.to_owned(),
                    self.paths().database.to_string(),
                ],
                Ok(success_output()),
            ),
            ExpectedCall::new("git", ["add", "--all", rel.as_str()], Ok(success_output())),
            ExpectedCall::new(
                "git",
                ["commit", "--allow-empty", "-m", message.as_str()],
                Ok(success_output()),
            ),
            ExpectedCall::new("git", ["push"], Ok(success_output())),
        ]
    }

    fn assert_no_leftovers(&self, submitter: &str) {
        assert!(
            is_empty_or_missing(&self.paths().scratch.join("users")),
            "scratch should be empty"
        );
        assert!(
            !self.paths().staging.join(submitter).exists(),
            "staging directory should be released"
        );
    }
}

fn alloc_upload(submitter: Submitter) -> UploadedArchive {
    UploadedArchive::new(
        "alloc.tar.gz",
        "application/x-gzip",
        build_archive(
            ArchiveFormat::TarGz,
            &[("alloc/_info.c", ALLOC_INFO), ("alloc/alloc.c", "void *alloc(void);")],
        ),
        submitter,
    )
}

fn identity(name: &str) -> Identity {
    Identity::new(name).expect("valid identity")
}

fn is_empty_or_missing(dir: &Utf8Path) -> bool {
    std::fs::read_dir(dir).map_or(true, |mut entries| entries.next().is_none())
}

#[rstest]
fn authenticated_upload_is_published_and_indexed(archive: Archive) {
    let mut calls = vec![archive.gate_call("users/rusty", stdout_output(0, "alloc: PASS"))];
    calls.extend(archive.publish_calls("alloc", "rusty"));
    let executor = StubExecutor::new(calls);

    let outcome = archive
        .run(&executor, alloc_upload(Submitter::Authenticated(identity("rusty"))))
        .expect("upload succeeds");

    let UploadOutcome::Published {
        module,
        resolution,
        entry,
        ..
    } = &outcome
    else {
        panic!("expected publication, got {outcome:?}");
    };
    assert!(matches!(resolution, Resolution::Fresh { .. }));
    assert_eq!(module.path(), archive.paths().repository.join("ccan/alloc").as_path());
    assert!(module.path().join("alloc.c").is_file());
    assert_eq!(
        archive.db.owner_of("ccan/alloc").expect("query").as_deref(),
        Some("rusty")
    );
    assert_eq!(entry.author, "rusty");
    assert_eq!(entry.title, "alloc - memory allocator routines");
    assert_eq!(entry.description, "\nCarves a region of memory into allocations.");
    archive.assert_no_leftovers("rusty");
    executor.assert_finished();
}

#[rstest]
fn upload_over_foreign_module_is_renamed(archive: Archive) {
    let mut calls = vec![archive.gate_call("users/rusty", success_output())];
    calls.extend(archive.publish_calls("alloc", "rusty"));
    calls.push(archive.gate_call("users/mallory", success_output()));
    calls.extend(archive.publish_calls("alloc-mallory", "mallory"));
    let executor = StubExecutor::new(calls);

    archive
        .run(&executor, alloc_upload(Submitter::Authenticated(identity("rusty"))))
        .expect("first upload");
    let outcome = archive
        .run(&executor, alloc_upload(Submitter::Authenticated(identity("mallory"))))
        .expect("second upload");

    let UploadOutcome::Published {
        module, resolution, ..
    } = &outcome
    else {
        panic!("expected publication, got {outcome:?}");
    };
    assert_eq!(module.name().as_str(), "alloc-mallory");
    assert!(matches!(resolution, Resolution::ForeignOwned { .. }));
    assert!(archive.paths().repository.join("ccan/alloc/alloc.c").is_file());
    assert!(archive.paths().repository.join("ccan/alloc-mallory/alloc.c").is_file());
    assert_eq!(
        archive.db.owner_of("ccan/alloc").expect("query").as_deref(),
        Some("rusty"),
        "the original owner keeps the original path"
    );
    assert_eq!(
        archive.db.owner_of("ccan/alloc-mallory").expect("query"),
        None,
        "renamed publications are not claimed"
    );
    executor.assert_finished();
}

#[rstest]
fn failing_gate_quarantines_without_touching_the_repository(archive: Archive) {
    let executor = StubExecutor::new(vec![
        archive.gate_call("users/rusty", stdout_output(1, "has_tests: FAIL\nhas_info: PASS")),
    ]);

    let outcome = archive
        .run(&executor, alloc_upload(Submitter::Authenticated(identity("rusty"))))
        .expect("a failing gate is not an error");

    let UploadOutcome::Quarantined { entry, verdict } = &outcome else {
        panic!("expected quarantine, got {outcome:?}");
    };
    assert_eq!(entry.path(), archive.paths().junk.join("alloc-rusty").as_path());
    assert!(entry.path().join("alloc.c").is_file());
    assert_eq!(verdict.report(), ["has_tests: FAIL", "has_info: PASS"]);
    assert!(!archive.paths().repository.join("ccan/alloc").exists());
    assert_eq!(archive.db.owner_of("ccan/alloc").expect("query"), None);
    assert_eq!(archive.db.lookup("alloc").expect("query"), None);
    archive.assert_no_leftovers("rusty");
    executor.assert_finished();
}

#[rstest]
fn anonymous_upload_is_held_for_review(archive: Archive) {
    archive
        .db
        .insert_user("root", "root@example.org", true)
        .expect("seed administrator");
    archive
        .db
        .insert_user("rusty", "rusty@example.org", false)
        .expect("seed user");
    let executor = StubExecutor::new(vec![
        archive.gate_call("anonymous/0", stdout_output(1, "has_tests: FAIL")),
        ExpectedCall::new("sendmail", ["-t"], Ok(success_output())),
    ]);

    let outcome = archive
        .run(&executor, alloc_upload(Submitter::Anonymous))
        .expect("anonymous upload succeeds");

    let UploadOutcome::RoutedForReview { review, .. } = &outcome else {
        panic!("expected review, got {outcome:?}");
    };
    assert!(review.delivered);
    assert_eq!(review.path, archive.paths().pending_review.join("alloc"));
    assert!(review.path.join("alloc.c").is_file());

    let recorded = executor.recorded();
    let mail = recorded.last().expect("sendmail ran");
    let message = String::from_utf8(mail.stdin.clone().expect("message on stdin"))
        .expect("utf8 message");
    assert!(message.contains("To: root@example.org\n"));
    assert!(!message.contains("rusty@example.org"));
    assert!(message.contains("has_tests: FAIL"));
    assert!(!archive.paths().repository.join("ccan/alloc").exists());
    executor.assert_finished();
}

#[rstest]
fn concurrent_upload_from_same_submitter_is_rejected(archive: Archive) {
    std::fs::create_dir_all(archive.paths().staging.join("rusty")).expect("occupy staging");
    let executor = StubExecutor::new(Vec::new());

    let result = archive.run(&executor, alloc_upload(Submitter::Authenticated(identity("rusty"))));

    assert!(matches!(result, Err(IngestError::UploadInProgress { .. })));
    assert!(is_empty_or_missing(&archive.paths().scratch));
    assert!(
        archive.paths().staging.join("rusty").is_dir(),
        "the in-flight upload keeps its directory"
    );
    executor.assert_finished();
}

#[rstest]
#[case::plain_text("alloc.txt", "text/plain")]
#[case::hidden_name(".tar.gz", "application/x-gzip")]
fn rejected_input_creates_nothing(archive: Archive, #[case] filename: &str, #[case] content_type: &str) {
    let executor = StubExecutor::new(Vec::new());
    let upload = UploadedArchive::new(
        filename,
        content_type,
        build_archive(ArchiveFormat::TarGz, &[("alloc/alloc.c", "code")]),
        Submitter::Authenticated(identity("rusty")),
    );

    let result = archive.run(&executor, upload);

    assert!(matches!(
        result,
        Err(IngestError::UnsupportedContentType { .. } | IngestError::Naming(_))
    ));
    assert!(!archive.paths().scratch.exists());
    assert!(!archive.paths().staging.exists());
    executor.assert_finished();
}

#[rstest]
fn push_failure_keeps_the_commit_and_the_claim(archive: Archive) {
    let mut calls = vec![archive.gate_call("users/rusty", success_output())];
    let mut publish = archive.publish_calls("alloc", "rusty");
    if let Some(push) = publish.last_mut() {
        push.result = Ok(failure_output("remote rejected"));
    }
    calls.extend(publish);
    let executor = StubExecutor::new(calls);

    let result = archive.run(&executor, alloc_upload(Submitter::Authenticated(identity("rusty"))));

    let Err(IngestError::Publish { stage, message }) = &result else {
        panic!("expected publish failure, got {result:?}");
    };
    assert_eq!(*stage, PublishStage::VcsPush);
    assert!(message.contains("remote rejected"));
    assert!(archive.paths().repository.join("ccan/alloc/alloc.c").is_file());
    assert_eq!(
        archive.db.owner_of("ccan/alloc").expect("query").as_deref(),
        Some("rusty")
    );
    assert_eq!(archive.db.lookup("alloc").expect("query"), None);
    archive.assert_no_leftovers("rusty");
    executor.assert_finished();
}
