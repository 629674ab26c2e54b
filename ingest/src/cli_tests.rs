//! Tests for CLI parsing and defaults.

use super::*;
use rstest::rstest;

#[test]
fn upload_parses_submitter() {
    let cli = Cli::parse_from(["modarchive-ingest", "upload", "alloc.tar.gz", "-s", "rusty"]);
    let Command::Upload(args) = cli.command else {
        panic!("expected upload command");
    };
    assert_eq!(args.archive, Utf8PathBuf::from("alloc.tar.gz"));
    assert_eq!(args.submitter.as_deref(), Some("rusty"));
    assert_eq!(cli.verbosity, 0);
    assert!(!cli.quiet);
}

#[test]
fn anonymous_upload_has_no_submitter() {
    let cli = Cli::parse_from(["modarchive-ingest", "upload", "alloc.zip"]);
    let Command::Upload(args) = cli.command else {
        panic!("expected upload command");
    };
    assert!(args.submitter.is_none());
}

#[rstest]
#[case::guessed(&["upload", "/tmp/php123/alloc.tar.bz2"], "alloc.tar.bz2", "application/x-bzip")]
#[case::explicit_name(
    &["upload", "/tmp/php123", "--filename", "alloc.zip"],
    "alloc.zip",
    "application/zip"
)]
#[case::explicit_type(
    &["upload", "alloc.tar.gz", "--content-type", "application/x-tar"],
    "alloc.tar.gz",
    "application/x-tar"
)]
#[case::unguessable(&["upload", "alloc.rar"], "alloc.rar", "")]
fn upload_derives_name_and_type(
    #[case] args: &[&str],
    #[case] filename: &str,
    #[case] content_type: &str,
) {
    let cli = Cli::parse_from(std::iter::once("modarchive-ingest").chain(args.iter().copied()));
    let Command::Upload(upload) = cli.command else {
        panic!("expected upload command");
    };
    assert_eq!(upload.effective_filename(), filename);
    assert_eq!(upload.effective_content_type(), content_type);
}

#[test]
fn global_flags_follow_subcommands() {
    let cli = Cli::parse_from([
        "modarchive-ingest",
        "describe",
        "alloc",
        "--config",
        "/etc/modarchive.toml",
        "-vv",
    ]);
    assert_eq!(cli.config, Some(Utf8PathBuf::from("/etc/modarchive.toml")));
    assert_eq!(cli.verbosity, 2);
    assert!(matches!(cli.command, Command::Describe(ref d) if d.module == "alloc"));
}

#[test]
fn quiet_conflicts_with_verbose() {
    let result = Cli::try_parse_from(["modarchive-ingest", "init-db", "-q", "-v"]);
    assert!(result.is_err());
}

#[test]
fn subcommand_is_required() {
    assert!(Cli::try_parse_from(["modarchive-ingest"]).is_err());
}
