//! Module archive ingest CLI entrypoint.
//!
//! Runs one upload through the pipeline, describes a published module, or
//! initialises the archive database. Results go to stdout, errors to stderr.

use clap::Parser;
use log::LevelFilter;
use modarchive_common::{Identity, ModuleName, Submitter};
use modarchive_ingest::cli::{Cli, Command, DescribeArgs, UploadArgs};
use modarchive_ingest::config::ArchiveConfig;
use modarchive_ingest::error::{IngestError, Result};
use modarchive_ingest::executor::SystemCommandExecutor;
use modarchive_ingest::extraction::ScratchExtractor;
use modarchive_ingest::mail::SendmailMailer;
use modarchive_ingest::metadata::MetadataExtractor;
use modarchive_ingest::output::{description_text, outcome_message, write_stderr_line, write_text};
use modarchive_ingest::pipeline::{IngestPipeline, PipelineContext};
use modarchive_ingest::store::{Database, SearchIndex};
use modarchive_ingest::upload::UploadedArchive;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stdout);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn init_logging(cli: &Cli) {
    let level = log_level(cli.quiet, cli.verbosity);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

const fn log_level(quiet: bool, verbosity: u8) -> LevelFilter {
    match (quiet, verbosity) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Info,
        (false, _) => LevelFilter::Debug,
    }
}

fn run(cli: &Cli, stdout: &mut dyn Write) -> Result<()> {
    let config = ArchiveConfig::resolve(cli.config.as_deref())?;
    match &cli.command {
        Command::Upload(args) => run_upload(&config, args, stdout),
        Command::Describe(args) => run_describe(&config, args, stdout),
        Command::InitDb => {
            Database::open(&config.paths.database)?;
            write_text(
                stdout,
                &format!("Database ready at {}", config.paths.database),
            )
        }
    }
}

fn run_upload(config: &ArchiveConfig, args: &UploadArgs, stdout: &mut dyn Write) -> Result<()> {
    let submitter = match &args.submitter {
        Some(name) => Submitter::Authenticated(Identity::new(name.as_str())?),
        None => Submitter::Anonymous,
    };
    let payload = std::fs::read(&args.archive)?;
    let upload = UploadedArchive::new(
        args.effective_filename(),
        args.effective_content_type(),
        payload,
        submitter,
    );

    let executor = SystemCommandExecutor::new(config.tools.timeout());
    let extractor = ScratchExtractor::new(config.paths.scratch.clone());
    let store = Database::open(&config.paths.database)?;
    let mailer = SendmailMailer::new(&executor, &config.tools.sendmail, &config.mail.from);

    let outcome = IngestPipeline::new(PipelineContext {
        config,
        executor: &executor,
        extractor: &extractor,
        store: &store,
        mailer: &mailer,
    })
    .process(upload)?;

    write_text(stdout, &outcome_message(&outcome, &config.paths.modules_dir))
}

fn run_describe(config: &ArchiveConfig, args: &DescribeArgs, stdout: &mut dyn Write) -> Result<()> {
    let module = ModuleName::new(args.module.as_str())?;
    let path = config
        .paths
        .repository
        .join(&config.paths.modules_dir)
        .join(module.as_str());
    if !path.is_dir() {
        return Err(IngestError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no module at {path}"),
        )));
    }

    let executor = SystemCommandExecutor::new(config.tools.timeout());
    let description =
        MetadataExtractor::new(&executor, &config.tools).describe(&path, &config.paths.info_file)?;
    let store = Database::open(&config.paths.database)?;
    let indexed = store.lookup(module.as_str())?;

    write_text(
        stdout,
        &description_text(module.as_str(), &description, indexed.as_ref()),
    )
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, format!("error: {err}"));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_error_and_returns_one() {
        let err = IngestError::UnsupportedContentType {
            content_type: "text/plain".to_owned(),
        };

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert_eq!(stderr_text, "error: file type not supported: text/plain\n");
    }

    #[rstest]
    #[case::quiet(true, 0, LevelFilter::Error)]
    #[case::default(false, 0, LevelFilter::Warn)]
    #[case::verbose(false, 1, LevelFilter::Info)]
    #[case::very_verbose(false, 3, LevelFilter::Debug)]
    fn verbosity_selects_log_level(
        #[case] quiet: bool,
        #[case] verbosity: u8,
        #[case] expected: LevelFilter,
    ) {
        assert_eq!(log_level(quiet, verbosity), expected);
    }

    #[rstest]
    #[case::parent("..")]
    #[case::nested("../../etc")]
    #[case::empty("")]
    fn describe_rejects_names_that_are_not_a_single_component(#[case] module: &str) {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = camino::Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8 path");
        let config_path = root.join("config.toml");
        std::fs::write(&config_path, format!("[paths]\nrepository = \"{root}\"\n"))
            .expect("write config");

        let cli = Cli::parse_from([
            "modarchive-ingest",
            "describe",
            module,
            "--config",
            config_path.as_str(),
        ]);
        let mut stdout = Vec::new();
        let result = run(&cli, &mut stdout);

        assert!(matches!(result, Err(IngestError::Naming(_))));
        assert!(stdout.is_empty());
    }

    #[test]
    fn init_db_creates_tables() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = camino::Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8 path");
        let config_path = root.join("config.toml");
        std::fs::write(
            &config_path,
            format!("[paths]\ndatabase = \"{}\"\n", root.join("db/modarchive.db")),
        )
        .expect("write config");

        let cli = Cli::parse_from(["modarchive-ingest", "init-db", "--config", config_path.as_str()]);
        let mut stdout = Vec::new();
        run(&cli, &mut stdout).expect("init-db succeeds");

        assert!(root.join("db/modarchive.db").is_file());
        let text = String::from_utf8(stdout).expect("utf8 output");
        assert!(text.starts_with("Database ready at "));
    }
}
