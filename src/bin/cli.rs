//! Argument parsing and dispatch for `transferd-client`.
//!
//! The binary reads a JSON transfer specification, starts a private daemon,
//! runs one session in the requested mode and prints a one-line summary on
//! standard output. Diagnostics go to standard error through `tracing`.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::builder::{PathBufValueParser, PossibleValuesParser, TypedValueParser};
use clap::{Arg, ArgAction, ArgMatches, Command};
use daemon::{DaemonAddress, DaemonLogLevel, RuntimeLogLevel, Supervisor, SupervisorConfig};
use logging::Verbosity;
use protocol::{SpecError, TransferSpec};
use session::{
    ErrorCategory, SessionConfig, SessionError, TerminalStatus, TransferMode,
    TransferOrchestrator, TransferReport,
};
use thiserror::Error;
use tracing::{debug, error};

/// Name used in usage text and diagnostics.
pub const PROGRAM_NAME: &str = "transferd-client";

/// Daemon URL used when neither `--url` nor `TRANSFERD_URL` is given.
pub const DEFAULT_URL: &str = "grpc://127.0.0.1:0";

/// Process exit codes.
///
/// | Code | Meaning                                        |
/// |------|------------------------------------------------|
/// |  0   | Session completed                              |
/// |  1   | Usage, configuration or specification error    |
/// |  5   | Daemon failed to start                         |
/// | 10   | Channel could not be opened or probed          |
/// | 11   | Local file I/O failed                          |
/// | 12   | RPC failed or the daemon's answer was unusable |
/// | 23   | Session reached `FAILED`                       |
pub mod exit_code {
    /// Syntax or usage error.
    pub const SYNTAX: u8 = 1;
    /// Error starting the daemon.
    pub const START_DAEMON: u8 = 5;
    /// Error opening the RPC channel.
    pub const CONNECTION: u8 = 10;
    /// Error in local file I/O.
    pub const FILE_IO: u8 = 11;
    /// Error in the RPC exchange.
    pub const PROTOCOL: u8 = 12;
    /// The daemon reported the session as failed.
    pub const TRANSFER_FAILED: u8 = 23;
}

/// Errors surfaced by the front end.
#[derive(Debug, Error)]
enum ClientError {
    #[error("cannot read transfer specification {path}: {source}")]
    SpecFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid transfer specification {path}: {source}")]
    Spec {
        path: PathBuf,
        #[source]
        source: SpecError,
    },

    #[error("cannot start async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ClientError {
    const fn exit_code(&self) -> u8 {
        match self {
            Self::SpecFile { .. } => exit_code::FILE_IO,
            Self::Spec { .. } => exit_code::SYNTAX,
            Self::Runtime(_) => exit_code::FILE_IO,
            Self::Session(inner) => match inner.category() {
                ErrorCategory::Setup => exit_code::SYNTAX,
                ErrorCategory::Process => exit_code::START_DAEMON,
                ErrorCategory::Connection => exit_code::CONNECTION,
                ErrorCategory::Protocol => exit_code::PROTOCOL,
                ErrorCategory::Io => exit_code::FILE_IO,
            },
        }
    }
}

/// Parsed command line.
#[derive(Clone, Debug)]
struct ClientOptions {
    daemon: PathBuf,
    address: DaemonAddress,
    spec: PathBuf,
    mode: TransferMode,
    log_dir: Option<PathBuf>,
    level: DaemonLogLevel,
    runtime_level: RuntimeLogLevel,
    chunk_size: Option<usize>,
    verbosity: Verbosity,
}

impl ClientOptions {
    fn from_matches(matches: &ArgMatches) -> Self {
        let verbose = matches.get_count("verbose");
        let quiet = matches.get_flag("quiet");
        Self {
            daemon: matches
                .get_one::<PathBuf>("daemon")
                .cloned()
                .unwrap_or_default(),
            address: matches
                .get_one::<DaemonAddress>("url")
                .cloned()
                .unwrap_or_else(|| DaemonAddress::new("127.0.0.1", 0)),
            spec: matches
                .get_one::<PathBuf>("spec")
                .cloned()
                .unwrap_or_default(),
            mode: matches
                .get_one::<TransferMode>("mode")
                .copied()
                .unwrap_or(TransferMode::Regular),
            log_dir: matches.get_one::<PathBuf>("log-dir").cloned(),
            level: matches
                .get_one::<DaemonLogLevel>("level")
                .copied()
                .unwrap_or_default(),
            runtime_level: matches
                .get_one::<RuntimeLogLevel>("runtime-level")
                .copied()
                .unwrap_or_default(),
            chunk_size: matches.get_one::<usize>("chunk-size").copied(),
            verbosity: Verbosity::from_flags(verbose, quiet),
        }
    }

    fn supervisor_config(&self) -> SupervisorConfig {
        let mut builder = SupervisorConfig::builder(&self.daemon)
            .address(self.address.clone())
            .log_level(self.level)
            .runtime_level(self.runtime_level);
        if let Some(dir) = &self.log_dir {
            builder = builder.log_directory(dir);
        }
        builder.build()
    }

    fn session_config(&self) -> SessionConfig {
        let mut builder = SessionConfig::builder().apply_env();
        if let Some(bytes) = self.chunk_size {
            builder = builder.chunk_size(bytes);
        }
        builder.build()
    }
}

/// Builds the `clap` command used for parsing.
fn clap_command() -> Command {
    Command::new(PROGRAM_NAME)
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run one transfer through a private transferd daemon.")
        .arg(
            Arg::new("daemon")
                .long("daemon")
                .value_name("PATH")
                .env("TRANSFERD_DAEMON")
                .required(true)
                .help("Daemon executable to supervise.")
                .value_parser(PathBufValueParser::new()),
        )
        .arg(
            Arg::new("url")
                .long("url")
                .value_name("URL")
                .env("TRANSFERD_URL")
                .default_value(DEFAULT_URL)
                .help("Address the daemon listens on; port 0 lets it choose.")
                .value_parser(|value: &str| DaemonAddress::parse(value)),
        )
        .arg(
            Arg::new("spec")
                .long("spec")
                .value_name("FILE")
                .required(true)
                .help("JSON transfer specification.")
                .value_parser(PathBufValueParser::new()),
        )
        .arg(
            Arg::new("mode")
                .long("mode")
                .value_name("MODE")
                .default_value("regular")
                .help("How items reach the daemon.")
                .value_parser(
                    PossibleValuesParser::new(["regular", "persistent", "stream"])
                        .try_map(|mode| mode.parse::<TransferMode>()),
                ),
        )
        .arg(
            Arg::new("log-dir")
                .long("log-dir")
                .value_name("DIR")
                .env("TRANSFERD_LOG_DIR")
                .help("Directory for the daemon configuration and logs.")
                .value_parser(PathBufValueParser::new()),
        )
        .arg(
            Arg::new("level")
                .long("level")
                .value_name("LEVEL")
                .help("Daemon log level: error, warn, info, debug or trace.")
                .value_parser(|value: &str| value.parse::<DaemonLogLevel>()),
        )
        .arg(
            Arg::new("runtime-level")
                .long("runtime-level")
                .value_name("LEVEL")
                .help("Transfer runtime log level: 0, 1 or 2.")
                .value_parser(|value: &str| value.parse::<RuntimeLogLevel>()),
        )
        .arg(
            Arg::new("chunk-size")
                .long("chunk-size")
                .value_name("BYTES")
                .help("Frame size for streaming uploads.")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Increase diagnostic output; repeat for more.")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .help("Only report errors.")
                .conflicts_with("verbose")
                .action(ArgAction::SetTrue),
        )
}

/// Parses `args`, runs the transfer and maps the result to an exit code.
#[must_use]
pub fn run_with<I, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> ExitCode
where
    I: IntoIterator,
    I::Item: Into<OsString> + Clone,
    Out: Write,
    Err: Write,
{
    let matches = match clap_command().try_get_matches_from(args) {
        Ok(matches) => matches,
        Err(err) => {
            let rendered = err.render().to_string();
            if err.use_stderr() {
                let _ = write!(stderr, "{rendered}");
                return ExitCode::from(exit_code::SYNTAX);
            }
            let _ = write!(stdout, "{rendered}");
            return ExitCode::SUCCESS;
        }
    };

    let options = ClientOptions::from_matches(&matches);
    logging::init_tracing(options.verbosity);
    debug!(?options, "parsed command line");

    match execute(&options) {
        Ok(report) => {
            let _ = writeln!(stdout, "{}", summary(&report));
            if report.outcome.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(exit_code::TRANSFER_FAILED)
            }
        }
        Err(err) => {
            error!(error = %err, "transfer aborted");
            let _ = writeln!(stderr, "{PROGRAM_NAME}: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn execute(options: &ClientOptions) -> Result<TransferReport, ClientError> {
    let text = fs::read_to_string(&options.spec).map_err(|source| ClientError::SpecFile {
        path: options.spec.clone(),
        source,
    })?;
    let spec = TransferSpec::from_json(&text).map_err(|source| ClientError::Spec {
        path: options.spec.clone(),
        source,
    })?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(ClientError::Runtime)?;
    let orchestrator = TransferOrchestrator::new(
        Supervisor::new(options.supervisor_config()),
        options.session_config(),
    );
    Ok(runtime.block_on(orchestrator.run(&spec, options.mode))?)
}

fn summary(report: &TransferReport) -> String {
    let status = match report.outcome.status {
        TerminalStatus::Completed => "completed",
        TerminalStatus::Failed => "failed",
    };
    let mut line = format!(
        "transfer {} ({}) {status}",
        report.transfer_id, report.mode
    );
    if let Some((code, description)) = &report.outcome.error {
        line.push_str(&format!(": [{code}] {description}"));
    }
    if let Some(upload) = &report.upload {
        line.push_str(&format!(
            "; streamed {} files, {} bytes",
            upload.files, upload.bytes
        ));
    }
    line
}

#[cfg(test)]
mod tests {
    use daemon::DaemonError;
    use session::{MonitorOutcome, UploadReport};

    use super::*;

    fn run(args: &[&str]) -> (ExitCode, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut argv = vec![PROGRAM_NAME];
        argv.extend_from_slice(args);
        let exit = run_with(argv, &mut stdout, &mut stderr);
        (
            exit,
            String::from_utf8(stdout).unwrap(),
            String::from_utf8(stderr).unwrap(),
        )
    }

    #[test]
    fn help_goes_to_stdout() {
        let (exit, stdout, stderr) = run(&["--help"]);
        assert_eq!(exit, ExitCode::SUCCESS);
        assert!(stdout.contains("--spec"));
        assert!(stderr.is_empty());
    }

    #[test]
    fn unknown_mode_is_a_usage_error() {
        let (exit, _, stderr) = run(&["--daemon", "/bin/false", "--spec", "x", "--mode", "bulk"]);
        assert_eq!(exit, ExitCode::from(exit_code::SYNTAX));
        assert!(stderr.contains("bulk"));
    }

    #[test]
    fn invalid_url_is_a_usage_error() {
        let (exit, _, _) = run(&["--daemon", "/bin/false", "--spec", "x", "--url", "not a url"]);
        assert_eq!(exit, ExitCode::from(exit_code::SYNTAX));
    }

    #[test]
    fn missing_spec_file_is_a_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let spec = dir.path().join("absent.json");
        let (exit, _, stderr) = run(&[
            "--daemon",
            "/bin/false",
            "--spec",
            spec.to_str().unwrap(),
        ]);
        assert_eq!(exit, ExitCode::from(exit_code::FILE_IO));
        assert!(stderr.contains("absent.json"));
    }

    #[test]
    fn malformed_spec_is_a_usage_error() {
        let mut spec = tempfile::NamedTempFile::new().unwrap();
        write!(spec, "[1, 2").unwrap();
        let (exit, _, stderr) = run(&[
            "--daemon",
            "/bin/false",
            "--spec",
            spec.path().to_str().unwrap(),
        ]);
        assert_eq!(exit, ExitCode::from(exit_code::SYNTAX));
        assert!(stderr.contains("invalid transfer specification"));
    }

    #[test]
    fn options_pick_up_levels_and_verbosity() {
        let matches = clap_command()
            .try_get_matches_from([
                PROGRAM_NAME,
                "--daemon",
                "/opt/transferd",
                "--spec",
                "s.json",
                "--url",
                "grpc://127.0.0.1:55002",
                "--mode",
                "stream",
                "--level",
                "debug",
                "--runtime-level",
                "2",
                "-vv",
            ])
            .unwrap();
        let options = ClientOptions::from_matches(&matches);
        assert_eq!(options.mode, TransferMode::Streaming);
        assert_eq!(options.address.port(), 55002);
        assert_eq!(options.level, DaemonLogLevel::Debug);
        assert_eq!(options.runtime_level, RuntimeLogLevel::Trace);
        assert_eq!(options.verbosity, Verbosity::Debug);
        assert_eq!(options.supervisor_config().daemon_name(), "transferd");
    }

    #[test]
    fn failed_outcome_summary_carries_the_error() {
        let report = TransferReport {
            transfer_id: "t-1".to_owned(),
            mode: TransferMode::Streaming,
            outcome: MonitorOutcome {
                status: TerminalStatus::Failed,
                events_observed: 3,
                error: Some((44, "disk full".to_owned())),
            },
            upload: Some(UploadReport {
                files: 2,
                bytes: 2048,
                chunks: 2,
            }),
        };
        assert_eq!(
            summary(&report),
            "transfer t-1 (stream) failed: [44] disk full; streamed 2 files, 2048 bytes"
        );
    }

    #[test]
    fn daemon_process_failures_map_to_start_code() {
        let error = ClientError::Session(SessionError::Daemon(DaemonError::PortDiscovery {
            log: PathBuf::from("/tmp/t.log"),
            reason: "no port".to_owned(),
        }));
        assert_eq!(error.exit_code(), exit_code::START_DAEMON);
    }
}
