//! Supervisor configuration and the daemon's JSON configuration document.
//!
//! [`SupervisorConfig`] describes how the daemon is launched and supervised.
//! [`ConfigDocument`] is the file handed to the daemon through `-c`; it is
//! rendered deterministically from the supervisor configuration so that the
//! same inputs always produce byte-identical files.

use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::address::DaemonAddress;
use crate::error::{DaemonError, IoResultExt};

/// Default window during which an immediate daemon exit is treated as fatal.
pub const DEFAULT_STARTUP_PROBE: Duration = Duration::from_secs(2);

/// Default time allowed for the daemon to exit after a terminate request.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Log file written by the transfer runtime inside the log directory.
pub const RUNTIME_LOG_FILE: &str = "aspera-scp-transfer.log";

const FALLBACK_DAEMON_NAME: &str = "transferd";

/// Verbosity of the daemon's own log.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonLogLevel {
    /// Errors only.
    Error,
    /// Errors and warnings.
    Warn,
    /// Informational messages.
    #[default]
    Info,
    /// Debug output.
    Debug,
    /// Everything.
    Trace,
}

impl DaemonLogLevel {
    /// Returns the name written to the configuration document.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for DaemonLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DaemonLogLevel {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(DaemonError::InvalidLogLevel {
                component: "daemon",
                value: s.to_owned(),
            }),
        }
    }
}

/// Verbosity of the transfer runtime spawned by the daemon.
///
/// Serialized as the integers `0`, `1` and `2`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RuntimeLogLevel {
    /// Level 0.
    #[default]
    Info,
    /// Level 1.
    Debug,
    /// Level 2.
    Trace,
}

impl RuntimeLogLevel {
    /// Returns the numeric level written to the configuration document.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Info => 0,
            Self::Debug => 1,
            Self::Trace => 2,
        }
    }
}

impl Serialize for RuntimeLogLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl FromStr for RuntimeLogLevel {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" | "0" => Ok(Self::Info),
            "debug" | "1" => Ok(Self::Debug),
            "trace" | "2" => Ok(Self::Trace),
            _ => Err(DaemonError::InvalidLogLevel {
                component: "runtime",
                value: s.to_owned(),
            }),
        }
    }
}

/// Which transfer runtime binaries the daemon should use.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum RuntimeBinaries {
    /// The binaries bundled with the daemon.
    #[default]
    Embedded,
    /// Binaries installed elsewhere.
    External {
        /// Directory holding the runtime executables.
        bin: PathBuf,
        /// Directory holding the runtime configuration files.
        etc: PathBuf,
    },
}

/// JSON document written to `<log_dir>/<daemon>.conf`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ConfigDocument {
    /// Host to bind.
    pub address: String,
    /// Port to bind; `0` lets the daemon choose.
    pub port: u16,
    /// Directory for daemon and runtime logs.
    pub log_directory: String,
    /// Daemon log verbosity.
    pub log_level: DaemonLogLevel,
    /// Runtime settings.
    pub fasp_runtime: RuntimeSection,
}

/// `fasp_runtime` section of [`ConfigDocument`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RuntimeSection {
    /// Whether the bundled runtime is used.
    pub use_embedded: bool,
    /// Location of external runtime binaries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_defined: Option<UserDefinedRuntime>,
    /// Runtime logging.
    pub log: RuntimeLog,
}

/// External runtime location.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct UserDefinedRuntime {
    /// Executables directory.
    pub bin: String,
    /// Configuration directory.
    pub etc: String,
}

/// Runtime log settings.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RuntimeLog {
    /// Directory for the runtime log.
    pub dir: String,
    /// Numeric verbosity.
    pub level: RuntimeLogLevel,
}

impl ConfigDocument {
    /// Renders the document as compact JSON.
    pub fn to_json(&self) -> Result<String, DaemonError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Configuration describing how the daemon is launched and supervised.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SupervisorConfig {
    daemon_path: PathBuf,
    address: DaemonAddress,
    log_directory: PathBuf,
    log_level: DaemonLogLevel,
    runtime_level: RuntimeLogLevel,
    runtime_binaries: RuntimeBinaries,
    startup_probe: Duration,
    shutdown_grace: Duration,
}

impl SupervisorConfig {
    /// Creates a [`SupervisorConfigBuilder`] for the daemon executable at `daemon_path`.
    #[must_use]
    pub fn builder(daemon_path: impl Into<PathBuf>) -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::new(daemon_path.into())
    }

    /// Returns the daemon executable.
    #[must_use]
    pub fn daemon_path(&self) -> &Path {
        &self.daemon_path
    }

    /// Returns the requested listening address.
    #[must_use]
    pub const fn address(&self) -> &DaemonAddress {
        &self.address
    }

    /// Returns the directory holding configuration, output and log files.
    #[must_use]
    pub fn log_directory(&self) -> &Path {
        &self.log_directory
    }

    /// Returns the daemon log level.
    #[must_use]
    pub const fn log_level(&self) -> DaemonLogLevel {
        self.log_level
    }

    /// Returns the runtime log level.
    #[must_use]
    pub const fn runtime_level(&self) -> RuntimeLogLevel {
        self.runtime_level
    }

    /// Returns the runtime binaries selection.
    #[must_use]
    pub const fn runtime_binaries(&self) -> &RuntimeBinaries {
        &self.runtime_binaries
    }

    /// Returns the startup probe window.
    #[must_use]
    pub const fn startup_probe(&self) -> Duration {
        self.startup_probe
    }

    /// Returns the shutdown grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    /// Returns the executable's file name, used to name the daemon's files.
    #[must_use]
    pub fn daemon_name(&self) -> String {
        self.daemon_path
            .file_name()
            .map(OsStr::to_string_lossy)
            .filter(|name| !name.is_empty())
            .map_or_else(|| FALLBACK_DAEMON_NAME.to_owned(), |name| name.into_owned())
    }

    /// Returns `<log_dir>/<daemon_name>.<extension>`.
    #[must_use]
    pub fn file_path(&self, extension: &str) -> PathBuf {
        self.log_directory
            .join(format!("{}.{extension}", self.daemon_name()))
    }

    /// Returns the daemon's own log file.
    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.file_path("log")
    }

    /// Returns the runtime's log file.
    #[must_use]
    pub fn runtime_log_file(&self) -> PathBuf {
        self.log_directory.join(RUNTIME_LOG_FILE)
    }

    /// Builds the configuration document for `address`.
    #[must_use]
    pub fn document(&self, address: &DaemonAddress) -> ConfigDocument {
        let log_directory = self.log_directory.to_string_lossy().into_owned();
        let (use_embedded, user_defined) = match &self.runtime_binaries {
            RuntimeBinaries::Embedded => (true, None),
            RuntimeBinaries::External { bin, etc } => (
                false,
                Some(UserDefinedRuntime {
                    bin: bin.to_string_lossy().into_owned(),
                    etc: etc.to_string_lossy().into_owned(),
                }),
            ),
        };
        ConfigDocument {
            address: address.host().to_owned(),
            port: address.port(),
            log_directory: log_directory.clone(),
            log_level: self.log_level,
            fasp_runtime: RuntimeSection {
                use_embedded,
                user_defined,
                log: RuntimeLog {
                    dir: log_directory,
                    level: self.runtime_level,
                },
            },
        }
    }

    /// Writes the configuration document and returns its path.
    ///
    /// `target_address`, `log_directory` and `log_level` override the values
    /// held by the configuration for this file only.
    pub fn configure(
        &self,
        target_address: &DaemonAddress,
        log_directory: &Path,
        log_level: DaemonLogLevel,
    ) -> Result<PathBuf, DaemonError> {
        let scoped = Self {
            log_directory: log_directory.to_path_buf(),
            log_level,
            ..self.clone()
        };
        let path = scoped.file_path("conf");
        let json = scoped.document(target_address).to_json()?;
        fs::create_dir_all(log_directory).with_path(log_directory)?;
        fs::write(&path, json).with_path(&path)?;
        Ok(path)
    }
}

/// Builder used to assemble a [`SupervisorConfig`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SupervisorConfigBuilder {
    config: SupervisorConfig,
}

impl SupervisorConfigBuilder {
    fn new(daemon_path: PathBuf) -> Self {
        Self {
            config: SupervisorConfig {
                daemon_path,
                address: DaemonAddress::new("127.0.0.1", 0),
                log_directory: std::env::temp_dir(),
                log_level: DaemonLogLevel::default(),
                runtime_level: RuntimeLogLevel::default(),
                runtime_binaries: RuntimeBinaries::default(),
                startup_probe: DEFAULT_STARTUP_PROBE,
                shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            },
        }
    }

    /// Sets the listening address.
    #[must_use]
    pub fn address(mut self, address: DaemonAddress) -> Self {
        self.config.address = address;
        self
    }

    /// Sets the directory for configuration, output and log files.
    #[must_use]
    pub fn log_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_directory = dir.into();
        self
    }

    /// Sets the daemon log level.
    #[must_use]
    pub const fn log_level(mut self, level: DaemonLogLevel) -> Self {
        self.config.log_level = level;
        self
    }

    /// Sets the runtime log level.
    #[must_use]
    pub const fn runtime_level(mut self, level: RuntimeLogLevel) -> Self {
        self.config.runtime_level = level;
        self
    }

    /// Uses runtime binaries installed outside the daemon bundle.
    #[must_use]
    pub fn external_runtime(mut self, bin: impl Into<PathBuf>, etc: impl Into<PathBuf>) -> Self {
        self.config.runtime_binaries = RuntimeBinaries::External {
            bin: bin.into(),
            etc: etc.into(),
        };
        self
    }

    /// Sets the startup probe window.
    #[must_use]
    pub const fn startup_probe(mut self, window: Duration) -> Self {
        self.config.startup_probe = window;
        self
    }

    /// Sets the shutdown grace period.
    #[must_use]
    pub const fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = grace;
        self
    }

    /// Finalises the builder.
    #[must_use]
    pub fn build(self) -> SupervisorConfig {
        self.config
    }
}
