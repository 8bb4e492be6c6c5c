//! Daemon supervision errors.
//!
//! Every variant is fatal for the transfer attempt that triggered it; the
//! supervisor never retries on its own.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Error returned when preparing, starting or probing the daemon fails.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// The daemon URL could not be interpreted.
    #[error("invalid daemon address '{url}': {reason}")]
    InvalidAddress {
        /// Rejected input.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A log level name was not recognised.
    #[error("invalid {component} log level '{value}'")]
    InvalidLogLevel {
        /// Which level was being parsed (daemon or runtime).
        component: &'static str,
        /// Rejected input.
        value: String,
    },

    /// Reading or writing a supervisor file failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File or program involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The configuration document could not be serialized.
    #[error("failed to serialize daemon configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// The daemon executable could not be launched.
    #[error("failed to spawn daemon {program}: {source}")]
    Spawn {
        /// Executable that was launched.
        program: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The daemon exited inside the startup probe window.
    #[error("daemon exited during startup ({status}); last log line: {last_log_line}")]
    EarlyExit {
        /// Exit status reported by the OS.
        status: ExitStatus,
        /// Last line of the daemon log, or a placeholder when none was written.
        last_log_line: String,
    },

    /// The listening port could not be recovered after an ephemeral bind.
    #[error("could not read listening port from {log}: {reason}")]
    PortDiscovery {
        /// Log file that was inspected.
        log: PathBuf,
        /// Why no port was found.
        reason: String,
    },
}

impl DaemonError {
    /// Creates an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Reports whether the error concerns the daemon process rather than its
    /// configuration.
    pub const fn is_process_failure(&self) -> bool {
        matches!(
            self,
            Self::Spawn { .. } | Self::EarlyExit { .. } | Self::PortDiscovery { .. }
        )
    }
}

/// Maps I/O results to [`DaemonError::Io`] with path context.
pub(crate) trait IoResultExt<T> {
    /// Attaches `path` to the error.
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T, DaemonError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T, DaemonError> {
        self.map_err(|e| DaemonError::io(path, e))
    }
}
