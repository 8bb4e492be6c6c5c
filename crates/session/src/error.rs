//! Session orchestration errors.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use daemon::DaemonError;
use protocol::SpecError;
use tonic::Status;

use crate::state::SessionState;

/// Coarse classification of a [`SessionError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Missing or invalid configuration or input.
    Setup,
    /// The daemon process could not be started or died.
    Process,
    /// The RPC channel could not be opened or was lost.
    Connection,
    /// The daemon answered with something the session cannot accept.
    Protocol,
    /// Local file access failed.
    Io,
}

impl ErrorCategory {
    /// Returns a short lowercase label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Process => "process",
            Self::Connection => "connection",
            Self::Protocol => "protocol",
            Self::Io => "io",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised while orchestrating a transfer session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A configuration value was missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The daemon supervisor failed.
    #[error(transparent)]
    Daemon(#[from] DaemonError),

    /// The channel manager already holds a channel.
    #[error("already connected to the transfer daemon")]
    AlreadyConnected,

    /// No channel has been opened yet.
    #[error("not connected to the transfer daemon")]
    NotConnected,

    /// Opening the RPC channel failed.
    #[error("failed to connect to transfer daemon at {address}: {source}")]
    Connect {
        /// Address that was dialled.
        address: String,
        /// Transport error.
        #[source]
        source: tonic::transport::Error,
    },

    /// The liveness probe failed.
    #[error("transfer daemon liveness probe failed: {0}")]
    Probe(#[source] Status),

    /// An RPC returned an error status.
    #[error("{operation} failed: {source}")]
    Rpc {
        /// RPC name.
        operation: &'static str,
        /// Status returned by the daemon.
        #[source]
        source: Status,
    },

    /// A bounded wait elapsed.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being waited for.
        operation: &'static str,
        /// Configured bound.
        after: Duration,
    },

    /// A local file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The event stream ended before a terminal status arrived.
    #[error("event stream for transfer {transfer_id} ended without a terminal status")]
    OutcomeUnknown {
        /// Session being monitored.
        transfer_id: String,
    },

    /// The daemon does not know the transfer.
    #[error("unknown transfer id {transfer_id}")]
    UnknownTransfer {
        /// Session being monitored.
        transfer_id: String,
    },

    /// A persistent session reported completion before it was locked.
    #[error("transfer {transfer_id} completed before it was locked ({batches} batches issued)")]
    CompletedBeforeLock {
        /// Session being fed.
        transfer_id: String,
        /// Batches handed to the feed before the completion arrived.
        batches: usize,
    },

    /// The daemon refused to start the session.
    #[error("transfer rejected by daemon (code {code}): {description}")]
    Rejected {
        /// Daemon error code.
        code: i32,
        /// Daemon error text.
        description: String,
    },

    /// An operation was attempted in the wrong session state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        /// Attempted operation.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// The transfer specification could not be interpreted.
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SessionError {
    /// Creates an RPC error.
    pub const fn rpc(operation: &'static str, source: Status) -> Self {
        Self::Rpc { operation, source }
    }

    /// Creates an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the category used to pick a process exit code.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) | Self::Spec(_) | Self::InvalidState { .. } => ErrorCategory::Setup,
            Self::Daemon(inner) => {
                if inner.is_process_failure() {
                    ErrorCategory::Process
                } else {
                    ErrorCategory::Setup
                }
            }
            Self::AlreadyConnected
            | Self::NotConnected
            | Self::Connect { .. }
            | Self::Probe(_)
            | Self::Task(_) => ErrorCategory::Connection,
            Self::Rpc { .. }
            | Self::Timeout { .. }
            | Self::OutcomeUnknown { .. }
            | Self::UnknownTransfer { .. }
            | Self::CompletedBeforeLock { .. }
            | Self::Rejected { .. } => ErrorCategory::Protocol,
            Self::Io { .. } => ErrorCategory::Io,
        }
    }
}

/// Maps I/O results to [`SessionError::Io`] with path context.
pub(crate) trait IoResultExt<T> {
    /// Attaches `path` to the error.
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T, SessionError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T, SessionError> {
        self.map_err(|e| SessionError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_failure_source() {
        assert_eq!(
            SessionError::Config("x".into()).category(),
            ErrorCategory::Setup
        );
        assert_eq!(
            SessionError::AlreadyConnected.category(),
            ErrorCategory::Connection
        );
        assert_eq!(
            SessionError::Rejected {
                code: 7,
                description: "bad".into()
            }
            .category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            SessionError::io("f", io::Error::other("x")).category(),
            ErrorCategory::Io
        );
    }

    #[test]
    fn daemon_process_failures_are_process_category() {
        let error = SessionError::from(DaemonError::PortDiscovery {
            log: PathBuf::from("d.log"),
            reason: "none".into(),
        });
        assert_eq!(error.category(), ErrorCategory::Process);

        let error = SessionError::from(DaemonError::InvalidAddress {
            url: "x".into(),
            reason: "y".into(),
        });
        assert_eq!(error.category(), ErrorCategory::Setup);
    }

    #[test]
    fn rejection_message_carries_daemon_text() {
        let error = SessionError::Rejected {
            code: 12,
            description: "ssh key missing".into(),
        };
        assert_eq!(
            error.to_string(),
            "transfer rejected by daemon (code 12): ssh key missing"
        );
    }
}
