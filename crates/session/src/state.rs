//! Session state machine.
//!
//! ```text
//! NotStarted -> Started -> Feeding -> Monitoring -> Completed
//!                    \                    ^    \-> Failed
//!                     \-------------------/
//! ```
//!
//! `Feeding` is entered only by persistent and streaming sessions. Any state
//! other than a terminal one may also move to `Failed`.

use std::fmt;
use std::str::FromStr;

use protocol::TransferType;

use crate::error::SessionError;

/// How items reach the daemon for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferMode {
    /// Every item is listed in the specification.
    Regular,
    /// Items are added while the session runs, then the session is locked.
    Persistent,
    /// File contents are pushed over the RPC channel.
    Streaming,
}

impl TransferMode {
    /// Returns the session kind sent in `StartTransfer`.
    pub const fn transfer_type(self) -> TransferType {
        match self {
            Self::Regular => TransferType::FileRegular,
            Self::Persistent => TransferType::FilePersistent,
            Self::Streaming => TransferType::StreamToFileUpload,
        }
    }

    /// Returns a lowercase label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Persistent => "persistent",
            Self::Streaming => "stream",
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferMode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(Self::Regular),
            "persistent" => Ok(Self::Persistent),
            "stream" | "streaming" => Ok(Self::Streaming),
            other => Err(SessionError::Config(format!("unknown transfer mode '{other}'"))),
        }
    }
}

/// Lifecycle position of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No `StartTransfer` has been acknowledged.
    NotStarted,
    /// The daemon assigned a transfer id.
    Started,
    /// Items or bytes are being pushed.
    Feeding,
    /// Waiting on the event stream.
    Monitoring,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
}

impl SessionState {
    /// Reports whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Reports whether moving to `next` is allowed.
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{Completed, Failed, Feeding, Monitoring, NotStarted, Started};
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (NotStarted, Started)
            | (Started, Feeding | Monitoring)
            | (Feeding, Feeding | Monitoring)
            | (Monitoring, Completed) => true,
            _ => false,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Started => "started",
            Self::Feeding => "feeding",
            Self::Monitoring => "monitoring",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A started session.
///
/// A `Session` exists only once the daemon has assigned its transfer id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    transfer_id: String,
    mode: TransferMode,
    state: SessionState,
}

impl Session {
    pub(crate) fn started(transfer_id: String, mode: TransferMode) -> Self {
        Self {
            transfer_id,
            mode,
            state: SessionState::Started,
        }
    }

    /// Returns the daemon-assigned id.
    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    /// Returns the session mode.
    pub const fn mode(&self) -> TransferMode {
        self.mode
    }

    /// Returns the current state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Moves to `next` on behalf of `operation`.
    pub fn advance(
        &mut self,
        operation: &'static str,
        next: SessionState,
    ) -> Result<(), SessionError> {
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidState {
                operation,
                state: self.state,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Marks the session failed unless it already reached a terminal state.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = SessionState::Failed;
        }
    }
}
