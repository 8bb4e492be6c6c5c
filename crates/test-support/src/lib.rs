//! Shared test utilities for the transferd-client workspace.
//!
//! [`MockTransferService`] replaces a live daemon behind the
//! `protocol::TransferService` seam; [`FakeDaemon`] provides executables the
//! supervisor can spawn on Unix hosts.

#[cfg(unix)]
mod fake_daemon;
mod mock;

#[cfg(unix)]
pub use fake_daemon::{FAKE_DAEMON_NAME, FakeDaemon};
pub use mock::{
    Call, MOCK_API_VERSION, MOCK_TRANSFER_ID, MockTransferService, Operation, failure_event,
    file_event, status_event,
};
