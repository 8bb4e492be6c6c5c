#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `session` drives transfer sessions on a running `transferd` daemon. It
//! opens and probes the RPC channel, starts sessions in regular, persistent or
//! streaming mode, pushes items or file bytes, and follows the server-pushed
//! event stream until the daemon reports a terminal status.
//!
//! # Design
//!
//! - [`ChannelManager`] holds at most one channel and only after a successful
//!   `GetInfo` probe.
//! - [`SessionController`] starts sessions. Persistent sessions are fed
//!   through a [`PersistentFeed`], whose `lock` consumes it.
//! - [`EventMonitor`] subscribes with a single-id filter and stops at the
//!   first `COMPLETED` or `FAILED` event.
//! - [`ChunkedUploadWriter`] streams each file over its own `WriteStream`
//!   call and waits for the acknowledgment before moving on.
//! - [`TransferOrchestrator`] ties the daemon supervisor to the pieces above
//!   and always stops the daemon.
//!
//! Everything talks to the daemon through [`protocol::TransferService`], so
//! tests substitute an in-memory implementation.
//!
//! # Examples
//!
//! ```no_run
//! use protocol::TransferSpec;
//! use session::{ChannelManager, SessionConfig, SessionController, TransferMode};
//!
//! # async fn demo() -> Result<(), session::SessionError> {
//! let mut channels = ChannelManager::default();
//! let address = daemon::DaemonAddress::parse("grpc://127.0.0.1:55002")?;
//! let channel = channels.connect(&address).await?;
//!
//! let controller = SessionController::new(channel, SessionConfig::default());
//! let spec = TransferSpec::from_json(
//!     r#"{"direction":"send","paths":[{"source":"faux:///1m?1m"}]}"#,
//! )?;
//! let mut session = controller.start(&spec, TransferMode::Regular).await?;
//! let outcome = controller.await_completion(&mut session).await?;
//! assert!(outcome.is_success());
//! # Ok(())
//! # }
//! ```

mod channel;
pub mod compat;
mod config;
mod controller;
mod error;
mod feed;
mod monitor;
mod orchestrator;
mod state;
mod upload;

pub use channel::{Channel, ChannelManager};
pub use config::{
    COMPAT_STREAM_KEY_ENV, DEFAULT_CHUNK_SIZE, DEFAULT_FILE_ACK_TIMEOUT,
    DEFAULT_STREAM_ACK_TIMEOUT, SessionConfig, SessionConfigBuilder,
};
pub use controller::SessionController;
pub use error::{ErrorCategory, SessionError};
pub use feed::{PeriodicFeeder, PersistentFeed};
pub use monitor::{EventMonitor, MonitorOutcome, SessionEvent, Subscription, TerminalStatus};
pub use orchestrator::{TransferOrchestrator, TransferReport};
pub use state::{Session, SessionState, TransferMode};
pub use upload::{ChunkedUploadWriter, UploadReport};
