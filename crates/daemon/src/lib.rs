#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `daemon` launches and supervises the local `transferd` process. It writes
//! the JSON configuration document the daemon reads through `-c`, spawns the
//! executable with its standard streams redirected next to its log, watches a
//! short startup window for an immediate exit, and recovers the listening port
//! when the daemon was asked to choose one.
//!
//! # Design
//!
//! - [`SupervisorConfig`] gathers the executable path, address, log directory,
//!   log levels and timeouts through a [`SupervisorConfigBuilder`].
//! - [`Supervisor::start`] returns a [`DaemonHandle`] once the process has
//!   survived the startup probe.
//! - Port discovery sits behind [`ReadinessProtocol`]; [`LogScrapeReadiness`]
//!   reads the port from the daemon log.
//! - [`DaemonHandle::stop`] sends a terminate request, waits for the grace
//!   period and escalates to a kill.
//!
//! # Invariants
//!
//! - The configuration file is byte-identical for identical inputs.
//! - A daemon that exits inside the probe window is never handed out.
//! - A discovered port is always a positive `u16`.
//! - Stopping twice sends nothing the second time.
//!
//! # Examples
//!
//! ```no_run
//! use daemon::{DaemonAddress, Supervisor, SupervisorConfig};
//!
//! # async fn demo() -> Result<(), daemon::DaemonError> {
//! let config = SupervisorConfig::builder("/opt/sdk/bin/asperatransferd")
//!     .address(DaemonAddress::parse("grpc://127.0.0.1:0")?)
//!     .log_directory("/tmp/transferd")
//!     .build();
//! let mut handle = Supervisor::new(config).start().await?;
//! println!("daemon listening on {}", handle.address());
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

mod address;
mod config;
mod error;
mod readiness;
mod supervisor;

pub use address::{DEFAULT_PORT, DaemonAddress};
pub use config::{
    ConfigDocument, DEFAULT_SHUTDOWN_GRACE, DEFAULT_STARTUP_PROBE, DaemonLogLevel,
    RUNTIME_LOG_FILE, RuntimeBinaries, RuntimeLog, RuntimeLogLevel, RuntimeSection,
    SupervisorConfig, SupervisorConfigBuilder, UserDefinedRuntime,
};
pub use error::DaemonError;
pub use readiness::{LogScrapeReadiness, LogSegment, ReadinessProtocol, last_line, parse_port};
pub use supervisor::{DaemonHandle, ShutdownOutcome, Supervisor};
