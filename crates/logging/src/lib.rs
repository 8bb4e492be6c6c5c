#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` maps the client's `-v`/`-q` flags to tracing filter directives
//! and, with the `tracing` feature, installs the process-wide subscriber.
//!
//! # Design
//!
//! [`Verbosity`] is a plain ordered enum so the CLI can compare levels
//! without pulling in tracing. Workspace crates are raised one level above
//! their dependencies at the default level, so `tonic` and `h2` stay at
//! `warn` while session progress is visible.
//!
//! # Invariants
//!
//! - `RUST_LOG` always overrides the flag-derived directives.
//! - Installing the subscriber twice keeps the first one.
//!
//! # Examples
//!
//! ```
//! use logging::Verbosity;
//!
//! let level = Verbosity::from_flags(1, false);
//! assert_eq!(level, Verbosity::Verbose);
//! assert!(level.directives().contains("session=debug"));
//! ```

#[cfg(feature = "tracing")]
mod tracing_bridge;
mod verbosity;

#[cfg(feature = "tracing")]
pub use tracing_bridge::{env_filter, init_tracing};
pub use verbosity::{ParseVerbosityError, Verbosity, WORKSPACE_TARGETS};
