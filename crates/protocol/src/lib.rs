#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! Wire protocol for the `transferd` control surface.
//!
//! The crate is split into small modules:
//!
//! - [`wire`] holds the protobuf messages of `transferd.api.TransferService`.
//! - [`spec`] wraps the JSON transfer specification forwarded by
//!   `StartTransfer`.
//! - [`service`] defines the [`TransferService`] trait consumed by the session
//!   layer, independent of transport.
//! - [`grpc`] implements the trait over a plaintext tonic channel.
//!
//! # Examples
//!
//! Build the subscription used to follow one session and inspect the spec
//! payload sent to the daemon.
//!
//! ```
//! use protocol::{registration_for, TransferSpec};
//!
//! let spec =
//!     TransferSpec::from_json(r#"{"direction":"send","paths":[{"source":"faux:///1k?1k"}]}"#)
//!         .expect("spec parses");
//! assert_eq!(spec.paths().unwrap().len(), 1);
//!
//! let request = registration_for("3f1c");
//! assert_eq!(request.filters[0].transfer_id, ["3f1c"]);
//! ```

pub mod grpc;
pub mod service;
pub mod spec;
pub mod wire;

pub use grpc::{DEFAULT_CONNECT_TIMEOUT, GrpcTransferService};
pub use service::{EventStream, TransferService, WriteRequestStream, registration_for};
pub use spec::{Direction, PathEntry, SpecError, TransferSpec};
pub use wire::{TransferEvent, TransferStatus, TransferType};
