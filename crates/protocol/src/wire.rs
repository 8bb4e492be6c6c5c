//! crates/protocol/src/wire.rs
//!
//! Protobuf messages exchanged with the `transferd.api.TransferService`.
//!
//! The types mirror the subset of the daemon's published schema that the
//! orchestration layer consumes. Field tags follow the published schema; fields
//! the client never reads or writes are omitted, which protobuf tolerates in
//! both directions.

/// Kind of session requested from the daemon.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TransferType {
    /// Single-shot file transfer described entirely by the transfer spec.
    FileRegular = 0,
    /// Client pushes file bytes over `WriteStream`.
    StreamToFileUpload = 1,
    /// Daemon pushes file bytes to the client.
    FileToStreamDownload = 2,
    /// Stream to stream relay.
    StreamToStream = 3,
    /// Session stays open and accepts `AddTransferPaths` until locked.
    FilePersistent = 4,
}

/// Status reported for a transfer session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TransferStatus {
    /// The daemon does not know the transfer.
    UnknownStatus = 0,
    /// Accepted and waiting for a slot.
    Queued = 1,
    /// Data is moving.
    Running = 2,
    /// Terminal: every item finished.
    Completed = 3,
    /// Terminal: the session failed.
    Failed = 4,
    /// Cancelled by a client.
    Canceled = 5,
    /// Paused by a client.
    Paused = 6,
    /// The owning client disappeared.
    Orphaned = 7,
}

impl TransferStatus {
    /// Returns the schema name of the status.
    pub const fn as_str_name(self) -> &'static str {
        match self {
            Self::UnknownStatus => "UNKNOWN_STATUS",
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::Paused => "PAUSED",
            Self::Orphaned => "ORPHANED",
        }
    }
}

/// Kind of event carried by a [`TransferResponse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TransferEvent {
    /// Event kind not reported.
    UnknownEvent = 0,
    /// Session began.
    SessionStart = 1,
    /// Session ended.
    SessionStop = 2,
    /// Session-level error.
    SessionError = 3,
    /// A file started.
    FileStart = 4,
    /// A file finished.
    FileStop = 5,
    /// A file failed.
    FileError = 6,
    /// A file was skipped.
    FileSkip = 7,
    /// Periodic progress for the current file.
    FileProgress = 8,
}

impl TransferEvent {
    /// Returns the schema name of the event.
    pub const fn as_str_name(self) -> &'static str {
        match self {
            Self::UnknownEvent => "UNKNOWN_EVENT",
            Self::SessionStart => "SESSION_START",
            Self::SessionStop => "SESSION_STOP",
            Self::SessionError => "SESSION_ERROR",
            Self::FileStart => "FILE_START",
            Self::FileStop => "FILE_STOP",
            Self::FileError => "FILE_ERROR",
            Self::FileSkip => "FILE_SKIP",
            Self::FileProgress => "FILE_PROGRESS",
        }
    }
}

/// Combination operator for a [`RegistrationFilter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RegistrationFilterOperator {
    /// Match when any criterion matches.
    Or = 0,
    /// Match when every criterion matches.
    And = 1,
}

/// `GetInfo` request.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct InstanceInfoRequest {}

/// `GetInfo` response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InstanceInfoResponse {
    /// API version implemented by the daemon.
    #[prost(string, tag = "1")]
    pub api_version: String,
}

/// Per-session tuning forwarded with a start request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransferConfig {
    /// Log target override for the session, empty for the daemon default.
    #[prost(string, tag = "1")]
    pub log_target: String,
}

/// Error detail attached to responses and events.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Error {
    /// Numeric error code.
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// Human readable description.
    #[prost(string, tag = "2")]
    pub description: String,
}

/// `StartTransfer` request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransferRequest {
    /// Session kind.
    #[prost(enumeration = "TransferType", tag = "1")]
    pub transfer_type: i32,
    /// Optional per-session tuning.
    #[prost(message, optional, tag = "2")]
    pub config: Option<TransferConfig>,
    /// Transfer specification serialized as JSON.
    #[prost(string, tag = "3")]
    pub transfer_spec: String,
}

/// `StartTransfer` response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartTransferResponse {
    /// Identifier assigned by the daemon.
    #[prost(string, tag = "1")]
    pub transfer_id: String,
    /// Status at acceptance time.
    #[prost(enumeration = "TransferStatus", tag = "2")]
    pub status: i32,
    /// Rejection detail, if any.
    #[prost(message, optional, tag = "3")]
    pub error: Option<Error>,
}

/// One `{source, destination}` item.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct TransferPath {
    /// Source path or URL.
    #[prost(string, tag = "1")]
    pub source: String,
    /// Destination path, empty for the daemon default.
    #[prost(string, tag = "2")]
    pub destination: String,
}

/// `AddTransferPaths` request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransferPathRequest {
    /// Persistent session receiving the paths.
    #[prost(string, tag = "1")]
    pub transfer_id: String,
    /// Items to enqueue.
    #[prost(message, repeated, tag = "2")]
    pub transfer_path: Vec<TransferPath>,
}

/// `AddTransferPaths` response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransferPathResponse {
    /// Session that received the paths.
    #[prost(string, tag = "1")]
    pub transfer_id: String,
    /// Rejection detail, if any.
    #[prost(message, optional, tag = "2")]
    pub error: Option<Error>,
}

/// `LockPersistentTransfer` request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LockPersistentTransferRequest {
    /// Persistent session to lock.
    #[prost(string, tag = "1")]
    pub transfer_id: String,
}

/// `LockPersistentTransfer` response.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LockPersistentTransferResponse {
    /// Session that was locked.
    #[prost(string, tag = "1")]
    pub transfer_id: String,
    /// Rejection detail, if any.
    #[prost(message, optional, tag = "2")]
    pub error: Option<Error>,
}

/// Subscription criterion for `MonitorTransfers`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegistrationFilter {
    /// How the criteria combine.
    #[prost(enumeration = "RegistrationFilterOperator", tag = "1")]
    pub operator: i32,
    /// Transfers to observe.
    #[prost(string, repeated, tag = "2")]
    pub transfer_id: Vec<String>,
}

/// `MonitorTransfers` request.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegistrationRequest {
    /// Filters, combined with OR by the daemon.
    #[prost(message, repeated, tag = "1")]
    pub filters: Vec<RegistrationFilter>,
}

/// Per-file progress attached to an event.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileInfo {
    /// File path as seen by the daemon.
    #[prost(string, tag = "1")]
    pub path: String,
    /// Bytes moved so far.
    #[prost(int64, tag = "2")]
    pub bytes_transferred: i64,
    /// Bytes expected in total.
    #[prost(int64, tag = "3")]
    pub bytes_expected: i64,
}

/// One event pushed by `MonitorTransfers`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TransferResponse {
    /// Session the event belongs to.
    #[prost(string, tag = "1")]
    pub transfer_id: String,
    /// Session kind.
    #[prost(enumeration = "TransferType", tag = "2")]
    pub transfer_type: i32,
    /// Session status after the event.
    #[prost(enumeration = "TransferStatus", tag = "3")]
    pub status: i32,
    /// Error detail, if any.
    #[prost(message, optional, tag = "4")]
    pub error: Option<Error>,
    /// Event kind.
    #[prost(enumeration = "TransferEvent", tag = "5")]
    pub transfer_event: i32,
    /// File progress, if the event concerns a file.
    #[prost(message, optional, tag = "6")]
    pub file_info: Option<FileInfo>,
    /// Free-text message.
    #[prost(string, tag = "7")]
    pub message: String,
}

/// Payload of one `WriteStream` chunk.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Chunk {
    /// Raw bytes.
    #[prost(bytes = "vec", tag = "1")]
    pub contents: Vec<u8>,
}

/// One `WriteStream` request frame.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteStreamRequest {
    /// Streaming session.
    #[prost(string, tag = "1")]
    pub transfer_id: String,
    /// Destination name of the file being written.
    #[prost(string, tag = "2")]
    pub path: String,
    /// Total size of the file.
    #[prost(uint64, tag = "3")]
    pub size: u64,
    /// Chunk payload.
    #[prost(message, optional, tag = "4")]
    pub chunk: Option<Chunk>,
}

/// `WriteStream` acknowledgment, sent once the request stream is closed.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WriteStreamResponse {
    /// Streaming session.
    #[prost(string, tag = "1")]
    pub transfer_id: String,
    /// Rejection detail, if any.
    #[prost(message, optional, tag = "2")]
    pub error: Option<Error>,
}
