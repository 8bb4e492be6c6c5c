//! crates/protocol/src/service.rs
//!
//! The daemon's control surface as seen by the orchestration layer.
//!
//! [`TransferService`] is the seam between session logic and transport: the
//! gRPC client in [`crate::grpc`] implements it for a live daemon, and test
//! doubles implement it in memory.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tonic::Status;

use crate::wire;

/// Server-pushed events returned by `MonitorTransfers`.
pub type EventStream = BoxStream<'static, Result<wire::TransferResponse, Status>>;

/// Client-pushed frames consumed by `WriteStream`; the call completes once the
/// stream ends.
pub type WriteRequestStream = BoxStream<'static, wire::WriteStreamRequest>;

/// RPC surface of the transfer daemon.
#[async_trait]
pub trait TransferService: Send + Sync {
    /// No-op call used as a liveness probe; reports the daemon API version.
    async fn get_info(&self) -> Result<wire::InstanceInfoResponse, Status>;

    /// Starts a session of the requested kind.
    async fn start_transfer(
        &self,
        request: wire::TransferRequest,
    ) -> Result<wire::StartTransferResponse, Status>;

    /// Enqueues more items into an open persistent session.
    async fn add_transfer_paths(
        &self,
        request: wire::TransferPathRequest,
    ) -> Result<wire::TransferPathResponse, Status>;

    /// Declares that no more items will be added to a persistent session.
    async fn lock_persistent_transfer(
        &self,
        request: wire::LockPersistentTransferRequest,
    ) -> Result<wire::LockPersistentTransferResponse, Status>;

    /// Subscribes to events for the transfers selected by the filters.
    async fn monitor_transfers(
        &self,
        request: wire::RegistrationRequest,
    ) -> Result<EventStream, Status>;

    /// Writes one file's chunks; resolves once the daemon acknowledges the
    /// closed request stream.
    async fn write_stream(
        &self,
        requests: WriteRequestStream,
    ) -> Result<wire::WriteStreamResponse, Status>;
}

/// Builds a subscription matching exactly one transfer.
pub fn registration_for(transfer_id: &str) -> wire::RegistrationRequest {
    wire::RegistrationRequest {
        filters: vec![wire::RegistrationFilter {
            operator: wire::RegistrationFilterOperator::Or.into(),
            transfer_id: vec![transfer_id.to_owned()],
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_uses_single_or_filter() {
        let request = registration_for("abc");
        assert_eq!(request.filters.len(), 1);
        let filter = &request.filters[0];
        assert_eq!(filter.operator(), wire::RegistrationFilterOperator::Or);
        assert_eq!(filter.transfer_id, vec!["abc".to_owned()]);
    }
}
