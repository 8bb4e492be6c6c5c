//! crates/protocol/src/grpc.rs
//!
//! tonic client for `transferd.api.TransferService`.
//!
//! The client is written against `tonic::client::Grpc` directly so the crate
//! does not need `protoc` at build time. Every call clones the underlying
//! [`Channel`], which is a cheap handle onto one shared HTTP/2 connection.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use crate::service::{EventStream, TransferService, WriteRequestStream};
use crate::wire;

const GET_INFO: &str = "/transferd.api.TransferService/GetInfo";
const START_TRANSFER: &str = "/transferd.api.TransferService/StartTransfer";
const ADD_TRANSFER_PATHS: &str = "/transferd.api.TransferService/AddTransferPaths";
const LOCK_PERSISTENT_TRANSFER: &str = "/transferd.api.TransferService/LockPersistentTransfer";
const MONITOR_TRANSFERS: &str = "/transferd.api.TransferService/MonitorTransfers";
const WRITE_STREAM: &str = "/transferd.api.TransferService/WriteStream";

/// Default time allowed to establish the plaintext HTTP/2 connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// [`TransferService`] backed by a live daemon.
#[derive(Clone, Debug)]
pub struct GrpcTransferService {
    channel: Channel,
}

impl GrpcTransferService {
    /// Opens a plaintext channel to `uri` (for example `http://127.0.0.1:55002`).
    pub async fn connect(
        uri: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, tonic::transport::Error> {
        let endpoint = Endpoint::from_shared(uri.into())?.connect_timeout(connect_timeout);
        let channel = endpoint.connect().await?;
        Ok(Self { channel })
    }

    /// Wraps an existing channel.
    pub const fn from_channel(channel: Channel) -> Self {
        Self { channel }
    }

    async fn ready(&self) -> Result<Grpc<Channel>, Status> {
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {e}")))?;
        Ok(grpc)
    }

    async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> Result<Resp, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = self.ready().await?;
        let response = grpc
            .unary(
                Request::new(request),
                PathAndQuery::from_static(path),
                ProstCodec::<Req, Resp>::default(),
            )
            .await?;
        Ok(response.into_inner())
    }
}

#[async_trait]
impl TransferService for GrpcTransferService {
    async fn get_info(&self) -> Result<wire::InstanceInfoResponse, Status> {
        self.unary(GET_INFO, wire::InstanceInfoRequest {}).await
    }

    async fn start_transfer(
        &self,
        request: wire::TransferRequest,
    ) -> Result<wire::StartTransferResponse, Status> {
        self.unary(START_TRANSFER, request).await
    }

    async fn add_transfer_paths(
        &self,
        request: wire::TransferPathRequest,
    ) -> Result<wire::TransferPathResponse, Status> {
        self.unary(ADD_TRANSFER_PATHS, request).await
    }

    async fn lock_persistent_transfer(
        &self,
        request: wire::LockPersistentTransferRequest,
    ) -> Result<wire::LockPersistentTransferResponse, Status> {
        self.unary(LOCK_PERSISTENT_TRANSFER, request).await
    }

    async fn monitor_transfers(
        &self,
        request: wire::RegistrationRequest,
    ) -> Result<EventStream, Status> {
        let mut grpc = self.ready().await?;
        let response = grpc
            .server_streaming(
                Request::new(request),
                PathAndQuery::from_static(MONITOR_TRANSFERS),
                ProstCodec::<wire::RegistrationRequest, wire::TransferResponse>::default(),
            )
            .await?;
        Ok(response.into_inner().boxed())
    }

    async fn write_stream(
        &self,
        requests: WriteRequestStream,
    ) -> Result<wire::WriteStreamResponse, Status> {
        let mut grpc = self.ready().await?;
        let response = grpc
            .client_streaming(
                Request::new(requests),
                PathAndQuery::from_static(WRITE_STREAM),
                ProstCodec::<wire::WriteStreamRequest, wire::WriteStreamResponse>::default(),
            )
            .await?;
        Ok(response.into_inner())
    }
}
