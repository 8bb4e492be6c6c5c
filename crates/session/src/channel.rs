//! Channel manager: one probed RPC channel per client.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use daemon::DaemonAddress;
use protocol::{DEFAULT_CONNECT_TIMEOUT, GrpcTransferService, TransferService};
use tracing::{debug, info};

use crate::error::SessionError;

/// Shared handle onto the daemon's control surface.
pub type Channel = Arc<dyn TransferService>;

/// Opens the RPC channel once and keeps it for the client's lifetime.
///
/// A channel is stored only after the `GetInfo` liveness probe succeeds.
pub struct ChannelManager {
    channel: Option<Channel>,
    api_version: Option<String>,
    connect_timeout: Duration,
}

impl fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelManager")
            .field("connected", &self.channel.is_some())
            .field("api_version", &self.api_version)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl ChannelManager {
    /// Creates a manager with no channel.
    pub const fn new(connect_timeout: Duration) -> Self {
        Self {
            channel: None,
            api_version: None,
            connect_timeout,
        }
    }

    /// Opens a plaintext channel to `address` and probes it.
    pub async fn connect(&mut self, address: &DaemonAddress) -> Result<Channel, SessionError> {
        if self.channel.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        let uri = address.endpoint_uri();
        debug!(%uri, "opening channel");
        let service = GrpcTransferService::connect(uri, self.connect_timeout)
            .await
            .map_err(|source| SessionError::Connect {
                address: address.to_string(),
                source,
            })?;
        self.attach(Arc::new(service)).await
    }

    /// Probes and adopts an already built service.
    pub async fn attach(&mut self, service: Channel) -> Result<Channel, SessionError> {
        if self.channel.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        let info = service.get_info().await.map_err(SessionError::Probe)?;
        info!(api_version = %info.api_version, "connected to transfer daemon");
        self.api_version = Some(info.api_version);
        self.channel = Some(Arc::clone(&service));
        Ok(service)
    }

    /// Returns the channel, if connected.
    pub fn channel(&self) -> Result<Channel, SessionError> {
        self.channel.clone().ok_or(SessionError::NotConnected)
    }

    /// Reports whether a channel is held.
    pub const fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Returns the API version reported by the probe.
    pub fn api_version(&self) -> Option<&str> {
        self.api_version.as_deref()
    }
}
