//! Session controller: start sessions in each mode and follow them to the end.

use protocol::wire::{StartTransferResponse, TransferRequest};
use protocol::{TransferSpec, TransferStatus};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::feed::PersistentFeed;
use crate::monitor::{EventMonitor, MonitorOutcome, TerminalStatus};
use crate::state::{Session, SessionState, TransferMode};
use crate::upload::{ChunkedUploadWriter, UploadReport};

/// Starts and completes sessions over one channel.
#[derive(Clone)]
pub struct SessionController {
    channel: Channel,
    config: SessionConfig,
}

impl SessionController {
    /// Creates a controller.
    pub fn new(channel: Channel, config: SessionConfig) -> Self {
        Self { channel, config }
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns an event monitor bound to this controller's channel.
    pub fn monitor(&self) -> EventMonitor {
        EventMonitor::new(self.channel.clone(), self.config.monitor_timeout())
    }

    /// Starts a session.
    ///
    /// Regular and persistent sessions send one `StartTransfer`. Streaming
    /// sessions go through [`start_streaming`](Self::start_streaming) and the
    /// upload report is logged.
    pub async fn start(
        &self,
        spec: &TransferSpec,
        mode: TransferMode,
    ) -> Result<Session, SessionError> {
        if mode == TransferMode::Streaming {
            let (session, _report) = self.start_streaming(spec).await?;
            return Ok(session);
        }
        let transfer_id = send_start(&self.channel, spec, mode).await?;
        info!(%transfer_id, %mode, "transfer session started");
        Ok(Session::started(transfer_id, mode))
    }

    /// Starts a persistent session and returns its feed.
    pub async fn start_persistent(
        &self,
        spec: &TransferSpec,
    ) -> Result<PersistentFeed, SessionError> {
        let session = self.start(spec, TransferMode::Persistent).await?;
        PersistentFeed::new(self.channel.clone(), session)
    }

    /// Starts a streaming upload and pushes every listed file.
    ///
    /// The specification is copied, its `paths` removed and the enabled
    /// compatibility shims applied. The start call and the uploads run on a
    /// spawned task; the transfer id comes back through a one-shot channel and
    /// the whole exchange must finish within the stream acknowledgment
    /// timeout.
    pub async fn start_streaming(
        &self,
        spec: &TransferSpec,
    ) -> Result<(Session, UploadReport), SessionError> {
        let mut prepared = spec.clone();
        let sources = prepared.take_paths()?;
        let applied = self.config.shims().apply_streaming(&mut prepared);
        debug!(files = sources.len(), ?applied, "prepared streaming spec");

        let writer = ChunkedUploadWriter::new(
            self.channel.clone(),
            self.config.chunk_size(),
            self.config.file_ack_timeout(),
        );
        let channel = self.channel.clone();
        let (id_tx, id_rx) = oneshot::channel();
        let mut task = tokio::spawn(async move {
            let transfer_id = send_start(&channel, &prepared, TransferMode::Streaming).await?;
            let _ = id_tx.send(transfer_id.clone());
            writer.upload(&transfer_id, &sources).await
        });

        let after = self.config.stream_ack_timeout();
        let deadline = Instant::now() + after;
        let timed_out = SessionError::Timeout {
            operation: "stream start acknowledgment",
            after,
        };

        let transfer_id = match tokio::time::timeout_at(deadline, id_rx).await {
            Ok(Ok(transfer_id)) => transfer_id,
            Ok(Err(_)) => {
                // The task finished without a transfer id; surface its error.
                return match task.await? {
                    Err(e) => Err(e),
                    Ok(_) => Err(SessionError::Rejected {
                        code: 0,
                        description: "stream start ended without a transfer id".to_owned(),
                    }),
                };
            }
            Err(_) => {
                task.abort();
                return Err(timed_out);
            }
        };
        info!(%transfer_id, "streaming session started");
        let mut session = Session::started(transfer_id, TransferMode::Streaming);
        session.advance("stream upload", SessionState::Feeding)?;

        let report = match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(joined) => joined?.inspect_err(|_| session.fail())?,
            Err(_) => {
                task.abort();
                return Err(timed_out);
            }
        };
        Ok((session, report))
    }

    /// Waits for `session` to reach a terminal status and records it.
    pub async fn await_completion(
        &self,
        session: &mut Session,
    ) -> Result<MonitorOutcome, SessionError> {
        session.advance("await completion", SessionState::Monitoring)?;
        match self.monitor().await_completion(session.transfer_id()).await {
            Ok(outcome) => {
                match outcome.status {
                    TerminalStatus::Completed => {
                        session.advance("await completion", SessionState::Completed)?;
                    }
                    TerminalStatus::Failed => session.fail(),
                }
                Ok(outcome)
            }
            Err(e) => {
                session.fail();
                Err(e)
            }
        }
    }
}

async fn send_start(
    channel: &Channel,
    spec: &TransferSpec,
    mode: TransferMode,
) -> Result<String, SessionError> {
    debug!(%mode, "sending StartTransfer");
    let request = TransferRequest {
        transfer_type: mode.transfer_type().into(),
        config: None,
        transfer_spec: spec.to_wire(),
    };
    let response = channel
        .start_transfer(request)
        .await
        .map_err(|status| SessionError::rpc("StartTransfer", status))?;
    accept_start(response)
}

fn accept_start(response: StartTransferResponse) -> Result<String, SessionError> {
    let failed = response.status() == TransferStatus::Failed;
    if let Some(err) = response
        .error
        .filter(|e| failed || e.code != 0 || !e.description.is_empty())
    {
        return Err(SessionError::Rejected {
            code: err.code,
            description: err.description,
        });
    }
    if failed {
        return Err(SessionError::Rejected {
            code: 0,
            description: "daemon reported FAILED".to_owned(),
        });
    }
    if response.transfer_id.is_empty() {
        return Err(SessionError::Rejected {
            code: 0,
            description: "daemon returned an empty transfer id".to_owned(),
        });
    }
    Ok(response.transfer_id)
}

#[cfg(test)]
mod tests;
