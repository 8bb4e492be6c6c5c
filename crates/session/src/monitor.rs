//! Event monitor: follow one session until it reaches a terminal status.

use std::fmt;
use std::time::Duration;

use futures::StreamExt;
use protocol::wire::{self, TransferResponse};
use protocol::{EventStream, TransferEvent, TransferStatus, registration_for};
use tracing::{debug, error, info};

use crate::channel::Channel;
use crate::error::SessionError;

/// Final status of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalStatus {
    /// The daemon reported `COMPLETED`.
    Completed,
    /// The daemon reported `FAILED`.
    Failed,
}

/// Result of [`EventMonitor::await_completion`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorOutcome {
    /// Terminal status reported by the daemon.
    pub status: TerminalStatus,
    /// Number of events received for the session, terminal one included.
    pub events_observed: usize,
    /// Error attached to the terminal event, if any.
    pub error: Option<(i32, String)>,
}

impl MonitorOutcome {
    /// Reports whether the session completed.
    pub fn is_success(&self) -> bool {
        self.status == TerminalStatus::Completed
    }
}

/// One decoded event.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionEvent {
    /// Session the event belongs to.
    pub transfer_id: String,
    /// Session status at the time of the event.
    pub status: TransferStatus,
    /// Event kind.
    pub kind: TransferEvent,
    /// File the event refers to.
    pub file: Option<wire::FileInfo>,
    /// Error reported with the event.
    pub error: Option<wire::Error>,
    /// Free-form daemon message.
    pub message: String,
}

impl From<TransferResponse> for SessionEvent {
    fn from(response: TransferResponse) -> Self {
        Self {
            status: response.status(),
            kind: response.transfer_event(),
            transfer_id: response.transfer_id,
            file: response.file_info,
            error: response.error,
            message: response.message,
        }
    }
}

impl SessionEvent {
    fn log(&self) {
        info!(
            transfer_id = %self.transfer_id,
            event = self.kind.as_str_name(),
            status = self.status.as_str_name(),
            "transfer event"
        );
        if let Some(file) = &self.file {
            debug!(
                path = %file.path,
                transferred = file.bytes_transferred,
                expected = file.bytes_expected,
                "file progress"
            );
        }
        if !self.message.is_empty() {
            debug!(message = %self.message, "daemon message");
        }
        if let Some(err) = &self.error {
            error!(code = err.code, description = %err.description, "transfer error");
        }
    }
}

/// Subscribes to a session's events and waits for the outcome.
#[derive(Clone)]
pub struct EventMonitor {
    channel: Channel,
    timeout: Option<Duration>,
}

impl EventMonitor {
    /// Creates a monitor with an optional overall timeout.
    pub fn new(channel: Channel, timeout: Option<Duration>) -> Self {
        Self { channel, timeout }
    }

    /// Blocks until the first `COMPLETED` or `FAILED` event for `transfer_id`.
    ///
    /// The stream is dropped at the terminal event without being drained.
    pub async fn await_completion(
        &self,
        transfer_id: &str,
    ) -> Result<MonitorOutcome, SessionError> {
        self.subscribe(transfer_id).await?.outcome().await
    }

    /// Opens the event stream for `transfer_id` without reading from it.
    ///
    /// Subscribing before items are added guarantees no event is missed.
    pub async fn subscribe(&self, transfer_id: &str) -> Result<Subscription, SessionError> {
        let events = self
            .channel
            .monitor_transfers(registration_for(transfer_id))
            .await
            .map_err(|status| SessionError::rpc("MonitorTransfers", status))?;
        debug!(%transfer_id, "monitoring transfer");
        Ok(Subscription {
            transfer_id: transfer_id.to_owned(),
            events,
            timeout: self.timeout,
        })
    }
}

/// An open event stream for one session.
pub struct Subscription {
    transfer_id: String,
    events: EventStream,
    timeout: Option<Duration>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("transfer_id", &self.transfer_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Returns the session being followed.
    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    /// Reads events until the session reaches a terminal status.
    ///
    /// The monitor's timeout, when set, bounds this wait.
    pub async fn outcome(self) -> Result<MonitorOutcome, SessionError> {
        let timeout = self.timeout;
        match timeout {
            Some(after) => tokio::time::timeout(after, self.follow())
                .await
                .map_err(|_| SessionError::Timeout {
                    operation: "await completion",
                    after,
                })?,
            None => self.follow().await,
        }
    }

    async fn follow(self) -> Result<MonitorOutcome, SessionError> {
        let Self {
            transfer_id,
            mut events,
            ..
        } = self;
        let mut observed = 0;
        while let Some(item) = events.next().await {
            let response = item.map_err(|status| SessionError::rpc("MonitorTransfers", status))?;
            if !response.transfer_id.is_empty() && response.transfer_id != transfer_id {
                continue;
            }
            observed += 1;
            let event = SessionEvent::from(response);
            event.log();
            let status = match event.status {
                TransferStatus::Completed => TerminalStatus::Completed,
                TransferStatus::Failed => TerminalStatus::Failed,
                TransferStatus::UnknownStatus => {
                    return Err(SessionError::UnknownTransfer { transfer_id });
                }
                _ => continue,
            };
            info!(%transfer_id, ?status, events = observed, "transfer finished");
            return Ok(MonitorOutcome {
                status,
                events_observed: observed,
                error: event.error.map(|e| (e.code, e.description)),
            });
        }
        Err(SessionError::OutcomeUnknown { transfer_id })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use protocol::wire::RegistrationFilterOperator;
    use test_support::{Call, MockTransferService, failure_event, file_event, status_event};

    use super::*;

    const ID: &str = "t-42";

    fn monitor(mock: &MockTransferService, timeout: Option<Duration>) -> EventMonitor {
        EventMonitor::new(Arc::new(mock.clone()), timeout)
    }

    #[tokio::test]
    async fn stops_at_completed_without_draining() {
        let mock = MockTransferService::new()
            .with_events([
                status_event(ID, TransferStatus::Queued, TransferEvent::SessionStart),
                file_event(ID, "a.bin", 512, 1024),
                status_event(ID, TransferStatus::Completed, TransferEvent::SessionStop),
                status_event(ID, TransferStatus::Running, TransferEvent::FileStart),
            ])
            .keep_stream_open();

        let outcome = monitor(&mock, None).await_completion(ID).await.unwrap();
        assert_eq!(outcome.status, TerminalStatus::Completed);
        assert_eq!(outcome.events_observed, 3);
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn started_then_completed_is_two_events() {
        let mock = MockTransferService::new().with_events([
            status_event(ID, TransferStatus::Running, TransferEvent::SessionStart),
            status_event(ID, TransferStatus::Completed, TransferEvent::SessionStop),
        ]);
        let outcome = monitor(&mock, None).await_completion(ID).await.unwrap();
        assert_eq!(outcome.status, TerminalStatus::Completed);
        assert_eq!(outcome.events_observed, 2);
        assert_eq!(outcome.error, None);
    }

    #[tokio::test]
    async fn subscription_is_open_before_any_event_is_read() {
        let mock = MockTransferService::new().with_events([status_event(
            ID,
            TransferStatus::Completed,
            TransferEvent::SessionStop,
        )]);
        let subscription = monitor(&mock, None).subscribe(ID).await.unwrap();
        assert_eq!(subscription.transfer_id(), ID);
        assert_eq!(mock.calls().len(), 1);

        let outcome = subscription.outcome().await.unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn subscribes_with_single_or_filter() {
        let mock = MockTransferService::new().with_events([status_event(
            ID,
            TransferStatus::Completed,
            TransferEvent::SessionStop,
        )]);
        monitor(&mock, None).await_completion(ID).await.unwrap();

        let Some(Call::MonitorTransfers(request)) = mock.calls().into_iter().next() else {
            panic!("expected a subscription");
        };
        assert_eq!(request.filters.len(), 1);
        assert_eq!(request.filters[0].operator(), RegistrationFilterOperator::Or);
        assert_eq!(request.filters[0].transfer_id, [ID]);
    }

    #[tokio::test]
    async fn failed_is_terminal_and_keeps_error() {
        let mock = MockTransferService::new()
            .with_events([failure_event(ID, 44, "authentication failed")]);
        let outcome = monitor(&mock, None).await_completion(ID).await.unwrap();
        assert_eq!(outcome.status, TerminalStatus::Failed);
        assert_eq!(outcome.error, Some((44, "authentication failed".to_owned())));
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn unknown_status_is_an_error() {
        let mock = MockTransferService::new().with_events([status_event(
            ID,
            TransferStatus::UnknownStatus,
            TransferEvent::UnknownEvent,
        )]);
        let error = monitor(&mock, None).await_completion(ID).await.unwrap_err();
        assert!(matches!(error, SessionError::UnknownTransfer { .. }));
    }

    #[tokio::test]
    async fn stream_end_without_terminal_status_is_unknown_outcome() {
        let mock = MockTransferService::new().with_events([status_event(
            ID,
            TransferStatus::Running,
            TransferEvent::FileStart,
        )]);
        let error = monitor(&mock, None).await_completion(ID).await.unwrap_err();
        assert!(matches!(
            error,
            SessionError::OutcomeUnknown { transfer_id } if transfer_id == ID
        ));
    }

    #[tokio::test]
    async fn events_for_other_sessions_are_ignored() {
        let mock = MockTransferService::new().with_events([
            status_event("other", TransferStatus::Failed, TransferEvent::SessionStop),
            status_event(ID, TransferStatus::Completed, TransferEvent::SessionStop),
        ]);
        let outcome = monitor(&mock, None).await_completion(ID).await.unwrap();
        assert_eq!(outcome.status, TerminalStatus::Completed);
        assert_eq!(outcome.events_observed, 1);
    }

    #[tokio::test]
    async fn transport_error_is_reported() {
        let mock =
            MockTransferService::new().with_stream_error(tonic::Status::internal("reset"));
        let error = monitor(&mock, None).await_completion(ID).await.unwrap_err();
        assert!(matches!(
            error,
            SessionError::Rpc {
                operation: "MonitorTransfers",
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn optional_timeout_bounds_the_wait() {
        let mock = MockTransferService::new().keep_stream_open();
        let error = monitor(&mock, Some(Duration::from_secs(30)))
            .await_completion(ID)
            .await
            .unwrap_err();
        assert!(matches!(error, SessionError::Timeout { .. }));
    }
}
