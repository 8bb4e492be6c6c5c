//! In-memory [`TransferService`] that records every call.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use protocol::wire::{
    Error, FileInfo, InstanceInfoResponse, LockPersistentTransferRequest,
    LockPersistentTransferResponse, RegistrationRequest, StartTransferResponse, TransferPathRequest,
    TransferPathResponse, TransferRequest, TransferResponse, WriteStreamRequest,
    WriteStreamResponse,
};
use protocol::{EventStream, TransferEvent, TransferService, TransferStatus, WriteRequestStream};
use tokio::sync::watch;
use tonic::Status;

/// Transfer id handed out by default.
pub const MOCK_TRANSFER_ID: &str = "7d3c2b1a-mock";

/// API version reported by `GetInfo`.
pub const MOCK_API_VERSION: &str = "1.1.3";

/// RPC names, used to inject failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `GetInfo`.
    GetInfo,
    /// `StartTransfer`.
    StartTransfer,
    /// `AddTransferPaths`.
    AddTransferPaths,
    /// `LockPersistentTransfer`.
    LockPersistentTransfer,
    /// `MonitorTransfers`.
    MonitorTransfers,
    /// `WriteStream`.
    WriteStream,
}

/// One recorded RPC.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    /// Liveness probe.
    GetInfo,
    /// Session start.
    StartTransfer(TransferRequest),
    /// Persistent session item batch.
    AddTransferPaths(TransferPathRequest),
    /// Persistent session lock.
    LockPersistentTransfer(LockPersistentTransferRequest),
    /// Event subscription.
    MonitorTransfers(RegistrationRequest),
    /// One file's worth of streamed frames.
    WriteStream(Vec<WriteStreamRequest>),
}

impl Call {
    /// Returns the operation this call belongs to.
    pub const fn operation(&self) -> Operation {
        match self {
            Self::GetInfo => Operation::GetInfo,
            Self::StartTransfer(_) => Operation::StartTransfer,
            Self::AddTransferPaths(_) => Operation::AddTransferPaths,
            Self::LockPersistentTransfer(_) => Operation::LockPersistentTransfer,
            Self::MonitorTransfers(_) => Operation::MonitorTransfers,
            Self::WriteStream(_) => Operation::WriteStream,
        }
    }
}

#[derive(Debug)]
struct Script {
    transfer_id: String,
    start_status: TransferStatus,
    start_error: Option<Error>,
    start_delay: Duration,
    write_delay: Duration,
    events: Vec<Result<TransferResponse, Status>>,
    keep_open: bool,
    hold_until_lock: bool,
    failures: HashSet<Operation>,
}

#[derive(Debug)]
struct Inner {
    script: Script,
    calls: Vec<Call>,
    locked: watch::Sender<bool>,
}

/// Scriptable [`TransferService`] double.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect the recorded calls through another.
#[derive(Clone, Debug)]
pub struct MockTransferService {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MockTransferService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransferService {
    /// Creates a mock that accepts every call and reports no events.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                script: Script {
                    transfer_id: MOCK_TRANSFER_ID.to_owned(),
                    start_status: TransferStatus::Queued,
                    start_error: None,
                    start_delay: Duration::ZERO,
                    write_delay: Duration::ZERO,
                    events: Vec::new(),
                    keep_open: false,
                    hold_until_lock: false,
                    failures: HashSet::new(),
                },
                calls: Vec::new(),
                locked: watch::channel(false).0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Sets the transfer id returned by `StartTransfer`.
    #[must_use]
    pub fn with_transfer_id(self, id: impl Into<String>) -> Self {
        self.lock().script.transfer_id = id.into();
        self
    }

    /// Sets the status and error carried by the `StartTransfer` response.
    #[must_use]
    pub fn with_start_response(self, status: TransferStatus, error: Option<(i32, &str)>) -> Self {
        {
            let mut inner = self.lock();
            inner.script.start_status = status;
            inner.script.start_error = error.map(|(code, description)| Error {
                code,
                description: description.to_owned(),
            });
        }
        self
    }

    /// Delays the `StartTransfer` response.
    #[must_use]
    pub fn with_start_delay(self, delay: Duration) -> Self {
        self.lock().script.start_delay = delay;
        self
    }

    /// Delays each `WriteStream` acknowledgment after the request stream closes.
    #[must_use]
    pub fn with_write_delay(self, delay: Duration) -> Self {
        self.lock().script.write_delay = delay;
        self
    }

    /// Queues events served by the next `MonitorTransfers` call.
    #[must_use]
    pub fn with_events(self, events: impl IntoIterator<Item = TransferResponse>) -> Self {
        self.lock().script.events = events.into_iter().map(Ok).collect();
        self
    }

    /// Appends a transport error to the scripted events.
    #[must_use]
    pub fn with_stream_error(self, status: Status) -> Self {
        self.lock().script.events.push(Err(status));
        self
    }

    /// Leaves the event stream open after the scripted events.
    #[must_use]
    pub fn keep_stream_open(self) -> Self {
        self.lock().script.keep_open = true;
        self
    }

    /// Withholds the scripted events until `LockPersistentTransfer` arrives.
    #[must_use]
    pub fn hold_events_until_lock(self) -> Self {
        self.lock().script.hold_until_lock = true;
        self
    }

    /// Makes `operation` fail with `UNAVAILABLE`.
    #[must_use]
    pub fn failing(self, operation: Operation) -> Self {
        self.lock().script.failures.insert(operation);
        self
    }

    /// Returns every call received so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Returns the operations received so far, in order.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().calls.iter().map(Call::operation).collect()
    }

    /// Returns `(path, contents)` for every streamed file, in order.
    pub fn written_files(&self) -> Vec<(String, Vec<u8>)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::WriteStream(frames) => {
                    let path = frames.first().map(|f| f.path.clone()).unwrap_or_default();
                    let contents = frames
                        .iter()
                        .filter_map(|f| f.chunk.as_ref())
                        .flat_map(|chunk| chunk.contents.iter().copied())
                        .collect();
                    Some((path, contents))
                }
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> Result<(), Status> {
        let mut inner = self.lock();
        let operation = call.operation();
        inner.calls.push(call);
        if inner.script.failures.contains(&operation) {
            return Err(Status::unavailable(format!("{operation:?} failed")));
        }
        Ok(())
    }

    fn transfer_id(&self) -> String {
        self.lock().script.transfer_id.clone()
    }
}

#[async_trait]
impl TransferService for MockTransferService {
    async fn get_info(&self) -> Result<InstanceInfoResponse, Status> {
        self.record(Call::GetInfo)?;
        Ok(InstanceInfoResponse {
            api_version: MOCK_API_VERSION.to_owned(),
        })
    }

    async fn start_transfer(
        &self,
        request: TransferRequest,
    ) -> Result<StartTransferResponse, Status> {
        self.record(Call::StartTransfer(request))?;
        let (delay, response) = {
            let inner = self.lock();
            (
                inner.script.start_delay,
                StartTransferResponse {
                    transfer_id: inner.script.transfer_id.clone(),
                    status: inner.script.start_status.into(),
                    error: inner.script.start_error.clone(),
                },
            )
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(response)
    }

    async fn add_transfer_paths(
        &self,
        request: TransferPathRequest,
    ) -> Result<TransferPathResponse, Status> {
        let transfer_id = request.transfer_id.clone();
        self.record(Call::AddTransferPaths(request))?;
        Ok(TransferPathResponse {
            transfer_id,
            error: None,
        })
    }

    async fn lock_persistent_transfer(
        &self,
        request: LockPersistentTransferRequest,
    ) -> Result<LockPersistentTransferResponse, Status> {
        let transfer_id = request.transfer_id.clone();
        self.record(Call::LockPersistentTransfer(request))?;
        self.lock().locked.send_replace(true);
        Ok(LockPersistentTransferResponse {
            transfer_id,
            error: None,
        })
    }

    async fn monitor_transfers(&self, request: RegistrationRequest) -> Result<EventStream, Status> {
        self.record(Call::MonitorTransfers(request))?;
        let (events, keep_open, gate) = {
            let mut inner = self.lock();
            let gate = inner
                .script
                .hold_until_lock
                .then(|| inner.locked.subscribe());
            (
                std::mem::take(&mut inner.script.events),
                inner.script.keep_open,
                gate,
            )
        };
        let scripted = stream::once(async move {
            if let Some(mut locked) = gate {
                while !*locked.borrow_and_update() {
                    if locked.changed().await.is_err() {
                        break;
                    }
                }
            }
            stream::iter(events)
        })
        .flatten();
        if keep_open {
            Ok(scripted.chain(stream::pending()).boxed())
        } else {
            Ok(scripted.boxed())
        }
    }

    async fn write_stream(
        &self,
        requests: WriteRequestStream,
    ) -> Result<WriteStreamResponse, Status> {
        let frames: Vec<WriteStreamRequest> = requests.collect().await;
        let transfer_id = frames
            .first()
            .map_or_else(|| self.transfer_id(), |f| f.transfer_id.clone());
        self.record(Call::WriteStream(frames))?;
        let delay = self.lock().script.write_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(WriteStreamResponse {
            transfer_id,
            error: None,
        })
    }
}

/// Builds a status event for `transfer_id`.
pub fn status_event(
    transfer_id: &str,
    status: TransferStatus,
    event: TransferEvent,
) -> TransferResponse {
    TransferResponse {
        transfer_id: transfer_id.to_owned(),
        status: status.into(),
        transfer_event: event.into(),
        ..TransferResponse::default()
    }
}

/// Builds a file progress event for `transfer_id`.
pub fn file_event(
    transfer_id: &str,
    path: &str,
    transferred: i64,
    expected: i64,
) -> TransferResponse {
    TransferResponse {
        file_info: Some(FileInfo {
            path: path.to_owned(),
            bytes_transferred: transferred,
            bytes_expected: expected,
        }),
        ..status_event(transfer_id, TransferStatus::Running, TransferEvent::FileProgress)
    }
}

/// Builds a failure event carrying an error.
pub fn failure_event(transfer_id: &str, code: i32, description: &str) -> TransferResponse {
    TransferResponse {
        error: Some(Error {
            code,
            description: description.to_owned(),
        }),
        ..status_event(transfer_id, TransferStatus::Failed, TransferEvent::SessionStop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_serves_scripted_events() {
        let mock = MockTransferService::new().with_events([status_event(
            MOCK_TRANSFER_ID,
            TransferStatus::Completed,
            TransferEvent::SessionStop,
        )]);

        mock.get_info().await.unwrap();
        let mut events = mock
            .monitor_transfers(protocol::registration_for(MOCK_TRANSFER_ID))
            .await
            .unwrap();
        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first.status(), TransferStatus::Completed);
        assert!(events.next().await.is_none());
        assert_eq!(
            mock.operations(),
            [Operation::GetInfo, Operation::MonitorTransfers]
        );
    }

    #[tokio::test]
    async fn held_events_wait_for_the_lock() {
        let mock = MockTransferService::new()
            .with_events([status_event(
                MOCK_TRANSFER_ID,
                TransferStatus::Completed,
                TransferEvent::SessionStop,
            )])
            .hold_events_until_lock();
        let mut events = mock
            .monitor_transfers(protocol::registration_for(MOCK_TRANSFER_ID))
            .await
            .unwrap();
        let early = tokio::time::timeout(Duration::from_millis(50), events.next()).await;
        assert!(early.is_err());

        mock.lock_persistent_transfer(LockPersistentTransferRequest {
            transfer_id: MOCK_TRANSFER_ID.to_owned(),
        })
        .await
        .unwrap();
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(event.status(), TransferStatus::Completed);
    }

    #[tokio::test]
    async fn injected_failure_is_still_recorded() {
        let mock = MockTransferService::new().failing(Operation::GetInfo);
        let status = mock.get_info().await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unavailable);
        assert_eq!(mock.calls(), [Call::GetInfo]);
    }
}
