//! Whole-transfer driver.
//!
//! [`TransferOrchestrator`] starts the daemon, connects, runs one session in
//! the requested mode, waits for its outcome and stops the daemon again. The
//! daemon is stopped on every exit path.

use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use daemon::{DaemonAddress, Supervisor};
use protocol::{PathEntry, TransferSpec};
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelManager};
use crate::config::SessionConfig;
use crate::controller::SessionController;
use crate::error::SessionError;
use crate::feed::PeriodicFeeder;
use crate::monitor::MonitorOutcome;
use crate::state::TransferMode;
use crate::upload::UploadReport;

/// Summary of one orchestrated transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferReport {
    /// Daemon-assigned session id.
    pub transfer_id: String,
    /// Mode the session ran in.
    pub mode: TransferMode,
    /// Terminal outcome.
    pub outcome: MonitorOutcome,
    /// Streamed totals, for streaming sessions.
    pub upload: Option<UploadReport>,
}

/// Runs complete transfers against a supervised daemon.
pub struct TransferOrchestrator {
    supervisor: Supervisor,
    config: SessionConfig,
    service: Option<Channel>,
}

impl TransferOrchestrator {
    /// Creates an orchestrator that dials the daemon over gRPC.
    pub fn new(supervisor: Supervisor, config: SessionConfig) -> Self {
        Self {
            supervisor,
            config,
            service: None,
        }
    }

    /// Uses `service` instead of dialling the daemon's address.
    #[must_use]
    pub fn with_service(mut self, service: Channel) -> Self {
        self.service = Some(service);
        self
    }

    /// Runs one transfer in `mode`.
    ///
    /// In persistent mode the specification's `paths` are removed from the
    /// start request and added as a single batch before the session is
    /// locked.
    pub async fn run(
        &self,
        spec: &TransferSpec,
        mode: TransferMode,
    ) -> Result<TransferReport, SessionError> {
        if mode == TransferMode::Persistent {
            let mut bare = spec.clone();
            let paths = bare.take_paths()?;
            let batches = usize::from(!paths.is_empty());
            let feeder = PeriodicFeeder::new(Duration::ZERO, batches);
            return self.run_persistent(&bare, feeder, move |_| paths.clone()).await;
        }

        let mut daemon = self.supervisor.start().await?;
        let result = self.drive(daemon.address(), spec, mode).await;
        if let Some(outcome) = daemon.stop().await {
            debug!(?outcome, "daemon stopped");
        }
        result
    }

    /// Runs a persistent session fed by `feeder`.
    ///
    /// The event subscription is opened before the first batch is added, so a
    /// failure reported while items are still being added ends the run with
    /// the remaining batches dropped. A completion reported before the lock
    /// is [`SessionError::CompletedBeforeLock`].
    pub async fn run_persistent<F>(
        &self,
        spec: &TransferSpec,
        feeder: PeriodicFeeder,
        produce: F,
    ) -> Result<TransferReport, SessionError>
    where
        F: FnMut(usize) -> Vec<PathEntry> + Send,
    {
        let mut daemon = self.supervisor.start().await?;
        let result = self
            .drive_persistent(daemon.address(), spec, feeder, produce)
            .await;
        if let Some(outcome) = daemon.stop().await {
            debug!(?outcome, "daemon stopped");
        }
        result
    }

    async fn controller(&self, address: &DaemonAddress) -> Result<SessionController, SessionError> {
        let mut channels = ChannelManager::new(self.config.connect_timeout());
        let channel = match &self.service {
            Some(service) => channels.attach(service.clone()).await?,
            None => channels.connect(address).await?,
        };
        Ok(SessionController::new(channel, self.config.clone()))
    }

    async fn drive(
        &self,
        address: &DaemonAddress,
        spec: &TransferSpec,
        mode: TransferMode,
    ) -> Result<TransferReport, SessionError> {
        let controller = self.controller(address).await?;
        let (mut session, upload) = if mode == TransferMode::Streaming {
            let (session, report) = controller.start_streaming(spec).await?;
            (session, Some(report))
        } else {
            (controller.start(spec, mode).await?, None)
        };
        let outcome = controller.await_completion(&mut session).await?;
        info!(transfer_id = %session.transfer_id(), state = %session.state(), "transfer finished");
        Ok(TransferReport {
            transfer_id: session.transfer_id().to_owned(),
            mode,
            outcome,
            upload,
        })
    }

    async fn drive_persistent<F>(
        &self,
        address: &DaemonAddress,
        spec: &TransferSpec,
        feeder: PeriodicFeeder,
        mut produce: F,
    ) -> Result<TransferReport, SessionError>
    where
        F: FnMut(usize) -> Vec<PathEntry> + Send,
    {
        let controller = self.controller(address).await?;
        let feed = controller.start_persistent(spec).await?;
        let transfer_id = feed.session().transfer_id().to_owned();
        let subscription = controller.monitor().subscribe(&transfer_id).await?;

        let issued = AtomicUsize::new(0);
        let feeding = feeder.run(feed, |index| {
            issued.store(index + 1, Ordering::Relaxed);
            produce(index)
        });
        let mut watching = pin!(subscription.outcome());
        let outcome = tokio::select! {
            biased;
            fed = feeding => {
                fed?;
                watching.await?
            }
            outcome = &mut watching => {
                let outcome = outcome?;
                let batches = issued.load(Ordering::Relaxed);
                if outcome.is_success() {
                    return Err(SessionError::CompletedBeforeLock {
                        transfer_id,
                        batches,
                    });
                }
                warn!(
                    %transfer_id,
                    batches,
                    planned = feeder.max_items(),
                    "session failed before it was locked; feeding stopped"
                );
                outcome
            }
        };
        info!(%transfer_id, status = ?outcome.status, "persistent transfer finished");
        Ok(TransferReport {
            transfer_id,
            mode: TransferMode::Persistent,
            outcome,
            upload: None,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use daemon::SupervisorConfig;
    use protocol::{TransferEvent, TransferStatus};
    use test_support::{
        Call, FakeDaemon, MOCK_TRANSFER_ID, MockTransferService, Operation, failure_event,
        status_event,
    };

    use super::*;
    use crate::monitor::TerminalStatus;

    fn orchestrator(fake: &FakeDaemon, mock: &MockTransferService) -> TransferOrchestrator {
        let config = SupervisorConfig::builder(fake.path())
            .address(DaemonAddress::new("127.0.0.1", 0))
            .log_directory(fake.log_dir())
            .startup_probe(Duration::from_millis(300))
            .shutdown_grace(Duration::from_secs(2))
            .build();
        TransferOrchestrator::new(Supervisor::new(config), SessionConfig::default())
            .with_service(Arc::new(mock.clone()))
    }

    fn completed() -> protocol::wire::TransferResponse {
        status_event(
            MOCK_TRANSFER_ID,
            TransferStatus::Completed,
            TransferEvent::SessionStop,
        )
    }

    #[tokio::test]
    async fn regular_run_connects_starts_and_monitors() {
        let fake = FakeDaemon::listening(41001).unwrap();
        let mock = MockTransferService::new().with_events([completed()]);

        let report = orchestrator(&fake, &mock)
            .run(
                &TransferSpec::from_json(r#"{"paths":[{"source":"faux:///1k?1k"}]}"#).unwrap(),
                TransferMode::Regular,
            )
            .await
            .unwrap();

        assert_eq!(report.transfer_id, MOCK_TRANSFER_ID);
        assert_eq!(report.outcome.status, TerminalStatus::Completed);
        assert_eq!(
            mock.operations(),
            [
                Operation::GetInfo,
                Operation::StartTransfer,
                Operation::MonitorTransfers
            ]
        );
    }

    #[tokio::test]
    async fn persistent_run_subscribes_adds_then_locks() {
        let fake = FakeDaemon::listening(41002).unwrap();
        let mock = MockTransferService::new()
            .with_events([completed()])
            .hold_events_until_lock()
            .keep_stream_open();

        let report = orchestrator(&fake, &mock)
            .run(
                &TransferSpec::from_json(r#"{"paths":[{"source":"/tmp/a","destination":"a"}]}"#)
                    .unwrap(),
                TransferMode::Persistent,
            )
            .await
            .unwrap();

        assert!(report.outcome.is_success());
        assert_eq!(report.mode, TransferMode::Persistent);
        assert_eq!(
            mock.operations(),
            [
                Operation::GetInfo,
                Operation::StartTransfer,
                Operation::MonitorTransfers,
                Operation::AddTransferPaths,
                Operation::LockPersistentTransfer,
            ]
        );
        let Some(Call::AddTransferPaths(batch)) = mock.calls().into_iter().nth(3) else {
            panic!("expected the spec paths as one batch");
        };
        assert_eq!(batch.transfer_path.len(), 1);
    }

    #[tokio::test]
    async fn failure_before_lock_stops_feeding() {
        let fake = FakeDaemon::listening(41004).unwrap();
        let mock = MockTransferService::new()
            .with_events([failure_event(MOCK_TRANSFER_ID, 19, "quota exceeded")])
            .keep_stream_open();
        let feeder = PeriodicFeeder::new(Duration::from_secs(3600), 3);

        let report = orchestrator(&fake, &mock)
            .run_persistent(&TransferSpec::default(), feeder, |_| {
                vec![PathEntry::source_only("/tmp/never")]
            })
            .await
            .unwrap();

        assert_eq!(report.outcome.status, TerminalStatus::Failed);
        assert_eq!(
            report.outcome.error,
            Some((19, "quota exceeded".to_owned()))
        );
        assert_eq!(
            mock.operations(),
            [
                Operation::GetInfo,
                Operation::StartTransfer,
                Operation::MonitorTransfers,
            ]
        );
    }

    #[tokio::test]
    async fn completion_before_lock_is_an_error() {
        let fake = FakeDaemon::listening(41005).unwrap();
        let mock = MockTransferService::new()
            .with_events([completed()])
            .keep_stream_open();
        let feeder = PeriodicFeeder::new(Duration::from_secs(3600), 2);

        let error = orchestrator(&fake, &mock)
            .run_persistent(&TransferSpec::default(), feeder, |_| Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            SessionError::CompletedBeforeLock { batches: 0, .. }
        ));
        assert!(
            !mock
                .operations()
                .contains(&Operation::LockPersistentTransfer)
        );
    }

    #[tokio::test]
    async fn daemon_is_stopped_when_the_session_fails() {
        let fake = FakeDaemon::listening(41003).unwrap();
        let mock = MockTransferService::new().failing(Operation::StartTransfer);

        let error = orchestrator(&fake, &mock)
            .run(&TransferSpec::default(), TransferMode::Regular)
            .await
            .unwrap_err();
        assert!(matches!(error, SessionError::Rpc { .. }));

        let pid = fake.recorded_pid().unwrap();
        assert!(!process_alive(pid));
    }

    fn process_alive(pid: u32) -> bool {
        std::process::Command::new("sh")
            .args(["-c", &format!("kill -0 {pid} 2>/dev/null")])
            .status()
            .is_ok_and(|status| status.success())
    }

    #[tokio::test]
    async fn daemon_startup_failure_skips_connection() {
        let fake = FakeDaemon::exiting("bind: address in use", 1).unwrap();
        let mock = MockTransferService::new();

        let error = orchestrator(&fake, &mock)
            .run(&TransferSpec::default(), TransferMode::Regular)
            .await
            .unwrap_err();
        assert!(matches!(error, SessionError::Daemon(_)));
        assert!(mock.calls().is_empty());
    }
}
