#![cfg(unix)]

use std::fs;
use std::time::Duration;

use daemon::{
    DaemonAddress, DaemonError, LogSegment, ReadinessProtocol, ShutdownOutcome, Supervisor,
    SupervisorConfig,
};
use test_support::{FAKE_DAEMON_NAME, FakeDaemon};

const PROBE: Duration = Duration::from_millis(400);

fn config_for(fake: &FakeDaemon, port: u16) -> SupervisorConfig {
    SupervisorConfig::builder(fake.path())
        .address(DaemonAddress::new("127.0.0.1", port))
        .log_directory(fake.log_dir())
        .startup_probe(PROBE)
        .shutdown_grace(Duration::from_secs(2))
        .build()
}

#[tokio::test]
async fn discovers_ephemeral_port_from_log() {
    let fake = FakeDaemon::listening(40123).unwrap();
    let mut handle = Supervisor::new(config_for(&fake, 0)).start().await.unwrap();

    assert_eq!(handle.address().port(), 40123);
    assert!(handle.pid().is_some());
    assert!(handle.is_running());
    assert_eq!(
        handle.log_file(),
        fake.log_dir().join(format!("{FAKE_DAEMON_NAME}.log"))
    );

    let conf = fake.log_dir().join(format!("{FAKE_DAEMON_NAME}.conf"));
    assert_eq!(fake.recorded_args().unwrap(), format!("-c {}", conf.display()));
    assert!(fake.log_dir().join(format!("{FAKE_DAEMON_NAME}.out")).exists());
    assert!(fake.log_dir().join(format!("{FAKE_DAEMON_NAME}.err")).exists());

    assert!(matches!(
        handle.stop().await,
        Some(ShutdownOutcome::Exited(_))
    ));
}

#[tokio::test]
async fn port_from_an_earlier_run_is_ignored() {
    let fake = FakeDaemon::listening(40200).unwrap();
    let log = fake.log_dir().join(format!("{FAKE_DAEMON_NAME}.log"));
    fs::write(&log, "{\"msg\":\"listening on 127.0.0.1:39999 \"}\n").unwrap();

    let mut handle = Supervisor::new(config_for(&fake, 0)).start().await.unwrap();
    assert_eq!(handle.address().port(), 40200);
    handle.stop().await;

    let history = fs::read_to_string(&log).unwrap();
    assert!(history.contains(":39999"), "earlier output is kept");
}

#[tokio::test]
async fn early_exit_does_not_quote_an_earlier_run() {
    let fake = FakeDaemon::exiting("", 4).unwrap();
    let log = fake.log_dir().join(format!("{FAKE_DAEMON_NAME}.log"));
    fs::write(&log, "fatal: stale failure from yesterday\n").unwrap();

    let error = Supervisor::new(config_for(&fake, 55002))
        .start()
        .await
        .unwrap_err();
    match error {
        DaemonError::EarlyExit { last_log_line, .. } => {
            assert_eq!(last_log_line, "<no log output>");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn fixed_port_skips_discovery() {
    let fake = FakeDaemon::silent().unwrap();
    let mut handle = Supervisor::new(config_for(&fake, 55002)).start().await.unwrap();
    assert_eq!(handle.address().port(), 55002);
    handle.stop().await;
}

#[tokio::test]
async fn early_exit_reports_last_log_line() {
    let fake = FakeDaemon::exiting("fatal: cannot bind 127.0.0.1:55002", 3).unwrap();
    let error = Supervisor::new(config_for(&fake, 55002))
        .start()
        .await
        .unwrap_err();

    match &error {
        DaemonError::EarlyExit {
            status,
            last_log_line,
        } => {
            assert_eq!(status.code(), Some(3));
            assert_eq!(last_log_line, "fatal: cannot bind 127.0.0.1:55002");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(error.to_string().contains("fatal: cannot bind"));
}

#[tokio::test]
async fn missing_port_line_is_fatal() {
    let fake = FakeDaemon::silent().unwrap();
    let error = Supervisor::new(config_for(&fake, 0))
        .start()
        .await
        .unwrap_err();
    assert!(matches!(error, DaemonError::PortDiscovery { .. }));
}

#[tokio::test]
async fn missing_executable_fails_to_spawn() {
    let dir = tempfile::tempdir().unwrap();
    let config = SupervisorConfig::builder(dir.path().join("no-such-daemon"))
        .log_directory(dir.path())
        .startup_probe(PROBE)
        .build();
    let error = Supervisor::new(config).start().await.unwrap_err();
    assert!(matches!(error, DaemonError::Spawn { .. }));
}

#[tokio::test]
async fn stop_is_idempotent() {
    let fake = FakeDaemon::listening(40124).unwrap();
    let mut handle = Supervisor::new(config_for(&fake, 0)).start().await.unwrap();
    assert!(handle.stop().await.is_some());
    assert!(handle.stop().await.is_none());
    assert!(!handle.is_running());
}

#[tokio::test]
async fn stubborn_daemon_is_killed_after_grace() {
    let fake = FakeDaemon::stubborn(40125).unwrap();
    let config = SupervisorConfig::builder(fake.path())
        .address(DaemonAddress::new("127.0.0.1", 0))
        .log_directory(fake.log_dir())
        .startup_probe(PROBE)
        .shutdown_grace(Duration::from_millis(300))
        .build();
    let mut handle = Supervisor::new(config).start().await.unwrap();
    assert_eq!(handle.address().port(), 40125);
    assert_eq!(handle.stop().await, Some(ShutdownOutcome::Killed));
}

struct FixedPort(u16);

impl ReadinessProtocol for FixedPort {
    fn discover_port(&self, _log: &LogSegment) -> Result<u16, DaemonError> {
        Ok(self.0)
    }
}

#[tokio::test]
async fn readiness_protocol_is_pluggable() {
    let fake = FakeDaemon::silent().unwrap();
    let mut handle = Supervisor::new(config_for(&fake, 0))
        .with_readiness(FixedPort(61000))
        .start()
        .await
        .unwrap();
    assert_eq!(handle.address().port(), 61000);
    handle.stop().await;
}
