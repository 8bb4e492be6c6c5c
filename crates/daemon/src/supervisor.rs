//! Launching, probing and stopping the daemon process.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::address::DaemonAddress;
use crate::config::SupervisorConfig;
use crate::error::{DaemonError, IoResultExt};
use crate::readiness::{LogScrapeReadiness, LogSegment, ReadinessProtocol, last_line};

const NO_LOG_OUTPUT: &str = "<no log output>";

/// Starts the daemon described by a [`SupervisorConfig`].
#[derive(Clone)]
pub struct Supervisor {
    config: SupervisorConfig,
    readiness: Arc<dyn ReadinessProtocol>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Creates a supervisor that discovers ephemeral ports by scraping the log.
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            readiness: Arc::new(LogScrapeReadiness),
        }
    }

    /// Replaces the port discovery strategy.
    #[must_use]
    pub fn with_readiness(mut self, readiness: impl ReadinessProtocol + 'static) -> Self {
        self.readiness = Arc::new(readiness);
        self
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Writes the configuration document and returns its path.
    pub fn configure(&self) -> Result<PathBuf, DaemonError> {
        self.config.configure(
            self.config.address(),
            self.config.log_directory(),
            self.config.log_level(),
        )
    }

    /// Spawns the daemon and waits out the startup probe window.
    ///
    /// An exit inside the window fails with [`DaemonError::EarlyExit`] carrying
    /// the last log line. When port `0` was requested the bound port is read
    /// through the configured [`ReadinessProtocol`]. Both only look at log
    /// output written after the spawn.
    pub async fn start(&self) -> Result<DaemonHandle, DaemonError> {
        let config = &self.config;
        let conf_path = self.configure()?;
        let out_path = config.file_path("out");
        let err_path = config.file_path("err");
        let log_file = config.log_file();
        let stdout = File::create(&out_path).with_path(&out_path)?;
        let stderr = File::create(&err_path).with_path(&err_path)?;

        debug!(conf = %conf_path.display(), "daemon configuration written");
        debug!(out = %out_path.display(), err = %err_path.display(), "daemon output redirected");
        debug!(
            log = %log_file.display(),
            runtime_log = %config.runtime_log_file().display(),
            "daemon logs"
        );
        info!(
            program = %config.daemon_path().display(),
            conf = %conf_path.display(),
            "starting daemon"
        );

        let run_log = LogSegment::mark(&log_file)?;
        let mut child = Command::new(config.daemon_path())
            .arg("-c")
            .arg(&conf_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DaemonError::Spawn {
                program: config.daemon_path().to_path_buf(),
                source,
            })?;
        let pid = child.id();
        debug!(?pid, "daemon spawned");

        match tokio::time::timeout(config.startup_probe(), child.wait()).await {
            Ok(Ok(status)) => {
                let last_log_line = diagnostic_line(&run_log, &err_path);
                error!(%status, %last_log_line, "daemon exited during startup");
                return Err(DaemonError::EarlyExit {
                    status,
                    last_log_line,
                });
            }
            Ok(Err(e)) => return Err(DaemonError::io(config.daemon_path(), e)),
            Err(_) => debug!(?pid, "daemon survived startup probe"),
        }

        let address = if config.address().wants_ephemeral_port() {
            let port = self.readiness.discover_port(&run_log)?;
            debug!(port, "port read from daemon log");
            config.address().with_port(port)
        } else {
            config.address().clone()
        };
        info!(?pid, %address, "daemon running");

        Ok(DaemonHandle {
            child: Some(child),
            pid,
            address,
            log_file,
            grace: config.shutdown_grace(),
        })
    }
}

fn diagnostic_line(run_log: &LogSegment, err_file: &Path) -> String {
    [run_log.clone(), LogSegment::whole(err_file)]
        .iter()
        .find_map(|segment| last_line(segment).ok().flatten())
        .unwrap_or_else(|| NO_LOG_OUTPUT.to_owned())
}

/// How a [`DaemonHandle::stop`] call ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ShutdownOutcome {
    /// The daemon had already exited before the terminate request.
    AlreadyExited(ExitStatus),
    /// The daemon exited within the grace period.
    Exited(ExitStatus),
    /// The grace period elapsed and the daemon was killed.
    Killed,
    /// Waiting on the daemon failed; its state is unknown.
    Unconfirmed,
}

/// A running daemon owned by the supervisor.
///
/// Dropping the handle kills the process if [`stop`](Self::stop) was not
/// called.
#[derive(Debug)]
pub struct DaemonHandle {
    child: Option<Child>,
    pid: Option<u32>,
    address: DaemonAddress,
    log_file: PathBuf,
    grace: Duration,
}

impl DaemonHandle {
    /// Returns the OS process identifier.
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns the address the daemon listens on, with any ephemeral port resolved.
    pub const fn address(&self) -> &DaemonAddress {
        &self.address
    }

    /// Returns the daemon log file.
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Reports whether the process is still alive.
    pub fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|child| matches!(child.try_wait(), Ok(None)))
    }

    /// Terminates the daemon and waits up to the grace period.
    ///
    /// The grace timeout escalates to a kill and is logged, not reported as an
    /// error. Returns `None` when the daemon was already stopped.
    pub async fn stop(&mut self) -> Option<ShutdownOutcome> {
        let mut child = self.child.take()?;
        if let Ok(Some(status)) = child.try_wait() {
            debug!(pid = ?self.pid, %status, "daemon already exited");
            return Some(ShutdownOutcome::AlreadyExited(status));
        }

        debug!(pid = ?self.pid, "stopping daemon");
        if let Err(e) = send_terminate(&mut child) {
            warn!(pid = ?self.pid, error = %e, "terminate request failed");
        }

        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(Ok(status)) => {
                info!(pid = ?self.pid, %status, "daemon stopped");
                Some(ShutdownOutcome::Exited(status))
            }
            Ok(Err(e)) => {
                warn!(pid = ?self.pid, error = %e, "waiting for daemon failed");
                Some(ShutdownOutcome::Unconfirmed)
            }
            Err(_) => {
                warn!(pid = ?self.pid, grace = ?self.grace, "daemon ignored terminate; killing");
                if let Err(e) = child.kill().await {
                    warn!(pid = ?self.pid, error = %e, "kill failed");
                    return Some(ShutdownOutcome::Unconfirmed);
                }
                Some(ShutdownOutcome::Killed)
            }
        }
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(raw) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(raw).map_err(|_| io::Error::other("pid out of range"))?;
    kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(io::Error::from)
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
