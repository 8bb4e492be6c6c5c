//! Shell scripts standing in for the daemon executable.
//!
//! Each script is invoked as `<script> -c <conf>`, records its arguments to
//! `<log_dir>/<name>.args` and writes its log next to the configuration file,
//! the same layout the real daemon uses.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// File name given to every fake daemon script.
pub const FAKE_DAEMON_NAME: &str = "fake-transferd";

/// A throwaway daemon executable plus a log directory for it.
#[derive(Debug)]
pub struct FakeDaemon {
    dir: TempDir,
    script: PathBuf,
}

impl FakeDaemon {
    /// Daemon that logs `listening on 127.0.0.1:<port>` as JSON and keeps running.
    pub fn listening(port: u16) -> io::Result<Self> {
        Self::with_body(&format!(
            "echo '{{\"level\":\"info\",\"msg\":\"listening on 127.0.0.1:{port} \"}}' >> \"$log\"\n\
             exec sleep 30\n"
        ))
    }

    /// Daemon that logs `line` and exits with `code` straight away.
    pub fn exiting(line: &str, code: i32) -> io::Result<Self> {
        let escaped = line.replace('\'', r"'\''");
        Self::with_body(&format!("echo '{escaped}' >> \"$log\"\nexit {code}\n"))
    }

    /// Daemon that keeps running but never reports a port.
    pub fn silent() -> io::Result<Self> {
        Self::with_body("echo '{\"msg\":\"starting\"}' >> \"$log\"\nexec sleep 30\n")
    }

    /// Daemon that ignores the terminate signal.
    pub fn stubborn(port: u16) -> io::Result<Self> {
        Self::with_body(&format!(
            "trap '' TERM\n\
             echo 'listening on 127.0.0.1:{port}' >> \"$log\"\n\
             while :; do sleep 1; done\n"
        ))
    }

    fn with_body(body: &str) -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::create_dir(dir.path().join("logs"))?;
        let script = dir.path().join(FAKE_DAEMON_NAME);
        let contents = format!(
            "#!/bin/sh\n\
             conf=\"$2\"\n\
             dir=$(dirname \"$conf\")\n\
             log=\"$dir/{FAKE_DAEMON_NAME}.log\"\n\
             echo \"$@\" > \"$dir/{FAKE_DAEMON_NAME}.args\"\n\
             echo $$ > \"$dir/{FAKE_DAEMON_NAME}.pid\"\n\
             {body}"
        );
        fs::write(&script, contents)?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
        Ok(Self { dir, script })
    }

    /// Returns the executable path.
    pub fn path(&self) -> &Path {
        &self.script
    }

    /// Returns the directory to use as the supervisor's log directory.
    pub fn log_dir(&self) -> PathBuf {
        self.dir.path().join("logs")
    }

    /// Returns the arguments the script was started with, once it has run.
    pub fn recorded_args(&self) -> io::Result<String> {
        fs::read_to_string(self.log_dir().join(format!("{FAKE_DAEMON_NAME}.args")))
            .map(|args| args.trim_end().to_owned())
    }

    /// Returns the pid the script recorded, once it has run.
    pub fn recorded_pid(&self) -> io::Result<u32> {
        let text = fs::read_to_string(self.log_dir().join(format!("{FAKE_DAEMON_NAME}.pid")))?;
        text.trim()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
