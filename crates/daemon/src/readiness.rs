//! Discovery of the port chosen by the daemon.
//!
//! When the daemon is asked to bind port `0` it picks a free port and reports
//! it only through its log. [`ReadinessProtocol`] keeps that detail behind an
//! interface so a structured readiness signal can replace log scraping without
//! touching the supervisor.
//!
//! The daemon appends to its log across runs, so discovery reads a
//! [`LogSegment`]: the bytes written after the supervisor spawned the process.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{DaemonError, IoResultExt};

// `host:port` where host is a bracketed IPv6 literal, a dotted IPv4 address or
// a name starting with a letter. A bare `:port` counts after a separator.
// Clock times such as `12:30:01` have no host and are skipped.
static PORT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:^|[\s/@=("'])(?:\[[0-9A-Fa-f:.]+\]|\d{1,3}(?:\.\d{1,3}){3}|[A-Za-z][A-Za-z0-9-]*(?:\.[A-Za-z0-9-]+)*)?:(\d+)\b"#,
    )
    .expect("port pattern compiles")
});

/// Strategy used to learn the port an ephemeral-bound daemon listens on.
pub trait ReadinessProtocol: Send + Sync {
    /// Returns the listening port reported in `log`.
    fn discover_port(&self, log: &LogSegment) -> Result<u16, DaemonError>;
}

/// The tail of a log file written after a given byte offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSegment {
    path: PathBuf,
    start: u64,
}

impl LogSegment {
    /// Marks the current end of `path`; only output appended later is read.
    ///
    /// A file that does not exist yet starts at offset zero.
    pub fn mark(path: impl Into<PathBuf>) -> Result<Self, DaemonError> {
        let path = path.into();
        let start = match fs::metadata(&path) {
            Ok(metadata) => metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(DaemonError::io(path, e)),
        };
        Ok(Self { path, start })
    }

    /// Covers the whole of `path`.
    pub fn whole(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            start: 0,
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the offset reading starts at.
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Reads the segment as text.
    ///
    /// A file shorter than the mark was truncated or rotated and is read from
    /// the beginning.
    pub fn read(&self) -> Result<String, DaemonError> {
        let mut file = File::open(&self.path).with_path(&self.path)?;
        let len = file.metadata().with_path(&self.path)?.len();
        let start = if len < self.start { 0 } else { self.start };
        file.seek(SeekFrom::Start(start)).with_path(&self.path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).with_path(&self.path)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Legacy readiness: scrape the port from the daemon log.
///
/// Lines are inspected in order. JSON lines contribute their `msg` field and
/// other lines are used verbatim. The first line containing `host:<digits>`
/// wins; when several such groups appear on that line the last one is the
/// port.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogScrapeReadiness;

impl ReadinessProtocol for LogScrapeReadiness {
    fn discover_port(&self, log: &LogSegment) -> Result<u16, DaemonError> {
        let contents = log.read()?;
        let failure = |reason: &str| DaemonError::PortDiscovery {
            log: log.path().to_path_buf(),
            reason: reason.to_owned(),
        };
        let candidate = contents
            .lines()
            .map(message_text)
            .find_map(|text| last_port_group(&text))
            .ok_or_else(|| failure("no line matches 'host:<port>'"))?;
        match candidate.parse::<u16>() {
            Ok(0) => Err(failure("reported port is zero")),
            Ok(port) => Ok(port),
            Err(_) => Err(failure("reported port is out of range")),
        }
    }
}

/// Returns the port found in a single log line, if any.
#[must_use]
pub fn parse_port(line: &str) -> Option<u16> {
    last_port_group(&message_text(line))
        .and_then(|digits| digits.parse::<u16>().ok())
        .filter(|port| *port != 0)
}

/// Returns the last non-empty line of `log`, for diagnostics.
pub fn last_line(log: &LogSegment) -> Result<Option<String>, DaemonError> {
    let contents = log.read()?;
    Ok(contents
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| message_text(line).trim().to_owned()))
}

fn message_text(line: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(line) {
        Ok(serde_json::Value::Object(map)) => match map.get("msg") {
            Some(serde_json::Value::String(msg)) => msg.clone(),
            _ => line.to_owned(),
        },
        _ => line.to_owned(),
    }
}

fn last_port_group(text: &str) -> Option<String> {
    PORT_PATTERN
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .filter(|m| !text[m.end()..].starts_with(':'))
        .last()
        .map(|m| m.as_str().to_owned())
}
