//! crates/logging/src/verbosity.rs
//! Verbosity levels selected by repeated `-v` flags.

use std::fmt;
use std::str::FromStr;

/// Crates whose events are raised one level above dependencies.
pub const WORKSPACE_TARGETS: &[&str] = &["transferd_client", "daemon", "session", "protocol"];

/// How much diagnostic output the client emits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Warnings everywhere, progress from the workspace crates.
    #[default]
    Normal,
    /// Debug output from the workspace crates.
    Verbose,
    /// Debug output from everything.
    Debug,
    /// Everything.
    Trace,
}

impl Verbosity {
    /// Maps a `-v` count to a level; `quiet` wins over any count.
    #[must_use]
    pub const fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            2 => Self::Debug,
            _ => Self::Trace,
        }
    }

    /// Returns the filter directives for this level.
    #[must_use]
    pub fn directives(self) -> String {
        let (default, workspace) = match self {
            Self::Quiet => return "error".to_owned(),
            Self::Normal => ("warn", "info"),
            Self::Verbose => ("info", "debug"),
            Self::Debug => ("debug", "debug"),
            Self::Trace => return "trace".to_owned(),
        };
        let mut directives = default.to_owned();
        for target in WORKSPACE_TARGETS {
            directives.push(',');
            directives.push_str(target);
            directives.push('=');
            directives.push_str(workspace);
        }
        directives
    }

    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quiet => "quiet",
            Self::Normal => "normal",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a verbosity name is not recognised.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseVerbosityError(String);

impl fmt::Display for ParseVerbosityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown verbosity '{}'", self.0)
    }
}

impl std::error::Error for ParseVerbosityError {}

impl FromStr for Verbosity {
    type Err = ParseVerbosityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" | "error" => Ok(Self::Quiet),
            "normal" | "warn" => Ok(Self::Normal),
            "verbose" | "info" => Ok(Self::Verbose),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(ParseVerbosityError(s.to_owned())),
        }
    }
}
