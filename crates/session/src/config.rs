//! Session timeouts, chunking and compatibility settings.

use std::env;
use std::time::Duration;

use protocol::DEFAULT_CONNECT_TIMEOUT;

use crate::compat::CompatShims;

/// Default bound on the whole streaming start acknowledgment (start plus uploads).
pub const DEFAULT_STREAM_ACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on each per-file `WriteStream` acknowledgment.
pub const DEFAULT_FILE_ACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of bytes per streamed chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Environment variable enabling the streaming default-key shim.
pub const COMPAT_STREAM_KEY_ENV: &str = "TRANSFERD_COMPAT_STREAM_KEY";

/// Settings shared by the channel manager, controller, monitor and writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    connect_timeout: Duration,
    stream_ack_timeout: Duration,
    file_ack_timeout: Duration,
    chunk_size: usize,
    monitor_timeout: Option<Duration>,
    shims: CompatShims,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stream_ack_timeout: DEFAULT_STREAM_ACK_TIMEOUT,
            file_ack_timeout: DEFAULT_FILE_ACK_TIMEOUT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            monitor_timeout: None,
            shims: CompatShims::default(),
        }
    }
}

impl SessionConfig {
    /// Creates a [`SessionConfigBuilder`] seeded with defaults.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Returns the channel connect timeout.
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the bound on the streaming start acknowledgment.
    pub const fn stream_ack_timeout(&self) -> Duration {
        self.stream_ack_timeout
    }

    /// Returns the bound on each per-file acknowledgment.
    pub const fn file_ack_timeout(&self) -> Duration {
        self.file_ack_timeout
    }

    /// Returns the chunk size used by the upload writer.
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Returns the overall monitor timeout, if any.
    pub const fn monitor_timeout(&self) -> Option<Duration> {
        self.monitor_timeout
    }

    /// Returns the enabled compatibility shims.
    pub const fn shims(&self) -> &CompatShims {
        &self.shims
    }
}

/// Builder used to assemble a [`SessionConfig`].
#[derive(Clone, Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Sets the channel connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the bound on the streaming start acknowledgment.
    #[must_use]
    pub const fn stream_ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.stream_ack_timeout = timeout;
        self
    }

    /// Sets the bound on each per-file acknowledgment.
    #[must_use]
    pub const fn file_ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.file_ack_timeout = timeout;
        self
    }

    /// Sets the upload chunk size; zero is raised to one byte.
    #[must_use]
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.config.chunk_size = bytes.max(1);
        self
    }

    /// Bounds the wait for a terminal status.
    #[must_use]
    pub const fn monitor_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.monitor_timeout = timeout;
        self
    }

    /// Enables or disables the streaming default-key shim.
    #[must_use]
    pub const fn streaming_default_key(mut self, enabled: bool) -> Self {
        self.config.shims.streaming_default_key = enabled;
        self
    }

    /// Applies `TRANSFERD_*` environment overrides.
    #[must_use]
    pub fn apply_env(self) -> Self {
        self.apply_env_from(|name| env::var(name).ok())
    }

    /// Applies overrides read through `lookup`.
    #[must_use]
    pub fn apply_env_from(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup(COMPAT_STREAM_KEY_ENV).as_deref().and_then(parse_flag) {
            Some(enabled) => self.streaming_default_key(enabled),
            None => self,
        }
    }

    /// Finalises the builder.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
