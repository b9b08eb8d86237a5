//! Resolved engine settings shared across crates.
//!
//! These types represent fully-validated, resolved configuration state.
//! Raw TOML deserialization structs (with `Option` fields) stay private in
//! `fcs-config`. The config loader resolves them into these types at the
//! parse boundary.
//!
//! Existence of a value is the proof of its validity.

use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineSettingsError {
    #[error("engine path must not be empty")]
    EmptyBinary,
    #[error("{0} timeout must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Which engine front-end a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionMode {
    /// Expression inspection (`--i`).
    Interactive,
    /// Test execution (`--t`).
    Test,
}

impl SessionMode {
    /// Command-line flag selecting this mode.
    #[must_use]
    pub const fn flag(self) -> &'static str {
        match self {
            Self::Interactive => "--i",
            Self::Test => "--t",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Test => "test",
        }
    }
}

/// Validated engine launch settings.
///
/// Invariant: `binary` is non-empty and every timeout is non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    binary: PathBuf,
    connect_timeout: Duration,
    request_timeout: Duration,
    shutdown_timeout: Duration,
}

impl EngineSettings {
    /// Settings for `binary` with default timeouts.
    pub fn new(binary: impl Into<PathBuf>) -> Result<Self, EngineSettingsError> {
        let binary = binary.into();
        if binary.as_os_str().is_empty() {
            return Err(EngineSettingsError::EmptyBinary);
        }
        Ok(Self {
            binary,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Result<Self, EngineSettingsError> {
        self.connect_timeout = non_zero(timeout, "connect")?;
        Ok(self)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, EngineSettingsError> {
        self.request_timeout = non_zero(timeout, "request")?;
        Ok(self)
    }

    pub fn with_shutdown_timeout(
        mut self,
        timeout: Duration,
    ) -> Result<Self, EngineSettingsError> {
        self.shutdown_timeout = non_zero(timeout, "shutdown")?;
        Ok(self)
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// How long to wait for a spawned engine to connect back.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Upper bound on waiting for a killed engine to be reaped.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

fn non_zero(timeout: Duration, which: &'static str) -> Result<Duration, EngineSettingsError> {
    if timeout.is_zero() {
        Err(EngineSettingsError::ZeroTimeout(which))
    } else {
        Ok(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied() {
        let settings = EngineSettings::new("/opt/fcs/engine").unwrap();
        assert_eq!(settings.binary(), Path::new("/opt/fcs/engine"));
        assert_eq!(settings.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(settings.request_timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(settings.shutdown_timeout(), DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn rejects_empty_binary() {
        assert_eq!(
            EngineSettings::new("").unwrap_err(),
            EngineSettingsError::EmptyBinary
        );
    }

    #[test]
    fn rejects_zero_timeouts() {
        let settings = EngineSettings::new("engine").unwrap();
        let err = settings
            .clone()
            .with_request_timeout(Duration::ZERO)
            .unwrap_err();
        assert_eq!(err, EngineSettingsError::ZeroTimeout("request"));
        assert!(settings.with_connect_timeout(Duration::ZERO).is_err());
    }

    #[test]
    fn mode_flags() {
        assert_eq!(SessionMode::Interactive.flag(), "--i");
        assert_eq!(SessionMode::Test.flag(), "--t");
    }
}
