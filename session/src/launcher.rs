//! How engine processes are spawned.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};

use fcs_types::SessionMode;

use crate::channel::ChannelAddress;
use crate::process;

/// Spawns the process that will connect back on a channel address.
///
/// The production implementation is [`EngineLauncher`]; tests inject their
/// own to stand in for the engine executable.
pub trait Launcher {
    fn spawn(&self, mode: SessionMode, address: &ChannelAddress) -> Result<Child>;
}

impl<L: Launcher + ?Sized> Launcher for &L {
    fn spawn(&self, mode: SessionMode, address: &ChannelAddress) -> Result<Child> {
        (**self).spawn(mode, address)
    }
}

/// Launches the configured engine executable.
#[derive(Debug, Clone)]
pub struct EngineLauncher {
    binary: PathBuf,
}

impl EngineLauncher {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

/// `<mode flag> --c <address>`.
pub(crate) fn engine_args(mode: SessionMode, address: &ChannelAddress) -> [String; 3] {
    [
        mode.flag().to_string(),
        "--c".to_string(),
        address.as_str().to_string(),
    ]
}

impl Launcher for EngineLauncher {
    fn spawn(&self, mode: SessionMode, address: &ChannelAddress) -> Result<Child> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(engine_args(mode, address))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = self.binary.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        process::set_new_session(&mut cmd);

        cmd.spawn()
            .with_context(|| format!("spawning {}", self.binary.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_select_mode_and_channel() {
        let address = ChannelAddress::generate();
        let args = engine_args(SessionMode::Interactive, &address);
        assert_eq!(args[0], "--i");
        assert_eq!(args[1], "--c");
        assert_eq!(args[2], address.as_str());
        assert_eq!(engine_args(SessionMode::Test, &address)[0], "--t");
    }

    #[tokio::test]
    async fn missing_binary_fails_to_spawn() {
        let launcher = EngineLauncher::new("/definitely/not/an/fcs-engine");
        let err = launcher
            .spawn(SessionMode::Interactive, &ChannelAddress::generate())
            .unwrap_err();
        assert!(format!("{err:#}").contains("spawning"));
    }
}
