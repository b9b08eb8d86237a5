//! `~/.fcs/config.toml` loading and engine resolution.
//!
//! The TOML structs here keep every field optional. [`FcsConfig::resolve_engine`]
//! turns them into a validated [`EngineSettings`] at the parse boundary.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;

use fcs_types::{EngineSettings, EngineSettingsError};

/// Overrides `engine.path` when set.
pub const ENGINE_PATH_ENV: &str = "FCS_ENGINE_PATH";

/// Test definition files looked for when `tests.pattern` is unset.
pub const DEFAULT_TEST_PATTERN: &str = "*.tests.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("engine path is not configured (set engine.path or {ENGINE_PATH_ENV})")]
    EngineUnset,
    #[error("engine executable not found: {0}")]
    EngineNotFound(String),
    #[error(transparent)]
    InvalidEngine(#[from] EngineSettingsError),
}

#[derive(Debug, Default, Deserialize)]
pub struct FcsConfig {
    pub engine: Option<EngineConfig>,
    pub tests: Option<TestsConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EngineConfig {
    /// Absolute path, `~/` path, or a bare name looked up on `PATH`.
    pub path: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub shutdown_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestsConfig {
    /// Glob matched against file names during test discovery.
    pub pattern: Option<String>,
}

impl FcsConfig {
    /// Load the user config. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {}: {err}", path.display());
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {}: {err}", path.display());
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn test_pattern(&self) -> &str {
        self.tests
            .as_ref()
            .and_then(|t| t.pattern.as_deref())
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_TEST_PATTERN)
    }

    /// Resolve launch settings.
    ///
    /// The engine path comes from `explicit` (a command-line flag), then
    /// `FCS_ENGINE_PATH`, then `engine.path`.
    pub fn resolve_engine(&self, explicit: Option<&str>) -> Result<EngineSettings, ConfigError> {
        let from_env = env::var(ENGINE_PATH_ENV).ok();
        self.resolve_engine_from(explicit.or(from_env.as_deref()))
    }

    fn resolve_engine_from(&self, path_override: Option<&str>) -> Result<EngineSettings, ConfigError> {
        let engine = self.engine.as_ref();
        let raw = path_override
            .filter(|p| !p.trim().is_empty())
            .or_else(|| engine.and_then(|e| e.path.as_deref()))
            .ok_or(ConfigError::EngineUnset)?;

        let mut settings = EngineSettings::new(resolve_binary(raw)?)?;
        let Some(engine) = engine else {
            return Ok(settings);
        };
        if let Some(secs) = engine.connect_timeout_secs {
            settings = settings.with_connect_timeout(Duration::from_secs(secs))?;
        }
        if let Some(secs) = engine.request_timeout_secs {
            settings = settings.with_request_timeout(Duration::from_secs(secs))?;
        }
        if let Some(secs) = engine.shutdown_timeout_secs {
            settings = settings.with_shutdown_timeout(Duration::from_secs(secs))?;
        }
        Ok(settings)
    }
}

/// Turn a configured engine path into an existing executable path.
pub fn resolve_binary(raw: &str) -> Result<PathBuf, ConfigError> {
    let expanded = expand_env_vars(raw);
    let trimmed = expanded.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EngineUnset);
    }

    let path = match trimmed.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .ok_or_else(|| ConfigError::EngineNotFound(trimmed.to_string()))?,
        None => PathBuf::from(trimmed),
    };

    if path.components().count() > 1 || path.is_absolute() {
        if path.is_file() {
            Ok(path)
        } else {
            Err(ConfigError::EngineNotFound(path.display().to_string()))
        }
    } else {
        which::which(&path).map_err(|_| ConfigError::EngineNotFound(trimmed.to_string()))
    }
}

/// Replace `${VAR}` references with the variable's value (empty if unset).
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + len];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 3 + len..];
    }

    out.push_str(rest);
    out
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".fcs").join("config.toml"))
}
