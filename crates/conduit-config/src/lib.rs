//! Multi-tier TOML configuration for Conduit.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > config file > defaults

use conduit_types::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The server name reported in `initialize`.
pub const DEFAULT_SERVER_NAME: &str = "conduit";

/// Seconds between keep-alive pings. Zero disables them.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 30;

/// Seconds a server-initiated request may stay unanswered.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Milliseconds between pending-response sweeps.
pub const DEFAULT_GC_INTERVAL_MS: u64 = 1000;

/// Where sessions are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    File,
}

impl std::str::FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageKind::Memory),
            "file" => Ok(StorageKind::File),
            other => Err(ConfigError::InvalidValue {
                key: "session.storage".into(),
                message: format!("expected \"memory\" or \"file\", got \"{other}\""),
            }),
        }
    }
}

/// Resolved configuration for a Conduit server.
#[derive(Debug, Clone)]
pub struct ConduitConfig {
    pub server_name: String,
    pub server_version: String,
    pub instructions: Option<String>,
    /// Protocol version to offer when the client's is unsupported.
    pub protocol_version: Option<String>,
    pub storage: StorageKind,
    pub session_dir: PathBuf,
    /// `None` when keep-alive pings are disabled.
    pub keepalive: Option<Duration>,
    pub request_timeout: Duration,
    pub gc_interval: Duration,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub timing: TimingSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    pub name: Option<String>,
    pub version: Option<String>,
    pub instructions: Option<String>,
    pub protocol_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    pub storage: Option<StorageKind>,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingSettings {
    pub keepalive_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub gc_interval_ms: Option<u64>,
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_dir: Option<PathBuf>,
    pub storage: Option<StorageKind>,
    pub session_dir: Option<PathBuf>,
    pub keepalive_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl ConduitConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables (`CONDUIT_*`)
    /// 3. Config file (`<config dir>/config.toml`)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = overrides.config_dir.clone().unwrap_or_else(config_dir);
        let settings = load_settings_file(&config_dir.join("config.toml"));
        Self::resolve(settings, |key| std::env::var(key).ok(), overrides, config_dir)
    }

    /// Merge already-read sources. `env` looks up an environment variable.
    pub fn resolve(
        settings: SettingsFile,
        env: impl Fn(&str) -> Option<String>,
        overrides: CliOverrides,
        config_dir: PathBuf,
    ) -> Result<Self, ConfigError> {
        let server_name = env("CONDUIT_SERVER_NAME")
            .or(settings.server.name)
            .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string());

        let server_version = settings
            .server
            .version
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

        // Storage backend: CLI > env > config file > memory
        let storage = match overrides.storage {
            Some(kind) => kind,
            None => match env("CONDUIT_SESSION_STORAGE") {
                Some(value) => value.parse()?,
                None => settings.session.storage.unwrap_or_default(),
            },
        };

        let session_dir = overrides
            .session_dir
            .or_else(|| env("CONDUIT_SESSION_DIR").map(PathBuf::from))
            .or(settings.session.dir)
            .unwrap_or_else(|| config_dir.join("sessions"));

        let keepalive_secs = match overrides.keepalive_secs {
            Some(secs) => secs,
            None => parse_env_secs(&env, "CONDUIT_KEEPALIVE_SECS")?
                .or(settings.timing.keepalive_secs)
                .unwrap_or(DEFAULT_KEEPALIVE_SECS),
        };

        let request_timeout_secs = match overrides.request_timeout_secs {
            Some(secs) => secs,
            None => parse_env_secs(&env, "CONDUIT_REQUEST_TIMEOUT_SECS")?
                .or(settings.timing.request_timeout_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        };
        if request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timing.request_timeout_secs".into(),
                message: "must be greater than zero".into(),
            });
        }

        let gc_interval_ms = settings
            .timing
            .gc_interval_ms
            .unwrap_or(DEFAULT_GC_INTERVAL_MS);
        if gc_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timing.gc_interval_ms".into(),
                message: "must be greater than zero".into(),
            });
        }

        Ok(ConduitConfig {
            server_name,
            server_version,
            instructions: settings.server.instructions,
            protocol_version: settings.server.protocol_version,
            storage,
            session_dir,
            keepalive: (keepalive_secs > 0).then(|| Duration::from_secs(keepalive_secs)),
            request_timeout: Duration::from_secs(request_timeout_secs),
            gc_interval: Duration::from_millis(gc_interval_ms),
            config_dir,
        })
    }
}

fn parse_env_secs(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u64>, ConfigError> {
    env(key)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a whole number of seconds, got \"{value}\""),
            })
        })
        .transpose()
}

/// Get the Conduit config directory path (~/.conduit/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CONDUIT_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".conduit")
}

/// Load and parse a TOML settings file, returning defaults on any error.
pub fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}
