use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use flyswat_core::leaderboard::{DEFAULT_LEADERBOARD_SIZE, MAX_LEADERBOARD_SIZE};
use flyswat_core::session::{SessionConfig, SessionConfigError};

/// Config file looked up in the working directory.
pub const CONFIG_FILE: &str = "flyswat.toml";

/// Top-level server configuration, loaded from `flyswat.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub web_root: String,
    /// `"json"` switches log output to JSON lines.
    pub log_format: String,
    pub session: SessionConfig,
    pub leaderboard: LeaderboardConfig,
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            web_root: "web".to_string(),
            log_format: "text".to_string(),
            session: SessionConfig::default(),
            leaderboard: LeaderboardConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    File,
}

/// Leaderboard storage and size.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    /// Number of entries kept.
    pub size: usize,
    pub store: StoreKind,
    /// JSON document used by the file store.
    pub path: PathBuf,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_LEADERBOARD_SIZE,
            store: StoreKind::File,
            path: PathBuf::from("data/leaderboard.json"),
        }
    }
}

/// Infrastructure limits (connection caps, buffer sizes, rate limits).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_ws_connections: usize,
    pub max_sse_subscribers: usize,
    pub broadcast_capacity: usize,
    pub ws_rate_limit_per_sec: f64,
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ws_connections: 200,
            max_sse_subscribers: 100,
            broadcast_capacity: 64,
            ws_rate_limit_per_sec: 50.0,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("listen_addr {0:?} is not a valid socket address")]
    InvalidListenAddr(String),

    #[error("{0} must be > 0")]
    ZeroLimit(&'static str),

    #[error("{field} must be <= {max}, got {value}")]
    TooLarge {
        field: &'static str,
        max: usize,
        value: usize,
    },

    #[error(transparent)]
    Session(#[from] SessionConfigError),
}

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Missing(PathBuf),
    /// The file exists but failed to parse; defaults are in effect.
    Invalid { path: PathBuf, error: String },
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            Self::File(path) => {
                tracing::info!(path = %path.display(), "Loaded configuration");
            },
            Self::Missing(path) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
            },
            Self::Invalid { path, error } => {
                tracing::warn!(
                    path = %path.display(),
                    %error,
                    "Failed to parse config file, using defaults"
                );
            },
        }
    }
}

impl ServerConfig {
    /// Check the configuration before the server starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidListenAddr(self.listen_addr.clone()));
        }

        self.session.validate()?;

        if self.leaderboard.size == 0 {
            return Err(ConfigError::ZeroLimit("leaderboard.size"));
        }
        if self.leaderboard.size > MAX_LEADERBOARD_SIZE {
            return Err(ConfigError::TooLarge {
                field: "leaderboard.size",
                max: MAX_LEADERBOARD_SIZE,
                value: self.leaderboard.size,
            });
        }
        if self.limits.max_ws_connections == 0 {
            return Err(ConfigError::ZeroLimit("limits.max_ws_connections"));
        }
        if self.limits.max_sse_subscribers == 0 {
            return Err(ConfigError::ZeroLimit("limits.max_sse_subscribers"));
        }
        if self.limits.broadcast_capacity == 0 {
            return Err(ConfigError::ZeroLimit("limits.broadcast_capacity"));
        }
        if self.limits.ws_rate_limit_per_sec <= 0.0 {
            return Err(ConfigError::ZeroLimit("limits.ws_rate_limit_per_sec"));
        }
        if self.limits.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroLimit("limits.request_timeout_secs"));
        }

        if self.leaderboard.store == StoreKind::Memory {
            tracing::warn!("Leaderboard uses the in-memory store; scores are lost on restart");
        }

        Ok(())
    }

    /// Load config from `flyswat.toml` if it exists, then apply env var
    /// overrides. Runs before logging is set up, so how the file was
    /// resolved comes back as a [`ConfigSource`] for the caller to log.
    pub fn load() -> (Self, ConfigSource) {
        let (mut config, source) = Self::load_from(Path::new(CONFIG_FILE));
        config.apply_env_overrides();
        (config, source)
    }

    /// Read one config file, falling back to defaults when it is missing or
    /// does not parse.
    pub fn load_from(path: &Path) -> (Self, ConfigSource) {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => (cfg, ConfigSource::File(path.to_path_buf())),
                Err(e) => (
                    ServerConfig::default(),
                    ConfigSource::Invalid {
                        path: path.to_path_buf(),
                        error: e.to_string(),
                    },
                ),
            },
            Err(_) => (
                ServerConfig::default(),
                ConfigSource::Missing(path.to_path_buf()),
            ),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("FLYSWAT_LISTEN_ADDR")
            && !addr.is_empty()
        {
            self.listen_addr = addr;
        }
        if let Ok(root) = std::env::var("FLYSWAT_WEB_ROOT")
            && !root.is_empty()
        {
            self.web_root = root;
        }
        if let Ok(path) = std::env::var("FLYSWAT_STORE_PATH")
            && !path.is_empty()
        {
            self.leaderboard.store = StoreKind::File;
            self.leaderboard.path = PathBuf::from(path);
        }
        if let Ok(val) = std::env::var("FLYSWAT_LEADERBOARD_SIZE")
            && let Ok(n) = val.parse::<usize>()
        {
            self.leaderboard.size = n;
        }
        if let Ok(val) = std::env::var("FLYSWAT_SESSION_DURATION")
            && let Ok(n) = val.parse::<u32>()
        {
            self.session.duration_secs = n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flyswat_core::session::MAX_SPAWN_CAP;

    #[test]
    fn default_config_values() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert_eq!(cfg.web_root, "web");
        assert_eq!(cfg.leaderboard.size, 10);
        assert_eq!(cfg.leaderboard.store, StoreKind::File);
        assert_eq!(cfg.session.duration_secs, 60);
        assert_eq!(cfg.session.spawn_cap, 12);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_invalid_addr() {
        let cfg = ServerConfig {
            listen_addr: "not-an-address".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidListenAddr(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_board() {
        let mut cfg = ServerConfig::default();
        cfg.leaderboard.size = 0;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.to_string(), "leaderboard.size must be > 0");
    }

    #[test]
    fn validate_rejects_bad_session() {
        let mut cfg = ServerConfig::default();
        cfg.session.spawn_interval_ms = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Session(SessionConfigError::ZeroInterval(
                "spawn_interval_ms"
            )))
        ));
    }

    #[test]
    fn validate_rejects_oversized_board() {
        let mut cfg = ServerConfig::default();
        cfg.leaderboard.size = MAX_LEADERBOARD_SIZE;
        assert!(cfg.validate().is_ok());

        cfg.leaderboard.size = MAX_LEADERBOARD_SIZE + 1;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::TooLarge {
                field: "leaderboard.size",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_oversized_spawn_cap() {
        let mut cfg = ServerConfig::default();
        cfg.session.spawn_cap = MAX_SPAWN_CAP;
        assert!(cfg.validate().is_ok());

        cfg.session.spawn_cap = 400;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Session(SessionConfigError::SpawnCapTooLarge(400)))
        ));
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "listen_addr = \"127.0.0.1:7000\"\n").unwrap();
        let (cfg, source) = ServerConfig::load_from(&path);
        assert_eq!(cfg.listen_addr, "127.0.0.1:7000");
        assert_eq!(source, ConfigSource::File(path));
    }

    #[test]
    fn load_from_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let (cfg, source) = ServerConfig::load_from(&path);
        assert_eq!(cfg.listen_addr, ServerConfig::default().listen_addr);
        assert_eq!(source, ConfigSource::Missing(path));
    }

    #[test]
    fn load_from_malformed_file_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[leaderboard]\nsize = \"many\"\n").unwrap();
        let (cfg, source) = ServerConfig::load_from(&path);
        assert_eq!(cfg.leaderboard.size, DEFAULT_LEADERBOARD_SIZE);
        match source {
            ConfigSource::Invalid { path: p, error } => {
                assert_eq!(p, path);
                assert!(!error.is_empty());
            },
            other => panic!("Expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn parse_minimal_toml() {
        let toml_str = r#"
listen_addr = "127.0.0.1:9090"
web_root = "/var/www"
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9090");
        assert_eq!(cfg.web_root, "/var/www");
        assert_eq!(cfg.limits.max_ws_connections, 200);
        assert_eq!(cfg.session, SessionConfig::default());
    }

    #[test]
    fn parse_full_toml() {
        let toml_str = r#"
listen_addr = "0.0.0.0:3000"
log_format = "json"

[session]
duration_secs = 30
spawn_cap = 6
max_target_lifetime_ms = 2500

[leaderboard]
size = 25
store = "memory"

[limits]
max_ws_connections = 500
ws_rate_limit_per_sec = 100.0
request_timeout_secs = 5
"#;
        let cfg: ServerConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.log_format, "json");
        assert_eq!(cfg.session.duration_secs, 30);
        assert_eq!(cfg.session.spawn_cap, 6);
        assert_eq!(cfg.session.spawn_interval_ms, 400);
        assert_eq!(cfg.session.max_target_lifetime_ms, Some(2500));
        assert_eq!(cfg.leaderboard.size, 25);
        assert_eq!(cfg.leaderboard.store, StoreKind::Memory);
        assert_eq!(cfg.limits.max_ws_connections, 500);
        assert!((cfg.limits.ws_rate_limit_per_sec - 100.0).abs() < f64::EPSILON);
        assert_eq!(cfg.limits.request_timeout_secs, 5);
        assert_eq!(cfg.limits.max_sse_subscribers, 100);
    }

    #[test]
    fn unknown_store_kind_rejected() {
        let toml_str = r#"
[leaderboard]
store = "postgres"
"#;
        assert!(toml::from_str::<ServerConfig>(toml_str).is_err());
    }
}
