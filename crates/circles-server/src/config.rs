//! Server configuration: TOML file + environment + CLI overrides.

use crate::transport::websocket::{TransportLimits, MAX_WS_FRAME_SIZE};
use circles_core::{CircleError, CircleResult};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable consulted for the access-token secret.
pub const ACCESS_SECRET_ENV: &str = "JWT_ACCESS_SECRET";

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub store: StoreSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_frame_bytes: default_max_frame_bytes(),
            outbound_buffer: default_outbound_buffer(),
            ping_interval_secs: default_ping_interval(),
        }
    }
}

/// `[auth]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSection {
    #[serde(default)]
    pub access_secret: Option<String>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_minute: u32,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            access_secret: None,
            max_attempts_per_minute: default_max_attempts(),
        }
    }
}

/// `[store]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
    /// Seed file for the in-memory store.
    #[serde(default)]
    pub seed: Option<String>,
    #[serde(default = "default_true")]
    pub default_circles: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_store_timeout(),
            seed: None,
            default_circles: true,
        }
    }
}

fn default_port() -> u16 {
    5000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_frame_bytes() -> usize {
    MAX_WS_FRAME_SIZE
}
fn default_outbound_buffer() -> usize {
    64
}
fn default_ping_interval() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    5
}
fn default_store_timeout() -> u64 {
    5000
}
fn default_true() -> bool {
    true
}

/// Values supplied on the command line. `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub access_secret: Option<String>,
    pub seed: Option<String>,
    pub no_default_circles: bool,
}

/// Resolved server configuration (paths expanded, overrides applied).
#[derive(Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub max_frame_bytes: usize,
    pub outbound_buffer: usize,
    pub ping_interval: Duration,
    pub access_secret: String,
    pub max_auth_attempts_per_minute: u32,
    pub store_timeout: Duration,
    pub seed_path: Option<PathBuf>,
    pub default_circles: bool,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .field("outbound_buffer", &self.outbound_buffer)
            .field("ping_interval", &self.ping_interval)
            .field("access_secret", &"<redacted>")
            .field("max_auth_attempts_per_minute", &self.max_auth_attempts_per_minute)
            .field("store_timeout", &self.store_timeout)
            .field("seed_path", &self.seed_path)
            .field("default_circles", &self.default_circles)
            .finish()
    }
}

impl ServerConfig {
    /// Load config from TOML file, then apply `JWT_ACCESS_SECRET` and CLI
    /// overrides. A missing file falls back to defaults.
    pub fn load(config_path: Option<&Path>, cli: &CliOverrides) -> CircleResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    read_config_file(&expanded)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };
        Self::resolve(file_config, cli, std::env::var(ACCESS_SECRET_ENV).ok())
    }

    /// Merge the layers. The secret is taken from the CLI, then the
    /// environment, then the file; one of them must be non-empty.
    pub fn resolve(
        file: ConfigFile,
        cli: &CliOverrides,
        env_secret: Option<String>,
    ) -> CircleResult<Self> {
        let port = cli.port.unwrap_or(file.server.port);
        let bind = cli.bind.clone().unwrap_or(file.server.bind);
        let bind_addr = format!("{bind}:{port}")
            .parse::<SocketAddr>()
            .or_else(|_| format!("[{bind}]:{port}").parse::<SocketAddr>())
            .map_err(|e| CircleError::Other(format!("invalid bind address {bind}: {e}")))?;

        let access_secret = [cli.access_secret.clone(), env_secret, file.auth.access_secret]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .ok_or_else(|| {
                CircleError::Other(format!(
                    "no access secret configured (set --access-secret, {ACCESS_SECRET_ENV} or auth.access_secret)"
                ))
            })?;

        let seed = cli.seed.clone().or(file.store.seed);

        Ok(Self {
            bind_addr,
            max_frame_bytes: file.server.max_frame_bytes,
            outbound_buffer: file.server.outbound_buffer,
            ping_interval: Duration::from_secs(file.server.ping_interval_secs),
            access_secret,
            max_auth_attempts_per_minute: file.auth.max_attempts_per_minute,
            store_timeout: Duration::from_millis(file.store.timeout_ms),
            seed_path: seed.as_deref().map(expand_tilde_str),
            default_circles: file.store.default_circles && !cli.no_default_circles,
        })
    }

    pub fn transport_limits(&self) -> TransportLimits {
        TransportLimits {
            max_frame_bytes: self.max_frame_bytes,
            outbound_buffer: self.outbound_buffer,
            ping_interval: self.ping_interval,
        }
    }
}

fn read_config_file(path: &Path) -> CircleResult<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str::<ConfigFile>(&content)
        .map_err(|e| CircleError::Other(format!("config parse error: {e}")))
}

/// Expand `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_secret() -> CliOverrides {
        CliOverrides {
            access_secret: Some("cli-secret".into()),
            ..Default::default()
        }
    }

    #[test]
    fn defaults() {
        let cfg = ServerConfig::resolve(ConfigFile::default(), &with_secret(), None).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(cfg.max_frame_bytes, 1_048_576);
        assert_eq!(cfg.outbound_buffer, 64);
        assert_eq!(cfg.ping_interval, Duration::from_secs(30));
        assert_eq!(cfg.max_auth_attempts_per_minute, 5);
        assert_eq!(cfg.store_timeout, Duration::from_millis(5000));
        assert!(cfg.default_circles);
        assert!(cfg.seed_path.is_none());
    }

    #[test]
    fn file_values_and_cli_overrides() {
        let file: ConfigFile = toml::from_str(
            r#"
            [server]
            port = 7000
            bind = "127.0.0.1"
            ping_interval_secs = 0

            [auth]
            access_secret = "file-secret"
            max_attempts_per_minute = 9

            [store]
            timeout_ms = 250
            seed = "/etc/circles/seed.toml"
            default_circles = false
            "#,
        )
        .unwrap();

        let cfg = ServerConfig::resolve(file.clone(), &CliOverrides::default(), None).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(cfg.access_secret, "file-secret");
        assert_eq!(cfg.max_auth_attempts_per_minute, 9);
        assert_eq!(cfg.store_timeout, Duration::from_millis(250));
        assert_eq!(cfg.ping_interval, Duration::ZERO);
        assert_eq!(cfg.seed_path, Some(PathBuf::from("/etc/circles/seed.toml")));
        assert!(!cfg.default_circles);

        let cli = CliOverrides {
            port: Some(0),
            bind: Some("::1".into()),
            ..Default::default()
        };
        let cfg = ServerConfig::resolve(file, &cli, None).unwrap();
        assert_eq!(cfg.bind_addr, "[::1]:0".parse().unwrap());
    }

    #[test]
    fn secret_precedence() {
        let mut file = ConfigFile::default();
        file.auth.access_secret = Some("file".into());

        let cfg = ServerConfig::resolve(file.clone(), &with_secret(), Some("env".into())).unwrap();
        assert_eq!(cfg.access_secret, "cli-secret");

        let cfg =
            ServerConfig::resolve(file.clone(), &CliOverrides::default(), Some("env".into())).unwrap();
        assert_eq!(cfg.access_secret, "env");

        let cfg = ServerConfig::resolve(file, &CliOverrides::default(), Some(String::new())).unwrap();
        assert_eq!(cfg.access_secret, "file");
    }

    #[test]
    fn missing_secret_is_an_error() {
        assert!(ServerConfig::resolve(ConfigFile::default(), &CliOverrides::default(), None).is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let cfg = ServerConfig::resolve(ConfigFile::default(), &with_secret(), None).unwrap();
        assert!(!format!("{cfg:?}").contains("cli-secret"));
    }

    #[test]
    fn tilde_expansion() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde_str("~/x/seed.toml"), home.join("x/seed.toml"));
        }
        assert_eq!(expand_tilde_str("/abs"), PathBuf::from("/abs"));
    }
}
