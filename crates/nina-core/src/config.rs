//! Configuration loading. A single TOML file drives all three binaries;
//! every field has a default so a missing file still yields a usable
//! configuration. A handful of `NINA_*` environment variables override the
//! file, which keeps container deployments free of config mounts.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub logging: LoggingConfig,
    pub ingress: IngressConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngressConfig {
    pub host: String,
    pub port: u16,
    pub deployment_refresh_interval: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 8080 }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { host: "localhost".into(), port: 6379, password: String::new(), db: 0 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".into(), format: "text".into() }
    }
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".into(), port: 8081, deployment_refresh_interval: 5 }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            redis: RedisConfig::default(),
            logging: LoggingConfig::default(),
            ingress: IngressConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from `<config_dir>/nina/nina.toml`
    /// when no path is given. A missing file at the default location is not
    /// an error; an explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cfg_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => default_config_path(),
        };
        debug!(path = ?cfg_path, exists = cfg_path.exists(), "config.load");
        let mut cfg = if cfg_path.exists() {
            let content = fs::read_to_string(&cfg_path)
                .with_context(|| format!("read config {}", cfg_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("parse config {}", cfg_path.display()))?
        } else {
            if path.is_none() {
                write_default_config(&cfg_path);
            }
            Config::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("NINA_SERVER_HOST") {
            if !v.is_empty() {
                self.server.host = v;
            }
        }
        if let Ok(v) = std::env::var("NINA_SERVER_PORT") {
            if let Ok(p) = v.parse() {
                self.server.port = p;
            }
        }
        if let Ok(v) = std::env::var("NINA_REDIS_HOST") {
            if !v.is_empty() {
                self.redis.host = v;
            }
        }
        if let Ok(v) = std::env::var("NINA_REDIS_PORT") {
            if let Ok(p) = v.parse() {
                self.redis.port = p;
            }
        }
        if let Ok(v) = std::env::var("NINA_INGRESS_HOST") {
            if !v.is_empty() {
                self.ingress.host = v;
            }
        }
        if let Ok(v) = std::env::var("NINA_INGRESS_PORT") {
            if let Ok(p) = v.parse() {
                self.ingress.port = p;
            }
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn ingress_addr(&self) -> String {
        format!("{}:{}", self.ingress.host, self.ingress.port)
    }

    /// Redis connection URL, password and database included.
    pub fn redis_url(&self) -> String {
        if self.redis.password.is_empty() {
            format!("redis://{}:{}/{}", self.redis.host, self.redis.port, self.redis.db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.redis.password, self.redis.host, self.redis.port, self.redis.db
            )
        }
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        let secs = if self.ingress.deployment_refresh_interval == 0 {
            5
        } else {
            self.ingress.deployment_refresh_interval
        };
        std::time::Duration::from_secs(secs)
    }
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("nina.toml")
}

fn config_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("nina")
}

/// Best-effort: seed the default config file so operators have something to
/// edit. Failure to write is not fatal.
fn write_default_config(path: &Path) {
    let Some(parent) = path.parent() else { return };
    if fs::create_dir_all(parent).is_err() {
        return;
    }
    let content = "\
[server]
host = \"0.0.0.0\"
port = 8080

[redis]
host = \"localhost\"
port = 6379
password = \"\"
db = 0

[logging]
level = \"info\"
format = \"text\"

[ingress]
host = \"0.0.0.0\"
port = 8081
deployment_refresh_interval = 5
";
    let _ = fs::write(path, content);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.server_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.ingress_addr(), "0.0.0.0:8081");
        assert_eq!(cfg.redis_url(), "redis://localhost:6379/0");
        assert_eq!(cfg.refresh_interval(), std::time::Duration::from_secs(5));
    }

    #[test]
    fn loads_partial_file_over_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[server]\nport = 9000\n\n[ingress]\ndeployment_refresh_interval = 2").unwrap();
        let cfg = Config::load(Some(f.path())).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.refresh_interval(), std::time::Duration::from_secs(2));
    }

    #[test]
    fn rejects_malformed_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "not toml at all [").unwrap();
        assert!(Config::load(Some(f.path())).is_err());
    }

    #[test]
    fn redis_url_includes_password() {
        let mut cfg = Config::default();
        cfg.redis.password = "hunter2".into();
        assert_eq!(cfg.redis_url(), "redis://:hunter2@localhost:6379/0");
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn zero_refresh_interval_falls_back_to_default() {
        let mut cfg = Config::default();
        cfg.ingress.deployment_refresh_interval = 0;
        assert_eq!(cfg.refresh_interval(), std::time::Duration::from_secs(5));
    }
}
