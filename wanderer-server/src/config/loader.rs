//! Layered configuration assembly (§4.15): compiled-in defaults from
//! [`wanderer_core::config::AppConfig`] -> an optional TOML file -> `WK_*`
//! environment variables -> CLI flags, the way the reference architecture's
//! `ConfigLoader` composes `Config` from `FileConfig`/`EnvConfig`/CLI.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use wanderer_core::config::AppConfig;

use super::cli::Args;

const MIN_SECRET_KEY_BASE_LEN: usize = 64;

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerSection,
    #[serde(default)]
    pub redisq: FileRedisQSection,
    #[serde(default)]
    pub secret_key_base: Option<String>,
    #[serde(default)]
    pub origin_host: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FileRedisQSection {
    pub url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<String>,
}

impl ConfigWarnings {
    pub fn push(&mut self, message: impl Into<String>) {
        self.items.push(message.into());
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: AppConfig,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn load(&self, args: &Args) -> Result<ConfigLoad, ConfigLoadError> {
        let _ = dotenvy::dotenv();

        let explicit_path = args.config.clone().or_else(|| self.config_path.clone());
        let file = self.load_file(explicit_path.as_deref())?;

        let mut warnings = ConfigWarnings::default();
        if explicit_path.is_none() {
            warnings.push("no config file given; using defaults and environment variables");
        }

        let mut config = AppConfig::default();

        config.server.host = env_string("WK_HOST").or(file.server.host.clone()).unwrap_or(config.server.host);
        config.server.port = args
            .port
            .or_else(|| env_parsed("WK_PORT"))
            .or(file.server.port)
            .unwrap_or(config.server.port);

        config.redisq.url = args
            .redisq_url
            .clone()
            .or_else(|| env_string("WK_REDISQ_URL"))
            .or(file.redisq.url.clone())
            .unwrap_or(config.redisq.url);

        config.secret_key_base = env_string("SECRET_KEY_BASE").or(file.secret_key_base.clone());
        config.origin_host = env_string("ORIGIN_HOST").or(file.origin_host.clone());

        if let Some(secret) = &config.secret_key_base {
            if secret.len() < MIN_SECRET_KEY_BASE_LEN {
                warnings.push(format!(
                    "SECRET_KEY_BASE is only {} bytes; production deployments require at least {MIN_SECRET_KEY_BASE_LEN}",
                    secret.len()
                ));
            }
        } else {
            warnings.push("SECRET_KEY_BASE not set; fine for local development, required in production");
        }

        Ok(ConfigLoad { config, warnings })
    }

    fn load_file(&self, path: Option<&Path>) -> Result<FileConfig, ConfigLoadError> {
        let Some(path) = path else {
            return Ok(FileConfig::default());
        };
        if !path.exists() {
            return Err(ConfigLoadError::MissingConfig { path: path.to_path_buf() });
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

#[allow(dead_code)]
fn humantime_duration(raw: &str) -> Option<Duration> {
    humantime::parse_duration(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_overrides_them() {
        let loader = ConfigLoader::new();
        let args = Args::default();
        std::env::remove_var("WK_PORT");
        std::env::remove_var("SECRET_KEY_BASE");
        let loaded = loader.load(&args).unwrap();
        assert_eq!(loaded.config.server.port, 4004);
        assert!(!loaded.warnings.items.is_empty());
    }

    #[test]
    fn cli_port_overrides_default() {
        let loader = ConfigLoader::new();
        let args = Args {
            port: Some(9000),
            ..Default::default()
        };
        let loaded = loader.load(&args).unwrap();
        assert_eq!(loaded.config.server.port, 9000);
    }
}
