// src/config/app.rs
use super::defaults::*;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use crate::core::kdf::KdfParams;
use crate::error::CoreError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_kdf")]
    pub kdf: Kdf,
    #[serde(default = "default_session")]
    pub session: Session,
    #[serde(default = "default_paths")]
    pub paths: Paths,
    #[serde(default = "default_features")]
    pub features: Features,
}

/// Argon2id cost for verifiers created from now on
#[derive(Debug, Clone, Deserialize)]
pub struct Kdf {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    /// 0 disables idle expiry
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paths {
    pub message_db: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Features {
    /// Use the minimum Argon2 cost. Never enable outside tests.
    pub fast_kdf: bool,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// KDF parameters to use when a new verifier is written
    pub fn kdf_params(&self) -> KdfParams {
        if self.features.fast_kdf {
            KdfParams::fast()
        } else {
            KdfParams {
                memory_kib: self.kdf.memory_kib,
                iterations: self.kdf.iterations,
                parallelism: self.kdf.parallelism,
            }
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.session.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            kdf: default_kdf(),
            session: default_session(),
            paths: default_paths(),
            features: default_features(),
        }
    }
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load config once per process, falling back to defaults if missing or invalid
pub fn load() -> &'static Config {
    CONFIG.get_or_init(|| {
        let config_path =
            std::env::var("MKR_CONFIG").unwrap_or_else(|_| "keyring-config.toml".to_string());

        let mut conf = if Path::new(&config_path).exists() {
            match Config::from_path(&config_path) {
                Ok(conf) => conf,
                Err(err) => {
                    tracing::warn!(
                        path = %config_path,
                        error = %err,
                        "invalid config, using built-in defaults"
                    );
                    Config::default()
                }
            }
        } else {
            tracing::warn!(path = %config_path, "config not found, using built-in defaults");
            Config::default()
        };

        if let Ok(db) = std::env::var("MKR_MESSAGE_DB") {
            conf.paths.message_db = PathBuf::from(db);
        }

        conf
    })
}
