// src/config/defaults.rs
use std::path::PathBuf;

use crate::config::app::{Features, Kdf, Paths, Session};
use crate::consts::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_KDF_ITERATIONS, DEFAULT_KDF_MEMORY_KIB,
    DEFAULT_KDF_PARALLELISM, DEFAULT_MESSAGE_DB_FILE,
};

pub fn default_kdf() -> Kdf {
    Kdf {
        memory_kib: DEFAULT_KDF_MEMORY_KIB,
        iterations: DEFAULT_KDF_ITERATIONS,
        parallelism: DEFAULT_KDF_PARALLELISM,
    }
}

pub fn default_session() -> Session {
    Session {
        idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
    }
}

pub fn default_paths() -> Paths {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    Paths {
        message_db: base.join(DEFAULT_MESSAGE_DB_FILE),
    }
}

pub fn default_features() -> Features {
    Features { fast_kdf: false }
}
