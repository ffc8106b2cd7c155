//! Runtime settings, read from the environment (a `.env` file is honoured).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::op::config::{ConfigError, default_path};
use crate::store::StoreOptions;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Vault CLI executable.
    pub op_bin: PathBuf,
    /// Lifetime of cached vault responses.
    pub cache_ttl: Duration,
    /// How often expired cache entries are swept.
    pub cache_sweep: Duration,
    /// How long a session is trusted after sign-in or restore.
    pub session_lifetime: Duration,
    /// Capacity of the UI task queue.
    pub queue_capacity: usize,
    /// Window within which an identical search is not re-issued.
    pub debounce: Duration,
    /// How long a copied secret stays on the clipboard.
    pub clipboard_timeout: Duration,
    /// Where log files go.
    pub data_dir: PathBuf,
    /// Override for the vault CLI's config file.
    pub op_config: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            op_bin: resolve_bin("op"),
            cache_ttl: Duration::from_secs(15 * 60),
            cache_sweep: Duration::from_secs(5 * 60),
            session_lifetime: Duration::from_secs(30 * 60),
            queue_capacity: 64,
            debounce: Duration::from_millis(250),
            clipboard_timeout: Duration::from_secs(30),
            data_dir: crate::default_data_dir(),
            op_config: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(bin) = dotenvy::var("VAULTVIEW_OP_BIN") {
            cfg.op_bin = resolve_bin(&bin);
        }
        if let Some(secs) = parse_var::<u64>("VAULTVIEW_CACHE_TTL_SECS") {
            cfg.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("VAULTVIEW_CACHE_SWEEP_SECS")
            && secs > 0
        {
            cfg.cache_sweep = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>("VAULTVIEW_SESSION_LIFETIME_SECS") {
            cfg.session_lifetime = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var::<usize>("VAULTVIEW_QUEUE_CAPACITY")
            && n > 0
        {
            cfg.queue_capacity = n;
        }
        if let Some(ms) = parse_var::<u64>("VAULTVIEW_DEBOUNCE_MS") {
            cfg.debounce = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>("VAULTVIEW_CLIPBOARD_TIMEOUT_SECS") {
            cfg.clipboard_timeout = Duration::from_secs(secs);
        }
        if let Ok(dir) = dotenvy::var("VAULTVIEW_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(path) = dotenvy::var("VAULTVIEW_OP_CONFIG") {
            cfg.op_config = Some(PathBuf::from(path));
        }

        cfg
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            ttl: self.cache_ttl,
            sweep_interval: Some(self.cache_sweep),
        }
    }

    pub fn op_config_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.op_config {
            Some(path) => Ok(path.clone()),
            None => default_path(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = dotenvy::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            debug!(var = name, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

/// Bare names are looked up on PATH; anything with a separator is used as is.
fn resolve_bin(name: &str) -> PathBuf {
    if name.contains(std::path::MAIN_SEPARATOR) {
        return PathBuf::from(name);
    }
    which::which(name).unwrap_or_else(|_| PathBuf::from(name))
}
