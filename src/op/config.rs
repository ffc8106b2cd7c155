//! The vault CLI's own configuration file (`~/.op/config`).
//!
//! Only read to find the most recently used account when restoring a
//! session; every failure here means "no prior session".

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("vault config not found at {0}")]
    Missing(PathBuf),

    #[error("vault config at {path} unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("vault config at {path} malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no account matches latest sign-in {0:?}")]
    NoMatchingAccount(String),

    #[error("home directory could not be determined")]
    NoHome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpConfig {
    #[serde(rename = "latest_signin", default)]
    pub latest_signin: String,
    #[serde(default)]
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub shorthand: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "accountKey", default)]
    pub account_key: String,
    #[serde(rename = "userUUID", default)]
    pub user_uuid: String,
}

impl Account {
    /// Environment variable holding this account's session token.
    pub fn session_env_var(&self) -> String {
        format!("OP_SESSION_{}", self.shorthand)
    }
}

impl OpConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::Missing(path.to_path_buf())
            } else {
                ConfigError::Unreadable {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The account named by `latest_signin`.
    pub fn latest_account(&self) -> Result<&Account, ConfigError> {
        self.accounts
            .iter()
            .find(|a| a.shorthand == self.latest_signin)
            .ok_or_else(|| ConfigError::NoMatchingAccount(self.latest_signin.clone()))
    }
}

pub fn default_path() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".op").join("config"))
        .ok_or(ConfigError::NoHome)
}
