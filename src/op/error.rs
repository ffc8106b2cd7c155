//! Errors reported by the vault CLI.
//!
//! On failure the CLI exits non-zero and prints a diagnostic line such as:
//!
//! ```text
//! [LOG] 2018/05/25 19:02:52 (ERROR) 401: Authentication required.
//! ```
//!
//! The message after the level tag becomes [`OpError::Vault::message`]; the
//! exit status becomes its `code`.

use std::process::ExitStatus;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static DIAGNOSTIC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\[LOG\] [\d/]+ [\d:]+ \(\w+\) (.*?)\s*$").expect("diagnostic regex")
});

const UNKNOWN_MESSAGE: &str = "unknown error";

/// Phrases meaning there is no usable session (none active, or expired/invalid).
const UNAUTHENTICATED_PHRASES: &[&str] = &[
    "not currently signed in",
    "you are not signed in",
    "session expired",
    "invalid session",
    "authentication required",
];

/// Phrases meaning the submitted sign-in material was rejected.
const INVALID_CREDENTIAL_PHRASES: &[&str] = &[
    "invalid account key",
    "invalid request parameters",
    "invalid email",
    "authentication required",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultErrorKind {
    /// Exit code 1.
    Unauthorized,
    Generic,
}

#[derive(Error, Debug)]
pub enum OpError {
    /// The process could not be started or its pipes failed.
    #[error("vault CLI could not be run: {0}")]
    Transport(#[from] std::io::Error),

    #[error("op: {code} {message}")]
    Vault { code: i32, message: String },
}

impl OpError {
    /// Build a classified error from a failed invocation.
    pub fn from_output(status: ExitStatus, stderr: &[u8]) -> Self {
        // Killed by a signal has no code.
        let code = status.code().unwrap_or(-1);
        Self::Vault {
            code,
            message: parse_diagnostic(&String::from_utf8_lossy(stderr)),
        }
    }

    pub fn vault(code: i32, message: impl Into<String>) -> Self {
        Self::Vault {
            code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> Option<VaultErrorKind> {
        match self {
            Self::Transport(_) => None,
            Self::Vault { code: 1, .. } => Some(VaultErrorKind::Unauthorized),
            Self::Vault { .. } => Some(VaultErrorKind::Generic),
        }
    }

    /// HTTP-style status for the error, used by the UI to pick wording.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            Some(VaultErrorKind::Unauthorized) => 401,
            _ => 500,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Vault { message, .. } => Some(message),
            Self::Transport(_) => None,
        }
    }

    /// The session is missing, expired or otherwise rejected.
    pub fn is_unauthenticated(&self) -> bool {
        self.message_contains_any(UNAUTHENTICATED_PHRASES)
    }

    /// The account key, email or master password was rejected.
    pub fn is_invalid_credentials(&self) -> bool {
        self.message_contains_any(INVALID_CREDENTIAL_PHRASES)
    }

    fn message_contains_any(&self, phrases: &[&str]) -> bool {
        let Some(message) = self.message() else {
            return false;
        };
        let message = message.to_lowercase();
        phrases.iter().any(|p| message.contains(p))
    }
}

/// Extract the message of the first `[LOG]` diagnostic line.
pub fn parse_diagnostic(stderr: &str) -> String {
    DIAGNOSTIC_RE
        .captures(stderr)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_MESSAGE.to_string())
}
