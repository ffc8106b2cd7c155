//! Copying secrets to the system clipboard.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::op::write_stdin;

#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("clipboard helper failed to start: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("clipboard helper exited with {0}")]
    Exit(std::process::ExitStatus),
}

pub trait ClipboardSink: Send + Sync {
    fn copy(&self, text: &str) -> Result<(), ClipboardError>;
}

/// `xsel --input --clipboard`, optionally clearing itself after a timeout.
#[derive(Debug, Clone)]
pub struct XselClipboard {
    bin: PathBuf,
    timeout: Option<Duration>,
}

impl XselClipboard {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            bin: which::which("xsel").unwrap_or_else(|_| PathBuf::from("xsel")),
            timeout,
        }
    }

    pub fn with_bin(mut self, bin: impl Into<PathBuf>) -> Self {
        self.bin = bin.into();
        self
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec!["--input".to_string(), "--clipboard".to_string()];
        if let Some(timeout) = self.timeout.filter(|t| !t.is_zero()) {
            args.push("--selectionTimeout".to_string());
            args.push(timeout.as_millis().to_string());
        }
        args
    }
}

impl ClipboardSink for XselClipboard {
    fn copy(&self, text: &str) -> Result<(), ClipboardError> {
        let mut child = Command::new(&self.bin)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            write_stdin(&mut stdin, text.as_bytes())?;
        }
        let status = child.wait()?;
        debug!(success = status.success(), "clipboard_copy");
        if status.success() {
            Ok(())
        } else {
            Err(ClipboardError::Exit(status))
        }
    }
}
