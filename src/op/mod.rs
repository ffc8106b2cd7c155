//! Boundary to the external vault command-line tool.
//!
//! The rest of the crate talks to the vault only through [`VaultCli`]. The
//! production implementation, [`OpCli`], shells out to the `op` binary;
//! tests substitute an in-memory fake.
//!
//! Implementations return the raw JSON payload; decoding is the caller's job
//! so that decode failures stay distinct from invocation failures.

pub mod config;
pub mod error;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Instant;

use tracing::debug;

pub use config::{Account, ConfigError, OpConfig};
pub use error::{OpError, VaultErrorKind};

/// Sign-in address used when the user leaves it blank.
pub const DEFAULT_SIGNIN_ADDRESS: &str = "my.1password.com";

pub trait VaultCli: Send + Sync {
    /// Exchange account material for a session token.
    fn sign_in(
        &self,
        address: &str,
        email: &str,
        secret_key: &str,
        master_password: &str,
    ) -> Result<String, OpError>;

    /// Cheap call that fails if `token` is not a live session.
    fn probe(&self, token: &str) -> Result<(), OpError>;

    /// JSON array of records without details.
    fn list_items(&self, token: &str) -> Result<Vec<u8>, OpError>;

    /// JSON object of one record including details.
    fn get_item(&self, token: &str, id: &str) -> Result<Vec<u8>, OpError>;
}

/// Runs the `op` executable as a subprocess.
#[derive(Debug, Clone)]
pub struct OpCli {
    bin: PathBuf,
}

impl OpCli {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<Vec<u8>, OpError> {
        // args may carry the token; only the subcommand is logged.
        let subcommand = args.first().copied().unwrap_or_default();
        let started = Instant::now();

        let mut child = Command::new(&self.bin)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(input) = stdin
            && let Some(mut pipe) = child.stdin.take()
        {
            write_stdin(&mut pipe, input.as_bytes())?;
            // Dropping the pipe closes it so the child sees EOF.
        }

        let output = child.wait_with_output()?;
        debug!(
            subcommand,
            status = ?output.status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "vault_cli_exit"
        );

        if !output.status.success() {
            return Err(OpError::from_output(output.status, &output.stderr));
        }
        Ok(output.stdout)
    }
}

/// Write `input` to a child's stdin. A child that exits before reading
/// closes the pipe; its exit status and stderr then carry the real error.
pub(crate) fn write_stdin(pipe: &mut impl Write, input: &[u8]) -> io::Result<()> {
    match pipe.write_all(input) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("child closed stdin before reading it");
            Ok(())
        }
        other => other,
    }
}

impl Default for OpCli {
    fn default() -> Self {
        Self::new("op")
    }
}

fn session_arg(token: &str) -> String {
    format!("--session={token}")
}

impl VaultCli for OpCli {
    fn sign_in(
        &self,
        address: &str,
        email: &str,
        secret_key: &str,
        master_password: &str,
    ) -> Result<String, OpError> {
        let address = if address.trim().is_empty() {
            DEFAULT_SIGNIN_ADDRESS
        } else {
            address
        };
        let out = self.run(
            &["signin", address, email, secret_key, "--output=raw"],
            Some(master_password),
        )?;
        Ok(String::from_utf8_lossy(&out).trim().to_string())
    }

    fn probe(&self, token: &str) -> Result<(), OpError> {
        self.run(&["get", "account", &session_arg(token)], None)
            .map(|_| ())
    }

    fn list_items(&self, token: &str) -> Result<Vec<u8>, OpError> {
        self.run(&["list", "items", &session_arg(token)], None)
    }

    fn get_item(&self, token: &str, id: &str) -> Result<Vec<u8>, OpError> {
        self.run(&["get", "item", id, &session_arg(token)], None)
    }
}
