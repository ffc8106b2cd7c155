use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use vaultview::clipboard::{ClipboardError, ClipboardSink};
use vaultview::clock::ManualClock;
use vaultview::model::{Detail, DetailField, Record};
use vaultview::op::{OpError, VaultCli};
use vaultview::session::Authenticator;
use vaultview::store::StoreOptions;

pub const TOKEN: &str = "tok-1";
pub const MASTER_PASSWORD: &str = "correct horse";
pub const SESSION_LIFETIME: Duration = Duration::from_secs(30 * 60);
pub const CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// In-memory stand-in for the vault CLI that counts every invocation.
#[allow(dead_code)]
pub struct FakeVault {
    items: Mutex<Vec<Record>>,
    details: Mutex<HashMap<String, Detail>>,
    revoked: AtomicBool,
    panic_on_list: AtomicBool,
    pub sign_ins: AtomicUsize,
    pub probes: AtomicUsize,
    pub lists: AtomicUsize,
    pub gets: AtomicUsize,
    pub last_sign_in: Mutex<Option<(String, String, String)>>,
}

#[allow(dead_code)]
impl FakeVault {
    pub fn new(titles: &[(&str, &str)]) -> Self {
        Self {
            items: Mutex::new(records(titles)),
            details: Mutex::new(HashMap::new()),
            revoked: AtomicBool::new(false),
            panic_on_list: AtomicBool::new(false),
            sign_ins: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            last_sign_in: Mutex::new(None),
        }
    }

    pub fn with_login(self, id: &str, username: &str, password: &str) -> Self {
        self.details.lock().unwrap().insert(
            id.to_string(),
            Detail {
                fields: vec![
                    DetailField {
                        designation: "username".into(),
                        name: "username".into(),
                        value: username.into(),
                    },
                    DetailField {
                        designation: "password".into(),
                        name: "password".into(),
                        value: password.into(),
                    },
                ],
                notes: String::new(),
                sections: Vec::new(),
            },
        );
        self
    }

    pub fn set_items(&self, titles: &[(&str, &str)]) {
        *self.items.lock().unwrap() = records(titles);
    }

    /// Every later call fails as if the session had been signed out.
    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    pub fn panic_on_list(&self) {
        self.panic_on_list.store(true, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn check(&self, token: &str) -> Result<(), OpError> {
        if self.revoked.load(Ordering::SeqCst) || token != TOKEN {
            return Err(OpError::vault(1, "You are not currently signed in."));
        }
        Ok(())
    }
}

impl VaultCli for FakeVault {
    fn sign_in(
        &self,
        address: &str,
        email: &str,
        secret_key: &str,
        master_password: &str,
    ) -> Result<String, OpError> {
        self.sign_ins.fetch_add(1, Ordering::SeqCst);
        *self.last_sign_in.lock().unwrap() =
            Some((address.into(), email.into(), secret_key.into()));
        if master_password != MASTER_PASSWORD {
            return Err(OpError::vault(145, "401: Authentication required."));
        }
        self.revoked.store(false, Ordering::SeqCst);
        Ok(TOKEN.to_string())
    }

    fn probe(&self, token: &str) -> Result<(), OpError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.check(token)
    }

    fn list_items(&self, token: &str) -> Result<Vec<u8>, OpError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_list.load(Ordering::SeqCst) {
            panic!("fake vault list exploded");
        }
        self.check(token)?;
        Ok(serde_json::to_vec(&*self.items.lock().unwrap()).unwrap())
    }

    fn get_item(&self, token: &str, id: &str) -> Result<Vec<u8>, OpError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check(token)?;
        let items = self.items.lock().unwrap();
        let Some(record) = items.iter().find(|r| r.id == id) else {
            return Err(OpError::vault(145, "Item not found in vault."));
        };
        let detail = self
            .details
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default();
        Ok(serde_json::to_vec(&record.clone().with_details(detail)).unwrap())
    }
}

pub fn records(titles: &[(&str, &str)]) -> Vec<Record> {
    titles
        .iter()
        .map(|(id, title)| Record::new(*id, *title))
        .collect()
}

#[allow(dead_code)]
pub fn authenticator(vault: &Arc<FakeVault>, clock: &Arc<ManualClock>) -> Authenticator {
    Authenticator::new(
        vault.clone(),
        clock.clone(),
        StoreOptions {
            ttl: CACHE_TTL,
            sweep_interval: None,
        },
        SESSION_LIFETIME,
    )
}

/// Writes a vault CLI config naming one account and returns its path.
#[allow(dead_code)]
pub fn write_op_config(dir: &TempDir, shorthand: &str) -> PathBuf {
    let path = dir.path().join("config");
    let body = serde_json::json!({
        "latest_signin": shorthand,
        "accounts": [{
            "shorthand": shorthand,
            "url": "https://my.example.com",
            "email": "me@example.com",
            "accountKey": "A3-ACCOUNT-KEY",
            "userUUID": "USER1"
        }]
    });
    std::fs::write(&path, serde_json::to_vec_pretty(&body).unwrap()).unwrap();
    path
}

#[allow(dead_code)]
pub fn missing_path(dir: &TempDir) -> PathBuf {
    dir.path().join("does-not-exist")
}

/// Records what was copied instead of touching the system clipboard.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingClipboard {
    pub copied: Mutex<Vec<String>>,
}

impl ClipboardSink for RecordingClipboard {
    fn copy(&self, text: &str) -> Result<(), ClipboardError> {
        self.copied.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }

    pub fn assert_not_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            !out.contains(needle),
            "expected logs not to contain `{needle}`, got:\n{out}"
        );
    }
}

#[allow(dead_code)]
pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn set(key: &str, val: impl AsRef<str>) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val.as_ref()) };
        Self {
            key: key.to_string(),
            prev,
        }
    }

    pub fn unset(key: &str) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::remove_var(key) };
        Self {
            key: key.to_string(),
            prev,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}

struct TestWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
