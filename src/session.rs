//! Authenticated vault sessions.
//!
//! A [`Session`] bundles the account material, the vault token, its expiry
//! and the record store it owns. [`Authenticator`] creates sessions (fresh
//! sign-in or restore from the vault CLI's config); [`SessionSlot`] holds the
//! one live session and swaps it atomically. Background work clones the
//! `Arc<Session>` it started with, so a swap never tears an in-flight call.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::clock::Clock;
use crate::model::Record;
use crate::op::{Account, ConfigError, DEFAULT_SIGNIN_ADDRESS, OpConfig, OpError, VaultCli};
use crate::search::SearchEngine;
use crate::search::tantivy::SearchError;
use crate::store::{Collection, RecordStore, StoreError, StoreOptions};

/// Upper bound on how long a session is trusted without the vault saying otherwise.
pub const MAX_SESSION_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    SignIn(#[source] OpError),

    #[error("session check failed: {0}")]
    Probe(#[source] OpError),

    #[error("no prior session: {0}")]
    NoPriorSession(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("session expired")]
    Expired,
}

impl SessionError {
    pub fn op_error(&self) -> Option<&OpError> {
        match self {
            Self::SignIn(e) | Self::Probe(e) => Some(e),
            Self::Store(e) => e.as_op(),
            _ => None,
        }
    }

    /// Sign-in rejected the account key, email or master password.
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, Self::SignIn(e) if e.is_invalid_credentials())
    }

    /// The session can no longer be used and the user must sign in again.
    pub fn needs_reauth(&self) -> bool {
        match self {
            Self::Expired | Self::NoPriorSession(_) => true,
            Self::Probe(_) => true,
            Self::Store(StoreError::Op(e)) => e.is_unauthenticated(),
            _ => false,
        }
    }
}

/// Material submitted on the sign-in form.
#[derive(Clone, Default)]
pub struct Credentials {
    pub address: String,
    pub email: String,
    pub secret_key: Zeroizing<String>,
    pub master_password: Zeroizing<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("address", &self.address)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
}

pub struct Session {
    signin_address: String,
    email: String,
    secret_key: Zeroizing<String>,
    token: Zeroizing<String>,
    expires_at: Instant,
    clock: Arc<dyn Clock>,
    store: RecordStore,
    engine: SearchEngine,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("signin_address", &self.signin_address)
            .field("email", &self.email)
            .field("has_token", &!self.token.is_empty())
            .field("valid", &self.valid())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Usable only while the token is non-empty and the expiry lies ahead.
    /// Re-check before every use; the answer changes as time passes.
    pub fn valid(&self) -> bool {
        !self.token.is_empty() && self.clock.now() < self.expires_at
    }

    pub fn signin_address(&self) -> &str {
        &self.signin_address
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(self.clock.now())
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    fn ensure_valid(&self) -> Result<(), SessionError> {
        if self.valid() {
            Ok(())
        } else {
            Err(SessionError::Expired)
        }
    }

    /// Cached collection, refreshed from the vault when stale.
    pub fn records(&self) -> Result<Arc<Collection>, SessionError> {
        self.ensure_valid()?;
        Ok(self.store.records(&self.token)?)
    }

    pub fn refresh(&self) -> Result<Arc<Collection>, SessionError> {
        self.ensure_valid()?;
        Ok(self.store.refresh_list(&self.token)?)
    }

    pub fn search(&self, text: &str) -> Result<Vec<Record>, SessionError> {
        let collection = self.records()?;
        Ok(self.engine.query(&collection, text)?)
    }

    /// One record with details.
    pub fn get(&self, id: &str) -> Result<Arc<Record>, SessionError> {
        self.ensure_valid()?;
        Ok(self.store.get_one(&self.token, id)?)
    }

    /// Account details to prefill a new sign-in with.
    pub fn prefill(&self) -> Credentials {
        Credentials {
            address: self.signin_address.clone(),
            email: self.email.clone(),
            secret_key: self.secret_key.clone(),
            master_password: Zeroizing::new(String::new()),
        }
    }
}

/// Creates sessions against one vault CLI.
pub struct Authenticator {
    cli: Arc<dyn VaultCli>,
    clock: Arc<dyn Clock>,
    store_options: StoreOptions,
    lifetime: Duration,
    engine: SearchEngine,
}

impl Authenticator {
    pub fn new(
        cli: Arc<dyn VaultCli>,
        clock: Arc<dyn Clock>,
        store_options: StoreOptions,
        lifetime: Duration,
    ) -> Self {
        Self {
            cli,
            clock,
            store_options,
            lifetime: lifetime.min(MAX_SESSION_LIFETIME),
            engine: SearchEngine::default(),
        }
    }

    pub fn with_engine(mut self, engine: SearchEngine) -> Self {
        self.engine = engine;
        self
    }

    fn session(
        &self,
        signin_address: String,
        email: String,
        secret_key: Zeroizing<String>,
        token: Zeroizing<String>,
    ) -> Session {
        let now = self.clock.now();
        let expires_at = now.checked_add(self.lifetime).unwrap_or(now);
        Session {
            signin_address,
            email,
            secret_key,
            token,
            expires_at,
            clock: Arc::clone(&self.clock),
            store: RecordStore::new(
                Arc::clone(&self.cli),
                &self.store_options,
                Arc::clone(&self.clock),
            ),
            engine: self.engine,
        }
    }

    /// Exchange account material for a token. Nothing existing is touched
    /// on failure; the caller decides whether to install the new session.
    pub fn sign_in(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        let address = if credentials.address.trim().is_empty() {
            DEFAULT_SIGNIN_ADDRESS.to_string()
        } else {
            credentials.address.trim().to_string()
        };
        let token = self
            .cli
            .sign_in(
                &address,
                &credentials.email,
                &credentials.secret_key,
                &credentials.master_password,
            )
            .map_err(SessionError::SignIn)?;
        info!(address = %address, "signed_in");
        Ok(self.session(
            address,
            credentials.email.clone(),
            credentials.secret_key.clone(),
            Zeroizing::new(token),
        ))
    }

    /// Restore the most recently used account with a token from `token_for`.
    ///
    /// A missing, malformed or non-matching config yields
    /// [`SessionError::NoPriorSession`]; a rejected token yields
    /// [`SessionError::Probe`].
    pub fn restore_from_config(
        &self,
        config_path: &Path,
        token_for: impl FnOnce(&Account) -> Option<String>,
    ) -> Result<Session, SessionError> {
        let config = OpConfig::load(config_path)?;
        let account = config.latest_account()?;

        let token = token_for(account).unwrap_or_default();
        if token.is_empty() {
            warn!(var = %account.session_env_var(), "session token not found");
        }
        self.cli.probe(&token).map_err(SessionError::Probe)?;

        info!(shorthand = %account.shorthand, "session_restored");
        Ok(self.session(
            account.url.clone(),
            account.email.clone(),
            Zeroizing::new(account.account_key.clone()),
            Zeroizing::new(token),
        ))
    }
}

/// Reads `OP_SESSION_<shorthand>` from the environment.
pub fn env_token(account: &Account) -> Option<String> {
    std::env::var(account.session_env_var()).ok()
}

/// Account to prefill the sign-in form with, if the config names one.
pub fn prefill_from_config(config_path: &Path) -> Option<Credentials> {
    let config = OpConfig::load(config_path).ok()?;
    let account = config.latest_account().ok()?;
    Some(Credentials {
        address: account.url.clone(),
        email: account.email.clone(),
        secret_key: Zeroizing::new(account.account_key.clone()),
        master_password: Zeroizing::new(String::new()),
    })
}

/// Holder of the single live session.
#[derive(Default)]
pub struct SessionSlot {
    current: RwLock<Option<Arc<Session>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.read().clone()
    }

    pub fn state(&self) -> AuthState {
        match self.current.read().as_ref() {
            Some(session) if session.valid() => AuthState::Authenticated,
            _ => AuthState::Unauthenticated,
        }
    }

    /// Install `session`, returning the one it replaced.
    pub fn replace(&self, session: Session) -> Option<Arc<Session>> {
        self.current.write().replace(Arc::new(session))
    }

    pub fn clear(&self) -> Option<Arc<Session>> {
        self.current.write().take()
    }

    /// Clear only if `session` is still the live one.
    pub fn clear_if(&self, session: &Arc<Session>) -> bool {
        let mut current = self.current.write();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, session)) {
            *current = None;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::op::OpError;

    struct FixedCli {
        token: &'static str,
    }

    impl VaultCli for FixedCli {
        fn sign_in(&self, _: &str, _: &str, _: &str, pw: &str) -> Result<String, OpError> {
            if pw == "right" {
                Ok(self.token.to_string())
            } else {
                Err(OpError::vault(145, "401: Authentication required."))
            }
        }
        fn probe(&self, token: &str) -> Result<(), OpError> {
            if token == self.token {
                Ok(())
            } else {
                Err(OpError::vault(1, "You are not currently signed in."))
            }
        }
        fn list_items(&self, _: &str) -> Result<Vec<u8>, OpError> {
            Ok(b"[]".to_vec())
        }
        fn get_item(&self, _: &str, _: &str) -> Result<Vec<u8>, OpError> {
            Err(OpError::vault(145, "not found"))
        }
    }

    fn auth(token: &'static str) -> (Authenticator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let options = StoreOptions {
            ttl: Duration::from_secs(60),
            sweep_interval: None,
        };
        (
            Authenticator::new(
                Arc::new(FixedCli { token }),
                clock.clone(),
                options,
                Duration::from_secs(30 * 60),
            ),
            clock,
        )
    }

    fn creds(pw: &str) -> Credentials {
        Credentials {
            address: String::new(),
            email: "me@example.com".into(),
            secret_key: Zeroizing::new("A3-KEY".into()),
            master_password: Zeroizing::new(pw.into()),
        }
    }

    #[test]
    fn sign_in_yields_valid_session_for_lifetime() {
        let (auth, clock) = auth("tok");
        let session = auth.sign_in(&creds("right")).unwrap();
        assert!(session.valid());
        assert_eq!(session.signin_address(), DEFAULT_SIGNIN_ADDRESS);
        assert_eq!(session.remaining(), Duration::from_secs(1800));

        clock.advance(Duration::from_secs(1799));
        assert!(session.valid());
        clock.advance(Duration::from_secs(1));
        assert!(!session.valid());
        assert!(matches!(session.records(), Err(SessionError::Expired)));
    }

    #[test]
    fn oversized_lifetime_is_capped() {
        let clock = Arc::new(ManualClock::new());
        let auth = Authenticator::new(
            Arc::new(FixedCli { token: "tok" }),
            clock.clone(),
            StoreOptions {
                ttl: Duration::from_secs(60),
                sweep_interval: None,
            },
            Duration::from_secs(u64::MAX),
        );
        let session = auth.sign_in(&creds("right")).unwrap();
        assert!(session.valid());
        assert_eq!(session.remaining(), MAX_SESSION_LIFETIME);

        clock.advance(MAX_SESSION_LIFETIME);
        assert!(!session.valid());
    }

    #[test]
    fn empty_token_is_never_valid() {
        let (auth, _clock) = auth("");
        let session = auth.sign_in(&creds("right")).unwrap();
        assert!(!session.valid());
    }

    #[test]
    fn wrong_password_is_invalid_credentials() {
        let (auth, _clock) = auth("tok");
        let err = auth.sign_in(&creds("wrong")).unwrap_err();
        assert!(err.is_invalid_credentials());
    }

    #[test]
    fn slot_swaps_and_clears_only_matching_session() {
        let (auth, _clock) = auth("tok");
        let slot = SessionSlot::new();
        assert_eq!(slot.state(), AuthState::Unauthenticated);

        slot.replace(auth.sign_in(&creds("right")).unwrap());
        let first = slot.current().unwrap();
        assert_eq!(slot.state(), AuthState::Authenticated);

        slot.replace(auth.sign_in(&creds("right")).unwrap());
        assert!(!slot.clear_if(&first), "stale session must not clear the new one");
        assert_eq!(slot.state(), AuthState::Authenticated);

        let second = slot.current().unwrap();
        assert!(slot.clear_if(&second));
        assert_eq!(slot.state(), AuthState::Unauthenticated);
    }

    #[test]
    fn expired_session_reports_unauthenticated_state() {
        let (auth, clock) = auth("tok");
        let slot = SessionSlot::new();
        slot.replace(auth.sign_in(&creds("right")).unwrap());
        clock.advance(Duration::from_secs(1800));
        assert_eq!(slot.state(), AuthState::Unauthenticated);
    }

    #[test]
    fn unauthenticated_store_error_needs_reauth() {
        let err = SessionError::Store(StoreError::Op(OpError::vault(
            1,
            "You are not currently signed in.",
        )));
        assert!(err.needs_reauth());
        let err = SessionError::Store(StoreError::DuplicateId("x".into()));
        assert!(!err.needs_reauth());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let (auth, _clock) = auth("super-secret-token");
        let session = auth.sign_in(&creds("right")).unwrap();
        let out = format!("{session:?} {:?}", creds("right"));
        assert!(!out.contains("super-secret-token"));
        assert!(!out.contains("A3-KEY"));
        assert!(!out.contains("right\""));
    }
}
