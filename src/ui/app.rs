//! UI state and the controller that drives background vault work.
//!
//! [`AppState`] is owned by the UI thread. [`App`] starts blocking work on
//! the worker pool; each job finishes by pushing a closure onto the
//! [`TaskQueue`], and [`App::tick`] applies those closures once per frame.
//! Searches and detail fetches carry a [`Ticket`]; a result whose ticket
//! has been superseded only clears its in-flight count.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use crate::clipboard::ClipboardSink;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::model::{Detail, Record};
use crate::op::Account;
use crate::session::{
    AuthState, Authenticator, Credentials, Session, SessionError, SessionSlot, env_token,
    prefill_from_config,
};
use crate::ui::cancel::{Debouncer, Generation, PendingSearch, Ticket};
use crate::ui::queue::{DrainReport, QueueHandle, TaskQueue, panic_message};
use crate::ui::worker::Spawn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    SignIn,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormField {
    #[default]
    Address,
    Email,
    SecretKey,
    MasterPassword,
}

impl FormField {
    pub fn next(self) -> Self {
        match self {
            Self::Address => Self::Email,
            Self::Email => Self::SecretKey,
            Self::SecretKey => Self::MasterPassword,
            Self::MasterPassword => Self::Address,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Address => "Sign-in address",
            Self::Email => "Email",
            Self::SecretKey => "Secret key",
            Self::MasterPassword => "Master password",
        }
    }

    pub fn is_secret(self) -> bool {
        matches!(self, Self::SecretKey | Self::MasterPassword)
    }
}

#[derive(Default)]
pub struct SignInForm {
    pub address: String,
    pub email: String,
    pub secret_key: Zeroizing<String>,
    pub master_password: Zeroizing<String>,
    pub focus: FormField,
}

impl SignInForm {
    pub fn from_credentials(c: Credentials) -> Self {
        let focus = if c.email.is_empty() {
            FormField::Address
        } else {
            FormField::MasterPassword
        };
        Self {
            address: c.address,
            email: c.email,
            secret_key: c.secret_key,
            master_password: c.master_password,
            focus,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            address: self.address.clone(),
            email: self.email.clone(),
            secret_key: self.secret_key.clone(),
            master_password: self.master_password.clone(),
        }
    }

    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Address => self.address.as_str(),
            FormField::Email => self.email.as_str(),
            FormField::SecretKey => self.secret_key.as_str(),
            FormField::MasterPassword => self.master_password.as_str(),
        }
    }

    fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            FormField::Address => &mut self.address,
            FormField::Email => &mut self.email,
            FormField::SecretKey => &mut *self.secret_key,
            FormField::MasterPassword => &mut *self.master_password,
        }
    }
}

#[derive(Default)]
pub struct AppState {
    pub form: SignInForm,
    pub signing_in: bool,
    pub pending_lists: usize,
    /// Set once the initial listing for the current session was issued.
    pub listed: bool,
    pub pending_searches: usize,
    pub pending_item_fetches: usize,
    pub query: String,
    /// Full collection of the current session.
    pub items: Vec<Record>,
    /// What the result list shows.
    pub results: Vec<Record>,
    pub selected: Option<usize>,
    pub detail: Option<Arc<Record>>,
    pub status: String,
    /// The live session changed; outstanding UI requests are stale.
    session_changed: bool,
    /// The collection was reloaded under a non-empty query.
    requery: bool,
}

impl AppState {
    pub fn fetching_items(&self) -> bool {
        self.pending_lists > 0 || self.pending_searches > 0
    }

    pub fn fetching_item(&self) -> bool {
        self.pending_item_fetches > 0
    }

    pub fn selected_record(&self) -> Option<&Record> {
        self.selected.and_then(|i| self.results.get(i))
    }

    /// Fresh session installed: forget everything from the previous one.
    fn enter_session(&mut self) {
        self.session_changed = true;
        self.requery = false;
        self.listed = false;
        self.query.clear();
        self.items.clear();
        self.results.clear();
        self.selected = None;
        self.detail = None;
        self.form.master_password = Zeroizing::new(String::new());
    }

    /// Back to the sign-in form, prefilled from the lost session.
    fn require_sign_in(&mut self, prefill: Credentials) {
        self.enter_session();
        self.form = SignInForm::from_credentials(prefill);
    }
}

/// Collaborators the controller drives.
pub struct Services {
    pub auth: Arc<Authenticator>,
    pub slot: Arc<SessionSlot>,
    pub spawner: Arc<dyn Spawn>,
    pub clipboard: Arc<dyn ClipboardSink>,
    pub clock: Arc<dyn Clock>,
}

pub struct App {
    pub state: AppState,
    queue: TaskQueue<AppState>,
    auth: Arc<Authenticator>,
    slot: Arc<SessionSlot>,
    spawner: Arc<dyn Spawn>,
    clipboard: Arc<dyn ClipboardSink>,
    searches: Generation,
    item_fetches: Generation,
    pending: Option<PendingSearch>,
    debounce: Debouncer<String>,
}

impl App {
    pub fn new(services: Services, config: &AppConfig) -> Self {
        Self {
            state: AppState::default(),
            queue: TaskQueue::new(config.queue_capacity),
            auth: services.auth,
            slot: services.slot,
            spawner: services.spawner,
            clipboard: services.clipboard,
            searches: Generation::new(),
            item_fetches: Generation::new(),
            pending: None,
            debounce: Debouncer::new(config.debounce, services.clock),
        }
    }

    pub fn view(&self) -> View {
        match self.slot.state() {
            AuthState::Authenticated => View::Search,
            AuthState::Unauthenticated => View::SignIn,
        }
    }

    pub fn pending_search(&self) -> Option<&PendingSearch> {
        self.pending.as_ref()
    }

    /// Once per frame: apply queued results and their follow-ups, then
    /// start the initial listing if a session just became available.
    pub fn tick(&mut self) -> DrainReport {
        let report = self.queue.drain(&mut self.state);
        if std::mem::take(&mut self.state.session_changed) {
            self.cancel_outstanding();
        }
        if std::mem::take(&mut self.state.requery) {
            self.debounce.reset();
            self.search();
        }
        if self.live_session().is_some() && !self.state.listed {
            self.list(false);
        }
        report
    }

    /// Current session, or `None` after sending the user back to sign in
    /// when it has expired.
    fn live_session(&mut self) -> Option<Arc<Session>> {
        let session = self.slot.current()?;
        if session.valid() {
            return Some(session);
        }
        if self.slot.clear_if(&session) {
            info!("session expired");
            self.cancel_outstanding();
            self.state.require_sign_in(session.prefill());
            self.state.status = "session expired, sign in again".to_string();
        }
        None
    }

    fn cancel_outstanding(&mut self) {
        self.searches.cancel_all();
        self.item_fetches.cancel_all();
        self.pending = None;
        self.debounce.reset();
    }

    /// Run `work` on the pool and queue `apply` with its result. A panic in
    /// `work` becomes `on_panic` plus a status message.
    fn spawn<R: Send + 'static>(
        &self,
        label: &'static str,
        work: impl FnOnce() -> R + Send + 'static,
        apply: impl FnOnce(&mut AppState, R) + Send + 'static,
        on_panic: impl FnOnce(&mut AppState) + Send + 'static,
    ) {
        let handle: QueueHandle<AppState> = self.queue.handle();
        self.spawner.spawn(Box::new(move || {
            let pushed = match catch_unwind(AssertUnwindSafe(work)) {
                Ok(result) => handle.push(move |state: &mut AppState| apply(state, result)),
                Err(payload) => {
                    error!(task = label, panic = %panic_message(&*payload), "background task panicked");
                    handle.push(move |state: &mut AppState| {
                        on_panic(state);
                        state.status = format!("{label}: internal error");
                    })
                }
            };
            if let Err(e) = pushed {
                warn!(task = label, error = %e, "background result dropped");
            }
        }));
    }

    pub fn submit_sign_in(&mut self) {
        if self.state.signing_in {
            return;
        }
        let credentials = self.state.form.credentials();
        self.state.signing_in = true;
        self.state.status = "signing in...".to_string();

        let auth = Arc::clone(&self.auth);
        let slot = Arc::clone(&self.slot);
        let searches = self.searches.clone();
        let item_fetches = self.item_fetches.clone();
        self.spawn(
            "signin",
            move || auth.sign_in(&credentials),
            move |state, result| {
                state.signing_in = false;
                match result {
                    Ok(session) => {
                        searches.cancel_all();
                        item_fetches.cancel_all();
                        slot.replace(session);
                        state.enter_session();
                        state.status = "signed in".to_string();
                    }
                    Err(e) => {
                        warn!(error = %e, invalid_credentials = e.is_invalid_credentials(), "sign-in failed");
                        state.form.master_password = Zeroizing::new(String::new());
                        state.form.focus = FormField::MasterPassword;
                        state.status = format!("signin: {e}");
                    }
                }
            },
            |state| state.signing_in = false,
        );
    }

    /// Try the vault CLI's last session, with the token from the environment.
    pub fn restore(&mut self, config_path: PathBuf) {
        self.restore_with(config_path, env_token);
    }

    pub fn restore_with(
        &mut self,
        config_path: PathBuf,
        token_for: impl FnOnce(&Account) -> Option<String> + Send + 'static,
    ) {
        self.state.signing_in = true;
        self.state.status = "restoring session...".to_string();

        let auth = Arc::clone(&self.auth);
        let slot = Arc::clone(&self.slot);
        self.spawn(
            "restore",
            move || {
                let result = auth.restore_from_config(&config_path, token_for);
                let prefill = match &result {
                    Ok(_) => None,
                    Err(_) => prefill_from_config(&config_path),
                };
                (result, prefill)
            },
            move |state, (result, prefill)| {
                state.signing_in = false;
                match result {
                    Ok(session) => {
                        slot.replace(session);
                        state.enter_session();
                        state.status = "session restored".to_string();
                    }
                    Err(e) => {
                        info!(error = %e, "no session restored");
                        if let Some(prefill) = prefill {
                            state.form = SignInForm::from_credentials(prefill);
                        }
                        state.status = match e {
                            SessionError::NoPriorSession(_) => "sign in to continue".to_string(),
                            other => format!("signin: {other}"),
                        };
                    }
                }
            },
            |state| state.signing_in = false,
        );
    }

    pub fn sign_out(&mut self) {
        self.cancel_outstanding();
        let prefill = self
            .slot
            .clear()
            .map(|s| s.prefill())
            .unwrap_or_default();
        self.state.require_sign_in(prefill);
        self.state.status = "signed out".to_string();
    }

    /// Load the collection; `force` bypasses the cache.
    pub fn list(&mut self, force: bool) {
        let Some(session) = self.live_session() else {
            return;
        };
        self.state.listed = true;
        self.state.pending_lists += 1;

        let slot = Arc::clone(&self.slot);
        let worker_session = Arc::clone(&session);
        self.spawn(
            "list items",
            move || {
                if force {
                    worker_session.refresh()
                } else {
                    worker_session.records()
                }
            },
            move |state, result| {
                state.pending_lists = state.pending_lists.saturating_sub(1);
                if !is_live(&slot, &session) {
                    return;
                }
                match result {
                    Ok(collection) => {
                        state.items = collection.records().to_vec();
                        if state.query.trim().is_empty() {
                            state.results = state.items.clone();
                            state.status = format!("{} results", state.results.len());
                        } else {
                            state.requery = true;
                        }
                    }
                    Err(e) => report_failure(state, &slot, &session, "list items", e),
                }
            },
            |state| state.pending_lists = state.pending_lists.saturating_sub(1),
        );
    }

    pub fn set_query(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text == self.state.query {
            return;
        }
        self.state.query = text;
        self.search();
    }

    /// Run the current query, unless the same text was just issued.
    pub fn search(&mut self) {
        let query = self.state.query.clone();
        if !self.debounce.should_fire(query.clone()) {
            debug!(query = %query, "search debounced");
            return;
        }
        let ticket = self.searches.issue();
        self.item_fetches.cancel_all();
        self.state.selected = None;
        self.state.detail = None;

        if query.trim().is_empty() {
            self.pending = None;
            self.state.results = self.state.items.clone();
            self.state.status = format!("{} results", self.state.results.len());
            return;
        }
        let Some(session) = self.live_session() else {
            return;
        };
        self.pending = Some(PendingSearch {
            query: query.clone(),
            ticket: ticket.clone(),
        });
        self.state.pending_searches += 1;

        let slot = Arc::clone(&self.slot);
        let worker_session = Arc::clone(&session);
        let worker_ticket = ticket.clone();
        self.spawn(
            "search",
            move || {
                let result = worker_session.search(&query);
                // Superseded work is not committed.
                worker_ticket.is_current().then_some(result)
            },
            move |state, outcome| {
                state.pending_searches = state.pending_searches.saturating_sub(1);
                let Some(result) = outcome else {
                    debug!("superseded search discarded by worker");
                    return;
                };
                if !ticket.is_current() || !is_live(&slot, &session) {
                    debug!("superseded search discarded");
                    return;
                }
                match result {
                    Ok(records) => {
                        state.status = format!("matched {} results", records.len());
                        state.results = records;
                    }
                    Err(e) => report_failure(state, &slot, &session, "search", e),
                }
            },
            |state| state.pending_searches = state.pending_searches.saturating_sub(1),
        );
    }

    /// Highlight a result and fetch its details.
    pub fn select(&mut self, index: usize) {
        let Some(record) = self.state.results.get(index) else {
            return;
        };
        let id = record.id.clone();
        self.state.selected = Some(index);
        if self.state.detail.as_ref().is_some_and(|d| d.id == id) {
            return;
        }
        self.state.detail = None;
        let Some(session) = self.live_session() else {
            return;
        };
        let ticket: Ticket = self.item_fetches.issue();
        self.state.pending_item_fetches += 1;

        let slot = Arc::clone(&self.slot);
        let worker_session = Arc::clone(&session);
        self.spawn(
            "get item",
            move || worker_session.get(&id),
            move |state, result| {
                state.pending_item_fetches = state.pending_item_fetches.saturating_sub(1);
                if !ticket.is_current() || !is_live(&slot, &session) {
                    return;
                }
                match result {
                    Ok(record) => state.detail = Some(record),
                    Err(e) => report_failure(state, &slot, &session, "get item", e),
                }
            },
            |state| state.pending_item_fetches = state.pending_item_fetches.saturating_sub(1),
        );
    }

    pub fn select_next(&mut self) {
        let len = self.state.results.len();
        if len == 0 {
            return;
        }
        let next = self.state.selected.map_or(0, |i| (i + 1).min(len - 1));
        self.select(next);
    }

    pub fn select_prev(&mut self) {
        if self.state.results.is_empty() {
            return;
        }
        let prev = self.state.selected.map_or(0, |i| i.saturating_sub(1));
        self.select(prev);
    }

    pub fn copy_username(&mut self) {
        self.copy_field("username", Detail::username);
    }

    pub fn copy_password(&mut self) {
        self.copy_field("password", Detail::password);
    }

    fn copy_field(&mut self, what: &'static str, pick: fn(&Detail) -> Option<&str>) {
        let value = self
            .state
            .detail
            .as_ref()
            .and_then(|r| r.details.as_ref())
            .and_then(pick)
            .map(|v| Zeroizing::new(v.to_string()));
        let Some(value) = value else {
            self.state.status = format!("no {what} on this record");
            return;
        };
        let clipboard = Arc::clone(&self.clipboard);
        self.spawn(
            "copy",
            move || clipboard.copy(&value),
            move |state, result| {
                state.status = match result {
                    Ok(()) => format!("{what} copied"),
                    Err(e) => format!("copy {what}: {e}"),
                };
            },
            |_| {},
        );
    }

    /// Typed character goes to the focused form field or the query.
    pub fn input_char(&mut self, c: char) {
        match self.view() {
            View::SignIn => self.state.form.focused_mut().push(c),
            View::Search => {
                let mut query = self.state.query.clone();
                query.push(c);
                self.set_query(query);
            }
        }
    }

    pub fn input_backspace(&mut self) {
        match self.view() {
            View::SignIn => {
                self.state.form.focused_mut().pop();
            }
            View::Search => {
                let mut query = self.state.query.clone();
                query.pop();
                self.set_query(query);
            }
        }
    }

    pub fn input_clear(&mut self) {
        match self.view() {
            View::SignIn => self.state.form.focused_mut().clear(),
            View::Search => self.set_query(String::new()),
        }
    }

    pub fn focus_next(&mut self) {
        self.state.form.focus = self.state.form.focus.next();
    }
}

fn is_live(slot: &SessionSlot, session: &Arc<Session>) -> bool {
    slot.current().is_some_and(|c| Arc::ptr_eq(&c, session))
}

/// Surface a failed request; an unauthenticated session is dropped and the
/// sign-in form prefilled from it.
fn report_failure(
    state: &mut AppState,
    slot: &SessionSlot,
    session: &Arc<Session>,
    context: &str,
    err: SessionError,
) {
    warn!(context, error = %err, "vault request failed");
    let status = format!("{context}: {err}");
    if err.needs_reauth() && slot.clear_if(session) {
        state.require_sign_in(session.prefill());
    }
    state.status = status;
}
